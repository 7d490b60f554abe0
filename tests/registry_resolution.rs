// tests/registry_resolution.rs

use std::error::Error;
use std::path::{Path, PathBuf};

use assetpipe::fs::mock::MockFileSystem;
use assetpipe::path_utils::{eq_ignore_case, name_key, starts_with_ignore_case, strip_dir_prefix};
use assetpipe::registry::{
    update_to_correct_case, AssetRecognizer, MetadataType, PatternMatcher, RecognizerRegistry,
    ScanFolderInfo, ScanFolderRegistry,
};
use assetpipe::types::PatternType;

type TestResult = Result<(), Box<dyn Error>>;

fn folders() -> ScanFolderRegistry {
    ScanFolderRegistry::new(vec![
        ScanFolderInfo::new("/proj/Game", "game", 10),
        ScanFolderInfo::new("/proj/Override", "override", 0),
        ScanFolderInfo::new("/proj/Engine", "engine", 20).with_output_prefix("engine"),
        ScanFolderInfo::new("/proj/Flat", "flat", 30).with_recurse(false),
    ])
}

#[test]
fn folders_are_ordered_by_priority() {
    let registry = folders();
    let keys: Vec<&str> = registry.folders().iter().map(|f| f.portable_key.as_str()).collect();
    assert_eq!(keys, vec!["override", "game", "engine", "flat"]);
    assert!(registry.by_portable_key("GAME").is_some());
    assert!(registry.by_path(Path::new("/proj/engine")).is_some());
}

#[test]
fn same_portable_key_replaces_the_folder() {
    let mut registry = folders();
    registry.add(ScanFolderInfo::new("/elsewhere/Game", "Game", 5));

    assert_eq!(registry.folders().len(), 4);
    let game = registry.by_portable_key("game").unwrap();
    assert_eq!(game.path, PathBuf::from("/elsewhere/Game"));
}

#[test]
fn relative_path_carries_the_output_prefix() {
    let registry = folders();

    let rel = registry
        .convert_to_relative_path(Path::new("/proj/Engine/Shaders/lit.hlsl"))
        .unwrap();
    assert_eq!(rel.database_name, "engine/Shaders/lit.hlsl");
    assert_eq!(rel.relative_path, "Shaders/lit.hlsl");
    assert_eq!(rel.scan_folder, PathBuf::from("/proj/Engine"));

    let engine = registry.by_portable_key("engine").unwrap();
    assert_eq!(
        registry.absolute_path_of(engine, &rel.database_name),
        PathBuf::from("/proj/Engine/Shaders/lit.hlsl")
    );
}

#[test]
fn paths_outside_every_folder_are_unknown() {
    let registry = folders();
    assert!(registry.convert_to_relative_path(Path::new("/tmp/x.png")).is_none());
    assert!(registry.scan_folder_for_file(Path::new("/proj/Gameplay/x.png")).is_none());
}

#[test]
fn non_ascii_names_fold_the_same_everywhere() {
    assert!(eq_ignore_case("Données/Écorce.png", "DONNÉES/écorce.PNG"));
    assert!(starts_with_ignore_case("DONNÉES/Écorce.png", "données"));
    assert_eq!(strip_dir_prefix("DONNÉES/Écorce.png", "données"), Some("Écorce.png"));
    assert_eq!(strip_dir_prefix("Donnéesx/a.png", "données"), None);
    assert_eq!(name_key("DONNÉES\\Écorce.png"), name_key("données/écorce.png"));

    // A matching prefix means matching keys.
    let prefix = "ÖL";
    let name = "öl/Fass.png";
    assert!(starts_with_ignore_case(name, prefix));
    assert!(name_key(name).starts_with(&name_key(prefix)));
}

#[test]
fn non_ascii_scan_folder_owns_its_files() {
    let registry = ScanFolderRegistry::new(vec![ScanFolderInfo::new("/proj/Données", "donnees", 0)]);

    let rel = registry
        .convert_to_relative_path(Path::new("/proj/DONNÉES/Écorce.png"))
        .unwrap();
    assert_eq!(rel.relative_path, "Écorce.png");
    assert!(registry.by_path(Path::new("/proj/données")).is_some());
}

#[test]
fn non_recursive_folders_own_direct_children_only() {
    let registry = folders();
    assert!(registry.scan_folder_for_file(Path::new("/proj/Flat/a.png")).is_some());
    assert!(registry.scan_folder_for_file(Path::new("/proj/Flat/sub/a.png")).is_none());
}

#[test]
fn folder_root_matches_exactly() {
    let registry = ScanFolderRegistry::new(vec![
        ScanFolderInfo::new("/proj/Game", "game", 10),
        ScanFolderInfo::new("/proj/Game/Textures", "textures", 10),
    ]);

    let owner = registry.scan_folder_for_file(Path::new("/proj/Game/Textures")).unwrap();
    assert_eq!(owner.portable_key, "textures");

    let owner = registry
        .scan_folder_for_file(Path::new("/proj/Game/Textures/rock.png"))
        .unwrap();
    assert_eq!(owner.portable_key, "textures", "direct parent wins on equal order");
}

#[test]
fn override_is_reported_with_on_disk_case() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/Game/textures/Rock.png", "base");
    fs.add_file("/proj/Override/Textures/ROCK.png", "override");
    let registry = folders();

    let winner = registry.get_overriding_file(&fs, "textures/rock.png", Path::new("/proj/Game"));
    assert_eq!(winner, Some(PathBuf::from("/proj/Override/Textures/ROCK.png")));

    assert_eq!(
        registry.get_overriding_file(&fs, "textures/rock.png", Path::new("/proj/Override")),
        None
    );
}

#[test]
fn first_matching_file_follows_priority() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/Game/ui/icon.png", "game");
    fs.add_file("/proj/Engine/ui/icon.png", "engine");
    let registry = folders();

    assert_eq!(
        registry.find_first_matching_file(&fs, "UI/Icon.png"),
        Some(PathBuf::from("/proj/Game/ui/icon.png"))
    );
    assert_eq!(
        registry.find_first_matching_file(&fs, "engine/ui/icon.png"),
        Some(PathBuf::from("/proj/Engine/ui/icon.png"))
    );
    assert_eq!(registry.find_first_matching_file(&fs, ""), None);
    assert_eq!(registry.find_first_matching_file(&fs, "ui/missing.png"), None);
}

#[test]
fn case_correction_walks_each_component() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/Game/Textures/Rock.PNG", "rock");
    fs.add_file("/proj/Game/Textures/rock.png", "other rock");

    assert_eq!(
        update_to_correct_case(&fs, Path::new("/proj/Game"), "textures/ROCK.png"),
        Some(PathBuf::from("/proj/Game/Textures/Rock.PNG"))
    );
    // An exact match beats a case-insensitive one.
    assert_eq!(
        update_to_correct_case(&fs, Path::new("/proj/Game"), "Textures/rock.png"),
        Some(PathBuf::from("/proj/Game/Textures/rock.png"))
    );
    assert_eq!(update_to_correct_case(&fs, Path::new("/proj/Game"), "nope/rock.png"), None);
    assert_eq!(update_to_correct_case(&fs, Path::new("/proj/Game"), ""), None);
}

#[test]
fn recognizers_match_by_priority_and_respect_excludes() -> TestResult {
    let mut registry = RecognizerRegistry::new();
    registry.add_recognizer(
        AssetRecognizer::new("textures", "*.png", PatternType::Wildcard, "texture")?
            .with_platform("pc", ""),
    );
    registry.add_recognizer(
        AssetRecognizer::new("ui", "ui/", PatternType::Regex, "ui")?
            .with_platform("pc", "--ui")
            .with_priority(5),
    );
    registry.add_exclude("backups", PatternMatcher::new("*~*", PatternType::Wildcard)?);

    let names: Vec<&str> = registry
        .matching_recognizers("UI/Icon.PNG")
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["ui", "textures"]);

    assert!(registry.matching_recognizers("sound/boom.wav").is_empty());
    assert!(registry.is_excluded("textures/rock~1.png"));
    assert!(registry.matching_recognizers("textures/rock~1.png").is_empty());
    Ok(())
}

#[test]
fn wildcards_cross_directories() -> TestResult {
    let matcher = PatternMatcher::new("*.png", PatternType::Wildcard)?;
    assert!(matcher.matches("a/b/c.png"));
    assert!(matcher.matches("C.PNG"));
    assert!(!matcher.matches("c.png.bak"));
    Ok(())
}

#[test]
fn sidecars_map_both_ways() {
    let mut registry = RecognizerRegistry::new();
    registry.add_metadata_type(MetadataType {
        extension: "assetinfo".to_string(),
        original_extension: String::new(),
    });
    registry.add_metadata_type(MetadataType {
        extension: "meta".to_string(),
        original_extension: "fbx".to_string(),
    });

    assert_eq!(
        registry.sidecars_for(Path::new("/proj/Game/rock.png")),
        vec![PathBuf::from("/proj/Game/rock.png.assetinfo")]
    );
    assert_eq!(
        registry.sidecars_for(Path::new("/proj/Game/tree.FBX")),
        vec![
            PathBuf::from("/proj/Game/tree.FBX.assetinfo"),
            PathBuf::from("/proj/Game/tree.meta"),
        ]
    );

    assert_eq!(
        registry.source_for_sidecar(Path::new("/proj/Game/rock.png.assetinfo")),
        Some(PathBuf::from("/proj/Game/rock.png"))
    );
    assert_eq!(
        registry.source_for_sidecar(Path::new("/proj/Game/tree.meta")),
        Some(PathBuf::from("/proj/Game/tree.fbx"))
    );
    assert_eq!(registry.source_for_sidecar(Path::new("/proj/Game/rock.png")), None);
}
