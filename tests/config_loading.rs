// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use tempfile::{tempdir, NamedTempFile};

use assetpipe::config::{load_and_validate, ConfigFile, RawConfigFile};
use assetpipe::errors::PipelineError;
use assetpipe::types::PatternType;

type TestResult = Result<(), Box<dyn Error>>;

const MINIMAL: &str = r#"
[platforms]
enabled = ["pc"]

[[scan_folder]]
path = "Game"

[recognizer.textures]
pattern = "*.png"
builder = "texture"
platforms = { pc = {} }

[builder.texture]
cmd = "texconv"
"#;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{}", contents)?;
    Ok(file)
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = write_config(contents).unwrap();
    match load_and_validate(file.path()) {
        Err(PipelineError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "unexpected message: {msg}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn minimal_config_gets_defaults_and_resolved_paths() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("AssetPipe.toml");
    std::fs::write(&path, MINIMAL)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.cache.root, dir.path().join("Cache"));
    assert_eq!(cfg.cache.game, "game");
    assert!(cfg.cache.database.is_none());
    assert_eq!(cfg.jobs.min, 1);
    assert_eq!(cfg.jobs.max, 4);
    assert_eq!(cfg.jobs.grace_window_ms, 1000);

    let folder = &cfg.scan_folders[0];
    assert_eq!(folder.path, dir.path().join("Game"));
    assert!(folder.recurse);
    assert!(!folder.root);
    assert_eq!(folder.order, 0);

    let rec = &cfg.recognizers["textures"];
    assert_eq!(rec.pattern_type, PatternType::Wildcard);
    assert!(rec.platforms.contains_key("pc"));
    assert_eq!(cfg.builders["texture"].job_key, "Compile");
    assert_eq!(cfg.enabled_platforms(), &["pc".to_string()]);
    Ok(())
}

#[test]
fn full_config_round_trips_every_section() -> TestResult {
    let file = write_config(
        r#"
[cache]
root = "/var/cache/assets"
game = "SampleGame"
database = "assetdb.json"

[jobs]
min = 2
max = 8
grace_window_ms = 0

[platforms]
enabled = ["pc", "es3"]

[[scan_folder]]
path = "/work/Game"
portable_key = "game"
output_prefix = "shared"
order = 10
platforms = ["pc"]

[[scan_folder]]
path = "/work/Engine"
display_name = "Engine"
root = true
recurse = false

[recognizer.shaders]
pattern = '^shaders/.*\.hlsl$'
pattern_type = "regex"
builder = "shader"
priority = 5
critical = true
exclusive_lock = true
version = "3"
platforms = { pc = { params = "--opt" }, es3 = {} }

[exclude.backups]
pattern = "*.bak"

[[metadata]]
extension = "assetinfo"

[[metadata]]
extension = "meta"
original_extension = "fbx"

[builder.shader]
cmd = "shaderc $ASSETPIPE_SOURCE"
job_key = "Shader"
version = "7"
fingerprint = "abc"
"#,
    )?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.cache.root, PathBuf::from("/var/cache/assets"));
    assert_eq!(cfg.cache.database, Some(PathBuf::from("assetdb.json")));
    assert_eq!((cfg.jobs.min, cfg.jobs.max, cfg.jobs.grace_window_ms), (2, 8, 0));
    assert_eq!(cfg.scan_folders.len(), 2);
    assert_eq!(cfg.scan_folders[0].output_prefix, "shared");
    assert_eq!(cfg.scan_folders[0].platforms, vec!["pc".to_string()]);
    assert!(cfg.scan_folders[1].root);
    assert!(!cfg.scan_folders[1].recurse);

    let shaders = &cfg.recognizers["shaders"];
    assert_eq!(shaders.pattern_type, PatternType::Regex);
    assert!(shaders.critical && shaders.exclusive_lock);
    assert_eq!(shaders.platforms["pc"].params, "--opt");
    assert_eq!(shaders.platforms["es3"].params, "");

    assert_eq!(cfg.excludes["backups"].pattern, "*.bak");
    assert_eq!(cfg.metadata[1].original_extension, "fbx");
    assert_eq!(cfg.builders["shader"].fingerprint, "abc");
    assert!(!cfg.builders["shader"].auto_fail && !cfg.builders["shader"].auto_succeed);
    Ok(())
}

#[test]
fn builder_auto_flags_are_read() -> TestResult {
    let file = write_config(&MINIMAL.replace("cmd = \"texconv\"", "cmd = \"texconv\"\nauto_succeed = true"))?;
    let cfg = load_and_validate(file.path())?;
    assert!(cfg.builders["texture"].auto_succeed);
    assert!(!cfg.builders["texture"].auto_fail);
    Ok(())
}

#[test]
fn builder_with_both_auto_flags_is_rejected() {
    expect_config_error(
        &MINIMAL.replace(
            "cmd = \"texconv\"",
            "cmd = \"texconv\"\nauto_fail = true\nauto_succeed = true",
        ),
        "both auto_fail and auto_succeed",
    );
}

#[test]
fn config_without_platforms_is_rejected() {
    expect_config_error(
        r#"
[[scan_folder]]
path = "Game"

[recognizer.textures]
pattern = "*.png"
builder = "texture"

[builder.texture]
cmd = "texconv"
"#,
        "no platforms",
    );
}

#[test]
fn recognizer_with_unknown_builder_is_rejected() {
    expect_config_error(
        &MINIMAL.replace("builder = \"texture\"", "builder = \"missing\""),
        "unknown builder 'missing'",
    );
}

#[test]
fn recognizer_for_disabled_platform_is_rejected() {
    expect_config_error(
        &MINIMAL.replace("platforms = { pc = {} }", "platforms = { ios = {} }"),
        "'ios' which is not enabled",
    );
}

#[test]
fn invalid_regex_is_rejected() {
    expect_config_error(
        &MINIMAL.replace(
            "pattern = \"*.png\"",
            "pattern = \"(unclosed\"\npattern_type = \"regex\"",
        ),
        "recognizer 'textures'",
    );
}

#[test]
fn duplicate_portable_keys_are_rejected() {
    let contents = format!(
        "{MINIMAL}\n[[scan_folder]]\npath = \"Other\"\nportable_key = \"Game\"\n"
    )
    .replace("path = \"Game\"\n", "path = \"Game\"\nportable_key = \"game\"\n");
    expect_config_error(&contents, "used more than once");
}

#[test]
fn min_jobs_above_max_is_rejected() {
    expect_config_error(
        &format!("[jobs]\nmin = 6\nmax = 2\n{MINIMAL}"),
        "must not exceed",
    );
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let file = write_config("[platforms\nenabled = [")?;
    match load_and_validate(file.path()) {
        Err(PipelineError::TomlError(_)) => Ok(()),
        other => panic!("Expected TomlError, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(PipelineError::IoError(_))));
}

#[test]
fn raw_config_validates_through_try_from() {
    let raw: RawConfigFile = toml::from_str(MINIMAL).unwrap();
    assert!(ConfigFile::try_from(raw.clone()).is_ok());

    let mut empty = raw;
    empty.scan_folders.clear();
    assert!(matches!(
        ConfigFile::try_from(empty),
        Err(PipelineError::ConfigError(_))
    ));
}
