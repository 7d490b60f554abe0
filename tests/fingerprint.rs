// tests/fingerprint.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use assetpipe::builder::BuilderDescriptor;
use assetpipe::fingerprint::{
    compute_aggregate_hash, compute_file_hash, compute_fingerprint, extra_info, FileCache,
    FingerprintSpec, FAILED_FINGERPRINT,
};
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::registry::AssetRecognizer;
use assetpipe::types::PatternType;

type TestResult = Result<(), Box<dyn Error>>;

fn fingerprint(fs: &MockFileSystem, source: &str, extra: &str, files: &[PathBuf]) -> u64 {
    compute_fingerprint(
        &FingerprintSpec {
            source: Path::new(source),
            extra_info: extra,
            fingerprint_files: files,
        },
        |p| compute_file_hash(fs, p).ok(),
    )
}

#[test]
fn fingerprint_is_stable_for_unchanged_inputs() {
    let fs = MockFileSystem::new();
    fs.add_file("/g/rock.png", "rock");
    fs.add_file("/g/rock.png.assetinfo", "hq");
    let files = vec![PathBuf::from("/g/rock.png.assetinfo")];

    let a = fingerprint(&fs, "/g/rock.png", "pc", &files);
    let b = fingerprint(&fs, "/g/rock.png", "pc", &files);
    assert_eq!(a, b);
    assert_ne!(a, FAILED_FINGERPRINT);
}

#[test]
fn every_input_moves_the_fingerprint() {
    let fs = MockFileSystem::new();
    fs.add_file("/g/rock.png", "rock");
    fs.add_file("/g/shared.pal", "v1");
    let files = vec![PathBuf::from("/g/shared.pal")];
    let base = fingerprint(&fs, "/g/rock.png", "pc", &files);

    assert_ne!(base, fingerprint(&fs, "/g/rock.png", "es3", &files), "extra info");
    assert_ne!(base, fingerprint(&fs, "/g/rock.png", "pc", &[]), "file set");

    fs.add_file("/g/shared.pal", "v2");
    assert_ne!(base, fingerprint(&fs, "/g/rock.png", "pc", &files), "dependency content");

    fs.add_file("/g/shared.pal", "v1");
    assert_eq!(base, fingerprint(&fs, "/g/rock.png", "pc", &files));

    fs.add_file("/g/rock.png", "rock2");
    assert_ne!(base, fingerprint(&fs, "/g/rock.png", "pc", &files), "source content");
}

#[test]
fn missing_fingerprint_files_are_skipped() {
    let fs = MockFileSystem::new();
    fs.add_file("/g/rock.png", "rock");

    let with_missing = fingerprint(&fs, "/g/rock.png", "pc", &[PathBuf::from("/g/gone.pal")]);
    let without = fingerprint(&fs, "/g/rock.png", "pc", &[]);
    assert_eq!(with_missing, without);
}

#[test]
fn unreadable_source_gets_the_failed_fingerprint() {
    let fs = MockFileSystem::new();
    assert_eq!(fingerprint(&fs, "/g/nope.png", "pc", &[]), FAILED_FINGERPRINT);
}

#[test]
fn extra_info_lists_builder_and_recognizer_parameters() -> TestResult {
    let builder = BuilderDescriptor::named("texture").with_version("4");
    let rec = AssetRecognizer::new("textures", "*.png", PatternType::Wildcard, "texture")?
        .with_platform("pc", "--fast")
        .with_version("2");
    let other = AssetRecognizer::new("mobile", "*.png", PatternType::Wildcard, "texture")?
        .with_platform("es3", "--etc2");

    let info = extra_info(&builder, &[&rec, &other], "pc", "Compile", "hq");

    assert!(info.starts_with(&builder.bus_id.hyphenated().to_string()));
    assert!(info.contains("|4|pc|"));
    assert!(info.contains("textures:2:--fast"));
    assert!(!info.contains("--etc2"));
    assert!(info.ends_with("|Compile|hq"));

    let bumped = BuilderDescriptor::named("texture").with_version("5");
    assert_ne!(info, extra_info(&bumped, &[&rec, &other], "pc", "Compile", "hq"));
    Ok(())
}

#[test]
fn aggregate_hash_depends_on_order() {
    let a = compute_aggregate_hash(&["x".to_string(), "y".to_string()]);
    let b = compute_aggregate_hash(&["y".to_string(), "x".to_string()]);
    assert_ne!(a, b);
    assert_eq!(a, compute_aggregate_hash(&["x".to_string(), "y".to_string()]));
}

#[test]
fn file_cache_reuses_hashes_until_mtime_changes() -> TestResult {
    let fs = MockFileSystem::new();
    let old = SystemTime::now() - Duration::from_secs(600);
    fs.add_file_with_mtime("/g/rock.png", "rock", old);

    let mut cache = FileCache::new();
    let first = cache.get_or_compute(&fs, Path::new("/g/rock.png"))?;
    assert_eq!(cache.len(), 1);

    // Same mtime: the cached (now stale) hash is served.
    fs.add_file_with_mtime("/g/rock.png", "changed", old);
    assert_eq!(cache.get_or_compute(&fs, Path::new("/g/rock.png"))?, first);

    fs.add_file_with_mtime("/g/rock.png", "changed", old + Duration::from_secs(1));
    let second = cache.get_or_compute(&fs, Path::new("/g/rock.png"))?;
    assert_ne!(first, second);
    Ok(())
}

#[test]
fn file_cache_invalidation() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/g/a/one.png", "1");
    fs.add_file("/g/a/two.png", "2");
    fs.add_file("/g/b/three.png", "3");

    let mut cache = FileCache::new();
    for p in ["/g/a/one.png", "/g/a/two.png", "/g/b/three.png"] {
        cache.get_or_compute(&fs, Path::new(p))?;
    }
    assert_eq!(cache.len(), 3);

    cache.invalidate_under(Path::new("/g/a"));
    assert_eq!(cache.len(), 1);

    cache.invalidate(Path::new("/g/b/three.png"));
    assert!(cache.is_empty());

    fs.remove("/g/b/three.png");
    assert_eq!(cache.stamp(&fs, Path::new("/g/b/three.png")), None);
    assert!(cache.stamp(&fs, Path::new("/g/a/one.png")).is_some());
    Ok(())
}
