// tests/asset_identity.rs

mod common;
use crate::common::{init_tracing, texture_config, texture_pipeline, with_timeout, GAME};

use std::error::Error;
use std::path::Path;

use uuid::Uuid;

use assetpipe::builder::{AssetId, BuilderDescriptor};
use assetpipe::db::source_uuid;
use assetpipe::engine::results::legacy_guid_for;
use assetpipe::engine::{legacy_asset_ids, AssetNotificationKind};
use assetpipe::fs::mock::MockFileSystem;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn source_uuid_ignores_case_and_separators() {
    assert_eq!(source_uuid("Textures/Rock.png"), source_uuid("textures/rock.png"));
    assert_eq!(source_uuid("textures\\rock.png"), source_uuid("textures/rock.png"));
    assert_ne!(source_uuid("textures/rock.png"), source_uuid("textures/moss.png"));
}

#[test]
fn builder_bus_id_is_derived_from_its_name() {
    let a = BuilderDescriptor::named("texture");
    let b = BuilderDescriptor::named("texture").with_version("9");
    assert_eq!(a.bus_id, b.bus_id);
    assert_ne!(a.bus_id, BuilderDescriptor::named("shader").bus_id);
}

#[test]
fn legacy_ids_come_in_order_without_own_id_or_repeats() {
    let name = "Textures/Rock.png";
    let uuid = source_uuid(name);
    let legacy_guid = legacy_guid_for("pc/game/textures/rock.png.out");
    let case_sensitive = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());

    let ids = legacy_asset_ids(uuid, name, legacy_guid, 3, &[1, 3, 1]);

    assert_eq!(
        ids,
        vec![
            AssetId::new(legacy_guid, 0),
            AssetId::new(case_sensitive, 3),
            AssetId::new(uuid, 1),
        ]
    );
}

#[test]
fn lowercase_names_have_no_case_sensitive_legacy_id() {
    let name = "textures/rock.png";
    let uuid = source_uuid(name);
    let legacy_guid = legacy_guid_for("pc/game/textures/rock.png.out");

    let ids = legacy_asset_ids(uuid, name, legacy_guid, 0, &[]);
    assert_eq!(ids, vec![AssetId::new(legacy_guid, 0)]);
}

#[test]
fn legacy_guid_ignores_case() {
    assert_eq!(
        legacy_guid_for("PC/Game/Textures/Rock.png.out"),
        legacy_guid_for("pc/game/textures/rock.png.out")
    );
}

#[tokio::test]
async fn change_notifications_carry_stable_ids() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(Path::new(GAME).join("textures/Rock.png"), "rock");
    let cfg = texture_config();
    let (mut pipeline, _builder) = texture_pipeline(&cfg, &fs);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;

    let changed = pipeline.take_asset_messages(AssetNotificationKind::Changed);
    let (_, pc) = changed
        .iter()
        .find(|(platform, _)| platform == "pc")
        .ok_or("no pc change")?;

    let uuid = source_uuid("textures/Rock.png");
    assert_eq!(pc.asset_id, AssetId::new(uuid, 0));
    assert_eq!(
        pc.legacy_asset_ids.first(),
        Some(&AssetId::new(legacy_guid_for("pc/samplegame/textures/rock.png.out"), 0))
    );
    assert!(pc.legacy_asset_ids.iter().all(|id| *id != pc.asset_id));

    let source = pipeline
        .database()
        .source_by_name("textures/rock.png")
        .ok_or("source not registered")?;
    assert_eq!(source.uuid, uuid);
    Ok(())
}
