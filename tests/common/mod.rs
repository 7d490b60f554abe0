#![allow(dead_code)]

pub use assetpipe_test_utils::builders;
pub use assetpipe_test_utils::fake_executor;
pub use assetpipe_test_utils::pipeline;
pub use assetpipe_test_utils::scripted_builder;
pub use assetpipe_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use assetpipe::builder::Builder;
use assetpipe::config::ConfigFile;
use assetpipe::fs::mock::MockFileSystem;

use self::builders::{ConfigFileBuilder, RecognizerBuilder};
use self::pipeline::TestPipeline;
use self::scripted_builder::ScriptedBuilder;

pub const GAME: &str = "/proj/Game";
pub const CACHE: &str = "/proj/Cache";

/// One scan folder (`/proj/Game`), platforms `pc` and `es3`, and a
/// `*.png` recognizer routed to the `texture` builder for both.
pub fn texture_config() -> ConfigFile {
    ConfigFileBuilder::new(CACHE)
        .with_game("SampleGame")
        .with_platforms(&["pc", "es3"])
        .scan_folder(GAME, "game", 0)
        .with_recognizer(
            "textures",
            RecognizerBuilder::new("*.png", "texture")
                .platform("pc", "")
                .platform("es3", "")
                .build(),
        )
        .build()
}

/// A pipeline over `fs` with a scripted `texture` builder.
pub fn texture_pipeline(cfg: &ConfigFile, fs: &MockFileSystem) -> (TestPipeline, Arc<ScriptedBuilder>) {
    let builder = Arc::new(ScriptedBuilder::new("texture", "*.png", Arc::new(fs.clone())));
    let pipeline = TestPipeline::new(cfg, fs.clone(), vec![builder.clone() as Arc<dyn Builder>]);
    (pipeline, builder)
}
