// src/lib.rs

pub mod builder;
pub mod cli;
pub mod config;
pub mod dag;
pub mod db;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod logging;
pub mod path_utils;
pub mod registry;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::builder::{Builder, CommandBuilder};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::db::{FileStateStore, MemoryStateStore, StateStore};
use crate::engine::{
    AssetNotificationKind, Conductor, ConductorSettings, Notification, Runtime, RuntimeEvent,
    RuntimeOptions,
};
use crate::exec::{effective_concurrency, ExecutorContext, RealJobExecutor, RunnerSettings};
use crate::fs::{FileSystem, RealFileSystem};
use crate::registry::{BuilderRegistry, ScanRegistry};
use crate::watch::WatchRoot;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - registries, database and conductor
/// - executor
/// - (optional) file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    fs.create_dir_all(&cfg.cache.root)?;

    let mut builders = BuilderRegistry::new();
    for builder in CommandBuilder::all_from_config(&cfg) {
        builders.register(Arc::new(builder) as Arc<dyn Builder>);
    }
    let registry = ScanRegistry::from_config(&cfg)?;

    let store: Box<dyn StateStore> = match cfg.cache.database {
        Some(ref db_file) => Box::new(FileStateStore::new(cfg.cache.root.join(db_file), fs.clone())),
        None => Box::new(MemoryStateStore::new()),
    };
    let db = store.load()?;

    let options = RuntimeOptions {
        exit_when_idle: args.once,
    };
    let core = Conductor::new(
        ConductorSettings::from_config(&cfg),
        registry,
        builders,
        db,
        fs.clone(),
        options,
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let executor = RealJobExecutor::new(
        ExecutorContext {
            fs: fs.clone(),
            settings: RunnerSettings::from_config(&cfg),
            max_concurrent: effective_concurrency(cfg.jobs.min, cfg.jobs.max),
        },
        rt_tx.clone(),
    );

    // Optional file watcher (disabled in --once mode).
    let _watcher_handle = if !args.once {
        Some(crate::watch::spawn_watcher(
            watch_roots(&cfg),
            rt_tx.clone(),
            fs.clone(),
        )?)
    } else {
        None
    };

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let (notify_tx, notify_rx) = broadcast::channel::<Notification>(1024);
    tokio::spawn(log_notifications(notify_rx));

    let runtime = Runtime::new(core, rt_rx, executor, store, notify_tx);
    let core = runtime.run(true).await?;

    info!(
        sources = core.database().sources().count(),
        products = core.database().products().count(),
        "assetpipe finished"
    );
    Ok(())
}

/// Scan folders (recursive as configured) plus the cache root, so deleted
/// products are noticed and rebuilt.
fn watch_roots(cfg: &ConfigFile) -> Vec<WatchRoot> {
    let mut roots: Vec<WatchRoot> = cfg
        .scan_folders
        .iter()
        .map(|f| WatchRoot::new(f.path.clone(), f.recurse))
        .collect();
    roots.push(WatchRoot::new(cfg.cache.root.clone(), true));
    roots
}

async fn log_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(Notification::AssetMessage { platform, message }) => match message.kind {
                AssetNotificationKind::Changed => {
                    info!(%platform, product = %message.product_path, asset = %message.asset_id, "product changed")
                }
                AssetNotificationKind::Removed => {
                    info!(%platform, product = %message.product_path, asset = %message.asset_id, "product removed")
                }
            },
            Ok(Notification::IdleState(idle)) => info!(idle, "idle state changed"),
            Ok(other) => debug!(notification = ?other, "notification"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "notification log lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Simple dry-run output: print scan folders, recognizers and builders.
fn print_dry_run(cfg: &ConfigFile) {
    println!("assetpipe dry-run");
    println!("  cache.root = {}", cfg.cache.root.display());
    println!("  cache.game = {}", cfg.cache.game);
    if let Some(ref db) = cfg.cache.database {
        println!("  cache.database = {}", db.display());
    }
    println!("  jobs = {}..{}", cfg.jobs.min, cfg.jobs.max);
    println!("  platforms = {:?}", cfg.enabled_platforms());
    println!();

    println!("scan folders ({}):", cfg.scan_folders.len());
    for folder in cfg.scan_folders.iter() {
        println!("  - {}", folder.path.display());
        if let Some(ref key) = folder.portable_key {
            println!("      portable_key: {key}");
        }
        if !folder.output_prefix.is_empty() {
            println!("      output_prefix: {}", folder.output_prefix);
        }
        println!("      order: {}", folder.order);
        if folder.root {
            println!("      root: true");
        }
        if !folder.recurse {
            println!("      recurse: false");
        }
        if !folder.platforms.is_empty() {
            println!("      platforms: {:?}", folder.platforms);
        }
    }

    println!("recognizers ({}):", cfg.recognizers.len());
    for (name, rec) in cfg.recognizers.iter() {
        println!("  - {name}");
        println!("      pattern: {} ({:?})", rec.pattern, rec.pattern_type);
        println!("      builder: {}", rec.builder);
        if rec.critical {
            println!("      critical: true");
        }
        if rec.priority != 0 {
            println!("      priority: {}", rec.priority);
        }
        let platforms: Vec<&String> = rec.platforms.keys().collect();
        println!("      platforms: {platforms:?}");
    }

    if !cfg.excludes.is_empty() {
        println!("excludes ({}):", cfg.excludes.len());
        for (name, ex) in cfg.excludes.iter() {
            println!("  - {name}: {} ({:?})", ex.pattern, ex.pattern_type);
        }
    }

    println!("builders ({}):", cfg.builders.len());
    for (name, b) in cfg.builders.iter() {
        println!("  - {name}");
        println!("      cmd: {}", b.cmd);
        println!("      job_key: {}", b.job_key);
    }

    debug!("dry-run complete (no processing)");
}
