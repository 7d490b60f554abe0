// src/watch/event_handler.rs

//! Translation of `notify` events into runtime file events.

use std::path::Path;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;

/// Map one `notify` event to zero or more runtime events.
///
/// Renames become a deletion of the old path and an addition of the new one.
/// When the platform cannot tell which side of a rename a path is on, the
/// file system decides.
pub fn translate_event(fs: &dyn FileSystem, event: &Event) -> Vec<RuntimeEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| RuntimeEvent::FileAdded(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| RuntimeEvent::FileDeleted(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .map(|p| RuntimeEvent::FileDeleted(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|p| RuntimeEvent::FileAdded(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let [from, to, ..] = event.paths.as_slice() {
                out.push(RuntimeEvent::FileDeleted(from.clone()));
                out.push(RuntimeEvent::FileAdded(to.clone()));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any | EventKind::Other => event
            .paths
            .iter()
            .map(|p| by_existence(fs, p))
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            // Permission and timestamp changes do not change content.
            Vec::new()
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| RuntimeEvent::FileModified(p.clone()))
            .collect(),
        // Access events.
        _ => Vec::new(),
    }
}

fn by_existence(fs: &dyn FileSystem, path: &Path) -> RuntimeEvent {
    if fs.exists(path) {
        RuntimeEvent::FileAdded(path.to_path_buf())
    } else {
        RuntimeEvent::FileDeleted(path.to_path_buf())
    }
}

/// Forward the translated events of one `notify` event to the runtime.
/// Returns false once the runtime channel is closed.
pub async fn forward_event(
    fs: &dyn FileSystem,
    event: Event,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    for runtime_event in translate_event(fs, &event) {
        debug!(?runtime_event, "file event");
        if runtime_tx.send(runtime_event).await.is_err() {
            warn!("runtime channel closed; stopping file event forwarding");
            return false;
        }
    }
    true
}
