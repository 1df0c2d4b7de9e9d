//! Single-file watching that feeds the reload signal channel.

use crate::error::{Result, ServerError};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Depth of the reload signal channel. At most one change is pending; a
/// change arriving while another is unconsumed is coalesced into it.
const SIGNAL_DEPTH: usize = 1;

/// Watches a single file and emits one change event per qualifying write.
///
/// The subscription lives as long as this value does. It cannot be restarted;
/// it ends only with the process or if the OS watcher itself fails in a way
/// that stops event delivery (which is logged, never fatal).
pub struct FileWatcher {
    // Held only to keep the OS subscription alive.
    _watcher: tokio::sync::Mutex<RecommendedWatcher>,
    path: PathBuf,
}

impl FileWatcher {
    /// Subscribe to write notifications for `path`.
    ///
    /// Returns the watcher together with the receiving end of the reload
    /// signal channel. The channel is primed with the watched path so the
    /// first receive completes without waiting for an edit.
    ///
    /// Only data writes qualify as changes. Renames, permission changes, and
    /// removals are ignored, which means a file that is deleted and recreated
    /// is no longer watched (known limitation; the watch is not re-armed).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::WatchRegistration`] if the path does not exist
    /// or the OS notification facility cannot be initialized.
    pub fn watch(path: impl AsRef<Path>) -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|e| ServerError::WatchRegistration {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(SIGNAL_DEPTH);

        let event_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward_event(res, &event_tx);
        })
        .map_err(|e| ServerError::WatchRegistration {
            path: canonical.clone(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&canonical, RecursiveMode::NonRecursive)
            .map_err(|e| ServerError::WatchRegistration {
                path: canonical.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %canonical.display(), "watching file");

        // The first rebuild should not have to wait for an edit.
        let _ = tx.try_send(canonical.clone());

        Ok((
            Self {
                _watcher: tokio::sync::Mutex::new(watcher),
                path: canonical,
            },
            rx,
        ))
    }

    /// The canonicalized path under observation.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Filter one raw watcher result onto the reload signal channel.
///
/// Only data-modification events qualify. Watcher runtime errors are logged
/// and absorbed so a misbehaving watcher degrades reload capability without
/// taking the server down.
fn forward_event(res: notify::Result<Event>, tx: &mpsc::Sender<PathBuf>) {
    match res {
        Ok(event) if is_write(&event.kind) => {
            for path in event.paths {
                tracing::info!(path = %path.display(), "file changed, reload queued");
                if let Err(TrySendError::Full(path)) = tx.try_send(path) {
                    tracing::debug!(
                        path = %path.display(),
                        "reload already pending, coalescing change"
                    );
                }
            }
        }
        // Renames, chmod, and removals do not trigger reloads.
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "watcher error, subscription continues"),
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any))
}
