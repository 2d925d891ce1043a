//! Reads the collector config from disk and watches it for changes.
//!
//! Mirrors the original's `fsnotify`-based watcher: load once, invoke the
//! callback synchronously, then keep invoking it — serialized, in change
//! order — every time the file is rewritten and still parses. A parse
//! failure on a later change is logged and swallowed; the previously loaded
//! config remains in effect (spec §4.4).

use std::future::Future;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{CollectorError, Result};

use super::CollectorConfig;

/// Owns the filesystem watcher for as long as the collector should keep
/// reloading config. Dropping it stops the watch.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher").finish_non_exhaustive()
    }
}

fn load_config(path: &Path) -> Result<CollectorConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: CollectorConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

impl ConfigWatcher {
    /// Loads `path`, invokes `callback` once synchronously, then starts
    /// watching `path` for changes — invoking `callback` again (serialized,
    /// one at a time) on every change that parses successfully.
    ///
    /// The initial load is fatal: a parse or read error here propagates to
    /// the caller (spec §7: `ConfigParseError` is fatal only at initial
    /// load). Errors on later changes are logged, not propagated.
    pub async fn watch<F, Fut>(path: impl AsRef<Path>, mut callback: F) -> Result<Self>
    where
        F: FnMut(CollectorConfig) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let path: PathBuf = path.as_ref().to_path_buf();
        let initial = load_config(&path)?;
        callback(initial).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| CollectorError::Io(std::io::Error::other(e)))?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| CollectorError::Io(std::io::Error::other(e)))?;

        let watch_path = path.clone();
        tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) if is_relevant(&event.kind) => {
                        tracing::info!(path = %watch_path.display(), "config file changed");
                        match load_config(&watch_path) {
                            Ok(cfg) => callback(cfg).await,
                            Err(e) => tracing::warn!(
                                path = %watch_path.display(),
                                error = %e,
                                "config reload failed, keeping previous config"
                            ),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "config watcher error"),
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}
