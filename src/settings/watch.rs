//! Reload settings when their files change on disk.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::{ConfigError, Options};

use super::accessor::SettingsAccessor;

/// Messages handled by the reload loop.
#[derive(Debug)]
enum WatchMessage {
    /// A watched file changed, reload once things settle.
    Changed(PathBuf),
    /// Reload right away.
    Manual,
    Shutdown,
}

/// Watches an accessor's file sources and reloads it after changes.
///
/// Bursts of file events within `debounce` of each other cause a single
/// reload. A reload that fails keeps the previous settings and is logged.
/// Dropping the watcher stops it.
pub struct ConfigWatcher {
    tx: mpsc::Sender<WatchMessage>,
    handle: Option<JoinHandle<()>>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn spawn<T: Options>(
        accessor: Arc<SettingsAccessor<T>>,
        debounce: Duration,
    ) -> Result<Self, ConfigError> {
        let files = accessor.resolver().config().watched_paths();
        let names: BTreeSet<OsString> = files
            .iter()
            .filter_map(|path| path.file_name().map(OsString::from))
            .collect();

        let (tx, rx) = mpsc::channel();
        let watcher_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    for path in event.paths {
                        let watched = path.file_name().is_some_and(|name| names.contains(name));
                        if watched && watcher_tx.send(WatchMessage::Changed(path)).is_err() {
                            log::debug!("config watcher already stopped");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => log::error!("file watcher error: {e}"),
            }
        })?;

        for dir in watched_dirs(&files) {
            if dir.exists() {
                watcher.watch(&dir, RecursiveMode::NonRecursive)?;
                log::info!("watching for config changes in {}", dir.display());
            } else {
                log::warn!("not watching {}: directory does not exist", dir.display());
            }
        }

        let handle = thread::Builder::new()
            .name("config-watcher".into())
            .spawn(move || run_reload_loop(&accessor, &rx, debounce))
            .map_err(notify::Error::io)?;

        Ok(Self {
            tx,
            handle: Some(handle),
            _watcher: watcher,
        })
    }

    /// Requests an immediate reload.
    pub fn trigger(&self) {
        if self.tx.send(WatchMessage::Manual).is_err() {
            log::warn!("manual reload requested after the config watcher stopped");
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(WatchMessage::Shutdown);
            if handle.join().is_err() {
                log::error!("config watcher thread panicked");
            }
        }
    }
}

impl fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watched_dirs(files: &[PathBuf]) -> BTreeSet<PathBuf> {
    files
        .iter()
        .map(|file| match file.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
        .collect()
}

fn run_reload_loop<T: Options>(
    accessor: &SettingsAccessor<T>,
    rx: &mpsc::Receiver<WatchMessage>,
    debounce: Duration,
) {
    let mut pending = false;

    loop {
        let msg = if pending {
            rx.recv_timeout(debounce)
        } else {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };

        match msg {
            Ok(WatchMessage::Changed(path)) => {
                log::debug!("config change detected: {}", path.display());
                pending = true;
            }
            Ok(WatchMessage::Manual) => {
                log::info!("manual reload requested");
                perform_reload(accessor);
                pending = false;
            }
            Err(RecvTimeoutError::Timeout) => {
                perform_reload(accessor);
                pending = false;
            }
            Ok(WatchMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("config watcher shutting down");
                break;
            }
        }

        if accessor.is_shut_down() {
            log::info!("settings shut down, stopping config watcher");
            break;
        }
    }
}

// Failures are logged by the accessor.
fn perform_reload<T: Options>(accessor: &SettingsAccessor<T>) {
    if accessor.reload().is_ok() {
        log::debug!("config watcher reloaded {}", T::type_name());
    }
}
