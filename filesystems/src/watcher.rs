// Local directory change detection
// The watcher only raises a flag; the protocol loop re-imports between exchanges

use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serialdisk_core::{SerialDiskError, SerialDiskResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(2);

/// Shared between the disk engine and the filesystem watcher thread.
#[derive(Debug)]
pub struct ChangeMonitor {
    media_changed: AtomicBool,
    suppressed: Mutex<Vec<(PathBuf, Instant)>>,
    window: Duration,
}

impl Default for ChangeMonitor {
    fn default() -> Self {
        Self::with_window(DEFAULT_SUPPRESSION_WINDOW)
    }
}

impl ChangeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            media_changed: AtomicBool::new(false),
            suppressed: Mutex::new(Vec::new()),
            window,
        }
    }

    /// Ignore notifications for `path` (and below) caused by our own mutation.
    pub fn suppress(&self, path: &Path) {
        let mut suppressed = self.suppressed.lock().unwrap_or_else(|e| e.into_inner());
        suppressed.push((path.to_path_buf(), Instant::now()));
    }

    pub fn is_suppressed(&self, path: &Path) -> bool {
        let mut suppressed = self.suppressed.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;
        suppressed.retain(|(_, at)| at.elapsed() <= window);

        suppressed
            .iter()
            .any(|(own, _)| path.starts_with(own) || own.parent() == Some(path))
    }

    /// Record an external change. Returns whether the flag was raised.
    pub fn notify_change(&self, paths: &[PathBuf]) -> bool {
        let external = paths.is_empty() || paths.iter().any(|path| !self.is_suppressed(path));
        if external {
            debug!("Local change detected: {:?}", paths);
            self.set_media_changed();
        }
        external
    }

    pub fn set_media_changed(&self) {
        self.media_changed.store(true, Ordering::SeqCst);
    }

    pub fn media_changed(&self) -> bool {
        self.media_changed.load(Ordering::SeqCst)
    }

    /// Read and clear the flag.
    pub fn take_media_changed(&self) -> bool {
        self.media_changed.swap(false, Ordering::SeqCst)
    }
}

/// Recursive watch on the local directory, alive as long as this value is.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl DirectoryWatcher {
    pub fn start(path: &Path, monitor: Arc<ChangeMonitor>) -> SerialDiskResult<Self> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Access(_)) {
                    monitor.notify_change(&event.paths);
                }
            }
            Err(e) => warn!("Filesystem watcher error: {}", e),
        })
        .map_err(|e| SerialDiskError::Watch(e.to_string()))?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| SerialDiskError::Watch(format!("{}: {}", path.display(), e)))?;

        debug!("Watching {} for changes", path.display());
        Ok(Self { _watcher: watcher, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
