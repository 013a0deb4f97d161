// Virtual FAT16 disk engine
// Presents a local directory as a sector addressable FAT16 disk and mirrors
// remote writes back onto the local directory.

pub mod fat16;
pub mod fat_common;
pub mod watcher;

#[cfg(test)]
pub mod test_helpers;

pub use fat16::{Disk, DiskGeometry, SectorLocation, SyncReport, TrackedEntry};
pub use watcher::{ChangeMonitor, DirectoryWatcher};
