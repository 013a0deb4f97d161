// FAT16 virtual disk - geometry, allocation table, cluster store, import and sync

pub mod cluster_store;
pub mod directory_index;
pub mod disk;
pub mod fat_table;
pub mod geometry;
pub mod import;
pub mod sync;


pub use cluster_store::{ClusterRecord, ClusterStore};
pub use directory_index::{DirectoryIndex, EntryKey, TrackedEntry};
pub use disk::{Disk, DiskImage, SectorLocation};
pub use fat_table::{ClusterChain, FatTable};
pub use geometry::DiskGeometry;
pub use sync::SyncReport;
