// Test helpers for virtual disk testing

use crate::fat16::{Disk, DiskGeometry};
use crate::fat_common::directory::DirectoryEntry;
use crate::fat_common::constants::DIRECTORY_ENTRY_SIZE;
use serialdisk_core::{DiskSettings, TosVersion};
use std::path::Path;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a disk of `disk_size_mib` over `local_directory` with default geometry
pub fn create_test_disk(local_directory: &Path, disk_size_mib: u32) -> Disk {
    init_logging();
    let settings = DiskSettings {
        disk_size_mib,
        tos_compatibility: TosVersion::Tos104,
        root_directory_sectors: 8,
    };
    Disk::new(&settings, local_directory).unwrap()
}

/// First sector of data cluster `cluster`
pub fn cluster_sector(geometry: &DiskGeometry, cluster: u16) -> u32 {
    geometry.first_data_sector() + (cluster as u32 - 2) * geometry.sectors_per_cluster
}

/// Whole root directory as the remote sees it
pub fn read_root(disk: &Disk) -> Vec<u8> {
    let g = disk.geometry();
    disk.read_sectors(g.root_directory_start_sector(), g.root_directory_sectors)
}

/// Root directory entry in slot `slot`
pub fn root_entry(disk: &Disk, slot: usize) -> DirectoryEntry {
    let root = read_root(disk);
    let offset = slot * DIRECTORY_ENTRY_SIZE;
    DirectoryEntry::parse(&root[offset..offset + DIRECTORY_ENTRY_SIZE])
}

/// Overwrite root directory slot `slot` through the sector interface
pub fn write_root_entry(disk: &mut Disk, slot: usize, entry: &DirectoryEntry) -> crate::fat16::SyncReport {
    let g = disk.geometry().clone();
    let bytes_per_sector = g.bytes_per_sector as usize;
    let sector = (slot * DIRECTORY_ENTRY_SIZE / bytes_per_sector) as u32;
    let mut data = disk.read_sectors(g.root_directory_start_sector() + sector, 1);
    let offset = slot * DIRECTORY_ENTRY_SIZE % bytes_per_sector;
    entry.encode(&mut data[offset..]);
    disk.write_sectors(data.len(), g.root_directory_start_sector() + sector, &data)
}
