// Virtual FAT16 disk backed by a local directory
//
// Sector layout seen by the remote:
//   [FAT copy 1][FAT copy 2][root directory][data clusters 2..]
// Both FAT copies map onto the same table.

use super::cluster_store::ClusterStore;
use super::directory_index::{DirectoryIndex, TrackedEntry};
use super::fat_table::FatTable;
use super::geometry::DiskGeometry;
use super::import;
use super::sync::SyncReport;
use crate::fat_common::constants::*;
use crate::watcher::ChangeMonitor;
use log::{debug, info, trace, warn};
use serialdisk_core::{DiskSettings, SerialDiskResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything rebuilt by an import from the local directory.
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub fat: FatTable,
    pub root_directory: Vec<u8>,
    pub clusters: ClusterStore,
    pub index: DirectoryIndex,
}

impl DiskImage {
    pub fn new(geometry: &DiskGeometry) -> Self {
        Self {
            fat: FatTable::new(geometry),
            root_directory: vec![0u8; geometry.root_directory_bytes()],
            clusters: ClusterStore::new(geometry),
            index: DirectoryIndex::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorLocation {
    /// Sector within a FAT copy
    Fat { sector: u32 },
    /// Sector within the root directory buffer
    RootDirectory { sector: u32 },
    /// Sector `sector` of data cluster `cluster`
    Data { cluster: u16, sector: u32 },
    OutOfRange,
}

pub struct Disk {
    pub(crate) geometry: DiskGeometry,
    pub(crate) local_directory: PathBuf,
    pub(crate) image: DiskImage,
    pub(crate) monitor: Arc<ChangeMonitor>,
}

impl Disk {
    /// Build the disk and import the local directory. Sizing problems are
    /// reported before anything is allocated.
    pub fn new(settings: &DiskSettings, local_directory: &Path) -> SerialDiskResult<Self> {
        let geometry = DiskGeometry::calculate(
            settings.disk_size_mib,
            settings.tos_compatibility,
            settings.root_directory_sectors,
        )?;
        let local_directory = local_directory.canonicalize()?;

        info!(
            "Virtual disk: {} bytes/sector, {} clusters of {} bytes, {} sectors/FAT",
            geometry.bytes_per_sector, geometry.cluster_count, geometry.bytes_per_cluster, geometry.sectors_per_fat
        );

        let image = import::import_local_directory(&geometry, &local_directory)?;

        Ok(Self {
            geometry,
            local_directory,
            image,
            monitor: Arc::new(ChangeMonitor::new()),
        })
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn local_directory(&self) -> &Path {
        &self.local_directory
    }

    pub fn bios_parameter_block(&self) -> [u8; BIOS_PARAMETER_BLOCK_SIZE] {
        self.geometry.bios_parameter_block()
    }

    /// Shared with the filesystem watcher.
    pub fn monitor(&self) -> Arc<ChangeMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn take_media_changed(&self) -> bool {
        self.monitor.take_media_changed()
    }

    pub fn tracked_entries(&self) -> usize {
        self.image.index.len()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.image.index.iter().map(|(_, entry)| entry)
    }

    pub fn local_directory_size(&self) -> SerialDiskResult<u64> {
        Ok(import::directory_size(&self.local_directory)?)
    }

    /// Rebuild the image from the local directory. The current image is kept
    /// if the import fails.
    pub fn reimport(&mut self) -> SerialDiskResult<()> {
        let image = import::import_local_directory(&self.geometry, &self.local_directory)?;
        self.image = image;
        info!("Re-imported {}", self.local_directory.display());
        Ok(())
    }

    pub fn locate(&self, sector: u32) -> SectorLocation {
        let g = &self.geometry;

        if sector < g.fat_region_sectors() {
            SectorLocation::Fat { sector: sector % g.sectors_per_fat }
        } else if sector < g.first_data_sector() {
            SectorLocation::RootDirectory { sector: sector - g.root_directory_start_sector() }
        } else if sector < g.total_sectors() {
            // Clusters 0 and 1 do not exist in the data region
            let relative = sector - g.first_data_sector() + RESERVED_CLUSTERS * g.sectors_per_cluster;
            SectorLocation::Data {
                cluster: (relative / g.sectors_per_cluster) as u16,
                sector: relative % g.sectors_per_cluster,
            }
        } else {
            SectorLocation::OutOfRange
        }
    }

    /// Read `count` sectors starting at `start`.
    pub fn read_sectors(&self, start: u32, count: u32) -> Vec<u8> {
        let bytes_per_sector = self.geometry.bytes_per_sector as usize;
        let mut data = vec![0u8; count as usize * bytes_per_sector];

        for (i, out) in data.chunks_mut(bytes_per_sector).enumerate() {
            let sector = start + i as u32;

            match self.locate(sector) {
                SectorLocation::Fat { sector } => self.image.fat.read_sector(sector as usize, out),
                SectorLocation::RootDirectory { sector } => {
                    let offset = sector as usize * bytes_per_sector;
                    out.copy_from_slice(&self.image.root_directory[offset..offset + bytes_per_sector]);
                }
                SectorLocation::Data { cluster, sector: offset } => {
                    if let Err(e) = self.image.clusters.read_sector(cluster, offset as usize, out) {
                        warn!("Failed to read sector {} (cluster {}): {}", sector, cluster, e);
                    }
                }
                SectorLocation::OutOfRange => warn!("Read of sector {} outside the disk", sector),
            }
        }

        trace!("Read {} sectors from {}", count, start);
        data
    }

    /// Write `length` bytes of `data` starting at sector `start`, then mirror
    /// the affected directories onto the local directory.
    pub fn write_sectors(&mut self, length: usize, start: u32, data: &[u8]) -> SyncReport {
        let bytes_per_sector = self.geometry.bytes_per_sector as usize;
        let length = length.min(data.len());
        let sector_count = length.div_ceil(bytes_per_sector);

        let mut fat_touched = false;
        let mut root_touched = false;
        let mut directory_clusters = BTreeSet::new();
        let mut owned_files = BTreeSet::new();

        for i in 0..sector_count {
            let sector = start + i as u32;
            let chunk = &data[i * bytes_per_sector..((i + 1) * bytes_per_sector).min(length)];

            match self.locate(sector) {
                SectorLocation::Fat { sector } => {
                    trace!("Updating FAT sector {}", sector);
                    self.image.fat.write_sector(sector as usize, chunk);
                    fat_touched = true;
                }
                SectorLocation::RootDirectory { sector } => {
                    trace!("Updating root directory sector {}", sector);
                    let offset = sector as usize * bytes_per_sector;
                    self.image.root_directory[offset..offset + chunk.len()].copy_from_slice(chunk);
                    root_touched = true;
                }
                SectorLocation::Data { cluster, sector: offset } => {
                    trace!("Updating data sector {}, cluster {}", offset, cluster);
                    self.write_data_sector(cluster, offset as usize, chunk);

                    if self.image.clusters.is_directory(cluster) {
                        directory_clusters.insert(cluster);
                    } else if let Some(path) = self.image.clusters.path(cluster) {
                        owned_files.insert(path.to_path_buf());
                    }
                }
                SectorLocation::OutOfRange => warn!("Dropping write to sector {} outside the disk", sector),
            }
        }

        let mut report = SyncReport::default();
        if fat_touched {
            self.sync_directory(ROOT_DIRECTORY_CLUSTER, true, &mut report);
        } else {
            if root_touched {
                self.sync_directory(ROOT_DIRECTORY_CLUSTER, false, &mut report);
            }
            for cluster in directory_clusters {
                self.sync_directory(cluster, false, &mut report);
            }
        }
        for path in owned_files {
            self.refresh_file(&path, &mut report);
        }

        if !report.is_empty() {
            debug!("Sync after write at sector {}: {}", start, report);
        }
        report
    }

    fn write_data_sector(&mut self, cluster: u16, sector: usize, chunk: &[u8]) {
        // Continuation clusters of a tracked file inherit its path
        let inherited = match self.image.clusters.path(cluster) {
            Some(_) => None,
            None => self
                .image
                .index
                .iter()
                .map(|(_, entry)| entry)
                .find(|entry| entry.start_cluster != 0 && self.image.fat.entry(entry.start_cluster) == cluster)
                .map(|entry| entry.path.clone()),
        };

        if let Err(e) = self.image.clusters.write_sector(cluster, sector, chunk) {
            warn!("Failed to load cluster {} before writing: {}", cluster, e);
            return;
        }

        if let Some(path) = inherited {
            self.image.clusters.adopt(cluster, &path);
        }
    }
}
