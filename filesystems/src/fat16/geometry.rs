// Geometry of the virtual FAT16 disk
// Derived once from the requested disk size and the TOS compatibility tier

use crate::fat_common::constants::*;
use byteorder::{BigEndian, ByteOrder};
use serialdisk_core::{SerialDiskError, SerialDiskResult, TosVersion, BYTES_PER_MIB};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub root_directory_sectors: u32,
    pub sectors_per_fat: u32,
    pub cluster_count: u32,
    pub tos_compatibility: TosVersion,
    pub disk_size_bytes: u64,
}

impl DiskGeometry {
    /// Choose the smallest sector size whose cluster count fits the tier.
    pub fn calculate(
        disk_size_mib: u32,
        tos_compatibility: TosVersion,
        root_directory_sectors: u32,
    ) -> SerialDiskResult<Self> {
        let max_clusters = tos_compatibility.max_disk_clusters() as u64;
        let disk_size_bytes = disk_size_mib as u64 * BYTES_PER_MIB;
        let max_disk_size_bytes = Self::max_disk_size_bytes(tos_compatibility);

        if disk_size_bytes > max_disk_size_bytes {
            return Err(SerialDiskError::DiskTooLarge {
                requested_mib: disk_size_mib,
                max_mib: max_disk_size_bytes / BYTES_PER_MIB,
            });
        }

        if disk_size_mib == 0 {
            return Err(SerialDiskError::Configuration(
                "Disk size must be at least 1MiB".to_string(),
            ));
        }

        let bytes_per_sector = SECTOR_SIZES
            .iter()
            .copied()
            .find(|&size| {
                disk_size_bytes / (size * SECTORS_PER_CLUSTER) as u64 <= max_clusters + 1
            })
            .unwrap_or(MAX_SECTOR_SIZE);

        let bytes_per_cluster = bytes_per_sector * SECTORS_PER_CLUSTER;
        let cluster_count = (disk_size_bytes / bytes_per_cluster as u64).min(max_clusters) as u32;
        let fat_entries_per_sector = bytes_per_sector / FAT_ENTRY_SIZE;
        let sectors_per_fat = cluster_count.div_ceil(fat_entries_per_sector);

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            bytes_per_cluster,
            root_directory_sectors,
            sectors_per_fat,
            cluster_count,
            tos_compatibility,
            disk_size_bytes,
        })
    }

    /// Largest disk the tier can address with 8KiB sectors.
    pub fn max_disk_size_bytes(tos_compatibility: TosVersion) -> u64 {
        (tos_compatibility.max_disk_clusters() as u64 + 1)
            * MAX_SECTOR_SIZE as u64
            * SECTORS_PER_CLUSTER as u64
    }

    /// Both FAT copies.
    pub fn fat_region_sectors(&self) -> u32 {
        self.sectors_per_fat * 2
    }

    pub fn root_directory_start_sector(&self) -> u32 {
        self.fat_region_sectors()
    }

    pub fn first_data_sector(&self) -> u32 {
        self.fat_region_sectors() + self.root_directory_sectors
    }

    pub fn total_sectors(&self) -> u32 {
        self.first_data_sector() + self.cluster_count * self.sectors_per_cluster
    }

    pub fn fat_size_bytes(&self) -> usize {
        (self.sectors_per_fat * self.bytes_per_sector) as usize
    }

    /// Number of 16-bit entries the FAT buffer can hold.
    pub fn fat_entry_count(&self) -> u32 {
        self.sectors_per_fat * self.bytes_per_sector / FAT_ENTRY_SIZE
    }

    pub fn root_directory_bytes(&self) -> usize {
        (self.root_directory_sectors * self.bytes_per_sector) as usize
    }

    /// Top-level entries accepted at import, leaving room for the end marker.
    pub fn max_root_directory_entries(&self) -> usize {
        (self.root_directory_bytes() / DIRECTORY_ENTRY_SIZE).saturating_sub(2)
    }

    /// Cluster indices past the last allocatable one.
    pub fn cluster_limit(&self) -> u32 {
        (self.cluster_count + RESERVED_CLUSTERS).min(self.fat_entry_count())
    }

    pub fn bios_parameter_block(&self) -> [u8; BIOS_PARAMETER_BLOCK_SIZE] {
        let mut bpb = [0u8; BIOS_PARAMETER_BLOCK_SIZE];
        let fields = [
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.bytes_per_cluster,
            self.root_directory_sectors,
            self.sectors_per_fat,
            self.sectors_per_fat,
            self.first_data_sector(),
            self.cluster_count,
        ];

        for (i, field) in fields.iter().enumerate() {
            BigEndian::write_u16(&mut bpb[i * 2..], *field as u16);
        }
        bpb[16] = 0x00;
        bpb[17] = 0x01;

        bpb
    }
}
