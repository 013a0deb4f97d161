// FAT16 allocation table
// Single buffer behind both FAT copies the remote sees

use super::geometry::DiskGeometry;
use crate::fat_common::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;

/// Result of following a cluster chain from its start cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterChain {
    /// Chain ends in an end-of-file marker
    Complete(Vec<u16>),
    /// Chain hits a free, bad or out-of-range entry, or loops; the remote is
    /// probably still writing it
    Incomplete(Vec<u16>),
}

impl ClusterChain {
    pub fn clusters(&self) -> &[u16] {
        match self {
            ClusterChain::Complete(clusters) | ClusterChain::Incomplete(clusters) => clusters,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ClusterChain::Complete(_))
    }
}

pub fn is_end_of_file(value: u16) -> bool {
    value >= FAT16_EOF_FIRST
}

pub fn is_bad_cluster(value: u16) -> bool {
    (FAT16_BAD_FIRST..=FAT16_BAD_LAST).contains(&value)
}

#[derive(Debug, Clone)]
pub struct FatTable {
    data: Vec<u8>,
    bytes_per_sector: usize,
    cluster_limit: u32,
    last_allocated: u16,
}

impl FatTable {
    pub fn new(geometry: &DiskGeometry) -> Self {
        let mut table = Self {
            data: vec![0u8; geometry.fat_size_bytes()],
            bytes_per_sector: geometry.bytes_per_sector as usize,
            cluster_limit: geometry.cluster_limit(),
            last_allocated: FIRST_DATA_CLUSTER - 1,
        };

        // Reserved entries
        table.set_entry(0, FAT16_MEDIA_ENTRY);
        table.set_entry(1, FAT16_EOC);
        table
    }

    pub fn entry(&self, cluster: u16) -> u16 {
        let offset = cluster as usize * FAT_ENTRY_SIZE as usize;
        if offset + 2 > self.data.len() {
            return FAT16_FREE;
        }
        LittleEndian::read_u16(&self.data[offset..])
    }

    pub fn set_entry(&mut self, cluster: u16, value: u16) {
        let offset = cluster as usize * FAT_ENTRY_SIZE as usize;
        if offset + 2 <= self.data.len() {
            LittleEndian::write_u16(&mut self.data[offset..], value);
        }
    }

    /// Whether `cluster` addresses the data region.
    pub fn is_data_cluster(&self, cluster: u16) -> bool {
        cluster >= FIRST_DATA_CLUSTER && (cluster as u32) < self.cluster_limit
    }

    /// Scan forward from the last allocated cluster for a free entry,
    /// wrapping back to the first data cluster.
    pub fn next_free_index(&self) -> Option<u16> {
        let first = FIRST_DATA_CLUSTER as u32;
        let limit = self.cluster_limit;
        if limit <= first {
            return None;
        }

        let start = (self.last_allocated as u32 + 1).clamp(first, limit);
        (start..limit)
            .chain(first..start)
            .map(|cluster| cluster as u16)
            .find(|&cluster| self.entry(cluster) == FAT16_FREE)
    }

    /// Allocate the next free cluster, link `previous` to it (unless
    /// `previous` is the root marker 0) and mark it as end of chain.
    pub fn allocate_after(&mut self, previous: u16) -> Option<u16> {
        let cluster = self.next_free_index()?;

        if previous != ROOT_DIRECTORY_CLUSTER {
            self.set_entry(previous, cluster);
        }
        self.set_entry(cluster, FAT16_EOC);
        self.last_allocated = cluster;

        Some(cluster)
    }

    /// Follow the chain starting at `start`.
    pub fn chain(&self, start: u16) -> ClusterChain {
        let mut clusters = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;

        loop {
            if !self.is_data_cluster(current) || !visited.insert(current) {
                return ClusterChain::Incomplete(clusters);
            }
            clusters.push(current);

            let next = self.entry(current);
            if is_end_of_file(next) {
                return ClusterChain::Complete(clusters);
            }
            if next == FAT16_FREE || is_bad_cluster(next) {
                return ClusterChain::Incomplete(clusters);
            }
            current = next;
        }
    }

    /// Copy FAT sector `sector` (relative to the start of a FAT copy) into `out`.
    pub fn read_sector(&self, sector: usize, out: &mut [u8]) {
        let start = sector * self.bytes_per_sector;
        let len = out.len().min(self.bytes_per_sector);
        if let Some(source) = self.data.get(start..start + len) {
            out[..len].copy_from_slice(source);
        }
    }

    pub fn write_sector(&mut self, sector: usize, data: &[u8]) {
        let start = sector * self.bytes_per_sector;
        let len = data.len().min(self.bytes_per_sector);
        if let Some(target) = self.data.get_mut(start..start + len) {
            target.copy_from_slice(&data[..len]);
        }
    }
}
