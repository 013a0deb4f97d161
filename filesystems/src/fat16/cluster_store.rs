// Per-cluster backing records for the data region
// Clusters are either served from memory or lazily from the real file they were imported from

use super::geometry::DiskGeometry;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRecord {
    /// Never touched; reads as zeros
    Unallocated,
    /// File data not yet loaded: `bytes_per_cluster` bytes of `path` at `offset`
    Lazy { path: PathBuf, offset: u64 },
    /// Materialized file data, optionally attributed to a real file
    Data { buffer: Vec<u8>, owner: Option<PathBuf> },
    /// Directory entries of the real directory `path`
    Directory { buffer: Vec<u8>, path: PathBuf },
}

impl ClusterRecord {
    /// Real path this cluster belongs to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ClusterRecord::Lazy { path, .. } | ClusterRecord::Directory { path, .. } => Some(path),
            ClusterRecord::Data { owner, .. } => owner.as_deref(),
            ClusterRecord::Unallocated => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ClusterRecord::Directory { .. })
    }
}

/// Read from `reader` until `buf` is full or EOF; returns the bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_file_range(path: &Path, offset: u64, out: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    read_up_to(&mut file, out)
}

/// Arena of cluster records indexed by cluster number.
#[derive(Debug, Clone)]
pub struct ClusterStore {
    records: Vec<ClusterRecord>,
    bytes_per_cluster: usize,
    bytes_per_sector: usize,
}

impl ClusterStore {
    pub fn new(geometry: &DiskGeometry) -> Self {
        Self {
            records: vec![ClusterRecord::Unallocated; geometry.cluster_limit() as usize],
            bytes_per_cluster: geometry.bytes_per_cluster as usize,
            bytes_per_sector: geometry.bytes_per_sector as usize,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, cluster: u16) -> Option<&ClusterRecord> {
        self.records.get(cluster as usize)
    }

    pub fn set(&mut self, cluster: u16, record: ClusterRecord) {
        if let Some(slot) = self.records.get_mut(cluster as usize) {
            *slot = record;
        }
    }

    pub fn empty_buffer(&self) -> Vec<u8> {
        vec![0u8; self.bytes_per_cluster]
    }

    /// Copy sector `sector` of `cluster` into `out`. Bytes past the end of a
    /// lazily referenced file are left untouched.
    pub fn read_sector(&self, cluster: u16, sector: usize, out: &mut [u8]) -> io::Result<()> {
        let start = sector * self.bytes_per_sector;
        let len = out.len().min(self.bytes_per_sector);

        match self.get(cluster) {
            None | Some(ClusterRecord::Unallocated) => {}
            Some(ClusterRecord::Lazy { path, offset }) => {
                read_file_range(path, offset + start as u64, &mut out[..len])?;
            }
            Some(ClusterRecord::Data { buffer, .. }) | Some(ClusterRecord::Directory { buffer, .. }) => {
                out[..len].copy_from_slice(&buffer[start..start + len]);
            }
        }

        Ok(())
    }

    /// Copy `data` into sector `sector` of `cluster`, materializing it first.
    pub fn write_sector(&mut self, cluster: u16, sector: usize, data: &[u8]) -> io::Result<()> {
        let start = sector * self.bytes_per_sector;
        let len = data.len().min(self.bytes_per_sector);

        if let Some(buffer) = self.materialize(cluster)? {
            buffer[start..start + len].copy_from_slice(&data[..len]);
        }
        Ok(())
    }

    /// Load an unallocated or lazy cluster into memory, keeping its path as
    /// owner. Returns the cluster's buffer.
    pub fn materialize(&mut self, cluster: u16) -> io::Result<Option<&mut Vec<u8>>> {
        let bytes_per_cluster = self.bytes_per_cluster;
        let Some(record) = self.records.get_mut(cluster as usize) else {
            return Ok(None);
        };

        match record {
            ClusterRecord::Unallocated => {
                *record = ClusterRecord::Data { buffer: vec![0u8; bytes_per_cluster], owner: None };
            }
            ClusterRecord::Lazy { path, offset } => {
                let mut buffer = vec![0u8; bytes_per_cluster];
                // A vanished file leaves the cluster zeroed
                match read_file_range(path, *offset, &mut buffer) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                    _ => {}
                }
                let owner = Some(std::mem::take(path));
                *record = ClusterRecord::Data { buffer, owner };
            }
            _ => {}
        }

        Ok(match record {
            ClusterRecord::Data { buffer, .. } | ClusterRecord::Directory { buffer, .. } => Some(buffer),
            _ => None,
        })
    }

    /// Whole cluster contents, loading lazy clusters from disk.
    pub fn cluster_bytes(&self, cluster: u16) -> io::Result<Vec<u8>> {
        let mut out = self.empty_buffer();
        match self.get(cluster) {
            Some(ClusterRecord::Lazy { path, offset }) => {
                read_file_range(path, *offset, &mut out)?;
            }
            Some(ClusterRecord::Data { buffer, .. }) | Some(ClusterRecord::Directory { buffer, .. }) => {
                out.copy_from_slice(buffer);
            }
            _ => {}
        }
        Ok(out)
    }

    /// Directory entry bytes held by `cluster`, if it is in memory.
    pub fn buffer(&self, cluster: u16) -> Option<&[u8]> {
        match self.get(cluster)? {
            ClusterRecord::Data { buffer, .. } | ClusterRecord::Directory { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn buffer_mut(&mut self, cluster: u16) -> Option<&mut Vec<u8>> {
        match self.records.get_mut(cluster as usize)? {
            ClusterRecord::Data { buffer, .. } | ClusterRecord::Directory { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn path(&self, cluster: u16) -> Option<&Path> {
        self.get(cluster)?.path()
    }

    pub fn is_directory(&self, cluster: u16) -> bool {
        self.get(cluster).is_some_and(ClusterRecord::is_directory)
    }

    /// Tag `cluster` as holding the entries of the real directory `path`.
    pub fn mark_directory(&mut self, cluster: u16, path: PathBuf) -> io::Result<()> {
        let buffer = match self.materialize(cluster)? {
            Some(buffer) => std::mem::take(buffer),
            None => return Ok(()),
        };
        self.set(cluster, ClusterRecord::Directory { buffer, path });
        Ok(())
    }

    /// Attribute an in-memory data cluster with no owner to `path`.
    pub fn adopt(&mut self, cluster: u16, path: &Path) {
        if let Some(ClusterRecord::Data { owner: owner @ None, .. }) = self.records.get_mut(cluster as usize) {
            *owner = Some(path.to_path_buf());
        }
    }

    /// Point `cluster` at the real file it was just written to. In-memory
    /// clusters keep their buffer, which may hold bytes past the end of the file.
    pub fn link_to_file(&mut self, cluster: u16, path: &Path, offset: u64) {
        match self.records.get_mut(cluster as usize) {
            Some(ClusterRecord::Data { owner, .. }) => *owner = Some(path.to_path_buf()),
            Some(ClusterRecord::Directory { .. }) | None => {}
            Some(record) => *record = ClusterRecord::Lazy { path: path.to_path_buf(), offset },
        }
    }

    /// Rewrite every path under `old` to live under `new`.
    pub fn rename_prefix(&mut self, old: &Path, new: &Path) {
        for record in &mut self.records {
            let path = match record {
                ClusterRecord::Lazy { path, .. } | ClusterRecord::Directory { path, .. } => path,
                ClusterRecord::Data { owner: Some(path), .. } => path,
                _ => continue,
            };
            if let Ok(rest) = path.strip_prefix(old) {
                *path = new.join(rest);
            }
        }
    }

    /// Drop tags of every cluster under `path` after it was deleted.
    pub fn clear_tags(&mut self, path: &Path) {
        for record in &mut self.records {
            if !record.path().is_some_and(|p| p.starts_with(path)) {
                continue;
            }
            *record = match std::mem::replace(record, ClusterRecord::Unallocated) {
                ClusterRecord::Lazy { .. } | ClusterRecord::Unallocated => ClusterRecord::Unallocated,
                ClusterRecord::Data { buffer, .. } | ClusterRecord::Directory { buffer, .. } => {
                    ClusterRecord::Data { buffer, owner: None }
                }
            };
        }
    }
}
