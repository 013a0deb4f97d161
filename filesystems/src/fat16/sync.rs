// Virtual -> real synchronization
// Walks directory clusters written by the remote and replays entry changes on
// the local directory. Failures are per entry and never stop the walk.

use super::directory_index::{EntryKey, TrackedEntry};
use super::disk::Disk;
use super::fat_table::ClusterChain;
use crate::fat_common::constants::*;
use crate::fat_common::directory::DirectoryEntry;
use log::{debug, error, info, trace, warn};
use serialdisk_core::SerialDiskError;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// What a synchronization pass did to the local directory.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: Vec<PathBuf>,
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub deleted: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
    pub failures: Vec<SerialDiskError>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.renamed.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, source: io::Error) {
        error!("Failed to synchronise {}: {}", path.display(), source);
        self.failures.push(SerialDiskError::sync(path, source));
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} renamed, {} deleted, {} updated, {} failed",
            self.created.len(),
            self.renamed.len(),
            self.deleted.len(),
            self.updated.len(),
            self.failures.len()
        )
    }
}

/// Decoded name of a remote entry, if it is a single plain path component.
fn local_name(entry: &DirectoryEntry) -> Option<String> {
    let name = entry.short_name();
    let mut components = Path::new(&name).components();
    let plain = !name.contains(['/', '\\', '\0'])
        && matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));

    if plain {
        Some(name)
    } else {
        warn!("Ignoring directory entry with unusable name {:?}", name);
        None
    }
}

/// Outcome of assembling a file from its cluster chain.
enum FileContents {
    Ready(Vec<u8>),
    /// The chain does not yet cover the declared size
    Pending,
}

impl Disk {
    /// Synchronize the directory held by `cluster` (0 = root).
    pub fn sync_directory(&mut self, cluster: u16, recursive: bool, report: &mut SyncReport) {
        let mut visited = HashSet::new();
        self.sync_directory_inner(cluster, recursive, report, &mut visited);
    }

    fn sync_directory_inner(
        &mut self,
        start: u16,
        recursive: bool,
        report: &mut SyncReport,
        visited: &mut HashSet<u16>,
    ) {
        let directory_path = if start == ROOT_DIRECTORY_CLUSTER {
            self.local_directory.clone()
        } else {
            match self.image.clusters.get(start) {
                Some(record) if record.is_directory() => match record.path() {
                    Some(path) => path.to_path_buf(),
                    None => return,
                },
                _ => return,
            }
        };

        let clusters = if start == ROOT_DIRECTORY_CLUSTER {
            vec![ROOT_DIRECTORY_CLUSTER]
        } else {
            self.image.fat.chain(start).clusters().to_vec()
        };

        for cluster in clusters {
            if !visited.insert(cluster) {
                return;
            }
            trace!("Updating cluster {}", cluster);

            // Continuation clusters added by the remote belong to the same directory
            if cluster != ROOT_DIRECTORY_CLUSTER && !self.image.clusters.is_directory(cluster) {
                if let Err(e) = self.image.clusters.mark_directory(cluster, directory_path.clone()) {
                    report.fail(&directory_path, e);
                    return;
                }
            }

            let length = match self.directory_buffer(cluster) {
                Some(buffer) => buffer.len(),
                None => return,
            };

            for offset in (0..length).step_by(DIRECTORY_ENTRY_SIZE) {
                let entry = match self.directory_buffer(cluster) {
                    Some(buffer) => DirectoryEntry::parse(&buffer[offset..offset + DIRECTORY_ENTRY_SIZE]),
                    None => return,
                };

                if entry.is_end_marker() {
                    return;
                }
                if entry.is_dot_entry() || entry.is_volume_label() {
                    continue;
                }

                let key = (cluster, offset);
                self.sync_entry(key, &entry, &directory_path, report);

                if recursive
                    && entry.is_directory()
                    && !entry.is_deleted()
                    && self.image.index.get(key).is_some()
                    && !visited.contains(&entry.start_cluster)
                {
                    self.sync_directory_inner(entry.start_cluster, true, report, visited);
                }
            }
        }
    }

    fn directory_buffer(&self, cluster: u16) -> Option<&[u8]> {
        if cluster == ROOT_DIRECTORY_CLUSTER {
            Some(&self.image.root_directory)
        } else {
            self.image.clusters.buffer(cluster)
        }
    }

    fn sync_entry(&mut self, key: EntryKey, entry: &DirectoryEntry, parent: &Path, report: &mut SyncReport) {
        let Some(mut tracked) = self.image.index.get(key).cloned() else {
            if !entry.is_deleted() {
                self.create_local(key, entry, parent, report);
            }
            return;
        };

        if entry.is_deleted() {
            self.delete_local(key, &tracked, report);
            return;
        }

        // Slot reused for a different kind of entry
        if entry.is_directory() != tracked.is_directory {
            if self.delete_local(key, &tracked, report) {
                self.create_local(key, entry, parent, report);
            }
            return;
        }

        let short_name = entry.short_name();
        if short_name != tracked.short_name {
            let Some(short_name) = local_name(entry) else {
                return;
            };
            let new_path = parent.join(&short_name);
            match self.rename_local(&tracked.path, &new_path) {
                Ok(()) => {
                    report.renamed.push((tracked.path.clone(), new_path.clone()));
                    tracked.path = new_path;
                    tracked.short_name = short_name;
                    self.image.index.insert(key, tracked.clone());
                }
                Err(e) => {
                    report.fail(&tracked.path, e);
                    return;
                }
            }
        }

        if !tracked.is_directory && (entry.start_cluster, entry.file_size) != (tracked.start_cluster, tracked.file_size) {
            match self.write_local_file(&tracked.path, entry.start_cluster, entry.file_size) {
                Ok(true) => {
                    tracked.start_cluster = entry.start_cluster;
                    tracked.file_size = entry.file_size;
                    self.image.index.insert(key, tracked.clone());
                    report.updated.push(tracked.path);
                }
                Ok(false) => trace!("{} is still being written", tracked.path.display()),
                Err(e) => report.fail(&tracked.path, e),
            }
        }
    }

    fn create_local(&mut self, key: EntryKey, entry: &DirectoryEntry, parent: &Path, report: &mut SyncReport) {
        let Some(short_name) = local_name(entry) else {
            return;
        };
        let path = parent.join(&short_name);

        if entry.is_directory() {
            if !self.image.fat.is_data_cluster(entry.start_cluster) {
                return;
            }

            info!("Creating local directory \"{}\"", path.display());
            self.monitor.suppress(&path);
            let result = fs::create_dir_all(&path)
                .and_then(|_| self.image.clusters.mark_directory(entry.start_cluster, path.clone()));
            if let Err(e) = result {
                report.fail(&path, e);
                return;
            }
        } else {
            if entry.file_size > 0 && entry.start_cluster == 0 {
                return;
            }

            match self.write_local_file(&path, entry.start_cluster, entry.file_size) {
                Ok(true) => info!("Created local file \"{}\" ({} bytes)", path.display(), entry.file_size),
                Ok(false) => {
                    trace!("{} is still being written", path.display());
                    return;
                }
                Err(e) => {
                    report.fail(&path, e);
                    return;
                }
            }
        }

        self.image.index.insert(
            key,
            TrackedEntry {
                path: path.clone(),
                short_name,
                start_cluster: entry.start_cluster,
                file_size: entry.file_size,
                is_directory: entry.is_directory(),
            },
        );
        report.created.push(path);
    }

    /// Returns whether the local side is gone.
    fn delete_local(&mut self, key: EntryKey, tracked: &TrackedEntry, report: &mut SyncReport) -> bool {
        let path = &tracked.path;
        self.monitor.suppress(path);

        let result = if tracked.is_directory {
            info!("Deleting local directory \"{}\"", path.display());
            fs::remove_dir_all(path)
        } else {
            info!("Deleting local file \"{}\"", path.display());
            fs::remove_file(path)
        };

        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                report.fail(path, e);
                false
            }
            _ => {
                self.image.index.remove(key);
                if tracked.is_directory {
                    self.image.index.remove_under(path);
                }
                self.image.clusters.clear_tags(path);
                report.deleted.push(path.clone());
                true
            }
        }
    }

    fn rename_local(&mut self, old: &Path, new: &Path) -> io::Result<()> {
        info!("Renaming \"{}\" to \"{}\"", old.display(), new.display());
        self.monitor.suppress(old);
        self.monitor.suppress(new);

        fs::rename(old, new)?;
        self.image.index.rename_prefix(old, new);
        self.image.clusters.rename_prefix(old, new);
        Ok(())
    }

    /// Write the file described by (`start_cluster`, `file_size`) to `path`.
    /// Returns `Ok(false)` if the chain is not complete yet.
    fn write_local_file(&mut self, path: &Path, start_cluster: u16, file_size: u32) -> io::Result<bool> {
        let contents = match self.collect_file(start_cluster, file_size)? {
            FileContents::Ready(contents) => contents,
            FileContents::Pending => return Ok(false),
        };

        self.monitor.suppress(path);
        let mut file = File::create(path)?;
        file.write_all(&contents)?;
        file.flush()?;

        // Attribute the chain to the file it now backs
        if start_cluster != 0 {
            let bytes_per_cluster = self.geometry.bytes_per_cluster as u64;
            let chain = self.image.fat.chain(start_cluster);
            for (k, cluster) in chain.clusters().iter().enumerate() {
                self.image.clusters.link_to_file(*cluster, path, k as u64 * bytes_per_cluster);
            }
        }

        Ok(true)
    }

    fn collect_file(&self, start_cluster: u16, file_size: u32) -> io::Result<FileContents> {
        if file_size == 0 {
            return Ok(FileContents::Ready(Vec::new()));
        }

        let clusters = match self.image.fat.chain(start_cluster) {
            ClusterChain::Complete(clusters) => clusters,
            ClusterChain::Incomplete(_) => return Ok(FileContents::Pending),
        };

        let size = file_size as usize;
        if clusters.len() * (self.geometry.bytes_per_cluster as usize) < size {
            return Ok(FileContents::Pending);
        }

        let mut contents = Vec::with_capacity(size);
        for cluster in clusters {
            if contents.len() >= size {
                break;
            }
            contents.extend_from_slice(&self.image.clusters.cluster_bytes(cluster)?);
        }
        contents.truncate(size);

        Ok(FileContents::Ready(contents))
    }

    /// Rewrite a tracked file whose clusters were overwritten in place.
    pub(crate) fn refresh_file(&mut self, path: &Path, report: &mut SyncReport) {
        let Some(tracked) = self
            .image
            .index
            .iter()
            .map(|(_, entry)| entry)
            .find(|entry| !entry.is_directory && entry.path == path)
            .cloned()
        else {
            return;
        };

        if report.created.contains(&tracked.path) || report.updated.contains(&tracked.path) {
            return;
        }

        match self.write_local_file(&tracked.path, tracked.start_cluster, tracked.file_size) {
            Ok(true) => {
                debug!("Refreshed \"{}\"", tracked.path.display());
                report.updated.push(tracked.path);
            }
            Ok(false) => {}
            Err(e) => report.fail(&tracked.path, e),
        }
    }
}
