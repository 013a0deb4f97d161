// Local -> virtual import
// Builds a fresh disk image from the local directory tree. File contents stay
// on disk; clusters only remember where to read them from.

use super::cluster_store::ClusterRecord;
use super::directory_index::{EntryKey, TrackedEntry};
use super::disk::DiskImage;
use super::geometry::DiskGeometry;
use crate::fat_common::constants::*;
use crate::fat_common::directory::{attributes::*, DirectoryEntry};
use crate::fat_common::short_names::ShortNameSet;
use crate::fat_common::timestamps::system_time_to_fat_datetime;
use log::{debug, info, warn};
use serialdisk_core::{SerialDiskError, SerialDiskResult, BYTES_PER_MIB};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

// 1980-01-01 00:00
const DEFAULT_FAT_DATETIME: (u16, u16) = ((1 << 5) | 1, 0);

/// Total size in bytes of all files below `path`.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = fs::metadata(entry.path())?;
        total += if metadata.is_dir() {
            directory_size(&entry.path())?
        } else {
            metadata.len()
        };
    }
    Ok(total)
}

/// Check the local directory fits the virtual disk.
pub fn validate_local_directory(geometry: &DiskGeometry, local_directory: &Path) -> SerialDiskResult<u64> {
    let local_size = directory_size(local_directory)?;
    let max_size = DiskGeometry::max_disk_size_bytes(geometry.tos_compatibility);

    if local_size > max_size {
        return Err(SerialDiskError::LocalDirectoryExceedsMaximum {
            local_mib: local_size / BYTES_PER_MIB,
            max_mib: max_size / BYTES_PER_MIB,
        });
    }

    if local_size > geometry.disk_size_bytes {
        return Err(SerialDiskError::LocalDirectoryTooLarge {
            local_mib: local_size / BYTES_PER_MIB,
            disk_mib: geometry.disk_size_bytes / BYTES_PER_MIB,
        });
    }

    let entries = fs::read_dir(local_directory)?.count();
    let max_entries = geometry.max_root_directory_entries();
    if entries > max_entries {
        return Err(SerialDiskError::RootDirectoryFull { entries, max_entries });
    }

    Ok(local_size)
}

/// Validate and import `local_directory` into a new image.
pub fn import_local_directory(geometry: &DiskGeometry, local_directory: &Path) -> SerialDiskResult<DiskImage> {
    let local_size = validate_local_directory(geometry, local_directory)?;
    info!("Importing local directory contents from {}", local_directory.display());

    let mut importer = Importer {
        geometry,
        image: DiskImage::new(geometry),
        local_size,
    };
    importer.import_directory(local_directory, ROOT_DIRECTORY_CLUSTER)?;

    info!(
        "Imported {} entries ({} bytes)",
        importer.image.index.len(),
        local_size
    );
    Ok(importer.image)
}

struct LocalEntry {
    path: PathBuf,
    name: String,
    metadata: Metadata,
}

fn sorted_entries(directory: &Path) -> io::Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        match fs::metadata(&path) {
            Ok(metadata) => entries.push(LocalEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                metadata,
            }),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn write_datetime(metadata: &Metadata) -> (u16, u16) {
    metadata
        .modified()
        .map(system_time_to_fat_datetime)
        .unwrap_or(DEFAULT_FAT_DATETIME)
}

struct Importer<'a> {
    geometry: &'a DiskGeometry,
    image: DiskImage,
    local_size: u64,
}

impl Importer<'_> {
    fn exhausted(&self) -> SerialDiskError {
        SerialDiskError::FatExhausted {
            local_mib: self.local_size / BYTES_PER_MIB,
            disk_mib: self.geometry.disk_size_bytes / BYTES_PER_MIB,
        }
    }

    fn allocate(&mut self, previous: u16) -> SerialDiskResult<u16> {
        self.image.fat.allocate_after(previous).ok_or_else(|| self.exhausted())
    }

    /// Import the contents of `directory` into the directory at `cluster`.
    fn import_directory(&mut self, directory: &Path, cluster: u16) -> SerialDiskResult<()> {
        let mut names = ShortNameSet::new();
        let entries = sorted_entries(directory)?;

        // Directories first, then files
        for entry in entries.iter().filter(|e| e.metadata.is_dir()) {
            let short_name = names.claim(&entry.name);
            let datetime = write_datetime(&entry.metadata);
            let child = self.allocate(ROOT_DIRECTORY_CLUSTER)?;

            let mut buffer = vec![0u8; self.geometry.bytes_per_cluster as usize];
            DirectoryEntry::new(".", ATTR_DIRECTORY, datetime, child, 0).encode(&mut buffer[0..]);
            DirectoryEntry::new("..", ATTR_DIRECTORY, datetime, cluster, 0)
                .encode(&mut buffer[DIRECTORY_ENTRY_SIZE..]);
            self.image.clusters.set(
                child,
                ClusterRecord::Directory { buffer, path: entry.path.clone() },
            );

            let record = DirectoryEntry::new(&short_name, ATTR_DIRECTORY, datetime, child, 0);
            let key = self.add_entry(cluster, directory, &record)?;
            self.track(key, entry, short_name, child, 0, true);

            debug!("Imported directory {} as {} (cluster {})", entry.path.display(), record.short_name(), child);
            self.import_directory(&entry.path, child)?;
        }

        for entry in entries.iter().filter(|e| !e.metadata.is_dir()) {
            let short_name = names.claim(&entry.name);
            let file_size = entry.metadata.len() as u32;
            let start_cluster = self.allocate_file(&entry.path, entry.metadata.len())?;

            let record = DirectoryEntry::new(
                &short_name,
                ATTR_FILE,
                write_datetime(&entry.metadata),
                start_cluster,
                file_size,
            );
            let key = self.add_entry(cluster, directory, &record)?;
            self.track(key, entry, short_name, start_cluster, file_size, false);

            debug!("Imported file {} as {} ({} bytes)", entry.path.display(), record.short_name(), file_size);
        }

        Ok(())
    }

    /// Chain of lazy clusters covering the file; 0 for an empty file.
    fn allocate_file(&mut self, path: &Path, size: u64) -> SerialDiskResult<u16> {
        let bytes_per_cluster = self.geometry.bytes_per_cluster as u64;
        let mut start_cluster = 0;
        let mut previous = ROOT_DIRECTORY_CLUSTER;

        for k in 0..size.div_ceil(bytes_per_cluster) {
            let cluster = self.allocate(previous)?;
            if start_cluster == 0 {
                start_cluster = cluster;
            }
            self.image.clusters.set(
                cluster,
                ClusterRecord::Lazy { path: path.to_path_buf(), offset: k * bytes_per_cluster },
            );
            previous = cluster;
        }

        Ok(start_cluster)
    }

    fn track(&mut self, key: EntryKey, entry: &LocalEntry, short_name: String, start_cluster: u16, file_size: u32, is_directory: bool) {
        self.image.index.insert(
            key,
            TrackedEntry {
                path: entry.path.clone(),
                short_name,
                start_cluster,
                file_size,
                is_directory,
            },
        );
    }

    /// Store `record` in the first free slot of the directory at `cluster`,
    /// growing subdirectories by one cluster when full.
    fn add_entry(&mut self, cluster: u16, directory: &Path, record: &DirectoryEntry) -> SerialDiskResult<EntryKey> {
        if cluster == ROOT_DIRECTORY_CLUSTER {
            let offset = free_slot(&self.image.root_directory).ok_or_else(|| SerialDiskError::RootDirectoryFull {
                entries: self.image.root_directory.len() / DIRECTORY_ENTRY_SIZE,
                max_entries: self.geometry.max_root_directory_entries(),
            })?;
            record.encode(&mut self.image.root_directory[offset..]);
            return Ok((ROOT_DIRECTORY_CLUSTER, offset));
        }

        let chain = self.image.fat.chain(cluster);
        let mut last = cluster;
        for &link in chain.clusters() {
            if let Some(buffer) = self.image.clusters.buffer_mut(link) {
                if let Some(offset) = free_slot(buffer) {
                    record.encode(&mut buffer[offset..]);
                    return Ok((link, offset));
                }
            }
            last = link;
        }

        let next = self.allocate(last)?;
        let mut buffer = vec![0u8; self.geometry.bytes_per_cluster as usize];
        record.encode(&mut buffer[0..]);
        self.image.clusters.set(
            next,
            ClusterRecord::Directory { buffer, path: directory.to_path_buf() },
        );
        Ok((next, 0))
    }
}

fn free_slot(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len())
        .step_by(DIRECTORY_ENTRY_SIZE)
        .find(|&offset| buffer[offset] == END_OF_ENTRIES_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialdisk_core::TosVersion;
    use tempfile::TempDir;

    fn geometry(mib: u32) -> DiskGeometry {
        DiskGeometry::calculate(mib, TosVersion::Tos104, 8).unwrap()
    }

    #[test]
    fn test_directory_size() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b"), vec![0u8; 50]).unwrap();

        assert_eq!(directory_size(dir.path()).unwrap(), 150);
    }

    #[test]
    fn test_local_directory_too_large() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big"), vec![0u8; 2 * 1024 * 1024]).unwrap();

        let err = validate_local_directory(&geometry(1), dir.path()).unwrap_err();
        assert!(matches!(err, SerialDiskError::LocalDirectoryTooLarge { local_mib: 2, disk_mib: 1 }));
    }

    #[test]
    fn test_root_directory_overflow() {
        let dir = TempDir::new().unwrap();
        let g = DiskGeometry::calculate(1, TosVersion::Tos104, 1).unwrap();
        for i in 0..=g.max_root_directory_entries() {
            fs::write(dir.path().join(format!("f{}", i)), b"x").unwrap();
        }

        let err = validate_local_directory(&g, dir.path()).unwrap_err();
        assert!(matches!(err, SerialDiskError::RootDirectoryFull { .. }));
    }

    #[test]
    fn test_subdirectory_grows_by_cluster() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("many");
        fs::create_dir(&sub).unwrap();
        // 1024 byte clusters hold 32 entries, two of them "." and ".."
        for i in 0..40 {
            fs::write(sub.join(format!("f{:02}", i)), b"").unwrap();
        }

        let image = import_local_directory(&geometry(1), dir.path()).unwrap();
        let root = DirectoryEntry::parse(&image.root_directory[0..32]);
        let chain = image.fat.chain(root.start_cluster);

        assert!(chain.is_complete());
        assert_eq!(chain.clusters().len(), 2);
        assert_eq!(image.index.len(), 41);
        assert!(image.clusters.is_directory(chain.clusters()[1]));
    }

    #[test]
    fn test_dot_entries() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();

        let image = import_local_directory(&geometry(1), dir.path()).unwrap();
        let docs = DirectoryEntry::parse(&image.root_directory[0..32]);
        let buffer = image.clusters.buffer(docs.start_cluster).unwrap();

        let dot = DirectoryEntry::parse(&buffer[0..32]);
        let dotdot = DirectoryEntry::parse(&buffer[32..64]);
        assert_eq!(dot.short_name(), ".");
        assert_eq!(dot.start_cluster, docs.start_cluster);
        assert_eq!(dotdot.short_name(), "..");
        assert_eq!(dotdot.start_cluster, 0);
    }
}
