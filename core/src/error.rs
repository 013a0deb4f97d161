use std::path::PathBuf;
use thiserror::Error;

pub type SerialDiskResult<T> = Result<T, SerialDiskError>;

#[derive(Debug, Error)]
pub enum SerialDiskError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{requested_mib}MiB is larger than the maximum possible disk size ({max_mib}MiB)")]
    DiskTooLarge { requested_mib: u32, max_mib: u64 },

    #[error("Local directory size is {local_mib} MiB, which is larger than the maximum allowable virtual disk size ({max_mib} MiB)")]
    LocalDirectoryExceedsMaximum { local_mib: u64, max_mib: u64 },

    #[error("Local directory size is {local_mib} MiB, which is too large for the given virtual disk size ({disk_mib} MiB)")]
    LocalDirectoryTooLarge { local_mib: u64, disk_mib: u64 },

    #[error("The root directory has {entries} files/directories, which is more than the maximum ({max_entries}) allowed")]
    RootDirectoryFull { entries: usize, max_entries: usize },

    #[error("Could not find a free cluster in FAT: local directory size is {local_mib} MiB, virtual disk size is {disk_mib} MiB")]
    FatExhausted { local_mib: u64, disk_mib: u64 },

    #[error("Failed to synchronise {path:?}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SerialDiskError {
    pub fn sync(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SerialDiskError::Sync { path: path.into(), source }
    }

    /// Errors raised while building the virtual disk; startup cannot continue.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SerialDiskError::Configuration(_)
                | SerialDiskError::DiskTooLarge { .. }
                | SerialDiskError::LocalDirectoryExceedsMaximum { .. }
                | SerialDiskError::LocalDirectoryTooLarge { .. }
                | SerialDiskError::RootDirectoryFull { .. }
        )
    }
}
