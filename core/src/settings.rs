use crate::{SerialDiskError, SerialDiskResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Oldest TOS release the virtual disk has to stay readable by.
///
/// TOS 1.00 can only address 0x3FFF clusters per partition, later
/// releases handle 0x7FFF.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TosVersion {
    #[serde(rename = "1.00", alias = "tos100")]
    Tos100,
    #[serde(rename = "1.04", alias = "tos104")]
    Tos104,
}

impl TosVersion {
    pub fn max_disk_clusters(self) -> u32 {
        match self {
            TosVersion::Tos100 => 0x3FFF,
            TosVersion::Tos104 => 0x7FFF,
        }
    }
}

impl Default for TosVersion {
    fn default() -> Self {
        TosVersion::Tos104
    }
}

impl fmt::Display for TosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TosVersion::Tos100 => write!(f, "TOS 1.00"),
            TosVersion::Tos104 => write!(f, "TOS 1.04"),
        }
    }
}

impl FromStr for TosVersion {
    type Err = SerialDiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1.00" | "100" | "tos100" | "tos1.00" => Ok(TosVersion::Tos100),
            "1.04" | "104" | "tos104" | "tos1.04" => Ok(TosVersion::Tos104),
            other => Err(SerialDiskError::Configuration(format!(
                "Unknown TOS compatibility '{}' (expected 1.00 or 1.04)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Handshake {
    None,
    XonXoff,
    Rts,
}

impl Handshake {
    /// RTS/DTR lines are asserted only for hardware handshaking.
    pub fn uses_rts(self) -> bool {
        self == Handshake::Rts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialPortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub handshake: Handshake,
    /// Transport read timeout. A timeout only means "nothing arrived yet".
    pub timeout_ms: u64,
}

impl Default for SerialPortSettings {
    fn default() -> Self {
        Self {
            #[cfg(windows)]
            port_name: "COM1".to_string(),
            #[cfg(not(windows))]
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            handshake: Handshake::None,
            timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    pub disk_size_mib: u32,
    pub tos_compatibility: TosVersion,
    pub root_directory_sectors: u32,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            disk_size_mib: 32,
            tos_compatibility: TosVersion::Tos104,
            root_directory_sectors: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial: SerialPortSettings,
    pub disk: DiskSettings,
    pub local_directory: PathBuf,
    pub verbosity: u8,
    /// Compress read payloads sent to the remote.
    pub compression: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial: SerialPortSettings::default(),
            disk: DiskSettings::default(),
            local_directory: PathBuf::from("."),
            verbosity: 0,
            compression: false,
        }
    }
}

impl Settings {
    pub fn from_json_file(path: &Path) -> SerialDiskResult<Self> {
        debug!("Loading settings from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> SerialDiskResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_json_string(&self) -> SerialDiskResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything that can be checked before the disk is built.
    pub fn validate(&self) -> SerialDiskResult<()> {
        if self.disk.disk_size_mib == 0 {
            return Err(SerialDiskError::Configuration("Disk size must be at least 1 MiB".into()));
        }
        if self.disk.root_directory_sectors == 0 {
            return Err(SerialDiskError::Configuration(
                "Root directory needs at least one sector".into(),
            ));
        }
        if self.serial.port_name.trim().is_empty() {
            return Err(SerialDiskError::Configuration("No serial port given".into()));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(SerialDiskError::Configuration(format!(
                "Invalid data bits: {}",
                self.serial.data_bits
            )));
        }
        if !self.local_directory.is_dir() {
            return Err(SerialDiskError::Configuration(format!(
                "Local directory {} does not exist or is not a directory",
                self.local_directory.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.disk.disk_size_mib, 32);
        assert_eq!(settings.disk.root_directory_sectors, 8);
        assert_eq!(settings.disk.tos_compatibility, TosVersion::Tos104);
        assert_eq!(settings.serial.baud_rate, 9600);
        assert!(!settings.compression);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json_str(
            r#"{ "disk": { "disk_size_mib": 64, "tos_compatibility": "1.00" }, "compression": true }"#,
        )
        .unwrap();
        assert_eq!(settings.disk.disk_size_mib, 64);
        assert_eq!(settings.disk.tos_compatibility, TosVersion::Tos100);
        assert_eq!(settings.disk.root_directory_sectors, 8);
        assert!(settings.compression);
        assert_eq!(settings.serial.data_bits, 8);
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = Settings::default();
        settings.serial.handshake = Handshake::Rts;
        let json = settings.to_json_string().unwrap();
        let back = Settings::from_json_str(&json).unwrap();
        assert_eq!(back.serial.handshake, Handshake::Rts);
    }

    #[test]
    fn test_tos_version_parsing() {
        assert_eq!("1.00".parse::<TosVersion>().unwrap(), TosVersion::Tos100);
        assert_eq!("TOS104".parse::<TosVersion>().unwrap(), TosVersion::Tos104);
        assert!("2.06".parse::<TosVersion>().is_err());
        assert_eq!(TosVersion::Tos100.max_disk_clusters(), 0x3FFF);
        assert_eq!(TosVersion::Tos104.max_disk_clusters(), 0x7FFF);
    }

    #[test]
    fn test_validate_rejects_missing_directory() {
        let mut settings = Settings::default();
        settings.local_directory = PathBuf::from("/definitely/not/here");
        assert!(matches!(settings.validate(), Err(SerialDiskError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_disk() {
        let mut settings = Settings::default();
        settings.disk.disk_size_mib = 0;
        assert!(settings.validate().is_err());
    }
}
