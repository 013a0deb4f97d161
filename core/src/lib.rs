pub mod error;
pub mod settings;

pub use error::{SerialDiskError, SerialDiskResult};
pub use settings::{
    DiskSettings, Handshake, Parity, SerialPortSettings, Settings, StopBits, TosVersion,
};

pub const BYTES_PER_MIB: u64 = 1024 * 1024;
