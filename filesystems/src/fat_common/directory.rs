// On-disk FAT16 directory entries (32 bytes each)

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};

/// Directory entry attributes
pub mod attributes {
    pub const ATTR_READ_ONLY: u8 = 0x01;
    pub const ATTR_HIDDEN: u8 = 0x02;
    pub const ATTR_SYSTEM: u8 = 0x04;
    pub const ATTR_VOLUME_ID: u8 = 0x08;
    pub const ATTR_DIRECTORY: u8 = 0x10;
    pub const ATTR_ARCHIVE: u8 = 0x20;
    pub const ATTR_FILE: u8 = 0x00;
}

use attributes::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub write_time: u16,
    pub write_date: u16,
    pub start_cluster: u16,
    pub file_size: u32,
}

impl DirectoryEntry {
    pub fn new(short_name: &str, attributes: u8, (write_date, write_time): (u16, u16), start_cluster: u16, file_size: u32) -> Self {
        Self {
            name: encode_83_name(short_name),
            attributes,
            write_time,
            write_date,
            start_cluster,
            file_size,
        }
    }

    /// Parse the first 32 bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&bytes[DIR_NAME..DIR_NAME + 11]);

        Self {
            name,
            attributes: bytes[DIR_ATTRIBUTES],
            write_time: LittleEndian::read_u16(&bytes[DIR_WRITE_TIME..]),
            write_date: LittleEndian::read_u16(&bytes[DIR_WRITE_DATE..]),
            start_cluster: LittleEndian::read_u16(&bytes[DIR_START_CLUSTER..]),
            file_size: LittleEndian::read_u32(&bytes[DIR_FILE_SIZE..]),
        }
    }

    /// Write this entry into the first 32 bytes of `out`. Reserved bytes are zeroed.
    pub fn encode(&self, out: &mut [u8]) {
        let out = &mut out[..DIRECTORY_ENTRY_SIZE];
        out.fill(0);
        out[DIR_NAME..DIR_NAME + 11].copy_from_slice(&self.name);
        out[DIR_ATTRIBUTES] = self.attributes;
        LittleEndian::write_u16(&mut out[DIR_WRITE_TIME..], self.write_time);
        LittleEndian::write_u16(&mut out[DIR_WRITE_DATE..], self.write_date);
        LittleEndian::write_u16(&mut out[DIR_START_CLUSTER..], self.start_cluster);
        LittleEndian::write_u32(&mut out[DIR_FILE_SIZE..], self.file_size);
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY_MARKER
    }

    pub fn is_end_marker(&self) -> bool {
        self.name[0] == END_OF_ENTRIES_MARKER
    }

    /// `.` and `..` self references
    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == DOT_ENTRY_MARKER
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0
    }

    /// Decoded "NAME.EXT" form, as stored in the tracking records.
    pub fn short_name(&self) -> String {
        parse_83_name(&self.name)
    }
}

/// Parse an 8.3 name field into "NAME.EXT", trimming the padding.
pub fn parse_83_name(name: &[u8; 11]) -> String {
    let decode = |bytes: &[u8]| -> String {
        bytes
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string()
    };

    let base = decode(&name[0..8]);
    let extension = decode(&name[8..11]);

    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    }
}

/// Format a short name ("NAME.EXT", ".", "..") into the space padded 11 byte field.
pub fn encode_83_name(short_name: &str) -> [u8; 11] {
    let mut result = [0x20u8; 11];

    if short_name == "." || short_name == ".." {
        result[..short_name.len()].copy_from_slice(short_name.as_bytes());
        return result;
    }

    let (base, extension) = match short_name.rfind('.') {
        Some(dot) => (&short_name[..dot], &short_name[dot + 1..]),
        None => (short_name, ""),
    };

    for (i, byte) in base.bytes().take(8).enumerate() {
        result[i] = byte;
    }
    for (i, byte) in extension.bytes().take(3).enumerate() {
        result[8 + i] = byte;
    }

    result
}
