// FAT16 constants shared by the virtual disk and the protocol front end

// FAT entry values
pub const FAT16_FREE: u16 = 0x0000;
pub const FAT16_BAD_FIRST: u16 = 0xFFF0; // 0xFFF0-0xFFF7 bad sector (GEMDOS)
pub const FAT16_BAD_LAST: u16 = 0xFFF7;
pub const FAT16_EOF_FIRST: u16 = 0xFFF8; // 0xFFF8-0xFFFF last cluster of a file
pub const FAT16_EOC: u16 = 0xFFFF; // Written by the allocator
pub const FAT16_MEDIA_ENTRY: u16 = 0xFFF8; // Reserved entry 0

// Cluster indices 0 and 1 are reserved and never live in the data region
pub const RESERVED_CLUSTERS: u32 = 2;
pub const FIRST_DATA_CLUSTER: u16 = 2;

// The root directory has its own buffer; cluster 0 addresses it
pub const ROOT_DIRECTORY_CLUSTER: u16 = 0;

// Directory entries
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
pub const END_OF_ENTRIES_MARKER: u8 = 0x00;
pub const DOT_ENTRY_MARKER: u8 = 0x2E;
pub const DELETED_ENTRY_MARKER: u8 = 0xE5;

// Directory entry field offsets
pub const DIR_NAME: usize = 0x00;
pub const DIR_ATTRIBUTES: usize = 0x0B;
pub const DIR_WRITE_TIME: usize = 0x16;
pub const DIR_WRITE_DATE: usize = 0x18;
pub const DIR_START_CLUSTER: usize = 0x1A;
pub const DIR_FILE_SIZE: usize = 0x1C;

// Geometry
pub const SECTORS_PER_CLUSTER: u32 = 2;
pub const SECTOR_SIZES: [u32; 5] = [512, 1024, 2048, 4096, 8192];
pub const MAX_SECTOR_SIZE: u32 = 8192;
pub const FAT_ENTRY_SIZE: u32 = 2;
pub const BIOS_PARAMETER_BLOCK_SIZE: usize = 18;
