// Integration tests for the import -> remote write -> local sync cycle
// Drives the virtual disk only through its public sector interface

use serialdisk_core::{DiskSettings, SerialDiskError, TosVersion};
use serialdisk_filesystems::fat_common::{parse_83_name, DirectoryEntry};
use serialdisk_filesystems::{Disk, DirectoryWatcher};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn settings(disk_size_mib: u32, tos_compatibility: TosVersion) -> DiskSettings {
    DiskSettings {
        disk_size_mib,
        tos_compatibility,
        root_directory_sectors: 8,
    }
}

fn create_disk(path: &Path) -> Disk {
    let _ = env_logger::builder().is_test(true).try_init();
    Disk::new(&settings(32, TosVersion::Tos104), path).expect("disk should build")
}

fn root_names(disk: &Disk) -> Vec<String> {
    let g = disk.geometry();
    let root = disk.read_sectors(g.root_directory_start_sector(), g.root_directory_sectors);
    root.chunks(32)
        .map(DirectoryEntry::parse)
        .take_while(|entry| !entry.is_end_marker())
        .filter(|entry| !entry.is_deleted())
        .map(|entry| entry.short_name())
        .collect()
}

#[test]
fn test_colliding_names_get_numeric_tails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("réport.txt"), b"one").unwrap();
    fs::write(dir.path().join("r#port.txt"), b"two").unwrap();
    fs::write(dir.path().join("report!.txt"), b"three").unwrap();

    let disk = create_disk(dir.path());
    let mut names = root_names(&disk);
    names.sort();

    assert_eq!(names, vec!["REPORT_.TXT", "R_PORT.TXT", "R_PO~1.TXT"]);
}

#[test]
fn test_directories_are_imported_before_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("aaa.txt"), b"file").unwrap();
    fs::create_dir(dir.path().join("zzz")).unwrap();

    let disk = create_disk(dir.path());
    assert_eq!(root_names(&disk), vec!["ZZZ", "AAA.TXT"]);
}

#[test]
fn test_oversized_disk_is_rejected() {
    let dir = TempDir::new().unwrap();

    let err = Disk::new(&settings(512, TosVersion::Tos100), dir.path()).err().unwrap();
    assert!(matches!(err, SerialDiskError::DiskTooLarge { requested_mib: 512, .. }));
    assert!(err.is_validation());
}

#[test]
fn test_local_directory_larger_than_disk() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("big.bin"), vec![0u8; 3 * 1024 * 1024]).unwrap();

    let err = Disk::new(&settings(2, TosVersion::Tos104), dir.path()).err().unwrap();
    assert!(matches!(err, SerialDiskError::LocalDirectoryTooLarge { .. }));
}

#[test]
fn test_bios_parameter_block_matches_geometry() {
    let dir = TempDir::new().unwrap();
    let disk = create_disk(dir.path());
    let bpb = disk.bios_parameter_block();

    let g = disk.geometry();
    assert_eq!(u16::from_be_bytes([bpb[0], bpb[1]]) as u32, g.bytes_per_sector);
    assert_eq!(u16::from_be_bytes([bpb[12], bpb[13]]) as u32, g.first_data_sector());
    assert_eq!(u16::from_be_bytes([bpb[14], bpb[15]]) as u32, g.cluster_count);
}

#[test]
fn test_remote_delete_then_listing_omits_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
    fs::write(dir.path().join("drop.txt"), b"drop").unwrap();
    let mut disk = create_disk(dir.path());

    let g = disk.geometry().clone();
    let mut root = disk.read_sectors(g.root_directory_start_sector(), 1);
    let slot = root
        .chunks(32)
        .position(|raw| parse_83_name(raw[..11].try_into().unwrap()) == "DROP.TXT")
        .unwrap();
    root[slot * 32] = 0xE5;
    let report = disk.write_sectors(root.len(), g.root_directory_start_sector(), &root);

    assert_eq!(report.deleted.len(), 1);
    assert!(!disk.local_directory().join("drop.txt").exists());
    assert!(disk.local_directory().join("keep.txt").exists());
    assert_eq!(root_names(&disk), vec!["KEEP.TXT"]);
    assert_eq!(disk.tracked_entries(), 1);
}

#[test]
fn test_statistics() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/a.bin"), vec![1u8; 2000]).unwrap();
    fs::write(dir.path().join("b.bin"), vec![2u8; 48]).unwrap();

    let disk = create_disk(dir.path());
    assert_eq!(disk.tracked_entries(), 3);
    assert_eq!(disk.local_directory_size().unwrap(), 2048);
    assert!(disk.tracked().any(|entry| entry.is_directory && entry.short_name == "SUB"));
}

#[test]
fn test_watcher_raises_media_changed() {
    let dir = TempDir::new().unwrap();
    let disk = create_disk(dir.path());
    let _watcher = DirectoryWatcher::start(disk.local_directory(), disk.monitor()).unwrap();

    fs::write(disk.local_directory().join("external.txt"), b"hello").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !disk.monitor().media_changed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(disk.take_media_changed());
}
