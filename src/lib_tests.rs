// Tests for lib.rs core types
//
// Tests cover: device identity, dev-prefix handling, filesystem parsing and
// mkfs arguments, stage and pass labels, serialization.

use super::*;
use test_case::test_case;

// ==================== DEVICE IDENTITY TESTS ====================

#[test]
fn test_identity_display_and_as_str() {
    let identity = DeviceIdentity::new("WD-WCC4E1234567");
    assert_eq!(identity.as_str(), "WD-WCC4E1234567");
    assert_eq!(identity.to_string(), "WD-WCC4E1234567");
    assert!(!identity.is_synthesized());
}

#[test]
fn test_unknown_identity_strips_dev_prefix() {
    let identity = DeviceIdentity::unknown("/dev/sdc");
    assert_eq!(identity.as_str(), "unknown_sdc");
    assert!(identity.is_synthesized());
}

#[test]
fn test_identity_clones_share_storage() {
    let identity = DeviceIdentity::new("S3Z9NB0K123456");
    let clone = identity.clone();
    assert_eq!(identity, clone);
    assert!(std::ptr::eq(identity.as_str(), clone.as_str()));
}

#[test]
fn test_identity_serializes_as_plain_string() -> anyhow::Result<()> {
    let identity = DeviceIdentity::new("Samsung_SSD_860_500107862016");
    let json = serde_json::to_string(&identity)?;
    assert_eq!(json, "\"Samsung_SSD_860_500107862016\"");

    let back: DeviceIdentity = serde_json::from_str(&json)?;
    assert_eq!(back, identity);
    Ok(())
}

// ==================== DEV PREFIX TESTS ====================

#[test_case("sda", "sda" ; "bare name")]
#[test_case("/dev/sda", "sda" ; "with prefix")]
#[test_case("/dev/nvme0n1", "nvme0n1" ; "nvme")]
#[test_case("/dev/disk/by-id/x", "disk/by-id/x" ; "only leading prefix")]
fn test_strip_dev_prefix(input: &str, expected: &str) {
    assert_eq!(strip_dev_prefix(input), expected);
}

// ==================== FILESYSTEM KIND TESTS ====================

#[test_case("ext4", FilesystemKind::Ext4 ; "ext4")]
#[test_case("NTFS", FilesystemKind::Ntfs ; "uppercase ntfs")]
#[test_case(" vfat ", FilesystemKind::Vfat ; "padded vfat")]
fn test_filesystem_parse(input: &str, expected: FilesystemKind) {
    assert_eq!(input.parse::<FilesystemKind>().unwrap(), expected);
}

#[test]
fn test_filesystem_parse_rejects_unknown() {
    let err = "btrfs".parse::<FilesystemKind>().unwrap_err();
    assert_eq!(err, UnknownFilesystem("btrfs".to_string()));
    assert!(err.to_string().contains("ext4, ntfs or vfat"));
}

#[test]
fn test_filesystem_mkfs_commands() {
    assert_eq!(FilesystemKind::Ext4.mkfs_tool(), "mkfs.ext4");
    assert_eq!(FilesystemKind::Ext4.mkfs_args(), &["-F"]);

    assert_eq!(FilesystemKind::Ntfs.mkfs_tool(), "mkfs.ntfs");
    assert_eq!(FilesystemKind::Ntfs.mkfs_args(), &["-f"]);

    assert_eq!(FilesystemKind::Vfat.mkfs_tool(), "mkfs.vfat");
    assert_eq!(FilesystemKind::Vfat.mkfs_args(), &["-F", "32"]);
}

#[test]
fn test_filesystem_display_round_trips_through_parse() {
    for kind in FilesystemKind::ALL {
        assert_eq!(kind.to_string().parse::<FilesystemKind>().unwrap(), kind);
    }
}

#[test]
fn test_filesystem_serde_lowercase() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&FilesystemKind::Vfat)?, "\"vfat\"");
    let kind: FilesystemKind = serde_json::from_str("\"ntfs\"")?;
    assert_eq!(kind, FilesystemKind::Ntfs);
    Ok(())
}

// ==================== STAGE AND PASS LABEL TESTS ====================

#[test_case(Stage::Inspect, "inspect")]
#[test_case(Stage::Erase, "erase")]
#[test_case(Stage::Partition, "partition")]
#[test_case(Stage::Format, "format")]
#[test_case(Stage::Record, "record")]
fn test_stage_display(stage: Stage, expected: &str) {
    assert_eq!(stage.to_string(), expected);
    assert_eq!(serde_json::to_string(&stage).unwrap(), format!("\"{}\"", expected));
}

#[test]
fn test_pass_label_display() {
    assert_eq!(PassLabel::Random(1).to_string(), "pass 1");
    assert_eq!(PassLabel::Random(12).to_string(), "pass 12");
    assert_eq!(PassLabel::FinalZero.to_string(), "final-zero");
}

// ==================== DEVICE TESTS ====================

#[test]
fn test_mount_role_active_system() {
    assert!(MountRole::ActiveRoot.is_active_system());
    assert!(MountRole::LiveBootMedia.is_active_system());
    assert!(!MountRole::OtherMounted.is_active_system());
    assert!(!MountRole::Unmounted.is_active_system());
}

#[test]
fn test_device_solid_state() {
    let device = Device {
        name: "nvme0n1".to_string(),
        identity: DeviceIdentity::new("S4EWNX0N123456"),
        model: Some("Samsung SSD 970".to_string()),
        serial: Some("S4EWNX0N123456".to_string()),
        capacity_bytes: 500_107_862_016,
        rotation: Rotation::SolidState,
        mount_role: MountRole::Unmounted,
    };
    assert!(device.is_solid_state());
    assert_eq!(device.rotation.to_string(), "SSD");
    assert_eq!(Rotation::Rotational.to_string(), "HDD");
}
