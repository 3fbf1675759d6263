// Device inspection
//
// Resolves a kernel device name to a stable identity and classifies it.
// Everything here is read-only: `lsblk` for identity and size, sysfs for the
// rotational flag and the mount table for the active-system check.

use crate::config::EraserConfig;
use crate::error::{DeviceFault, StageResult};
use crate::tools::CommandRunner;
use crate::{strip_dev_prefix, Device, DeviceIdentity, MountRole, Rotation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::sync::Arc;

lazy_static! {
    /// `KEY="value"` pairs from `lsblk -P`
    static ref LSBLK_PAIR: Regex = Regex::new(r#"([A-Z][A-Z0-9:\-]*)="([^"]*)""#).unwrap();

    /// Whole-disk name behind a partition node, e.g. `/dev/nvme0n1p2` -> `nvme0n1`
    static ref BASE_DEVICE: Regex =
        Regex::new(r"^/dev/(nvme\d+n\d+|mmcblk\d+|x?vd[a-z]+|[sh]d[a-z]+)").unwrap();
}

const INSPECT_COLUMNS: &str = "NAME,SIZE,ROTA,TYPE,SERIAL,MODEL";
const LIST_COLUMNS: &str = "NAME,SIZE,TYPE,MODEL";

/// One row of the disk enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskSummary {
    pub name: String,
    pub capacity_bytes: u64,
    pub model: Option<String>,
}

/// Safety signal surfaced to the caller before destructive work starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Advisory {
    /// Flash translation layers remap cells, so overwriting is not a
    /// guaranteed erase
    SolidState { device: DeviceIdentity },
    /// The device backs the running system
    ActiveSystem { device: DeviceIdentity, role: MountRole },
}

impl Advisory {
    pub fn device(&self) -> &DeviceIdentity {
        match self {
            Advisory::SolidState { device } | Advisory::ActiveSystem { device, .. } => device,
        }
    }

    /// Build the advisories that apply to an inspected device
    pub fn for_device(device: &Device) -> Vec<Advisory> {
        let mut advisories = Vec::new();
        if device.mount_role.is_active_system() {
            advisories.push(Advisory::ActiveSystem {
                device: device.identity.clone(),
                role: device.mount_role,
            });
        }
        if device.is_solid_state() {
            advisories.push(Advisory::SolidState {
                device: device.identity.clone(),
            });
        }
        advisories
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::SolidState { device } => write!(
                f,
                "WARNING: {} is an SSD. Multiple-pass erasure may not securely erase all data.",
                device
            ),
            Advisory::ActiveSystem {
                device,
                role: MountRole::LiveBootMedia,
            } => write!(f, "WARNING: {} holds the live boot media of the running system.", device),
            Advisory::ActiveSystem { device, .. } => {
                write!(f, "WARNING: {} holds the active root filesystem.", device)
            }
        }
    }
}

pub struct DeviceInspector {
    runner: Arc<dyn CommandRunner>,
    config: Arc<EraserConfig>,
}

impl DeviceInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<EraserConfig>) -> Self {
        Self { runner, config }
    }

    /// Full inspection of one device
    ///
    /// Fails when `lsblk` is missing or cannot query the device. A device is
    /// never invented from partial data.
    pub fn inspect(&self, device_name: &str) -> StageResult<Device> {
        let name = strip_dev_prefix(device_name).to_string();
        let fields = self.query(&name)?;

        match fields.get("TYPE").map(String::as_str) {
            Some("part") | Some("rom") => {
                return Err(DeviceFault::Unusable(format!("{} is not a whole disk", name)).into());
            }
            _ => {}
        }

        let capacity_bytes = fields
            .get("SIZE")
            .and_then(|size| size.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let serial = non_empty(fields.get("SERIAL"));
        let model = non_empty(fields.get("MODEL"));
        let identity = identity_from(&name, serial.as_deref(), model.as_deref(), capacity_bytes);

        let rotation = match self.is_rotational(&name) {
            Rotation::Unknown => rotation_flag(fields.get("ROTA").map(String::as_str)),
            known => known,
        };
        let mount_role = self.mount_role(&name);

        tracing::debug!(
            device = %identity,
            name = %name,
            capacity_bytes,
            rotation = %rotation,
            ?mount_role,
            "Inspected device"
        );

        Ok(Device {
            name,
            identity,
            model,
            serial,
            capacity_bytes,
            rotation,
            mount_role,
        })
    }

    /// Stable identity, never fails
    ///
    /// Falls back from hardware serial to model+capacity to
    /// `unknown_<name>`. When `lsblk` cannot answer (e.g. while the kernel is
    /// re-reading the partition table) the same attributes are read from sysfs.
    pub fn identify(&self, device_name: &str) -> DeviceIdentity {
        let name = strip_dev_prefix(device_name);

        match self.query(name) {
            Ok(fields) => {
                let capacity = fields
                    .get("SIZE")
                    .and_then(|size| size.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                identity_from(
                    name,
                    non_empty(fields.get("SERIAL")).as_deref(),
                    non_empty(fields.get("MODEL")).as_deref(),
                    capacity,
                )
            }
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "lsblk identity lookup failed, trying sysfs");
                self.identify_from_sysfs(name)
            }
        }
    }

    /// Rotational flag from `queue/rotational` in sysfs
    pub fn is_rotational(&self, device_name: &str) -> Rotation {
        let path = self
            .config
            .sys_block_dir
            .join(strip_dev_prefix(device_name))
            .join("queue/rotational");
        rotation_flag(fs::read_to_string(path).ok().as_deref())
    }

    /// Devices backing `/` or a live boot mount
    ///
    /// Advisory only. An unreadable mount table yields an empty set.
    pub fn active_system_devices(&self) -> BTreeSet<String> {
        self.mount_roles()
            .into_iter()
            .filter(|(_, role)| role.is_active_system())
            .map(|(name, _)| name)
            .collect()
    }

    /// Physical disks only: partitions, loop, ram, zram, optical and
    /// device-mapper nodes are excluded
    pub fn list_disks(&self) -> StageResult<Vec<DiskSummary>> {
        let output = self
            .runner
            .run_checked("lsblk", &["-d", "-n", "-b", "-P", "-o", LIST_COLUMNS])?;

        let disks = output
            .lines()
            .map(parse_pairs)
            .filter(|fields| fields.get("TYPE").map(String::as_str) == Some("disk"))
            .filter_map(|fields| {
                let name = fields.get("NAME")?.clone();
                if should_skip_device(&name) {
                    return None;
                }
                Some(DiskSummary {
                    capacity_bytes: fields
                        .get("SIZE")
                        .and_then(|size| size.trim().parse().ok())
                        .unwrap_or(0),
                    model: non_empty(fields.get("MODEL")),
                    name,
                })
            })
            .collect();

        Ok(disks)
    }

    /// Inspect a device and return the warnings that apply to it
    pub fn advisories(&self, device_name: &str) -> StageResult<Vec<Advisory>> {
        Ok(Advisory::for_device(&self.inspect(device_name)?))
    }

    fn query(&self, name: &str) -> StageResult<HashMap<String, String>> {
        let device_path = self.config.device_path(name);
        let device_arg = device_path.to_string_lossy();
        let output = self.runner.run_checked(
            "lsblk",
            &["-d", "-n", "-b", "-P", "-o", INSPECT_COLUMNS, device_arg.as_ref()],
        )?;

        let fields = output
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(parse_pairs)
            .unwrap_or_default();
        if fields.is_empty() {
            return Err(DeviceFault::NotFound(format!("lsblk returned nothing for {}", name)).into());
        }
        Ok(fields)
    }

    fn identify_from_sysfs(&self, name: &str) -> DeviceIdentity {
        let device_dir = self.config.sys_block_dir.join(name);
        let read = |file: &str| fs::read_to_string(device_dir.join(file)).ok().map(|s| s.trim().to_string());

        let serial = read("device/serial").filter(|s| !s.is_empty());
        let model = read("device/model").filter(|s| !s.is_empty());
        // sysfs reports size in 512-byte sectors
        let capacity = read("size")
            .and_then(|sectors| sectors.parse::<u64>().ok())
            .map(|sectors| sectors * 512)
            .unwrap_or(0);

        identity_from(name, serial.as_deref(), model.as_deref(), capacity)
    }

    /// Role of every whole disk with at least one mounted node
    fn mount_roles(&self) -> BTreeMap<String, MountRole> {
        let mounts = match fs::read_to_string(&self.config.mounts_path) {
            Ok(mounts) => mounts,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.mounts_path.display(),
                    error = %e,
                    "Cannot read mount table"
                );
                return BTreeMap::new();
            }
        };

        let mut roles = BTreeMap::new();
        for line in mounts.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }
            let (source, mount_point) = (parts[0], parts[1]);
            let Some(base) = base_device(source) else {
                continue;
            };

            let role = if mount_point == "/" {
                MountRole::ActiveRoot
            } else if self
                .config
                .live_media_prefixes
                .iter()
                .any(|prefix| mount_point.starts_with(prefix.as_str()))
            {
                MountRole::LiveBootMedia
            } else {
                MountRole::OtherMounted
            };

            let entry = roles.entry(base).or_insert(MountRole::OtherMounted);
            if role_rank(role) > role_rank(*entry) {
                *entry = role;
            }
        }
        roles
    }

    fn mount_role(&self, name: &str) -> MountRole {
        self.mount_roles().remove(name).unwrap_or(MountRole::Unmounted)
    }
}

fn role_rank(role: MountRole) -> u8 {
    match role {
        MountRole::Unmounted => 0,
        MountRole::OtherMounted => 1,
        MountRole::LiveBootMedia => 2,
        MountRole::ActiveRoot => 3,
    }
}

/// Serial, then `model_capacity`, then `unknown_<name>`
pub(crate) fn identity_from(name: &str, serial: Option<&str>, model: Option<&str>, capacity: u64) -> DeviceIdentity {
    if let Some(serial) = serial.map(str::trim).filter(|s| !s.is_empty()) {
        return DeviceIdentity::new(serial);
    }
    if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
        let model = model.split_whitespace().collect::<Vec<_>>().join("_");
        return DeviceIdentity::new(format!("{}_{}", model, capacity));
    }
    DeviceIdentity::unknown(name)
}

/// Whole-disk name behind a mount source, `None` for non-device sources
pub(crate) fn base_device(source: &str) -> Option<String> {
    BASE_DEVICE
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Skip loop devices, ram disks, device mapper, optical drives and zram
pub(crate) fn should_skip_device(device_name: &str) -> bool {
    device_name.starts_with("loop")
        || device_name.starts_with("ram")
        || device_name.starts_with("dm-")
        || device_name.starts_with("sr")
        || device_name.starts_with("zram")
}

pub(crate) fn parse_pairs(line: &str) -> HashMap<String, String> {
    LSBLK_PAIR
        .captures_iter(line)
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .collect()
}

fn rotation_flag(flag: Option<&str>) -> Rotation {
    match flag.map(str::trim) {
        Some("1") => Rotation::Rotational,
        Some("0") => Rotation::SolidState,
        _ => Rotation::Unknown,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}
