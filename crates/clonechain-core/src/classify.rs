//! Naming-convention classifier. Every object in the backend is named after
//! the workflow that created it; this module turns those names back into a
//! role tag plus the embedded identifier. Roles are descriptive only and
//! never steer a traversal.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const SNAPSHOT_PREFIX: &str = "snapshot-";
const VOLUME_PREFIX: &str = "volume-";
const CLONE_SNAP_SUFFIX: &str = ".clone_snap";
const BACKUP_PREFIX: &str = "backup.";
const BACKUP_MARKER: &str = ".snap.";
const IMAGE_SNAP_NAME: &str = "snap";
const VM_DISK_SUFFIX: &str = "_disk";

/// Why an object exists, as far as its name tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "volume")]
    Volume,
    /// Image backing a compute instance disk.
    #[serde(rename = "vm")]
    Vm,
    #[serde(rename = "volume_snap")]
    VolumeSnap,
    /// Intermediate snapshot taken to clone a volume from a volume.
    #[serde(rename = "clone_snap")]
    CloneSnap,
    #[serde(rename = "backup_snap")]
    BackupSnap,
    /// Snapshot protecting an imported image.
    #[serde(rename = "image_snap")]
    ImageSnap,
    #[default]
    #[serde(rename = "")]
    Unclassified,
}

impl Role {
    /// Wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Volume => "volume",
            Role::Vm => "vm",
            Role::VolumeSnap => "volume_snap",
            Role::CloneSnap => "clone_snap",
            Role::BackupSnap => "backup_snap",
            Role::ImageSnap => "image_snap",
            Role::Unclassified => "",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role plus the identifier recovered from the name (empty when none).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub role: Role,
    pub uuid: String,
}

impl Classification {
    fn new(role: Role, uuid: &str) -> Self {
        Self {
            role,
            uuid: uuid.to_string(),
        }
    }

    fn unclassified() -> Self {
        Self::default()
    }
}

/// Classify a snapshot name (`is_snapshot`) or a volume/image name.
pub fn classify(name: &str, is_snapshot: bool) -> Classification {
    if is_snapshot {
        classify_snapshot(name)
    } else {
        classify_volume(name)
    }
}

/// Apply the snapshot naming rules; the first matching rule wins.
pub fn classify_snapshot(name: &str) -> Classification {
    if let Some(uuid) = name.strip_prefix(SNAPSHOT_PREFIX) {
        return Classification::new(Role::VolumeSnap, uuid);
    }

    if let Some(uuid) = name
        .strip_prefix(VOLUME_PREFIX)
        .and_then(|rest| rest.strip_suffix(CLONE_SNAP_SUFFIX))
    {
        return Classification::new(Role::CloneSnap, uuid);
    }

    if name.starts_with(BACKUP_PREFIX) {
        if let Some(marker) = name.find(BACKUP_MARKER) {
            // The marker may overlap the prefix (`backup.snap.1`); the id is then empty.
            let uuid = name.get(BACKUP_PREFIX.len()..marker).unwrap_or("");
            return Classification::new(Role::BackupSnap, uuid);
        }
    }

    if name == IMAGE_SNAP_NAME {
        return Classification::new(Role::ImageSnap, "");
    }

    Classification::unclassified()
}

/// Apply the volume/image naming rules; the first matching rule wins.
pub fn classify_volume(name: &str) -> Classification {
    if let Some(uuid) = name.strip_prefix(VOLUME_PREFIX) {
        return Classification::new(Role::Volume, uuid);
    }

    if let Some(uuid) = name.strip_suffix(VM_DISK_SUFFIX) {
        return Classification::new(Role::Vm, uuid);
    }

    if is_uuid_like(name) {
        return Classification::new(Role::Volume, name);
    }

    Classification::unclassified()
}

/// True when `value` parses as a UUID in any of the usual textual forms.
pub fn is_uuid_like(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}
