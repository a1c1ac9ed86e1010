//! Collaborators of the compute driver and the records they exchange.

use crate::errors::FixtureError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const FAKE_INST_UUID: &str = "b6513403-fd7f-4ad0-ab27-f73bacbd3929";
pub const FAKE_INST_UUID_PVM: &str = "36513403-FD7F-4AD0-AB27-F73BACBD3929";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: String,
    pub name: String,
}

impl Instance {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
        }
    }

    pub fn fake() -> Self {
        Self::new(FAKE_INST_UUID, "fake-instance")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub disk_format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub driver_volume_type: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedSystem {
    pub uuid: String,
    pub system_name: String,
    pub machine_type: String,
    pub model: String,
    pub serial: String,
    pub memory_total_mb: u64,
    pub memory_free_mb: u64,
    pub proc_units_total: f64,
    pub proc_units_avail: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub entries: Vec<ManagedSystem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuUtilization {
    pub user_ns: u64,
    pub iowait_ns: u64,
    pub idle_ns: u64,
    pub kernel_ns: u64,
}

pub trait ImageApi: Send + Sync {
    fn get(&self, image_id: &str) -> Result<ImageMeta, FixtureError>;
    fn download(&self, image_id: &str) -> Result<Vec<u8>, FixtureError>;
}

pub trait DiskAdapter: Send + Sync {
    fn create_disk_from_image(
        &self,
        instance: &Instance,
        image: &ImageMeta,
    ) -> Result<String, FixtureError>;
    fn connect_disk(&self, instance: &Instance) -> Result<(), FixtureError>;
    fn disconnect_disk(&self, instance: &Instance) -> Result<(), FixtureError>;
    fn delete_disks(&self, instance: &Instance) -> Result<(), FixtureError>;
}

pub trait VolumeAdapter: Send + Sync {
    fn volume_id(&self) -> String;
    fn connect_volume(&self) -> Result<(), FixtureError>;
    fn disconnect_volume(&self) -> Result<(), FixtureError>;
}

/// Builds one volume adapter per attached volume.
pub trait VolumeAdapterFactory: Send + Sync {
    fn build(
        &self,
        instance: &Instance,
        connection_info: &ConnectionInfo,
    ) -> Result<Arc<dyn VolumeAdapter>, FixtureError>;
}

pub trait HostCpuStats: Send + Sync {
    fn refresh(&self) -> Result<(), FixtureError>;
    fn utilization(&self) -> CpuUtilization;
}

/// Management endpoint of the hypervisor.
pub trait ManagementAdapter: Send + Sync {
    fn read(&self, root_type: &str) -> Result<Feed, FixtureError>;
}

/// Convert a cloud instance UUID into the form the hypervisor uses: upper
/// case with the high bit of the first nibble cleared.
pub fn pvm_uuid(uuid: &str) -> String {
    let upper = uuid.to_ascii_uppercase();
    let mut chars = upper.chars();
    match chars.next().and_then(|c| c.to_digit(16)) {
        Some(nibble) if nibble >= 8 => {
            let cleared = char::from_digit(nibble & 0x7, 16).unwrap_or('0');
            format!("{cleared}{}", chars.as_str())
        }
        _ => upper,
    }
}

#[cfg(test)]
mod tests {
    use super::{pvm_uuid, FAKE_INST_UUID, FAKE_INST_UUID_PVM};

    #[test]
    fn pvm_uuid_clears_high_bit_and_uppercases() {
        assert_eq!(pvm_uuid(FAKE_INST_UUID), FAKE_INST_UUID_PVM);
    }

    #[test]
    fn pvm_uuid_leaves_low_first_nibble_alone() {
        assert_eq!(
            pvm_uuid("36513403-fd7f-4ad0-ab27-f73bacbd3929"),
            FAKE_INST_UUID_PVM
        );
        assert_eq!(pvm_uuid("f0000000-0000"), "70000000-0000");
    }
}
