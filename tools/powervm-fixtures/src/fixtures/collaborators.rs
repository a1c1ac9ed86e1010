use super::{Cleanup, Fixture};
use crate::config::HarnessConfig;
use crate::errors::FixtureError;
use crate::fakes::{FakeDiskAdapter, FakeHostCpuStats, FakeImageApi, FakeVolumeAdapterFactory};
use crate::virt::{DiskAdapter, HostCpuStats, ImageApi, VolumeAdapterFactory};
use std::sync::Arc;

/// Stands in for the image service client.
pub struct ImageApiFx {
    pub img_api: FakeImageApi,
    _cleanup: Cleanup,
}

impl ImageApiFx {
    pub fn handle(&self) -> Arc<dyn ImageApi> {
        Arc::new(self.img_api.clone())
    }
}

impl Fixture for ImageApiFx {
    const NAME: &'static str = "image_api";

    fn set_up(_cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Ok(Self {
            img_api: FakeImageApi::default(),
            _cleanup: Cleanup::register(Self::NAME),
        })
    }
}

/// Stands in for the local-storage disk adapter.
pub struct DiskAdapterFx {
    pub std_disk_adpt: FakeDiskAdapter,
    _cleanup: Cleanup,
}

impl DiskAdapterFx {
    pub fn handle(&self) -> Arc<dyn DiskAdapter> {
        Arc::new(self.std_disk_adpt.clone())
    }
}

impl Fixture for DiskAdapterFx {
    const NAME: &'static str = "disk_adapter";

    fn set_up(_cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Ok(Self {
            std_disk_adpt: FakeDiskAdapter::default(),
            _cleanup: Cleanup::register(Self::NAME),
        })
    }
}

pub struct HostCpuStatsFx {
    pub host_cpu_stats: FakeHostCpuStats,
    _cleanup: Cleanup,
}

impl HostCpuStatsFx {
    pub fn handle(&self) -> Arc<dyn HostCpuStats> {
        Arc::new(self.host_cpu_stats.clone())
    }
}

impl Fixture for HostCpuStatsFx {
    const NAME: &'static str = "host_cpu_stats";

    fn set_up(_cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Ok(Self {
            host_cpu_stats: FakeHostCpuStats::default(),
            _cleanup: Cleanup::register(Self::NAME),
        })
    }
}

/// Stands in for the vSCSI volume adapter. Every adapter it builds reports
/// a distinct volume id, so volume task names never collide.
pub struct VolumeAdapterFx {
    pub std_vol_adpt: FakeVolumeAdapterFactory,
    _cleanup: Cleanup,
}

impl VolumeAdapterFx {
    pub fn handle(&self) -> Arc<dyn VolumeAdapterFactory> {
        Arc::new(self.std_vol_adpt.clone())
    }
}

impl Fixture for VolumeAdapterFx {
    const NAME: &'static str = "volume_adapter";

    fn set_up(_cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Ok(Self {
            std_vol_adpt: FakeVolumeAdapterFactory::default(),
            _cleanup: Cleanup::register(Self::NAME),
        })
    }
}
