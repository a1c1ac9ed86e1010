use super::{Cleanup, DiskAdapterFx, Fixture, HostCpuStatsFx};
use crate::canned::{load_feed, single_host};
use crate::config::HarnessConfig;
use crate::driver::ComputeDriver;
use crate::errors::FixtureError;
use crate::fakes::{FakeImageApi, FakeManagementAdapter, FakeVolumeAdapterFactory};
use crate::runtime::{FileSystem, ProductionFileSystem};
use std::sync::Arc;

/// A compute driver wired entirely to fakes, with `init_host` already run
/// against the canned managed-system response (trimmed to one host).
pub struct ComputeDriverFx {
    pub drv: ComputeDriver,
    pub adapter: FakeManagementAdapter,
    pub image_api: FakeImageApi,
    pub volume_adapters: FakeVolumeAdapterFactory,
    pub host_cpu_stats: HostCpuStatsFx,
    pub disk_adapter: DiskAdapterFx,
    _cleanup: Cleanup,
}

impl ComputeDriverFx {
    pub fn set_up_with_fs(
        cfg: &HarnessConfig,
        fs: &dyn FileSystem,
    ) -> Result<Self, FixtureError> {
        let cleanup = Cleanup::register(Self::NAME);
        let host_cpu_stats = HostCpuStatsFx::set_up(cfg)?;

        let feed = single_host(load_feed(fs, &cfg.managed_system_path())?)?;
        let adapter = FakeManagementAdapter::with_response(feed);
        let image_api = FakeImageApi::default();
        let volume_adapters = FakeVolumeAdapterFactory::default();
        let disk_adapter = DiskAdapterFx::set_up(cfg)?;

        let mut drv = ComputeDriver::new(
            Arc::new(adapter.clone()),
            Arc::new(image_api.clone()),
            disk_adapter.handle(),
            Arc::new(volume_adapters.clone()),
            host_cpu_stats.handle(),
        );
        drv.init_host(&cfg.host.name)?;

        Ok(Self {
            drv,
            adapter,
            image_api,
            volume_adapters,
            host_cpu_stats,
            disk_adapter,
            _cleanup: cleanup,
        })
    }
}

impl Fixture for ComputeDriverFx {
    const NAME: &'static str = "compute_driver";

    fn set_up(cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Self::set_up_with_fs(cfg, &ProductionFileSystem)
    }
}
