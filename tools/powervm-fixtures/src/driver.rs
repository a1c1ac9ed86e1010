//! A deliberately small compute driver: enough surface to exercise every
//! fixture in this crate.

use crate::errors::FixtureError;
use crate::logging::append_run_log;
use crate::taskflow::{Engine, FlowFactory, LinearFlowFactory, SerialEngine, Task, TaskSink};
use crate::virt::{
    pvm_uuid, ConnectionInfo, DiskAdapter, HostCpuStats, ImageApi, Instance, ManagedSystem,
    ManagementAdapter, VolumeAdapter, VolumeAdapterFactory,
};
use serde_json::json;
use std::sync::Arc;

pub const MANAGED_SYSTEM_ROOT: &str = "ManagedSystem";

pub struct ComputeDriver {
    pub adapter: Arc<dyn ManagementAdapter>,
    pub image_api: Arc<dyn ImageApi>,
    pub disk_dvr: Arc<dyn DiskAdapter>,
    pub volume_adapters: Arc<dyn VolumeAdapterFactory>,
    pub host_cpu_stats: Arc<dyn HostCpuStats>,
    pub flow_factory: Arc<dyn FlowFactory>,
    pub engine: Arc<dyn Engine>,
    host: Option<(String, ManagedSystem)>,
}

impl ComputeDriver {
    /// Driver with the production flow factory and serial engine.
    pub fn new(
        adapter: Arc<dyn ManagementAdapter>,
        image_api: Arc<dyn ImageApi>,
        disk_dvr: Arc<dyn DiskAdapter>,
        volume_adapters: Arc<dyn VolumeAdapterFactory>,
        host_cpu_stats: Arc<dyn HostCpuStats>,
    ) -> Self {
        Self {
            adapter,
            image_api,
            disk_dvr,
            volume_adapters,
            host_cpu_stats,
            flow_factory: Arc::new(LinearFlowFactory),
            engine: Arc::new(SerialEngine),
            host: None,
        }
    }

    pub fn init_host(&mut self, host_name: &str) -> Result<(), FixtureError> {
        self.host_cpu_stats.refresh()?;
        let feed = self.adapter.read(MANAGED_SYSTEM_ROOT)?;
        let system = feed.entries.into_iter().next().ok_or_else(|| {
            FixtureError::Adapter(format!("no managed system found for {host_name}"))
        })?;
        append_run_log(
            "info",
            "driver.host.initialized",
            json!({
                "host": host_name,
                "system_name": system.system_name,
                "uuid": system.uuid
            }),
        );
        self.host = Some((host_name.to_string(), system));
        Ok(())
    }

    pub fn host(&self) -> Option<&ManagedSystem> {
        self.host.as_ref().map(|(_, system)| system)
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn spawn(
        &self,
        instance: &Instance,
        image_id: &str,
        volumes: &[ConnectionInfo],
    ) -> Result<(), FixtureError> {
        self.require_host("spawn")?;
        let vol_drvs = self.build_volume_adapters(instance, volumes)?;

        let mut flow = self
            .flow_factory
            .linear_flow(&format!("spawn_{}", instance.uuid));
        flow.add(Arc::new(CreateVm {
            vm_id: pvm_uuid(&instance.uuid),
        }));
        if vol_drvs.is_empty() {
            flow.add(Arc::new(CreateDiskFromImage {
                instance: instance.clone(),
                image_id: image_id.to_string(),
                image_api: Arc::clone(&self.image_api),
                disk_dvr: Arc::clone(&self.disk_dvr),
            }));
            flow.add(Arc::new(ConnectDisk {
                instance: instance.clone(),
                disk_dvr: Arc::clone(&self.disk_dvr),
            }));
        }
        for vol_drv in vol_drvs {
            flow.add(Arc::new(ConnectVolume::new(vol_drv)));
        }
        flow.add(Arc::new(PowerVm::on(&instance.uuid)));

        append_run_log(
            "info",
            "driver.spawn.started",
            json!({ "instance": instance.uuid, "image": image_id, "volumes": volumes.len() }),
        );
        self.engine.run(flow)
    }

    pub fn destroy(
        &self,
        instance: &Instance,
        volumes: &[ConnectionInfo],
    ) -> Result<(), FixtureError> {
        self.require_host("destroy")?;
        let vol_drvs = self.build_volume_adapters(instance, volumes)?;

        let mut flow = self
            .flow_factory
            .linear_flow(&format!("destroy_{}", instance.uuid));
        flow.add(Arc::new(PowerVm::off(&instance.uuid)));
        let boot_from_volume = !vol_drvs.is_empty();
        for vol_drv in vol_drvs {
            flow.add(Arc::new(DisconnectVolume::new(vol_drv)));
        }
        if !boot_from_volume {
            flow.add(Arc::new(DeleteDisk {
                instance: instance.clone(),
                disk_dvr: Arc::clone(&self.disk_dvr),
            }));
        }
        flow.add(Arc::new(DeleteVm {
            vm_id: pvm_uuid(&instance.uuid),
        }));

        append_run_log(
            "info",
            "driver.destroy.started",
            json!({ "instance": instance.uuid, "volumes": volumes.len() }),
        );
        self.engine.run(flow)
    }

    fn require_host(&self, operation: &str) -> Result<(), FixtureError> {
        if self.host.is_none() {
            return Err(FixtureError::NotInitialized(format!(
                "{operation} called before init_host"
            )));
        }
        Ok(())
    }

    fn build_volume_adapters(
        &self,
        instance: &Instance,
        volumes: &[ConnectionInfo],
    ) -> Result<Vec<Arc<dyn VolumeAdapter>>, FixtureError> {
        volumes
            .iter()
            .map(|info| self.volume_adapters.build(instance, info))
            .collect()
    }
}

struct CreateVm {
    vm_id: String,
}

impl Task for CreateVm {
    fn name(&self) -> &str {
        "crt_vm"
    }

    fn execute(&self) -> Result<(), FixtureError> {
        append_run_log("debug", "driver.vm.created", json!({ "vm": self.vm_id }));
        Ok(())
    }
}

struct CreateDiskFromImage {
    instance: Instance,
    image_id: String,
    image_api: Arc<dyn ImageApi>,
    disk_dvr: Arc<dyn DiskAdapter>,
}

impl Task for CreateDiskFromImage {
    fn name(&self) -> &str {
        "crt_disk_from_img"
    }

    fn execute(&self) -> Result<(), FixtureError> {
        let image = self.image_api.get(&self.image_id)?;
        let disk = self.disk_dvr.create_disk_from_image(&self.instance, &image)?;
        append_run_log(
            "debug",
            "driver.disk.created",
            json!({ "instance": self.instance.uuid, "disk": disk }),
        );
        Ok(())
    }

    fn revert(&self) -> Result<(), FixtureError> {
        self.disk_dvr.delete_disks(&self.instance)
    }
}

struct ConnectDisk {
    instance: Instance,
    disk_dvr: Arc<dyn DiskAdapter>,
}

impl Task for ConnectDisk {
    fn name(&self) -> &str {
        "connect_disk"
    }

    fn execute(&self) -> Result<(), FixtureError> {
        self.disk_dvr.connect_disk(&self.instance)
    }

    fn revert(&self) -> Result<(), FixtureError> {
        self.disk_dvr.disconnect_disk(&self.instance)
    }
}

struct DeleteDisk {
    instance: Instance,
    disk_dvr: Arc<dyn DiskAdapter>,
}

impl Task for DeleteDisk {
    fn name(&self) -> &str {
        "dlt_disk"
    }

    fn execute(&self) -> Result<(), FixtureError> {
        self.disk_dvr.disconnect_disk(&self.instance)?;
        self.disk_dvr.delete_disks(&self.instance)
    }
}

struct ConnectVolume {
    name: String,
    vol_drv: Arc<dyn VolumeAdapter>,
}

impl ConnectVolume {
    fn new(vol_drv: Arc<dyn VolumeAdapter>) -> Self {
        Self {
            name: format!("connect_vol_{}", vol_drv.volume_id()),
            vol_drv,
        }
    }
}

impl Task for ConnectVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<(), FixtureError> {
        self.vol_drv.connect_volume()
    }

    fn revert(&self) -> Result<(), FixtureError> {
        self.vol_drv.disconnect_volume()
    }
}

struct DisconnectVolume {
    name: String,
    vol_drv: Arc<dyn VolumeAdapter>,
}

impl DisconnectVolume {
    fn new(vol_drv: Arc<dyn VolumeAdapter>) -> Self {
        Self {
            name: format!("disconnect_vol_{}", vol_drv.volume_id()),
            vol_drv,
        }
    }
}

impl Task for DisconnectVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<(), FixtureError> {
        self.vol_drv.disconnect_volume()
    }
}

struct PowerVm {
    name: &'static str,
    vm_id: String,
}

impl PowerVm {
    fn on(uuid: &str) -> Self {
        Self {
            name: "pwr_on_vm",
            vm_id: pvm_uuid(uuid),
        }
    }

    fn off(uuid: &str) -> Self {
        Self {
            name: "pwr_off_vm",
            vm_id: pvm_uuid(uuid),
        }
    }
}

impl Task for PowerVm {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self) -> Result<(), FixtureError> {
        append_run_log(
            "debug",
            "driver.vm.power",
            json!({ "vm": self.vm_id, "task": self.name }),
        );
        Ok(())
    }
}

struct DeleteVm {
    vm_id: String,
}

impl Task for DeleteVm {
    fn name(&self) -> &str {
        "dlt_vm"
    }

    fn execute(&self) -> Result<(), FixtureError> {
        append_run_log("debug", "driver.vm.deleted", json!({ "vm": self.vm_id }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ComputeDriver;
    use crate::errors::FixtureError;
    use crate::fakes::{
        DiskCall, FakeDiskAdapter, FakeHostCpuStats, FakeImageApi, FakeManagementAdapter,
        FakeVolumeAdapterFactory, VolumeCall,
    };
    use crate::virt::{
        ConnectionInfo, DiskAdapter, Feed, ImageMeta, Instance, ManagedSystem, FAKE_INST_UUID,
    };
    use std::sync::Arc;

    fn system(name: &str) -> ManagedSystem {
        ManagedSystem {
            uuid: format!("{name}-uuid"),
            system_name: name.to_string(),
            machine_type: "8247".to_string(),
            model: "22L".to_string(),
            serial: "2125D4A".to_string(),
            memory_total_mb: 65536,
            memory_free_mb: 32768,
            proc_units_total: 20.0,
            proc_units_avail: 10.0,
        }
    }

    struct Parts {
        adapter: FakeManagementAdapter,
        disk: FakeDiskAdapter,
        volumes: FakeVolumeAdapterFactory,
        stats: FakeHostCpuStats,
        driver: ComputeDriver,
    }

    fn parts(feed: Feed) -> Parts {
        let adapter = FakeManagementAdapter::with_response(feed);
        let disk = FakeDiskAdapter::default();
        let volumes = FakeVolumeAdapterFactory::default();
        let stats = FakeHostCpuStats::default();
        let driver = ComputeDriver::new(
            Arc::new(adapter.clone()),
            Arc::new(FakeImageApi::default()),
            Arc::new(disk.clone()),
            Arc::new(volumes.clone()),
            Arc::new(stats.clone()),
        );
        Parts {
            adapter,
            disk,
            volumes,
            stats,
            driver,
        }
    }

    #[test]
    fn init_host_keeps_first_managed_system() {
        let mut p = parts(Feed {
            entries: vec![system("first"), system("second")],
        });
        p.driver.init_host("FakeHost").expect("init");
        assert_eq!(p.driver.host().expect("host").system_name, "first");
        assert_eq!(p.driver.host_name(), Some("FakeHost"));
        assert_eq!(p.adapter.reads(), vec!["ManagedSystem"]);
        assert_eq!(p.stats.refresh_count(), 1);
    }

    #[test]
    fn init_host_with_empty_feed_fails() {
        let mut p = parts(Feed::default());
        assert!(matches!(
            p.driver.init_host("FakeHost"),
            Err(FixtureError::Adapter(_))
        ));
        assert!(p.driver.host().is_none());
    }

    #[test]
    fn spawn_before_init_host_is_rejected() {
        let p = parts(Feed::default());
        let err = p
            .driver
            .spawn(&Instance::fake(), "img", &[])
            .expect_err("not initialized");
        assert!(matches!(err, FixtureError::NotInitialized(_)));
    }

    #[test]
    fn spawn_from_image_runs_disk_tasks_through_serial_engine() {
        let mut p = parts(Feed {
            entries: vec![system("host")],
        });
        p.driver.init_host("FakeHost").expect("init");
        p.driver
            .spawn(&Instance::fake(), "img-1", &[])
            .expect("spawn");
        assert_eq!(
            p.disk.calls(),
            vec![
                DiskCall::CreateFromImage {
                    instance: FAKE_INST_UUID.to_string(),
                    image: "img-1".to_string(),
                },
                DiskCall::Connect(FAKE_INST_UUID.to_string()),
            ]
        );
    }

    #[test]
    fn failed_disk_create_aborts_spawn() {
        let mut p = parts(Feed {
            entries: vec![system("host")],
        });
        p.driver.init_host("FakeHost").expect("init");
        p.disk
            .set_fail_next(FixtureError::Adapter("no vios".to_string()));
        let err = p
            .driver
            .spawn(&Instance::fake(), "img-1", &[])
            .expect_err("create fails");
        assert!(err.to_string().contains("no vios"));
        assert_eq!(p.disk.calls().len(), 1);
    }

    struct ConnectFailsDisk {
        inner: FakeDiskAdapter,
    }

    impl DiskAdapter for ConnectFailsDisk {
        fn create_disk_from_image(
            &self,
            instance: &Instance,
            image: &ImageMeta,
        ) -> Result<String, FixtureError> {
            self.inner.create_disk_from_image(instance, image)
        }

        fn connect_disk(&self, _instance: &Instance) -> Result<(), FixtureError> {
            Err(FixtureError::Adapter("connect refused".to_string()))
        }

        fn disconnect_disk(&self, instance: &Instance) -> Result<(), FixtureError> {
            self.inner.disconnect_disk(instance)
        }

        fn delete_disks(&self, instance: &Instance) -> Result<(), FixtureError> {
            self.inner.delete_disks(instance)
        }
    }

    #[test]
    fn failed_disk_connect_reverts_created_disk() {
        let mut p = parts(Feed {
            entries: vec![system("host")],
        });
        p.driver.disk_dvr = Arc::new(ConnectFailsDisk {
            inner: p.disk.clone(),
        });
        p.driver.init_host("FakeHost").expect("init");
        let err = p
            .driver
            .spawn(&Instance::fake(), "img-1", &[])
            .expect_err("connect fails");
        assert!(err.to_string().contains("connect refused"));
        assert_eq!(
            p.disk.calls(),
            vec![
                DiskCall::CreateFromImage {
                    instance: FAKE_INST_UUID.to_string(),
                    image: "img-1".to_string(),
                },
                DiskCall::Delete(FAKE_INST_UUID.to_string()),
            ]
        );
    }

    #[test]
    fn boot_from_volume_connects_each_volume() {
        let mut p = parts(Feed {
            entries: vec![system("host")],
        });
        p.driver.init_host("FakeHost").expect("init");
        let volumes = vec![ConnectionInfo::default(), ConnectionInfo::default()];
        p.driver
            .spawn(&Instance::fake(), "img-1", &volumes)
            .expect("spawn");
        assert!(p.disk.calls().is_empty());
        assert_eq!(
            p.volumes.calls(),
            vec![
                VolumeCall::Connect("vol-0000".to_string()),
                VolumeCall::Connect("vol-0001".to_string()),
            ]
        );
    }

    #[test]
    fn destroy_local_disk_disconnects_then_deletes() {
        let mut p = parts(Feed {
            entries: vec![system("host")],
        });
        p.driver.init_host("FakeHost").expect("init");
        p.driver.destroy(&Instance::fake(), &[]).expect("destroy");
        assert_eq!(
            p.disk.calls(),
            vec![
                DiskCall::Disconnect(FAKE_INST_UUID.to_string()),
                DiskCall::Delete(FAKE_INST_UUID.to_string()),
            ]
        );
    }
}
