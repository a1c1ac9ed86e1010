//! Recording stand-ins for every driver collaborator.
//!
//! Each fake is cheap to clone and clones share state, so a fixture can keep
//! one handle for inspection while the driver owns another.

use crate::errors::FixtureError;
use crate::taskflow::{Engine, Flow};
use crate::virt::{
    ConnectionInfo, CpuUtilization, DiskAdapter, Feed, HostCpuStats, ImageApi, ImageMeta,
    Instance, ManagementAdapter, VolumeAdapter, VolumeAdapterFactory,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default, Clone)]
struct FailSwitch(Arc<Mutex<Option<FixtureError>>>);

impl FailSwitch {
    fn set(&self, error: FixtureError) {
        *self.0.lock().expect("fail lock") = Some(error);
    }

    fn check(&self) -> Result<(), FixtureError> {
        match self.0.lock().expect("fail lock").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default, Clone)]
pub struct FakeImageApi {
    images: Arc<Mutex<BTreeMap<String, ImageMeta>>>,
    gets: Arc<Mutex<Vec<String>>>,
    downloads: Arc<Mutex<Vec<String>>>,
    fail: FailSwitch,
}

impl FakeImageApi {
    pub fn insert_image(&self, image: ImageMeta) {
        self.images
            .lock()
            .expect("images lock")
            .insert(image.id.clone(), image);
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().expect("gets lock").clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().expect("downloads lock").clone()
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }
}

impl ImageApi for FakeImageApi {
    fn get(&self, image_id: &str) -> Result<ImageMeta, FixtureError> {
        self.gets.lock().expect("gets lock").push(image_id.to_string());
        self.fail.check()?;
        let known = self.images.lock().expect("images lock").get(image_id).cloned();
        Ok(known.unwrap_or_else(|| ImageMeta {
            id: image_id.to_string(),
            name: format!("image-{image_id}"),
            size: 0,
            disk_format: "raw".to_string(),
        }))
    }

    fn download(&self, image_id: &str) -> Result<Vec<u8>, FixtureError> {
        self.downloads
            .lock()
            .expect("downloads lock")
            .push(image_id.to_string());
        self.fail.check()?;
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCall {
    CreateFromImage { instance: String, image: String },
    Connect(String),
    Disconnect(String),
    Delete(String),
}

#[derive(Default, Clone)]
pub struct FakeDiskAdapter {
    calls: Arc<Mutex<Vec<DiskCall>>>,
    fail: FailSwitch,
}

impl FakeDiskAdapter {
    pub fn calls(&self) -> Vec<DiskCall> {
        self.calls.lock().expect("disk calls lock").clone()
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }

    fn record(&self, call: DiskCall) -> Result<(), FixtureError> {
        self.calls.lock().expect("disk calls lock").push(call);
        self.fail.check()
    }
}

impl DiskAdapter for FakeDiskAdapter {
    fn create_disk_from_image(
        &self,
        instance: &Instance,
        image: &ImageMeta,
    ) -> Result<String, FixtureError> {
        self.record(DiskCall::CreateFromImage {
            instance: instance.uuid.clone(),
            image: image.id.clone(),
        })?;
        Ok(format!("boot_{}", instance.name))
    }

    fn connect_disk(&self, instance: &Instance) -> Result<(), FixtureError> {
        self.record(DiskCall::Connect(instance.uuid.clone()))
    }

    fn disconnect_disk(&self, instance: &Instance) -> Result<(), FixtureError> {
        self.record(DiskCall::Disconnect(instance.uuid.clone()))
    }

    fn delete_disks(&self, instance: &Instance) -> Result<(), FixtureError> {
        self.record(DiskCall::Delete(instance.uuid.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeCall {
    Connect(String),
    Disconnect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltVolumeAdapter {
    pub instance: String,
    pub connection_info: ConnectionInfo,
    pub volume_id: String,
}

/// Hands out a fresh adapter per `build`. Volume ids end up in task names,
/// so every adapter gets a distinct id unless one was queued explicitly.
#[derive(Default, Clone)]
pub struct FakeVolumeAdapterFactory {
    built: Arc<Mutex<Vec<BuiltVolumeAdapter>>>,
    queued_ids: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<Mutex<Vec<VolumeCall>>>,
    fail: FailSwitch,
}

impl FakeVolumeAdapterFactory {
    pub fn push_volume_id(&self, id: impl Into<String>) {
        self.queued_ids
            .lock()
            .expect("volume ids lock")
            .push_back(id.into());
    }

    pub fn built(&self) -> Vec<BuiltVolumeAdapter> {
        self.built.lock().expect("built lock").clone()
    }

    /// Connect and disconnect calls made on any adapter this factory built.
    pub fn calls(&self) -> Vec<VolumeCall> {
        self.calls.lock().expect("volume calls lock").clone()
    }

    /// Fails the next `build`, or the next connect/disconnect if no build
    /// happens first.
    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }
}

impl VolumeAdapterFactory for FakeVolumeAdapterFactory {
    fn build(
        &self,
        instance: &Instance,
        connection_info: &ConnectionInfo,
    ) -> Result<Arc<dyn VolumeAdapter>, FixtureError> {
        self.fail.check()?;
        let mut built = self.built.lock().expect("built lock");
        let queued = self.queued_ids.lock().expect("volume ids lock").pop_front();
        let volume_id = queued.unwrap_or_else(|| fresh_volume_id(&built));
        built.push(BuiltVolumeAdapter {
            instance: instance.uuid.clone(),
            connection_info: connection_info.clone(),
            volume_id: volume_id.clone(),
        });
        Ok(Arc::new(FakeVolumeAdapter {
            volume_id,
            calls: Arc::clone(&self.calls),
            fail: self.fail.clone(),
        }))
    }
}

fn fresh_volume_id(built: &[BuiltVolumeAdapter]) -> String {
    (built.len()..)
        .map(|seq| format!("vol-{seq:04}"))
        .find(|id| built.iter().all(|adapter| &adapter.volume_id != id))
        .unwrap_or_default()
}

pub struct FakeVolumeAdapter {
    volume_id: String,
    calls: Arc<Mutex<Vec<VolumeCall>>>,
    fail: FailSwitch,
}

impl VolumeAdapter for FakeVolumeAdapter {
    fn volume_id(&self) -> String {
        self.volume_id.clone()
    }

    fn connect_volume(&self) -> Result<(), FixtureError> {
        self.calls
            .lock()
            .expect("volume calls lock")
            .push(VolumeCall::Connect(self.volume_id.clone()));
        self.fail.check()
    }

    fn disconnect_volume(&self) -> Result<(), FixtureError> {
        self.calls
            .lock()
            .expect("volume calls lock")
            .push(VolumeCall::Disconnect(self.volume_id.clone()));
        self.fail.check()
    }
}

#[derive(Default, Clone)]
pub struct FakeHostCpuStats {
    refreshes: Arc<Mutex<u32>>,
    utilization: Arc<Mutex<CpuUtilization>>,
    fail: FailSwitch,
}

impl FakeHostCpuStats {
    pub fn set_utilization(&self, value: CpuUtilization) {
        *self.utilization.lock().expect("utilization lock") = value;
    }

    pub fn refresh_count(&self) -> u32 {
        *self.refreshes.lock().expect("refresh lock")
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }
}

impl HostCpuStats for FakeHostCpuStats {
    fn refresh(&self) -> Result<(), FixtureError> {
        *self.refreshes.lock().expect("refresh lock") += 1;
        self.fail.check()
    }

    fn utilization(&self) -> CpuUtilization {
        *self.utilization.lock().expect("utilization lock")
    }
}

/// Returns the same configured feed for every `read` until changed.
#[derive(Default, Clone)]
pub struct FakeManagementAdapter {
    response: Arc<Mutex<Option<Feed>>>,
    reads: Arc<Mutex<Vec<String>>>,
    fail: FailSwitch,
}

impl FakeManagementAdapter {
    pub fn with_response(feed: Feed) -> Self {
        let adapter = Self::default();
        adapter.set_response(feed);
        adapter
    }

    pub fn set_response(&self, feed: Feed) {
        *self.response.lock().expect("response lock") = Some(feed);
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().expect("reads lock").clone()
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }
}

impl ManagementAdapter for FakeManagementAdapter {
    fn read(&self, root_type: &str) -> Result<Feed, FixtureError> {
        self.reads
            .lock()
            .expect("reads lock")
            .push(root_type.to_string());
        self.fail.check()?;
        self.response
            .lock()
            .expect("response lock")
            .clone()
            .ok_or_else(|| FixtureError::Adapter(format!("no canned response for {root_type}")))
    }
}

/// Accepts flows without executing any of their tasks.
#[derive(Default, Clone)]
pub struct FakeEngine {
    runs: Arc<Mutex<Vec<String>>>,
    fail: FailSwitch,
}

impl FakeEngine {
    /// Names of the flows handed to `run`, in order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().expect("runs lock").clone()
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        self.fail.set(error);
    }
}

impl Engine for FakeEngine {
    fn run(&self, flow: Box<dyn Flow>) -> Result<(), FixtureError> {
        self.runs
            .lock()
            .expect("runs lock")
            .push(flow.name().to_string());
        self.fail.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taskflow::LinearFlow;

    #[test]
    fn volume_factory_hands_out_unique_ids_after_queued_ones() {
        let factory = FakeVolumeAdapterFactory::default();
        factory.push_volume_id("boot-vol");
        let instance = Instance::fake();
        let info = ConnectionInfo::default();

        let ids = (0..3)
            .map(|_| factory.build(&instance, &info).expect("build").volume_id())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["boot-vol", "vol-0001", "vol-0002"]);
        assert_eq!(factory.built().len(), 3);
    }

    #[test]
    fn generated_volume_ids_skip_queued_ones() {
        let factory = FakeVolumeAdapterFactory::default();
        factory.push_volume_id("vol-0001");
        let instance = Instance::fake();
        let info = ConnectionInfo::default();

        let first = factory.build(&instance, &info).expect("first").volume_id();
        let second = factory.build(&instance, &info).expect("second").volume_id();
        let third = factory.build(&instance, &info).expect("third").volume_id();
        assert_eq!(first, "vol-0001");
        assert_ne!(first, second);
        assert_eq!(second, "vol-0002");
        assert_eq!(third, "vol-0003");
    }

    #[test]
    fn volume_calls_are_shared_across_built_adapters() {
        let factory = FakeVolumeAdapterFactory::default();
        let instance = Instance::fake();
        let a = factory
            .build(&instance, &ConnectionInfo::default())
            .expect("a");
        let b = factory
            .build(&instance, &ConnectionInfo::default())
            .expect("b");
        b.connect_volume().expect("connect b");
        a.disconnect_volume().expect("disconnect a");
        assert_eq!(
            factory.calls(),
            vec![
                VolumeCall::Connect("vol-0001".to_string()),
                VolumeCall::Disconnect("vol-0000".to_string()),
            ]
        );
    }

    #[test]
    fn image_api_synthesizes_unknown_images_and_records_calls() {
        let api = FakeImageApi::default();
        api.insert_image(ImageMeta {
            id: "img-1".to_string(),
            name: "rhel".to_string(),
            size: 1024,
            disk_format: "qcow2".to_string(),
        });
        assert_eq!(api.get("img-1").expect("known").name, "rhel");
        assert_eq!(api.get("img-2").expect("unknown").id, "img-2");
        assert_eq!(api.gets(), vec!["img-1", "img-2"]);

        api.set_fail_next(FixtureError::Adapter("glance down".to_string()));
        assert!(api.download("img-1").is_err());
        assert!(api.download("img-1").is_ok());
        assert_eq!(api.downloads().len(), 2);
    }

    #[test]
    fn management_adapter_without_response_errors() {
        let adapter = FakeManagementAdapter::default();
        assert!(adapter.read("ManagedSystem").is_err());
        adapter.set_response(Feed::default());
        assert_eq!(adapter.read("ManagedSystem").expect("feed"), Feed::default());
        assert_eq!(adapter.reads(), vec!["ManagedSystem", "ManagedSystem"]);
    }

    #[test]
    fn fake_engine_records_flow_names_only() {
        let engine = FakeEngine::default();
        engine
            .run(Box::new(LinearFlow::new("spawn_x")))
            .expect("run");
        engine.set_fail_next(FixtureError::Task("engine".to_string()));
        assert!(engine.run(Box::new(LinearFlow::new("destroy_x"))).is_err());
        assert_eq!(engine.runs(), vec!["spawn_x", "destroy_x"]);
    }

    #[test]
    fn host_cpu_stats_counts_refreshes() {
        let stats = FakeHostCpuStats::default();
        stats.refresh().expect("refresh");
        stats.refresh().expect("refresh");
        stats.set_utilization(CpuUtilization {
            user_ns: 5,
            ..CpuUtilization::default()
        });
        assert_eq!(stats.refresh_count(), 2);
        assert_eq!(stats.utilization().user_ns, 5);
    }
}
