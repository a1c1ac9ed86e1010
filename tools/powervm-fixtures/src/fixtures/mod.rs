//! Fixtures for driver unit tests.
//!
//! A fixture is built with [`Fixture::set_up`] and torn down when dropped.
//! Each one owns recording fakes and hands out trait-object handles that
//! are injected into the driver in place of the real collaborators.

pub mod collaborators;
pub mod driver;
pub mod taskflow;

pub use collaborators::{DiskAdapterFx, HostCpuStatsFx, ImageApiFx, VolumeAdapterFx};
pub use driver::ComputeDriverFx;
pub use taskflow::{DriverTaskFlowFx, RecordedTask, TaskFlowFx};

use crate::config::HarnessConfig;
use crate::errors::FixtureError;
use crate::logging::append_run_log;
use serde_json::json;

pub trait Fixture: Sized {
    const NAME: &'static str;

    fn set_up(cfg: &HarnessConfig) -> Result<Self, FixtureError>;
}

/// Logs setup on creation and cleanup on drop. Every fixture holds one.
#[derive(Debug)]
pub struct Cleanup {
    name: &'static str,
}

impl Cleanup {
    pub fn register(name: &'static str) -> Self {
        append_run_log("debug", "fixture.setup", json!({ "fixture": name }));
        Self { name }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        append_run_log("debug", "fixture.cleanup", json!({ "fixture": self.name }));
    }
}
