use super::{Cleanup, Fixture};
use crate::config::HarnessConfig;
use crate::driver::ComputeDriver;
use crate::errors::{FixtureError, TaskAssertionError};
use crate::fakes::FakeEngine;
use crate::logging::append_run_log;
use crate::runtime::{FileSystem, ProductionFileSystem};
use crate::taskflow::matcher::match_task_names;
use crate::taskflow::{Engine, Flow, FlowFactory, Task, TaskSink};
use crate::trace::{write_trace, TraceEntry};
use serde_json::json;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One `add` call seen by a recording flow.
#[derive(Clone)]
pub struct RecordedTask {
    pub flow: String,
    pub task: Arc<dyn Task>,
}

type TaskLog = Arc<Mutex<Vec<RecordedTask>>>;

fn push(log: &TaskLog, flow: &str, task: Arc<dyn Task>) {
    append_run_log(
        "debug",
        "taskflow.task.recorded",
        json!({ "flow": flow, "task": task.name() }),
    );
    log.lock().expect("task log lock").push(RecordedTask {
        flow: flow.to_string(),
        task,
    });
}

struct RecordingFlow {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
    log: TaskLog,
}

impl TaskSink for RecordingFlow {
    fn add(&mut self, task: Arc<dyn Task>) {
        push(&self.log, &self.name, Arc::clone(&task));
        self.tasks.push(task);
    }
}

impl Flow for RecordingFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.tasks.clone()
    }
}

/// Every flow it creates writes into the same task log.
#[derive(Clone)]
pub struct RecordingFlowFactory {
    log: TaskLog,
    flows: Arc<Mutex<Vec<String>>>,
}

impl FlowFactory for RecordingFlowFactory {
    fn linear_flow(&self, name: &str) -> Box<dyn Flow> {
        self.flows
            .lock()
            .expect("flows lock")
            .push(name.to_string());
        Box::new(RecordingFlow {
            name: name.to_string(),
            tasks: Vec::new(),
            log: Arc::clone(&self.log),
        })
    }
}

/// Records the tasks code under test adds to its flows, so a test can check
/// which tasks were planned without stubbing each one. Flows handed to the
/// engine are never executed.
pub struct TaskFlowFx {
    pub engine: FakeEngine,
    factory: RecordingFlowFactory,
    wildcard: char,
    trace_path: Option<PathBuf>,
    fs: Arc<dyn FileSystem>,
    _cleanup: Cleanup,
}

impl TaskFlowFx {
    pub fn flow_factory(&self) -> Arc<dyn FlowFactory> {
        Arc::new(self.factory.clone())
    }

    pub fn engine_handle(&self) -> Arc<dyn Engine> {
        Arc::new(self.engine.clone())
    }

    /// Append directly to the task log, bypassing any flow.
    pub fn record(&self, task: Arc<dyn Task>) {
        push(&self.factory.log, "", task);
    }

    pub fn tasks_added(&self) -> Vec<RecordedTask> {
        self.factory.log.lock().expect("task log lock").clone()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.factory
            .log
            .lock()
            .expect("task log lock")
            .iter()
            .map(|recorded| recorded.task.name().to_string())
            .collect()
    }

    /// Names of the flows created through `flow_factory`, in order.
    pub fn flows_created(&self) -> Vec<String> {
        self.factory.flows.lock().expect("flows lock").clone()
    }

    pub fn check_tasks_added<S: AsRef<str>>(
        &self,
        expected: &[S],
    ) -> Result<(), TaskAssertionError> {
        let observed = self.task_names();
        let result = match_task_names(expected, &observed, self.wildcard);
        if let Err(err) = &result {
            append_run_log(
                "warn",
                "taskflow.assertion.failed",
                json!({ "error": err.to_string(), "observed": observed }),
            );
            if let Some(path) = &self.trace_path {
                if let Err(write_err) = self.write_trace(self.fs.as_ref(), path) {
                    append_run_log(
                        "warn",
                        "taskflow.trace.write_failed",
                        json!({
                            "path": path.display().to_string(),
                            "error": write_err.to_string()
                        }),
                    );
                }
            }
        }
        result
    }

    /// Panics with the mismatch description unless the recorded tasks match
    /// `expected` in order. A descriptor ending in the wildcard marker
    /// matches any task name with that prefix.
    #[track_caller]
    pub fn assert_tasks_added<S: AsRef<str>>(&self, expected: &[S]) {
        if let Err(err) = self.check_tasks_added(expected) {
            panic!("{err}");
        }
    }

    pub fn write_trace(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), FixtureError> {
        let entries = self
            .tasks_added()
            .into_iter()
            .enumerate()
            .map(|(seq, recorded)| TraceEntry {
                seq: seq as u64,
                flow: recorded.flow,
                name: recorded.task.name().to_string(),
            })
            .collect::<Vec<_>>();
        write_trace(fs, path, &entries)
    }
}

impl Fixture for TaskFlowFx {
    const NAME: &'static str = "task_flow";

    fn set_up(cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Self::set_up_with_fs(cfg, Arc::new(ProductionFileSystem))
    }
}

impl TaskFlowFx {
    /// Same as [`Fixture::set_up`], but failure traces go through `fs`.
    pub fn set_up_with_fs(
        cfg: &HarnessConfig,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, FixtureError> {
        Ok(Self {
            engine: FakeEngine::default(),
            factory: RecordingFlowFactory {
                log: Arc::new(Mutex::new(Vec::new())),
                flows: Arc::new(Mutex::new(Vec::new())),
            },
            wildcard: cfg.wildcard(),
            trace_path: cfg.task_flow.trace_path.clone(),
            fs,
            _cleanup: Cleanup::register(<Self as Fixture>::NAME),
        })
    }
}

/// [`TaskFlowFx`] aimed at the compute driver's own flow factory and engine.
pub struct DriverTaskFlowFx {
    inner: TaskFlowFx,
}

impl DriverTaskFlowFx {
    pub fn install(&self, drv: &mut ComputeDriver) {
        drv.flow_factory = self.inner.flow_factory();
        drv.engine = self.inner.engine_handle();
    }
}

impl Deref for DriverTaskFlowFx {
    type Target = TaskFlowFx;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Fixture for DriverTaskFlowFx {
    const NAME: &'static str = "driver_task_flow";

    fn set_up(cfg: &HarnessConfig) -> Result<Self, FixtureError> {
        Ok(Self {
            inner: TaskFlowFx::set_up(cfg)?,
        })
    }
}
