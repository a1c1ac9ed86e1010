//! Ordered task plans and the engine that runs them.
//!
//! Code under test never builds flows or engines directly. It asks a
//! [`FlowFactory`] for a flow, adds tasks through [`TaskSink::add`], and hands
//! the flow to an [`Engine`]. Tests swap both for recording doubles.

pub mod matcher;

use crate::errors::FixtureError;
use crate::logging::append_run_log;
use serde_json::json;
use std::sync::Arc;

pub trait Task: Send + Sync {
    fn name(&self) -> &str;
    fn execute(&self) -> Result<(), FixtureError>;

    /// Undo a successful `execute` after a later task in the flow failed.
    fn revert(&self) -> Result<(), FixtureError> {
        Ok(())
    }
}

pub trait TaskSink {
    fn add(&mut self, task: Arc<dyn Task>);
}

pub trait Flow: TaskSink + Send {
    fn name(&self) -> &str;
    fn tasks(&self) -> Vec<Arc<dyn Task>>;
}

pub trait FlowFactory: Send + Sync {
    fn linear_flow(&self, name: &str) -> Box<dyn Flow>;
}

pub trait Engine: Send + Sync {
    fn run(&self, flow: Box<dyn Flow>) -> Result<(), FixtureError>;
}

pub struct LinearFlow {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl LinearFlow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }
}

impl TaskSink for LinearFlow {
    fn add(&mut self, task: Arc<dyn Task>) {
        self.tasks.push(task);
    }
}

impl Flow for LinearFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.tasks.clone()
    }
}

pub struct LinearFlowFactory;

impl FlowFactory for LinearFlowFactory {
    fn linear_flow(&self, name: &str) -> Box<dyn Flow> {
        Box::new(LinearFlow::new(name))
    }
}

/// Runs tasks one after another. On failure, every task that already
/// executed is reverted newest first and the failing task's error is returned.
pub struct SerialEngine;

impl Engine for SerialEngine {
    fn run(&self, flow: Box<dyn Flow>) -> Result<(), FixtureError> {
        let tasks = flow.tasks();
        for (index, task) in tasks.iter().enumerate() {
            if let Err(err) = task.execute() {
                append_run_log(
                    "warn",
                    "taskflow.task.failed",
                    json!({
                        "flow": flow.name(),
                        "task": task.name(),
                        "error": err.to_string()
                    }),
                );
                for done in tasks[..index].iter().rev() {
                    if let Err(revert_err) = done.revert() {
                        append_run_log(
                            "error",
                            "taskflow.task.revert_failed",
                            json!({
                                "flow": flow.name(),
                                "task": done.name(),
                                "error": revert_err.to_string()
                            }),
                        );
                    }
                }
                return Err(err);
            }
        }
        append_run_log(
            "debug",
            "taskflow.flow.completed",
            json!({ "flow": flow.name(), "tasks": tasks.len() }),
        );
        Ok(())
    }
}
