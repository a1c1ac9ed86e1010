use crate::errors::FixtureError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 8 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), FixtureError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| FixtureError::Io(e.to_string()))?;
        }
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncate_json(event.payload.clone(), self.max_payload_bytes),
        })
        .map_err(|e| FixtureError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FixtureError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| FixtureError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            prune_log_dir(parent, self.budget_bytes, &self.path)?;
        }
        Ok(())
    }
}

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

/// Held by tests that install the process-wide run logger.
#[cfg(test)]
pub(crate) static TEST_LOGGER_LOCK: Mutex<()> = Mutex::new(());

fn logger_slot() -> &'static Mutex<Option<JsonlLogger>> {
    RUN_LOGGER.get_or_init(|| Mutex::new(None))
}

/// Route `append_run_log` events to `logger` until `clear_run_logger` is called.
pub fn init_run_logger(logger: JsonlLogger) {
    *logger_slot().lock().expect("run logger lock") = Some(logger);
}

pub fn clear_run_logger() {
    *logger_slot().lock().expect("run logger lock") = None;
}

/// Append a structured event to the run log. No-op when no logger is installed;
/// write failures are dropped so logging never fails a test.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let logger = logger_slot().lock().expect("run logger lock").clone();
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

/// Delete the oldest run logs in `dir` until they fit in `budget_bytes`.
/// Only `.jsonl` files whose name starts with the active log's stem count as
/// run logs, so task traces sharing the directory are left alone. The file
/// currently being written is never removed.
pub fn prune_log_dir(
    dir: &Path,
    budget_bytes: u64,
    active: &Path,
) -> Result<Vec<PathBuf>, FixtureError> {
    let stem = active
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut logs = fs::read_dir(dir)
        .map_err(|e| FixtureError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_run_log(path, &stem))
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            Some((path, meta.len(), meta.modified().ok()))
        })
        .collect::<Vec<_>>();
    logs.sort_by(|a, b| a.2.cmp(&b.2));

    let mut total = logs.iter().map(|(_, len, _)| *len).sum::<u64>();
    let mut deleted = Vec::new();
    for (path, len, _) in logs {
        if total <= budget_bytes {
            break;
        }
        if path == active {
            continue;
        }
        fs::remove_file(&path).map_err(|e| FixtureError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }
    Ok(deleted)
}

fn is_run_log(path: &Path, stem: &str) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == "jsonl")
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(stem))
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
