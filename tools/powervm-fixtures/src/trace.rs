//! JSONL dump of the tasks a flow recorder saw, one task per line.

use crate::errors::FixtureError;
use crate::runtime::FileSystem;
use crate::taskflow::matcher::match_task_names;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub seq: u64,
    pub flow: String,
    pub name: String,
}

/// Replace whatever is at `path` with `entries`.
pub fn write_trace(
    fs: &dyn FileSystem,
    path: &Path,
    entries: &[TraceEntry],
) -> Result<(), FixtureError> {
    let mut out = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(|e| FixtureError::Io(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    fs.write_string(path, &out)
}

pub fn read_trace(fs: &dyn FileSystem, path: &Path) -> Result<Vec<TraceEntry>, FixtureError> {
    let text = fs.read_to_string(path)?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(lineno, line)| {
            serde_json::from_str(line).map_err(|e| {
                FixtureError::Io(format!("{}:{}: {e}", path.display(), lineno + 1))
            })
        })
        .collect()
}

/// Run the task matcher against a trace on disk. Entries are ordered by
/// `seq` before matching.
pub fn verify_trace(
    fs: &dyn FileSystem,
    path: &Path,
    expected: &[String],
    wildcard: char,
) -> Result<(), FixtureError> {
    let mut entries = read_trace(fs, path)?;
    entries.sort_by_key(|entry| entry.seq);
    let names = entries
        .into_iter()
        .map(|entry| entry.name)
        .collect::<Vec<_>>();
    match_task_names(expected, &names, wildcard)?;
    Ok(())
}
