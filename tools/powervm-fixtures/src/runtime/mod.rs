//! File access seam used for config, canned responses and task traces.

use crate::errors::FixtureError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, FixtureError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), FixtureError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, FixtureError> {
        fs::read_to_string(path)
            .map_err(|e| FixtureError::Io(format!("{}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), FixtureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FixtureError::Io(e.to_string()))?;
        }
        fs::write(path, contents).map_err(|e| FixtureError::Io(e.to_string()))
    }
}

/// In-memory file system. Clones share the same backing map.
#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, String>>>,
    fail_next: Arc<Mutex<Option<FixtureError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    pub fn set_fail_next(&self, error: FixtureError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    fn maybe_fail(&self) -> Result<(), FixtureError> {
        match self.fail_next.lock().expect("fail lock").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, FixtureError> {
        self.maybe_fail()?;
        self.file(path)
            .ok_or_else(|| FixtureError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), FixtureError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}
