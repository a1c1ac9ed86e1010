use crate::canned::MS_HTTPRESP_FILE;
use crate::errors::FixtureError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::taskflow::matcher::DEFAULT_WILDCARD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST_NAME: &str = "FakeHost";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    pub host: HostConfig,
    pub task_flow: TaskFlowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub name: String,
    pub fixtures_dir: PathBuf,
    pub managed_system_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFlowConfig {
    pub wildcard: String,
    pub trace_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: HostConfig {
                name: DEFAULT_HOST_NAME.to_string(),
                fixtures_dir: PathBuf::from(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/tests/fixtures"
                )),
                managed_system_response: MS_HTTPRESP_FILE.to_string(),
            },
            task_flow: TaskFlowConfig {
                wildcard: DEFAULT_WILDCARD.to_string(),
                trace_path: None,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

impl HarnessConfig {
    pub fn wildcard(&self) -> char {
        self.task_flow.wildcard.chars().next().unwrap_or(DEFAULT_WILDCARD)
    }

    pub fn managed_system_path(&self) -> PathBuf {
        self.host.fixtures_dir.join(&self.host.managed_system_response)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialHarnessConfig {
    host: Option<PartialHostConfig>,
    task_flow: Option<PartialTaskFlowConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialHostConfig {
    name: Option<String>,
    fixtures_dir: Option<PathBuf>,
    managed_system_response: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTaskFlowConfig {
    wildcard: Option<String>,
    trace_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

/// Defaults, overlaid with the TOML file at `path` when given. Relative
/// paths in the file resolve against the file's directory.
pub fn load_config(
    path: Option<&Path>,
    fs: &dyn FileSystem,
) -> Result<HarnessConfig, FixtureError> {
    let mut cfg = HarnessConfig::default();

    if let Some(path) = path {
        let contents = fs.read_to_string(path)?;
        let partial: PartialHarnessConfig =
            toml::from_str(&contents).map_err(|e| FixtureError::ConfigParse(e.to_string()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        merge_partial_config(&mut cfg, partial, base);
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut HarnessConfig, partial: PartialHarnessConfig, base: &Path) {
    if let Some(host) = partial.host {
        if let Some(name) = host.name {
            cfg.host.name = name;
        }
        if let Some(dir) = host.fixtures_dir {
            cfg.host.fixtures_dir = absolutize_path(base, &dir);
        }
        if let Some(file) = host.managed_system_response {
            cfg.host.managed_system_response = file;
        }
    }

    if let Some(task_flow) = partial.task_flow {
        if let Some(wildcard) = task_flow.wildcard {
            cfg.task_flow.wildcard = wildcard;
        }
        if let Some(trace) = task_flow.trace_path {
            cfg.task_flow.trace_path = Some(absolutize_path(base, &trace));
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(absolutize_path(base, &path));
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &HarnessConfig) -> Result<(), FixtureError> {
    if cfg.task_flow.wildcard.chars().count() != 1 {
        return Err(FixtureError::InvalidConfig(format!(
            "task_flow.wildcard must be a single character, got {:?}",
            cfg.task_flow.wildcard
        )));
    }
    if cfg.host.name.trim().is_empty() {
        return Err(FixtureError::InvalidConfig(
            "host.name must not be empty".to_string(),
        ));
    }
    if cfg.host.managed_system_response.trim().is_empty() {
        return Err(FixtureError::InvalidConfig(
            "host.managed_system_response must name a file".to_string(),
        ));
    }
    if cfg.logging.max_payload_bytes == 0 {
        return Err(FixtureError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, HarnessConfig, DEFAULT_HOST_NAME};
    use crate::errors::FixtureError;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    #[test]
    fn no_file_yields_defaults() {
        let cfg = load_config(None, &FakeFileSystem::default()).expect("defaults");
        assert_eq!(cfg, HarnessConfig::default());
        assert_eq!(cfg.host.name, DEFAULT_HOST_NAME);
        assert_eq!(cfg.wildcard(), '*');
        assert!(cfg
            .managed_system_path()
            .ends_with("tests/fixtures/fake_managedsystem.json"));
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let fs = FakeFileSystem::with_file(
            "/cfg/harness.toml",
            r#"
[host]
name = "OtherHost"
fixtures_dir = "canned"

[task_flow]
wildcard = "%"

[logging]
path = "/var/log/fx.jsonl"
"#,
        );
        let cfg = load_config(Some(Path::new("/cfg/harness.toml")), &fs).expect("load");
        assert_eq!(cfg.host.name, "OtherHost");
        assert_eq!(cfg.host.fixtures_dir, PathBuf::from("/cfg/canned"));
        assert_eq!(cfg.host.managed_system_response, "fake_managedsystem.json");
        assert_eq!(cfg.wildcard(), '%');
        assert_eq!(cfg.logging.path, Some(PathBuf::from("/var/log/fx.jsonl")));
        assert_eq!(
            cfg.logging.max_payload_bytes,
            HarnessConfig::default().logging.max_payload_bytes
        );
    }

    #[test]
    fn multi_character_wildcard_is_rejected() {
        let fs = FakeFileSystem::with_file("/h.toml", "[task_flow]\nwildcard = \"**\"\n");
        let err = load_config(Some(Path::new("/h.toml")), &fs).expect_err("invalid");
        assert!(matches!(err, FixtureError::InvalidConfig(_)));
    }

    #[test]
    fn unparseable_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/h.toml", "[host\nname = 1");
        let err = load_config(Some(Path::new("/h.toml")), &fs).expect_err("parse");
        assert!(matches!(err, FixtureError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let err = load_config(Some(Path::new("/nope.toml")), &FakeFileSystem::default())
            .expect_err("missing");
        assert!(matches!(err, FixtureError::Io(_)));
    }
}
