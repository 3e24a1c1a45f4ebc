use crate::errors::PanelAutoError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub spec_path: Option<PathBuf>,
    pub messages_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub prompt_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub spec: SpecConfig,
    pub messages: MessagesConfig,
    pub replay: ReplayConfig,
    pub record: RecordConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagesConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Zero waits forever.
    pub prompt_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordConfig {
    /// Variables a panel affects without a displayed field bound to them.
    pub direct_variables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            spec: SpecConfig {
                path: PathBuf::from("userInputSpec.json"),
            },
            messages: MessagesConfig { path: None },
            replay: ReplayConfig {
                prompt_timeout_seconds: 0,
            },
            record: RecordConfig {
                direct_variables: Vec::new(),
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: 4096,
            },
        }
    }
}

impl AppConfig {
    pub fn prompt_timeout(&self) -> Option<Duration> {
        (self.replay.prompt_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.replay.prompt_timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    spec: Option<PartialSpecConfig>,
    messages: Option<PartialMessagesConfig>,
    replay: Option<PartialReplayConfig>,
    record: Option<PartialRecordConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSpecConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialMessagesConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReplayConfig {
    prompt_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordConfig {
    direct_variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, then the TOML file, then CLI flags. Relative paths resolve
/// against `process_cwd`.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, PanelAutoError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| PanelAutoError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    absolutize_paths(&mut cfg, process_cwd);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(spec) = partial.spec {
        if let Some(path) = spec.path {
            cfg.spec.path = path;
        }
    }

    if let Some(messages) = partial.messages {
        cfg.messages.path = messages.path;
    }

    if let Some(replay) = partial.replay {
        if let Some(value) = replay.prompt_timeout_seconds {
            cfg.replay.prompt_timeout_seconds = value;
        }
    }

    if let Some(record) = partial.record {
        if let Some(value) = record.direct_variables {
            cfg.record.direct_variables = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.spec_path {
        cfg.spec.path = path.clone();
    }
    if let Some(path) = &overrides.messages_path {
        cfg.messages.path = Some(path.clone());
    }
    if let Some(path) = &overrides.log_path {
        cfg.logging.path = Some(path.clone());
    }
    if let Some(seconds) = overrides.prompt_timeout_seconds {
        cfg.replay.prompt_timeout_seconds = seconds;
    }
}

fn absolutize_paths(cfg: &mut AppConfig, base: &Path) {
    cfg.spec.path = absolutize_path(base, &cfg.spec.path);
    if let Some(path) = cfg.messages.path.as_mut() {
        *path = absolutize_path(base, path);
    }
    if let Some(path) = cfg.logging.path.as_mut() {
        *path = absolutize_path(base, path);
    }
}

pub fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), PanelAutoError> {
    if cfg.spec.path.as_os_str().is_empty() {
        return Err(PanelAutoError::InvalidConfig(
            "spec.path must not be empty".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes < 64 {
        return Err(PanelAutoError::InvalidConfig(
            "logging.max_payload_bytes must be at least 64".to_string(),
        ));
    }

    if let Some(name) = cfg
        .record
        .direct_variables
        .iter()
        .find(|name| name.trim().is_empty())
    {
        return Err(PanelAutoError::InvalidConfig(format!(
            "record.direct_variables contains a blank name: {name:?}"
        )));
    }

    Ok(())
}
