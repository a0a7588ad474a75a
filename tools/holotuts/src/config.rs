use crate::errors::HoloTutsError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::types::{SessionPaths, StepIdPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DOCUMENT_NAME: &str = "tutorials.json";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub step_ids: Option<StepIdPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub document_name: String,
    pub step_ids: StepIdPolicy,
    pub background_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Token that ends a marking when it shows up in a dictation hypothesis.
    pub end_keyword: String,
    pub max_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from(".holotuts"),
                document_name: DEFAULT_DOCUMENT_NAME.to_string(),
                step_ids: StepIdPolicy::Stable,
                background_writes: false,
            },
            recording: RecordingConfig {
                end_keyword: "marking".to_string(),
                max_duration_seconds: 300,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    storage: Option<PartialStorageConfig>,
    recording: Option<PartialRecordingConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStorageConfig {
    data_dir: Option<PathBuf>,
    document_name: Option<String>,
    step_ids: Option<StepIdPolicy>,
    background_writes: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordingConfig {
    end_keyword: Option<String>,
    max_duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<(AppConfig, SessionPaths), HoloTutsError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    let paths = resolve_paths(process_cwd, &cfg);
    Ok((cfg, paths))
}

/// Parses a TOML config file on top of the defaults.
pub fn parse_config(contents: &str) -> Result<AppConfig, HoloTutsError> {
    let partial: PartialAppConfig =
        toml::from_str(contents).map_err(|e| HoloTutsError::ConfigParse(e.to_string()))?;
    let mut cfg = AppConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(storage) = partial.storage {
        if let Some(value) = storage.data_dir {
            cfg.storage.data_dir = value;
        }
        if let Some(value) = storage.document_name {
            cfg.storage.document_name = value;
        }
        if let Some(value) = storage.step_ids {
            cfg.storage.step_ids = value;
        }
        if let Some(value) = storage.background_writes {
            cfg.storage.background_writes = value;
        }
    }

    if let Some(recording) = partial.recording {
        if let Some(value) = recording.end_keyword {
            cfg.recording.end_keyword = value;
        }
        if let Some(value) = recording.max_duration_seconds {
            cfg.recording.max_duration_seconds = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(data_dir) = &overrides.data_dir {
        cfg.storage.data_dir = data_dir.clone();
    }
    if let Some(step_ids) = overrides.step_ids {
        cfg.storage.step_ids = step_ids;
    }
}

pub fn resolve_paths(process_cwd: &Path, cfg: &AppConfig) -> SessionPaths {
    let data_dir = absolutize_path(process_cwd, &cfg.storage.data_dir);
    let document_path = data_dir.join(&cfg.storage.document_name);
    let log_path = match &cfg.logging.path {
        Some(path) => absolutize_path(process_cwd, path),
        None => data_dir.join("logs").join("holotuts.jsonl"),
    };
    SessionPaths {
        process_cwd: process_cwd.to_path_buf(),
        data_dir,
        document_path,
        log_path,
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), HoloTutsError> {
    let name = cfg.storage.document_name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(HoloTutsError::InvalidConfig(
            "storage.document_name must be a bare file name".to_string(),
        ));
    }

    if cfg.recording.end_keyword.trim().is_empty() {
        return Err(HoloTutsError::InvalidConfig(
            "recording.end_keyword must not be empty".to_string(),
        ));
    }

    if cfg.recording.max_duration_seconds == 0 {
        return Err(HoloTutsError::InvalidConfig(
            "recording.max_duration_seconds must be greater than zero".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes < 16 {
        return Err(HoloTutsError::InvalidConfig(
            "logging.max_payload_bytes must be at least 16".to_string(),
        ));
    }

    Ok(())
}
