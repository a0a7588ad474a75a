use crate::errors::HoloTutsError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

static RUN_LOG: Mutex<Option<JsonlLogger>> = Mutex::new(None);

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

    /// Appends one JSON line. The payload is truncated to `max_payload_bytes`
    /// and older logs in the same directory are pruned to `budget_bytes`.
    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), HoloTutsError> {
        let log_dir = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = log_dir {
            fs::create_dir_all(dir).map_err(|e| HoloTutsError::Io(e.to_string()))?;
        }

        let mut line = serde_json::to_string(&LogEvent {
            payload: truncate_json(event.payload.clone(), self.max_payload_bytes),
            ..event.clone()
        })
        .map_err(|e| HoloTutsError::Io(e.to_string()))?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| HoloTutsError::Io(e.to_string()))?;

        if let Some(dir) = log_dir {
            enforce_total_budget(dir, self.budget_bytes, &self.path)?;
        }
        Ok(())
    }
}

/// Installs the process-wide run log. Until this is called, `append_run_log`
/// drops events.
pub fn init_run_log(logger: JsonlLogger) {
    if let Ok(mut slot) = RUN_LOG.lock() {
        *slot = Some(logger);
    }
}

/// Uninstalls the run log and returns it.
pub fn shutdown_run_log() -> Option<JsonlLogger> {
    RUN_LOG.lock().ok().and_then(|mut slot| slot.take())
}

pub fn run_log_path() -> Option<PathBuf> {
    RUN_LOG
        .lock()
        .ok()
        .and_then(|slot| slot.as_ref().map(|logger| logger.path.clone()))
}

/// Best-effort append to the run log; logging failures never interrupt a session.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let logger = match RUN_LOG.lock() {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::{
        append_run_log, init_run_log, run_log_path, shutdown_run_log, JsonlLogger, LogEvent,
    };
    use serde_json::json;

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;
        logger.budget_bytes = 1024;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "tutorial_store.save",
                payload: json!({"text": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"event_type\":\"tutorial_store.save\""));
        assert!(text.contains("..."));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 12;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "scene.dictation",
                payload: json!({"t": "ééééééééé"}),
            })
            .expect("append");
        let text = std::fs::read_to_string(&path).expect("read");
        let line: serde_json::Value = serde_json::from_str(text.trim()).expect("valid json");
        assert!(line["payload"].as_str().unwrap_or_default().ends_with("..."));
    }

    #[test]
    fn run_log_writes_once_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.jsonl");
        init_run_log(JsonlLogger::new(&path));
        assert_eq!(run_log_path().as_deref(), Some(path.as_path()));

        append_run_log("warn", "scene.rejected", json!({"state": "main_menu"}));

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("scene.rejected"));
        assert!(shutdown_run_log().is_some());
        assert!(run_log_path().is_none());
    }
}
