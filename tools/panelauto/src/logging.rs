use crate::errors::PanelAutoError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

/// Structured observability handed to the engine instead of a global logger.
///
/// Sinks must not fail the caller; write errors are dropped.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent<'_>);
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LogEvent<'_>) {}
}

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), PanelAutoError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PanelAutoError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| PanelAutoError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PanelAutoError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| PanelAutoError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| PanelAutoError::Io(e.to_string()))
    }
}

impl EventSink for JsonlLogger {
    fn emit(&self, event: &LogEvent<'_>) {
        let _ = self.append(event);
    }
}

/// Collects `(level, event_type, payload)` triples in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, String, Value)>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<(String, String, Value)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, kind, _)| kind).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LogEvent<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((
                event.level.to_string(),
                event.event_type.to_string(),
                event.payload.clone(),
            ));
        }
    }
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
