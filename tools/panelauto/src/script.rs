//! Automation script documents.
//!
//! A script is an ordered list of panels, each an ordered list of
//! `(key, optional value)` entries. An entry without a value must be resolved
//! at replay time.

use crate::errors::PanelAutoError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl AutomationEntry {
    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn unresolved(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelScript {
    pub id: String,
    #[serde(default)]
    pub entries: Vec<AutomationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutomationScript {
    #[serde(default)]
    pub panels: Vec<PanelScript>,
}

impl AutomationScript {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, PanelAutoError> {
        let raw = fs
            .read_to_string(path)
            .map_err(|e| PanelAutoError::ScriptLoad(e.to_string()))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PanelAutoError> {
        let script: Self =
            serde_json::from_str(raw).map_err(|e| PanelAutoError::ScriptLoad(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<(), PanelAutoError> {
        for (panel_idx, panel) in self.panels.iter().enumerate() {
            if panel.id.trim().is_empty() {
                return Err(PanelAutoError::ScriptLoad(format!(
                    "panel[{panel_idx}] has an empty id"
                )));
            }
            for (entry_idx, entry) in panel.entries.iter().enumerate() {
                if entry.key.trim().is_empty() {
                    return Err(PanelAutoError::ScriptLoad(format!(
                        "panel `{}` entry[{entry_idx}] has an empty key",
                        panel.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, PanelAutoError> {
        serde_json::to_string_pretty(self).map_err(|e| PanelAutoError::Io(e.to_string()))
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), PanelAutoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_dir_all(parent)?;
        }
        fs.write_string(path, &self.to_json_string()?)
    }

    pub fn panel(&self, id: &str) -> Option<&PanelScript> {
        self.panels.iter().find(|panel| panel.id == id)
    }
}
