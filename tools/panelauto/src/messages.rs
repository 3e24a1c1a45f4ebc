use crate::errors::PanelAutoError;
use crate::runtime::FileSystem;
use std::collections::BTreeMap;
use std::path::Path;

pub const MISSING_VALUE_PROMPT: &str = "replay.prompt.missing_value";
pub const MISSING_VALUE_PROMPT_VERIFY: &str = "replay.prompt.missing_value.verify";
pub const VALIDATION_ERROR_TITLE: &str = "data.validation.error.title";

const NAME_PLACEHOLDER: &str = "{name}";

/// Keyed lookup from message id to a localized template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCatalog {
    messages: BTreeMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let mut messages = BTreeMap::new();
        messages.insert(
            MISSING_VALUE_PROMPT.to_string(),
            "Enter value for {name}: ".to_string(),
        );
        messages.insert(
            MISSING_VALUE_PROMPT_VERIFY.to_string(),
            "Re-enter value for {name}: ".to_string(),
        );
        messages.insert(
            VALIDATION_ERROR_TITLE.to_string(),
            "Validation error".to_string(),
        );
        Self { messages }
    }
}

impl MessageCatalog {
    /// Built-in defaults overlaid with a flat TOML table of templates.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, PanelAutoError> {
        let raw = fs.read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, PanelAutoError> {
        let overrides: BTreeMap<String, String> =
            toml::from_str(raw).map_err(|e| PanelAutoError::ConfigParse(e.to_string()))?;
        let mut catalog = Self::default();
        catalog.messages.extend(overrides);
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.messages.get(id).map(String::as_str)
    }

    pub fn insert(&mut self, id: impl Into<String>, template: impl Into<String>) {
        self.messages.insert(id.into(), template.into());
    }

    /// Render the template for `id` with `{name}` replaced; falls back to the id.
    pub fn format(&self, id: &str, name: &str) -> String {
        let template = self.get(id).unwrap_or(id);
        template.replacen(NAME_PLACEHOLDER, name, 1)
    }

    pub fn validation_error_title(&self) -> &str {
        self.get(VALIDATION_ERROR_TITLE).unwrap_or("Validation error")
    }
}
