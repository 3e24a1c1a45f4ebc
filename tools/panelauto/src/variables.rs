use crate::errors::PanelAutoError;
use crate::runtime::FileSystem;
use std::collections::BTreeMap;
use std::path::Path;

/// Process-wide name → value mapping shared by recording and replay.
///
/// A name that was never written reads as `None`; an explicit empty string is
/// kept as `Some("")`. Replay only treats a present, non-empty value as
/// "already answered".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    values: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Load a flat TOML table of initial values.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, PanelAutoError> {
        let raw = fs.read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, PanelAutoError> {
        let values: BTreeMap<String, String> =
            toml::from_str(raw).map_err(|e| PanelAutoError::ConfigParse(e.to_string()))?;
        Ok(Self { values })
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), PanelAutoError> {
        let rendered = toml::to_string_pretty(&self.values)
            .map_err(|e| PanelAutoError::ConfigParse(e.to_string()))?;
        fs.write_string(path, &rendered)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (name, value) in iter {
            store.set(name, value);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::VariableStore;
    use crate::runtime::FakeFileSystem;
    use std::path::Path;

    #[test]
    fn missing_and_empty_are_distinct() {
        let mut store = VariableStore::new();
        assert_eq!(store.get("install.dir"), None);
        store.set("install.dir", "");
        assert_eq!(store.get("install.dir"), Some(""));
        assert!(!store.has_value("install.dir"));
        store.set("install.dir", "/opt/app");
        assert!(store.has_value("install.dir"));
    }

    #[test]
    fn toml_file_round_trips_through_file_system() {
        let fs = FakeFileSystem::default();
        let store: VariableStore = [("db.port", "5432"), ("db.host", "localhost")]
            .into_iter()
            .collect();
        store
            .save(&fs, Path::new("/vars.toml"))
            .expect("save variables");
        let loaded = VariableStore::load(&fs, Path::new("/vars.toml")).expect("load variables");
        assert_eq!(loaded, store);
    }

    #[test]
    fn non_string_values_are_rejected() {
        let err = VariableStore::from_toml_str("port = 5432").expect_err("integer value");
        assert!(err.to_string().contains("config parse error"));
    }
}
