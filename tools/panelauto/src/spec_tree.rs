//! Read-only field specification tree.
//!
//! The tree mirrors the installer's user-input document:
//! `panel(id)` → `field(variable, type, omitFromAuto)` → `validator(class, id)`
//! → `param(name, value)`. Composite fields carry their sub-variables as child
//! `field` elements. Lookups are exact attribute matches with no fallback.

use crate::errors::PanelAutoError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const PANEL: &str = "panel";
pub const FIELD: &str = "field";
pub const VALIDATOR: &str = "validator";
pub const PARAM: &str = "param";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecElement {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<SpecElement>,
}

impl SpecElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: SpecElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SpecElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn first_child_with_attribute(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Option<&SpecElement> {
        self.children
            .iter()
            .find(|child| child.name == name && child.attribute(key) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Plain,
    Password,
    Composite,
}

impl FieldKind {
    fn from_type_attribute(value: Option<&str>) -> Self {
        match value {
            Some("password") => Self::Password,
            Some("custom") => Self::Composite,
            _ => Self::Plain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSpec {
    pub class: String,
    pub message_id: Option<String>,
    /// Declaration order is preserved.
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub variable: Option<String>,
    pub kind: FieldKind,
    pub omit_from_auto: bool,
    pub validators: Vec<ValidatorSpec>,
    pub sub_variables: Vec<String>,
}

impl FieldSpec {
    fn from_element(element: &SpecElement) -> Result<Self, PanelAutoError> {
        let validators = element
            .children_named(VALIDATOR)
            .map(validator_from_element)
            .collect::<Result<Vec<_>, _>>()?;
        let kind = FieldKind::from_type_attribute(element.attribute("type"));
        let sub_variables = if kind == FieldKind::Composite {
            element
                .children_named(FIELD)
                .filter_map(|child| child.attribute("variable"))
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            variable: element.attribute("variable").map(str::to_string),
            kind,
            omit_from_auto: element.attribute("omitFromAuto") == Some("true"),
            validators,
            sub_variables,
        })
    }
}

fn validator_from_element(element: &SpecElement) -> Result<ValidatorSpec, PanelAutoError> {
    let class = element.attribute("class").ok_or_else(|| {
        PanelAutoError::SpecLoad("validator element is missing its `class` attribute".to_string())
    })?;
    let params = element
        .children_named(PARAM)
        .map(|param| {
            let name = param.attribute("name").ok_or_else(|| {
                PanelAutoError::SpecLoad(format!("param of validator `{class}` has no `name`"))
            })?;
            let value = param.attribute("value").unwrap_or_default();
            Ok((name.to_string(), value.to_string()))
        })
        .collect::<Result<Vec<_>, PanelAutoError>>()?;
    Ok(ValidatorSpec {
        class: class.to_string(),
        message_id: element.attribute("id").map(str::to_string),
        params,
    })
}

/// Loaded once per replay session and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpecTree {
    root: SpecElement,
}

impl FieldSpecTree {
    pub fn new(root: SpecElement) -> Self {
        Self { root }
    }

    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, PanelAutoError> {
        let raw = fs
            .read_to_string(path)
            .map_err(|e| PanelAutoError::SpecLoad(e.to_string()))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PanelAutoError> {
        let root: SpecElement =
            serde_json::from_str(raw).map_err(|e| PanelAutoError::SpecLoad(e.to_string()))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &SpecElement {
        &self.root
    }

    pub fn panel_ids(&self) -> Vec<&str> {
        self.root
            .children_named(PANEL)
            .filter_map(|panel| panel.attribute("id"))
            .collect()
    }

    pub fn panel(&self, panel_id: &str) -> Option<&SpecElement> {
        self.root.first_child_with_attribute(PANEL, "id", panel_id)
    }

    /// Resolve the field bound to `key` under `panel_id`.
    pub fn field(&self, panel_id: &str, key: &str) -> Result<FieldSpec, PanelAutoError> {
        let not_found = || PanelAutoError::FieldNotFound {
            panel_id: panel_id.to_string(),
            key: key.to_string(),
        };
        let panel = self.panel(panel_id).ok_or_else(not_found)?;
        let field = panel
            .first_child_with_attribute(FIELD, "variable", key)
            .ok_or_else(not_found)?;
        FieldSpec::from_element(field)
    }

    /// All fields declared on a panel, informational ones included.
    pub fn fields(&self, panel_id: &str) -> Result<Vec<FieldSpec>, PanelAutoError> {
        let panel = self
            .panel(panel_id)
            .ok_or_else(|| PanelAutoError::PanelNotFound {
                panel_id: panel_id.to_string(),
            })?;
        panel.children_named(FIELD).map(FieldSpec::from_element).collect()
    }
}
