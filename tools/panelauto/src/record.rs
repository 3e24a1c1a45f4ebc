use crate::errors::PanelAutoError;
use crate::script::{AutomationEntry, PanelScript};
use crate::spec_tree::{FieldKind, FieldSpec, FieldSpecTree};
use crate::substitute::escape_literal;
use crate::variables::VariableStore;
use std::collections::{BTreeSet, HashMap};

/// What the recorder needs to know about one displayed field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldView {
    pub variable: Option<String>,
    pub omit_from_auto: bool,
    /// Sub-variables managed by a composite field, in declared order.
    pub composite_variables: Option<Vec<String>>,
}

impl FieldView {
    pub fn bound(variable: impl Into<String>) -> Self {
        Self {
            variable: Some(variable.into()),
            ..Self::default()
        }
    }

    pub fn omitted(mut self) -> Self {
        self.omit_from_auto = true;
        self
    }

    pub fn from_spec(spec: &FieldSpec) -> Self {
        Self {
            variable: spec.variable.clone(),
            omit_from_auto: spec.omit_from_auto,
            composite_variables: (spec.kind == FieldKind::Composite)
                .then(|| spec.sub_variables.clone()),
        }
    }
}

/// Ordered entries plus the keys whose literal must never be persisted.
///
/// A repeated key keeps the slot of its first insertion and the value of its
/// last write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedEntries {
    entries: Vec<AutomationEntry>,
    positions: HashMap<String, usize>,
    omitted: BTreeSet<String>,
}

impl RecordedEntries {
    fn upsert(&mut self, key: &str, value: Option<&str>) {
        let value = value.map(str::to_string);
        match self.positions.get(key) {
            Some(&idx) => self.entries[idx].value = value,
            None => {
                self.positions.insert(key.to_string(), self.entries.len());
                self.entries.push(AutomationEntry {
                    key: key.to_string(),
                    value,
                });
            }
        }
    }

    /// Captured values, omitted keys included. Not for persistence.
    pub fn entries(&self) -> &[AutomationEntry] {
        &self.entries
    }

    pub fn omitted(&self) -> &BTreeSet<String> {
        &self.omitted
    }

    pub fn is_omitted(&self, key: &str) -> bool {
        self.omitted.contains(key)
    }

    /// Serializable form: omitted keys lose their literal, and every other
    /// literal is escaped so replay substitution reproduces it verbatim.
    pub fn to_panel_script(&self, panel_id: impl Into<String>) -> PanelScript {
        let entries = self
            .entries
            .iter()
            .map(|entry| AutomationEntry {
                key: entry.key.clone(),
                value: entry
                    .value
                    .as_deref()
                    .filter(|_| !self.is_omitted(&entry.key))
                    .map(escape_literal),
            })
            .collect();
        PanelScript {
            id: panel_id.into(),
            entries,
        }
    }
}

/// Capture the store's current values for a panel at the end of a live session.
///
/// Direct variables come first, then one pass per view in view order, with a
/// composite view's sub-variables merged right after its own binding.
pub fn generate_entries<S: AsRef<str>>(
    store: &VariableStore,
    direct_variables: &[S],
    views: &[FieldView],
) -> RecordedEntries {
    let mut recorded = RecordedEntries::default();
    for name in direct_variables {
        let name = name.as_ref();
        recorded.upsert(name, store.get(name));
    }
    for view in views {
        if let Some(variable) = view.variable.as_deref() {
            recorded.upsert(variable, store.get(variable));
            if view.omit_from_auto {
                recorded.omitted.insert(variable.to_string());
            }
        }
        for name in view.composite_variables.iter().flatten() {
            recorded.upsert(name, store.get(name));
        }
    }
    recorded
}

/// Record every field declared on `panel_id` without a live GUI.
pub fn record_panel(
    tree: &FieldSpecTree,
    panel_id: &str,
    store: &VariableStore,
    direct_variables: &[String],
) -> Result<PanelScript, PanelAutoError> {
    let views = tree
        .fields(panel_id)?
        .iter()
        .map(FieldView::from_spec)
        .collect::<Vec<_>>();
    Ok(generate_entries(store, direct_variables, &views).to_panel_script(panel_id))
}

#[cfg(test)]
mod tests {
    use super::{generate_entries, FieldView};
    use crate::script::AutomationEntry;
    use crate::variables::VariableStore;

    fn store() -> VariableStore {
        [
            ("install.dir", "/opt/app"),
            ("db.host", "db.internal"),
            ("db.pass", "hunter2"),
            ("hosts.0", "a"),
            ("hosts.1", "b"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn direct_variables_come_first_then_views_in_order() {
        let views = vec![
            FieldView::bound("db.host"),
            FieldView {
                variable: Some("hosts".to_string()),
                omit_from_auto: false,
                composite_variables: Some(vec!["hosts.0".to_string(), "hosts.1".to_string()]),
            },
        ];
        let recorded = generate_entries(&store(), &["install.dir"], &views);
        let keys: Vec<_> = recorded.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["install.dir", "db.host", "hosts", "hosts.0", "hosts.1"]);
        assert_eq!(recorded.entries()[2].value, None);
        assert_eq!(recorded.entries()[3].value.as_deref(), Some("a"));
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_value() {
        let mut store = store();
        let views = vec![FieldView::bound("install.dir"), FieldView::bound("db.host")];
        let before = generate_entries(&store, &["install.dir"], &views);
        assert_eq!(before.entries().len(), 2);
        assert_eq!(before.entries()[0].key, "install.dir");

        store.set("hosts.0", "changed");
        let views = vec![
            FieldView {
                variable: None,
                omit_from_auto: false,
                composite_variables: Some(vec!["hosts.0".to_string()]),
            },
            FieldView::bound("db.host"),
            FieldView::bound("hosts.0"),
        ];
        let recorded = generate_entries(&store, &["hosts.0"], &views);
        assert_eq!(
            recorded.entries(),
            &[
                AutomationEntry::literal("hosts.0", "changed"),
                AutomationEntry::literal("db.host", "db.internal"),
            ]
        );
    }

    #[test]
    fn omitted_fields_never_carry_a_literal_in_the_script() {
        let views = vec![FieldView::bound("db.host"), FieldView::bound("db.pass").omitted()];
        let recorded = generate_entries(&store(), &[] as &[&str], &views);
        assert!(recorded.is_omitted("db.pass"));
        assert_eq!(recorded.entries()[1].value.as_deref(), Some("hunter2"));

        let script = recorded.to_panel_script("db");
        assert_eq!(script.entries[0], AutomationEntry::literal("db.host", "db.internal"));
        assert_eq!(script.entries[1], AutomationEntry::unresolved("db.pass"));
    }

    #[test]
    fn dollar_signs_are_escaped_in_the_script_but_not_in_captured_entries() {
        let store: VariableStore = [("db.pass", "pa$$word"), ("tmpl", "${x}")]
            .into_iter()
            .collect();
        let views = vec![FieldView::bound("db.pass"), FieldView::bound("tmpl")];
        let recorded = generate_entries(&store, &[] as &[&str], &views);
        assert_eq!(recorded.entries()[0].value.as_deref(), Some("pa$$word"));

        let script = recorded.to_panel_script("db");
        assert_eq!(script.entries[0], AutomationEntry::literal("db.pass", "pa$$$$word"));
        assert_eq!(script.entries[1], AutomationEntry::literal("tmpl", "$${x}"));
    }

    #[test]
    fn variables_missing_from_the_store_are_recorded_without_value() {
        let recorded = generate_entries(&VariableStore::new(), &["never.set"], &[]);
        assert_eq!(recorded.entries(), &[AutomationEntry::unresolved("never.set")]);
    }
}
