//! Replay of a recorded automation script against the variable store.
//!
//! Entries are processed strictly in order and each one is committed before
//! the next starts, so later values may reference earlier ones. An entry with
//! no literal and no current store value goes through the interactive
//! resolution loop:
//!
//! ```text
//! PROMPTING -> VALIDATING -> VALID   (commit)
//!                         -> INVALID (back to PROMPTING)
//! ```

use crate::errors::PanelAutoError;
use crate::logging::{EventSink, LogEvent, NullSink};
use crate::messages::{MessageCatalog, MISSING_VALUE_PROMPT, MISSING_VALUE_PROMPT_VERIFY};
use crate::prompt::{InputPrompt, PromptFailure, PromptRequest};
use crate::script::{AutomationEntry, AutomationScript};
use crate::spec_tree::{FieldKind, FieldSpecTree};
use crate::substitute::substitute;
use crate::validation::{ChainOutcome, FieldInput, ValidatorChain, ValidatorRegistry};
use crate::variables::VariableStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

static NULL_SINK: NullSink = NullSink;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolutionState {
    Prompting,
    Validating(FieldInput),
    Valid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// The scripted literal was committed.
    Literal,
    /// The operator was asked; `attempts` counts prompting passes.
    Prompted { attempts: u32 },
    /// No literal, but the store already held a value. Nothing was written.
    Unresolved,
}

impl EntryOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Prompted { .. } => "prompted",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub key: String,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub panel_id: String,
    pub entries: Vec<EntryReport>,
}

impl ReplaySummary {
    pub fn prompted(&self) -> usize {
        self.entries
            .iter()
            .filter(|report| matches!(report.outcome, EntryOutcome::Prompted { .. }))
            .count()
    }

    pub fn unresolved_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|report| report.outcome == EntryOutcome::Unresolved)
            .map(|report| report.key.as_str())
            .collect()
    }
}

pub struct ReplayEngine<'a> {
    spec: &'a FieldSpecTree,
    catalog: &'a MessageCatalog,
    registry: &'a ValidatorRegistry,
    prompt: &'a dyn InputPrompt,
    sink: &'a dyn EventSink,
    cancel: CancellationToken,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(
        spec: &'a FieldSpecTree,
        catalog: &'a MessageCatalog,
        registry: &'a ValidatorRegistry,
        prompt: &'a dyn InputPrompt,
    ) -> Self {
        Self {
            spec,
            catalog,
            registry,
            prompt,
            sink: &NULL_SINK,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Replay every panel of `script` in document order.
    pub fn run_script(
        &self,
        script: &AutomationScript,
        store: &mut VariableStore,
    ) -> Result<Vec<ReplaySummary>, PanelAutoError> {
        script
            .panels
            .iter()
            .map(|panel| self.run(&panel.entries, &panel.id, store))
            .collect()
    }

    pub fn run(
        &self,
        entries: &[AutomationEntry],
        panel_id: &str,
        store: &mut VariableStore,
    ) -> Result<ReplaySummary, PanelAutoError> {
        self.log(
            "info",
            "replay.panel.started",
            json!({"panel_id": panel_id, "entries": entries.len()}),
        );
        let mut summary = ReplaySummary {
            panel_id: panel_id.to_string(),
            entries: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            let outcome = self.replay_entry(entry, panel_id, store).map_err(|error| {
                self.log(
                    "error",
                    "replay.entry.failed",
                    json!({"panel_id": panel_id, "key": entry.key, "error": error.to_string()}),
                );
                error
            })?;
            summary.entries.push(EntryReport {
                key: entry.key.clone(),
                outcome,
            });
        }
        self.log(
            "info",
            "replay.panel.finished",
            json!({
                "panel_id": panel_id,
                "entries": summary.entries.len(),
                "prompted": summary.prompted(),
                "unresolved": summary.unresolved_keys(),
            }),
        );
        Ok(summary)
    }

    fn replay_entry(
        &self,
        entry: &AutomationEntry,
        panel_id: &str,
        store: &mut VariableStore,
    ) -> Result<EntryOutcome, PanelAutoError> {
        let key = entry.key.as_str();
        let (resolved, outcome) = match entry.value.as_deref() {
            Some(literal) => (literal.to_string(), EntryOutcome::Literal),
            None if !store.has_value(key) => {
                let (value, attempts) = self.resolve_interactively(panel_id, key)?;
                (value, EntryOutcome::Prompted { attempts })
            }
            None => {
                // Recorded without a value while the store already has one.
                // Installers that commit the absent value here drop the
                // variable; the store instead keeps its current value and
                // callers see the key in `ReplaySummary::unresolved_keys`.
                self.log(
                    "warn",
                    "replay.entry.unresolved",
                    json!({"panel_id": panel_id, "key": key}),
                );
                return Ok(EntryOutcome::Unresolved);
            }
        };

        let value = substitute(key, &resolved, store)?;
        store.set(key, value);
        let attempts = match outcome {
            EntryOutcome::Prompted { attempts } => attempts,
            _ => 0,
        };
        self.log(
            "info",
            "replay.entry.committed",
            json!({
                "panel_id": panel_id,
                "key": key,
                "source": outcome.as_str(),
                "attempts": attempts,
            }),
        );
        Ok(outcome)
    }

    fn resolve_interactively(
        &self,
        panel_id: &str,
        key: &str,
    ) -> Result<(String, u32), PanelAutoError> {
        let field = self.spec.field(panel_id, key)?;
        let chain = ValidatorChain::build(&field.validators, self.registry, self.catalog)?;
        let mut attempts = 0u32;
        let mut state = ResolutionState::Prompting;
        loop {
            state = match state {
                ResolutionState::Prompting => {
                    attempts = attempts.saturating_add(1);
                    ResolutionState::Validating(self.capture(panel_id, key, field.kind)?)
                }
                ResolutionState::Validating(input) => {
                    let outcome = chain.evaluate(&input, &self.cancel, |_, message| {
                        self.report_failure(panel_id, key, message)
                    })?;
                    match outcome {
                        ChainOutcome::Valid => ResolutionState::Valid(input.into_primary()),
                        ChainOutcome::Invalid(failed) => {
                            self.log(
                                "warn",
                                "replay.validation.failed",
                                json!({
                                    "panel_id": panel_id,
                                    "key": key,
                                    "attempt": attempts,
                                    "validators": failed,
                                }),
                            );
                            ResolutionState::Prompting
                        }
                        ChainOutcome::Cancelled => return Err(self.cancelled(panel_id, key)),
                    }
                }
                ResolutionState::Valid(value) => return Ok((value, attempts)),
            };
        }
    }

    /// One prompting pass: a single value, or value plus confirmation for passwords.
    fn capture(
        &self,
        panel_id: &str,
        key: &str,
        kind: FieldKind,
    ) -> Result<FieldInput, PanelAutoError> {
        let primary = self.catalog.format(MISSING_VALUE_PROMPT, key);
        if kind != FieldKind::Password {
            let value = self.ask(panel_id, key, PromptRequest::plain(primary))?;
            return Ok(FieldInput::single(value));
        }
        let verify = self.catalog.format(MISSING_VALUE_PROMPT_VERIFY, key);
        let first = self.ask(panel_id, key, PromptRequest::masked(primary))?;
        let second = self.ask(panel_id, key, PromptRequest::masked(verify))?;
        Ok(FieldInput::new(vec![first, second]))
    }

    fn ask(
        &self,
        panel_id: &str,
        key: &str,
        request: PromptRequest,
    ) -> Result<String, PanelAutoError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(panel_id, key));
        }
        self.prompt
            .request_input(&request)
            .map_err(|failure| self.prompt_error(panel_id, key, failure))
    }

    fn report_failure(
        &self,
        panel_id: &str,
        key: &str,
        message: Option<&str>,
    ) -> Result<(), PanelAutoError> {
        let title = self.catalog.validation_error_title();
        self.prompt
            .emit_error(title, message.unwrap_or(title))
            .map_err(|failure| self.prompt_error(panel_id, key, failure))
    }

    fn prompt_error(&self, panel_id: &str, key: &str, failure: PromptFailure) -> PanelAutoError {
        match failure {
            PromptFailure::Unavailable(reason) => PanelAutoError::PromptUnavailable {
                panel_id: panel_id.to_string(),
                key: key.to_string(),
                reason,
            },
            PromptFailure::TimedOut(after) => PanelAutoError::ReplayTimedOut {
                panel_id: panel_id.to_string(),
                key: key.to_string(),
                seconds: after.as_secs(),
            },
            PromptFailure::Cancelled => self.cancelled(panel_id, key),
        }
    }

    fn cancelled(&self, panel_id: &str, key: &str) -> PanelAutoError {
        PanelAutoError::ReplayCancelled {
            panel_id: panel_id.to_string(),
            key: key.to_string(),
        }
    }

    fn log(&self, level: &str, event_type: &str, payload: serde_json::Value) {
        self.sink.emit(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryOutcome, ReplayEngine};
    use crate::errors::PanelAutoError;
    use crate::logging::MemorySink;
    use crate::messages::MessageCatalog;
    use crate::prompt::{InputPrompt, PromptFailure, PromptRequest};
    use crate::script::AutomationEntry;
    use crate::spec_tree::{FieldSpecTree, SpecElement};
    use crate::validation::ValidatorRegistry;
    use crate::variables::VariableStore;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Answers from a queue and records prompts and errors.
    #[derive(Default)]
    struct QueuedPrompt {
        answers: RefCell<VecDeque<Result<String, PromptFailure>>>,
        asked: RefCell<Vec<PromptRequest>>,
        errors: RefCell<Vec<(String, String)>>,
        /// Prompts and errors interleaved in the order they happened.
        transcript: RefCell<Vec<String>>,
    }

    impl QueuedPrompt {
        fn answering(answers: &[&str]) -> Self {
            let prompt = Self::default();
            for answer in answers {
                prompt.answers.borrow_mut().push_back(Ok(answer.to_string()));
            }
            prompt
        }
    }

    impl InputPrompt for QueuedPrompt {
        fn request_input(&self, request: &PromptRequest) -> Result<String, PromptFailure> {
            self.asked.borrow_mut().push(request.clone());
            self.transcript
                .borrow_mut()
                .push(format!("ask {}", request.text));
            self.answers
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(PromptFailure::Unavailable("no answer queued".into())))
        }

        fn emit_error(&self, title: &str, message: &str) -> Result<(), PromptFailure> {
            self.transcript.borrow_mut().push(format!("error {message}"));
            self.errors
                .borrow_mut()
                .push((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn validator(class: &str, id: Option<&str>, params: &[(&str, &str)]) -> SpecElement {
        let mut element = SpecElement::new("validator").with_attribute("class", class);
        if let Some(id) = id {
            element = element.with_attribute("id", id);
        }
        for (name, value) in params {
            element = element.with_child(
                SpecElement::new("param")
                    .with_attribute("name", *name)
                    .with_attribute("value", *value),
            );
        }
        element
    }

    fn tree() -> FieldSpecTree {
        let panel = SpecElement::new("panel")
            .with_attribute("id", "db")
            .with_child(
                SpecElement::new("field")
                    .with_attribute("variable", "db.port")
                    .with_child(validator("not-empty", None, &[]))
                    .with_child(validator(
                        "integer-range",
                        Some("msg.port"),
                        &[("min", "1"), ("max", "65535")],
                    )),
            )
            .with_child(
                SpecElement::new("field")
                    .with_attribute("variable", "db.pass")
                    .with_attribute("type", "password")
                    .with_child(validator("password-equal", Some("msg.mismatch"), &[])),
            )
            .with_child(SpecElement::new("field").with_attribute("variable", "db.note"));
        FieldSpecTree::new(SpecElement::new("userInput").with_child(panel))
    }

    fn catalog() -> MessageCatalog {
        let mut catalog = MessageCatalog::default();
        catalog.insert("msg.port", "Port must be 1-65535");
        catalog.insert("msg.mismatch", "Passwords differ");
        catalog
    }

    #[test]
    fn literals_are_committed_in_order_with_substitution() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::default();
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let mut store = VariableStore::new();
        let summary = engine
            .run(
                &[
                    AutomationEntry::literal("A", "x"),
                    AutomationEntry::literal("B", "${A}-suffix"),
                ],
                "db",
                &mut store,
            )
            .expect("replay");
        assert_eq!(store.get("B"), Some("x-suffix"));
        assert_eq!(summary.prompted(), 0);
        assert!(prompt.asked.borrow().is_empty());
    }

    #[test]
    fn invalid_input_is_reprompted_with_each_failure_reported() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&["", "99999", "5432"]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let mut store = VariableStore::new();
        let summary = engine
            .run(&[AutomationEntry::unresolved("db.port")], "db", &mut store)
            .expect("replay");

        assert_eq!(store.get("db.port"), Some("5432"));
        assert_eq!(summary.entries[0].outcome, EntryOutcome::Prompted { attempts: 3 });
        let errors = prompt.errors.borrow();
        // "" fails both validators, "99999" only the range check.
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], ("Validation error".to_string(), "Validation error".to_string()));
        assert_eq!(errors[1].1, "Port must be 1-65535");
        assert_eq!(errors[2].1, "Port must be 1-65535");
        assert_eq!(prompt.asked.borrow()[0].text, "Enter value for db.port: ");
    }

    #[test]
    fn password_fields_prompt_twice_per_pass_and_commit_the_primary() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&["s3cret", "typo", "s3cret", "s3cret"]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let mut store = VariableStore::new();
        engine
            .run(&[AutomationEntry::unresolved("db.pass")], "db", &mut store)
            .expect("replay");

        let asked = prompt.asked.borrow();
        assert_eq!(asked.len(), 4);
        assert!(asked.iter().all(|request| request.masked));
        assert_eq!(asked[0].text, "Enter value for db.pass: ");
        assert_eq!(asked[1].text, "Re-enter value for db.pass: ");
        assert_eq!(
            *prompt.transcript.borrow(),
            vec![
                "ask Enter value for db.pass: ",
                "ask Re-enter value for db.pass: ",
                "error Passwords differ",
                "ask Enter value for db.pass: ",
                "ask Re-enter value for db.pass: ",
            ]
        );
        assert_eq!(store.get("db.pass"), Some("s3cret"));
    }

    #[test]
    fn field_without_validators_accepts_first_answer() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&[""]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let mut store = VariableStore::new();
        engine
            .run(&[AutomationEntry::unresolved("db.note")], "db", &mut store)
            .expect("replay");
        assert_eq!(store.get("db.note"), Some(""));
    }

    #[test]
    fn absent_literal_with_existing_store_value_is_reported_unresolved() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::default();
        let sink = MemorySink::default();
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt).with_sink(&sink);
        let mut store: VariableStore = [("db.port", "3306")].into_iter().collect();
        let summary = engine
            .run(&[AutomationEntry::unresolved("db.port")], "db", &mut store)
            .expect("replay");
        assert_eq!(summary.unresolved_keys(), vec!["db.port"]);
        assert_eq!(store.get("db.port"), Some("3306"));
        assert!(prompt.asked.borrow().is_empty());
        assert!(sink
            .event_types()
            .contains(&"replay.entry.unresolved".to_string()));
    }

    #[test]
    fn missing_field_fails_without_touching_the_store() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&["anything"]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let before: VariableStore = [("keep", "me")].into_iter().collect();
        let mut store = before.clone();
        let err = engine
            .run(&[AutomationEntry::unresolved("db.user")], "db", &mut store)
            .expect_err("lookup failure");
        assert!(matches!(err, PanelAutoError::FieldNotFound { ref key, .. } if key == "db.user"));
        assert_eq!(store, before);
        assert!(prompt.asked.borrow().is_empty());
    }

    #[test]
    fn unknown_validator_class_is_a_construction_error() {
        let panel = SpecElement::new("panel").with_attribute("id", "p").with_child(
            SpecElement::new("field")
                .with_attribute("variable", "v")
                .with_child(validator("com.example.Gone", None, &[])),
        );
        let tree = FieldSpecTree::new(SpecElement::new("userInput").with_child(panel));
        let (catalog, registry) = (catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&["x"]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let err = engine
            .run(&[AutomationEntry::unresolved("v")], "p", &mut VariableStore::new())
            .expect_err("construction failure");
        assert!(matches!(err, PanelAutoError::ValidatorConstruction { .. }));
    }

    #[test]
    fn prompt_failures_carry_panel_and_key() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::default();
        prompt
            .answers
            .borrow_mut()
            .push_back(Err(PromptFailure::TimedOut(Duration::from_secs(30))));
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        let err = engine
            .run(&[AutomationEntry::unresolved("db.note")], "db", &mut VariableStore::new())
            .expect_err("timeout");
        match err {
            PanelAutoError::ReplayTimedOut {
                panel_id,
                key,
                seconds,
            } => {
                assert_eq!((panel_id.as_str(), key.as_str(), seconds), ("db", "db.note", 30));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = engine
            .run(&[AutomationEntry::unresolved("db.note")], "db", &mut VariableStore::new())
            .expect_err("no answers left");
        assert!(matches!(err, PanelAutoError::PromptUnavailable { .. }));
    }

    #[test]
    fn cancelled_engine_never_prompts() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::answering(&["5432"]);
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt);
        engine.cancellation().cancel();
        let mut store = VariableStore::new();
        let err = engine
            .run(
                &[
                    AutomationEntry::literal("first", "ok"),
                    AutomationEntry::unresolved("db.port"),
                ],
                "db",
                &mut store,
            )
            .expect_err("cancelled");
        assert!(matches!(err, PanelAutoError::ReplayCancelled { .. }));
        assert_eq!(store.get("first"), Some("ok"));
        assert!(prompt.asked.borrow().is_empty());
    }

    #[test]
    fn substitution_failure_is_fatal_for_the_entry() {
        let (tree, catalog, registry) = (tree(), catalog(), ValidatorRegistry::with_defaults());
        let prompt = QueuedPrompt::default();
        let sink = MemorySink::default();
        let engine = ReplayEngine::new(&tree, &catalog, &registry, &prompt).with_sink(&sink);
        let mut store = VariableStore::new();
        let err = engine
            .run(&[AutomationEntry::literal("B", "${A}")], "db", &mut store)
            .expect_err("unknown reference");
        assert!(matches!(err, PanelAutoError::Substitution { .. }));
        assert_eq!(store.get("B"), None);
        assert_eq!(
            sink.event_types(),
            vec!["replay.panel.started", "replay.entry.failed"]
        );
    }
}
