//! Validator capability, the id → constructor registry, and the chain that
//! runs every declared validator against one captured input.

use crate::errors::PanelAutoError;
use crate::messages::MessageCatalog;
use crate::spec_tree::ValidatorSpec;
use regex::Regex;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Values captured for one prompting pass. Password fields carry two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    values: Vec<String>,
}

impl FieldInput {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self::new(vec![value.into()])
    }

    pub fn primary(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or_default()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_primary(self) -> String {
        self.values.into_iter().next().unwrap_or_default()
    }
}

pub trait FieldValidator: Send + Sync {
    fn validate(&self, input: &FieldInput) -> bool;
    fn message(&self) -> Option<&str>;
}

/// Builds a validator from its declared parameters and resolved message.
/// The `Err` string is the reason reported to the operator.
pub type ValidatorConstructor =
    fn(&[(String, String)], Option<String>) -> Result<Box<dyn FieldValidator>, String>;

pub const NOT_EMPTY: &str = "not-empty";
pub const REGEX: &str = "regex";
pub const PASSWORD_EQUAL: &str = "password-equal";
pub const LENGTH: &str = "length";
pub const INTEGER_RANGE: &str = "integer-range";

#[derive(Clone)]
pub struct ValidatorRegistry {
    constructors: BTreeMap<String, ValidatorConstructor>,
}

impl ValidatorRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(NOT_EMPTY, NotEmptyValidator::construct);
        registry.register(REGEX, RegexValidator::construct);
        registry.register(PASSWORD_EQUAL, PasswordEqualValidator::construct);
        registry.register(LENGTH, LengthValidator::construct);
        registry.register(INTEGER_RANGE, IntegerRangeValidator::construct);
        registry
    }

    /// Later registrations replace earlier ones for the same id.
    pub fn register(&mut self, id: impl Into<String>, constructor: ValidatorConstructor) {
        self.constructors.insert(id.into(), constructor);
    }

    pub fn construct(
        &self,
        spec: &ValidatorSpec,
        catalog: &MessageCatalog,
    ) -> Result<Box<dyn FieldValidator>, PanelAutoError> {
        let constructor =
            self.constructors
                .get(&spec.class)
                .ok_or_else(|| PanelAutoError::ValidatorConstruction {
                    id: spec.class.clone(),
                    reason: "no validator registered under this id".to_string(),
                })?;
        let message = spec
            .message_id
            .as_deref()
            .and_then(|id| catalog.get(id))
            .map(str::to_string);
        constructor(&spec.params, message).map_err(|reason| {
            PanelAutoError::ValidatorConstruction {
                id: spec.class.clone(),
                reason,
            }
        })
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn parse_param<T: std::str::FromStr>(
    params: &[(String, String)],
    name: &str,
) -> Result<Option<T>, String> {
    param(params, name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| format!("parameter `{name}` is not a number: `{raw}`"))
        })
        .transpose()
}

pub struct NotEmptyValidator {
    message: Option<String>,
}

impl NotEmptyValidator {
    fn construct(
        _params: &[(String, String)],
        message: Option<String>,
    ) -> Result<Box<dyn FieldValidator>, String> {
        Ok(Box::new(Self { message }))
    }
}

impl FieldValidator for NotEmptyValidator {
    fn validate(&self, input: &FieldInput) -> bool {
        !input.primary().trim().is_empty()
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Whole-value match against the `pattern` parameter.
pub struct RegexValidator {
    pattern: Regex,
    message: Option<String>,
}

impl RegexValidator {
    fn construct(
        params: &[(String, String)],
        message: Option<String>,
    ) -> Result<Box<dyn FieldValidator>, String> {
        let raw = param(params, "pattern").ok_or("missing parameter `pattern`")?;
        let pattern = Regex::new(&format!("^(?:{raw})$"))
            .map_err(|e| format!("invalid pattern `{raw}`: {e}"))?;
        Ok(Box::new(Self { pattern, message }))
    }
}

impl FieldValidator for RegexValidator {
    fn validate(&self, input: &FieldInput) -> bool {
        self.pattern.is_match(input.primary())
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Passes when every captured value matches the first.
pub struct PasswordEqualValidator {
    message: Option<String>,
}

impl PasswordEqualValidator {
    fn construct(
        _params: &[(String, String)],
        message: Option<String>,
    ) -> Result<Box<dyn FieldValidator>, String> {
        Ok(Box::new(Self { message }))
    }
}

impl FieldValidator for PasswordEqualValidator {
    fn validate(&self, input: &FieldInput) -> bool {
        input.values().windows(2).all(|pair| pair[0] == pair[1])
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Character-count bounds; at least one of `min` / `max` is required.
pub struct LengthValidator {
    min: Option<usize>,
    max: Option<usize>,
    message: Option<String>,
}

impl LengthValidator {
    fn construct(
        params: &[(String, String)],
        message: Option<String>,
    ) -> Result<Box<dyn FieldValidator>, String> {
        let min = parse_param::<usize>(params, "min")?;
        let max = parse_param::<usize>(params, "max")?;
        if min.is_none() && max.is_none() {
            return Err("needs a `min` or `max` parameter".to_string());
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(format!("min {min} exceeds max {max}"));
            }
        }
        Ok(Box::new(Self { min, max, message }))
    }
}

impl FieldValidator for LengthValidator {
    fn validate(&self, input: &FieldInput) -> bool {
        let len = input.primary().chars().count();
        self.min.map_or(true, |min| len >= min) && self.max.map_or(true, |max| len <= max)
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

pub struct IntegerRangeValidator {
    min: Option<i64>,
    max: Option<i64>,
    message: Option<String>,
}

impl IntegerRangeValidator {
    fn construct(
        params: &[(String, String)],
        message: Option<String>,
    ) -> Result<Box<dyn FieldValidator>, String> {
        let min = parse_param::<i64>(params, "min")?;
        let max = parse_param::<i64>(params, "max")?;
        Ok(Box::new(Self { min, max, message }))
    }
}

impl FieldValidator for IntegerRangeValidator {
    fn validate(&self, input: &FieldInput) -> bool {
        let Ok(value) = input.primary().trim().parse::<i64>() else {
            return false;
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

struct ChainLink {
    id: String,
    validator: Box<dyn FieldValidator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Valid,
    /// Ids of the validators that rejected the input, in declaration order.
    Invalid(Vec<String>),
    Cancelled,
}

/// All validators declared on one field, in declaration order.
///
/// Evaluation does not short-circuit: every validator runs and each failure
/// is reported on its own, so one bad input can yield several notifications.
pub struct ValidatorChain {
    links: Vec<ChainLink>,
}

impl ValidatorChain {
    pub fn build(
        specs: &[ValidatorSpec],
        registry: &ValidatorRegistry,
        catalog: &MessageCatalog,
    ) -> Result<Self, PanelAutoError> {
        let links = specs
            .iter()
            .map(|spec| {
                Ok(ChainLink {
                    id: spec.class.clone(),
                    validator: registry.construct(spec, catalog)?,
                })
            })
            .collect::<Result<Vec<_>, PanelAutoError>>()?;
        Ok(Self { links })
    }

    /// Run every validator; `on_failure(id, message)` fires right after each rejection.
    /// An empty chain accepts any input.
    pub fn evaluate<F>(
        &self,
        input: &FieldInput,
        cancel: &CancellationToken,
        mut on_failure: F,
    ) -> Result<ChainOutcome, PanelAutoError>
    where
        F: FnMut(&str, Option<&str>) -> Result<(), PanelAutoError>,
    {
        let mut failed = Vec::new();
        for link in &self.links {
            if cancel.is_cancelled() {
                return Ok(ChainOutcome::Cancelled);
            }
            if !link.validator.validate(input) {
                on_failure(&link.id, link.validator.message())?;
                failed.push(link.id.clone());
            }
        }
        if failed.is_empty() {
            Ok(ChainOutcome::Valid)
        } else {
            Ok(ChainOutcome::Invalid(failed))
        }
    }
}
