use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelAutoError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("field specification unavailable: {0}")]
    SpecLoad(String),
    #[error("automation script unreadable: {0}")]
    ScriptLoad(String),
    #[error("no panel `{panel_id}` in the field specification")]
    PanelNotFound { panel_id: String },
    #[error("no field bound to `{key}` in panel `{panel_id}`")]
    FieldNotFound { panel_id: String, key: String },
    #[error("cannot construct validator `{id}`: {reason}")]
    ValidatorConstruction { id: String, reason: String },
    #[error("substitution failed for `{key}`: {reason}")]
    Substitution { key: String, reason: String },
    #[error("input prompt unavailable for `{key}` in panel `{panel_id}`: {reason}")]
    PromptUnavailable {
        panel_id: String,
        key: String,
        reason: String,
    },
    #[error("replay cancelled at `{key}` in panel `{panel_id}`")]
    ReplayCancelled { panel_id: String, key: String },
    #[error("prompt for `{key}` in panel `{panel_id}` timed out after {seconds}s")]
    ReplayTimedOut {
        panel_id: String,
        key: String,
        seconds: u64,
    },
}
