//! Error types.
//!
//! Two policies coexist: evaluation is fail-closed (callers mostly turn
//! `ExprError` into a neutral default), while content construction is
//! fail-loud (`ContentError` surfaces authoring mistakes at load time).

use std::path::PathBuf;

/// Structural error found while parsing an expression.
///
/// Compilation never fails; the error is stored and returned from every
/// evaluation of the malformed expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("unmatched '(' at position {position}")]
    UnmatchedParen { position: usize },
}

/// Errors raised while compiling content into models.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("IO error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("duplicate action id '{0}'")]
    DuplicateAction(String),
    #[error("duplicate goal id '{0}'")]
    DuplicateGoal(String),
    #[error("goal '{goal}' references unknown action '{action}'")]
    UnknownAction { goal: String, action: String },
    #[error("action '{action}': cannot resolve effect kind (type: {kind:?}, op: {op:?})")]
    UnknownEffect {
        action: String,
        kind: Option<String>,
        op: Option<String>,
    },
    #[error("action '{action}': invalid {effect} effect: {reason}")]
    InvalidEffect {
        action: String,
        effect: &'static str,
        reason: String,
    },
    #[error("goal '{goal}': unknown target selector '{selector}'")]
    UnknownSelector { goal: String, selector: String },
    #[error("{context}: empty id")]
    EmptyId { context: &'static str },
}

/// Errors raised by a planning call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("goal '{goal}': {source}")]
    GoalExpression {
        goal: String,
        #[source]
        source: ExprError,
    },
    #[error("unknown goal '{0}'")]
    UnknownGoal(String),
}

/// Errors loading planner tuning.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Error that can occur during TOML serialization.
#[derive(Debug, thiserror::Error)]
#[error("TOML serialize error: {0}")]
pub struct TomlSerializeError(#[from] pub toml::ser::Error);
