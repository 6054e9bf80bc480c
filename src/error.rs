//! Error types.
//!
//! Build-time problems are represented by `RuleError`. Choice blob parsing
//! reports `ChoiceError` and expression parsing reports `ExprError`; both
//! convert into `RuleError`. Evaluation itself never fails: undefined
//! references resolve to "undefined".

use crate::attr_id::AttrId;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[AttrId]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised while registering rules or building an engine.
///
/// # Examples
///
/// ```rust
/// use rulechain::{AttrId, RuleError};
///
/// let err = RuleError::UnknownOperator("~=".to_string());
/// assert_eq!(err.to_string(), "Unknown rule operator: ~=");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    /// A dependency cycle was detected in the rule graph.
    ///
    /// The path is closed: if A reads B, B reads C and C reads A, the
    /// error holds `[A, B, C, A]`.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<AttrId> },

    /// An operator string that is not one of `=`, `+=`, `*=`, `^=`, `v`, `?`.
    #[error("Unknown rule operator: {0}")]
    UnknownOperator(String),

    /// A rule value expression could not be parsed.
    #[error("Invalid expression for {target}: {source}")]
    Expression {
        target: AttrId,
        #[source]
        source: ExprError,
    },

    /// A choice blob was malformed.
    #[error("Invalid {category} '{name}': {source}")]
    Choice {
        category: String,
        name: String,
        #[source]
        source: ChoiceError,
    },

    /// A choice references another choice that was never registered.
    #[error("Missing {category} '{name}' referenced by {referrer}")]
    MissingChoice {
        category: String,
        name: String,
        referrer: String,
    },

    /// A layer document could not be decoded.
    #[error("Invalid layer: {0}")]
    Layer(String),
}

/// Errors raised while parsing a `Key=value` attribute blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChoiceError {
    /// A segment has no `=` separating key and value.
    #[error("segment '{0}' is missing '='")]
    MissingEquals(String),

    /// A key is empty or contains characters other than letters and digits.
    #[error("invalid key '{0}'")]
    InvalidKey(String),

    /// A quoted item was never closed.
    #[error("unbalanced quote in value of {key}")]
    UnbalancedQuote { key: String },

    /// A value list contains an empty item (`a,,b` or trailing comma).
    #[error("empty item in value of {key}")]
    EmptyItem { key: String },

    /// Text directly follows a closing quote without a comma or space.
    #[error("unexpected text after closing quote in value of {key}")]
    TrailingText { key: String },

    /// A structured entry such as `"3:Smite Evil"` could not be understood.
    #[error("malformed {key} entry '{entry}'")]
    MalformedEntry { key: String, entry: String },
}

/// An expression parse failure with the byte offset where it happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset} in '{input}'")]
pub struct ExprError {
    pub input: String,
    pub offset: usize,
    pub message: String,
}

impl ExprError {
    pub(crate) fn new(input: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            offset,
            message: message.into(),
        }
    }
}
