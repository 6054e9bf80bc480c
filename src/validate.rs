//! Requirement checks for chosen feats and selected features.

use crate::expr::{AttrLookup, Expr};
use crate::value::is_truthy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `Require` expression of a choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// The expression as written in the choice blob.
    pub text: String,
    /// `None` when the text did not parse; such a requirement is never met.
    pub(crate) expr: Option<Expr>,
}

impl Requirement {
    pub(crate) fn new(text: impl Into<String>, expr: Option<Expr>) -> Self {
        Self {
            text: text.into(),
            expr,
        }
    }

    pub fn is_met(&self, values: &dyn AttrLookup) -> bool {
        match &self.expr {
            Some(expr) => is_truthy(expr.eval(None, values).as_ref()),
            None => false,
        }
    }
}

/// What is wrong with a sheet's choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// The chosen feat or feature does not meet one of its requirements.
    UnmetRequirement { requirement: String },
    /// The sheet picks a choice the rule set does not define.
    UnknownChoice,
    /// The sheet selects a feature its owner does not offer.
    NotSelectable { owner: String },
}

/// A problem found by `Engine::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// `"Feat"` or `"Feature"`.
    pub category: String,
    pub name: String,
    pub kind: IssueKind,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::UnmetRequirement { requirement } => write!(
                f,
                "{} {} requires {}",
                self.category, self.name, requirement
            ),
            IssueKind::UnknownChoice => write!(f, "Unknown {} {}", self.category, self.name),
            IssueKind::NotSelectable { owner } => write!(
                f,
                "{} {} is not selectable by {}",
                self.category, self.name, owner
            ),
        }
    }
}
