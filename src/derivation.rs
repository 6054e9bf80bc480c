//! Derivation breakdowns.
//!
//! Contains the `Derivation` type, which records how an attribute got its
//! value: the input it started from and every rule that contributed, in
//! combination order.

use crate::attr_id::AttrId;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How one attribute was computed.
///
/// # Examples
///
/// ```rust
/// use rulechain::{AttrId, AttrValue, Derivation};
///
/// let mut d = Derivation::new(AttrId::new("save.Fortitude"));
/// d.base = Some(AttrValue::from(1));
/// d.add_contribution("+= 2 + floor(source / 2) from levels.Fighter", AttrValue::from(3));
/// d.value = Some(AttrValue::from(4));
///
/// assert_eq!(d.contributions.len(), 1);
/// assert!(d.to_string().contains("save.Fortitude = 4"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    pub attr: AttrId,
    /// The final value, `None` when undefined.
    pub value: Option<AttrValue>,
    /// The sheet's input value for this attribute, if any.
    pub base: Option<AttrValue>,
    /// A gate rule did not pass; the input and the rules after the gate
    /// were ignored.
    pub gated: bool,
    /// Firing rules with the value each contributed, in combination order.
    pub contributions: Vec<(String, AttrValue)>,
}

impl Derivation {
    pub fn new(attr: AttrId) -> Self {
        Self {
            attr,
            value: None,
            base: None,
            gated: false,
            contributions: Vec::new(),
        }
    }

    pub fn add_contribution(&mut self, description: impl Into<String>, value: AttrValue) {
        self.contributions.push((description.into(), value));
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => writeln!(f, "{} = {}", self.attr, value)?,
            None => writeln!(f, "{} is undefined", self.attr)?,
        }
        if self.gated {
            writeln!(f, "  gated off")?;
        }
        if let Some(base) = &self.base {
            writeln!(f, "  input: {}", base)?;
        }
        for (description, value) in &self.contributions {
            writeln!(f, "  {} -> {}", description, value)?;
        }
        Ok(())
    }
}
