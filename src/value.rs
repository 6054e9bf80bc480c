//! Attribute values.
//!
//! Character attributes hold numbers, text or booleans. An attribute that
//! has no value is "undefined" and is represented by absence
//! (`Option::None`), never by a sentinel inside `AttrValue`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A defined attribute value.
///
/// # Examples
///
/// ```rust
/// use rulechain::AttrValue;
///
/// let str_mod = AttrValue::from(3);
/// assert_eq!(str_mod.as_number(), Some(3.0));
/// assert_eq!(str_mod.to_string(), "3");
///
/// let race = AttrValue::from("Shifter");
/// assert!(race.is_truthy());
/// assert!(!AttrValue::from(0).is_truthy());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Truthiness: `false`, `0`, NaN and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Bool(b) => *b,
            AttrValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AttrValue::Text(s) => !s.is_empty(),
        }
    }

    /// Numeric view of the value. Booleans count as 1/0 and text is
    /// parsed when it looks like a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Text view, `None` for non-text values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `+` semantics: numbers add, anything involving text concatenates.
    pub fn add(&self, other: &AttrValue) -> AttrValue {
        match (self, other) {
            (AttrValue::Text(_), _) | (_, AttrValue::Text(_)) => {
                AttrValue::Text(format!("{}{}", self, other))
            }
            _ => AttrValue::Number(self.number_or_zero() + other.number_or_zero()),
        }
    }

    /// Compare two values: numerically when both have a numeric view,
    /// otherwise by display text.
    pub fn compare(&self, other: &AttrValue) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }

    /// Loose equality used by `==` in expressions: `1 == "1"` and
    /// `true == 1` hold.
    pub fn loose_eq(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Text(a), AttrValue::Text(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => self.to_string() == other.to_string(),
            },
        }
    }

    fn number_or_zero(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }
}

/// Truthiness of a possibly undefined value.
pub fn is_truthy(value: Option<&AttrValue>) -> bool {
    value.map_or(false, AttrValue::is_truthy)
}

/// Whether a rule whose source holds `value` may fire: the source must
/// be defined and not the boolean `false`.
pub fn is_applicable(value: Option<&AttrValue>) -> bool {
    !matches!(value, None | Some(AttrValue::Bool(false)))
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<u32> for AttrValue {
    fn from(n: u32) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}
