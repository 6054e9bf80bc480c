//! Attribute identifier module.
//!
//! Provides the `AttrId` type, an interned dotted-path identifier for
//! character attributes such as `levels.Artificer` or `combatNotes.smiteEvil`.
//! Uses `Arc<str>` for memory efficiency and fast comparison.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Interned string identifier for attributes.
///
/// The segment before the first dot is the attribute's category
/// (`levels`, `features`, `skills`, `combatNotes`, ...). Identifiers may
/// contain spaces, e.g. `features.Power Attack`.
///
/// # Examples
///
/// ```rust
/// use rulechain::AttrId;
///
/// let id = AttrId::new("combatNotes.smiteEvil");
/// assert_eq!(id.category(), "combatNotes");
/// assert_eq!(id.key(), Some("smiteEvil"));
///
/// let plain: AttrId = "charismaModifier".into();
/// assert_eq!(plain.category(), "charismaModifier");
/// assert_eq!(plain.key(), None);
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttrId(Arc<str>);

impl Serialize for AttrId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttrId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(AttrId::from(s))
    }
}

impl AttrId {
    /// Create a new `AttrId` from a string slice.
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Build `<category>.<key>`.
    ///
    /// ```rust
    /// use rulechain::AttrId;
    ///
    /// assert_eq!(AttrId::join("features", "Longtooth").as_str(), "features.Longtooth");
    /// ```
    pub fn join(category: &str, key: &str) -> Self {
        Self::from(format!("{}.{}", category, key))
    }

    /// Get the string representation of this `AttrId`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace segment before the first dot, or the whole id.
    pub fn category(&self) -> &str {
        match self.0.find('.') {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// Everything after the first dot, if there is a dot.
    pub fn key(&self) -> Option<&str> {
        self.0.find('.').map(|pos| &self.0[pos + 1..])
    }

    /// `<self>.<n>`, the attribute holding the `%<n>` note parameter.
    pub fn param(&self, n: u32) -> Self {
        Self::from(format!("{}.{}", self.0, n))
    }
}

impl From<&str> for AttrId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AttrId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&AttrId> for AttrId {
    fn from(id: &AttrId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for AttrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-camel-case a display name for use as an attribute key:
/// `"Power Attack"` becomes `"powerAttack"`. Apostrophes are dropped.
///
/// ```rust
/// use rulechain::attr_id::lower_camel;
///
/// assert_eq!(lower_camel("Smite Evil"), "smiteEvil");
/// assert_eq!(lower_camel("Longtooth"), "longtooth");
/// assert_eq!(lower_camel("Weapon Focus (Longsword)"), "weaponFocus(Longsword)");
/// ```
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if ch == '\'' {
            continue;
        }
        if out.is_empty() {
            out.extend(ch.to_lowercase());
        } else if upper_next {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        upper_next = false;
    }
    out
}
