//! Data layers.
//!
//! A layer bundles choice blobs and explicit rules from one data source: a
//! base rule book, a setting supplement, a house-rules override. Layers are
//! plain serde data and are usually loaded from JSON:
//!
//! ```json
//! {
//!   "name": "eberron",
//!   "choices": {
//!     "Race": { "Shifter": "Selectables=\"1:Longtooth\"" }
//!   },
//!   "rules": [
//!     ["abilityNotes.longtooth", "", "=", 2],
//!     ["weapons.Fangs", "combatNotes.longtooth", "=", null]
//!   ]
//! }
//! ```
//!
//! A rule row is `[target, source, operator, value]`. An empty source means
//! the rule has none; a `null` value passes the source through; numbers
//! and booleans are literals; strings are parsed as expressions.

use crate::attr_id::AttrId;
use crate::error::RuleError;
use crate::expr::Expr;
use crate::parser::parse_value;
use crate::rule::{Operator, RuleStore};
use crate::value::AttrValue;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// One `[target, source, operator, value]` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec(
    pub String,
    pub String,
    pub String,
    pub Option<AttrValue>,
);

impl RuleSpec {
    pub fn target(&self) -> &str {
        &self.0
    }

    /// Parse the row and append it to `store`.
    pub fn define_in(&self, store: &mut RuleStore) -> Result<(), RuleError> {
        let RuleSpec(target, source, op, value) = self;
        let op = op.parse::<Operator>()?;
        let expr = match value {
            None => Expr::Source,
            Some(AttrValue::Text(text)) => {
                parse_value(text).map_err(|source| RuleError::Expression {
                    target: AttrId::new(target),
                    source,
                })?
            }
            Some(literal) => Expr::Literal(literal.clone()),
        };
        let source = Some(source.trim()).filter(|s| !s.is_empty());
        store.define_rule(target.as_str(), source, op, expr);
        Ok(())
    }
}

/// A JSON object kept in document order.
///
/// Choices compile in registration order, and the first firing `=` rule
/// wins, so a layer's entries must register in the order they were written.
#[derive(Debug, Clone, PartialEq)]
pub struct Entries<V>(Vec<(String, V)>);

impl<V> Entries<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The value under `key`, inserting `V::default()` at the end if absent.
    pub fn entry_or_default(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        let idx = match self.0.iter().position(|(k, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.0.push((key.to_string(), V::default()));
                self.0.len() - 1
            }
        };
        &mut self.0[idx].1
    }

    /// Replace the value under `key` in place, or append it.
    pub fn insert(&mut self, key: &str, value: V) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for Entries<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Entries<V>, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// Choices and rules from one data source.
///
/// # Examples
///
/// ```rust
/// use rulechain::Layer;
///
/// let layer = Layer::from_json(r#"{
///     "name": "house-rules",
///     "choices": { "Feat": { "Toughness": "Type=General" } },
///     "rules": [["hitPoints", "feats.Toughness", "+=", 3]]
/// }"#).unwrap();
///
/// assert_eq!(layer.name, "house-rules");
/// assert_eq!(layer.rules.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Category → name → blob, in document order.
    #[serde(default)]
    pub choices: Entries<Entries<String>>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_choice(mut self, category: &str, name: &str, blob: &str) -> Self {
        self.choices
            .entry_or_default(category)
            .insert(name, blob.to_string());
        self
    }

    pub fn with_rule(
        mut self,
        target: &str,
        source: &str,
        op: &str,
        value: Option<AttrValue>,
    ) -> Self {
        self.rules.push(RuleSpec(
            target.to_string(),
            source.to_string(),
            op.to_string(),
            value,
        ));
        self
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        serde_json::from_str(json).map_err(|e| RuleError::Layer(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, RuleError> {
        serde_json::to_string_pretty(self).map_err(|e| RuleError::Layer(e.to_string()))
    }

    /// Read a JSON layer file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RuleError::Layer(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}
