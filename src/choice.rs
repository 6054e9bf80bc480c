//! Choice registry.
//!
//! Choices are the selectable named entities of a ruleset: classes, feats,
//! races, features, spells, deities and so on. Each is declared as an
//! attribute blob of `Key=value` segments:
//!
//! ```text
//! Require="baseAttack >= 1","strength >= 13" Type=General,Fighter
//! ```
//!
//! Segments are separated by whitespace. A value is a comma-separated list
//! of items; an item is either a double-quoted string, which may contain
//! spaces and commas, or a bare run of characters other than whitespace,
//! commas and quotes.

use crate::error::{ChoiceError, RuleError};
use std::collections::BTreeMap;

/// Keys whose values accumulate when a later layer redefines a choice.
/// Every other key is overridden by the later definition.
pub const CONCAT_KEYS: [&str; 8] = [
    "Features",
    "Selectables",
    "Spells",
    "SpellSlots",
    "Type",
    "Section",
    "Note",
    "Require",
];

/// Parse an attribute blob into key → ordered items.
///
/// A key repeated inside one blob appends to its earlier items.
///
/// # Examples
///
/// ```rust
/// use rulechain::choice::parse_attrs;
///
/// let attrs = parse_attrs(r#"HitDie=d10 Features="1:Armor Proficiency (Heavy)","2:Smite Evil""#).unwrap();
/// assert_eq!(attrs["HitDie"], vec!["d10"]);
/// assert_eq!(attrs["Features"], vec!["1:Armor Proficiency (Heavy)", "2:Smite Evil"]);
///
/// assert!(parse_attrs(r#"Note="unterminated"#).is_err());
/// ```
pub fn parse_attrs(blob: &str) -> Result<BTreeMap<String, Vec<String>>, ChoiceError> {
    let bytes = blob.as_bytes();
    let mut attrs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let key_start = pos;
        while pos < bytes.len() && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != b'=' {
            return Err(ChoiceError::MissingEquals(blob[key_start..pos].to_string()));
        }
        let key = &blob[key_start..pos];
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ChoiceError::InvalidKey(key.to_string()));
        }
        pos += 1;

        let mut items = Vec::new();
        loop {
            if pos < bytes.len() && bytes[pos] == b'"' {
                let close = blob[pos + 1..]
                    .find('"')
                    .ok_or_else(|| ChoiceError::UnbalancedQuote { key: key.to_string() })?;
                items.push(blob[pos + 1..pos + 1 + close].to_string());
                pos += close + 2;
                if pos < bytes.len() && bytes[pos] != b',' && !bytes[pos].is_ascii_whitespace() {
                    return Err(ChoiceError::TrailingText { key: key.to_string() });
                }
            } else {
                let item_start = pos;
                while pos < bytes.len()
                    && bytes[pos] != b','
                    && bytes[pos] != b'"'
                    && !bytes[pos].is_ascii_whitespace()
                {
                    pos += 1;
                }
                if pos < bytes.len() && bytes[pos] == b'"' {
                    return Err(ChoiceError::UnbalancedQuote { key: key.to_string() });
                }
                if pos == item_start {
                    return Err(ChoiceError::EmptyItem { key: key.to_string() });
                }
                items.push(blob[item_start..pos].to_string());
            }

            if pos < bytes.len() && bytes[pos] == b',' {
                pos += 1;
            } else {
                break;
            }
        }

        attrs.entry(key.to_string()).or_default().extend(items);
    }

    Ok(attrs)
}

/// A parsed choice record.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub category: String,
    pub name: String,
    attrs: BTreeMap<String, Vec<String>>,
}

impl Choice {
    /// Parse a blob into a choice.
    pub fn parse(category: &str, name: &str, blob: &str) -> Result<Self, ChoiceError> {
        Ok(Self {
            category: category.to_string(),
            name: name.to_string(),
            attrs: parse_attrs(blob)?,
        })
    }

    /// First item of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .get(key)
            .and_then(|items| items.first())
            .map(String::as_str)
    }

    /// All items of `key`, empty when absent.
    pub fn list(&self, key: &str) -> &[String] {
        self.attrs.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Merge a later definition into this one: `CONCAT_KEYS` append,
    /// everything else is replaced.
    ///
    /// `Section` and `Note` are appended as pairs: unpaired entries of this
    /// definition are dropped first so later notes land on their sections.
    pub fn merge(&mut self, later: Choice) {
        if later.has("Section") || later.has("Note") {
            let paired = self.list("Section").len().min(self.list("Note").len());
            for key in ["Section", "Note"] {
                if let Some(items) = self.attrs.get_mut(key) {
                    items.truncate(paired);
                }
            }
        }
        for (key, items) in later.attrs {
            if CONCAT_KEYS.contains(&key.as_str()) {
                self.attrs.entry(key).or_default().extend(items);
            } else {
                self.attrs.insert(key, items);
            }
        }
    }
}

/// A choice or rule that could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub what: String,
    pub error: RuleError,
}

/// Outcome of loading many choices or a whole layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Names (or rule targets) that loaded.
    pub registered: Vec<String>,
    /// Entries that were skipped, with why.
    pub skipped: Vec<Skipped>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn absorb(&mut self, other: LoadReport) {
        self.registered.extend(other.registered);
        self.skipped.extend(other.skipped);
    }
}

/// Stores choices by category and name.
///
/// Registration order is remembered so that compiling choices into rules
/// is deterministic.
///
/// # Examples
///
/// ```rust
/// use rulechain::ChoiceRegistry;
///
/// let mut registry = ChoiceRegistry::new();
/// registry.register("Feat", "Power Attack", r#"Type=General,Fighter Require="strength >= 13""#).unwrap();
///
/// let feat = registry.get("Feat", "Power Attack").unwrap();
/// assert_eq!(feat.list("Type"), ["General", "Fighter"]);
/// assert!(registry.get("Feat", "Cleave").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChoiceRegistry {
    categories: BTreeMap<String, BTreeMap<String, Choice>>,
    order: Vec<(String, String)>,
}

impl ChoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a choice. If the name already exists in the
    /// category the new definition is merged into it.
    ///
    /// On error the registry is left unchanged.
    pub fn register(&mut self, category: &str, name: &str, blob: &str) -> Result<(), ChoiceError> {
        let choice = Choice::parse(category, name, blob)?;
        self.insert(choice);
        Ok(())
    }

    /// Insert an already parsed choice, merging with an existing one.
    pub fn insert(&mut self, choice: Choice) {
        let names = self.categories.entry(choice.category.clone()).or_default();
        match names.get_mut(&choice.name) {
            Some(existing) => {
                tracing::debug!(category = %choice.category, name = %choice.name, "merging choice");
                existing.merge(choice);
            }
            None => {
                self.order.push((choice.category.clone(), choice.name.clone()));
                names.insert(choice.name.clone(), choice);
            }
        }
    }

    /// Register many choices of one category. Malformed blobs are logged
    /// and skipped; the rest still register.
    pub fn register_all<I, N, B>(&mut self, category: &str, entries: I) -> LoadReport
    where
        I: IntoIterator<Item = (N, B)>,
        N: AsRef<str>,
        B: AsRef<str>,
    {
        let mut report = LoadReport::default();
        for (name, blob) in entries {
            let name = name.as_ref();
            match self.register(category, name, blob.as_ref()) {
                Ok(()) => report.registered.push(name.to_string()),
                Err(error) => {
                    tracing::warn!(%category, %name, %error, "skipping malformed choice");
                    report.skipped.push(Skipped {
                        what: format!("{} {}", category, name),
                        error: RuleError::Choice {
                            category: category.to_string(),
                            name: name.to_string(),
                            source: error,
                        },
                    });
                }
            }
        }
        report
    }

    pub fn get(&self, category: &str, name: &str) -> Option<&Choice> {
        self.categories.get(category)?.get(name)
    }

    pub fn contains(&self, category: &str, name: &str) -> bool {
        self.get(category, name).is_some()
    }

    /// Category names, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Names in `category`, in registration order.
    pub fn names<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.order
            .iter()
            .filter(move |(c, _)| c == category)
            .map(|(_, n)| n.as_str())
    }

    /// All choices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Choice> {
        self.order.iter().filter_map(|(c, n)| self.get(c, n))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_and_quoted() {
        let attrs = parse_attrs(
            r#"Attack=3/4 SkillPoints=4 Selectables="3:Craft Reserve","1:Artificer Knowledge" Fortitude=1/3"#,
        )
        .unwrap();
        assert_eq!(attrs["Attack"], vec!["3/4"]);
        assert_eq!(attrs["SkillPoints"], vec!["4"]);
        assert_eq!(attrs["Fortitude"], vec!["1/3"]);
        assert_eq!(
            attrs["Selectables"],
            vec!["3:Craft Reserve", "1:Artificer Knowledge"]
        );
    }

    #[test]
    fn test_parse_bare_list_and_mixed() {
        let attrs = parse_attrs(r#"Type=General,Fighter Note="a, b",plain"#).unwrap();
        assert_eq!(attrs["Type"], vec!["General", "Fighter"]);
        assert_eq!(attrs["Note"], vec!["a, b", "plain"]);
    }

    #[test]
    fn test_parse_empty_quoted_item_is_allowed() {
        let attrs = parse_attrs("Note=\"\"").unwrap();
        assert_eq!(attrs["Note"], vec![""]);
    }

    #[test]
    fn test_parse_repeated_key_appends() {
        let attrs = parse_attrs("Type=General Type=Fighter").unwrap();
        assert_eq!(attrs["Type"], vec!["General", "Fighter"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_attrs("HitDie d10"),
            Err(ChoiceError::MissingEquals("HitDie".to_string()))
        );
        assert_eq!(
            parse_attrs("Hit-Die=d10"),
            Err(ChoiceError::InvalidKey("Hit-Die".to_string()))
        );
        assert_eq!(
            parse_attrs(r#"Note="open"#),
            Err(ChoiceError::UnbalancedQuote { key: "Note".to_string() })
        );
        assert_eq!(
            parse_attrs("Type=General,,Fighter"),
            Err(ChoiceError::EmptyItem { key: "Type".to_string() })
        );
        assert_eq!(
            parse_attrs("Type="),
            Err(ChoiceError::EmptyItem { key: "Type".to_string() })
        );
        assert_eq!(
            parse_attrs(r#"Note="a"b"#),
            Err(ChoiceError::TrailingText { key: "Note".to_string() })
        );
        assert_eq!(
            parse_attrs(r#"Note=a"b""#),
            Err(ChoiceError::UnbalancedQuote { key: "Note".to_string() })
        );
    }

    #[test]
    fn test_merge_concat_and_override() {
        let mut base = Choice::parse("Class", "Paladin", r#"HitDie=d10 Features="1:Smite Evil""#).unwrap();
        let later = Choice::parse("Class", "Paladin", r#"HitDie=d8 Features="3:Divine Health""#).unwrap();
        base.merge(later);
        assert_eq!(base.get("HitDie"), Some("d8"));
        assert_eq!(base.list("Features"), ["1:Smite Evil", "3:Divine Health"]);
    }

    #[test]
    fn test_merge_keeps_sections_and_notes_paired() {
        let mut base = Choice::parse("Feature", "Rage", r#"Section=combat Note="+4 Strength""#).unwrap();
        let later = Choice::parse("Feature", "Rage", r#"Section=save,skill Note="+2 Will","-2 AC""#).unwrap();
        base.merge(later);
        assert_eq!(base.list("Section"), ["combat", "save", "skill"]);
        assert_eq!(base.list("Note"), ["+4 Strength", "+2 Will", "-2 AC"]);

        // an unpaired section would shift every later note
        let mut base = Choice::parse("Feature", "Rage", r#"Section=combat,save Note="+4 Strength""#).unwrap();
        let later = Choice::parse("Feature", "Rage", r#"Section=skill Note="-2 AC""#).unwrap();
        base.merge(later);
        assert_eq!(base.list("Section"), ["combat", "skill"]);
        assert_eq!(base.list("Note"), ["+4 Strength", "-2 AC"]);
    }

    #[test]
    fn test_register_merges_and_keeps_first_position() {
        let mut registry = ChoiceRegistry::new();
        registry.register("Race", "Shifter", "Features=1:Shifting").unwrap();
        registry.register("Race", "Changeling", "Features=1:Minor Shape Change").unwrap();
        registry.register("Race", "Shifter", "Selectables=1:Longtooth").unwrap();

        let names: Vec<&str> = registry.names("Race").collect();
        assert_eq!(names, vec!["Shifter", "Changeling"]);
        let shifter = registry.get("Race", "Shifter").unwrap();
        assert_eq!(shifter.list("Features"), ["1:Shifting"]);
        assert_eq!(shifter.list("Selectables"), ["1:Longtooth"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_error_leaves_registry_unchanged() {
        let mut registry = ChoiceRegistry::new();
        assert!(registry.register("Feat", "Broken", r#"Require="x"#).is_err());
        assert!(registry.is_empty());
        assert!(!registry.contains("Feat", "Broken"));
    }

    #[test]
    fn test_register_all_skips_malformed() {
        let mut registry = ChoiceRegistry::new();
        let report = registry.register_all(
            "Feat",
            vec![
                ("Alertness", "Type=General"),
                ("Broken", r#"Type="General"#),
                ("Cleave", r#"Type=General,Fighter Require="features.Power Attack""#),
            ],
        );
        assert_eq!(report.registered, vec!["Alertness", "Cleave"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].what, "Feat Broken");
        assert!(registry.contains("Feat", "Cleave"));
    }
}
