//! Note templates.
//!
//! Features carry human-readable notes such as `"+%V Strength while
//! shifting"`. `%V` is replaced by the note attribute's own value and
//! `%1`..`%9` by the values of `<attr>.1`..`<attr>.9`.

use crate::attr_id::AttrId;
use crate::expr::AttrLookup;
use serde::{Deserialize, Serialize};

/// A rendered note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub attr: AttrId,
    pub text: String,
}

impl Note {
    /// Section the note belongs to: `abilityNotes.longtooth` is in `ability`.
    pub fn section(&self) -> &str {
        let category = self.attr.category();
        category.strip_suffix("Notes").unwrap_or(category)
    }
}

/// Substitute placeholders in `template` for the note attribute `attr`.
///
/// Placeholders whose attribute has no value are left as written.
///
/// # Examples
///
/// ```rust
/// use rulechain::notes::render_template;
/// use rulechain::{AttrId, AttrValue};
/// use std::collections::BTreeMap;
///
/// let attr = AttrId::new("combatNotes.smiteEvil");
/// let mut values = BTreeMap::new();
/// values.insert(attr.clone(), AttrValue::from(2));
/// values.insert(attr.param(1), AttrValue::from(5));
///
/// let text = render_template("%Vx/day +%1 damage, %2 range", &attr, &values);
/// assert_eq!(text, "2x/day +5 damage, %2 range");
/// ```
pub fn render_template(template: &str, attr: &AttrId, values: &dyn AttrLookup) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let replacement = match chars.peek() {
            Some('V') => values.lookup(attr).map(ToString::to_string),
            Some(&d) if ('1'..='9').contains(&d) => d
                .to_digit(10)
                .and_then(|n| values.lookup(&attr.param(n)))
                .map(ToString::to_string),
            _ => {
                out.push('%');
                continue;
            }
        };
        // the peeked character is part of the placeholder either way
        let Some(code) = chars.next() else {
            break;
        };
        match replacement {
            Some(text) => out.push_str(&text),
            None => {
                out.push('%');
                out.push(code);
            }
        }
    }
    out
}

/// Whether `template` needs a value to render.
pub fn uses_value(template: &str) -> bool {
    template.contains("%V")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrValue;
    use std::collections::BTreeMap;

    fn values(pairs: &[(&str, AttrValue)]) -> BTreeMap<AttrId, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| (AttrId::new(k), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_value_placeholder() {
        let attr = AttrId::new("abilityNotes.longtooth");
        let vals = values(&[("abilityNotes.longtooth", AttrValue::from(2))]);
        assert_eq!(
            render_template("+%V Strength while shifting", &attr, &vals),
            "+2 Strength while shifting"
        );
    }

    #[test]
    fn test_render_missing_value_left_as_written() {
        let attr = AttrId::new("abilityNotes.longtooth");
        assert_eq!(
            render_template("+%V Strength", &attr, &values(&[])),
            "+%V Strength"
        );
    }

    #[test]
    fn test_render_numbered_params() {
        let attr = AttrId::new("magicNotes.arcaneBond");
        let vals = values(&[
            ("magicNotes.arcaneBond.1", AttrValue::from("familiar")),
            ("magicNotes.arcaneBond.2", AttrValue::from(10)),
        ]);
        assert_eq!(
            render_template("Bond with %1 within %2'", &attr, &vals),
            "Bond with familiar within 10'"
        );
    }

    #[test]
    fn test_render_literal_percent() {
        let attr = AttrId::new("combatNotes.x");
        let vals = values(&[("combatNotes.x", AttrValue::from(20))]);
        assert_eq!(render_template("%V% miss chance", &attr, &vals), "20% miss chance");
        assert_eq!(render_template("trailing %", &attr, &vals), "trailing %");
        assert_eq!(render_template("%0 stays", &attr, &vals), "%0 stays");
    }

    #[test]
    fn test_note_section() {
        let note = Note {
            attr: AttrId::new("combatNotes.longtooth"),
            text: "Has Fangs attack".to_string(),
        };
        assert_eq!(note.section(), "combat");
    }

    #[test]
    fn test_uses_value() {
        assert!(uses_value("+%V Strength"));
        assert!(!uses_value("Has Fangs attack"));
    }
}
