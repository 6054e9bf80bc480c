//! Character sheets.
//!
//! A `CharacterSheet` holds the inputs a player chose (`levels.Fighter`,
//! `race`, `feats.Power Attack`, ability scores) together with the values
//! the engine derived from them. Only inputs are serialized; derived values
//! are recomputed after loading.

use crate::attr_id::AttrId;
use crate::value::{is_truthy, AttrValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One character's inputs and computed attributes.
///
/// # Examples
///
/// ```rust
/// use rulechain::CharacterSheet;
///
/// let mut sheet = CharacterSheet::new();
/// sheet.set("levels.Fighter", 3);
/// sheet.set("race", "Shifter");
///
/// assert_eq!(sheet.input("race").and_then(|v| v.as_text()), Some("Shifter"));
/// // nothing is computed until an engine evaluates the sheet
/// assert!(sheet.get("levels.Fighter").is_none());
/// assert!(sheet.is_stale());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterSheet {
    inputs: BTreeMap<AttrId, AttrValue>,
    #[serde(skip)]
    values: BTreeMap<AttrId, AttrValue>,
    #[serde(skip)]
    dirty: BTreeSet<AttrId>,
    #[serde(skip)]
    evaluated: bool,
}

impl CharacterSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sheet from input pairs.
    pub fn from_inputs<I, K, V>(inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<AttrId>,
        V: Into<AttrValue>,
    {
        let mut sheet = Self::new();
        for (id, value) in inputs {
            sheet.set(id, value);
        }
        sheet
    }

    /// Set an input. Setting the value it already has is a no-op.
    pub fn set(&mut self, id: impl Into<AttrId>, value: impl Into<AttrValue>) {
        let id = id.into();
        let value = value.into();
        if self.inputs.get(&id) == Some(&value) {
            return;
        }
        self.inputs.insert(id.clone(), value);
        self.dirty.insert(id);
    }

    /// Remove an input, returning its previous value.
    pub fn remove(&mut self, id: impl Into<AttrId>) -> Option<AttrValue> {
        let id = id.into();
        let old = self.inputs.remove(&id);
        if old.is_some() {
            self.dirty.insert(id);
        }
        old
    }

    /// The input value, ignoring any rules.
    pub fn input(&self, id: impl Into<AttrId>) -> Option<&AttrValue> {
        self.inputs.get(&id.into())
    }

    pub fn inputs(&self) -> &BTreeMap<AttrId, AttrValue> {
        &self.inputs
    }

    /// The computed value after the last evaluation.
    pub fn get(&self, id: impl Into<AttrId>) -> Option<&AttrValue> {
        self.values.get(&id.into())
    }

    /// Computed value as a number.
    pub fn number(&self, id: impl Into<AttrId>) -> Option<f64> {
        self.get(id).and_then(AttrValue::as_number)
    }

    pub fn is_truthy(&self, id: impl Into<AttrId>) -> bool {
        is_truthy(self.get(id))
    }

    /// All computed values, sorted by id.
    pub fn values(&self) -> &BTreeMap<AttrId, AttrValue> {
        &self.values
    }

    /// Computed attributes in `category`, keyed by the part after the dot.
    ///
    /// ```rust
    /// use rulechain::{CharacterSheet, RuleSet};
    ///
    /// let mut rules = RuleSet::new();
    /// rules.define("features.Rage", "levels.Barbarian", "=", Some("1")).unwrap();
    /// let engine = rules.build().unwrap();
    ///
    /// let mut sheet = CharacterSheet::from_inputs([("levels.Barbarian", 1)]);
    /// engine.evaluate(&mut sheet);
    /// let features: Vec<&str> = sheet.category("features").map(|(k, _)| k).collect();
    /// assert_eq!(features, ["Rage"]);
    /// ```
    pub fn category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a AttrValue)> + 'a {
        self.values
            .iter()
            .filter(move |(id, _)| id.category() == category)
            .filter_map(|(id, value)| id.key().map(|key| (key, value)))
    }

    /// True when inputs changed since the last evaluation, or the sheet
    /// was never evaluated.
    pub fn is_stale(&self) -> bool {
        !self.evaluated || !self.dirty.is_empty()
    }

    /// Forget computed values so the next evaluation is a full pass.
    pub fn invalidate(&mut self) {
        self.evaluated = false;
        self.values.clear();
    }

    pub(crate) fn needs_full_pass(&self) -> bool {
        !self.evaluated
    }

    pub(crate) fn take_dirty(&mut self) -> Vec<AttrId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub(crate) fn values_mut(&mut self) -> &mut BTreeMap<AttrId, AttrValue> {
        &mut self.values
    }

    pub(crate) fn mark_evaluated(&mut self) {
        self.evaluated = true;
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_set_and_input() {
        let mut sheet = CharacterSheet::new();
        sheet.set("strength", 16);
        assert_eq!(sheet.input("strength"), Some(&AttrValue::from(16)));
        assert_eq!(sheet.input("dexterity"), None);
    }

    #[test]
    fn test_sheet_dirty_tracking() {
        let mut sheet = CharacterSheet::new();
        sheet.set("strength", 16);
        sheet.mark_evaluated();
        assert!(!sheet.is_stale());

        sheet.set("strength", 16);
        assert!(!sheet.is_stale());

        sheet.set("strength", 18);
        assert!(sheet.is_stale());
        assert_eq!(sheet.take_dirty(), vec![AttrId::new("strength")]);
    }

    #[test]
    fn test_sheet_remove() {
        let mut sheet = CharacterSheet::new();
        sheet.set("race", "Shifter");
        sheet.mark_evaluated();

        assert_eq!(sheet.remove("race"), Some(AttrValue::from("Shifter")));
        assert!(sheet.is_stale());
        assert_eq!(sheet.remove("race"), None);
    }

    #[test]
    fn test_sheet_serializes_inputs_only() {
        let mut sheet = CharacterSheet::from_inputs([("levels.Wizard", 5)]);
        sheet.values_mut().insert(AttrId::new("level"), AttrValue::from(5));
        sheet.mark_evaluated();

        let json = serde_json::to_string(&sheet).unwrap();
        assert_eq!(json, r#"{"inputs":{"levels.Wizard":5.0}}"#);

        let loaded: CharacterSheet = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.input("levels.Wizard"), Some(&AttrValue::from(5)));
        assert!(loaded.get("level").is_none());
        assert!(loaded.needs_full_pass());
    }

    #[test]
    fn test_sheet_invalidate() {
        let mut sheet = CharacterSheet::new();
        sheet.values_mut().insert(AttrId::new("level"), AttrValue::from(1));
        sheet.mark_evaluated();

        sheet.invalidate();
        assert!(sheet.needs_full_pass());
        assert!(sheet.values().is_empty());
    }
}
