//! The evaluator.
//!
//! An `Engine` is a frozen rule set: rules grouped by target, a checked
//! dependency graph and a fixed evaluation order. It never changes after
//! `RuleSet::build()` and can be shared between threads; all per-character
//! state lives in [`CharacterSheet`].
//!
//! Evaluation walks the order once. For each derived attribute the rules
//! are combined as:
//!
//! 1. `?` gates: a gate that does not fire with a truthy value discards
//!    the sheet's input value and every rule for the attribute registered
//!    after the gate. Rules registered before it still apply.
//! 2. the sheet's input value, if any.
//! 3. `=`: the first rule that fires replaces the value.
//! 4. `+=`, then `*=`, then `^=`, then `v`, each in registration order.

use crate::attr_id::AttrId;
use crate::choice::ChoiceRegistry;
use crate::compile::Compiled;
use crate::derivation::Derivation;
use crate::error::RuleError;
use crate::expr::AttrLookup;
use crate::graph::AttrGraph;
use crate::notes::{render_template, Note};
use crate::rule::{Operator, Rule, RuleStore};
use crate::sheet::CharacterSheet;
use crate::validate::{IssueKind, Requirement, ValidationIssue};
use crate::value::{is_applicable, is_truthy, AttrValue};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Immutable, thread-safe rule engine.
///
/// # Examples
///
/// ```rust
/// use rulechain::{CharacterSheet, RuleSet};
///
/// let mut rules = RuleSet::new();
/// rules.define("armorClass", "", "=", Some("10 + dexterityModifier")).unwrap();
/// rules.define("armorClass", "feats.Dodge", "+=", Some("1")).unwrap();
/// let engine = rules.build().unwrap();
///
/// let mut sheet = CharacterSheet::new();
/// sheet.set("dexterityModifier", 2);
/// engine.evaluate(&mut sheet);
/// assert_eq!(sheet.number("armorClass"), Some(12.0));
///
/// sheet.set("feats.Dodge", 1);
/// engine.evaluate(&mut sheet);
/// assert_eq!(sheet.number("armorClass"), Some(13.0));
/// ```
#[derive(Debug)]
pub struct Engine {
    choices: ChoiceRegistry,
    rules: RuleStore,
    graph: AttrGraph,
    /// Attributes with rules, dependencies first.
    order: Vec<AttrId>,
    notes: BTreeMap<AttrId, String>,
    requirements: HashMap<(String, String), Vec<Requirement>>,
    selectables: BTreeMap<String, Vec<String>>,
}

impl Engine {
    pub(crate) fn new(
        choices: ChoiceRegistry,
        rules: RuleStore,
        compiled: Compiled,
    ) -> Result<Self, RuleError> {
        let mut graph = AttrGraph::new();
        for rule in rules.iter() {
            graph.add_node(rule.target.clone());
            for dep in rule.dependencies() {
                graph.add_edge(rule.target.clone(), dep);
            }
        }

        let order: Vec<AttrId> = graph
            .topological_sort()?
            .into_iter()
            .filter(|id| rules.has_rules(id))
            .collect();

        tracing::debug!(
            rules = rules.len(),
            attributes = graph.node_count(),
            derived = order.len(),
            notes = compiled.notes.len(),
            "built rule engine"
        );

        Ok(Self {
            choices,
            rules,
            graph,
            order,
            notes: compiled.notes,
            requirements: compiled.requirements,
            selectables: compiled.selectables,
        })
    }

    /// Bring `sheet` up to date with its inputs.
    ///
    /// The first evaluation of a sheet is a full pass. Later calls only
    /// recompute attributes downstream of inputs changed since the last
    /// call, with the same result a full pass would give.
    pub fn evaluate(&self, sheet: &mut CharacterSheet) {
        if sheet.needs_full_pass() {
            self.evaluate_full(sheet);
            return;
        }

        let dirty = sheet.take_dirty();
        if dirty.is_empty() {
            return;
        }

        for id in &dirty {
            let input = sheet.inputs().get(id).cloned();
            let values = sheet.values_mut();
            match input {
                Some(value) => {
                    values.insert(id.clone(), value);
                }
                None => {
                    values.remove(id);
                }
            }
        }

        let affected = self.graph.downstream_of(&dirty);
        let mut recomputed = 0usize;
        for target in &self.order {
            if affected.contains(target) {
                self.recompute(sheet, target);
                recomputed += 1;
            }
        }
        sheet.mark_evaluated();

        tracing::debug!(dirty = dirty.len(), recomputed, "incremental evaluation");
    }

    /// Recompute every attribute from the inputs.
    pub fn evaluate_full(&self, sheet: &mut CharacterSheet) {
        let inputs = sheet.inputs().clone();
        *sheet.values_mut() = inputs;
        sheet.take_dirty();

        for target in &self.order {
            self.recompute(sheet, target);
        }
        sheet.mark_evaluated();

        tracing::debug!(recomputed = self.order.len(), "full evaluation");
    }

    /// Compute only `targets` and what they depend on, without touching
    /// the sheet. Returns the defined values among `targets`.
    pub fn evaluate_targets(
        &self,
        sheet: &CharacterSheet,
        targets: &[AttrId],
    ) -> BTreeMap<AttrId, AttrValue> {
        let needed = self.graph.subgraph_for_targets(targets);
        let mut values: BTreeMap<AttrId, AttrValue> = sheet
            .inputs()
            .iter()
            .filter(|(id, _)| needed.contains_node(id) || targets.contains(id))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();

        for target in self.order.iter().filter(|id| needed.contains_node(id)) {
            let base = sheet.inputs().get(target);
            match self.derive(target, base, &values, None) {
                Some(value) => {
                    values.insert(target.clone(), value);
                }
                None => {
                    values.remove(target);
                }
            }
        }

        values.retain(|id, _| targets.contains(id));
        values
    }

    /// Break down how `attr` got its current value on an evaluated sheet.
    ///
    /// ```rust
    /// use rulechain::{AttrId, CharacterSheet, RuleSet};
    ///
    /// let mut rules = RuleSet::new();
    /// rules.define("skillPoints", "levels.Rogue", "+=", Some("source * 8")).unwrap();
    /// rules.define("skillPoints", "intelligenceModifier", "+=", Some("source * 4")).unwrap();
    /// let engine = rules.build().unwrap();
    ///
    /// let mut sheet = CharacterSheet::from_inputs([("levels.Rogue", 1), ("intelligenceModifier", 1)]);
    /// engine.evaluate(&mut sheet);
    ///
    /// let d = engine.explain(&sheet, &AttrId::new("skillPoints"));
    /// assert_eq!(d.contributions.len(), 2);
    /// assert_eq!(d.value.and_then(|v| v.as_number()), Some(12.0));
    /// ```
    pub fn explain(&self, sheet: &CharacterSheet, attr: &AttrId) -> Derivation {
        let mut derivation = Derivation::new(attr.clone());
        let base = sheet.inputs().get(attr).cloned();
        derivation.value = if self.rules.has_rules(attr) {
            self.derive(attr, base.as_ref(), sheet.values(), Some(&mut derivation))
        } else {
            base.clone()
        };
        derivation.base = base;
        derivation
    }

    /// Rendered notes for every note attribute defined on the sheet, in
    /// attribute order.
    pub fn render_notes(&self, sheet: &CharacterSheet) -> Vec<Note> {
        self.notes
            .iter()
            .filter(|(attr, _)| is_applicable(sheet.get(*attr)))
            .map(|(attr, template)| Note {
                attr: attr.clone(),
                text: render_template(template, attr, sheet.values()),
            })
            .collect()
    }

    /// The note template registered for `attr`.
    pub fn note_template(&self, attr: &AttrId) -> Option<&str> {
        self.notes.get(attr).map(String::as_str)
    }

    /// `Require` expressions of a choice that the sheet does not satisfy.
    /// Unknown choices have no requirements.
    pub fn unmet_requirements(
        &self,
        sheet: &CharacterSheet,
        category: &str,
        name: &str,
    ) -> Vec<&str> {
        self.requirements
            .get(&(category.to_string(), name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter(|req| !req.is_met(sheet.values()))
            .map(|req| req.text.as_str())
            .collect()
    }

    /// Check the sheet's chosen feats (`feats.X`) and selected features
    /// (`selectableFeatures.Owner - X`).
    pub fn validate(&self, sheet: &CharacterSheet) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (id, value) in sheet.inputs() {
            if !value.is_truthy() {
                continue;
            }
            let Some(key) = id.key() else {
                continue;
            };
            match id.category() {
                "feats" => {
                    if self.choices.contains("Feat", key) {
                        self.check_requirements(sheet, "Feat", key, &mut issues);
                    } else {
                        issues.push(issue("Feat", key, IssueKind::UnknownChoice));
                    }
                }
                "selectableFeatures" => {
                    let Some((owner, name)) = key.split_once(" - ") else {
                        issues.push(issue("Feature", key, IssueKind::UnknownChoice));
                        continue;
                    };
                    let offered = self
                        .selectables
                        .get(owner)
                        .map_or(false, |names| names.iter().any(|n| n == name));
                    if offered {
                        self.check_requirements(sheet, "Feature", name, &mut issues);
                    } else {
                        issues.push(issue(
                            "Feature",
                            name,
                            IssueKind::NotSelectable {
                                owner: owner.to_string(),
                            },
                        ));
                    }
                }
                _ => {}
            }
        }
        issues
    }

    fn check_requirements(
        &self,
        sheet: &CharacterSheet,
        category: &str,
        name: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for requirement in self.unmet_requirements(sheet, category, name) {
            issues.push(issue(
                category,
                name,
                IssueKind::UnmetRequirement {
                    requirement: requirement.to_string(),
                },
            ));
        }
    }

    pub fn choices(&self) -> &ChoiceRegistry {
        &self.choices
    }

    /// Rules for `target` in registration order.
    pub fn rules_for<'a>(&'a self, target: &AttrId) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.rules_for(target)
    }

    /// Derived attributes in evaluation order.
    pub fn order(&self) -> &[AttrId] {
        &self.order
    }

    pub fn graph(&self) -> &AttrGraph {
        &self.graph
    }

    fn recompute(&self, sheet: &mut CharacterSheet, target: &AttrId) {
        let base = sheet.inputs().get(target).cloned();
        let value = self.derive(target, base.as_ref(), sheet.values(), None);
        let values = sheet.values_mut();
        match value {
            Some(value) => {
                values.insert(target.clone(), value);
            }
            None => {
                values.remove(target);
            }
        }
    }

    /// Combine the rules for `target` on top of `base`.
    fn derive(
        &self,
        target: &AttrId,
        base: Option<&AttrValue>,
        values: &dyn AttrLookup,
        mut trace: Option<&mut Derivation>,
    ) -> Option<AttrValue> {
        let mut rules: Vec<&Rule> = self.rules.rules_for(target).collect();

        // the first failing gate cuts off the input and every later rule
        let closed = rules
            .iter()
            .find(|r| r.op == Operator::Gate && !is_truthy(r.contribution(values).as_ref()))
            .map(|gate| gate.seq);
        let mut current = base.cloned();
        if let Some(seq) = closed {
            rules.retain(|r| r.seq < seq);
            current = None;
            if let Some(trace) = trace.as_mut() {
                trace.gated = true;
            }
        }

        for op in Operator::COMBINE_ORDER {
            for rule in rules.iter().filter(|r| r.op == op) {
                let Some(value) = rule.contribution(values) else {
                    continue;
                };
                if let Some(trace) = trace.as_mut() {
                    trace.add_contribution(rule.description(), value.clone());
                }
                current = Some(combine(op, current, value));
                if op == Operator::Set {
                    break;
                }
            }
        }
        current
    }
}

fn issue(category: &str, name: &str, kind: IssueKind) -> ValidationIssue {
    ValidationIssue {
        category: category.to_string(),
        name: name.to_string(),
        kind,
    }
}

/// Fold one contribution into the current value.
fn combine(op: Operator, current: Option<AttrValue>, value: AttrValue) -> AttrValue {
    let Some(current) = current else {
        return match (op, value) {
            (Operator::Add, AttrValue::Bool(b)) => AttrValue::Number(if b { 1.0 } else { 0.0 }),
            (_, value) => value,
        };
    };
    match op {
        Operator::Set => value,
        Operator::Add => current.add(&value),
        Operator::Multiply => match (current.as_number(), value.as_number()) {
            (Some(a), Some(b)) => AttrValue::Number(a * b),
            _ => current,
        },
        Operator::Max => {
            if value.compare(&current) == Ordering::Greater {
                value
            } else {
                current
            }
        }
        Operator::Min => {
            if value.compare(&current) == Ordering::Less {
                value
            } else {
                current
            }
        }
        // gates never contribute a value
        Operator::Gate => current,
    }
}
