//! Choice compilation.
//!
//! Registered choices are declarative: a class says `Attack=3/4 HitDie=d8`,
//! a feature says `Section=combat Note="Has Fangs attack"`. This module turns
//! those attributes into ordinary rules, note templates and requirement
//! checks once every layer has been loaded. All interpretation of choice
//! attributes happens here; evaluation only sees rules.

use crate::attr_id::{lower_camel, AttrId};
use crate::choice::{Choice, ChoiceRegistry};
use crate::error::{ChoiceError, RuleError};
use crate::expr::{BinaryOp, Expr};
use crate::notes::uses_value;
use crate::parser::parse_expr;
use crate::rule::{Operator, RuleStore};
use crate::validate::Requirement;
use crate::value::AttrValue;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything besides rules that compilation produces.
#[derive(Debug, Default)]
pub(crate) struct Compiled {
    /// Note attribute → template.
    pub notes: BTreeMap<AttrId, String>,
    /// (category, name) → requirements.
    pub requirements: HashMap<(String, String), Vec<Requirement>>,
    /// Owner → names it offers as selectable features.
    pub selectables: BTreeMap<String, Vec<String>>,
    /// Entries that were logged and skipped.
    pub problems: Vec<RuleError>,
}

/// Compile every registered choice, in registration order, into `rules`.
pub(crate) fn compile_choices(choices: &ChoiceRegistry, rules: &mut RuleStore) -> Compiled {
    let before = rules.len();
    let mut compiler = Compiler {
        rules,
        out: Compiled::default(),
        choices,
        warned: HashSet::new(),
    };
    for choice in choices.iter() {
        compiler.compile(choice);
    }

    let out = compiler.out;
    tracing::debug!(
        choices = choices.len(),
        rules = rules.len() - before,
        notes = out.notes.len(),
        skipped = out.problems.len(),
        "compiled choices"
    );
    out
}

struct Compiler<'a> {
    choices: &'a ChoiceRegistry,
    rules: &'a mut RuleStore,
    out: Compiled,
    /// Missing references already reported.
    warned: HashSet<(String, String)>,
}

/// A parsed `[<cond> ? ]<level>:<name>` feature-list entry.
#[derive(Debug, Clone, PartialEq)]
struct FeatureEntry {
    condition: Option<Expr>,
    level: f64,
    name: String,
}

impl<'a> Compiler<'a> {
    fn compile(&mut self, choice: &Choice) {
        match choice.category.as_str() {
            "Class" => self.compile_class(choice),
            "Race" => self.compile_race(choice),
            "Feat" => self.compile_feat(choice),
            "Feature" => self.compile_feature(choice),
            _ => {}
        }
        self.compile_requirements(choice);
    }

    fn compile_class(&mut self, choice: &Choice) {
        let levels = AttrId::join("levels", &choice.name);
        self.rules
            .define_rule("level", Some(&levels), Operator::Add, Expr::Source);

        if let Some(attack) = choice.get("Attack") {
            match parse_fraction(attack) {
                Some((n, d)) => {
                    self.rules
                        .define_rule("baseAttack", Some(&levels), Operator::Add, scaled(n, d))
                }
                None => self.malformed(choice, "Attack", attack),
            }
        }

        for save in ["Fortitude", "Reflex", "Will"] {
            let Some(progression) = choice.get(save) else {
                continue;
            };
            let expr = match parse_fraction(progression) {
                // good save
                Some((n, d)) if n * 2.0 == d => Expr::binary(
                    BinaryOp::Add,
                    Expr::num(2.0),
                    Expr::floor(Expr::binary(BinaryOp::Div, Expr::Source, Expr::num(2.0))),
                ),
                Some((n, d)) => scaled(n, d),
                None => {
                    self.malformed(choice, save, progression);
                    continue;
                }
            };
            self.rules
                .define_rule(AttrId::join("save", save), Some(&levels), Operator::Add, expr);
        }

        if let Some(points) = choice.get("SkillPoints") {
            match points.trim().parse::<f64>() {
                Ok(n) => self.rules.define_rule(
                    "skillPoints",
                    Some(&levels),
                    Operator::Add,
                    Expr::binary(BinaryOp::Mul, Expr::Source, Expr::num(n)),
                ),
                Err(_) => self.malformed(choice, "SkillPoints", points),
            }
        }

        if let Some(die) = choice.get("HitDie") {
            let sides = die
                .trim()
                .strip_prefix(['d', 'D'])
                .and_then(|n| n.parse::<f64>().ok())
                .filter(|n| *n > 0.0);
            match sides {
                Some(sides) => self.rules.define_rule(
                    "hitPoints",
                    Some(&levels),
                    Operator::Add,
                    Expr::binary(BinaryOp::Mul, Expr::Source, Expr::num(sides / 2.0 + 1.0)),
                ),
                None => self.malformed(choice, "HitDie", die),
            }
        }

        if let Some(ability) = choice.get("SpellAbility") {
            let caster = AttrId::join("casterLevels", &choice.name);
            self.rules
                .define_rule(caster.clone(), Some(&levels), Operator::Set, Expr::Source);
            let modifier = format!("{}Modifier", lower_camel(ability));
            self.rules.define_rule(
                AttrId::join("spellDifficultyClass", &choice.name),
                Some(&caster),
                Operator::Set,
                Expr::binary(BinaryOp::Add, Expr::num(10.0), Expr::attr(modifier.as_str())),
            );
        }

        for entry in choice.list("SpellSlots") {
            match parse_slot_table(entry) {
                Some((group, steps)) => self.rules.define_rule(
                    AttrId::join("spellSlots", group),
                    Some(&levels),
                    Operator::Add,
                    Expr::Table {
                        key: Box::new(Expr::Source),
                        steps,
                    },
                ),
                None => self.malformed(choice, "SpellSlots", entry),
            }
        }

        for entry in choice.list("Spells") {
            match entry.split_once(':') {
                Some((group, names)) if !group.trim().is_empty() => {
                    self.compile_spells(choice, group.trim(), names)
                }
                _ => self.malformed(choice, "Spells", entry),
            }
        }

        let prefix = format!("{}Features", lower_camel(&choice.name));
        self.compile_feature_list(choice, &levels, &prefix);
    }

    fn compile_spells(&mut self, choice: &Choice, group: &str, names: &str) {
        let slots = AttrId::join("spellSlots", group);
        for spell in names.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if !self.choices.contains("Spell", spell) {
                self.missing(choice, "Spell", spell);
                continue;
            }
            self.rules.define_rule(
                AttrId::join("spells", &format!("{} ({})", spell, group)),
                Some(&slots),
                Operator::Set,
                Expr::num(1.0),
            );
        }
    }

    fn compile_race(&mut self, choice: &Choice) {
        let race_level = AttrId::from(format!("{}Level", lower_camel(&choice.name)));
        self.rules.define_rule(
            race_level.clone(),
            Some("race"),
            Operator::Gate,
            Expr::binary(BinaryOp::Eq, Expr::Source, Expr::text(choice.name.as_str())),
        );
        self.rules
            .define_rule(race_level.clone(), Some("level"), Operator::Set, Expr::Source);
        // no class levels yet
        self.rules
            .define_rule(race_level.clone(), None::<AttrId>, Operator::Set, Expr::num(1.0));

        let prefix = format!("{}Features", lower_camel(&choice.name));
        self.compile_feature_list(choice, &race_level, &prefix);
    }

    fn compile_feature_list(&mut self, choice: &Choice, level_attr: &AttrId, prefix: &str) {
        for (key, selectable) in [("Features", false), ("Selectables", true)] {
            for entry in choice.list(key) {
                match parse_feature_entry(entry) {
                    Some(feature) => self.feature_rules(choice, level_attr, prefix, feature, selectable),
                    None => self.malformed(choice, key, entry),
                }
            }
        }
    }

    fn feature_rules(
        &mut self,
        choice: &Choice,
        level_attr: &AttrId,
        prefix: &str,
        feature: FeatureEntry,
        selectable: bool,
    ) {
        if !self.choices.contains("Feature", &feature.name) {
            self.missing(choice, "Feature", &feature.name);
        }

        let mut cond = Expr::binary(BinaryOp::Ge, Expr::Source, Expr::num(feature.level));
        if let Some(extra) = feature.condition {
            cond = Expr::binary(BinaryOp::And, cond, extra);
        }
        if selectable {
            let picked = AttrId::join(
                "selectableFeatures",
                &format!("{} - {}", choice.name, feature.name),
            );
            cond = Expr::binary(BinaryOp::And, cond, Expr::Attr(picked));
            self.out
                .selectables
                .entry(choice.name.clone())
                .or_default()
                .push(feature.name.clone());
        }

        let granted = AttrId::join(prefix, &feature.name);
        self.rules.define_rule(
            granted.clone(),
            Some(level_attr),
            Operator::Set,
            Expr::when(cond, Expr::num(1.0)),
        );
        self.rules.define_rule(
            AttrId::join("features", &feature.name),
            Some(&granted),
            Operator::Add,
            Expr::Source,
        );
    }

    fn compile_feat(&mut self, choice: &Choice) {
        let chosen = AttrId::join("feats", &choice.name);
        self.rules.define_rule(
            AttrId::join("features", &choice.name),
            Some(&chosen),
            Operator::Set,
            Expr::Source,
        );
        for feat_type in choice.list("Type") {
            self.rules.define_rule(
                AttrId::join("featCount", feat_type),
                Some(&chosen),
                Operator::Add,
                Expr::Source,
            );
        }
    }

    fn compile_feature(&mut self, choice: &Choice) {
        let sections = choice.list("Section");
        let notes = choice.list("Note");
        if sections.len() != notes.len() {
            self.malformed(
                choice,
                "Note",
                &format!("{} sections, {} notes", sections.len(), notes.len()),
            );
        }

        let feature = AttrId::join("features", &choice.name);
        let key = lower_camel(&choice.name);
        for (section, template) in sections.iter().zip(notes) {
            let note = AttrId::join(&format!("{}Notes", section), &key);
            if uses_value(template) {
                // the value comes from other rules; only the feature gates it
                self.rules
                    .define_rule(note.clone(), Some(&feature), Operator::Gate, Expr::Source);
            } else {
                self.rules
                    .define_rule(note.clone(), Some(&feature), Operator::Set, Expr::Source);
            }
            self.out
                .notes
                .entry(note)
                .and_modify(|existing| {
                    existing.push('/');
                    existing.push_str(template);
                })
                .or_insert_with(|| template.clone());
        }
    }

    fn compile_requirements(&mut self, choice: &Choice) {
        let mut requirements = Vec::new();
        for text in choice.list("Require") {
            let expr = match parse_expr(text) {
                Ok(expr) => Some(expr),
                Err(error) => {
                    tracing::warn!(
                        category = %choice.category,
                        name = %choice.name,
                        %error,
                        "unparsable requirement is treated as unmet"
                    );
                    self.out.problems.push(RuleError::Choice {
                        category: choice.category.clone(),
                        name: choice.name.clone(),
                        source: ChoiceError::MalformedEntry {
                            key: "Require".to_string(),
                            entry: text.clone(),
                        },
                    });
                    None
                }
            };
            requirements.push(Requirement::new(text.as_str(), expr));
        }
        if !requirements.is_empty() {
            self.out
                .requirements
                .insert((choice.category.clone(), choice.name.clone()), requirements);
        }
    }

    fn malformed(&mut self, choice: &Choice, key: &str, entry: &str) {
        tracing::warn!(
            category = %choice.category,
            name = %choice.name,
            key,
            entry,
            "skipping malformed entry"
        );
        self.out.problems.push(RuleError::Choice {
            category: choice.category.clone(),
            name: choice.name.clone(),
            source: ChoiceError::MalformedEntry {
                key: key.to_string(),
                entry: entry.to_string(),
            },
        });
    }

    fn missing(&mut self, referrer: &Choice, category: &str, name: &str) {
        if !self.warned.insert((category.to_string(), name.to_string())) {
            return;
        }
        tracing::warn!(
            %category,
            %name,
            referrer = %referrer.name,
            "missing {}",
            category.to_lowercase()
        );
        self.out.problems.push(RuleError::MissingChoice {
            category: category.to_string(),
            name: name.to_string(),
            referrer: format!("{} {}", referrer.category, referrer.name),
        });
    }
}

/// `floor(source * n / d)`
fn scaled(n: f64, d: f64) -> Expr {
    Expr::floor(Expr::binary(
        BinaryOp::Div,
        Expr::binary(BinaryOp::Mul, Expr::Source, Expr::num(n)),
        Expr::num(d),
    ))
}

/// `"3/4"` → `(3, 4)`, `"1"` → `(1, 1)`.
fn parse_fraction(text: &str) -> Option<(f64, f64)> {
    let text = text.trim();
    let (n, d) = match text.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (text.parse::<f64>().ok()?, 1.0),
    };
    (d != 0.0).then_some((n, d))
}

/// `"W1:1=2;3=3"` → `("W1", [(1, 2), (3, 3)])`, steps sorted by class level.
fn parse_slot_table(entry: &str) -> Option<(&str, Vec<(f64, AttrValue)>)> {
    let (group, table) = entry.split_once(':')?;
    let group = group.trim();
    if group.is_empty() {
        return None;
    }
    let mut steps: Vec<(f64, AttrValue)> = Vec::new();
    for step in table.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (level, count) = step.split_once('=')?;
        let level = level.trim().parse::<f64>().ok()?;
        let count = count.trim().parse::<f64>().ok()?;
        steps.push((level, AttrValue::Number(count)));
    }
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(|a, b| a.0.total_cmp(&b.0));
    Some((group, steps))
}

/// `"1:Dragonmark"`, `"3:Smite Evil"` or `"race == 'Elf' ? 1:Keen Senses"`.
fn parse_feature_entry(entry: &str) -> Option<FeatureEntry> {
    let (condition, rest) = match entry.rsplit_once(" ? ") {
        Some((cond, rest)) => (Some(parse_expr(cond).ok()?), rest),
        None => (None, entry),
    };
    let (level, name) = rest.split_once(':')?;
    let level = level.trim().parse::<f64>().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(FeatureEntry {
        condition,
        level,
        name: name.to_string(),
    })
}
