//! Rule-set setup.
//!
//! `RuleSet` is the mutable setup context: choices, explicit rules and
//! layers go in, `build()` compiles the choices, checks the dependency
//! graph and freezes everything into an immutable [`Engine`].

use crate::attr_id::AttrId;
use crate::choice::{ChoiceRegistry, LoadReport, Skipped};
use crate::compile::compile_choices;
use crate::engine::Engine;
use crate::error::RuleError;
use crate::expr::Expr;
use crate::layer::Layer;
use crate::rule::{Operator, RuleStore};
use serde::{Deserialize, Serialize};

/// Build behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Return the first skipped entry (malformed choice, unknown operator,
    /// missing spell, unparsable requirement) as an error from `build()`
    /// instead of logging it.
    pub strict: bool,
}

/// Setup context for choices and rules.
///
/// # Examples
///
/// ```rust
/// use rulechain::{CharacterSheet, RuleSet};
///
/// let mut rules = RuleSet::new();
/// rules
///     .register_choice("Class", "Fighter", "HitDie=d10 Attack=1 SkillPoints=2")
///     .unwrap();
/// rules.define("meleeAttack", "baseAttack", "=", Some("source + strengthModifier")).unwrap();
/// let engine = rules.build().unwrap();
///
/// let mut sheet = CharacterSheet::new();
/// sheet.set("levels.Fighter", 4);
/// sheet.set("strengthModifier", 3);
/// engine.evaluate(&mut sheet);
///
/// assert_eq!(sheet.number("baseAttack"), Some(4.0));
/// assert_eq!(sheet.number("meleeAttack"), Some(7.0));
/// assert_eq!(sheet.number("hitPoints"), Some(24.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    choices: ChoiceRegistry,
    rules: RuleStore,
    options: BuildOptions,
    skipped: Vec<RuleError>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// Register one choice. A malformed blob is returned as an error and
    /// leaves the rule set unchanged.
    pub fn register_choice(
        &mut self,
        category: &str,
        name: &str,
        blob: &str,
    ) -> Result<(), RuleError> {
        self.choices
            .register(category, name, blob)
            .map_err(|source| RuleError::Choice {
                category: category.to_string(),
                name: name.to_string(),
                source,
            })
    }

    /// Register many choices of one category, skipping malformed ones.
    pub fn register_choices<I, N, B>(&mut self, category: &str, entries: I) -> LoadReport
    where
        I: IntoIterator<Item = (N, B)>,
        N: AsRef<str>,
        B: AsRef<str>,
    {
        let report = self.choices.register_all(category, entries);
        self.skipped
            .extend(report.skipped.iter().map(|s| s.error.clone()));
        report
    }

    pub fn define_rule(
        &mut self,
        target: impl Into<AttrId>,
        source: Option<impl Into<AttrId>>,
        op: Operator,
        expr: Expr,
    ) {
        self.rules.define_rule(target, source, op, expr);
    }

    /// Table-form rule, see [`RuleStore::define`].
    pub fn define(
        &mut self,
        target: &str,
        source: &str,
        op: &str,
        value: Option<&str>,
    ) -> Result<(), RuleError> {
        self.rules.define(target, source, op, value)
    }

    /// Load a layer on top of what is already registered.
    ///
    /// Choices merge with earlier definitions of the same name. Malformed
    /// choices and rules are logged and skipped.
    pub fn add_layer(&mut self, layer: &Layer) -> LoadReport {
        let mut report = LoadReport::default();
        for (category, entries) in layer.choices.iter() {
            report.absorb(self.register_choices(category, entries.iter()));
        }
        for spec in &layer.rules {
            match spec.define_in(&mut self.rules) {
                Ok(()) => report.registered.push(spec.target().to_string()),
                Err(error) => {
                    tracing::warn!(layer = %layer.name, rule = spec.target(), %error, "skipping malformed rule");
                    self.skipped.push(error.clone());
                    report.skipped.push(Skipped {
                        what: format!("rule {}", spec.target()),
                        error,
                    });
                }
            }
        }
        tracing::debug!(
            layer = %layer.name,
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "loaded layer"
        );
        report
    }

    pub fn choices(&self) -> &ChoiceRegistry {
        &self.choices
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Compile choices into rules and freeze the result.
    ///
    /// Rules compiled from choices are registered ahead of explicit rules,
    /// so a feature's note gate also guards the explicit rules that give
    /// the note its value.
    ///
    /// Fails on a dependency cycle. With `strict` set, also fails on the
    /// first entry that would otherwise have been skipped.
    pub fn build(self) -> Result<Engine, RuleError> {
        let RuleSet {
            choices,
            rules: explicit,
            options,
            skipped,
        } = self;

        // compiled rules come first so their gates guard explicit rules
        let mut rules = RuleStore::new();
        let compiled = compile_choices(&choices, &mut rules);
        rules.append(explicit);
        if options.strict {
            if let Some(error) = skipped.into_iter().chain(compiled.problems.iter().cloned()).next() {
                return Err(error);
            }
        }
        Engine::new(choices, rules, compiled)
    }
}
