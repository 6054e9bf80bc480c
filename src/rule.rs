//! Rules and the rule store.
//!
//! A rule derives one attribute (the target) from an optional source
//! attribute through an operator and a value expression. All rules for a
//! target are combined in a fixed operator order, see [`Operator::COMBINE_ORDER`].

use crate::attr_id::AttrId;
use crate::error::RuleError;
use crate::expr::{AttrLookup, Expr};
use crate::parser::parse_value;
use crate::value::{is_applicable, AttrValue};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How a rule's contribution combines with the target's other rules.
///
/// Combination order for one target:
/// Gate → (base value) → Set → Add → Multiply → Max → Min
///
/// # Examples
///
/// ```rust
/// use rulechain::Operator;
///
/// assert_eq!("+=".parse::<Operator>().unwrap(), Operator::Add);
/// assert_eq!("v".parse::<Operator>().unwrap(), Operator::Min);
/// assert!("~=".parse::<Operator>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `?`: precondition. When it fails, the target's input value and the
    /// rules registered after it are ignored.
    Gate,
    /// `=`: the first applicable rule in registration order sets the value.
    Set,
    /// `+=`: contributions are summed.
    Add,
    /// `*=`: contributions are multiplied.
    Multiply,
    /// `^=`: the target becomes the maximum.
    Max,
    /// `v`: the target is capped at the minimum.
    Min,
}

impl Operator {
    /// Folding order after gates and the input value.
    pub const COMBINE_ORDER: [Operator; 5] = [
        Operator::Set,
        Operator::Add,
        Operator::Multiply,
        Operator::Max,
        Operator::Min,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Gate => "?",
            Operator::Set => "=",
            Operator::Add => "+=",
            Operator::Multiply => "*=",
            Operator::Max => "^=",
            Operator::Min => "v",
        }
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "?" => Ok(Operator::Gate),
            "=" => Ok(Operator::Set),
            "+=" | "+" => Ok(Operator::Add),
            "*=" | "*" => Ok(Operator::Multiply),
            "^=" | "^" => Ok(Operator::Max),
            "v" | "v=" => Ok(Operator::Min),
            other => Err(RuleError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single `(target, source, operator, expression)` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub target: AttrId,
    pub source: Option<AttrId>,
    pub op: Operator,
    pub expr: Expr,
    /// Registration sequence number, unique within a store.
    pub seq: usize,
}

impl Rule {
    /// Attributes this rule reads: its source, then whatever its
    /// expression looks up.
    pub fn dependencies(&self) -> Vec<AttrId> {
        let mut deps: Vec<AttrId> = self.source.iter().cloned().collect();
        for id in self.expr.references() {
            if !deps.contains(&id) {
                deps.push(id);
            }
        }
        deps
    }

    /// The value this rule contributes, or `None` when it does not fire.
    ///
    /// A rule with a source fires only when the source is defined and not
    /// `false`. The expression sees the source value as `source`; an
    /// undefined result contributes nothing.
    pub fn contribution(&self, values: &dyn AttrLookup) -> Option<AttrValue> {
        let source_value = match &self.source {
            Some(source) => {
                let value = values.lookup(source);
                if !is_applicable(value) {
                    return None;
                }
                value
            }
            None => None,
        };
        self.expr.eval(source_value, values)
    }

    /// Human-readable form used in derivation breakdowns.
    pub fn description(&self) -> String {
        match &self.source {
            Some(source) => format!("{} {} from {}", self.op, self.expr, source),
            None => format!("{} {}", self.op, self.expr),
        }
    }
}

/// Ordered rules, grouped by target.
///
/// # Examples
///
/// ```rust
/// use rulechain::{AttrId, Operator, RuleStore};
/// use rulechain::expr::Expr;
///
/// let mut store = RuleStore::new();
/// store.define_rule("combatNotes.smiteEvil", Some("charismaModifier"), Operator::Set, Expr::Source);
/// store.define("combatNotes.smiteEvil.1", "levels.Paladin", "=", None).unwrap();
///
/// let target = AttrId::new("combatNotes.smiteEvil");
/// assert_eq!(store.rules_for(&target).count(), 1);
/// assert_eq!(store.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
    by_target: HashMap<AttrId, Vec<usize>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule for `target`. Sources are not checked: a rule may
    /// read attributes that nothing defines yet.
    pub fn define_rule(
        &mut self,
        target: impl Into<AttrId>,
        source: Option<impl Into<AttrId>>,
        op: Operator,
        expr: Expr,
    ) {
        let seq = self.rules.len();
        let target = target.into();
        self.by_target.entry(target.clone()).or_default().push(seq);
        self.rules.push(Rule {
            target,
            source: source.map(Into::into),
            op,
            expr,
            seq,
        });
    }

    /// Table form: an empty `source` means no source, `value` `None` means
    /// pass the source through unchanged, anything else is a number or an
    /// expression.
    pub fn define(
        &mut self,
        target: &str,
        source: &str,
        op: &str,
        value: Option<&str>,
    ) -> Result<(), RuleError> {
        let op = op.parse::<Operator>()?;
        let expr = match value {
            None => Expr::Source,
            Some(text) => parse_value(text).map_err(|source| RuleError::Expression {
                target: AttrId::new(target),
                source,
            })?,
        };
        let source = Some(source.trim()).filter(|s| !s.is_empty());
        self.define_rule(target, source, op, expr);
        Ok(())
    }

    /// Move every rule of `other` to the end of this store, keeping their
    /// relative order.
    pub fn append(&mut self, other: RuleStore) {
        for rule in other.rules {
            self.define_rule(rule.target, rule.source, rule.op, rule.expr);
        }
    }

    /// Rules for `target` in registration order.
    pub fn rules_for<'a>(&'a self, target: &AttrId) -> impl Iterator<Item = &'a Rule> + 'a {
        self.by_target
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| &self.rules[idx])
    }

    pub fn has_rules(&self, target: &AttrId) -> bool {
        self.by_target.contains_key(target)
    }

    /// All rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
