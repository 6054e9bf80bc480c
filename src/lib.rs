//! # rulechain - Declarative Attribute Derivation for Character Sheets
//!
//! A rules engine for tabletop RPG character sheets that provides:
//! - **Declarative** rules: `(target, source, operator, expression)` rows,
//!   no attribute names built into the engine
//! - **Deterministic** evaluation in a fixed dependency order
//! - **Incremental** recomputation of only what an input change affects
//! - **Data-driven** choices (classes, races, feats, features, spells)
//!   compiled into rules at build time
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! ```text
//! [Layer / choices / rules] → RuleSet::build() → [Engine] → evaluate(&mut CharacterSheet)
//! ```
//!
//! 1. **Choices** are `Key=value` blobs registered by category and name
//! 2. **Rules** derive one attribute from another through an operator
//! 3. **`build()`** compiles choices into rules and rejects dependency cycles
//! 4. **`Engine`** evaluates sheets; it is immutable and `Send + Sync`
//!
//! ### Operators
//!
//! For one target, `?` gates are checked first: a failing gate discards the
//! sheet's input value and the rules registered after it. Then the input
//! value is taken, then `=` (first firing rule wins), `+=`, `*=`, `^=`
//! (maximum) and `v` (minimum) apply in that order.
//!
//! ## Example
//!
//! ```rust
//! use rulechain::*;
//!
//! let mut rules = RuleSet::new();
//! rules.register_choice("Race", "Shifter", r#"Selectables="1:Longtooth""#).unwrap();
//! rules.register_choice("Class", "Fighter", "HitDie=d10 Attack=1").unwrap();
//! rules
//!     .register_choice(
//!         "Feature",
//!         "Longtooth",
//!         r#"Section=ability,combat Note="+%V Strength while shifting","Has Fangs attack""#,
//!     )
//!     .unwrap();
//! rules.define("abilityNotes.longtooth", "", "=", Some("2")).unwrap();
//! rules.define("weapons.Fangs", "combatNotes.longtooth", "=", Some("1")).unwrap();
//! let engine = rules.build().unwrap();
//!
//! let mut sheet = CharacterSheet::new();
//! sheet.set("race", "Shifter");
//! sheet.set("levels.Fighter", 1);
//! sheet.set("selectableFeatures.Shifter - Longtooth", 1);
//! engine.evaluate(&mut sheet);
//!
//! let notes: Vec<String> = engine.render_notes(&sheet).into_iter().map(|n| n.text).collect();
//! assert_eq!(notes, ["+2 Strength while shifting", "Has Fangs attack"]);
//! assert!(sheet.is_truthy("weapons.Fangs"));
//! ```
//!
//! ## Modules
//!
//! - [`attr_id`] - Attribute identifier type
//! - [`value`] - Attribute values and truthiness
//! - [`expr`] / [`parser`] - Rule expressions and their text syntax
//! - [`choice`] - Choice blobs and the choice registry
//! - [`rule`] - Operators, rules and the rule store
//! - [`graph`] - Dependency graph management
//! - [`ruleset`] - Setup context and build options
//! - [`engine`] - Evaluation, notes and validation
//! - [`layer`] - JSON data layers
//! - [`error`] - Error types

pub mod attr_id;
pub mod choice;
mod compile;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod expr;
pub mod graph;
pub mod layer;
pub mod notes;
pub mod parser;
pub mod rule;
pub mod ruleset;
pub mod sheet;
pub mod validate;
pub mod value;

// Re-export main types for convenience
pub use attr_id::AttrId;
pub use derivation::Derivation;
pub use engine::Engine;
pub use error::{ChoiceError, ExprError, RuleError};
pub use ruleset::{BuildOptions, RuleSet};
pub use sheet::CharacterSheet;
pub use value::AttrValue;

// Re-export data and rule types
pub use choice::{Choice, ChoiceRegistry, LoadReport, Skipped};
pub use expr::{AttrLookup, Expr};
pub use layer::{Entries, Layer, RuleSpec};
pub use notes::Note;
pub use parser::{parse_expr, parse_value};
pub use rule::{Operator, Rule, RuleStore};
pub use validate::{IssueKind, Requirement, ValidationIssue};
