//! Eberron example: a setting layer stacked on a base rule book
//!
//! This example demonstrates:
//! - Loading choices and rules from JSON layers
//! - A race whose selectable feature adds notes and an attack
//! - Rendering notes by section
//! - Explaining how a derived attribute got its value
//! - Validating feat requirements
//!
//! Run with `RUST_LOG=rulechain=debug` to see the build log.

use rulechain::*;
use tracing_subscriber::EnvFilter;

const BASE: &str = r#"{
  "name": "phb",
  "choices": {
    "Class": {
      "Fighter": "HitDie=d10 Attack=1 SkillPoints=2 Fortitude=1/2 Features=\"1:Bonus Feat\",\"4:Weapon Specialization\""
    },
    "Feat": {
      "Power Attack": "Type=General,Fighter Require=\"strength >= 13\"",
      "Cleave": "Type=General,Fighter Require=\"features.Power Attack\""
    }
  },
  "rules": [
    ["strengthModifier", "strength", "=", "floor((source - 10) / 2)"],
    ["meleeAttack", "baseAttack", "=", "source + strengthModifier"]
  ]
}"#;

const EBERRON: &str = r#"{
  "name": "eberron",
  "choices": {
    "Race": {
      "Shifter": "Selectables=\"1:Beasthide\",\"1:Longtooth\""
    },
    "Feature": {
      "Beasthide": "Section=ability,combat Note=\"+%V Constitution while shifting\",\"+2 AC while shifting\"",
      "Longtooth": "Section=ability,combat Note=\"+%V Strength while shifting\",\"Has Fangs attack\""
    }
  },
  "rules": [
    ["abilityNotes.beasthide", "", "=", 2],
    ["abilityNotes.longtooth", "", "=", 2],
    ["weapons.Fangs", "combatNotes.longtooth", "=", 1]
  ]
}"#;

fn main() -> Result<(), RuleError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Loading layers ===\n");

    let mut rules = RuleSet::new();
    for json in [BASE, EBERRON] {
        let layer = Layer::from_json(json)?;
        let report = rules.add_layer(&layer);
        println!(
            "{}: {} registered, {} skipped",
            layer.name,
            report.registered.len(),
            report.skipped.len()
        );
    }
    let engine = rules.build()?;
    println!("Evaluation order has {} attributes", engine.order().len());

    println!("\n=== Building a level 4 Shifter fighter ===\n");

    let mut sheet = CharacterSheet::from_inputs([("levels.Fighter", 4), ("strength", 12)]);
    sheet.set("race", "Shifter");
    sheet.set("selectableFeatures.Shifter - Longtooth", 1);
    sheet.set("feats.Power Attack", 1);
    sheet.set("feats.Cleave", 1);
    engine.evaluate(&mut sheet);

    for id in ["level", "baseAttack", "meleeAttack", "hitPoints", "save.Fortitude"] {
        match sheet.get(id) {
            Some(value) => println!("  {}: {}", id, value),
            None => println!("  {}: -", id),
        }
    }
    println!("  Fangs attack: {}", sheet.is_truthy("weapons.Fangs"));

    println!("\nNotes:");
    for note in engine.render_notes(&sheet) {
        println!("  [{}] {}", note.section(), note.text);
    }

    println!("\n=== Explaining hitPoints ===\n");
    print!("{}", engine.explain(&sheet, &AttrId::new("hitPoints")));

    println!("\n=== Validation ===\n");
    let issues = engine.validate(&sheet);
    if issues.is_empty() {
        println!("No issues");
    }
    for issue in &issues {
        println!("  {}", issue);
    }

    println!("\n=== Raising strength to 14 ===\n");
    sheet.set("strength", 14);
    engine.evaluate(&mut sheet);
    println!("  meleeAttack: {}", sheet.number("meleeAttack").unwrap_or_default());
    println!("  issues left: {}", engine.validate(&sheet).len());

    Ok(())
}
