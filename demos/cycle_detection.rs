//! Cycle detection example: rules that read each other are rejected at build time
//!
//! This example shows:
//! - How `build()` reports a dependency cycle with its full path
//! - That the same rules without the back edge build and evaluate normally

use rulechain::*;

fn main() {
    println!("=== Setting up circular rules ===\n");

    let mut rules = RuleSet::new();
    rules.define("A", "B", "=", Some("source + 10")).unwrap();
    println!("A = B + 10");
    rules.define("B", "C", "=", Some("source + 20")).unwrap();
    println!("B = C + 20");
    rules.define("C", "A", "+=", Some("source")).unwrap();
    println!("C += A");

    println!("\n=== Building (should detect cycle) ===\n");

    match rules.build() {
        Err(RuleError::Cycle { path }) => {
            println!("✓ Cycle detected successfully!");
            let names: Vec<&str> = path.iter().map(AttrId::as_str).collect();
            println!("\nCycle path: {}", names.join(" -> "));
        }
        Err(e) => println!("✗ Unexpected error: {}", e),
        Ok(_) => println!("✗ ERROR: Cycle was not detected! This should not happen."),
    }

    println!("\n=== Valid chain (no cycle) ===\n");

    let mut rules = RuleSet::new();
    rules.define("Y", "X", "=", Some("source + 20")).unwrap();
    println!("Y = X + 20");
    rules.define("Z", "Y", "=", Some("source + 30")).unwrap();
    println!("Z = Y + 30");

    let engine = match rules.build() {
        Ok(engine) => engine,
        Err(e) => {
            println!("✗ Unexpected error: {}", e);
            return;
        }
    };

    let mut sheet = CharacterSheet::new();
    sheet.set("X", 10);
    engine.evaluate(&mut sheet);

    println!("Evaluation order: {:?}", engine.order());
    println!("Results:");
    for id in ["X", "Y", "Z"] {
        println!("  {}: {}", id, sheet.number(id).unwrap_or_default());
    }

    println!("\n✓ Valid dependency chain evaluated successfully!");
}
