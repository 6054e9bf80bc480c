use rulechain::expr::{BinaryOp, Expr};
use rulechain::*;

/// A small base layer used by several tests.
fn base_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.register_choices(
        "Class",
        [
            (
                "Fighter",
                r#"HitDie=d10 Attack=1 SkillPoints=2 Fortitude=1/2 Reflex=1/3 Will=1/3 Features="1:Bonus Feat""#,
            ),
            (
                "Wizard",
                r#"HitDie=d4 Attack=1/2 SkillPoints=2 Fortitude=1/3 Reflex=1/3 Will=1/2 SpellAbility=intelligence SpellSlots="W0:1=3","W1:1=1;2=2;4=3" Spells="W0:Light","W1:Magic Missile""#,
            ),
        ],
    );
    rules.register_choices(
        "Spell",
        [("Light", "Level=W0"), ("Magic Missile", "Level=W1")],
    );
    rules.register_choices(
        "Feat",
        [
            ("Power Attack", r#"Type=General,Fighter Require="strength >= 13""#),
            ("Cleave", r#"Type=General,Fighter Require="features.Power Attack""#),
        ],
    );
    rules
        .define("intelligenceModifier", "intelligence", "=", Some("floor((source - 10) / 2)"))
        .unwrap();
    rules
}

/// Two `+=` rules, the second conditioned on a gate attribute.
#[test]
fn test_add_with_conditional_contribution() {
    let mut rules = RuleSet::new();
    rules.define("attackBonus", "", "+=", Some("2")).unwrap();
    rules.define("attackBonus", "flanking", "+=", Some("3")).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::new();
    sheet.set("flanking", true);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("attackBonus"), Some(5.0));

    sheet.set("flanking", false);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("attackBonus"), Some(2.0));
}

/// `=` rules: the first one that fires wins.
#[test]
fn test_set_first_match_wins() {
    let mut rules = RuleSet::new();
    rules.define("alignment", "deityAlignment", "=", None).unwrap();
    rules.define("alignment", "playerAlignment", "=", None).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([
        ("deityAlignment", "Lawful Good"),
        ("playerAlignment", "Chaotic Neutral"),
    ]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.get("alignment"), Some(&AttrValue::from("Lawful Good")));

    // with the first source gone the second rule fires
    sheet.remove("deityAlignment");
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.get("alignment"), Some(&AttrValue::from("Chaotic Neutral")));
}

/// `^=` takes the maximum, `v` caps at the minimum including the input.
#[test]
fn test_max_and_min() {
    let mut rules = RuleSet::new();
    rules.define("speed", "", "^=", Some("10")).unwrap();
    rules.define("speed", "", "^=", Some("20")).unwrap();
    rules.define("maxDexBonus", "", "v", Some("10")).unwrap();
    rules.define("maxDexBonus", "", "v=", Some("20")).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("maxDexBonus", 15)]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("speed"), Some(20.0));
    assert_eq!(sheet.number("maxDexBonus"), Some(10.0));
}

/// A `?` gate guards the rules registered after it, not the ones before.
#[test]
fn test_gate_guards_later_contributions() {
    let mut rules = RuleSet::new();
    rules.define("attackBonus", "", "+=", Some("2")).unwrap();
    rules.define("attackBonus", "flanking", "?", None).unwrap();
    rules.define("attackBonus", "", "+=", Some("3")).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("flanking", true)]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("attackBonus"), Some(5.0));

    sheet.set("flanking", false);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("attackBonus"), Some(2.0));

    // an undefined gate source fails the same way
    sheet.remove("flanking");
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("attackBonus"), Some(2.0));
}

/// A failing `?` gate registered first leaves the target undefined.
#[test]
fn test_leading_gate_blocks_everything() {
    let mut rules = RuleSet::new();
    rules.define("turnUndead", "levels.Cleric", "?", None).unwrap();
    rules.define("turnUndead", "charismaModifier", "+=", Some("3 + source")).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("charismaModifier", 2)]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.get("turnUndead"), None);

    sheet.set("levels.Cleric", 1);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("turnUndead"), Some(5.0));
}

/// A malformed blob is skipped without blocking its neighbours.
#[test]
fn test_malformed_choice_does_not_block_others() {
    let mut rules = RuleSet::new();
    let report = rules.register_choices(
        "Feat",
        [
            ("Alertness", "Type=General"),
            ("Broken", r#"Type=General Require="strength >= 13"#),
            ("Dodge", "Type=General"),
        ],
    );
    assert_eq!(report.registered, vec!["Alertness", "Dodge"]);
    assert!(matches!(
        report.skipped[0].error,
        RuleError::Choice {
            source: ChoiceError::UnbalancedQuote { .. },
            ..
        }
    ));

    let engine = rules.build().unwrap();
    assert!(engine.choices().contains("Feat", "Alertness"));
    assert!(engine.choices().contains("Feat", "Dodge"));
    assert!(!engine.choices().contains("Feat", "Broken"));
}

/// A Shifter with Longtooth gets the note and the Fangs weapon.
#[test]
fn test_shifter_longtooth_scenario() {
    let mut rules = base_rules();
    rules
        .register_choice("Race", "Shifter", r#"Selectables="1:Beasthide","1:Longtooth""#)
        .unwrap();
    rules
        .register_choice(
            "Feature",
            "Longtooth",
            r#"Section=ability,combat Note="+%V Strength while shifting","Has Fangs attack""#,
        )
        .unwrap();
    rules.define("abilityNotes.longtooth", "", "=", Some("2")).unwrap();
    rules.define("weapons.Fangs", "combatNotes.longtooth", "=", Some("1")).unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::new();
    sheet.set("race", "Shifter");
    sheet.set("levels.Fighter", 1);
    sheet.set("selectableFeatures.Shifter - Longtooth", 1);
    engine.evaluate(&mut sheet);

    let notes = engine.render_notes(&sheet);
    let longtooth = notes
        .iter()
        .find(|n| n.attr.as_str() == "abilityNotes.longtooth")
        .unwrap();
    assert_eq!(longtooth.text, "+2 Strength while shifting");
    assert_eq!(longtooth.section(), "ability");
    assert!(sheet.is_truthy("weapons.Fangs"));
    assert!(sheet.is_truthy("features.Longtooth"));
    assert!(!sheet.is_truthy("features.Beasthide"));

    // a different race loses the feature and everything hanging off it
    sheet.set("race", "Human");
    engine.evaluate(&mut sheet);
    assert!(engine.render_notes(&sheet).is_empty());
    assert_eq!(sheet.get("weapons.Fangs"), None);
}

/// Class compilation: level, attack, saves, hit points, skill points.
#[test]
fn test_multiclass_progression() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Fighter", 4), ("levels.Wizard", 2)]);
    engine.evaluate(&mut sheet);

    assert_eq!(sheet.number("level"), Some(6.0));
    // 4 + floor(2 / 2)
    assert_eq!(sheet.number("baseAttack"), Some(5.0));
    // (2 + 2) + floor(2 / 3)
    assert_eq!(sheet.number("save.Fortitude"), Some(4.0));
    // floor(4 / 3) + (2 + 1)
    assert_eq!(sheet.number("save.Will"), Some(4.0));
    // 4 * 6 + 2 * 3
    assert_eq!(sheet.number("hitPoints"), Some(30.0));
    assert_eq!(sheet.number("skillPoints"), Some(12.0));
    assert!(sheet.is_truthy("features.Bonus Feat"));
}

/// Spell slots come from the step table and known spells from the slots.
#[test]
fn test_spellcasting() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Wizard", 3), ("intelligence", 16)]);
    engine.evaluate(&mut sheet);

    assert_eq!(sheet.number("casterLevels.Wizard"), Some(3.0));
    assert_eq!(sheet.number("spellDifficultyClass.Wizard"), Some(13.0));
    assert_eq!(sheet.number("spellSlots.W0"), Some(3.0));
    assert_eq!(sheet.number("spellSlots.W1"), Some(2.0));
    assert!(sheet.is_truthy("spells.Light (W0)"));
    assert!(sheet.is_truthy("spells.Magic Missile (W1)"));

    let fighter = CharacterSheet::from_inputs([("levels.Fighter", 3)]);
    let values = engine.evaluate_targets(
        &fighter,
        &[AttrId::new("spellDifficultyClass.Wizard"), AttrId::new("level")],
    );
    assert_eq!(values.len(), 1);
    assert_eq!(values.get(&AttrId::new("level")), Some(&AttrValue::from(3)));
}

/// Feat types are counted and requirements checked.
#[test]
fn test_feats_and_validation() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([
        ("levels.Fighter", 1),
        ("strength", 12),
        ("feats.Cleave", 1),
        ("feats.Whirlwind Attack", 1),
    ]);
    engine.evaluate(&mut sheet);

    assert_eq!(sheet.number("featCount.General"), Some(1.0));
    assert_eq!(sheet.number("featCount.Fighter"), Some(1.0));

    let issues = engine.validate(&sheet);
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().any(|i| i.name == "Cleave"
        && i.kind
            == IssueKind::UnmetRequirement {
                requirement: "features.Power Attack".to_string()
            }));
    assert!(issues
        .iter()
        .any(|i| i.name == "Whirlwind Attack" && i.kind == IssueKind::UnknownChoice));

    sheet.set("feats.Power Attack", 1);
    sheet.remove("feats.Whirlwind Attack");
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("featCount.General"), Some(2.0));
    assert_eq!(
        engine.unmet_requirements(&sheet, "Feat", "Power Attack"),
        vec!["strength >= 13"]
    );

    sheet.set("strength", 14);
    engine.evaluate(&mut sheet);
    assert!(engine.validate(&sheet).is_empty());
}

/// Requirements can name features with a parenthesised qualifier.
#[test]
fn test_requirement_on_qualified_feature() {
    let mut rules = base_rules();
    rules.register_choices(
        "Feat",
        [
            ("Weapon Focus (Longsword)", "Type=General,Fighter"),
            (
                "Weapon Specialization (Longsword)",
                r#"Type=Fighter Require="features.Weapon Focus (Longsword)","levels.Fighter >= 4""#,
            ),
        ],
    );
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([
        ("levels.Fighter", 4),
        ("feats.Weapon Focus (Longsword)", 1),
        ("feats.Weapon Specialization (Longsword)", 1),
    ]);
    engine.evaluate(&mut sheet);
    assert!(sheet.is_truthy("features.Weapon Focus (Longsword)"));
    assert!(engine.validate(&sheet).is_empty());

    sheet.remove("feats.Weapon Focus (Longsword)");
    engine.evaluate(&mut sheet);
    assert_eq!(
        engine.unmet_requirements(&sheet, "Feat", "Weapon Specialization (Longsword)"),
        vec!["features.Weapon Focus (Longsword)"]
    );
}

/// Race features apply to a sheet that has no class levels yet.
#[test]
fn test_race_features_without_class_levels() {
    let mut rules = RuleSet::new();
    rules
        .register_choice("Race", "Dwarf", r#"Features="1:Darkvision","3:Stonecunning""#)
        .unwrap();
    rules.register_choice("Class", "Fighter", "HitDie=d10").unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("race", "Dwarf")]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("dwarfLevel"), Some(1.0));
    assert!(sheet.is_truthy("features.Darkvision"));
    assert!(!sheet.is_truthy("features.Stonecunning"));

    sheet.set("levels.Fighter", 3);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("dwarfLevel"), Some(3.0));
    assert!(sheet.is_truthy("features.Stonecunning"));
}

/// `<cond> ? <level>:<name>` entries need both the level and the condition.
#[test]
fn test_conditional_feature_entry() {
    let mut rules = RuleSet::new();
    rules
        .register_choice(
            "Class",
            "Ranger",
            r#"HitDie=d8 Features="1:Track","intelligence >= 13 ? 2:Favored Terrain""#,
        )
        .unwrap();
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("levels.Ranger", 2), ("intelligence", 10)]);
    engine.evaluate(&mut sheet);
    assert!(sheet.is_truthy("features.Track"));
    assert!(!sheet.is_truthy("features.Favored Terrain"));

    sheet.set("intelligence", 14);
    engine.evaluate(&mut sheet);
    assert!(sheet.is_truthy("features.Favored Terrain"));

    sheet.set("levels.Ranger", 1);
    engine.evaluate(&mut sheet);
    assert!(!sheet.is_truthy("features.Favored Terrain"));
}

/// Notes added to a feature by a later layer land on their own sections.
#[test]
fn test_layered_feature_notes_stay_aligned() {
    let base = Layer::new("base")
        .with_choice("Race", "Shifter", r#"Features="1:Shifting""#)
        .with_choice("Feature", "Shifting", r#"Section=combat,save Note="Can shift""#);
    let supplement = Layer::new("supplement")
        .with_choice("Feature", "Shifting", r#"Section=skill Note="+2 Intimidate while shifting""#);

    let mut rules = RuleSet::new();
    rules.add_layer(&base);
    rules.add_layer(&supplement);
    let engine = rules.build().unwrap();

    let mut sheet = CharacterSheet::from_inputs([("race", "Shifter")]);
    engine.evaluate(&mut sheet);

    let notes: Vec<(String, String)> = engine
        .render_notes(&sheet)
        .into_iter()
        .map(|n| (n.section().to_string(), n.text))
        .collect();
    assert_eq!(
        notes,
        vec![
            ("combat".to_string(), "Can shift".to_string()),
            ("skill".to_string(), "+2 Intimidate while shifting".to_string()),
        ]
    );
}

/// Selecting a feature the owner does not offer is reported.
#[test]
fn test_validation_of_selectables() {
    let mut rules = RuleSet::new();
    rules
        .register_choice("Race", "Shifter", r#"Selectables="1:Longtooth""#)
        .unwrap();
    let engine = rules.build().unwrap();

    let sheet = CharacterSheet::from_inputs([("selectableFeatures.Shifter - Wings", 1)]);
    let issues = engine.validate(&sheet);
    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].kind,
        IssueKind::NotSelectable {
            owner: "Shifter".to_string()
        }
    );
}

/// A cycle aborts the build and names the attributes involved.
#[test]
fn test_cycle_is_fatal() {
    let mut rules = RuleSet::new();
    rules.define("A", "C", "=", None).unwrap();
    rules.define("B", "A", "+=", Some("1")).unwrap();
    rules.define("C", "", "=", Some("B * 2")).unwrap();

    match rules.build() {
        Err(RuleError::Cycle { path }) => {
            assert_eq!(path.len(), 4);
            assert_eq!(path.first(), path.last());
            for id in ["A", "B", "C"] {
                assert!(path.contains(&AttrId::new(id)));
            }
        }
        other => panic!("Expected cycle, got {:?}", other.map(|_| ())),
    }
}

/// A rule reading its own target through its expression is a cycle.
#[test]
fn test_self_reference_is_cycle() {
    let mut rules = RuleSet::new();
    rules.define_rule(
        "hitPoints",
        Some("level"),
        Operator::Add,
        Expr::binary(BinaryOp::Add, Expr::Source, Expr::attr("hitPoints")),
    );
    assert!(matches!(rules.build(), Err(RuleError::Cycle { .. })));
}

/// Evaluating twice gives the same values.
#[test]
fn test_evaluate_is_idempotent() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Wizard", 5), ("intelligence", 17)]);
    engine.evaluate(&mut sheet);
    let first = sheet.values().clone();

    engine.evaluate_full(&mut sheet);
    assert_eq!(sheet.values(), &first);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.values(), &first);
}

/// Incremental updates match a fresh full evaluation.
#[test]
fn test_incremental_matches_full() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Fighter", 2), ("strength", 14)]);
    engine.evaluate(&mut sheet);

    sheet.set("levels.Wizard", 3);
    sheet.set("intelligence", 15);
    sheet.remove("levels.Fighter");
    engine.evaluate(&mut sheet);

    let mut fresh = CharacterSheet::from_inputs(
        sheet
            .inputs()
            .iter()
            .map(|(id, value)| (id.clone(), value.clone())),
    );
    engine.evaluate(&mut fresh);
    assert_eq!(sheet.values(), fresh.values());
}

/// Layers merge choices: list keys append, scalar keys override.
#[test]
fn test_layer_override_merges() {
    let base = Layer::new("base")
        .with_choice("Class", "Paladin", r#"HitDie=d8 Attack=1 Features="1:Smite Evil""#)
        .with_rule("abilityNotes.x", "", "=", Some(1.into()));
    let house = Layer::from_json(
        r#"{
            "name": "house",
            "choices": { "Class": { "Paladin": "HitDie=d10 Features=\"2:Divine Grace\"" } },
            "rules": [["combatNotes.smiteEvil", "levels.Paladin", "=", null]]
        }"#,
    )
    .unwrap();

    let mut rules = RuleSet::new();
    assert!(rules.add_layer(&base).is_clean());
    assert!(rules.add_layer(&house).is_clean());

    let paladin = rules.choices().get("Class", "Paladin").unwrap();
    assert_eq!(paladin.get("HitDie"), Some("d10"));
    assert_eq!(paladin.list("Features"), ["1:Smite Evil", "2:Divine Grace"]);

    let engine = rules.build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Paladin", 2)]);
    engine.evaluate(&mut sheet);
    assert_eq!(sheet.number("hitPoints"), Some(12.0));
    assert!(sheet.is_truthy("features.Smite Evil"));
    assert!(sheet.is_truthy("features.Divine Grace"));
    assert_eq!(sheet.number("combatNotes.smiteEvil"), Some(2.0));
}

/// `explain` lists the contributions in combination order.
#[test]
fn test_explain_breakdown() {
    let engine = base_rules().build().unwrap();
    let mut sheet = CharacterSheet::from_inputs([("levels.Fighter", 3), ("levels.Wizard", 1)]);
    engine.evaluate(&mut sheet);

    let d = engine.explain(&sheet, &AttrId::new("hitPoints"));
    assert_eq!(d.value, Some(AttrValue::from(21)));
    assert_eq!(d.contributions.len(), 2);
    assert_eq!(d.contributions[0].1, AttrValue::from(18));
    assert!(d.contributions[0].0.contains("levels.Fighter"));
}

/// The engine can be shared between threads.
#[test]
fn test_engine_shared_across_threads() {
    let engine = std::sync::Arc::new(base_rules().build().unwrap());
    let handles: Vec<_> = (1..=4)
        .map(|level| {
            let engine = std::sync::Arc::clone(&engine);
            std::thread::spawn(move || {
                let mut sheet = CharacterSheet::from_inputs([("levels.Fighter", level)]);
                engine.evaluate(&mut sheet);
                sheet.number("baseAttack")
            })
        })
        .collect();

    let results: Vec<Option<f64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
}
