mod common;

use common::TestResult;
use common::fixtures::{ControlSpec, catalog, sample_catalog};
use metaschema::constraint::{AllowedValues, FindingKind};
use metaschema::{
    Constraint, ConstraintSet, KeyField, Level, ValidationConfig, validate_document,
};

/// Every control id is indexed, and every link must point at one.
fn link_integrity() -> Result<ConstraintSet, metaschema::ConstraintError> {
    let mut set = ConstraintSet::default();
    set.add(
        "catalog",
        Constraint::index("controls", vec![KeyField::new("@id")])?
            .with_id("control-index")
            .with_target("group/control"),
    );
    set.add(
        "link",
        Constraint::index_has_key("controls", vec![KeyField::new("@href").with_pattern("#(.*)")?])?
            .with_id("link-target"),
    );
    Ok(set)
}

fn messages(result: &metaschema::ValidationResult<metaschema::NodeRef>) -> Vec<String> {
    result
        .findings()
        .iter()
        .filter_map(|f| f.message().map(str::to_string))
        .collect()
}

#[test]
fn test_sample_catalog_is_valid() -> TestResult {
    let mut set = link_integrity()?;
    set.add(
        "status",
        Constraint::allowed_values(AllowedValues::of(["active", "withdrawn"])),
    );
    set.add("group", Constraint::cardinality(Some(1), Some(3))?.with_target("control"));
    let result = validate_document(&sample_catalog(), &set, ValidationConfig::default())?;
    assert!(result.findings().is_empty(), "{:?}", messages(&result));
    assert!(result.is_passing());
    assert_eq!(result.highest_severity(), Level::None);
    Ok(())
}

#[test]
fn test_cardinality_maximum() -> TestResult {
    let set = ConstraintSet::default().with(
        "group",
        Constraint::cardinality(Some(1), Some(2))?.with_target("control"),
    );
    let result = validate_document(&sample_catalog(), &set, ValidationConfig::default())?;
    assert_eq!(
        messages(&result),
        vec![
            "The cardinality '3' is greater than the required maximum '2' at: \
             '/catalog[1]/group[1]/control[1]', '/catalog[1]/group[1]/control[2]', \
             and '/catalog[1]/group[1]/control[3]'."
                .to_string()
        ]
    );
    assert!(!result.is_passing());
    Ok(())
}

#[test]
fn test_dangling_link() -> TestResult {
    let document = catalog(&[(
        "ac",
        vec![
            ControlSpec::new("ac-1").links(&["ac-2"]),
            ControlSpec::new("ac-2").links(&["zz-9"]),
        ],
    )]);
    let result = validate_document(&document, &link_integrity()?, ValidationConfig::default())?;
    assert_eq!(
        messages(&result),
        vec![
            "Key reference [zz-9] not found in index 'controls' for item at path \
             '/catalog[1]/group[1]/control[2]/link[1]'"
                .to_string()
        ]
    );
    let finding = &result.findings()[0];
    assert_eq!(finding.identifier(), Some("link-target"));
    assert_eq!(finding.kind(), FindingKind::Fail);
    Ok(())
}

#[test]
fn test_duplicate_control_id() -> TestResult {
    let document = catalog(&[
        ("ac", vec![ControlSpec::new("ac-1")]),
        ("au", vec![ControlSpec::new("ac-1")]),
    ]);
    let result = validate_document(&document, &link_integrity()?, ValidationConfig::default())?;
    assert_eq!(
        messages(&result),
        vec![
            "Index 'controls' has duplicate key for items at paths \
             '/catalog[1]/group[1]/control[1]' and '/catalog[1]/group[2]/control[1]'"
                .to_string()
        ]
    );
    Ok(())
}

#[test]
fn test_status_outside_allowed_values() -> TestResult {
    let document = catalog(&[(
        "ac",
        vec![ControlSpec::new("ac-1"), ControlSpec::new("ac-2").status("draft")],
    )]);
    let set = ConstraintSet::default().with(
        "status",
        Constraint::allowed_values(AllowedValues::of(["active", "withdrawn"]))
            .with_level(Level::Warning),
    );
    let result = validate_document(&document, &set, ValidationConfig::default())?;
    assert_eq!(
        messages(&result),
        vec![
            "Value 'draft' doesn't match one of 'active or withdrawn' at path \
             '/catalog[1]/group[1]/control[2]/@status'"
                .to_string()
        ]
    );
    assert_eq!(result.highest_severity(), Level::Warning);
    assert!(result.is_passing());
    Ok(())
}

#[test]
fn test_expect_with_let_and_message() -> TestResult {
    let mut set = ConstraintSet::default();
    set.add_let("control", "links", "count(link)");
    set.add(
        "control",
        Constraint::expect("$links < 2")
            .with_id("few-links")
            .with_message("Control {@id} has {$links} links")?,
    );
    let result = validate_document(&sample_catalog(), &set, ValidationConfig::default())?;
    assert_eq!(messages(&result), vec!["Control ac-2 has 2 links".to_string()]);
    assert_eq!(result.failures().count(), 1);
    Ok(())
}

#[test]
fn test_pass_findings() -> TestResult {
    let set = ConstraintSet::default().with("control", Constraint::expect("@id"));
    let config = ValidationConfig {
        generate_pass_findings: true,
        ..ValidationConfig::default()
    };
    let result = validate_document(&sample_catalog(), &set, config)?;
    assert_eq!(result.findings().len(), 5);
    assert!(result.findings().iter().all(|f| f.kind() == FindingKind::Pass));
    assert!(result.is_passing());
    Ok(())
}
