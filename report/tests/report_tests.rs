use report::{Property, PropertyValue, Report, Severity};

#[test]
fn test_new_report_is_well_formed_and_valid() {
    let report = Report::new();
    assert!(report.is_well_formed());
    assert!(report.is_valid());
    assert!(report.messages().is_empty());
}

#[test]
fn test_not_well_formed_implies_not_valid() {
    let mut report = Report::new();
    report.malformed("bad signature", 4);

    assert!(!report.is_well_formed());
    assert!(!report.is_valid());
    assert_eq!(report.messages()[0].severity(), Severity::Error);
    assert_eq!(report.messages()[0].offset(), 4);
}

#[test]
fn test_info_does_not_change_flags() {
    let mut report = Report::new();
    report.report_info("contents not processed", 10);

    assert!(report.is_well_formed());
    assert!(report.is_valid());
    assert!(report.has_message("not processed"));
}

#[test]
fn test_find_searches_subtrees() {
    let mut report = Report::new();
    report.add_property(Property::list(
        "JP2Header",
        vec![Property::list(
            "ImageHeader",
            vec![Property::integer("width", 100u32)],
        )],
    ));

    let width = report.find("width").expect("width property");
    assert_eq!(width.as_integer(), Some(100));
    assert!(report.find("height").is_none());
}

#[test]
fn test_display_renders_tree() {
    let mut report = Report::new();
    report.add_property(Property::list(
        "Codestream",
        vec![
            Property::integers("packetLengths", &[130u32, 4]),
            Property::text("comment", "hello"),
        ],
    ));
    let text = report.to_string();

    assert!(text.contains("Well-formed: true"));
    assert!(text.contains("    packetLengths: [130, 4]"));
    assert!(text.contains("    comment: \"hello\""));
}

#[test]
fn test_property_value_access() {
    let property = Property::boolean("signed", true);
    assert_eq!(property.value(), &PropertyValue::Boolean(true));
    assert_eq!(property.as_integer(), None);
    assert!(property.children().is_empty());
}
