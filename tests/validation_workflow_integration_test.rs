mod common;

use common::{Workspace, XSI, items_document};
use xsd_diagnostics::{Severity, ValidatorOptions, validate_document};

fn options_for(workspace: &Workspace) -> ValidatorOptions {
    ValidatorOptions::default().with_base_dir(workspace.path())
}

#[test]
fn test_document_without_hints_is_clean() {
    let workspace = Workspace::with_schemas();
    let report = validate_document(
        "<?xml version=\"1.0\"?>\n<root><anything at='all'/></root>",
        &options_for(&workspace),
    );
    assert!(report.is_clean(), "{:?}", report);
}

#[test]
fn test_valid_document_against_local_schema() {
    let workspace = Workspace::with_schemas();
    let xml = items_document("  <item qty=\"2\">pens</item>\n  <item>paper</item>");
    let report = validate_document(&xml, &options_for(&workspace));
    assert!(report.is_clean(), "{:?}", report);
}

#[test]
fn test_undeclared_root_element() {
    let workspace = Workspace::with_schemas();
    let xml = format!(
        "<bogus xmlns:xsi=\"{}\" xsi:noNamespaceSchemaLocation=\"items.xsd\"/>",
        XSI
    );
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.issues.len(), 1, "{:?}", report);
    let issue = &report.issues[0];
    assert_eq!(issue.severity, Severity::Error);
    assert_eq!(issue.message, "The 'bogus' element is not declared.");
    assert_eq!((issue.line, issue.column), (1, 2));
}

#[test]
fn test_undeclared_child_element() {
    let workspace = Workspace::with_schemas();
    let xml = items_document("  <item/>\n  <bogus/>");
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.issues.len(), 1, "{:?}", report);
    let issue = &report.issues[0];
    assert_eq!(issue.severity, Severity::Error);
    assert_eq!(
        issue.message,
        "The element 'root' has invalid child element 'bogus'. List of possible elements expected: 'item'."
    );
    assert_eq!((issue.line, issue.column), (3, 4));
}

#[test]
fn test_attribute_value_violation_continues() {
    let workspace = Workspace::with_schemas();
    let xml = items_document("  <item qty=\"0\"/>\n  <item qty=\"-1\"/>");
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.error_count(), 2, "{:?}", report);
    for (issue, line) in report.issues.iter().zip([2, 3]) {
        assert!(
            issue.message.starts_with(
                "The 'qty' attribute is invalid - The value '"
            ),
            "{}",
            issue.message
        );
        assert!(issue.message.contains("positiveInteger"));
        assert_eq!((issue.line, issue.column), (line, 9));
    }
}

#[test]
fn test_two_namespaces_in_one_hint() {
    let workspace = Workspace::with_schemas();
    let xml = format!(
        r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b" xmlns:xsi="{}"
        xsi:schemaLocation="urn:a a.xsd urn:b b.xsd" count="many">
  <b:value>nope</b:value>
</a:root>"#,
        XSI
    );
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.issues.len(), 2, "{:?}", report);
    // urn:a declares the attribute, urn:b the element
    assert!(report.issues[0].message.starts_with("The 'count' attribute is invalid"));
    assert_eq!(report.issues[0].line, 2);
    assert!(
        report.issues[1]
            .message
            .starts_with("The 'urn:b:value' element is invalid - The value 'nope' is invalid")
    );
    assert_eq!(report.issues[1].line, 3);
}

#[test]
fn test_truncated_document() {
    let workspace = Workspace::with_schemas();
    let report = validate_document("<root><child>", &options_for(&workspace));

    assert_eq!(report.issues.len(), 1);
    let issue = &report.issues[0];
    assert_eq!(issue.severity, Severity::Error);
    assert!(issue.message.starts_with("Unexpected end of file has occurred."));
    assert!(issue.message.ends_with("Line 1, position 14."));
    assert_eq!((issue.line, issue.column), (1, 14));
}

#[test]
fn test_missing_schema_file() {
    let workspace = Workspace::new();
    let xml = format!(
        "<root xmlns:xsi=\"{}\" xsi:noNamespaceSchemaLocation=\"missing.xsd\"/>",
        XSI
    );
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.issues.len(), 1, "{:?}", report);
    assert!(
        report.issues[0]
            .message
            .starts_with("Cannot load the schema for the namespace '' - Could not find file '")
    );
    assert!(report.issues[0].message.contains("missing.xsd"));
}

#[test]
fn test_schema_in_subdirectory_with_include() {
    let workspace = Workspace::new();
    workspace.write(
        "schemas/main.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:include schemaLocation="types.xsd"/>
  <xs:element name="size" type="Size"/>
</xs:schema>"#,
    );
    workspace.write(
        "schemas/types.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="Size">
    <xs:restriction base="xs:string">
      <xs:enumeration value="S"/>
      <xs:enumeration value="M"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#,
    );
    let xml = format!(
        "<size xmlns:xsi=\"{}\" xsi:noNamespaceSchemaLocation=\"schemas/main.xsd\">XL</size>",
        XSI
    );
    let report = validate_document(&xml, &options_for(&workspace));

    assert_eq!(report.issues.len(), 1, "{:?}", report);
    assert!(report.issues[0].message.contains("The Enumeration constraint failed."));
}

#[test]
fn test_warnings_can_be_suppressed() {
    let workspace = Workspace::with_schemas();
    let xml = format!(
        r#"<a:root xmlns:a="urn:a" xmlns:xsi="{}" xsi:schemaLocation="urn:a a.xsd urn:orphan"><b:value xmlns:b="urn:b">1</b:value></a:root>"#,
        XSI
    );

    let report = validate_document(&xml, &options_for(&workspace));
    assert!(report.warning_count() >= 1, "{:?}", report);

    let quiet = validate_document(&xml, &options_for(&workspace).with_warnings(false));
    assert_eq!(quiet.warning_count(), 0);
    assert_eq!(quiet.error_count(), report.error_count());
}

#[test]
fn test_validation_is_idempotent() {
    let workspace = Workspace::with_schemas();
    let xml = items_document("  <item qty=\"x\"/>\n  <bogus/>\n  <item/>");
    let options = options_for(&workspace);

    let first = validate_document(&xml, &options);
    let second = validate_document(&xml, &options);
    assert!(!first.is_clean());
    assert_eq!(first, second);
}
