//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const ITEMS_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType>
            <xs:simpleContent>
              <xs:extension base="xs:string">
                <xs:attribute name="qty" type="xs:positiveInteger"/>
              </xs:extension>
            </xs:simpleContent>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;

pub const NS_A_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:a" elementFormDefault="qualified">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:any namespace="urn:b" processContents="strict" maxOccurs="unbounded"/>
      </xs:sequence>
      <xs:attribute name="count" type="xs:int"/>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;

pub const NS_B_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:b" elementFormDefault="qualified">
  <xs:element name="value" type="xs:int"/>
</xs:schema>
"#;

/// A temporary directory holding schema files and documents
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write fixture");
        path
    }

    /// Workspace with `items.xsd`, `a.xsd` and `b.xsd`
    pub fn with_schemas() -> Self {
        let workspace = Self::new();
        workspace.write("items.xsd", ITEMS_XSD);
        workspace.write("a.xsd", NS_A_XSD);
        workspace.write("b.xsd", NS_B_XSD);
        workspace
    }
}

/// Document bound to `items.xsd` with `body` inside `<root>`
pub fn items_document(body: &str) -> String {
    format!(
        "<root xmlns:xsi=\"{}\" xsi:noNamespaceSchemaLocation=\"items.xsd\">\n{}\n</root>",
        XSI, body
    )
}
