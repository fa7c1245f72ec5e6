use divan::Bencher;
use std::path::Path;
use tempfile::TempDir;
use xsd_diagnostics::schema::compiler::compile_schema;
use xsd_diagnostics::{ValidatorOptions, to_diagnostics, validate_document};

fn main() {
    divan::main();
}

const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="element" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:simpleContent>
                            <xs:extension base="xs:string">
                                <xs:attribute name="n" type="xs:int"/>
                            </xs:extension>
                        </xs:simpleContent>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

fn document(elements: usize, invalid: bool) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:noNamespaceSchemaLocation=\"simple.xsd\">\n",
    );
    for i in 0..elements {
        if invalid && i % 2 == 0 {
            xml.push_str("    <element n=\"NaN\">Content</element>\n");
        } else {
            xml.push_str(&format!("    <element n=\"{}\">Content</element>\n", i));
        }
    }
    xml.push_str("</root>\n");
    xml
}

fn schema_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("simple.xsd"), SIMPLE_XSD).unwrap();
    dir
}

#[divan::bench]
fn compile_simple_schema(bencher: Bencher) {
    bencher.bench_local(|| {
        compile_schema(SIMPLE_XSD, Path::new("simple.xsd")).expect("Failed to compile schema")
    });
}

#[divan::bench(args = [10, 1000])]
fn validate_valid_document(bencher: Bencher, elements: usize) {
    let dir = schema_dir();
    let options = ValidatorOptions::default().with_base_dir(dir.path());
    let xml = document(elements, false);

    bencher.bench_local(|| validate_document(&xml, &options));
}

#[divan::bench(args = [10, 1000])]
fn validate_invalid_document(bencher: Bencher, elements: usize) {
    let dir = schema_dir();
    let options = ValidatorOptions::default().with_base_dir(dir.path());
    let xml = document(elements, true);

    bencher.bench_local(|| validate_document(&xml, &options));
}

#[divan::bench]
fn map_diagnostics(bencher: Bencher) {
    let dir = schema_dir();
    let options = ValidatorOptions::default().with_base_dir(dir.path());
    let xml = document(1000, true);
    let report = validate_document(&xml, &options);

    bencher.bench_local(|| to_diagnostics(&report, &xml));
}
