//! Compiles `xs:schema` documents into [`SchemaDocument`]s.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};

use super::datatypes::translate_pattern;
use super::model::*;
use crate::error::{SchemaError, SchemaResult};
use crate::schema_loader::resolve_location;

/// Parse and compile one schema document.
///
/// `location` names the document in messages and anchors relative
/// `xs:include`/`xs:import` locations.
pub fn compile_schema(text: &str, location: &Path) -> SchemaResult<SchemaDocument> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(text, options).map_err(|e| SchemaError::Malformed {
        path: location.to_path_buf(),
        details: e.to_string(),
    })?;

    let root = document.root_element();
    if root.tag_name().namespace() != Some(XS_NS) || root.tag_name().name() != "schema" {
        return Err(invalid(
            location,
            format!(
                "The root element of a W3C XML Schema should be <schema> and its namespace should be '{}'.",
                XS_NS
            ),
        ));
    }

    let mut compiler = Compiler {
        location,
        target_namespace: root.attribute("targetNamespace").unwrap_or("").to_string(),
        qualified_elements: root.attribute("elementFormDefault") == Some("qualified"),
        qualified_attributes: root.attribute("attributeFormDefault") == Some("qualified"),
        document: SchemaDocument::default(),
    };
    compiler.document.target_namespace = compiler.target_namespace.clone();
    compiler.document.location = location.to_path_buf();
    compiler.schema(root)?;
    Ok(compiler.document)
}

fn invalid(location: &Path, details: impl Into<String>) -> SchemaError {
    SchemaError::Invalid {
        path: location.to_path_buf(),
        details: details.into(),
    }
}

fn xs_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().namespace() == Some(XS_NS))
}

fn xs_child<'a, 'input>(node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    xs_children(node).find(|child| child.tag_name().name() == local)
}

struct Compiler<'p> {
    location: &'p Path,
    target_namespace: String,
    qualified_elements: bool,
    qualified_attributes: bool,
    document: SchemaDocument,
}

impl Compiler<'_> {
    fn schema(&mut self, root: Node) -> SchemaResult<()> {
        for child in xs_children(root) {
            match child.tag_name().name() {
                "element" => {
                    let decl = self.element_decl(child, true)?;
                    self.document
                        .elements
                        .insert(decl.name.local.clone(), Arc::new(decl));
                }
                "attribute" => {
                    let decl = self.attribute_decl(child, true)?;
                    self.document
                        .attributes
                        .insert(decl.name.local.clone(), Arc::new(decl));
                }
                "complexType" => {
                    let name = self.required_name(child)?;
                    let complex = self.complex_type(child, Some(name.clone()))?;
                    self.document
                        .types
                        .insert(name, TypeDef::Complex(Arc::new(complex)));
                }
                "simpleType" => {
                    let name = self.required_name(child)?;
                    let simple = self.simple_type(child, Some(name.clone()))?;
                    self.document
                        .types
                        .insert(name, TypeDef::Simple(Arc::new(simple)));
                }
                "group" => {
                    let name = self.required_name(child)?;
                    let particle = xs_children(child)
                        .find(|c| matches!(c.tag_name().name(), "sequence" | "choice" | "all"))
                        .map(|c| self.model_group(c))
                        .transpose()?
                        .unwrap_or_else(|| Particle::once(Term::Sequence(Vec::new())));
                    self.document.groups.insert(name, Arc::new(particle));
                }
                "attributeGroup" => {
                    let name = self.required_name(child)?;
                    let (attributes, any_attribute) = self.attribute_items(child)?;
                    self.document.attribute_groups.insert(
                        name,
                        Arc::new(AttributeGroup {
                            attributes,
                            any_attribute,
                        }),
                    );
                }
                "include" | "redefine" => {
                    if let Some(path) = self.schema_location(child) {
                        self.document.includes.push(path);
                    }
                }
                "import" => {
                    let namespace = child.attribute("namespace").unwrap_or("").to_string();
                    if let Some(path) = self.schema_location(child) {
                        self.document.imports.push((namespace, path));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn schema_location(&self, node: Node) -> Option<std::path::PathBuf> {
        let location = node.attribute("schemaLocation")?;
        let base_dir = self.location.parent().unwrap_or_else(|| Path::new(""));
        match resolve_location(location, base_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!(
                    "Skipping {} of '{}' in {}: {}",
                    node.tag_name().name(),
                    location,
                    self.location.display(),
                    e
                );
                None
            }
        }
    }

    fn required_name(&self, node: Node) -> SchemaResult<String> {
        node.attribute("name").map(str::to_string).ok_or_else(|| {
            invalid(
                self.location,
                format!("The required attribute 'name' is missing on <{}>.", node.tag_name().name()),
            )
        })
    }

    /// Resolve a QName-valued attribute against the namespaces in scope at `node`.
    fn qname(&self, node: Node, value: &str) -> SchemaResult<QualifiedName> {
        let value = value.trim();
        let (prefix, local) = match value.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value),
        };
        let namespace = match prefix {
            Some("xml") => Some(XML_NS),
            Some(prefix) => node.lookup_namespace_uri(Some(prefix)),
            None => node.lookup_namespace_uri(None),
        };
        match (prefix, namespace) {
            (Some(prefix), None) => Err(invalid(
                self.location,
                format!("'{}' is an undeclared prefix.", prefix),
            )),
            (_, namespace) => Ok(QualifiedName::new(namespace.unwrap_or(""), local)),
        }
    }

    fn attr_qname(&self, node: Node, attribute: &str) -> SchemaResult<Option<QualifiedName>> {
        node.attribute(attribute)
            .map(|value| self.qname(node, value))
            .transpose()
    }

    fn occurs(&self, node: Node) -> SchemaResult<(u32, MaxOccurs)> {
        let min = match node.attribute("minOccurs") {
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                invalid(self.location, format!("Invalid minOccurs value '{}'.", value))
            })?,
            None => 1,
        };
        let max = match node.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => MaxOccurs::Unbounded,
            Some(value) => MaxOccurs::Bounded(value.parse::<u32>().map_err(|_| {
                invalid(self.location, format!("Invalid maxOccurs value '{}'.", value))
            })?),
            None => MaxOccurs::Bounded(1),
        };
        if let MaxOccurs::Bounded(max) = max
            && max < min
        {
            return Err(invalid(
                self.location,
                "minOccurs value cannot be greater than maxOccurs value.",
            ));
        }
        Ok((min, max))
    }

    fn element_decl(&self, node: Node, global: bool) -> SchemaResult<ElementDecl> {
        let local = self.required_name(node)?;
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => self.qualified_elements,
        };
        let namespace = if global || qualified {
            self.target_namespace.clone()
        } else {
            String::new()
        };

        let type_ref = if let Some(name) = self.attr_qname(node, "type")? {
            Some(TypeRef::Named(name))
        } else if let Some(complex) = xs_child(node, "complexType") {
            Some(TypeRef::Complex(Arc::new(self.complex_type(complex, None)?)))
        } else if let Some(simple) = xs_child(node, "simpleType") {
            Some(TypeRef::Simple(Arc::new(self.simple_type(simple, None)?)))
        } else {
            None
        };

        Ok(ElementDecl {
            name: QualifiedName::new(namespace, local),
            type_ref,
            nillable: node.attribute("nillable") == Some("true"),
            is_abstract: node.attribute("abstract") == Some("true"),
            default: node.attribute("default").map(str::to_string),
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn particle(&self, node: Node) -> SchemaResult<Option<Particle>> {
        let (min, max) = self.occurs(node)?;
        let term = match node.tag_name().name() {
            "element" => match self.attr_qname(node, "ref")? {
                Some(name) => Term::ElementRef(name),
                None => Term::Element(Arc::new(self.element_decl(node, false)?)),
            },
            "any" => Term::Any(self.wildcard(node)),
            "group" => match self.attr_qname(node, "ref")? {
                Some(name) => Term::GroupRef(name),
                None => return Ok(None),
            },
            "sequence" | "choice" | "all" => self.model_group(node)?.term,
            _ => return Ok(None),
        };
        Ok(Some(Particle { min, max, term }))
    }

    fn model_group(&self, node: Node) -> SchemaResult<Particle> {
        let (min, max) = self.occurs(node)?;
        let mut items = Vec::new();
        for child in xs_children(node) {
            if let Some(particle) = self.particle(child)? {
                items.push(particle);
            }
        }
        let term = match node.tag_name().name() {
            "choice" => Term::Choice(items),
            "all" => Term::All(items),
            _ => Term::Sequence(items),
        };
        Ok(Particle { min, max, term })
    }

    fn wildcard(&self, node: Node) -> Wildcard {
        let namespaces = match node.attribute("namespace").map(str::trim) {
            None | Some("##any") => NamespaceConstraint::Any,
            Some("##other") => NamespaceConstraint::Other(self.target_namespace.clone()),
            Some(list) => NamespaceConstraint::List(
                list.split_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => self.target_namespace.clone(),
                        "##local" => String::new(),
                        ns => ns.to_string(),
                    })
                    .collect(),
            ),
        };
        let process = match node.attribute("processContents") {
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            _ => ProcessContents::Strict,
        };
        Wildcard {
            namespaces,
            process,
        }
    }

    fn complex_type(&self, node: Node, name: Option<String>) -> SchemaResult<ComplexType> {
        let mut complex = ComplexType {
            name: name.map(|local| QualifiedName::new(self.target_namespace.clone(), local)),
            mixed: node.attribute("mixed") == Some("true"),
            is_abstract: node.attribute("abstract") == Some("true"),
            content: ContentModel::Empty,
            base: None,
            attributes: Vec::new(),
            any_attribute: None,
        };

        if let Some(simple_content) = xs_child(node, "simpleContent") {
            let Some(derivation) = xs_children(simple_content)
                .find(|c| matches!(c.tag_name().name(), "extension" | "restriction"))
            else {
                return Err(invalid(self.location, "simpleContent requires an extension or restriction."));
            };
            let base = self.required_base(derivation)?;
            let method = derivation_method(derivation);
            complex.content = match method {
                DerivationMethod::Extension => ContentModel::Simple(TypeRef::Named(base.clone())),
                DerivationMethod::Restriction => {
                    let restricted_base = match xs_child(derivation, "simpleType") {
                        Some(inline) => TypeRef::Simple(Arc::new(self.simple_type(inline, None)?)),
                        None => TypeRef::Named(base.clone()),
                    };
                    ContentModel::Simple(TypeRef::Simple(Arc::new(SimpleType {
                        name: None,
                        variety: SimpleVariety::Restriction {
                            base: restricted_base,
                            facets: self.facets(derivation)?,
                        },
                    })))
                }
            };
            complex.base = Some((base, method));
            let (attributes, any_attribute) = self.attribute_items(derivation)?;
            complex.attributes = attributes;
            complex.any_attribute = any_attribute;
            return Ok(complex);
        }

        let mut holder = node;
        if let Some(complex_content) = xs_child(node, "complexContent") {
            if let Some(mixed) = complex_content.attribute("mixed") {
                complex.mixed = mixed == "true";
            }
            let Some(derivation) = xs_children(complex_content)
                .find(|c| matches!(c.tag_name().name(), "extension" | "restriction"))
            else {
                return Err(invalid(self.location, "complexContent requires an extension or restriction."));
            };
            complex.base = Some((self.required_base(derivation)?, derivation_method(derivation)));
            holder = derivation;
        }

        if let Some(group) = xs_children(holder)
            .find(|c| matches!(c.tag_name().name(), "sequence" | "choice" | "all" | "group"))
            && let Some(particle) = self.particle(group)?
        {
            complex.content = ContentModel::Particle(particle);
        } else if complex.mixed {
            complex.content = ContentModel::Particle(Particle::once(Term::Sequence(Vec::new())));
        }

        let (attributes, any_attribute) = self.attribute_items(holder)?;
        complex.attributes = attributes;
        complex.any_attribute = any_attribute;
        Ok(complex)
    }

    fn required_base(&self, node: Node) -> SchemaResult<QualifiedName> {
        self.attr_qname(node, "base")?.ok_or_else(|| {
            invalid(
                self.location,
                format!("The required attribute 'base' is missing on <{}>.", node.tag_name().name()),
            )
        })
    }

    fn attribute_items(&self, node: Node) -> SchemaResult<(Vec<AttributeItem>, Option<Wildcard>)> {
        let mut items = Vec::new();
        let mut any_attribute = None;
        for child in xs_children(node) {
            match child.tag_name().name() {
                "attribute" => {
                    let usage = match child.attribute("use") {
                        Some("required") => AttributeUsage::Required,
                        Some("prohibited") => AttributeUsage::Prohibited,
                        _ => AttributeUsage::Optional,
                    };
                    let by_ref = child.attribute("ref").is_some();
                    let decl = if let Some(name) = self.attr_qname(child, "ref")? {
                        AttributeDecl {
                            name,
                            type_ref: None,
                            default: child.attribute("default").map(str::to_string),
                            fixed: child.attribute("fixed").map(str::to_string),
                        }
                    } else {
                        self.attribute_decl(child, false)?
                    };
                    items.push(AttributeItem::Use { decl, usage, by_ref });
                }
                "attributeGroup" => {
                    if let Some(name) = self.attr_qname(child, "ref")? {
                        items.push(AttributeItem::GroupRef(name));
                    }
                }
                "anyAttribute" => any_attribute = Some(self.wildcard(child)),
                _ => {}
            }
        }
        Ok((items, any_attribute))
    }

    fn attribute_decl(&self, node: Node, global: bool) -> SchemaResult<AttributeDecl> {
        let local = self.required_name(node)?;
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => self.qualified_attributes,
        };
        let namespace = if global || qualified {
            self.target_namespace.clone()
        } else {
            String::new()
        };
        let type_ref = if let Some(name) = self.attr_qname(node, "type")? {
            Some(TypeRef::Named(name))
        } else if let Some(simple) = xs_child(node, "simpleType") {
            Some(TypeRef::Simple(Arc::new(self.simple_type(simple, None)?)))
        } else {
            None
        };
        Ok(AttributeDecl {
            name: QualifiedName::new(namespace, local),
            type_ref,
            default: node.attribute("default").map(str::to_string),
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn simple_type(&self, node: Node, name: Option<String>) -> SchemaResult<SimpleType> {
        let name = name.map(|local| QualifiedName::new(self.target_namespace.clone(), local));
        let any_simple = || TypeRef::Named(QualifiedName::xs("anySimpleType"));

        let variety = if let Some(restriction) = xs_child(node, "restriction") {
            let base = match self.attr_qname(restriction, "base")? {
                Some(base) => TypeRef::Named(base),
                None => match xs_child(restriction, "simpleType") {
                    Some(inline) => TypeRef::Simple(Arc::new(self.simple_type(inline, None)?)),
                    None => any_simple(),
                },
            };
            SimpleVariety::Restriction {
                base,
                facets: self.facets(restriction)?,
            }
        } else if let Some(list) = xs_child(node, "list") {
            let item = match self.attr_qname(list, "itemType")? {
                Some(item) => TypeRef::Named(item),
                None => match xs_child(list, "simpleType") {
                    Some(inline) => TypeRef::Simple(Arc::new(self.simple_type(inline, None)?)),
                    None => any_simple(),
                },
            };
            SimpleVariety::List { item }
        } else if let Some(union) = xs_child(node, "union") {
            let mut members = Vec::new();
            if let Some(member_types) = union.attribute("memberTypes") {
                for member in member_types.split_whitespace() {
                    members.push(TypeRef::Named(self.qname(union, member)?));
                }
            }
            for inline in xs_children(union).filter(|c| c.tag_name().name() == "simpleType") {
                members.push(TypeRef::Simple(Arc::new(self.simple_type(inline, None)?)));
            }
            SimpleVariety::Union { members }
        } else {
            return Err(invalid(
                self.location,
                "simpleType requires a restriction, list or union.",
            ));
        };

        Ok(SimpleType { name, variety })
    }

    fn facets(&self, node: Node) -> SchemaResult<Facets> {
        let mut facets = Facets::default();
        for child in xs_children(node) {
            let Some(value) = child.attribute("value") else {
                continue;
            };
            let length = || {
                value.trim().parse::<usize>().map_err(|_| {
                    invalid(
                        self.location,
                        format!("Invalid {} facet value '{}'.", child.tag_name().name(), value),
                    )
                })
            };
            let digits = || {
                value.trim().parse::<u32>().map_err(|_| {
                    invalid(
                        self.location,
                        format!("Invalid {} facet value '{}'.", child.tag_name().name(), value),
                    )
                })
            };
            match child.tag_name().name() {
                "enumeration" => facets.enumeration.push(value.to_string()),
                "pattern" => match Regex::new(&translate_pattern(value)) {
                    Ok(regex) => facets.patterns.push(regex),
                    Err(e) => log::warn!(
                        "Ignoring pattern '{}' in {}: {}",
                        value,
                        self.location.display(),
                        e
                    ),
                },
                "length" => facets.length = Some(length()?),
                "minLength" => facets.min_length = Some(length()?),
                "maxLength" => facets.max_length = Some(length()?),
                "minInclusive" => facets.min_inclusive = Some(value.trim().to_string()),
                "maxInclusive" => facets.max_inclusive = Some(value.trim().to_string()),
                "minExclusive" => facets.min_exclusive = Some(value.trim().to_string()),
                "maxExclusive" => facets.max_exclusive = Some(value.trim().to_string()),
                "totalDigits" => facets.total_digits = Some(digits()?),
                "fractionDigits" => facets.fraction_digits = Some(digits()?),
                "whiteSpace" => {
                    facets.white_space = Some(match value.trim() {
                        "preserve" => WhiteSpace::Preserve,
                        "replace" => WhiteSpace::Replace,
                        _ => WhiteSpace::Collapse,
                    })
                }
                _ => {}
            }
        }
        Ok(facets)
    }
}

fn derivation_method(node: Node) -> DerivationMethod {
    if node.tag_name().name() == "extension" {
        DerivationMethod::Extension
    } else {
        DerivationMethod::Restriction
    }
}
