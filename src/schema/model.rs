//! Compiled schema components.
//!
//! Components reference each other by expanded name and are resolved against
//! the whole [`SchemaSet`](super::SchemaSet) when an instance is validated, so
//! a type may live in a document registered after the one that uses it.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// `(namespace, local name)`; an empty namespace means "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub namespace: String,
    pub local: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    pub fn xs(local: &str) -> Self {
        Self::new(XS_NS, local)
    }

    pub fn is_xs(&self, local: &str) -> bool {
        self.namespace == XS_NS && self.local == local
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}:{}", self.namespace, self.local)
        }
    }
}

/// Reference to a type: by name, or an anonymous definition carried inline.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(QualifiedName),
    Complex(Arc<ComplexType>),
    Simple(Arc<SimpleType>),
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QualifiedName,
    /// `None` means the declaration has no type: `xs:anyType`.
    pub type_ref: Option<TypeRef>,
    pub nillable: bool,
    pub is_abstract: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationMethod {
    Extension,
    Restriction,
}

#[derive(Debug, Clone)]
pub enum ContentModel {
    Empty,
    Simple(TypeRef),
    Particle(Particle),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: Option<QualifiedName>,
    pub mixed: bool,
    pub is_abstract: bool,
    pub content: ContentModel,
    pub base: Option<(QualifiedName, DerivationMethod)>,
    pub attributes: Vec<AttributeItem>,
    pub any_attribute: Option<Wildcard>,
}

impl ComplexType {
    /// `xs:anyType`: any attributes, any children, text allowed.
    pub fn any_type() -> Self {
        let wildcard = Wildcard {
            namespaces: NamespaceConstraint::Any,
            process: ProcessContents::Lax,
        };
        Self {
            name: Some(QualifiedName::xs("anyType")),
            mixed: true,
            is_abstract: false,
            content: ContentModel::Particle(Particle {
                min: 0,
                max: MaxOccurs::Unbounded,
                term: Term::Any(wildcard.clone()),
            }),
            base: None,
            attributes: Vec::new(),
            any_attribute: Some(wildcard),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub min: u32,
    pub max: MaxOccurs,
    pub term: Term,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self {
            min: 1,
            max: MaxOccurs::Bounded(1),
            term,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(Arc<ElementDecl>),
    ElementRef(QualifiedName),
    Any(Wildcard),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    GroupRef(QualifiedName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// `##other` relative to the carried target namespace; never matches no-namespace names.
    Other(String),
    List(Vec<String>),
}

impl NamespaceConstraint {
    pub fn admits(&self, namespace: &str) -> bool {
        match self {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => !namespace.is_empty() && namespace != target,
            NamespaceConstraint::List(list) => list.iter().any(|ns| ns == namespace),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUsage {
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: QualifiedName,
    pub type_ref: Option<TypeRef>,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AttributeItem {
    /// Local declaration, or a reference to a global one when `by_ref` is set.
    Use {
        decl: AttributeDecl,
        usage: AttributeUsage,
        by_ref: bool,
    },
    GroupRef(QualifiedName),
}

#[derive(Debug, Clone)]
pub struct AttributeGroup {
    pub attributes: Vec<AttributeItem>,
    pub any_attribute: Option<Wildcard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    /// Alternatives from one derivation step; a value passes when any matches.
    pub patterns: Vec<Regex>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    pub white_space: Option<WhiteSpace>,
}

#[derive(Debug, Clone)]
pub enum SimpleVariety {
    Restriction { base: TypeRef, facets: Facets },
    List { item: TypeRef },
    Union { members: Vec<TypeRef> },
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<QualifiedName>,
    pub variety: SimpleVariety,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Complex(Arc<ComplexType>),
    Simple(Arc<SimpleType>),
}

/// One compiled schema document (`xs:schema` element).
#[derive(Debug, Default)]
pub struct SchemaDocument {
    pub target_namespace: String,
    pub location: PathBuf,
    pub elements: HashMap<String, Arc<ElementDecl>>,
    pub attributes: HashMap<String, Arc<AttributeDecl>>,
    pub types: HashMap<String, TypeDef>,
    pub groups: HashMap<String, Arc<Particle>>,
    pub attribute_groups: HashMap<String, Arc<AttributeGroup>>,
    /// Included documents, resolved against this document's directory.
    pub includes: Vec<PathBuf>,
    /// `(namespace, location)` of imported documents.
    pub imports: Vec<(String, PathBuf)>,
}
