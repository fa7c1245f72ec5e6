//! The run-local schema set.
//!
//! A [`SchemaSet`] starts empty and grows while the instance document streams
//! in: every binding harvested from an `xsi:*schemaLocation` attribute (and
//! every inline `xs:schema`) is added and compiled before the element that
//! carried it is validated. Nothing is shared between runs.

pub mod compiler;
pub mod content;
pub mod datatypes;
pub mod model;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{SchemaError, SchemaResult};
use compiler::compile_schema;
use content::{CompiledModel, ComponentResolver, compile_particle};
use datatypes::{Builtin, ResolvedType, TypeResolver};
use model::*;

const MAX_BASE_DEPTH: usize = 32;

/// Supplies schema document text for a location.
#[cfg_attr(test, mockall::automock)]
pub trait SchemaSource: Send + Sync {
    fn load(&self, path: &Path) -> SchemaResult<String>;
}

/// A namespace (empty for "no namespace") bound to a schema location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaBinding {
    pub namespace: String,
    pub location: PathBuf,
}

/// Attribute use after references and groups have been expanded.
#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub decl: Arc<AttributeDecl>,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub enum EffectiveContent {
    Empty,
    Simple(TypeRef),
    Elements(Arc<CompiledModel>),
}

/// A complex type with its derivation chain flattened.
#[derive(Debug, Clone)]
pub struct EffectiveType {
    pub mixed: bool,
    pub is_abstract: bool,
    pub content: EffectiveContent,
    pub attributes: Vec<AttributeUse>,
    pub any_attribute: Option<Wildcard>,
}

pub struct SchemaSet {
    source: Arc<dyn SchemaSource>,
    documents: Vec<Arc<SchemaDocument>>,
    by_namespace: HashMap<String, Vec<usize>>,
    loaded: HashSet<PathBuf>,
    registered: HashSet<SchemaBinding>,
    pending: Vec<SchemaBinding>,
    inline_count: usize,
    any_type: Arc<ComplexType>,
    effective_cache: RefCell<HashMap<usize, Arc<EffectiveType>>>,
}

impl SchemaSet {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            source,
            documents: Vec::new(),
            by_namespace: HashMap::new(),
            loaded: HashSet::new(),
            registered: HashSet::new(),
            pending: Vec::new(),
            inline_count: 0,
            any_type: Arc::new(ComplexType::any_type()),
            effective_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Register a binding; returns `false` when it was already known.
    pub fn add(&mut self, binding: SchemaBinding) -> bool {
        if !self.registered.insert(binding.clone()) {
            return false;
        }
        log::debug!(
            "Registered schema binding '{}' -> {}",
            binding.namespace,
            binding.location.display()
        );
        self.pending.push(binding);
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Load every pending binding. Failures are returned per binding.
    pub fn compile(&mut self) -> Vec<(SchemaBinding, SchemaError)> {
        let mut failures = Vec::new();
        for binding in std::mem::take(&mut self.pending) {
            if let Err(e) = self.load_binding(&binding) {
                log::debug!(
                    "Schema load failed for '{}' ({}): {}",
                    binding.namespace,
                    binding.location.display(),
                    e
                );
                failures.push((binding, e));
            }
        }
        failures
    }

    fn load_binding(&mut self, binding: &SchemaBinding) -> SchemaResult<()> {
        if self.loaded.contains(&binding.location) {
            let existing = self
                .documents
                .iter()
                .find(|doc| doc.location == binding.location);
            return match existing {
                Some(doc) if doc.target_namespace != binding.namespace => Err(SchemaError::NamespaceMismatch {
                    expected: binding.namespace.clone(),
                    actual: doc.target_namespace.clone(),
                }),
                _ => Ok(()),
            };
        }

        let text = self.source.load(&binding.location)?;
        let document = compile_schema(&text, &binding.location)?;
        if document.target_namespace != binding.namespace {
            return Err(SchemaError::NamespaceMismatch {
                expected: binding.namespace.clone(),
                actual: document.target_namespace,
            });
        }
        self.insert(document);
        Ok(())
    }

    /// Compile a schema embedded in the instance document.
    pub fn add_inline(&mut self, text: &str) -> SchemaResult<()> {
        self.inline_count += 1;
        let label = PathBuf::from(format!("inline-schema-{}", self.inline_count));
        let document = compile_schema(text, &label)?;
        log::debug!(
            "Compiled inline schema for namespace '{}'",
            document.target_namespace
        );
        self.insert(document);
        Ok(())
    }

    fn insert(&mut self, document: SchemaDocument) {
        let mut queue = vec![document];
        while let Some(document) = queue.pop() {
            self.loaded.insert(document.location.clone());
            for path in document.includes.iter() {
                if let Some(included) = self.load_referenced(path, Some(&document.target_namespace)) {
                    queue.push(included);
                }
            }
            for (_, path) in document.imports.iter() {
                if let Some(imported) = self.load_referenced(path, None) {
                    queue.push(imported);
                }
            }

            let index = self.documents.len();
            self.by_namespace
                .entry(document.target_namespace.clone())
                .or_default()
                .push(index);
            log::debug!(
                "Added schema {} for namespace '{}'",
                document.location.display(),
                document.target_namespace
            );
            self.documents.push(Arc::new(document));
        }
        self.effective_cache.borrow_mut().clear();
    }

    /// Load an included or imported document; cycles and failures are skipped.
    fn load_referenced(&mut self, path: &Path, include_namespace: Option<&str>) -> Option<SchemaDocument> {
        if !self.loaded.insert(path.to_path_buf()) {
            return None;
        }
        let loaded = self
            .source
            .load(path)
            .and_then(|text| compile_schema(&text, path));
        match loaded {
            Ok(document) => {
                if let Some(namespace) = include_namespace
                    && document.target_namespace != namespace
                {
                    log::warn!(
                        "Included schema {} has targetNamespace '{}', expected '{}'",
                        path.display(),
                        document.target_namespace,
                        namespace
                    );
                    return None;
                }
                Some(document)
            }
            Err(e) => {
                log::warn!("Skipping referenced schema {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.by_namespace.contains_key(namespace)
    }

    fn find<T>(&self, name: &QualifiedName, pick: impl Fn(&SchemaDocument) -> Option<T>) -> Option<T> {
        self.by_namespace
            .get(&name.namespace)?
            .iter()
            .find_map(|&index| pick(self.documents[index].as_ref()))
    }

    pub fn element(&self, name: &QualifiedName) -> Option<Arc<ElementDecl>> {
        self.find(name, |doc| doc.elements.get(&name.local).cloned())
    }

    pub fn attribute(&self, name: &QualifiedName) -> Option<Arc<AttributeDecl>> {
        self.find(name, |doc| doc.attributes.get(&name.local).cloned())
    }

    pub fn attribute_group(&self, name: &QualifiedName) -> Option<Arc<AttributeGroup>> {
        self.find(name, |doc| doc.attribute_groups.get(&name.local).cloned())
    }

    pub fn type_def(&self, name: &QualifiedName) -> Option<TypeDef> {
        self.find(name, |doc| doc.types.get(&name.local).cloned())
    }

    pub fn any_type(&self) -> Arc<ComplexType> {
        self.any_type.clone()
    }

    /// Flatten a complex type's derivation chain, memoized per type.
    pub fn effective_type(&self, complex: &Arc<ComplexType>) -> Arc<EffectiveType> {
        let key = Arc::as_ptr(complex) as usize;
        if let Some(cached) = self.effective_cache.borrow().get(&key) {
            return cached.clone();
        }
        let effective = Arc::new(self.flatten(complex, 0));
        self.effective_cache
            .borrow_mut()
            .insert(key, effective.clone());
        effective
    }

    fn flatten(&self, complex: &ComplexType, depth: usize) -> EffectiveType {
        let base = match &complex.base {
            Some((base, method)) if depth < MAX_BASE_DEPTH && !base.is_xs("anyType") => {
                self.resolve_type(&TypeRef::Named(base.clone()))
                    .map(|resolved| (resolved, *method))
            }
            _ => None,
        };

        let (base_effective, method) = match base {
            Some((ResolvedType::Complex(base), method)) => (Some(self.flatten(&base, depth + 1)), Some(method)),
            _ => (None, None),
        };

        let own_particle = match &complex.content {
            ContentModel::Particle(particle) => Some(particle.clone()),
            _ => None,
        };

        let content = match (&complex.content, &base_effective, method) {
            (ContentModel::Simple(type_ref), _, _) => EffectiveContent::Simple(type_ref.clone()),
            (_, Some(base), Some(DerivationMethod::Extension)) => {
                let base_particle = base_particle(complex, base, self, depth);
                match (base_particle, own_particle) {
                    (Some(b), Some(o)) => EffectiveContent::Elements(Arc::new(compile_particle(
                        &Particle::once(Term::Sequence(vec![b, o])),
                        self,
                    ))),
                    (Some(b), None) => EffectiveContent::Elements(Arc::new(compile_particle(&b, self))),
                    (None, Some(o)) => EffectiveContent::Elements(Arc::new(compile_particle(&o, self))),
                    (None, None) => match &base.content {
                        EffectiveContent::Simple(t) => EffectiveContent::Simple(t.clone()),
                        _ => EffectiveContent::Empty,
                    },
                }
            }
            (ContentModel::Particle(particle), _, _) => {
                EffectiveContent::Elements(Arc::new(compile_particle(particle, self)))
            }
            (ContentModel::Empty, _, _) => EffectiveContent::Empty,
        };

        let mut attributes: Vec<AttributeUse> = base_effective
            .as_ref()
            .map(|base| base.attributes.clone())
            .unwrap_or_default();
        let mut any_attribute = complex.any_attribute.clone();
        if method == Some(DerivationMethod::Extension) && any_attribute.is_none() {
            any_attribute = base_effective.as_ref().and_then(|b| b.any_attribute.clone());
        }
        self.expand_attributes(&complex.attributes, &mut attributes, &mut any_attribute, 0);

        let inherited_mixed = method == Some(DerivationMethod::Extension)
            && base_effective.as_ref().is_some_and(|b| b.mixed);

        EffectiveType {
            mixed: complex.mixed || inherited_mixed,
            is_abstract: complex.is_abstract,
            content,
            attributes,
            any_attribute,
        }
    }

    fn expand_attributes(
        &self,
        items: &[AttributeItem],
        uses: &mut Vec<AttributeUse>,
        any_attribute: &mut Option<Wildcard>,
        depth: usize,
    ) {
        for item in items {
            match item {
                AttributeItem::Use { decl, usage, by_ref } => {
                    uses.retain(|existing| existing.decl.name != decl.name);
                    if *usage == AttributeUsage::Prohibited {
                        continue;
                    }
                    let decl = if *by_ref {
                        match self.attribute(&decl.name) {
                            Some(global) => Arc::new(AttributeDecl {
                                name: global.name.clone(),
                                type_ref: global.type_ref.clone(),
                                default: decl.default.clone().or_else(|| global.default.clone()),
                                fixed: decl.fixed.clone().or_else(|| global.fixed.clone()),
                            }),
                            None => Arc::new(decl.clone()),
                        }
                    } else {
                        Arc::new(decl.clone())
                    };
                    uses.push(AttributeUse {
                        decl,
                        required: *usage == AttributeUsage::Required,
                    });
                }
                AttributeItem::GroupRef(name) => {
                    if depth >= MAX_BASE_DEPTH {
                        continue;
                    }
                    if let Some(group) = self.attribute_group(name) {
                        if any_attribute.is_none() {
                            *any_attribute = group.any_attribute.clone();
                        }
                        self.expand_attributes(&group.attributes, uses, any_attribute, depth + 1);
                    }
                }
            }
        }
    }
}

fn base_particle(
    complex: &ComplexType,
    base: &EffectiveType,
    set: &SchemaSet,
    depth: usize,
) -> Option<Particle> {
    // Extension appends to the base's particle, which is re-read from the base definition.
    let (base_name, _) = complex.base.as_ref()?;
    let mut current = match set.type_def(base_name)? {
        TypeDef::Complex(ct) => ct,
        TypeDef::Simple(_) => return None,
    };
    if matches!(base.content, EffectiveContent::Empty | EffectiveContent::Simple(_)) {
        return None;
    }
    let mut chain = Vec::new();
    for _ in depth..MAX_BASE_DEPTH {
        if let ContentModel::Particle(particle) = &current.content {
            chain.push(particle.clone());
        }
        match &current.base {
            Some((next, DerivationMethod::Extension)) => match set.type_def(next) {
                Some(TypeDef::Complex(next)) => current = next,
                _ => break,
            },
            _ => break,
        }
    }
    chain.reverse();
    match chain.len() {
        0 => None,
        1 => chain.pop(),
        _ => Some(Particle::once(Term::Sequence(chain))),
    }
}

impl TypeResolver for SchemaSet {
    fn resolve_type(&self, type_ref: &TypeRef) -> Option<ResolvedType> {
        match type_ref {
            TypeRef::Complex(complex) => Some(ResolvedType::Complex(complex.clone())),
            TypeRef::Simple(simple) => Some(ResolvedType::Simple(simple.clone())),
            TypeRef::Named(name) if name.namespace == XS_NS => {
                if name.local == "anyType" {
                    Some(ResolvedType::Complex(self.any_type.clone()))
                } else {
                    Builtin::from_local(&name.local).map(ResolvedType::Builtin)
                }
            }
            TypeRef::Named(name) => match self.type_def(name)? {
                TypeDef::Complex(complex) => Some(ResolvedType::Complex(complex)),
                TypeDef::Simple(simple) => Some(ResolvedType::Simple(simple)),
            },
        }
    }
}

impl ComponentResolver for SchemaSet {
    fn global_element(&self, name: &QualifiedName) -> Option<Arc<ElementDecl>> {
        self.element(name)
    }

    fn model_group(&self, name: &QualifiedName) -> Option<Arc<Particle>> {
        self.find(name, |doc| doc.groups.get(&name.local).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::content::ContentMatcher;

    const NOTE_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType>
      <xs:sequence><xs:element name="to" type="xs:string"/></xs:sequence>
      <xs:attribute name="lang" type="xs:language"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    fn binding(namespace: &str, location: &str) -> SchemaBinding {
        SchemaBinding {
            namespace: namespace.to_string(),
            location: PathBuf::from(location),
        }
    }

    #[test]
    fn test_compile_registers_documents_once() {
        let mut source = MockSchemaSource::new();
        source
            .expect_load()
            .withf(|path| path.ends_with("note.xsd"))
            .times(1)
            .returning(|_| Ok(NOTE_XSD.to_string()));
        let mut set = SchemaSet::new(Arc::new(source));

        assert!(set.is_empty());
        assert!(set.add(binding("", "/s/note.xsd")));
        assert!(!set.add(binding("", "/s/note.xsd")));
        assert!(set.compile().is_empty());
        assert!(!set.is_empty());
        assert!(set.has_namespace(""));
        assert!(set.element(&QualifiedName::new("", "note")).is_some());
        assert!(set.element(&QualifiedName::new("", "missing")).is_none());
    }

    #[test]
    fn test_missing_schema_reported_per_binding() {
        let mut source = MockSchemaSource::new();
        source.expect_load().returning(|path| {
            Err(SchemaError::NotFound {
                path: path.to_path_buf(),
            })
        });
        let mut set = SchemaSet::new(Arc::new(source));

        set.add(binding("urn:a", "/s/a.xsd"));
        set.add(binding("urn:b", "/s/b.xsd"));
        let failures = set.compile();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0.namespace, "urn:a");
        assert!(matches!(failures[1].1, SchemaError::NotFound { .. }));
        assert!(set.compile().is_empty());
    }

    #[test]
    fn test_namespace_mismatch() {
        let mut source = MockSchemaSource::new();
        source
            .expect_load()
            .returning(|_| Ok(NOTE_XSD.to_string()));
        let mut set = SchemaSet::new(Arc::new(source));

        set.add(binding("urn:expected", "/s/note.xsd"));
        let failures = set.compile();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].1, SchemaError::NamespaceMismatch { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn test_includes_are_followed() {
        let main = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:m" xmlns:m="urn:m">
  <xs:include schemaLocation="types.xsd"/>
  <xs:element name="root" type="m:RootType"/>
</xs:schema>"#;
        let types = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:m">
  <xs:complexType name="RootType"><xs:sequence/></xs:complexType>
</xs:schema>"#;
        let mut source = MockSchemaSource::new();
        source
            .expect_load()
            .withf(|path| path.ends_with("main.xsd"))
            .returning(move |_| Ok(main.to_string()));
        source
            .expect_load()
            .withf(|path| path.ends_with("types.xsd"))
            .returning(move |_| Ok(types.to_string()));
        let mut set = SchemaSet::new(Arc::new(source));

        set.add(binding("urn:m", "/s/main.xsd"));
        assert!(set.compile().is_empty());
        assert!(matches!(
            set.type_def(&QualifiedName::new("urn:m", "RootType")),
            Some(TypeDef::Complex(_))
        ));
    }

    #[test]
    fn test_effective_type_extension() {
        let text = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Base">
    <xs:sequence><xs:element name="a"/></xs:sequence>
    <xs:attribute name="id" use="required"/>
  </xs:complexType>
  <xs:complexType name="Derived">
    <xs:complexContent>
      <xs:extension base="Base">
        <xs:sequence><xs:element name="b"/></xs:sequence>
        <xs:attribute name="extra"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#;
        let mut set = SchemaSet::new(Arc::new(MockSchemaSource::new()));
        set.add_inline(text).unwrap();

        let Some(TypeDef::Complex(derived)) = set.type_def(&QualifiedName::new("", "Derived")) else {
            panic!("Derived missing");
        };
        let effective = set.effective_type(&derived);
        assert_eq!(effective.attributes.len(), 2);
        assert!(effective.attributes[0].required);

        let EffectiveContent::Elements(model) = &effective.content else {
            panic!("expected element content");
        };
        let mut matcher = ContentMatcher::new(model.clone());
        assert!(matcher.step(&QualifiedName::new("", "a")).is_some());
        assert!(matcher.step(&QualifiedName::new("", "b")).is_some());
        assert!(matcher.is_complete());
    }

    #[test]
    fn test_resolves_builtin_types() {
        let set = SchemaSet::new(Arc::new(MockSchemaSource::new()));
        assert!(matches!(
            set.resolve_type(&TypeRef::Named(QualifiedName::xs("int"))),
            Some(ResolvedType::Builtin(Builtin::Int))
        ));
        assert!(matches!(
            set.resolve_type(&TypeRef::Named(QualifiedName::xs("anyType"))),
            Some(ResolvedType::Complex(_))
        ));
        assert!(set
            .resolve_type(&TypeRef::Named(QualifiedName::new("urn:x", "T")))
            .is_none());
    }
}
