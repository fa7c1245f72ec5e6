//! Streaming schema-resolving validator.
//!
//! One call to [`validate_document`] is one run: the document is pulled
//! through `quick-xml` once, schema hints are harvested from each start tag
//! and added to a run-local [`SchemaSet`] before that element is validated,
//! and every problem becomes a [`ValidationIssue`]. A well-formedness fault
//! ends the run after a single issue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::position::LineIndex;
use crate::report::{Severity, ValidationIssue, ValidationReport};
use crate::schema::content::{ContentMatcher, Leaf};
use crate::schema::datatypes::{ResolvedType, TypeResolver, normalize, type_label, validate_value};
use crate::schema::model::{
    ElementDecl, ProcessContents, QualifiedName, TypeRef, WhiteSpace, XML_NS, XSI_NS,
};
use crate::schema::{EffectiveContent, EffectiveType, SchemaBinding, SchemaSet, SchemaSource};
use crate::schema_loader::{FsSchemaSource, parse_schema_location, resolve_location};

/// Settings for one validation run.
#[derive(Clone)]
pub struct ValidatorOptions {
    /// Directory relative schema locations resolve against.
    pub base_dir: PathBuf,
    /// Cursor hint `(line, column)`; accepted for interface compatibility only.
    pub cursor: Option<(u32, u32)>,
    pub report_warnings: bool,
    pub source: Arc<dyn SchemaSource>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cursor: None,
            report_warnings: true,
            source: Arc::new(FsSchemaSource),
        }
    }
}

impl std::fmt::Debug for ValidatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorOptions")
            .field("base_dir", &self.base_dir)
            .field("cursor", &self.cursor)
            .field("report_warnings", &self.report_warnings)
            .finish_non_exhaustive()
    }
}

impl ValidatorOptions {
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_cursor(mut self, cursor: Option<(u32, u32)>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_warnings(mut self, report_warnings: bool) -> Self {
        self.report_warnings = report_warnings;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.source = source;
        self
    }
}

/// Directory a document's relative schema locations resolve against.
pub fn document_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Validate `text` against the schemas it references.
///
/// Never fails: unreadable schemas, malformed markup and schema violations
/// all end up as issues in the returned report.
pub fn validate_document(text: &str, options: &ValidatorOptions) -> ValidationReport {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    log::debug!(
        "Validating {} bytes (base dir {}, cursor {:?})",
        text.len(),
        options.base_dir.display(),
        options.cursor
    );
    let mut run = ValidationRun::new(text, options);
    run.execute();
    log::debug!(
        "Validation finished: {} error(s), {} warning(s)",
        run.report.error_count(),
        run.report.warning_count()
    );
    run.report
}

/// A malformed-document fault: ends the run.
#[derive(Debug)]
struct Fault {
    message: String,
    offset: usize,
}

impl Fault {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug)]
struct Attr {
    raw: String,
    /// `None` for namespace declarations.
    name: Option<QualifiedName>,
    value: String,
    offset: usize,
}

impl Attr {
    fn is_xsi(&self, local: &str) -> bool {
        self.name
            .as_ref()
            .is_some_and(|n| n.namespace == XSI_NS && n.local == local)
    }

    /// Attributes every element may carry regardless of its type.
    fn is_always_allowed(&self) -> bool {
        match &self.name {
            None => true,
            Some(name) => name.namespace == XSI_NS,
        }
    }
}

enum Content {
    Empty,
    Simple(TypeRef),
    Elements { matcher: ContentMatcher, mixed: bool },
}

struct Typed {
    decl: Option<Arc<ElementDecl>>,
    content: Content,
    nil: bool,
    text: String,
}

enum Mode {
    /// Not governed by a declaration; children are looked up as globals.
    Lax,
    /// Subtree excluded from validation.
    Skip,
    Typed(Box<Typed>),
}

struct Frame {
    raw_name: String,
    name: QualifiedName,
    name_offset: usize,
    mode: Mode,
}

struct ValidationRun<'a> {
    text: &'a str,
    index: LineIndex<'a>,
    options: &'a ValidatorOptions,
    set: SchemaSet,
    report: ValidationReport,
    frames: Vec<Frame>,
    scopes: Vec<Vec<(String, String)>>,
    binding_offsets: HashMap<SchemaBinding, usize>,
    root_closed: bool,
}

impl<'a> ValidationRun<'a> {
    fn new(text: &'a str, options: &'a ValidatorOptions) -> Self {
        Self {
            text,
            index: LineIndex::new(text),
            options,
            set: SchemaSet::new(options.source.clone()),
            report: ValidationReport::new(),
            frames: Vec::new(),
            scopes: Vec::new(),
            binding_offsets: HashMap::new(),
            root_closed: false,
        }
    }

    fn execute(&mut self) {
        let mut reader = Reader::from_str(self.text);
        reader.config_mut().check_end_names = false;
        reader.config_mut().allow_unmatched_ends = true;

        loop {
            let before = reader.buffer_position() as usize;
            let step = match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let tag = self.tag_start(before);
                    self.start_element(&mut reader, &start, tag, false)
                }
                Ok(Event::Empty(start)) => {
                    let tag = self.tag_start(before);
                    self.start_element(&mut reader, &start, tag, true)
                }
                Ok(Event::End(end)) => {
                    let tag = self.tag_start(before);
                    let raw = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    self.end_element(&raw, tag + 2)
                }
                Ok(Event::Text(text)) => {
                    let leading = text.iter().take_while(|b| b.is_ascii_whitespace()).count();
                    match text.unescape() {
                        Ok(value) => self.text_content(&value, before + leading),
                        Err(e) => Err(Fault::new(capitalize(&e.to_string()), before + leading)),
                    }
                }
                Ok(Event::CData(data)) => {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    self.text_content(&value, before)
                }
                Ok(Event::Eof) => {
                    if let Err(fault) = self.end_of_input() {
                        self.fail(fault);
                    }
                    break;
                }
                // Declarations, comments, processing instructions and DOCTYPE carry no content.
                Ok(_) => Ok(()),
                Err(e) => Err(Fault::new(
                    capitalize(&e.to_string()),
                    reader.error_position() as usize,
                )),
            };

            if let Err(fault) = step {
                self.fail(fault);
                break;
            }
        }
    }

    /// Offset of a tag's `<`, given the reader position before the event.
    fn tag_start(&self, before: usize) -> usize {
        let bytes = self.text.as_bytes();
        if bytes.get(before) == Some(&b'<') {
            before
        } else if before > 0 && bytes.get(before - 1) == Some(&b'<') {
            before - 1
        } else {
            before
        }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        self.index.position(offset)
    }

    fn push_issue(&mut self, severity: Severity, message: String, offset: usize) {
        if severity == Severity::Warning && !self.options.report_warnings {
            return;
        }
        let (line, column) = self.position(offset);
        self.report.push(ValidationIssue {
            severity,
            message,
            line,
            column,
        });
    }

    fn error(&mut self, message: String, offset: usize) {
        self.push_issue(Severity::Error, message, offset);
    }

    fn warning(&mut self, message: String, offset: usize) {
        self.push_issue(Severity::Warning, message, offset);
    }

    /// Record the single well-formedness issue, then surface pending schema failures.
    fn fail(&mut self, fault: Fault) {
        let (line, column) = self.position(fault.offset);
        let mut message = fault.message;
        if !message.ends_with('.') {
            message.push('.');
        }
        log::debug!("Well-formedness fault at {}:{}: {}", line, column, message);
        self.report.push(ValidationIssue::error(
            format!("{} Line {}, position {}.", message, line, column),
            line,
            column,
        ));
        self.compile_pending();
    }

    fn compile_pending(&mut self) {
        for (binding, error) in self.set.compile() {
            let offset = self.binding_offsets.get(&binding).copied().unwrap_or(0);
            self.error(
                format!(
                    "Cannot load the schema for the namespace '{}' - {}",
                    binding.namespace, error
                ),
                offset,
            );
        }
    }

    fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => return Some(XML_NS),
            "xmlns" => return None,
            _ => {}
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn resolve_element_name(&self, raw: &str) -> Option<QualifiedName> {
        match raw.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.lookup_prefix(prefix)?;
                Some(QualifiedName::new(uri, local))
            }
            None => Some(QualifiedName::new(self.lookup_prefix("").unwrap_or(""), raw)),
        }
    }

    fn start_element(
        &mut self,
        reader: &mut Reader<&'a [u8]>,
        start: &BytesStart,
        tag: usize,
        empty: bool,
    ) -> Result<(), Fault> {
        let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let name_offset = tag + 1;

        if self.frames.is_empty() && self.root_closed {
            return Err(Fault::new("There are multiple root elements.", name_offset));
        }

        let mut attrs = self.collect_attributes(start, tag)?;
        let declarations: Vec<(String, String)> = attrs
            .iter()
            .filter_map(|attr| {
                if attr.raw == "xmlns" {
                    Some((String::new(), attr.value.clone()))
                } else {
                    attr.raw
                        .strip_prefix("xmlns:")
                        .map(|prefix| (prefix.to_string(), attr.value.clone()))
                }
            })
            .collect();
        self.scopes.push(declarations);

        let Some(name) = self.resolve_element_name(&raw_name) else {
            let prefix = raw_name.split(':').next().unwrap_or_default();
            return Err(Fault::new(format!("'{}' is an undeclared prefix.", prefix), name_offset));
        };
        for attr in attrs.iter_mut() {
            if attr.raw == "xmlns" || attr.raw.starts_with("xmlns:") {
                continue;
            }
            attr.name = Some(match attr.raw.split_once(':') {
                Some((prefix, local)) => match self.lookup_prefix(prefix) {
                    Some(uri) => QualifiedName::new(uri, local),
                    None => {
                        return Err(Fault::new(
                            format!("'{}' is an undeclared prefix.", prefix),
                            attr.offset,
                        ));
                    }
                },
                None => QualifiedName::new("", attr.raw.as_str()),
            });
        }

        self.harvest_schema_hints(&attrs);

        if name.is_xs("schema") {
            return self.inline_schema(reader, start, tag, empty, &raw_name);
        }

        let mode = self.child_mode(&name, &attrs, name_offset);
        self.frames.push(Frame {
            raw_name,
            name,
            name_offset,
            mode,
        });

        if empty {
            self.close_frame(name_offset);
        }
        Ok(())
    }

    fn collect_attributes(&self, start: &BytesStart, tag: usize) -> Result<Vec<Attr>, Fault> {
        let offsets = attribute_offsets(self.text, tag);
        let mut attrs = Vec::new();
        for (i, attribute) in start.attributes().enumerate() {
            let offset = offsets.get(i).copied().unwrap_or(tag + 1);
            let attribute = attribute.map_err(|e| Fault::new(capitalize(&e.to_string()), offset))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| Fault::new(capitalize(&e.to_string()), offset))?
                .into_owned();
            attrs.push(Attr {
                raw: String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
                name: None,
                value,
                offset,
            });
        }
        Ok(attrs)
    }

    fn harvest_schema_hints(&mut self, attrs: &[Attr]) {
        let mut found = Vec::new();
        for attr in attrs {
            if attr.is_xsi("schemaLocation") {
                let (pairs, dangling) = parse_schema_location(&attr.value);
                for pair in pairs {
                    found.push((pair.namespace, pair.location, attr.offset));
                }
                if let Some(namespace) = dangling {
                    self.warning(
                        format!(
                            "The 'schemaLocation' attribute has no schema location for the namespace '{}'.",
                            namespace
                        ),
                        attr.offset,
                    );
                }
            } else if attr.is_xsi("noNamespaceSchemaLocation") {
                found.push((String::new(), attr.value.trim().to_string(), attr.offset));
            }
        }

        for (namespace, location, offset) in found {
            match resolve_location(&location, &self.options.base_dir) {
                Ok(path) => {
                    let binding = SchemaBinding {
                        namespace,
                        location: path,
                    };
                    if self.set.add(binding.clone()) {
                        self.binding_offsets.insert(binding, offset);
                    }
                }
                Err(e) => {
                    self.error(
                        format!("Cannot load the schema for the namespace '{}' - {}", namespace, e),
                        offset,
                    );
                }
            }
        }

        if self.set.has_pending() {
            self.compile_pending();
        }
    }

    fn inline_schema(
        &mut self,
        reader: &mut Reader<&'a [u8]>,
        start: &BytesStart,
        tag: usize,
        empty: bool,
        raw_name: &str,
    ) -> Result<(), Fault> {
        let end = if empty {
            reader.buffer_position() as usize
        } else {
            match reader.read_to_end(start.name()) {
                Ok(_) => reader.buffer_position() as usize,
                Err(_) => {
                    let mut open = vec![raw_name.to_string()];
                    open.extend(self.frames.iter().rev().map(|f| f.raw_name.clone()));
                    return Err(unclosed_fault(&open, self.text.len()));
                }
            }
        };

        let source = self.text.get(tag..end).unwrap_or_default();
        let schema_text = self.with_scope_declarations(source, raw_name);
        if let Err(e) = self.set.add_inline(&schema_text) {
            self.error(e.to_string(), tag + 1);
        }

        self.scopes.pop();
        if self.frames.is_empty() {
            self.root_closed = true;
        }
        Ok(())
    }

    /// Re-declare the in-scope namespaces on an extracted inline schema.
    fn with_scope_declarations(&self, source: &str, raw_name: &str) -> String {
        let own: Vec<&str> = self
            .scopes
            .last()
            .map(|scope| scope.iter().map(|(p, _)| p.as_str()).collect())
            .unwrap_or_default();
        let mut visible: Vec<(&str, &str)> = Vec::new();
        for scope in self.scopes.iter().rev().skip(1) {
            for (prefix, uri) in scope.iter().rev() {
                if !own.contains(&prefix.as_str()) && !visible.iter().any(|(p, _)| *p == prefix.as_str()) {
                    visible.push((prefix.as_str(), uri.as_str()));
                }
            }
        }

        let mut injected = String::new();
        for (prefix, uri) in visible {
            let uri = uri.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;");
            if prefix.is_empty() {
                injected.push_str(&format!(" xmlns=\"{}\"", uri));
            } else {
                injected.push_str(&format!(" xmlns:{}=\"{}\"", prefix, uri));
            }
        }

        let split = (1 + raw_name.len()).min(source.len());
        format!("{}{}{}", &source[..split], injected, &source[split..])
    }

    /// Decide how a newly opened element is validated, reporting as needed.
    fn child_mode(&mut self, name: &QualifiedName, attrs: &[Attr], name_offset: usize) -> Mode {
        enum Context {
            Lax,
            Skip,
            Strict(Arc<ElementDecl>),
            StrictWildcard,
            LaxWildcard,
        }

        let outcome: Result<Context, String> = match self.frames.last_mut() {
            None => Ok(Context::Lax),
            Some(parent) => match &mut parent.mode {
                Mode::Lax => Ok(Context::Lax),
                Mode::Skip => Ok(Context::Skip),
                Mode::Typed(typed) if typed.nil => Err(format!(
                    "Element '{}' must have no character or element children.",
                    parent.name
                )),
                Mode::Typed(typed) => match &mut typed.content {
                    Content::Empty => Err(format!(
                        "The element '{}' cannot contain child element '{}' because the parent element's content model is empty.",
                        parent.name, name
                    )),
                    Content::Simple(_) => Err(format!(
                        "The element '{}' cannot contain child element '{}' because the parent element's content model is text only.",
                        parent.name, name
                    )),
                    Content::Elements { matcher, .. } => match matcher.step(name) {
                        Some(Leaf::Element(decl)) => Ok(Context::Strict(decl)),
                        Some(Leaf::Wildcard(wildcard)) => Ok(match wildcard.process {
                            ProcessContents::Strict => Context::StrictWildcard,
                            ProcessContents::Lax => Context::LaxWildcard,
                            ProcessContents::Skip => Context::Skip,
                        }),
                        None => Err(format!(
                            "The element '{}' has invalid child element '{}'.{}",
                            parent.name,
                            name,
                            matcher.expected_suffix()
                        )),
                    },
                },
            },
        };

        let context = match outcome {
            Ok(context) => context,
            Err(message) => {
                self.error(message, name_offset);
                return Mode::Skip;
            }
        };

        match context {
            Context::Skip => Mode::Skip,
            Context::Strict(decl) => self.element_mode(name, decl, attrs, name_offset),
            Context::StrictWildcard => match self.set.element(name) {
                Some(decl) => self.element_mode(name, decl, attrs, name_offset),
                None => {
                    self.error(format!("The '{}' element is not declared.", name), name_offset);
                    Mode::Lax
                }
            },
            Context::LaxWildcard => match self.set.element(name) {
                Some(decl) => self.element_mode(name, decl, attrs, name_offset),
                None => Mode::Lax,
            },
            Context::Lax => self.lax_mode(name, attrs, name_offset),
        }
    }

    fn lax_mode(&mut self, name: &QualifiedName, attrs: &[Attr], name_offset: usize) -> Mode {
        if let Some(decl) = self.set.element(name) {
            return self.element_mode(name, decl, attrs, name_offset);
        }
        if self.set.is_empty() {
            return Mode::Lax;
        }
        if self.set.has_namespace(&name.namespace) {
            self.error(format!("The '{}' element is not declared.", name), name_offset);
        } else {
            self.warning(
                format!("Could not find schema information for the element '{}'.", name),
                name_offset,
            );
            for attr in attrs.iter().filter(|a| !a.is_always_allowed()) {
                if let Some(attr_name) = &attr.name {
                    self.warning(
                        format!(
                            "Could not find schema information for the attribute '{}'.",
                            attr_name
                        ),
                        attr.offset,
                    );
                }
            }
        }
        Mode::Lax
    }

    fn resolve_qname_value(&self, value: &str) -> Option<QualifiedName> {
        let value = value.trim();
        match value.split_once(':') {
            Some((prefix, local)) => Some(QualifiedName::new(self.lookup_prefix(prefix)?, local)),
            None => Some(QualifiedName::new(self.lookup_prefix("").unwrap_or(""), value)),
        }
    }

    fn element_mode(
        &mut self,
        name: &QualifiedName,
        decl: Arc<ElementDecl>,
        attrs: &[Attr],
        name_offset: usize,
    ) -> Mode {
        if decl.is_abstract {
            self.error(
                format!("The element '{}' is abstract or its type is abstract.", name),
                name_offset,
            );
            return Mode::Skip;
        }

        let mut type_ref = decl
            .type_ref
            .clone()
            .unwrap_or_else(|| TypeRef::Named(QualifiedName::xs("anyType")));

        if let Some(attr) = attrs.iter().find(|a| a.is_xsi("type")) {
            let resolved = self
                .resolve_qname_value(&attr.value)
                .filter(|qn| self.set.resolve_type(&TypeRef::Named(qn.clone())).is_some());
            match resolved {
                Some(qn) => type_ref = TypeRef::Named(qn),
                None => {
                    self.error(format!("This is an invalid xsi:type '{}'.", attr.value.trim()), attr.offset);
                }
            }
        }

        let mut nil = false;
        if let Some(attr) = attrs.iter().find(|a| a.is_xsi("nil")) {
            let value = attr.value.trim();
            if value == "true" || value == "1" {
                if decl.nillable {
                    nil = true;
                } else {
                    self.error(
                        "If the 'nillable' attribute is false in the schema, the 'xsi:nil' attribute must not be present in the instance.".to_string(),
                        attr.offset,
                    );
                }
            }
        }

        let content = match self.set.resolve_type(&type_ref) {
            None => {
                log::debug!("Type of element '{}' is not in the schema set", name);
                return Mode::Lax;
            }
            Some(ResolvedType::Builtin(_)) | Some(ResolvedType::Simple(_)) => {
                for attr in attrs.iter().filter(|a| !a.is_always_allowed()) {
                    if let Some(attr_name) = &attr.name {
                        self.error(format!("The '{}' attribute is not declared.", attr_name), attr.offset);
                    }
                }
                Content::Simple(type_ref)
            }
            Some(ResolvedType::Complex(complex)) => {
                let effective = self.set.effective_type(&complex);
                if effective.is_abstract {
                    self.error(
                        format!("The element '{}' is abstract or its type is abstract.", name),
                        name_offset,
                    );
                    return Mode::Skip;
                }
                self.validate_attributes(&effective, attrs, name_offset);
                match &effective.content {
                    EffectiveContent::Empty => Content::Empty,
                    EffectiveContent::Simple(inner) => Content::Simple(inner.clone()),
                    EffectiveContent::Elements(model) => Content::Elements {
                        matcher: ContentMatcher::new(model.clone()),
                        mixed: effective.mixed,
                    },
                }
            }
        };

        Mode::Typed(Box::new(Typed {
            decl: Some(decl),
            content,
            nil,
            text: String::new(),
        }))
    }

    fn validate_attributes(&mut self, effective: &EffectiveType, attrs: &[Attr], name_offset: usize) {
        for attr in attrs.iter().filter(|a| !a.is_always_allowed()) {
            let Some(attr_name) = &attr.name else {
                continue;
            };
            if let Some(attribute_use) = effective.attributes.iter().find(|u| u.decl.name == *attr_name) {
                self.check_attribute_value(attr_name, &attribute_use.decl.type_ref, attribute_use.decl.fixed.as_deref(), attr);
                continue;
            }

            let wildcard = effective
                .any_attribute
                .as_ref()
                .filter(|w| w.namespaces.admits(&attr_name.namespace));
            match wildcard.map(|w| w.process) {
                None => {
                    self.error(format!("The '{}' attribute is not declared.", attr_name), attr.offset);
                }
                Some(ProcessContents::Skip) => {}
                Some(process) => match self.set.attribute(attr_name) {
                    Some(global) => {
                        self.check_attribute_value(attr_name, &global.type_ref, global.fixed.as_deref(), attr);
                    }
                    None if process == ProcessContents::Strict && attr_name.namespace != XML_NS => {
                        self.error(format!("The '{}' attribute is not declared.", attr_name), attr.offset);
                    }
                    None => {}
                },
            }
        }

        for attribute_use in effective.attributes.iter().filter(|u| u.required) {
            let present = attrs
                .iter()
                .any(|a| a.name.as_ref() == Some(&attribute_use.decl.name));
            if !present {
                self.error(
                    format!("The required attribute '{}' is missing.", attribute_use.decl.name),
                    name_offset,
                );
            }
        }
    }

    fn check_attribute_value(
        &mut self,
        attr_name: &QualifiedName,
        type_ref: &Option<TypeRef>,
        fixed: Option<&str>,
        attr: &Attr,
    ) {
        let type_ref = type_ref
            .clone()
            .unwrap_or_else(|| TypeRef::Named(QualifiedName::xs("anySimpleType")));
        if let Err(detail) = validate_value(&self.set, &type_ref, &attr.value) {
            let message = format!(
                "The '{}' attribute is invalid - The value '{}' is invalid according to its datatype '{}' - {}",
                attr_name,
                attr.value,
                type_label(&self.set, &type_ref),
                detail
            );
            self.error(message, attr.offset);
            return;
        }
        if let Some(fixed) = fixed
            && normalize(fixed, WhiteSpace::Collapse) != normalize(&attr.value, WhiteSpace::Collapse)
        {
            self.error(
                format!("The value of the '{}' attribute does not equal its fixed value.", attr_name),
                attr.offset,
            );
        }
    }

    fn text_content(&mut self, value: &str, offset: usize) -> Result<(), Fault> {
        let blank = value.chars().all(char::is_whitespace);
        let Some(frame) = self.frames.last_mut() else {
            if blank {
                return Ok(());
            }
            return Err(Fault::new("Data at the root level is invalid.", offset));
        };

        let Mode::Typed(typed) = &mut frame.mode else {
            return Ok(());
        };
        let element = frame.name.to_string();
        if typed.nil {
            if !blank {
                self.error(
                    format!("Element '{}' must have no character or element children.", element),
                    offset,
                );
            }
            return Ok(());
        }

        let message = match &typed.content {
            Content::Simple(_) => {
                typed.text.push_str(value);
                None
            }
            Content::Elements { mixed: true, .. } => None,
            _ if blank => None,
            Content::Empty => Some(format!(
                "The element '{}' cannot contain text because the content model is empty.",
                element
            )),
            Content::Elements { matcher, .. } => Some(format!(
                "The element '{}' cannot contain text.{}",
                element,
                matcher.expected_suffix()
            )),
        };
        if let Some(message) = message {
            self.error(message, offset);
        }
        Ok(())
    }

    fn end_element(&mut self, raw: &str, name_offset: usize) -> Result<(), Fault> {
        let Some(frame) = self.frames.last() else {
            return Err(Fault::new("Unexpected end tag.", name_offset));
        };
        if frame.raw_name != raw {
            let (line, column) = self.position(frame.name_offset);
            return Err(Fault::new(
                format!(
                    "The '{}' start tag on line {} position {} does not match the end tag of '{}'.",
                    frame.raw_name, line, column, raw
                ),
                name_offset,
            ));
        }
        self.close_frame(name_offset);
        Ok(())
    }

    /// Pop the innermost frame and run its end-of-element checks.
    fn close_frame(&mut self, offset: usize) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        self.scopes.pop();
        if self.frames.is_empty() {
            self.root_closed = true;
        }

        let Mode::Typed(typed) = frame.mode else {
            return;
        };
        let element = frame.name.to_string();
        if typed.nil {
            return;
        }

        match &typed.content {
            Content::Elements { matcher, .. } if !matcher.is_complete() => {
                self.error(
                    format!(
                        "The element '{}' has incomplete content.{}",
                        element,
                        matcher.expected_suffix()
                    ),
                    offset,
                );
            }
            Content::Simple(type_ref) => {
                let decl = typed.decl.as_deref();
                let value = match decl.and_then(|d| d.default.as_deref()) {
                    Some(default) if typed.text.is_empty() => default.to_string(),
                    _ => typed.text.clone(),
                };
                if let Err(detail) = validate_value(&self.set, type_ref, &value) {
                    let message = format!(
                        "The '{}' element is invalid - The value '{}' is invalid according to its datatype '{}' - {}",
                        element,
                        value,
                        type_label(&self.set, type_ref),
                        detail
                    );
                    self.error(message, offset);
                } else if let Some(fixed) = decl.and_then(|d| d.fixed.as_deref())
                    && !typed.text.is_empty()
                    && normalize(fixed, WhiteSpace::Collapse) != normalize(&value, WhiteSpace::Collapse)
                {
                    self.error(
                        format!("The value of the '{}' element does not equal its fixed value.", element),
                        offset,
                    );
                }
            }
            _ => {}
        }
    }

    fn end_of_input(&mut self) -> Result<(), Fault> {
        if !self.frames.is_empty() {
            let open: Vec<String> = self.frames.iter().rev().map(|f| f.raw_name.clone()).collect();
            return Err(unclosed_fault(&open, self.text.len()));
        }
        if !self.root_closed {
            let (line, column) = self.position(0);
            self.report
                .push(ValidationIssue::error("Root element is missing.", line, column));
            self.compile_pending();
        }
        Ok(())
    }
}

fn unclosed_fault(open: &[String], offset: usize) -> Fault {
    Fault::new(
        format!(
            "Unexpected end of file has occurred. The following elements are not closed: {}.",
            open.join(", ")
        ),
        offset,
    )
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Byte offsets of each attribute name in the start tag beginning at `tag`.
fn attribute_offsets(text: &str, tag: usize) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut offsets = Vec::new();
    let mut i = tag + 1;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'>' || bytes[i] == b'/' {
            break;
        }
        offsets.push(i);
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
            let quote = bytes[i];
            i += 1;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            i += 1;
        }
    }
    offsets
}
