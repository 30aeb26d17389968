//! Schema components
//!
//! Components are loaded as written (with references to named types,
//! groups and attribute groups) and then finalized: derivations are merged,
//! model and attribute groups are inlined, and every reference is checked.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use super::XSD_NAMESPACE;

/// Namespace-qualified component or node name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.to_string(),
        }
    }

    pub fn xsd(local: &str) -> Self {
        Self::new(Some(XSD_NAMESPACE), local)
    }

    pub fn is_xsd(&self) -> bool {
        self.namespace.as_deref() == Some(XSD_NAMESPACE)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "\"{}\":{}", namespace, self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Extension,
    Restriction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// `##other`: any namespace except the given one and no namespace
    Not(Option<String>),
    List(Vec<Option<String>>),
}

#[derive(Debug, Clone)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

impl Wildcard {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.namespaces {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Not(excluded) => namespace.is_some() && namespace != excluded.as_deref(),
            NamespaceConstraint::List(allowed) => allowed.iter().any(|a| a.as_deref() == namespace),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub min: u32,
    /// `None` for unbounded
    pub max: Option<u32>,
    pub term: Term,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self {
            min: 1,
            max: Some(1),
            term,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementRef),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    /// Model group reference, inlined when the schema is finalized
    Group(QName),
    Any(Wildcard),
}

#[derive(Debug, Clone)]
pub enum ElementRef {
    Local(Box<ElementDecl>),
    Global(QName),
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    /// `None` for `xs:anyType`
    pub type_ref: Option<TypeRef>,
    pub nillable: bool,
    pub is_abstract: bool,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(QName),
    Complex(Box<ComplexType>),
    Simple(Box<SimpleType>),
}

#[derive(Debug, Clone)]
pub enum Content {
    Empty,
    Elements(Particle),
    Simple(SimpleTypeRef),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub mixed: bool,
    /// Base type and derivation method; cleared by finalization
    pub base: Option<(QName, Derivation)>,
    pub content: Content,
    pub attributes: Vec<AttributeUse>,
    /// Attribute group references; inlined by finalization
    pub attribute_groups: Vec<QName>,
    pub wildcard: Option<Wildcard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Use {
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub name: QName,
    /// `None` for `xs:anySimpleType`
    pub type_ref: Option<SimpleTypeRef>,
    pub usage: Use,
    pub fixed: Option<String>,
    /// Refers to a global attribute declaration
    pub global: bool,
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: QName,
    pub type_ref: Option<SimpleTypeRef>,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeGroup {
    pub attributes: Vec<AttributeUse>,
    pub groups: Vec<QName>,
    pub wildcard: Option<Wildcard>,
}

#[derive(Debug, Clone)]
pub enum SimpleTypeRef {
    Named(QName),
    Inline(Box<SimpleType>),
}

#[derive(Debug, Clone)]
pub enum SimpleType {
    Restriction { base: SimpleTypeRef, facets: Facets },
    List { item: SimpleTypeRef },
    Union { members: Vec<SimpleTypeRef> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    pub fn apply(self, value: &str) -> String {
        match self {
            WhiteSpace::Preserve => value.to_string(),
            WhiteSpace::Replace => value.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => value.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub regex: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    /// Alternatives from one derivation step
    pub patterns: Vec<Pattern>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<usize>,
    pub fraction_digits: Option<usize>,
    pub white_space: Option<WhiteSpace>,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Complex(ComplexType),
    Simple(SimpleType),
}

/// Components as loaded from the schema documents
#[derive(Debug, Default)]
pub struct Components {
    pub elements: HashMap<QName, ElementDecl>,
    pub attributes: HashMap<QName, AttributeDecl>,
    pub types: HashMap<QName, TypeDef>,
    pub groups: HashMap<QName, Particle>,
    pub attribute_groups: HashMap<QName, AttributeGroup>,
}

/// Finalized schema used for validation
#[derive(Debug, Default)]
pub struct Schema {
    pub elements: HashMap<QName, ElementDecl>,
    pub attributes: HashMap<QName, AttributeDecl>,
    pub types: HashMap<QName, TypeDef>,
}
