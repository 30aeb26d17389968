//! Structural grammars written in XML Schema
//!
//! Schema documents are read into [`model::Components`], finalized into a
//! self-contained [`model::Schema`] and then used to check instances. Only
//! the first violation of an instance is reported, formatted the way
//! Xerces-derived validators print them.

pub mod datatypes;
pub mod finalize;
pub mod loader;
pub mod model;
pub mod validate;

use std::sync::Arc;

use crate::engine::{
    CompiledGrammar, Conformance, EngineError, ProcessingEngine, ResourceResolver, StructureCheck, XmlDocument,
};

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespace bound to `prefix` at `node`, including the implicit `xml` one
pub fn namespace_for<'a>(node: roxmltree::Node<'a, '_>, prefix: Option<&str>) -> Option<&'a str> {
    match prefix {
        Some("xml") => Some(roxmltree::NS_XML_URI),
        _ => node.lookup_namespace_uri(prefix),
    }
}

/// Why a value or node failed a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The instance is invalid; carries the diagnostic
    Invalid(String),
    /// The schema cannot be applied
    Grammar(String),
}

impl From<Violation> for EngineError {
    fn from(violation: Violation) -> Self {
        match violation {
            Violation::Invalid(message) | Violation::Grammar(message) => EngineError::Grammar(message),
        }
    }
}

/// A finalized schema, shareable between threads
#[derive(Debug)]
pub struct NativeGrammar {
    schema: model::Schema,
}

impl NativeGrammar {
    pub fn schema(&self) -> &model::Schema {
        &self.schema
    }
}

impl CompiledGrammar for NativeGrammar {
    fn new_check(&self) -> Box<dyn StructureCheck + '_> {
        Box::new(SchemaCheck { grammar: self })
    }
}

struct SchemaCheck<'g> {
    grammar: &'g NativeGrammar,
}

impl StructureCheck for SchemaCheck<'_> {
    fn check(&mut self, document: &XmlDocument) -> Result<Conformance, EngineError> {
        let tree = document.tree()?;
        match validate::validate(&self.grammar.schema, &tree) {
            Ok(()) => Ok(Conformance::Valid),
            Err(Violation::Invalid(diagnostic)) => Ok(Conformance::Invalid(diagnostic)),
            Err(Violation::Grammar(message)) => Err(EngineError::Grammar(message)),
        }
    }
}

/// Read, resolve and finalize the schema rooted at `grammar`
pub fn compile(
    engine: &dyn ProcessingEngine,
    grammar: &XmlDocument,
    resolver: Option<&dyn ResourceResolver>,
) -> Result<Arc<dyn CompiledGrammar>, EngineError> {
    let components = loader::Loader::new(engine, resolver).load(grammar)?;
    log::debug!(
        "Loaded {} element declarations and {} type definitions",
        components.elements.len(),
        components.types.len()
    );
    let schema = finalize::finalize(components)?;
    Ok(Arc::new(NativeGrammar { schema }))
}
