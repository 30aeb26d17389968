//! Grammar Cache and Structural Validator

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use url::Url;

use crate::engine::{
    CompiledGrammar, Conformance, DocumentSource, ProcessingEngine, ResourceResolver, XmlDocument,
};
use crate::error::{Result, ValidatorError};
use crate::validation::Finding;

/// Lazily compiled structural grammar of one validator
pub struct GrammarCache {
    source: Url,
    resolver: Option<Arc<dyn ResourceResolver>>,
    compiled: RwLock<Option<Arc<dyn CompiledGrammar>>>,
    init: Mutex<()>,
}

impl GrammarCache {
    pub fn new(source: Url) -> Self {
        Self {
            source,
            resolver: None,
            compiled: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// Use `resolver` for includes and imports found while compiling
    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn is_compiled(&self) -> bool {
        self.cached().is_some()
    }

    /// Return the grammar, compiling it on first use
    pub fn ensure_grammar(&self, engine: &dyn ProcessingEngine) -> Result<Arc<dyn CompiledGrammar>> {
        if let Some(grammar) = self.cached() {
            return Ok(grammar);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(grammar) = self.cached() {
            return Ok(grammar);
        }

        log::info!("Compiling grammar {}", self.source);
        let grammar_error = |source| ValidatorError::Grammar {
            source_uri: self.source.to_string(),
            source,
        };
        let document = engine
            .load_document(&DocumentSource::Url(self.source.clone()))
            .map_err(grammar_error)?;
        let grammar = engine
            .compile_grammar(&document, self.resolver.as_deref())
            .map_err(grammar_error)?;

        *self.compiled.write().unwrap_or_else(PoisonError::into_inner) = Some(grammar.clone());
        Ok(grammar)
    }

    fn cached(&self) -> Option<Arc<dyn CompiledGrammar>> {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Check `document` against `grammar`, recording at most one finding
pub fn validate_structure(
    grammar: &dyn CompiledGrammar,
    document: &XmlDocument,
    findings: &mut Vec<Finding>,
) -> Result<bool> {
    let mut check = grammar.new_check();
    match check.check(document).map_err(ValidatorError::Structure)? {
        Conformance::Valid => Ok(true),
        Conformance::Invalid(diagnostic) => {
            log::debug!("Structural check failed: {}", diagnostic);
            findings.push(Finding::structural(diagnostic));
            Ok(false)
        }
    }
}
