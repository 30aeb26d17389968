//! Validator and Validation Session
//!
//! A [`Validator`] owns the engine and the two compiled-artifact caches and
//! can be shared between threads. Each validation runs in a
//! [`ValidationSession`] borrowed from it; the session holds the findings
//! and the pending report of its last call and is never shared.

use std::sync::Arc;

use url::Url;

use crate::engine::{DocumentSource, ProcessingEngine, ResourceResolver, XmlDocument};
use crate::error::{Result, ValidatorError};
use crate::native::{self, NativeEngine};
use crate::validation::grammar::{GrammarCache, validate_structure};
use crate::validation::report::{self, AssertionReport};
use crate::validation::rules::{RuleCompiler, RulePipeline};
use crate::validation::Finding;

/// Default location of the CMD component grammar
pub const CMD_SCHEMA_URL: &str = "https://infra.clarin.eu/CMDI/1.x/xsd/cmd-component.xsd";

/// Shared, lazily compiled validation artifacts for one grammar
pub struct Validator {
    engine: Arc<dyn ProcessingEngine>,
    grammar: GrammarCache,
    rules: RuleCompiler,
}

impl Validator {
    /// Validator using the native engine and its rule pipeline
    pub fn new(grammar_source: Url) -> Self {
        let engine = NativeEngine::new();
        let pipeline = native::rule_pipeline(&engine);
        Self::with_engine(Arc::new(engine), grammar_source, pipeline)
    }

    pub fn with_engine(
        engine: Arc<dyn ProcessingEngine>,
        grammar_source: Url,
        pipeline: RulePipeline,
    ) -> Self {
        Self {
            engine,
            grammar: GrammarCache::new(grammar_source.clone()),
            rules: RuleCompiler::new(grammar_source, pipeline),
        }
    }

    /// Resolve grammar includes and imports through `resolver`
    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.grammar = self.grammar.with_resolver(resolver);
        self
    }

    pub fn grammar_source(&self) -> &Url {
        self.grammar.source()
    }

    pub fn phase(&self) -> Option<String> {
        self.rules.phase()
    }

    /// Select the rule phase for subsequent validations
    pub fn set_phase(&self, phase: Option<&str>) {
        self.rules.set_phase(phase);
    }

    /// Compile both artifacts ahead of the first validation
    pub fn prepare(&self) -> Result<()> {
        self.grammar.ensure_grammar(self.engine.as_ref())?;
        self.rules.ensure_rule_evaluator(self.engine.as_ref())?;
        Ok(())
    }

    /// Start a new session on this validator
    pub fn session(&self) -> ValidationSession<'_> {
        ValidationSession {
            validator: self,
            findings: Vec::new(),
            pending: None,
        }
    }
}

/// Working state of validations run by one caller
pub struct ValidationSession<'v> {
    validator: &'v Validator,
    findings: Vec<Finding>,
    pending: Option<AssertionReport>,
}

impl ValidationSession<'_> {
    /// Load and validate a document
    ///
    /// Returns whether the document is valid. Warnings do not make a
    /// document invalid; all messages are available through
    /// [`findings`](Self::findings).
    pub fn validate(&mut self, source: &DocumentSource) -> Result<bool> {
        self.reset();
        let document = self
            .validator
            .engine
            .load_document(source)
            .map_err(|source_error| ValidatorError::Document {
                document: source.describe(),
                source: source_error,
            })?;
        self.run(&document)
    }

    /// Validate a document that is already loaded
    pub fn validate_document(&mut self, document: &XmlDocument) -> Result<bool> {
        self.reset();
        self.run(document)
    }

    /// Messages of the last validation, in document order
    pub fn findings(&mut self) -> &[Finding] {
        if let Some(report) = self.pending.take() {
            self.findings.extend(report.interpret());
        }
        &self.findings
    }

    fn reset(&mut self) {
        self.findings.clear();
        self.pending = None;
    }

    fn run(&mut self, document: &XmlDocument) -> Result<bool> {
        let engine = self.validator.engine.as_ref();

        let grammar = self.validator.grammar.ensure_grammar(engine)?;
        if !validate_structure(grammar.as_ref(), document, &mut self.findings)? {
            return Ok(false);
        }

        let evaluator = self.validator.rules.ensure_rule_evaluator(engine)?;
        let report = report::evaluate(evaluator.as_ref(), document)?;
        let valid = !report.has_errors();
        log::debug!(
            "Rule evaluation finished: {} entries, valid: {}",
            report.entries().len(),
            valid
        );
        self.pending = Some(report);
        Ok(valid)
    }
}
