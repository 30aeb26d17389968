//! Processing Engine
//!
//! The seam between the validation core and whatever actually parses,
//! checks and transforms XML. The core only talks to these traits; the
//! crate ships a Rust-native implementation in [`crate::native`].
//!
//! Compiled artifacts ([`CompiledGrammar`], [`CompiledTransform`]) are
//! immutable and may be shared between threads. Running them always goes
//! through a fresh execution handle ([`StructureCheck`], [`TransformRun`])
//! that belongs to exactly one caller.

pub mod document;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use document::{DocumentSource, XmlDocument};

/// Failures raised by a processing engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("malformed XML in {document}: {message}")]
    Xml { document: String, message: String },

    #[error("cannot resolve reference '{href}': {message}")]
    Reference { href: String, message: String },

    #[error("invalid grammar: {0}")]
    Grammar(String),

    #[error("invalid path expression '{expression}': {message}")]
    Path { expression: String, message: String },

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Outcome of checking one document against a structural grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conformance {
    Valid,
    /// The engine's raw diagnostic for the first violation
    Invalid(String),
}

/// Pluggable policy for fetching grammar fragments referenced from a grammar
pub trait ResourceResolver: Send + Sync {
    /// Return `Some` to load `href` from somewhere else than its plain
    /// resolution against `base`.
    fn resolve(&self, href: &str, base: Option<&url::Url>) -> Option<DocumentSource>;
}

/// Per-use execution handle of a compiled grammar
pub trait StructureCheck {
    fn check(&mut self, document: &XmlDocument) -> Result<Conformance, EngineError>;
}

/// Immutable structural grammar
pub trait CompiledGrammar: Send + Sync {
    fn new_check(&self) -> Box<dyn StructureCheck + '_>;
}

/// Per-use execution handle of a compiled transform
pub trait TransformRun {
    fn set_parameter(&mut self, name: &str, value: &str);
    fn transform(&mut self, source: &XmlDocument) -> Result<XmlDocument, EngineError>;
}

/// Immutable executable transform
pub trait CompiledTransform: Send + Sync {
    fn load(&self) -> Box<dyn TransformRun + '_>;
}

/// Loads documents and compiles grammars and transforms
pub trait ProcessingEngine: Send + Sync {
    fn load_document(&self, source: &DocumentSource) -> Result<XmlDocument, EngineError>;

    fn compile_grammar(
        &self,
        grammar: &XmlDocument,
        resolver: Option<&dyn ResourceResolver>,
    ) -> Result<Arc<dyn CompiledGrammar>, EngineError>;

    fn compile_transform(
        &self,
        stylesheet: &XmlDocument,
    ) -> Result<Arc<dyn CompiledTransform>, EngineError>;
}
