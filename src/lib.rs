//! CMD metadata validator
//!
//! Validates CMD component specifications in two layers:
//!
//! - structural conformance to an XML Schema grammar
//! - business rules (Schematron) embedded in the grammar's annotations
//!
//! Both layers are compiled lazily, once per [`Validator`], and evaluated
//! per document in a [`ValidationSession`] that turns the results into
//! [`Finding`]s.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod native;
pub mod validation;

// Re-exports for clean public API
pub use config::Config;
pub use engine::{DocumentSource, EngineError, ProcessingEngine, XmlDocument};
pub use error::ValidatorError;
pub use native::NativeEngine;
pub use validation::{Finding, Severity, ValidationSession, Validator};
