//! Infrastructure errors of the validation core
//!
//! These abort a validation call. Structural or rule violations are never
//! reported through this type; they become [`crate::Finding`]s.

use thiserror::Error;

use crate::engine::EngineError;
use crate::validation::rules::Stage;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("cannot compile grammar {source_uri}")]
    Grammar {
        source_uri: String,
        #[source]
        source: EngineError,
    },

    #[error("rule compilation failed in the {stage} stage")]
    RuleCompilation {
        stage: Stage,
        #[source]
        source: EngineError,
    },

    #[error("cannot load document {document}")]
    Document {
        document: String,
        #[source]
        source: EngineError,
    },

    #[error("structural check could not run")]
    Structure(#[source] EngineError),

    #[error("rule evaluation failed")]
    Evaluation(#[source] EngineError),
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
