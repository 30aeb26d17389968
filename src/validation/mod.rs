//! Validation core
//!
//! Structural validation against the grammar, rule compilation and
//! evaluation, and interpretation of the resulting report into findings.
//! Everything here talks to XML through the [`crate::engine`] traits only.

pub mod finding;
pub mod grammar;
pub mod report;
pub mod rules;
pub mod session;

pub use finding::{Finding, Severity};
pub use grammar::{GrammarCache, validate_structure};
pub use report::{AssertionReport, FailedAssertion, ReportEntry};
pub use rules::{PHASE_PARAMETER, RuleCompiler, RulePipeline, Stage, StageTransform};
pub use session::{CMD_SCHEMA_URL, ValidationSession, Validator};
