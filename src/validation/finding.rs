//! Validation findings

use std::fmt;

use serde::Serialize;

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

/// A single classified validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub is_error: bool,
    /// Context of the rule that produced the finding
    pub context: Option<String>,
    /// The failed test expression
    pub test: Option<String>,
    /// Path of the offending node
    pub location: Option<String>,
    pub text: String,
}

impl Finding {
    /// A structural violation: no positional metadata, always an error
    pub fn structural(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            context: None,
            test: None,
            location: None,
            text: text.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        if self.is_error {
            Severity::Error
        } else {
            Severity::Warning
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({} @ {})",
            self.text,
            self.test.as_deref().unwrap_or("-"),
            self.location.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_finding() {
        let finding = Finding::structural("cvc-elt.1: Cannot find the declaration");
        assert!(finding.is_error);
        assert_eq!(finding.severity(), Severity::Error);
        assert!(finding.location.is_none());
        assert!(finding.test.is_none());
        assert!(finding.context.is_none());
    }

    #[test]
    fn test_display() {
        let finding = Finding {
            is_error: false,
            context: Some("Element".to_string()),
            test: Some("@name".to_string()),
            location: Some("/Root[1]/Element[2]".to_string()),
            text: "Element needs a name".to_string(),
        };
        assert_eq!(finding.severity().to_string(), "WARNING");
        assert_eq!(
            finding.to_string(),
            "'Element needs a name' (@name @ /Root[1]/Element[2])"
        );
    }
}
