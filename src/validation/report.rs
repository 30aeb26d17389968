//! Rule Evaluator and Report Interpreter
//!
//! The evaluator output is an SVRL document. Only two of its node kinds
//! matter here: `fired-rule` markers and the `failed-assert` entries that
//! follow them. Each failed assertion belongs to the nearest marker before
//! it in document order.

use crate::engine::{CompiledTransform, EngineError, XmlDocument};
use crate::error::{Result, ValidatorError};
use crate::validation::Finding;

pub const SVRL_NAMESPACE: &str = "http://purl.oclc.org/dsdl/svrl";

/// Role that downgrades the failed assertions of a rule to warnings
pub const WARNING_ROLE: &str = "warning";

/// One relevant report node, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEntry {
    RuleFired {
        context: String,
        role: Option<String>,
    },
    AssertionFailed(FailedAssertion),
}

/// A `failed-assert` node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAssertion {
    pub test: Option<String>,
    pub location: Option<String>,
    pub text: String,
}

/// Flattened assertion report of one evaluator run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionReport {
    entries: Vec<ReportEntry>,
}

impl AssertionReport {
    pub fn new(entries: Vec<ReportEntry>) -> Self {
        Self { entries }
    }

    /// Read the fired-rule and failed-assert nodes of an SVRL document
    pub fn from_svrl(document: &XmlDocument) -> std::result::Result<Self, EngineError> {
        let tree = document.tree()?;
        let entries = tree
            .descendants()
            .filter(|node| node.is_element() && node.tag_name().namespace() == Some(SVRL_NAMESPACE))
            .filter_map(|node| match node.tag_name().name() {
                "fired-rule" => Some(ReportEntry::RuleFired {
                    context: node.attribute("context").unwrap_or_default().to_string(),
                    role: node.attribute("role").map(str::to_string),
                }),
                "failed-assert" => Some(ReportEntry::AssertionFailed(FailedAssertion {
                    test: node.attribute("test").map(str::to_string),
                    location: node.attribute("location").map(str::to_string),
                    text: string_value(node),
                })),
                _ => None,
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Whether any failed assertion classifies as an error
    pub fn has_errors(&self) -> bool {
        self.classified().any(|(is_error, _, _)| is_error)
    }

    /// Convert every failed assertion into a finding, in report order
    pub fn interpret(&self) -> Vec<Finding> {
        self.classified()
            .map(|(is_error, context, assertion)| Finding {
                is_error,
                context: context.map(str::to_string),
                test: assertion.test.clone(),
                location: assertion.location.clone(),
                text: assertion.text.clone(),
            })
            .collect()
    }

    /// Failed assertions paired with their classification and active context
    fn classified(&self) -> impl Iterator<Item = (bool, Option<&str>, &FailedAssertion)> {
        let mut active: Option<(&str, Option<&str>)> = None;
        self.entries.iter().filter_map(move |entry| match entry {
            ReportEntry::RuleFired { context, role } => {
                active = Some((context.as_str(), role.as_deref()));
                None
            }
            ReportEntry::AssertionFailed(assertion) => {
                let is_error = !matches!(active, Some((_, Some(WARNING_ROLE))));
                Some((is_error, active.map(|(context, _)| context), assertion))
            }
        })
    }
}

/// Run `document` through the rule evaluator
pub fn evaluate(evaluator: &dyn CompiledTransform, document: &XmlDocument) -> Result<AssertionReport> {
    let mut run = evaluator.load();
    let output = run.transform(document).map_err(ValidatorError::Evaluation)?;
    AssertionReport::from_svrl(&output).map_err(ValidatorError::Evaluation)
}

/// Concatenated text of an element, with runs of whitespace collapsed
fn string_value(node: roxmltree::Node<'_, '_>) -> String {
    let raw: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fired(context: &str, role: Option<&str>) -> ReportEntry {
        ReportEntry::RuleFired {
            context: context.to_string(),
            role: role.map(str::to_string),
        }
    }

    fn failed(location: &str) -> ReportEntry {
        ReportEntry::AssertionFailed(FailedAssertion {
            test: Some("false()".to_string()),
            location: Some(location.to_string()),
            text: format!("failed at {location}"),
        })
    }

    #[test]
    fn test_assertions_take_nearest_preceding_marker() {
        let report = AssertionReport::new(vec![
            fired("Element", None),
            failed("/A[1]"),
            fired("Component", Some("warning")),
            failed("/A[1]/B[1]"),
            failed("/A[1]/B[2]"),
            fired("Header", Some("error")),
            failed("/A[1]/C[1]"),
        ]);

        let findings = report.interpret();
        assert_eq!(findings.len(), 4);
        assert!(findings[0].is_error);
        assert_eq!(findings[0].context.as_deref(), Some("Element"));
        assert!(!findings[1].is_error);
        assert!(!findings[2].is_error);
        assert_eq!(findings[2].context.as_deref(), Some("Component"));
        assert!(findings[3].is_error);
        assert_eq!(findings[3].location.as_deref(), Some("/A[1]/C[1]"));
        assert!(report.has_errors());
    }

    #[test]
    fn test_warnings_only_is_not_an_error() {
        let report = AssertionReport::new(vec![
            fired("Element", Some("warning")),
            failed("/A[1]"),
            fired("Element", None),
        ]);
        assert!(!report.has_errors());
        assert_eq!(report.interpret().len(), 1);
    }

    #[test]
    fn test_assertion_without_marker_is_an_error() {
        let report = AssertionReport::new(vec![failed("/A[1]")]);
        assert!(report.has_errors());
        let findings = report.interpret();
        assert!(findings[0].is_error);
        assert!(findings[0].context.is_none());
    }

    #[test]
    fn test_from_svrl() {
        let svrl = r#"<svrl:schematron-output xmlns:svrl="http://purl.oclc.org/dsdl/svrl">
  <svrl:active-pattern id="names"/>
  <svrl:fired-rule context="Element" role="warning"/>
  <svrl:failed-assert test="@name" location="/Spec[1]/Element[2]">
    <svrl:text>
      Element has
      no name
    </svrl:text>
  </svrl:failed-assert>
  <svrl:successful-report test="true()" location="/Spec[1]">
    <svrl:text>ignored</svrl:text>
  </svrl:successful-report>
</svrl:schematron-output>"#;
        let document = XmlDocument::parse(svrl, None).unwrap();
        let report = AssertionReport::from_svrl(&document).unwrap();

        assert_eq!(
            report.entries(),
            &[
                fired("Element", Some("warning")),
                ReportEntry::AssertionFailed(FailedAssertion {
                    test: Some("@name".to_string()),
                    location: Some("/Spec[1]/Element[2]".to_string()),
                    text: "Element has no name".to_string(),
                }),
            ]
        );
        assert!(!report.has_errors());
    }
}
