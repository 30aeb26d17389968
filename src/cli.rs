//! Command-line driver
//!
//! Validates every file named in the configuration with one shared
//! [`Validator`] and prints one result block (or JSON line) per file. In
//! text mode, files that could not be validated are reported on the error
//! stream and processing continues with the next file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{Config, OutputFormat};
use crate::engine::DocumentSource;
use crate::validation::{Finding, ValidationSession, Validator};

/// Outcome of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Valid,
    Invalid,
    Failed,
}

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    file: String,
    status: Status,
    findings: &'a [Finding],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Validate all configured files, printing to stdout and stderr
///
/// Returns whether every file was valid.
pub fn run(config: &Config) -> Result<bool> {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    run_with_output(config, &mut stdout.lock(), &mut stderr.lock())
}

/// Validate all configured files, printing results to `out` and text-mode
/// failures to `err`
pub fn run_with_output(config: &Config, out: &mut dyn Write, err: &mut dyn Write) -> Result<bool> {
    log::info!("Validating against {}", config.schema);
    let validator = Validator::new(config.schema.clone());
    validator.set_phase(config.phase.as_deref());

    let mut session = validator.session();
    let mut all_valid = true;
    for file in &config.files {
        let status = validate_file(&mut session, file, config.format, out, err)?;
        all_valid &= status == Status::Valid;
    }
    out.flush().context("Failed to flush output")?;
    err.flush().context("Failed to flush error output")?;
    Ok(all_valid)
}

fn validate_file(
    session: &mut ValidationSession<'_>,
    file: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<Status> {
    let name = file.display().to_string();
    let (status, error) = match session.validate(&DocumentSource::Path(file.to_path_buf())) {
        Ok(true) => (Status::Valid, None),
        Ok(false) => (Status::Invalid, None),
        Err(e) => {
            let chain = format!("{:#}", anyhow::Error::new(e));
            log::error!("Validation of {} failed: {}", name, chain);
            (Status::Failed, Some(chain))
        }
    };
    let findings: &[Finding] = if status == Status::Failed { &[] } else { session.findings() };

    let written = match format {
        OutputFormat::Text => match error {
            Some(error) => writeln!(err, "CMD validate[{name}] failed: {error}").map_err(anyhow::Error::from),
            None => write_text(out, &name, status, findings),
        },
        OutputFormat::Json => {
            let report = FileReport {
                file: name,
                status,
                findings,
                error,
            };
            let line = serde_json::to_string(&report).context("Failed to serialize report")?;
            writeln!(out, "{line}").map_err(anyhow::Error::from)
        }
    };
    written.context("Failed to write output")?;
    Ok(status)
}

fn write_text(out: &mut dyn Write, name: &str, status: Status, findings: &[Finding]) -> Result<()> {
    match status {
        Status::Valid => writeln!(out, "CMD validate[{name}] valid")?,
        Status::Invalid => writeln!(out, "CMD validate[{name}] invalid")?,
        Status::Failed => writeln!(out, "CMD validate[{name}] failed")?,
    }
    for finding in findings {
        match &finding.location {
            Some(location) => writeln!(out, "{} at {}", finding.severity(), location)?,
            None => writeln!(out, "{}", finding.severity())?,
        }
        writeln!(out, "  {}", finding.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_output() {
        let findings = vec![
            Finding {
                is_error: true,
                context: Some("Component".to_string()),
                test: Some("@name".to_string()),
                location: Some("/Root[1]/Component[2]".to_string()),
                text: "Component needs a name".to_string(),
            },
            Finding::structural("cvc-elt.1.a: Cannot find the declaration of element 'Foo'."),
        ];
        let mut out = Vec::new();
        write_text(&mut out, "profile.xml", Status::Invalid, &findings).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "CMD validate[profile.xml] invalid\n\
             ERROR at /Root[1]/Component[2]\n  Component needs a name\n\
             ERROR\n  cvc-elt.1.a: Cannot find the declaration of element 'Foo'.\n"
        );
    }

    #[test]
    fn test_failures_go_to_the_error_stream() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.xml");
        let config = Config {
            schema: url::Url::from_file_path(dir.path().join("grammar.xsd")).unwrap(),
            phase: None,
            format: OutputFormat::Text,
            files: vec![missing.clone()],
            log_level: "warn".to_string(),
            config_file: None,
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        assert!(!run_with_output(&config, &mut out, &mut err).unwrap());
        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        assert!(
            err.starts_with(&format!("CMD validate[{}] failed: cannot load document", missing.display())),
            "{err}"
        );
    }

    #[test]
    fn test_json_report_shape() {
        let report = FileReport {
            file: "a.xml".to_string(),
            status: Status::Valid,
            findings: &[],
            error: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value, serde_json::json!({"file": "a.xml", "status": "valid", "findings": []}));
    }
}
