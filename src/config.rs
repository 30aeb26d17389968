//! Configuration management for the CMD validator.
//!
//! Handles:
//! - Command-line argument parsing
//! - Optional TOML configuration file (grammar source and phase)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::validation::CMD_SCHEMA_URL;

/// Name of the project-local configuration file
pub const PROJECT_CONFIG_FILE: &str = ".cmd-validate.toml";

/// Command-line arguments for the CMD validator
#[derive(Debug, Parser)]
#[command(name = "cmd-validate")]
#[command(about = "Validate CMD component specifications against XML Schema and embedded Schematron rules")]
#[command(version)]
pub struct Args {
    /// Grammar to validate against
    #[arg(short, long, value_name = "URL", help = "URL of the XML Schema with embedded rules")]
    pub schema: Option<Url>,

    /// Rule phase to evaluate
    #[arg(long, help = "Schematron phase to evaluate (e.g. '#ALL')")]
    pub phase: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Explicit configuration file
    #[arg(long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(
        long,
        default_value = "warn",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    /// Documents to validate
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Contents of a configuration file
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub schema: Option<String>,
    pub phase: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the configuration file to use, if any
    ///
    /// An explicit path must exist; otherwise the project file and then the
    /// user file are tried.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<(PathBuf, Self)>> {
        if let Some(path) = explicit {
            return Ok(Some((path.to_path_buf(), Self::load(path)?)));
        }
        for candidate in Self::default_locations() {
            if candidate.is_file() {
                let file = Self::load(&candidate)?;
                return Ok(Some((candidate, file)));
            }
        }
        Ok(None)
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(PROJECT_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("cmd-validate").join("config.toml"));
        }
        locations
    }
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    /// Grammar source
    pub schema: Url,
    /// Rule phase, `None` for the grammar's default
    pub phase: Option<String>,
    pub format: OutputFormat,
    pub files: Vec<PathBuf>,
    /// Log level
    pub log_level: String,
    /// Configuration file that contributed settings
    pub config_file: Option<PathBuf>,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        let discovered = ConfigFile::discover(args.config.as_deref())?;
        let (config_file, file) = match discovered {
            Some((path, file)) => (Some(path), file),
            None => (None, ConfigFile::default()),
        };

        let schema = match (args.schema, file.schema) {
            (Some(url), _) => url,
            (None, Some(text)) => Url::parse(&text)
                .with_context(|| format!("Invalid schema URL in config file: {text}"))?,
            (None, None) => Url::parse(CMD_SCHEMA_URL).context("Invalid built-in schema URL")?,
        };

        Ok(Config {
            schema,
            phase: args.phase.or(file.phase),
            format: args.format,
            files: args.files,
            log_level: args.log_level,
            config_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "Cargo.toml";

    fn parse(arguments: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("cmd-validate").chain(arguments.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[DOCUMENT]);
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.log_level, "warn");
        assert!(args.schema.is_none());
        assert_eq!(args.files, vec![PathBuf::from(DOCUMENT)]);
    }

    #[test]
    fn test_usage_errors() {
        assert!(Args::try_parse_from(["cmd-validate"]).is_err());
        assert!(Args::try_parse_from(["cmd-validate", "-s", "not a url", DOCUMENT]).is_err());
        assert!(Args::try_parse_from(["cmd-validate", "--format", "yaml", DOCUMENT]).is_err());
    }

    #[test]
    fn test_files_are_checked_when_validated() {
        let args = parse(&["missing-profile.xml", DOCUMENT]);
        assert_eq!(
            args.files,
            vec![PathBuf::from("missing-profile.xml"), PathBuf::from(DOCUMENT)]
        );
    }

    #[test]
    fn test_command_line_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "schema = \"file:///schemas/cmd.xsd\"\nphase = \"strict\"\n").unwrap();
        let config_arg = path.to_str().unwrap();

        let from_file = Config::from_args(parse(&["--config", config_arg, DOCUMENT])).unwrap();
        assert_eq!(from_file.schema.as_str(), "file:///schemas/cmd.xsd");
        assert_eq!(from_file.phase.as_deref(), Some("strict"));
        assert_eq!(from_file.config_file.as_deref(), Some(path.as_path()));

        let overridden = Config::from_args(parse(&[
            "--config",
            config_arg,
            "--phase",
            "lenient",
            "-s",
            "https://example.org/other.xsd",
            DOCUMENT,
        ]))
        .unwrap();
        assert_eq!(overridden.schema.as_str(), "https://example.org/other.xsd");
        assert_eq!(overridden.phase.as_deref(), Some("lenient"));
    }

    #[test]
    fn test_bad_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = dir.path().join("unknown.toml");
        fs::write(&unknown, "colour = \"blue\"\n").unwrap();
        assert!(Config::from_args(parse(&["--config", unknown.to_str().unwrap(), DOCUMENT])).is_err());

        let missing = dir.path().join("missing.toml");
        assert!(Config::from_args(parse(&["--config", missing.to_str().unwrap(), DOCUMENT])).is_err());

        let bad_url = dir.path().join("bad.toml");
        fs::write(&bad_url, "schema = \"::\"\n").unwrap();
        assert!(Config::from_args(parse(&["--config", bad_url.to_str().unwrap(), DOCUMENT])).is_err());
    }
}
