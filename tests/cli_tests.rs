//! Tests for the cmd-validate command line
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use cmd_validator::cli;
use cmd_validator::config::{Config, OutputFormat};
use url::Url;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn schema_url() -> Url {
    Url::from_file_path(fixtures().join("schema").join("component.xsd")).unwrap()
}

fn doc(name: &str) -> PathBuf {
    fixtures().join("docs").join(name)
}

fn config(files: &[&str], format: OutputFormat) -> Config {
    Config {
        schema: schema_url(),
        phase: None,
        format,
        files: files.iter().map(|name| doc(name)).collect(),
        log_level: "warn".to_string(),
        config_file: None,
    }
}

fn run(config: &Config) -> (bool, String) {
    let (all_valid, out, _) = run_with_errors(config);
    (all_valid, out)
}

fn run_with_errors(config: &Config) -> (bool, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let all_valid = cli::run_with_output(config, &mut out, &mut err).unwrap();
    (all_valid, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
}

#[test]
fn test_text_report() {
    let (all_valid, output) = run(&config(
        &["profile-valid.xml", "profile-duplicate-attribute.xml"],
        OutputFormat::Text,
    ));
    assert!(!all_valid);

    let valid = doc("profile-valid.xml");
    let invalid = doc("profile-duplicate-attribute.xml");
    let expected = format!(
        "CMD validate[{}] valid\n\
         CMD validate[{}] invalid\n\
         ERROR at /ComponentSpec[1]/Component[1]/Component[1]/AttributeList[1]/Attribute[2]\n  \
         Attribute 'version' is declared twice\n",
        valid.display(),
        invalid.display()
    );
    assert_eq!(output, expected);
}

#[test]
fn test_failures_do_not_stop_processing() {
    let (all_valid, output, errors) = run_with_errors(&config(
        &["profile-malformed.xml", "profile-missing.xml", "profile-valid.xml"],
        OutputFormat::Text,
    ));
    assert!(!all_valid);

    let failed: Vec<_> = errors.lines().collect();
    assert_eq!(failed.len(), 2, "{errors}");
    assert!(failed[0].contains("profile-malformed.xml] failed: cannot load document"), "{}", failed[0]);
    assert!(failed[1].contains("profile-missing.xml] failed: cannot load document"), "{}", failed[1]);

    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.len(), 1, "{output}");
    assert!(lines[0].ends_with("profile-valid.xml] valid"), "{}", lines[0]);
}

#[test]
fn test_json_reports_failures_inline() {
    let (all_valid, output, errors) = run_with_errors(&config(
        &["profile-missing.xml", "profile-valid.xml"],
        OutputFormat::Json,
    ));
    assert!(!all_valid);
    assert!(errors.is_empty(), "{errors}");

    let reports: Vec<serde_json::Value> = output.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(reports[0]["status"], "failed");
    assert!(reports[0]["error"].as_str().unwrap().contains("profile-missing.xml"));
    assert_eq!(reports[1]["status"], "valid");
}

#[test]
fn test_json_report() {
    let (all_valid, output) = run(&config(
        &["profile-undocumented.xml", "profile-structure.xml"],
        OutputFormat::Json,
    ));
    assert!(!all_valid);

    let reports: Vec<serde_json::Value> = output.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0]["status"], "valid");
    assert_eq!(reports[0]["findings"][0]["is_error"], false);
    assert_eq!(reports[0]["findings"][0]["location"], "/ComponentSpec[1]/Header[1]");
    assert!(reports[0].get("error").is_none());

    assert_eq!(reports[1]["status"], "invalid");
    assert_eq!(reports[1]["findings"].as_array().map(Vec::len), Some(1));
    assert!(reports[1]["findings"][0]["location"].is_null());
}

#[test]
fn test_phase_from_config() {
    let mut lenient = config(&["profile-conventions.xml"], OutputFormat::Text);
    lenient.phase = Some("lenient".to_string());
    assert!(run(&lenient).0);

    let mut strict = lenient.clone();
    strict.phase = Some("strict".to_string());
    let (all_valid, output) = run(&strict);
    assert!(!all_valid);
    assert!(output.contains("Name 'subtitle' should start with an upper case letter"), "{output}");
}

fn cmd_validate(args: &[&str]) -> Output {
    let home = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_cmd-validate"))
        .args(args)
        .current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .output()
        .unwrap()
}

#[test]
fn test_exit_codes() {
    let schema = schema_url().to_string();
    let valid = doc("profile-valid.xml");
    let invalid = doc("profile-cardinality.xml");

    let output = cmd_validate(&["-s", &schema, valid.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).ends_with("valid\n"));

    let output = cmd_validate(&["-s", &schema, valid.to_str().unwrap(), invalid.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("ERROR at ").count(), 5, "{stdout}");
}

#[test]
fn test_usage_errors() {
    let valid = doc("profile-valid.xml");

    let output = cmd_validate(&["-s", "not a url", valid.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());

    let output = cmd_validate(&["-s", &schema_url().to_string()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_file_does_not_stop_the_run() {
    let schema = schema_url().to_string();
    let valid = doc("profile-valid.xml");

    let output = cmd_validate(&["-s", &schema, "does-not-exist.xml", valid.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CMD validate[does-not-exist.xml] failed: cannot load document"), "{stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.ends_with("profile-valid.xml] valid\n"), "{stdout}");
}

#[test]
fn test_project_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".cmd-validate.toml"),
        format!("schema = \"{}\"\nphase = \"lenient\"\n", schema_url()),
    )
    .unwrap();
    let document = doc("profile-conventions.xml");

    let output = Command::new(env!("CARGO_BIN_EXE_cmd-validate"))
        .arg(document.to_str().unwrap())
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}
