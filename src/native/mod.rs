//! Rust-native processing engine
//!
//! Loads documents from disk, `file:` and `http(s):` URLs, compiles XML
//! Schema grammars and rule schemas, and provides the four rule compilation
//! stages as already compiled transforms.

pub mod path;
pub mod schematron;
pub mod writer;
pub mod xsd;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::engine::{
    CompiledGrammar, CompiledTransform, DocumentSource, EngineError, ProcessingEngine, ResourceResolver, XmlDocument,
};
use crate::validation::{RulePipeline, StageTransform};
use schematron::{NativeStage, StageKind, evaluator::RuleSet};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine that does all XML processing in-process
#[derive(Debug, Clone)]
pub struct NativeEngine {
    timeout: Duration,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Timeout for fetching remote documents
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn read_file(&self, path: &Path) -> Result<XmlDocument, EngineError> {
        let text = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let absolute = std::path::absolute(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        XmlDocument::parse(text, Url::from_file_path(&absolute).ok())
    }

    fn fetch(&self, url: &Url) -> Result<XmlDocument, EngineError> {
        let fetch_error = |message: String| EngineError::Fetch {
            url: url.to_string(),
            message,
        };
        log::debug!("Fetching {}", url);
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fetch_error(e.to_string()))?;
        let text = client
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| fetch_error(e.to_string()))?;
        XmlDocument::parse(text, Some(url.clone()))
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingEngine for NativeEngine {
    fn load_document(&self, source: &DocumentSource) -> Result<XmlDocument, EngineError> {
        match source {
            DocumentSource::Path(path) => self.read_file(path),
            DocumentSource::Url(url) => match url.scheme() {
                "file" => {
                    let path = url.to_file_path().map_err(|()| EngineError::Reference {
                        href: url.to_string(),
                        message: "not a local file path".to_string(),
                    })?;
                    let text = fs::read_to_string(&path).map_err(|source| EngineError::Io { path, source })?;
                    XmlDocument::parse(text, Some(url.clone()))
                }
                "http" | "https" => self.fetch(url),
                other => Err(EngineError::UnsupportedScheme(other.to_string())),
            },
            DocumentSource::Text { text, base_uri } => XmlDocument::parse(text.as_str(), base_uri.clone()),
        }
    }

    fn compile_grammar(
        &self,
        grammar: &XmlDocument,
        resolver: Option<&dyn ResourceResolver>,
    ) -> Result<Arc<dyn CompiledGrammar>, EngineError> {
        xsd::compile(self, grammar, resolver)
    }

    fn compile_transform(&self, stylesheet: &XmlDocument) -> Result<Arc<dyn CompiledTransform>, EngineError> {
        let tree = stylesheet.tree()?;
        let root = tree.root_element();
        if schematron::is_rule_element(root, "schema") {
            let rules = RuleSet::compile(stylesheet)?;
            log::debug!("Rule evaluator has {} active patterns", rules.pattern_count());
            Ok(Arc::new(rules))
        } else {
            Err(EngineError::Unsupported(format!(
                "cannot compile '{}' documents into transforms",
                root.tag_name().name()
            )))
        }
    }
}

/// The four rule compilation stages implemented by `engine`
pub fn rule_pipeline(engine: &NativeEngine) -> RulePipeline {
    let stage = |kind| StageTransform::Compiled(Arc::new(NativeStage::new(kind, engine.clone())));
    RulePipeline::new(
        stage(StageKind::Extract),
        stage(StageKind::Include),
        stage(StageKind::Expand),
        stage(StageKind::Phase),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_path_sets_base_uri() {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        file.write_all(b"<root/>").unwrap();
        let document = NativeEngine::new()
            .load_document(&DocumentSource::Path(file.path().to_path_buf()))
            .unwrap();
        let base = document.base_uri().unwrap();
        assert_eq!(base.scheme(), "file");
        assert!(base.path().ends_with(".xml"));
    }

    #[test]
    fn test_load_errors() {
        let engine = NativeEngine::new();
        let missing = engine.load_document(&DocumentSource::Path("/nonexistent/doc.xml".into()));
        assert!(matches!(missing, Err(EngineError::Io { .. })));

        let ftp = engine.load_document(&DocumentSource::Url(Url::parse("ftp://example.org/a.xsd").unwrap()));
        assert!(matches!(ftp, Err(EngineError::UnsupportedScheme(scheme)) if scheme == "ftp"));

        let malformed = engine.load_document(&DocumentSource::text("<a>"));
        assert!(matches!(malformed, Err(EngineError::Xml { .. })));
    }

    #[test]
    fn test_only_rule_schemas_compile_into_transforms() {
        let engine = NativeEngine::new();
        let stylesheet = XmlDocument::parse(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="2.0"/>"#,
            None,
        )
        .unwrap();
        assert!(matches!(engine.compile_transform(&stylesheet), Err(EngineError::Unsupported(_))));
    }
}
