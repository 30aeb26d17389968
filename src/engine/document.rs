//! Loaded XML documents
//!
//! An [`XmlDocument`] is immutable, cheap to clone and always well-formed:
//! the text is checked once when the document is built and re-parsed into a
//! borrowed `roxmltree` view whenever a component needs to walk it.

use std::path::PathBuf;
use std::sync::Arc;

use roxmltree::{Document, ParsingOptions};
use url::Url;

use super::EngineError;

/// Where a document comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// A local file
    Path(PathBuf),
    /// A `file:`, `http:` or `https:` URL
    Url(Url),
    /// Text that is already in memory, optionally with the URI used to
    /// resolve relative references inside it
    Text { text: String, base_uri: Option<Url> },
}

impl DocumentSource {
    pub fn text(text: impl Into<String>) -> Self {
        DocumentSource::Text {
            text: text.into(),
            base_uri: None,
        }
    }

    /// Human readable name used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.display().to_string(),
            DocumentSource::Url(url) => url.to_string(),
            DocumentSource::Text { base_uri, .. } => base_uri
                .as_ref()
                .map(|uri| uri.to_string())
                .unwrap_or_else(|| "<inline document>".to_string()),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        DocumentSource::Path(path)
    }
}

impl From<&std::path::Path> for DocumentSource {
    fn from(path: &std::path::Path) -> Self {
        DocumentSource::Path(path.to_path_buf())
    }
}

impl From<Url> for DocumentSource {
    fn from(url: Url) -> Self {
        DocumentSource::Url(url)
    }
}

/// A well-formed XML document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: Arc<str>,
    base_uri: Option<Url>,
}

impl XmlDocument {
    /// Check `text` for well-formedness and wrap it
    pub fn parse(text: impl Into<Arc<str>>, base_uri: Option<Url>) -> Result<Self, EngineError> {
        let document = Self {
            text: text.into(),
            base_uri,
        };
        document.tree()?;
        Ok(document)
    }

    /// Borrowed tree view of the document
    pub fn tree(&self) -> Result<Document<'_>, EngineError> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        Document::parse_with_options(&self.text, options).map_err(|source| EngineError::Xml {
            document: self
                .base_uri
                .as_ref()
                .map(|uri| uri.to_string())
                .unwrap_or_else(|| "<inline document>".to_string()),
            message: source.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// Same content, different base URI
    pub fn with_base_uri(&self, base_uri: Option<Url>) -> Self {
        Self {
            text: self.text.clone(),
            base_uri,
        }
    }

    /// Resolve a (possibly relative) reference against this document's base URI
    pub fn resolve(&self, href: &str) -> Result<Url, EngineError> {
        let parsed = match &self.base_uri {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        parsed.map_err(|source| EngineError::Reference {
            href: href.to_string(),
            message: source.to_string(),
        })
    }
}
