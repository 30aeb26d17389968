//! Include stage: merge referenced rule fragments

use roxmltree::Node;

use super::{is_rule_element, require_schema, stage_output, start_element};
use crate::engine::{DocumentSource, EngineError, ProcessingEngine, XmlDocument};
use crate::native::writer::XmlWriter;

/// Nesting limit for included fragments
const MAX_DEPTH: usize = 16;

/// Replace every `sch:include` and `sch:extends[@href]` with the content it
/// refers to
pub fn include(engine: &dyn ProcessingEngine, source: &XmlDocument) -> Result<XmlDocument, EngineError> {
    let tree = source.tree()?;
    let root = require_schema(&tree)?;
    let mut writer = XmlWriter::new();
    let mut merger = Merger {
        engine,
        writer: &mut writer,
        included: 0,
    };
    merger.node(root, None, source, 0)?;
    if merger.included > 0 {
        log::debug!("Merged {} rule fragments", merger.included);
    }
    stage_output(writer.finish(), source)
}

fn is_reference(node: Node<'_, '_>) -> bool {
    is_rule_element(node, "include") || (is_rule_element(node, "extends") && node.attribute("href").is_some())
}

struct Merger<'e, 'w> {
    engine: &'e dyn ProcessingEngine,
    writer: &'w mut XmlWriter,
    included: usize,
}

impl Merger<'_, '_> {
    fn node(
        &mut self,
        node: Node<'_, '_>,
        scope: Option<Node<'_, '_>>,
        document: &XmlDocument,
        depth: usize,
    ) -> Result<(), EngineError> {
        if node.is_text() {
            self.writer.text(node.text().unwrap_or_default());
            return Ok(());
        }
        if !node.is_element() {
            return Ok(());
        }
        if is_reference(node) {
            return self.reference(node, document, depth);
        }
        start_element(self.writer, node, scope, &|_, value| value.to_string());
        for child in node.children() {
            self.node(child, Some(node), document, depth)?;
        }
        self.writer.end();
        Ok(())
    }

    fn reference(&mut self, node: Node<'_, '_>, document: &XmlDocument, depth: usize) -> Result<(), EngineError> {
        let href = node.attribute("href").ok_or_else(|| {
            EngineError::Transform(format!("{} without 'href'", node.tag_name().name()))
        })?;
        if depth >= MAX_DEPTH {
            return Err(EngineError::Transform(format!(
                "rule fragment '{href}' is nested too deeply"
            )));
        }

        let mut url = document.resolve(href)?;
        let fragment = url.fragment().map(str::to_string);
        url.set_fragment(None);
        log::debug!("Including rule fragment {}", url);
        let included = self.engine.load_document(&DocumentSource::Url(url))?;
        let tree = included.tree()?;

        let target = match fragment.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => tree
                .descendants()
                .find(|candidate| candidate.is_element() && candidate.attribute("id") == Some(id))
                .ok_or_else(|| EngineError::Reference {
                    href: href.to_string(),
                    message: format!("no element with id '{id}'"),
                })?,
            None => tree.root_element(),
        };

        self.included += 1;
        let splice = is_rule_element(target, "schema") || is_rule_element(node, "extends");
        if splice {
            for child in target.children() {
                self.node(child, None, &included, depth + 1)?;
            }
            Ok(())
        } else {
            self.node(target, None, &included, depth + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeEngine;
    use crate::native::schematron::{rule_children, rule_local};
    use roxmltree::Document;
    use std::fs;
    use url::Url;

    #[test]
    fn test_include_and_extends() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("patterns.sch"),
            r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern id="shared"><sch:rule context="A"><sch:assert test="@b">b</sch:assert></sch:rule></sch:pattern>
  <sch:rule id="checks"><sch:assert test="@c">c</sch:assert><sch:assert test="@d">d</sch:assert></sch:rule>
</sch:schema>"#,
        )
        .unwrap();

        let base = Url::from_file_path(dir.path().join("grammar.sch")).unwrap();
        let source = XmlDocument::parse(
            r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:include href="patterns.sch#shared"/>
  <sch:pattern><sch:rule context="B"><sch:extends href="patterns.sch#checks"/></sch:rule></sch:pattern>
</sch:schema>"#,
            Some(base),
        )
        .unwrap();

        let output = include(&NativeEngine::new(), &source).unwrap();
        let tree = Document::parse(output.text()).unwrap();
        let patterns: Vec<_> = rule_children(tree.root_element()).collect();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].attribute("id"), Some("shared"));

        let rule = rule_children(patterns[1]).next().unwrap();
        let checks: Vec<_> = rule_children(rule).filter_map(rule_local).collect();
        assert_eq!(checks, vec!["assert", "assert"]);
    }

    #[test]
    fn test_missing_fragment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.sch"), "<sch:schema xmlns:sch=\"http://purl.oclc.org/dsdl/schematron\"/>").unwrap();
        let base = Url::from_file_path(dir.path().join("grammar.sch")).unwrap();
        let source = XmlDocument::parse(
            r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron"><sch:include href="empty.sch#nope"/></sch:schema>"#,
            Some(base),
        )
        .unwrap();
        assert!(include(&NativeEngine::new(), &source).is_err());
    }
}
