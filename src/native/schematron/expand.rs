//! Expand stage: instantiate abstract patterns and rules

use std::collections::HashMap;

use roxmltree::Node;

use super::{is_rule_element, require_schema, rule_children, stage_output, start_element};
use crate::engine::{EngineError, XmlDocument};
use crate::native::writer::XmlWriter;

/// Parameter values of one pattern instance, longest names first
type Parameters = Vec<(String, String)>;

fn substitute(value: &str, parameters: &Parameters) -> String {
    parameters
        .iter()
        .fold(value.to_string(), |value, (name, replacement)| {
            value.replace(&format!("${name}"), replacement)
        })
}

fn is_abstract(node: Node<'_, '_>) -> bool {
    node.attribute("abstract") == Some("true")
}

/// Replace pattern instances (`is-a`) and rule extensions with the
/// abstract definitions they name, dropping the definitions themselves
pub fn expand(source: &XmlDocument) -> Result<XmlDocument, EngineError> {
    let tree = source.tree()?;
    let root = require_schema(&tree)?;

    let mut expander = Expander::default();
    for node in root.descendants() {
        let Some(id) = node.attribute("id") else {
            continue;
        };
        if is_rule_element(node, "pattern") && is_abstract(node) {
            expander.patterns.insert(id, node);
        } else if is_rule_element(node, "rule") && is_abstract(node) {
            expander.rules.insert(id, node);
        }
    }

    let mut writer = XmlWriter::new();
    expander.node(&mut writer, root, None, &Parameters::new(), 0)?;
    stage_output(writer.finish(), source)
}

#[derive(Default)]
struct Expander<'a, 'input> {
    patterns: HashMap<&'a str, Node<'a, 'input>>,
    rules: HashMap<&'a str, Node<'a, 'input>>,
}

const MAX_DEPTH: usize = 16;

impl<'a, 'input> Expander<'a, 'input> {
    fn node(
        &self,
        writer: &mut XmlWriter,
        node: Node<'a, 'input>,
        scope: Option<Node<'a, 'input>>,
        parameters: &Parameters,
        depth: usize,
    ) -> Result<(), EngineError> {
        if node.is_text() {
            writer.text(node.text().unwrap_or_default());
            return Ok(());
        }
        if !node.is_element() {
            return Ok(());
        }
        if (is_rule_element(node, "pattern") || is_rule_element(node, "rule")) && is_abstract(node) {
            return Ok(());
        }
        if is_rule_element(node, "pattern") && node.attribute("is-a").is_some() {
            return self.instance(writer, node, scope, depth);
        }
        if is_rule_element(node, "extends") {
            return self.extension(writer, node, parameters, depth);
        }
        if is_rule_element(node, "param") && scope.is_some_and(|parent| is_rule_element(parent, "pattern")) {
            return Ok(());
        }

        start_element(writer, node, scope, &|_, value| substitute(value, parameters));
        for child in node.children() {
            self.node(writer, child, Some(node), parameters, depth)?;
        }
        writer.end();
        Ok(())
    }

    /// Write a concrete pattern for an `is-a` instance
    fn instance(
        &self,
        writer: &mut XmlWriter,
        node: Node<'a, 'input>,
        scope: Option<Node<'a, 'input>>,
        depth: usize,
    ) -> Result<(), EngineError> {
        let name = node.attribute("is-a").unwrap_or_default();
        let definition = self
            .patterns
            .get(name)
            .ok_or_else(|| EngineError::Transform(format!("abstract pattern '{name}' is not defined")))?;
        if depth >= MAX_DEPTH {
            return Err(EngineError::Transform(format!("abstract pattern '{name}' instantiates itself")));
        }

        let mut parameters: Parameters = rule_children(node)
            .filter(|child| is_rule_element(*child, "param"))
            .filter_map(|param| Some((param.attribute("name")?.to_string(), param.attribute("value")?.to_string())))
            .collect();
        parameters.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        start_element(writer, node, scope, &|_, value| value.to_string());
        for child in node.children().filter(|child| !is_rule_element(*child, "param")) {
            self.node(writer, child, Some(node), &parameters, depth + 1)?;
        }
        for child in definition.children().filter(|child| !is_rule_element(*child, "title")) {
            self.node(writer, child, Some(*definition), &parameters, depth + 1)?;
        }
        writer.end();
        Ok(())
    }

    /// Splice the content of an abstract rule into the extending rule
    fn extension(
        &self,
        writer: &mut XmlWriter,
        node: Node<'a, 'input>,
        parameters: &Parameters,
        depth: usize,
    ) -> Result<(), EngineError> {
        let name = node
            .attribute("rule")
            .ok_or_else(|| EngineError::Transform("extends without 'rule'".to_string()))?;
        let definition = self
            .rules
            .get(name)
            .ok_or_else(|| EngineError::Transform(format!("abstract rule '{name}' is not defined")))?;
        if depth >= MAX_DEPTH {
            return Err(EngineError::Transform(format!("abstract rule '{name}' extends itself")));
        }
        for child in definition.children() {
            self.node(writer, child, Some(*definition), parameters, depth + 1)?;
        }
        Ok(())
    }
}
