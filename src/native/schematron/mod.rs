//! Rule schemas embedded in grammars
//!
//! The four stage transforms of rule compilation and the evaluator they
//! produce. Every stage reads one document and writes the next; rule
//! elements in the older Schematron 1.5 namespace are renamed into the ISO
//! namespace on the way.

pub mod evaluator;
pub mod expand;
pub mod extract;
pub mod include;
pub mod phase;

use std::collections::HashMap;

use roxmltree::Node;

use crate::engine::{CompiledTransform, EngineError, TransformRun, XmlDocument};
use crate::native::NativeEngine;
use crate::native::writer::{XmlWriter, attribute_name};

pub const ISO_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";
pub const LEGACY_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Local name of a rule-language element in either namespace
pub fn rule_local<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    if !node.is_element() {
        return None;
    }
    let tag = node.tag_name();
    matches!(tag.namespace(), Some(ISO_NAMESPACE | LEGACY_NAMESPACE)).then(|| tag.name())
}

pub fn is_rule_element(node: Node<'_, '_>, local: &str) -> bool {
    rule_local(node) == Some(local)
}

/// An `xsl:key` declaration, the one foreign declaration rule schemas keep
pub fn is_key(node: Node<'_, '_>) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XSLT_NAMESPACE) && node.tag_name().name() == "key"
}

/// Rule-language children of `node`
pub fn rule_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| rule_local(*child).is_some())
}

/// Start an output element for `node`
///
/// Rule elements are written as `sch:*`; namespace declarations already in
/// scope at `scope` are left out, and attribute values go through
/// `map_value`.
pub fn start_element(
    writer: &mut XmlWriter,
    node: Node<'_, '_>,
    scope: Option<Node<'_, '_>>,
    map_value: &dyn Fn(&str, &str) -> String,
) {
    let Some(local) = rule_local(node) else {
        writer.start_copy(node, scope, map_value);
        return;
    };

    writer.start(&format!("sch:{local}"));
    if scope.is_none() {
        writer.attr("xmlns:sch", ISO_NAMESPACE);
    }
    for ns in node.namespaces() {
        let rule_binding = matches!(ns.uri(), ISO_NAMESPACE | LEGACY_NAMESPACE) || ns.name() == Some("sch");
        if rule_binding || ns.name() == Some("xml") {
            continue;
        }
        let inherited = scope.is_some_and(|scope| {
            scope
                .namespaces()
                .any(|other| other.name() == ns.name() && other.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        match ns.name() {
            Some(prefix) => writer.attr(&format!("xmlns:{prefix}"), ns.uri()),
            None => writer.attr("xmlns", ns.uri()),
        }
    }
    for attribute in node.attributes() {
        let value = map_value(attribute.name(), attribute.value());
        writer.attr(&attribute_name(node, &attribute), &value);
    }
}

/// Copy `node` and its subtree, renaming rule elements
pub fn copy_rules(writer: &mut XmlWriter, node: Node<'_, '_>, scope: Option<Node<'_, '_>>) {
    copy_mapped(writer, node, scope, &|_, value| value.to_string());
}

/// Copy `node` and its subtree with every attribute value passed through
/// `map_value`
pub fn copy_mapped(
    writer: &mut XmlWriter,
    node: Node<'_, '_>,
    scope: Option<Node<'_, '_>>,
    map_value: &dyn Fn(&str, &str) -> String,
) {
    if node.is_text() {
        writer.text(node.text().unwrap_or_default());
        return;
    }
    if !node.is_element() {
        return;
    }
    start_element(writer, node, scope, map_value);
    for child in node.children() {
        copy_mapped(writer, child, Some(node), map_value);
    }
    writer.end();
}

/// Parse stage output, keeping the base URI of the stage input
pub fn stage_output(output: String, source: &XmlDocument) -> Result<XmlDocument, EngineError> {
    XmlDocument::parse(output, source.base_uri().cloned())
}

fn require_schema<'a, 'input>(tree: &'a roxmltree::Document<'input>) -> Result<Node<'a, 'input>, EngineError> {
    let root = tree.root_element();
    if is_rule_element(root, "schema") {
        Ok(root)
    } else {
        Err(EngineError::Transform(format!(
            "expected a rule schema, found '{}'",
            root.tag_name().name()
        )))
    }
}

/// The stages of rule compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Extract,
    Include,
    Expand,
    Phase,
}

/// Native implementation of one rule compilation stage
#[derive(Debug, Clone)]
pub struct NativeStage {
    kind: StageKind,
    engine: NativeEngine,
}

impl NativeStage {
    pub fn new(kind: StageKind, engine: NativeEngine) -> Self {
        Self { kind, engine }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }
}

impl CompiledTransform for NativeStage {
    fn load(&self) -> Box<dyn TransformRun + '_> {
        Box::new(StageRun {
            stage: self,
            parameters: HashMap::new(),
        })
    }
}

struct StageRun<'s> {
    stage: &'s NativeStage,
    parameters: HashMap<String, String>,
}

impl TransformRun for StageRun<'_> {
    fn set_parameter(&mut self, name: &str, value: &str) {
        self.parameters.insert(name.to_string(), value.to_string());
    }

    fn transform(&mut self, source: &XmlDocument) -> Result<XmlDocument, EngineError> {
        match self.stage.kind {
            StageKind::Extract => extract::extract(source),
            StageKind::Include => include::include(&self.stage.engine, source),
            StageKind::Expand => expand::expand(source),
            StageKind::Phase => phase::select(
                source,
                self.parameters
                    .get(crate::validation::PHASE_PARAMETER)
                    .map(String::as_str),
            ),
        }
    }
}
