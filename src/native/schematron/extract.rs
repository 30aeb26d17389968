//! Extract stage: collect the rule declarations of a grammar, together with
//! the `xsl:key` declarations the rules look values up in

use roxmltree::Node;

use super::{ISO_NAMESPACE, copy_rules, is_key, is_rule_element, rule_children, rule_local, stage_output};
use crate::engine::{EngineError, XmlDocument};
use crate::native::writer::XmlWriter;
use crate::native::xsd::XSD_NAMESPACE;

fn is_xsd(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XSD_NAMESPACE) && node.tag_name().name() == local
}

/// Rule and key declarations directly below `node`
fn declarations<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|child| rule_local(*child).is_some() || is_key(*child))
}

/// Name of the element declaration enclosing `node`
fn enclosing_element<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.ancestors()
        .filter(|ancestor| is_xsd(*ancestor, "element"))
        .find_map(|element| element.attribute("name").or_else(|| element.attribute("ref")))
}

/// Write a rule schema holding every rule declaration found in the
/// `xs:appinfo` blocks of `source`
pub fn extract(source: &XmlDocument) -> Result<XmlDocument, EngineError> {
    let tree = source.tree()?;
    let appinfos: Vec<Node<'_, '_>> = tree.descendants().filter(|node| is_xsd(*node, "appinfo")).collect();

    let mut writer = XmlWriter::new();
    writer.start("sch:schema");
    writer.attr("xmlns:sch", ISO_NAMESPACE);
    // Schema attributes come from the first embedded rule schema, if any
    if let Some(embedded) = appinfos
        .iter()
        .flat_map(|appinfo| rule_children(*appinfo))
        .find(|node| is_rule_element(*node, "schema"))
    {
        for attribute in embedded.attributes().filter(|a| a.namespace().is_none()) {
            writer.attr(attribute.name(), attribute.value());
        }
    }

    let mut count = 0;
    for appinfo in &appinfos {
        for declaration in declarations(*appinfo) {
            count += extract_declaration(&mut writer, declaration);
        }
    }
    log::debug!("Extracted {} rule declarations from {} annotations", count, appinfos.len());

    stage_output(writer.finish(), source)
}

/// Write one declaration found in an annotation, returning how many were
/// written
fn extract_declaration(writer: &mut XmlWriter, node: Node<'_, '_>) -> usize {
    if is_key(node) {
        copy_rules(writer, node, None);
        return 1;
    }
    match rule_local(node) {
        Some("schema") => declarations(node).map(|child| extract_declaration(writer, child)).sum(),
        Some("rule") => {
            writer.start("sch:pattern");
            copy_rules(writer, node, None);
            writer.end();
            1
        }
        Some("assert" | "report") => {
            let Some(context) = enclosing_element(node) else {
                log::warn!("Ignoring rule assertion outside of an element declaration");
                return 0;
            };
            writer.start("sch:pattern");
            writer.start("sch:rule");
            writer.attr("context", context);
            copy_rules(writer, node, None);
            writer.end();
            writer.end();
            1
        }
        Some(_) => {
            copy_rules(writer, node, None);
            1
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;
    use url::Url;

    const GRAMMAR: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <xs:annotation>
    <xs:appinfo>
      <sch:ns prefix="cmd" uri="urn:cmd"/>
      <sch:pattern id="first"><sch:rule context="A"><sch:assert test="@b">b</sch:assert></sch:rule></sch:pattern>
    </xs:appinfo>
  </xs:annotation>
  <xs:element name="Component">
    <xs:annotation>
      <xs:appinfo>
        <sch:assert test="@name">Component needs a name</sch:assert>
        <sch:rule context="Element"><sch:report test="@deprecated">Deprecated</sch:report></sch:rule>
      </xs:appinfo>
    </xs:annotation>
  </xs:element>
</xs:schema>"#;

    #[test]
    fn test_extract_collects_declarations() {
        let base = Url::parse("https://example.org/grammar.xsd").unwrap();
        let source = XmlDocument::parse(GRAMMAR, Some(base.clone())).unwrap();
        let output = extract(&source).unwrap();
        assert_eq!(output.base_uri(), Some(&base));

        let tree = Document::parse(output.text()).unwrap();
        let root = tree.root_element();
        assert!(is_rule_element(root, "schema"));
        let names: Vec<_> = rule_children(root).filter_map(rule_local).collect();
        assert_eq!(names, vec!["ns", "pattern", "pattern", "pattern"]);

        let wrapped_assert = rule_children(root).nth(2).unwrap();
        let rule = rule_children(wrapped_assert).next().unwrap();
        assert_eq!(rule.attribute("context"), Some("Component"));
        assert!(is_rule_element(rule_children(rule).next().unwrap(), "assert"));

        let wrapped_rule = rule_children(root).nth(3).unwrap();
        assert!(is_rule_element(rule_children(wrapped_rule).next().unwrap(), "rule"));
    }

    #[test]
    fn test_keys_are_kept() {
        let grammar = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:sch="http://purl.oclc.org/dsdl/schematron"
           xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xs:annotation>
    <xs:appinfo>
      <xsl:key name="enums" match="item" use="."/>
      <sch:schema><xsl:key name="codes" match="item" use="@code"/></sch:schema>
      <xs:documentation>ignored</xs:documentation>
    </xs:appinfo>
  </xs:annotation>
</xs:schema>"#;
        let output = extract(&XmlDocument::parse(grammar, None).unwrap()).unwrap();
        let tree = Document::parse(output.text()).unwrap();
        let keys: Vec<_> = tree
            .root_element()
            .children()
            .filter(|child| is_key(*child))
            .filter_map(|key| key.attribute("name"))
            .collect();
        assert_eq!(keys, vec!["enums", "codes"]);
        assert_eq!(tree.root_element().children().filter(|child| child.is_element()).count(), 2);
    }

    #[test]
    fn test_grammar_without_rules() {
        let source = XmlDocument::parse(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#, None).unwrap();
        let output = extract(&source).unwrap();
        let tree = Document::parse(output.text()).unwrap();
        assert_eq!(rule_children(tree.root_element()).count(), 0);
    }
}
