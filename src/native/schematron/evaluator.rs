//! Rule evaluator
//!
//! A compiled rule schema. Running it over a document writes an SVRL report:
//! one `active-pattern` per pattern, then for every node a rule fires on a
//! `fired-rule` followed by the failed assertions and successful reports of
//! that rule. Rule contexts may select elements or attributes; `xsl:key`
//! declarations of the schema are available to every expression through
//! `key()`.

use std::collections::{HashMap, HashSet};

use roxmltree::Node;

use super::{ISO_NAMESPACE, is_key, is_rule_element, require_schema, rule_children, rule_local};
use crate::engine::{CompiledTransform, EngineError, TransformRun, XmlDocument};
use crate::native::path::{self, Expression, Item, KeyDefinition, KeyTable, Keys, Namespaces, Variables};
use crate::native::writer::{XmlWriter, attribute_name, qualified_name};
use crate::validation::report::SVRL_NAMESPACE;

#[derive(Debug)]
enum Value {
    Expression(Expression),
    Literal(String),
}

#[derive(Debug)]
struct Let {
    name: String,
    value: Value,
}

#[derive(Debug)]
enum Part {
    Text(String),
    ValueOf(Expression),
    /// `sch:name`, of the context node without a path
    Name(Option<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckKind {
    Assert,
    Report,
}

#[derive(Debug)]
struct Check {
    kind: CheckKind,
    test: Expression,
    id: Option<String>,
    role: Option<String>,
    message: Vec<Part>,
}

#[derive(Debug)]
struct Rule {
    context: Expression,
    id: Option<String>,
    role: Option<String>,
    lets: Vec<Let>,
    checks: Vec<Check>,
}

#[derive(Debug)]
struct Pattern {
    id: Option<String>,
    name: Option<String>,
    lets: Vec<Let>,
    rules: Vec<Rule>,
}

/// Compiled rule schema
#[derive(Debug)]
pub struct RuleSet {
    title: Option<String>,
    keys: Keys,
    lets: Vec<Let>,
    patterns: Vec<Pattern>,
}

fn attribute(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn title(node: Node<'_, '_>) -> Option<String> {
    rule_children(node)
        .find(|child| is_rule_element(*child, "title"))
        .map(|title| path::eval::normalize_space(&title.descendants().filter_map(|n| n.text()).collect::<String>()))
}

/// Prefix bindings of the schema plus those in scope at `node`
fn namespaces_at(schema: &Namespaces, node: Node<'_, '_>) -> Namespaces {
    let mut namespaces = Namespaces::new();
    for ns in node.namespaces() {
        if let Some(prefix) = ns.name() {
            namespaces.bind(prefix, ns.uri());
        }
    }
    for (prefix, uri) in schema.bindings() {
        namespaces.bind(prefix, uri);
    }
    namespaces
}

impl RuleSet {
    pub fn compile(document: &XmlDocument) -> Result<Self, EngineError> {
        let tree = document.tree()?;
        let root = require_schema(&tree)?;

        let mut schema_namespaces = Namespaces::new();
        for ns in rule_children(root).filter(|child| is_rule_element(*child, "ns")) {
            match (ns.attribute("prefix"), ns.attribute("uri")) {
                (Some(prefix), Some(uri)) => schema_namespaces.bind(prefix, uri),
                _ => return Err(EngineError::Transform("ns declaration needs 'prefix' and 'uri'".to_string())),
            }
        }

        let namespaces = namespaces_at(&schema_namespaces, root);
        let keys = compile_keys(root, &schema_namespaces)?;
        let lets = compile_lets(root, &namespaces)?;
        let mut patterns = Vec::new();
        for pattern in rule_children(root).filter(|child| is_rule_element(*child, "pattern")) {
            patterns.push(compile_pattern(pattern, &schema_namespaces)?);
        }

        log::debug!(
            "Compiled {} patterns with {} rules",
            patterns.len(),
            patterns.iter().map(|p| p.rules.len()).sum::<usize>()
        );
        Ok(Self {
            title: title(root),
            keys,
            lets,
            patterns,
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

fn compile_keys(root: Node<'_, '_>, schema_namespaces: &Namespaces) -> Result<Keys, EngineError> {
    let mut keys = Keys::new();
    for key in root.children().filter(|child| is_key(*child)) {
        let namespaces = namespaces_at(schema_namespaces, key);
        let (Some(name), Some(pattern), Some(value)) = (key.attribute("name"), key.attribute("match"), key.attribute("use"))
        else {
            return Err(EngineError::Transform(
                "key declaration needs 'name', 'match' and 'use'".to_string(),
            ));
        };
        keys.entry(name.to_string()).or_default().push(KeyDefinition {
            pattern: path::compile_pattern(pattern, &namespaces)?,
            value: path::compile(value, &namespaces)?,
        });
    }
    Ok(keys)
}

fn compile_lets(node: Node<'_, '_>, namespaces: &Namespaces) -> Result<Vec<Let>, EngineError> {
    rule_children(node)
        .filter(|child| is_rule_element(*child, "let"))
        .map(|variable| {
            let name = variable
                .attribute("name")
                .ok_or_else(|| EngineError::Transform("let without 'name'".to_string()))?;
            let value = match variable.attribute("value") {
                Some(value) => Value::Expression(path::compile(value, namespaces)?),
                None => Value::Literal(variable.descendants().filter_map(|n| n.text()).collect()),
            };
            Ok(Let {
                name: name.to_string(),
                value,
            })
        })
        .collect()
}

fn compile_pattern(node: Node<'_, '_>, schema_namespaces: &Namespaces) -> Result<Pattern, EngineError> {
    let namespaces = namespaces_at(schema_namespaces, node);
    let mut rules = Vec::new();
    for rule in rule_children(node).filter(|child| is_rule_element(*child, "rule")) {
        if rule.attribute("abstract") == Some("true") {
            continue;
        }
        rules.push(compile_rule(rule, schema_namespaces)?);
    }
    Ok(Pattern {
        id: attribute(node, "id"),
        name: title(node),
        lets: compile_lets(node, &namespaces)?,
        rules,
    })
}

fn compile_rule(node: Node<'_, '_>, schema_namespaces: &Namespaces) -> Result<Rule, EngineError> {
    let namespaces = namespaces_at(schema_namespaces, node);
    let context = node
        .attribute("context")
        .ok_or_else(|| EngineError::Transform("rule without 'context'".to_string()))?;

    let mut checks = Vec::new();
    for check in rule_children(node) {
        let kind = match rule_local(check) {
            Some("assert") => CheckKind::Assert,
            Some("report") => CheckKind::Report,
            _ => continue,
        };
        let test = check
            .attribute("test")
            .ok_or_else(|| EngineError::Transform("assertion without 'test'".to_string()))?;
        let check_namespaces = namespaces_at(schema_namespaces, check);
        checks.push(Check {
            kind,
            test: path::compile(test, &check_namespaces)?,
            id: attribute(check, "id"),
            role: attribute(check, "role"),
            message: compile_message(check, &check_namespaces)?,
        });
    }

    Ok(Rule {
        context: path::compile_pattern(context, &namespaces)?,
        id: attribute(node, "id"),
        role: attribute(node, "role"),
        lets: compile_lets(node, &namespaces)?,
        checks,
    })
}

fn compile_message(node: Node<'_, '_>, namespaces: &Namespaces) -> Result<Vec<Part>, EngineError> {
    let mut parts = Vec::new();
    for child in node.children() {
        if let Some(text) = child.is_text().then(|| child.text()).flatten() {
            parts.push(Part::Text(text.to_string()));
            continue;
        }
        match rule_local(child) {
            Some("value-of") => {
                let select = child
                    .attribute("select")
                    .ok_or_else(|| EngineError::Transform("value-of without 'select'".to_string()))?;
                parts.push(Part::ValueOf(path::compile(select, namespaces)?));
            }
            Some("name") => {
                let target = child.attribute("path").map(|p| path::compile(p, namespaces)).transpose()?;
                parts.push(Part::Name(target));
            }
            Some(_) => parts.extend(compile_message(child, namespaces)?),
            None if child.is_element() => parts.extend(compile_message(child, namespaces)?),
            None => {}
        }
    }
    Ok(parts)
}

/// XPath-like location of `node`: `/Name[n]/Child[m]`
///
/// Sibling iteration starts at the node itself, so the counts are already
/// one-based.
pub fn location(node: Node<'_, '_>) -> String {
    let mut steps: Vec<String> = node
        .ancestors()
        .filter(|ancestor| !ancestor.is_root())
        .map(|ancestor| {
            if ancestor.is_element() {
                let tag = ancestor.tag_name();
                let position = ancestor
                    .prev_siblings()
                    .filter(|sibling| sibling.is_element() && sibling.tag_name() == tag)
                    .count();
                format!("{}[{}]", qualified_name(ancestor), position)
            } else {
                let kind = if ancestor.is_text() { "text()" } else { "node()" };
                let position = ancestor
                    .prev_siblings()
                    .filter(|sibling| sibling.node_type() == ancestor.node_type())
                    .count();
                format!("{kind}[{position}]")
            }
        })
        .collect();
    if steps.is_empty() {
        return "/".to_string();
    }
    steps.reverse();
    format!("/{}", steps.join("/"))
}

/// Location of a rule context; an attribute is addressed by `/@name` below
/// its element
pub fn item_location(item: &Item<'_, '_>) -> String {
    match item {
        Item::Node(node) => location(*node),
        Item::Attribute { owner, .. } => format!("{}/@{}", location(*owner), item_name(item)),
        _ => String::new(),
    }
}

fn item_name(item: &Item<'_, '_>) -> String {
    match item {
        Item::Node(node) => qualified_name(*node),
        Item::Attribute { owner, .. } => item
            .attribute()
            .map(|attribute| attribute_name(*owner, &attribute))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

impl CompiledTransform for RuleSet {
    fn load(&self) -> Box<dyn TransformRun + '_> {
        Box::new(RuleRun {
            rules: self,
            parameters: HashMap::new(),
        })
    }
}

struct RuleRun<'r> {
    rules: &'r RuleSet,
    parameters: HashMap<String, String>,
}

fn bind_lets<'a, 'input>(
    lets: &[Let],
    item: &Item<'a, 'input>,
    variables: &mut Variables<'a, 'input>,
    keys: &KeyTable<'_, 'a, 'input>,
) -> Result<(), EngineError> {
    for variable in lets {
        let value = match &variable.value {
            Value::Expression(expression) => expression.evaluate_item(item.clone(), variables, Some(keys))?,
            Value::Literal(text) => vec![Item::String(text.clone())],
        };
        variables.insert(variable.name.clone(), value);
    }
    Ok(())
}

fn render<'a, 'input>(
    parts: &[Part],
    item: &Item<'a, 'input>,
    variables: &Variables<'a, 'input>,
    keys: &KeyTable<'_, 'a, 'input>,
) -> Result<String, EngineError> {
    let mut text = String::new();
    for part in parts {
        match part {
            Part::Text(value) => text.push_str(value),
            Part::ValueOf(expression) => {
                text.push_str(&expression.evaluate_string(item.clone(), variables, Some(keys))?)
            }
            Part::Name(None) => text.push_str(&item_name(item)),
            Part::Name(Some(expression)) => {
                let named = expression.evaluate_item(item.clone(), variables, Some(keys))?;
                if let Some(target) = named.first().filter(|target| target.is_node()) {
                    text.push_str(&item_name(target));
                }
            }
        }
    }
    Ok(text)
}

impl TransformRun for RuleRun<'_> {
    fn set_parameter(&mut self, name: &str, value: &str) {
        self.parameters.insert(name.to_string(), value.to_string());
    }

    fn transform(&mut self, source: &XmlDocument) -> Result<XmlDocument, EngineError> {
        let tree = source.tree()?;
        let document = tree.root();
        let keys = KeyTable::new(&self.rules.keys, document);

        let mut variables: Variables<'_, '_> = self
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), vec![Item::String(value.clone())]))
            .collect();
        bind_lets(&self.rules.lets, &Item::Node(document), &mut variables, &keys)?;

        let mut writer = XmlWriter::new();
        writer.start("svrl:schematron-output");
        writer.attr("xmlns:svrl", SVRL_NAMESPACE);
        writer.attr("xmlns:sch", ISO_NAMESPACE);
        if let Some(title) = &self.rules.title {
            writer.attr("title", title);
        }

        for pattern in &self.rules.patterns {
            writer.start("svrl:active-pattern");
            if let Some(id) = &pattern.id {
                writer.attr("id", id);
            }
            if let Some(name) = &pattern.name {
                writer.attr("name", name);
            }
            writer.end();

            let mut pattern_variables = variables.clone();
            bind_lets(&pattern.lets, &Item::Node(document), &mut pattern_variables, &keys)?;

            // First matching rule per node or attribute, in document order
            let mut seen = HashSet::new();
            let mut fired = Vec::new();
            for rule in &pattern.rules {
                for item in rule
                    .context
                    .evaluate_item(Item::Node(document), &pattern_variables, Some(&keys))?
                {
                    if let Some(order) = item.order_key().filter(|order| seen.insert(*order)) {
                        fired.push((order, item, rule));
                    }
                }
            }
            fired.sort_by_key(|(order, _, _)| *order);

            for (_, item, rule) in fired {
                writer.start("svrl:fired-rule");
                writer.attr("context", rule.context.source());
                if let Some(id) = &rule.id {
                    writer.attr("id", id);
                }
                if let Some(role) = &rule.role {
                    writer.attr("role", role);
                }
                writer.end();

                let mut rule_variables = pattern_variables.clone();
                bind_lets(&rule.lets, &item, &mut rule_variables, &keys)?;
                for check in &rule.checks {
                    let holds = check.test.evaluate_boolean(item.clone(), &rule_variables, Some(&keys))?;
                    let element = match (check.kind, holds) {
                        (CheckKind::Assert, false) => "svrl:failed-assert",
                        (CheckKind::Report, true) => "svrl:successful-report",
                        _ => continue,
                    };
                    writer.start(element);
                    writer.attr("test", check.test.source());
                    if let Some(id) = &check.id {
                        writer.attr("id", id);
                    }
                    if let Some(role) = &check.role {
                        writer.attr("role", role);
                    }
                    writer.attr("location", &item_location(&item));
                    writer.start("svrl:text");
                    writer.text(&render(&check.message, &item, &rule_variables, &keys)?);
                    writer.end();
                    writer.end();
                }
            }
        }
        writer.end();

        XmlDocument::parse(writer.finish(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::AssertionReport;

    const RULES: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:ns prefix="c" uri="urn:cmd"/>
  <sch:let name="max" value="2"/>
  <sch:pattern id="components">
    <sch:rule context="c:Component[@name = 'special']" role="warning">
      <sch:assert test="@id">Special component <sch:value-of select="@name"/> has no id</sch:assert>
    </sch:rule>
    <sch:rule context="c:Component">
      <sch:let name="children" value="count(c:Component)"/>
      <sch:assert test="$children &lt;= $max"><sch:name/> has <sch:value-of select="$children"/> children</sch:assert>
      <sch:report test="not(@name)">Unnamed</sch:report>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;

    const INSTANCE: &str = r#"<c:Root xmlns:c="urn:cmd">
  <c:Component name="special"/>
  <c:Component name="big"><c:Component/><c:Component/><c:Component/></c:Component>
</c:Root>"#;

    fn run(instance: &str) -> XmlDocument {
        let rules = RuleSet::compile(&XmlDocument::parse(RULES, None).unwrap()).unwrap();
        let document = XmlDocument::parse(instance, None).unwrap();
        let mut run = rules.load();
        run.transform(&document).unwrap()
    }

    #[test]
    fn test_report_entries() {
        let output = run(INSTANCE);
        let tree = roxmltree::Document::parse(output.text()).unwrap();
        let names: Vec<_> = tree
            .root_element()
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name())
            .collect();
        assert_eq!(
            names,
            vec![
                "active-pattern",
                "fired-rule",
                "failed-assert",
                "fired-rule",
                "failed-assert",
                "fired-rule",
                "successful-report",
                "fired-rule",
                "successful-report",
                "fired-rule",
                "successful-report",
            ]
        );

        let findings = AssertionReport::from_svrl(&output).unwrap().interpret();
        assert_eq!(findings.len(), 2);
        assert!(!findings[0].is_error);
        assert_eq!(findings[0].text, "Special component special has no id");
        assert_eq!(findings[0].location.as_deref(), Some("/c:Root[1]/c:Component[1]"));
        assert!(findings[1].is_error);
        assert_eq!(findings[1].text, "c:Component has 3 children");
        assert_eq!(findings[1].test.as_deref(), Some("$children <= $max"));
        assert_eq!(findings[1].context.as_deref(), Some("c:Component"));
    }

    #[test]
    fn test_location() {
        let doc = roxmltree::Document::parse("<a><b/><c/><b><d/></b></a>").unwrap();
        let d = doc.descendants().find(|n| n.has_tag_name("d")).unwrap();
        assert_eq!(location(d), "/a[1]/b[2]/d[1]");
        assert_eq!(location(doc.root()), "/");
    }

    #[test]
    fn test_parameters_are_variables() {
        let rules = RuleSet::compile(
            &XmlDocument::parse(
                r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern><sch:rule context="/*"><sch:assert test="$mode = 'ok'">mode</sch:assert></sch:rule></sch:pattern>
</sch:schema>"#,
                None,
            )
            .unwrap(),
        )
        .unwrap();
        let document = XmlDocument::parse("<a/>", None).unwrap();
        let mut run = rules.load();
        run.set_parameter("mode", "ok");
        let output = run.transform(&document).unwrap();
        assert!(!AssertionReport::from_svrl(&output).unwrap().has_errors());
    }

    #[test]
    fn test_rejects_unknown_prefix() {
        let rules = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern><sch:rule context="x:A"><sch:assert test="true()">never</sch:assert></sch:rule></sch:pattern>
</sch:schema>"#;
        assert!(RuleSet::compile(&XmlDocument::parse(rules, None).unwrap()).is_err());
    }

    fn findings(rules: &str, instance: &str) -> Vec<crate::validation::Finding> {
        let rules = RuleSet::compile(&XmlDocument::parse(rules, None).unwrap()).unwrap();
        let document = XmlDocument::parse(instance, None).unwrap();
        let output = rules.load().transform(&document).unwrap();
        AssertionReport::from_svrl(&output).unwrap().interpret()
    }

    #[test]
    fn test_attribute_contexts() {
        let rules = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern>
    <sch:rule context="@code">
      <sch:assert test="string-length(.) = 3"><sch:name/> of <sch:name path=".."/> is '<sch:value-of select="."/>'</sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;
        let findings = findings(rules, r#"<List><Item code="abc"/><Item code="toolong"/></List>"#);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.as_deref(), Some("/List[1]/Item[2]/@code"));
        assert_eq!(findings[0].text, "code of Item is 'toolong'");
        assert_eq!(findings[0].context.as_deref(), Some("@code"));
    }

    #[test]
    fn test_key_lookups() {
        let rules = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron"
            xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:key name="enums" match="item" use="."/>
  <sch:pattern>
    <sch:rule context="item">
      <sch:assert test="count(key('enums', current(), current()/parent::enumeration)) eq 1">Duplicate <sch:value-of select="."/></sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;
        let instance = "<root>\
            <enumeration><item>a</item><item>a</item><item>b</item></enumeration>\
            <enumeration><item>b</item></enumeration>\
            </root>";
        let locations: Vec<_> = findings(rules, instance)
            .into_iter()
            .map(|finding| finding.location.unwrap_or_default())
            .collect();
        assert_eq!(
            locations,
            vec!["/root[1]/enumeration[1]/item[1]", "/root[1]/enumeration[1]/item[2]"]
        );
    }

    #[test]
    fn test_incomplete_key_declaration() {
        let rules = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron"
            xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:key name="enums" match="item"/>
</sch:schema>"#;
        assert!(RuleSet::compile(&XmlDocument::parse(rules, None).unwrap()).is_err());
    }
}
