//! Compile stage: keep the patterns of the selected phase

use std::collections::HashSet;

use roxmltree::Node;

use super::{is_rule_element, require_schema, rule_children, stage_output, start_element};
use crate::engine::{EngineError, XmlDocument};
use crate::native::writer::XmlWriter;

pub const ALL_PHASES: &str = "#ALL";
pub const DEFAULT_PHASE: &str = "#DEFAULT";

/// Patterns that take part in an evaluation
enum Selection<'a, 'input> {
    All,
    Phase(Node<'a, 'input>),
}

fn select_phase<'a, 'input>(
    root: Node<'a, 'input>,
    requested: Option<&str>,
) -> Result<Selection<'a, 'input>, EngineError> {
    let name = match requested {
        None | Some(DEFAULT_PHASE) => root.attribute("defaultPhase"),
        Some(name) => Some(name),
    };
    match name {
        None | Some(ALL_PHASES) => Ok(Selection::All),
        Some(name) => rule_children(root)
            .find(|child| is_rule_element(*child, "phase") && child.attribute("id") == Some(name))
            .map(Selection::Phase)
            .ok_or_else(|| EngineError::Transform(format!("phase '{name}' is not defined"))),
    }
}

/// Write the rule schema with only the patterns active in `phase`
///
/// Without a phase the schema's `defaultPhase` applies, or all patterns when
/// there is none. A named phase activates the patterns it lists plus those
/// no phase mentions.
pub fn select(source: &XmlDocument, phase: Option<&str>) -> Result<XmlDocument, EngineError> {
    let tree = source.tree()?;
    let root = require_schema(&tree)?;
    let selection = select_phase(root, phase)?;

    let active: Option<HashSet<&str>> = match &selection {
        Selection::All => None,
        Selection::Phase(phase) => {
            let referenced: HashSet<&str> = rule_children(root)
                .filter(|child| is_rule_element(*child, "phase"))
                .flat_map(rule_children)
                .filter(|child| is_rule_element(*child, "active"))
                .filter_map(|active| active.attribute("pattern"))
                .collect();
            let mut active: HashSet<&str> = rule_children(*phase)
                .filter(|child| is_rule_element(*child, "active"))
                .filter_map(|active| active.attribute("pattern"))
                .collect();
            active.extend(
                rule_children(root)
                    .filter(|child| is_rule_element(*child, "pattern"))
                    .filter_map(|pattern| pattern.attribute("id"))
                    .filter(|id| !referenced.contains(id)),
            );
            Some(active)
        }
    };

    let is_active = |pattern: Node<'_, '_>| match (&active, pattern.attribute("id")) {
        (None, _) | (Some(_), None) => true,
        (Some(active), Some(id)) => active.contains(id),
    };

    let mut writer = XmlWriter::new();
    start_element(&mut writer, root, None, &|_, value| value.to_string());
    let mut kept = 0;
    for child in root.children() {
        if is_rule_element(child, "phase") {
            continue;
        }
        if is_rule_element(child, "pattern") {
            if !is_active(child) {
                continue;
            }
            kept += 1;
        }
        super::copy_rules(&mut writer, child, Some(root));
    }
    // Variables of the selected phase become schema variables
    if let Selection::Phase(phase) = selection {
        for variable in rule_children(phase).filter(|child| is_rule_element(*child, "let")) {
            super::copy_rules(&mut writer, variable, Some(root));
        }
    }
    writer.end();

    log::debug!("Phase {:?} activates {} patterns", phase, kept);
    stage_output(writer.finish(), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    const RULES: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron" defaultPhase="lenient">
  <sch:phase id="strict">
    <sch:active pattern="names"/>
    <sch:active pattern="sizes"/>
  </sch:phase>
  <sch:phase id="lenient">
    <sch:let name="limit" value="10"/>
    <sch:active pattern="names"/>
  </sch:phase>
  <sch:pattern id="names"/>
  <sch:pattern id="sizes"/>
  <sch:pattern id="always"/>
  <sch:pattern/>
</sch:schema>"#;

    fn patterns(phase: Option<&str>) -> Vec<String> {
        let source = XmlDocument::parse(RULES, None).unwrap();
        let output = select(&source, phase).unwrap();
        let tree = Document::parse(output.text()).unwrap();
        rule_children(tree.root_element())
            .filter(|child| is_rule_element(*child, "pattern"))
            .map(|pattern| pattern.attribute("id").unwrap_or("-").to_string())
            .collect()
    }

    #[test]
    fn test_phase_selection() {
        assert_eq!(patterns(Some("strict")), vec!["names", "sizes", "always", "-"]);
        assert_eq!(patterns(Some("lenient")), vec!["names", "always", "-"]);
        assert_eq!(patterns(None), vec!["names", "always", "-"]);
        assert_eq!(patterns(Some("#DEFAULT")), vec!["names", "always", "-"]);
        assert_eq!(patterns(Some("#ALL")), vec!["names", "sizes", "always", "-"]);
    }

    #[test]
    fn test_phase_variables_are_kept() {
        let source = XmlDocument::parse(RULES, None).unwrap();
        let output = select(&source, Some("lenient")).unwrap();
        let tree = Document::parse(output.text()).unwrap();
        let lets: Vec<_> = rule_children(tree.root_element())
            .filter(|child| is_rule_element(*child, "let"))
            .collect();
        assert_eq!(lets.len(), 1);
        assert_eq!(lets[0].attribute("name"), Some("limit"));
    }

    #[test]
    fn test_unknown_phase() {
        let source = XmlDocument::parse(RULES, None).unwrap();
        assert!(matches!(select(&source, Some("missing")), Err(EngineError::Transform(_))));
    }
}
