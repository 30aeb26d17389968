//! XML output writer
//!
//! Small string-backed writer used by the stage transforms and the rule
//! evaluator to build their output documents.

use roxmltree::Node;

pub struct XmlWriter {
    output: String,
    open: Vec<String>,
    in_start_tag: bool,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            open: Vec::new(),
            in_start_tag: false,
        }
    }

    pub fn start(&mut self, name: &str) {
        self.close_start_tag();
        self.output.push('<');
        self.output.push_str(name);
        self.open.push(name.to_string());
        self.in_start_tag = true;
    }

    /// Add an attribute to the element just started
    pub fn attr(&mut self, name: &str, value: &str) {
        debug_assert!(self.in_start_tag, "attribute written outside a start tag");
        self.output.push(' ');
        self.output.push_str(name);
        self.output.push_str("=\"");
        self.output.push_str(&escape_attr(value));
        self.output.push('"');
    }

    pub fn text(&mut self, text: &str) {
        self.close_start_tag();
        self.output.push_str(&escape_text(text));
    }

    pub fn end(&mut self) {
        let Some(name) = self.open.pop() else {
            return;
        };
        if self.in_start_tag {
            self.output.push_str("/>");
            self.in_start_tag = false;
        } else {
            self.output.push_str("</");
            self.output.push_str(&name);
            self.output.push('>');
        }
    }

    /// Start a copy of `node`: its qualified name, the namespace
    /// declarations not already in scope at `scope`, and its attributes with
    /// values passed through `map_value`
    pub fn start_copy(
        &mut self,
        node: Node<'_, '_>,
        scope: Option<Node<'_, '_>>,
        map_value: &dyn Fn(&str, &str) -> String,
    ) {
        self.start(&qualified_name(node));

        for ns in node.namespaces() {
            if ns.name() == Some("xml") {
                continue;
            }
            let inherited = scope.is_some_and(|scope| {
                scope
                    .namespaces()
                    .any(|other| other.name() == ns.name() && other.uri() == ns.uri())
            });
            if !inherited {
                match ns.name() {
                    Some(prefix) => self.attr(&format!("xmlns:{prefix}"), ns.uri()),
                    None => self.attr("xmlns", ns.uri()),
                }
            }
        }

        for attribute in node.attributes() {
            let name = attribute_name(node, &attribute);
            let value = map_value(attribute.name(), attribute.value());
            self.attr(&name, &value);
        }
    }

    /// Copy `node` and its whole subtree verbatim
    pub fn copy_tree(&mut self, node: Node<'_, '_>, scope: Option<Node<'_, '_>>) {
        if node.is_text() {
            self.text(node.text().unwrap_or_default());
            return;
        }
        if !node.is_element() {
            return;
        }
        self.start_copy(node, scope, &|_, value| value.to_string());
        for child in node.children() {
            self.copy_tree(child, Some(node));
        }
        self.end();
    }

    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.end();
        }
        self.output
    }

    fn close_start_tag(&mut self) {
        if self.in_start_tag {
            self.output.push('>');
            self.in_start_tag = false;
        }
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Element name with the prefix the source document uses for its namespace
pub fn qualified_name(node: Node<'_, '_>) -> String {
    let tag = node.tag_name();
    let prefix = tag.namespace().and_then(|uri| {
        node.namespaces()
            .find(|ns| ns.uri() == uri)
            .and_then(|ns| ns.name())
    });
    match prefix {
        Some(prefix) => format!("{prefix}:{}", tag.name()),
        None => tag.name().to_string(),
    }
}

/// Attribute name with the prefix in scope on its element
pub fn attribute_name(node: Node<'_, '_>, attribute: &roxmltree::Attribute<'_, '_>) -> String {
    match attribute.namespace().and_then(|uri| attribute_prefix(node, uri)) {
        Some(prefix) => format!("{prefix}:{}", attribute.name()),
        None => attribute.name().to_string(),
    }
}

fn attribute_prefix<'a>(node: Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == roxmltree::NS_XML_URI {
        return Some("xml");
    }
    node.namespaces()
        .filter(|ns| ns.uri() == uri)
        .find_map(|ns| ns.name())
}

/// Escape special characters in attribute values
fn escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\n' => result.push_str("&#10;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in text content
fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}
