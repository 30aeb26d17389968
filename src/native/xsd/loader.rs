//! Reading schema documents into components

use std::collections::HashSet;

use regex::Regex;
use roxmltree::Node;

use super::{XSD_NAMESPACE, namespace_for};
use super::model::{
    AttributeDecl, AttributeGroup, AttributeUse, ComplexType, Components, Content, Derivation, ElementDecl,
    ElementRef, Facets, NamespaceConstraint, Particle, Pattern, ProcessContents, QName, SimpleType, SimpleTypeRef,
    Term, TypeDef, TypeRef, Use, WhiteSpace, Wildcard,
};
use crate::engine::{DocumentSource, EngineError, ProcessingEngine, ResourceResolver, XmlDocument};

/// Nesting limit for include and import chains
const MAX_DEPTH: usize = 32;

fn grammar_error(message: impl Into<String>) -> EngineError {
    EngineError::Grammar(message.into())
}

fn is_xsd(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XSD_NAMESPACE) && node.tag_name().name() == local
}

fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().namespace() == Some(XSD_NAMESPACE))
}

/// Collects the components of a schema and every document it includes or
/// imports
pub struct Loader<'e> {
    engine: &'e dyn ProcessingEngine,
    resolver: Option<&'e dyn ResourceResolver>,
    seen: HashSet<String>,
    components: Components,
}

impl<'e> Loader<'e> {
    pub fn new(engine: &'e dyn ProcessingEngine, resolver: Option<&'e dyn ResourceResolver>) -> Self {
        Self {
            engine,
            resolver,
            seen: HashSet::new(),
            components: Components::default(),
        }
    }

    pub fn load(mut self, grammar: &XmlDocument) -> Result<Components, EngineError> {
        if let Some(uri) = grammar.base_uri() {
            self.seen.insert(uri.to_string());
        }
        self.load_schema(grammar, None, 0)?;
        Ok(self.components)
    }

    fn load_schema(&mut self, document: &XmlDocument, chameleon: Option<&str>, depth: usize) -> Result<(), EngineError> {
        if depth > MAX_DEPTH {
            return Err(grammar_error("schema includes are nested too deeply"));
        }

        let tree = document.tree()?;
        let root = tree.root_element();
        if !is_xsd(root, "schema") {
            return Err(grammar_error(format!(
                "root element '{}' is not xs:schema",
                root.tag_name().name()
            )));
        }

        let declared = root.attribute("targetNamespace");
        let reader = Reader {
            target: declared.or(chameleon).map(str::to_string),
            chameleon: declared.is_none() && chameleon.is_some(),
            element_qualified: root.attribute("elementFormDefault") == Some("qualified"),
            attribute_qualified: root.attribute("attributeFormDefault") == Some("qualified"),
        };

        for child in xsd_children(root) {
            match child.tag_name().name() {
                "include" | "redefine" | "override" => {
                    let location = required(child, "schemaLocation")?;
                    if child.tag_name().name() != "include" {
                        log::warn!("Treating xs:{} of {} as an include", child.tag_name().name(), location);
                    }
                    if let Some(included) = self.fetch(document, location)? {
                        self.load_schema(&included, reader.target.as_deref(), depth + 1)?;
                    }
                }
                "import" => {
                    if child.attribute("namespace") == Some(roxmltree::NS_XML_URI) {
                        continue;
                    }
                    let Some(location) = child.attribute("schemaLocation") else {
                        log::debug!("Import of {:?} without schemaLocation", child.attribute("namespace"));
                        continue;
                    };
                    if let Some(imported) = self.fetch(document, location)? {
                        self.load_schema(&imported, None, depth + 1)?;
                    }
                }
                "element" => {
                    let decl = reader.element_decl(child, true)?;
                    self.components.elements.insert(decl.name.clone(), decl);
                }
                "attribute" => {
                    let decl = reader.attribute_decl(child)?;
                    self.components.attributes.insert(decl.name.clone(), decl);
                }
                "complexType" => {
                    let name = reader.global_name(child)?;
                    let definition = TypeDef::Complex(reader.complex_type(child)?);
                    self.components.types.insert(name, definition);
                }
                "simpleType" => {
                    let name = reader.global_name(child)?;
                    let definition = TypeDef::Simple(reader.simple_type(child)?);
                    self.components.types.insert(name, definition);
                }
                "group" => {
                    let name = reader.global_name(child)?;
                    let particle = reader.group_definition(child)?;
                    self.components.groups.insert(name, particle);
                }
                "attributeGroup" => {
                    let name = reader.global_name(child)?;
                    let group = reader.attribute_group(child)?;
                    self.components.attribute_groups.insert(name, group);
                }
                "annotation" | "notation" => {}
                other => log::warn!("Ignoring unsupported schema component xs:{}", other),
            }
        }
        Ok(())
    }

    /// Load a referenced schema document once
    fn fetch(&mut self, base: &XmlDocument, location: &str) -> Result<Option<XmlDocument>, EngineError> {
        let source = match self.resolver.and_then(|resolver| resolver.resolve(location, base.base_uri())) {
            Some(source) => source,
            None => DocumentSource::Url(base.resolve(location)?),
        };
        let key = source.describe();
        if !self.seen.insert(key.clone()) {
            return Ok(None);
        }
        log::debug!("Loading schema document {}", key);
        self.engine.load_document(&source).map(Some)
    }
}

fn required<'a>(node: Node<'a, '_>, attribute: &str) -> Result<&'a str, EngineError> {
    node.attribute(attribute).ok_or_else(|| {
        grammar_error(format!(
            "xs:{} is missing the '{}' attribute",
            node.tag_name().name(),
            attribute
        ))
    })
}

/// Per-document settings used while reading components
struct Reader {
    target: Option<String>,
    chameleon: bool,
    element_qualified: bool,
    attribute_qualified: bool,
}

impl Reader {
    fn global_name(&self, node: Node<'_, '_>) -> Result<QName, EngineError> {
        Ok(QName::new(self.target.as_deref(), required(node, "name")?))
    }

    /// Resolve a QName-valued attribute
    fn qname(&self, node: Node<'_, '_>, value: &str) -> Result<QName, EngineError> {
        let (prefix, local) = match value.trim().split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value.trim()),
        };
        let mut namespace = namespace_for(node, prefix);
        if prefix.is_some() && namespace.is_none() {
            return Err(grammar_error(format!("undeclared namespace prefix in '{value}'")));
        }
        if namespace.is_none() && self.chameleon {
            namespace = self.target.as_deref();
        }
        Ok(QName::new(namespace, local))
    }

    fn qname_attr(&self, node: Node<'_, '_>, attribute: &str) -> Result<Option<QName>, EngineError> {
        node.attribute(attribute)
            .map(|value| self.qname(node, value))
            .transpose()
    }

    fn element_decl(&self, node: Node<'_, '_>, global: bool) -> Result<ElementDecl, EngineError> {
        let local = required(node, "name")?;
        let qualified = global
            || node
                .attribute("form")
                .map(|form| form == "qualified")
                .unwrap_or(self.element_qualified);
        let namespace = if qualified { self.target.as_deref() } else { None };

        let type_ref = match self.qname_attr(node, "type")? {
            Some(name) => Some(TypeRef::Named(name)),
            None => match xsd_children(node).find(|c| matches!(c.tag_name().name(), "complexType" | "simpleType")) {
                Some(inline) if inline.tag_name().name() == "complexType" => {
                    Some(TypeRef::Complex(Box::new(self.complex_type(inline)?)))
                }
                Some(inline) => Some(TypeRef::Simple(Box::new(self.simple_type(inline)?))),
                None => None,
            },
        };

        Ok(ElementDecl {
            name: QName::new(namespace, local),
            type_ref,
            nillable: node.attribute("nillable") == Some("true"),
            is_abstract: node.attribute("abstract") == Some("true"),
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn attribute_decl(&self, node: Node<'_, '_>) -> Result<AttributeDecl, EngineError> {
        Ok(AttributeDecl {
            name: self.global_name(node)?,
            type_ref: self.attribute_type(node)?,
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn attribute_type(&self, node: Node<'_, '_>) -> Result<Option<SimpleTypeRef>, EngineError> {
        if let Some(name) = self.qname_attr(node, "type")? {
            return Ok(Some(SimpleTypeRef::Named(name)));
        }
        match xsd_children(node).find(|c| c.tag_name().name() == "simpleType") {
            Some(inline) => Ok(Some(SimpleTypeRef::Inline(Box::new(self.simple_type(inline)?)))),
            None => Ok(None),
        }
    }

    fn attribute_use(&self, node: Node<'_, '_>) -> Result<AttributeUse, EngineError> {
        let usage = match node.attribute("use") {
            Some("required") => Use::Required,
            Some("prohibited") => Use::Prohibited,
            _ => Use::Optional,
        };
        let fixed = node.attribute("fixed").map(str::to_string);

        if let Some(name) = self.qname_attr(node, "ref")? {
            return Ok(AttributeUse {
                name,
                type_ref: None,
                usage,
                fixed,
                global: true,
            });
        }

        let local = required(node, "name")?;
        let qualified = node
            .attribute("form")
            .map(|form| form == "qualified")
            .unwrap_or(self.attribute_qualified);
        let namespace = if qualified { self.target.as_deref() } else { None };
        Ok(AttributeUse {
            name: QName::new(namespace, local),
            type_ref: self.attribute_type(node)?,
            usage,
            fixed,
            global: false,
        })
    }

    /// Add an attribute, attribute group reference or attribute wildcard
    fn attribute_item(&self, node: Node<'_, '_>, group: &mut AttributeGroup) -> Result<(), EngineError> {
        match node.tag_name().name() {
            "attribute" => group.attributes.push(self.attribute_use(node)?),
            "attributeGroup" => {
                let name = self
                    .qname_attr(node, "ref")?
                    .ok_or_else(|| grammar_error("attribute group reference without 'ref'"))?;
                group.groups.push(name);
            }
            "anyAttribute" => group.wildcard = Some(self.wildcard(node)),
            _ => {}
        }
        Ok(())
    }

    fn attribute_group(&self, node: Node<'_, '_>) -> Result<AttributeGroup, EngineError> {
        let mut group = AttributeGroup::default();
        for child in xsd_children(node) {
            self.attribute_item(child, &mut group)?;
        }
        Ok(group)
    }

    fn wildcard(&self, node: Node<'_, '_>) -> Wildcard {
        let namespaces = match node.attribute("namespace").map(str::trim) {
            None | Some("##any") => NamespaceConstraint::Any,
            Some("##other") => NamespaceConstraint::Not(self.target.clone()),
            Some(list) => NamespaceConstraint::List(
                list.split_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => self.target.clone(),
                        "##local" => None,
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        let process = match node.attribute("processContents") {
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            _ => ProcessContents::Strict,
        };
        Wildcard { namespaces, process }
    }

    fn occurs(&self, node: Node<'_, '_>) -> Result<(u32, Option<u32>), EngineError> {
        let parse = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| grammar_error(format!("invalid occurrence bound '{value}'")))
        };
        let min = node.attribute("minOccurs").map(parse).transpose()?.unwrap_or(1);
        let max = match node.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => None,
            Some(value) => Some(parse(value)?),
            None => Some(1),
        };
        if max.is_some_and(|max| max < min) {
            return Err(grammar_error(format!("maxOccurs is less than minOccurs ({min})")));
        }
        Ok((min, max))
    }

    fn particle(&self, node: Node<'_, '_>) -> Result<Option<Particle>, EngineError> {
        let term = match node.tag_name().name() {
            "element" => match self.qname_attr(node, "ref")? {
                Some(name) => Term::Element(ElementRef::Global(name)),
                None => Term::Element(ElementRef::Local(Box::new(self.element_decl(node, false)?))),
            },
            "sequence" => Term::Sequence(self.particles(node)?),
            "choice" => Term::Choice(self.particles(node)?),
            "all" => Term::All(self.particles(node)?),
            "group" => Term::Group(
                self.qname_attr(node, "ref")?
                    .ok_or_else(|| grammar_error("model group reference without 'ref'"))?,
            ),
            "any" => Term::Any(self.wildcard(node)),
            _ => return Ok(None),
        };
        let (min, max) = self.occurs(node)?;
        Ok(Some(Particle { min, max, term }))
    }

    fn particles(&self, node: Node<'_, '_>) -> Result<Vec<Particle>, EngineError> {
        let mut particles = Vec::new();
        for child in xsd_children(node) {
            if let Some(particle) = self.particle(child)? {
                particles.push(particle);
            }
        }
        Ok(particles)
    }

    fn group_definition(&self, node: Node<'_, '_>) -> Result<Particle, EngineError> {
        let model = xsd_children(node)
            .find(|c| matches!(c.tag_name().name(), "sequence" | "choice" | "all"))
            .ok_or_else(|| grammar_error("model group definition without a model group"))?;
        let particle = self.particle(model)?.ok_or_else(|| grammar_error("empty model group definition"))?;
        Ok(Particle::once(particle.term))
    }

    fn complex_type(&self, node: Node<'_, '_>) -> Result<ComplexType, EngineError> {
        let mut mixed = node.attribute("mixed") == Some("true");
        let mut base = None;
        let mut content = Content::Empty;
        let mut attributes = AttributeGroup::default();

        for child in xsd_children(node) {
            match child.tag_name().name() {
                "sequence" | "choice" | "all" | "group" => {
                    if let Some(particle) = self.particle(child)? {
                        content = Content::Elements(particle);
                    }
                }
                "attribute" | "attributeGroup" | "anyAttribute" => self.attribute_item(child, &mut attributes)?,
                "simpleContent" => {
                    let (derivation, method) = derivation(child)?;
                    let base_name = self
                        .qname_attr(derivation, "base")?
                        .ok_or_else(|| grammar_error("simple content derivation without 'base'"))?;
                    content = match method {
                        Derivation::Extension => Content::Simple(SimpleTypeRef::Named(base_name.clone())),
                        Derivation::Restriction => {
                            let restricted = match xsd_children(derivation).find(|c| c.tag_name().name() == "simpleType") {
                                Some(inline) => SimpleTypeRef::Inline(Box::new(self.simple_type(inline)?)),
                                None => SimpleTypeRef::Named(base_name.clone()),
                            };
                            Content::Simple(SimpleTypeRef::Inline(Box::new(SimpleType::Restriction {
                                base: restricted,
                                facets: self.facets(derivation)?,
                            })))
                        }
                    };
                    for item in xsd_children(derivation) {
                        self.attribute_item(item, &mut attributes)?;
                    }
                    base = Some((base_name, method));
                }
                "complexContent" => {
                    if let Some(value) = child.attribute("mixed") {
                        mixed = value == "true";
                    }
                    let (derivation, method) = derivation(child)?;
                    let base_name = self
                        .qname_attr(derivation, "base")?
                        .ok_or_else(|| grammar_error("complex content derivation without 'base'"))?;
                    for item in xsd_children(derivation) {
                        match item.tag_name().name() {
                            "sequence" | "choice" | "all" | "group" => {
                                if let Some(particle) = self.particle(item)? {
                                    content = Content::Elements(particle);
                                }
                            }
                            _ => self.attribute_item(item, &mut attributes)?,
                        }
                    }
                    base = Some((base_name, method));
                }
                _ => {}
            }
        }

        Ok(ComplexType {
            mixed,
            base,
            content,
            attributes: attributes.attributes,
            attribute_groups: attributes.groups,
            wildcard: attributes.wildcard,
        })
    }

    fn simple_type(&self, node: Node<'_, '_>) -> Result<SimpleType, EngineError> {
        let inline = |parent: Node<'_, '_>| -> Result<Option<SimpleTypeRef>, EngineError> {
            match xsd_children(parent).find(|c| c.tag_name().name() == "simpleType") {
                Some(child) => Ok(Some(SimpleTypeRef::Inline(Box::new(self.simple_type(child)?)))),
                None => Ok(None),
            }
        };

        let variety = xsd_children(node)
            .find(|c| matches!(c.tag_name().name(), "restriction" | "list" | "union"))
            .ok_or_else(|| grammar_error("simple type without restriction, list or union"))?;

        match variety.tag_name().name() {
            "restriction" => {
                let base = match self.qname_attr(variety, "base")? {
                    Some(name) => SimpleTypeRef::Named(name),
                    None => inline(variety)?.ok_or_else(|| grammar_error("restriction without a base type"))?,
                };
                Ok(SimpleType::Restriction {
                    base,
                    facets: self.facets(variety)?,
                })
            }
            "list" => {
                let item = match self.qname_attr(variety, "itemType")? {
                    Some(name) => SimpleTypeRef::Named(name),
                    None => inline(variety)?.ok_or_else(|| grammar_error("list without an item type"))?,
                };
                Ok(SimpleType::List { item })
            }
            _ => {
                let mut members = Vec::new();
                if let Some(names) = variety.attribute("memberTypes") {
                    for name in names.split_whitespace() {
                        members.push(SimpleTypeRef::Named(self.qname(variety, name)?));
                    }
                }
                for child in xsd_children(variety).filter(|c| c.tag_name().name() == "simpleType") {
                    members.push(SimpleTypeRef::Inline(Box::new(self.simple_type(child)?)));
                }
                Ok(SimpleType::Union { members })
            }
        }
    }

    fn facets(&self, node: Node<'_, '_>) -> Result<Facets, EngineError> {
        let mut facets = Facets::default();
        for facet in xsd_children(node) {
            let name = facet.tag_name().name();
            let value = || required(facet, "value");
            let count = || -> Result<usize, EngineError> {
                let value = required(facet, "value")?;
                value
                    .trim()
                    .parse()
                    .map_err(|_| grammar_error(format!("invalid {name} value '{value}'")))
            };
            match name {
                "enumeration" => facets.enumeration.push(value()?.to_string()),
                "pattern" => {
                    let source = value()?;
                    let regex = Regex::new(&format!("^(?:{})$", translate_pattern(source)))
                        .map_err(|e| grammar_error(format!("invalid pattern '{source}': {e}")))?;
                    facets.patterns.push(Pattern {
                        source: source.to_string(),
                        regex,
                    });
                }
                "length" => facets.length = Some(count()?),
                "minLength" => facets.min_length = Some(count()?),
                "maxLength" => facets.max_length = Some(count()?),
                "totalDigits" => facets.total_digits = Some(count()?),
                "fractionDigits" => facets.fraction_digits = Some(count()?),
                "minInclusive" => facets.min_inclusive = Some(value()?.trim().to_string()),
                "maxInclusive" => facets.max_inclusive = Some(value()?.trim().to_string()),
                "minExclusive" => facets.min_exclusive = Some(value()?.trim().to_string()),
                "maxExclusive" => facets.max_exclusive = Some(value()?.trim().to_string()),
                "whiteSpace" => {
                    facets.white_space = Some(
                        WhiteSpace::from_name(value()?.trim())
                            .ok_or_else(|| grammar_error("invalid whiteSpace facet"))?,
                    );
                }
                _ => {}
            }
        }
        Ok(facets)
    }
}

fn derivation<'a, 'input>(content: Node<'a, 'input>) -> Result<(Node<'a, 'input>, Derivation), EngineError> {
    xsd_children(content)
        .find_map(|child| match child.tag_name().name() {
            "extension" => Some((child, Derivation::Extension)),
            "restriction" => Some((child, Derivation::Restriction)),
            _ => None,
        })
        .ok_or_else(|| grammar_error("content model without extension or restriction"))
}

/// Rewrite an XML Schema regular expression for the `regex` crate
///
/// Adds the name-character escapes and treats `^` and `$` as literals, as
/// schema patterns do outside character class negation.
fn translate_pattern(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut previous = None;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') => translated.push_str("[_:A-Za-z]"),
                Some('I') => translated.push_str("[^_:A-Za-z]"),
                Some('c') => translated.push_str(r"[-._:A-Za-z0-9]"),
                Some('C') => translated.push_str(r"[^-._:A-Za-z0-9]"),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => translated.push_str(r"\\"),
            },
            '^' if previous != Some('[') => translated.push_str(r"\^"),
            '$' => translated.push_str(r"\$"),
            other => translated.push(other),
        }
        previous = Some(c);
    }
    translated
}
