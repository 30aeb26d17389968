//! Turning loaded components into a self-contained schema

use std::collections::{HashMap, HashSet};

use super::datatypes::{Builtin, Datatypes};
use super::model::{
    AttributeDecl, AttributeUse, ComplexType, Components, Content, Derivation, ElementDecl, ElementRef, Particle,
    QName, Schema, SimpleType, SimpleTypeRef, Term, TypeDef, TypeRef, Use, Wildcard,
};
use crate::engine::EngineError;

const GROUP_DEPTH: usize = 32;

fn unresolved(name: &QName, kind: &str) -> EngineError {
    EngineError::Grammar(format!(
        "src-resolve: Cannot resolve the name '{name}' to a(n) '{kind}' component."
    ))
}

/// Attributes of the XML namespace, available without an import
fn xml_attribute(name: &QName) -> Option<AttributeDecl> {
    let known = name.namespace.as_deref() == Some(roxmltree::NS_XML_URI)
        && matches!(name.local.as_str(), "lang" | "space" | "base" | "id");
    known.then(|| AttributeDecl {
        name: name.clone(),
        type_ref: None,
        fixed: None,
    })
}

/// Merge derivations, inline groups and check every reference
pub fn finalize(components: Components) -> Result<Schema, EngineError> {
    let mut finalizer = Finalizer {
        components: &components,
        types: HashMap::new(),
        in_progress: HashSet::new(),
    };

    let names: Vec<QName> = components.types.keys().cloned().collect();
    for name in &names {
        finalizer.named_type(name)?;
    }

    let mut elements = HashMap::new();
    for (name, decl) in &components.elements {
        elements.insert(name.clone(), finalizer.element(decl)?);
    }

    let schema = Schema {
        elements,
        attributes: components.attributes.clone(),
        types: finalizer.types,
    };
    References::new(&schema).check()?;
    Ok(schema)
}

struct Finalizer<'c> {
    components: &'c Components,
    types: HashMap<QName, TypeDef>,
    in_progress: HashSet<QName>,
}

impl Finalizer<'_> {
    fn named_type(&mut self, name: &QName) -> Result<(), EngineError> {
        if self.types.contains_key(name) {
            return Ok(());
        }
        if !self.in_progress.insert(name.clone()) {
            return Err(EngineError::Grammar(format!(
                "ct-props-correct.3: Circular definitions detected for type '{name}'."
            )));
        }
        let definition = match self.components.types.get(name) {
            Some(TypeDef::Complex(complex)) => TypeDef::Complex(self.complex(complex)?),
            Some(TypeDef::Simple(simple)) => TypeDef::Simple(simple.clone()),
            None => return Err(unresolved(name, "type definition")),
        };
        self.in_progress.remove(name);
        self.types.insert(name.clone(), definition);
        Ok(())
    }

    /// Finalized complex base type, `None` when the base is built in or simple
    fn base_complex(&mut self, name: &QName) -> Result<Option<ComplexType>, EngineError> {
        if name.is_xsd() {
            return Ok(None);
        }
        self.named_type(name)?;
        Ok(match self.types.get(name) {
            Some(TypeDef::Complex(complex)) => Some(complex.clone()),
            _ => None,
        })
    }

    fn complex(&mut self, complex: &ComplexType) -> Result<ComplexType, EngineError> {
        let (mut attributes, mut wildcard) =
            self.attribute_uses(&complex.attributes, &complex.attribute_groups, complex.wildcard.clone(), 0)?;
        let mut content = self.content(&complex.content)?;
        let mut mixed = complex.mixed;

        if let Some((base_name, derivation)) = &complex.base {
            if let Some(base) = self.base_complex(base_name)? {
                attributes = merge_attributes(base.attributes, attributes);
                if *derivation == Derivation::Extension {
                    content = match (base.content, content) {
                        (Content::Elements(inherited), Content::Elements(own)) => {
                            Content::Elements(Particle::once(Term::Sequence(vec![inherited, own])))
                        }
                        (Content::Elements(inherited), Content::Empty) => Content::Elements(inherited),
                        (_, own) => own,
                    };
                    mixed |= base.mixed;
                    wildcard = wildcard.or(base.wildcard);
                }
            }
        }
        attributes.retain(|attribute| attribute.usage != Use::Prohibited);

        Ok(ComplexType {
            mixed,
            base: None,
            content,
            attributes,
            attribute_groups: Vec::new(),
            wildcard,
        })
    }

    fn attribute_uses(
        &mut self,
        uses: &[AttributeUse],
        groups: &[QName],
        wildcard: Option<Wildcard>,
        depth: usize,
    ) -> Result<(Vec<AttributeUse>, Option<Wildcard>), EngineError> {
        if depth > GROUP_DEPTH {
            return Err(EngineError::Grammar("attribute groups are nested too deeply".to_string()));
        }

        let mut resolved = Vec::with_capacity(uses.len());
        for attribute in uses {
            let mut attribute = attribute.clone();
            if attribute.global {
                let decl = self
                    .components
                    .attributes
                    .get(&attribute.name)
                    .cloned()
                    .or_else(|| xml_attribute(&attribute.name))
                    .ok_or_else(|| unresolved(&attribute.name, "attribute declaration"))?;
                attribute.type_ref = decl.type_ref;
                attribute.fixed = attribute.fixed.or(decl.fixed);
            }
            resolved.push(attribute);
        }

        let mut wildcard = wildcard;
        for name in groups {
            let group = self
                .components
                .attribute_groups
                .get(name)
                .ok_or_else(|| unresolved(name, "attribute group"))?;
            let (inner, inner_wildcard) =
                self.attribute_uses(&group.attributes, &group.groups, group.wildcard.clone(), depth + 1)?;
            resolved = merge_attributes(resolved, inner);
            wildcard = wildcard.or(inner_wildcard);
        }
        Ok((resolved, wildcard))
    }

    fn content(&mut self, content: &Content) -> Result<Content, EngineError> {
        Ok(match content {
            Content::Elements(particle) => Content::Elements(self.particle(particle, 0)?),
            other => other.clone(),
        })
    }

    fn particle(&mut self, particle: &Particle, depth: usize) -> Result<Particle, EngineError> {
        let term = match &particle.term {
            Term::Element(ElementRef::Local(decl)) => Term::Element(ElementRef::Local(Box::new(self.element(decl)?))),
            Term::Element(ElementRef::Global(name)) => Term::Element(ElementRef::Global(name.clone())),
            Term::Sequence(items) => Term::Sequence(self.particles(items, depth)?),
            Term::Choice(items) => Term::Choice(self.particles(items, depth)?),
            Term::All(items) => Term::All(self.particles(items, depth)?),
            Term::Group(name) => {
                if depth > GROUP_DEPTH {
                    return Err(EngineError::Grammar(format!("model group '{name}' refers to itself")));
                }
                let group = self
                    .components
                    .groups
                    .get(name)
                    .ok_or_else(|| unresolved(name, "group"))?;
                self.particle(group, depth + 1)?.term
            }
            Term::Any(wildcard) => Term::Any(wildcard.clone()),
        };
        Ok(Particle {
            min: particle.min,
            max: particle.max,
            term,
        })
    }

    fn particles(&mut self, items: &[Particle], depth: usize) -> Result<Vec<Particle>, EngineError> {
        items.iter().map(|item| self.particle(item, depth)).collect()
    }

    fn element(&mut self, decl: &ElementDecl) -> Result<ElementDecl, EngineError> {
        let type_ref = match &decl.type_ref {
            Some(TypeRef::Complex(complex)) => Some(TypeRef::Complex(Box::new(self.complex(complex)?))),
            Some(TypeRef::Named(name)) if name.is_xsd() => {
                if name.local != "anyType" && Builtin::from_local(&name.local).is_none() {
                    return Err(unresolved(name, "type definition"));
                }
                Some(TypeRef::Named(name.clone()))
            }
            Some(TypeRef::Named(name)) => {
                // Types are finalized separately; recursion through elements is legal
                if !self.components.types.contains_key(name) {
                    return Err(unresolved(name, "type definition"));
                }
                Some(TypeRef::Named(name.clone()))
            }
            other => other.clone(),
        };
        Ok(ElementDecl {
            type_ref,
            ..decl.clone()
        })
    }
}

/// `own` attribute uses override inherited ones of the same name
fn merge_attributes(inherited: Vec<AttributeUse>, own: Vec<AttributeUse>) -> Vec<AttributeUse> {
    let mut merged = inherited;
    for attribute in own {
        match merged.iter_mut().find(|existing| existing.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => merged.push(attribute),
        }
    }
    merged
}

/// Checks that every element and simple type reference resolves
struct References<'s> {
    schema: &'s Schema,
    datatypes: Datatypes<'s>,
}

impl<'s> References<'s> {
    fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            datatypes: Datatypes::new(schema),
        }
    }

    fn check(&self) -> Result<(), EngineError> {
        for decl in self.schema.elements.values() {
            self.element(decl)?;
        }
        for decl in self.schema.attributes.values() {
            self.simple(decl.type_ref.as_ref())?;
        }
        for definition in self.schema.types.values() {
            match definition {
                TypeDef::Complex(complex) => self.complex(complex)?,
                TypeDef::Simple(simple) => self.simple_type(simple)?,
            }
        }
        Ok(())
    }

    fn simple(&self, type_ref: Option<&SimpleTypeRef>) -> Result<(), EngineError> {
        let Some(type_ref) = type_ref else {
            return Ok(());
        };
        match type_ref {
            SimpleTypeRef::Named(name) if !self.datatypes.resolves(type_ref) => {
                Err(unresolved(name, "simpleType definition"))
            }
            SimpleTypeRef::Named(_) => Ok(()),
            SimpleTypeRef::Inline(simple) => self.simple_type(simple),
        }
    }

    fn simple_type(&self, simple: &SimpleType) -> Result<(), EngineError> {
        match simple {
            SimpleType::Restriction { base, .. } => self.simple(Some(base)),
            SimpleType::List { item } => self.simple(Some(item)),
            SimpleType::Union { members } => members.iter().try_for_each(|member| self.simple(Some(member))),
        }
    }

    fn complex(&self, complex: &ComplexType) -> Result<(), EngineError> {
        for attribute in &complex.attributes {
            self.simple(attribute.type_ref.as_ref())?;
        }
        match &complex.content {
            Content::Elements(particle) => self.particle(particle),
            Content::Simple(type_ref) => self.simple(Some(type_ref)),
            Content::Empty => Ok(()),
        }
    }

    fn particle(&self, particle: &Particle) -> Result<(), EngineError> {
        match &particle.term {
            Term::Element(ElementRef::Global(name)) => {
                if self.schema.elements.contains_key(name) {
                    Ok(())
                } else {
                    Err(unresolved(name, "element declaration"))
                }
            }
            Term::Element(ElementRef::Local(decl)) => self.element(decl),
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => {
                items.iter().try_for_each(|item| self.particle(item))
            }
            Term::Group(name) => Err(unresolved(name, "group")),
            Term::Any(_) => Ok(()),
        }
    }

    fn element(&self, decl: &ElementDecl) -> Result<(), EngineError> {
        match &decl.type_ref {
            Some(TypeRef::Complex(complex)) => self.complex(complex),
            Some(TypeRef::Simple(simple)) => self.simple_type(simple),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::XmlDocument;
    use crate::native::NativeEngine;
    use crate::native::xsd::loader::Loader;

    fn schema(text: &str) -> Result<Schema, EngineError> {
        let engine = NativeEngine::new();
        let document = XmlDocument::parse(text, None)?;
        finalize(Loader::new(&engine, None).load(&document)?)
    }

    fn complex<'s>(schema: &'s Schema, name: &str) -> &'s ComplexType {
        match schema.types.get(&QName::new(None, name)) {
            Some(TypeDef::Complex(complex)) => complex,
            other => panic!("{name} is not a complex type: {other:?}"),
        }
    }

    #[test]
    fn test_extension_appends_content_and_attributes() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Base">
    <xs:sequence><xs:element name="A"/></xs:sequence>
    <xs:attribute name="id" type="xs:string"/>
  </xs:complexType>
  <xs:complexType name="Derived">
    <xs:complexContent>
      <xs:extension base="Base">
        <xs:sequence><xs:element name="B"/></xs:sequence>
        <xs:attribute name="ref" type="xs:string"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#,
        )
        .unwrap();

        let derived = complex(&schema, "Derived");
        assert!(derived.base.is_none());
        assert_eq!(derived.attributes.len(), 2);
        let Content::Elements(Particle { term: Term::Sequence(parts), .. }) = &derived.content else {
            panic!("expected a sequence");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_restriction_removes_prohibited_attributes() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:attributeGroup name="Common">
    <xs:attribute name="id" type="xs:string"/>
    <xs:attribute name="lang" type="xs:language"/>
  </xs:attributeGroup>
  <xs:complexType name="Base"><xs:attributeGroup ref="Common"/></xs:complexType>
  <xs:complexType name="Narrow">
    <xs:complexContent>
      <xs:restriction base="Base">
        <xs:attribute name="lang" use="prohibited"/>
      </xs:restriction>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#,
        )
        .unwrap();

        assert_eq!(complex(&schema, "Base").attributes.len(), 2);
        let narrow = complex(&schema, "Narrow");
        assert_eq!(narrow.attributes.len(), 1);
        assert_eq!(narrow.attributes[0].name.local, "id");
    }

    #[test]
    fn test_groups_are_inlined() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:group name="Pair"><xs:sequence><xs:element name="A"/><xs:element name="B"/></xs:sequence></xs:group>
  <xs:complexType name="Holder"><xs:group ref="Pair" maxOccurs="unbounded"/></xs:complexType>
</xs:schema>"#,
        )
        .unwrap();

        let Content::Elements(particle) = &complex(&schema, "Holder").content else {
            panic!("expected element content");
        };
        assert_eq!(particle.max, None);
        assert!(matches!(&particle.term, Term::Sequence(items) if items.len() == 2));
    }

    #[test]
    fn test_unresolved_references() {
        let missing_type = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="A" type="Nope"/></xs:schema>"#,
        );
        assert!(matches!(missing_type, Err(EngineError::Grammar(message)) if message.starts_with("src-resolve")));

        let missing_element = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="A"><xs:complexType><xs:sequence><xs:element ref="B"/></xs:sequence></xs:complexType></xs:element>
</xs:schema>"#,
        );
        assert!(missing_element.is_err());

        let circular = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="A"><xs:complexContent><xs:extension base="B"/></xs:complexContent></xs:complexType>
  <xs:complexType name="B"><xs:complexContent><xs:extension base="A"/></xs:complexContent></xs:complexType>
</xs:schema>"#,
        );
        assert!(circular.is_err());
    }

    #[test]
    fn test_recursive_element_types_are_allowed() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Component" type="ComponentType"/>
  <xs:complexType name="ComponentType">
    <xs:sequence><xs:element name="Component" type="ComponentType" minOccurs="0" maxOccurs="unbounded"/></xs:sequence>
    <xs:attribute ref="xml:lang"/>
  </xs:complexType>
</xs:schema>"#,
        );
        assert!(schema.is_ok());
    }
}
