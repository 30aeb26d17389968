//! Instance validation against a finalized schema
//!
//! Elements are checked top-down. For each element its own attributes and
//! content are checked before any child is visited, and the first problem
//! ends the walk.

use roxmltree::{Document, Node};

use super::datatypes::{Builtin, Datatypes};
use super::model::{
    ComplexType, Content, ElementDecl, ElementRef, NamespaceConstraint, Particle, ProcessContents, QName, Schema,
    SimpleType, SimpleTypeRef, Term, TypeDef, TypeRef, Use, Wildcard,
};
use super::{Violation, XSI_NAMESPACE, namespace_for};
use crate::native::writer::{attribute_name, qualified_name};

/// Check `tree` against `schema`, returning the first violation
pub fn validate(schema: &Schema, tree: &Document<'_>) -> Result<(), Violation> {
    let validator = InstanceValidator {
        schema,
        datatypes: Datatypes::new(schema),
        tree,
    };
    let root = tree.root_element();
    match schema.elements.get(&node_name(root)) {
        Some(decl) => validator.element(root, decl),
        None => Err(validator.invalid(
            root,
            format!(
                "cvc-elt.1.a: Cannot find the declaration of element '{}'.",
                qualified_name(root)
            ),
        )),
    }
}

fn node_name(node: Node<'_, '_>) -> QName {
    QName::new(node.tag_name().namespace(), node.tag_name().name())
}

fn element_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children().filter(|child| child.is_element()).collect()
}

fn text_content(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect()
}

fn has_character_content(node: Node<'_, '_>) -> bool {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .any(|text| !text.trim().is_empty())
}

/// Resolved type of one element
enum ElementType<'s> {
    Any,
    Complex(&'s ComplexType),
    Simple(SimpleTypeRef),
    Inline(&'s SimpleType),
}

struct InstanceValidator<'s, 'd, 'input> {
    schema: &'s Schema,
    datatypes: Datatypes<'s>,
    tree: &'d Document<'input>,
}

impl<'s> InstanceValidator<'s, '_, '_> {
    fn invalid(&self, node: Node<'_, '_>, message: String) -> Violation {
        let position = self.tree.text_pos_at(node.range().start);
        Violation::Invalid(format!("line {}, column {}: {}", position.row, position.col, message))
    }

    /// Locate the message of a value violation at `node`
    fn located(&self, node: Node<'_, '_>, violation: Violation) -> Violation {
        match violation {
            Violation::Invalid(message) => self.invalid(node, message),
            grammar => grammar,
        }
    }

    fn named_type(&self, name: &QName) -> Option<ElementType<'s>> {
        if name.is_xsd() {
            return match name.local.as_str() {
                "anyType" => Some(ElementType::Any),
                local => Builtin::from_local(local).map(|_| ElementType::Simple(SimpleTypeRef::Named(name.clone()))),
            };
        }
        match self.schema.types.get(name)? {
            TypeDef::Complex(complex) => Some(ElementType::Complex(complex)),
            TypeDef::Simple(_) => Some(ElementType::Simple(SimpleTypeRef::Named(name.clone()))),
        }
    }

    fn declared_type(&self, decl: &'s ElementDecl) -> Result<ElementType<'s>, Violation> {
        match &decl.type_ref {
            None => Ok(ElementType::Any),
            Some(TypeRef::Complex(complex)) => Ok(ElementType::Complex(complex)),
            Some(TypeRef::Simple(simple)) => Ok(ElementType::Inline(simple)),
            Some(TypeRef::Named(name)) => self
                .named_type(name)
                .ok_or_else(|| Violation::Grammar(format!("type '{name}' of element '{}' is not defined", decl.name))),
        }
    }

    /// Type named by `xsi:type`, if present
    fn instance_type(&self, node: Node<'_, '_>) -> Result<Option<ElementType<'s>>, Violation> {
        let Some(value) = node.attribute((XSI_NAMESPACE, "type")) else {
            return Ok(None);
        };
        let (prefix, local) = match value.trim().split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value.trim()),
        };
        let not_found = || {
            self.invalid(
                node,
                format!(
                    "cvc-elt.4.2: Cannot resolve '{}' to a type definition for element '{}'.",
                    value,
                    qualified_name(node)
                ),
            )
        };
        let namespace = match prefix {
            Some(prefix) => Some(namespace_for(node, Some(prefix)).ok_or_else(not_found)?),
            None => namespace_for(node, None),
        };
        self.named_type(&QName::new(namespace, local))
            .map(Some)
            .ok_or_else(not_found)
    }

    fn element(&self, node: Node<'_, '_>, decl: &'s ElementDecl) -> Result<(), Violation> {
        let name = qualified_name(node);
        if decl.is_abstract {
            return Err(self.invalid(
                node,
                format!("cvc-elt.2: The value of {{abstract}} in the element declaration for '{name}' must be false."),
            ));
        }

        let element_type = match self.instance_type(node)? {
            Some(overridden) => overridden,
            None => self.declared_type(decl)?,
        };

        if let Some(nil) = node.attribute((XSI_NAMESPACE, "nil")) {
            if !decl.nillable {
                return Err(self.invalid(
                    node,
                    format!(
                        "cvc-elt.3.1: Attribute '{XSI_NAMESPACE},nil' must not appear on element '{name}', because the {{nillable}} property of '{name}' is false."
                    ),
                ));
            }
            if matches!(nil.trim(), "true" | "1") {
                if node.children().any(|child| child.is_element()) || has_character_content(node) {
                    return Err(self.invalid(
                        node,
                        format!(
                            "cvc-elt.3.2.1: Element '{name}' cannot have character or element information [children], because '{XSI_NAMESPACE},nil' is specified."
                        ),
                    ));
                }
                if let ElementType::Complex(complex) = element_type {
                    self.attributes(node, complex)?;
                }
                return Ok(());
            }
        }

        match element_type {
            ElementType::Any => self.lax_children(node),
            ElementType::Simple(type_ref) => {
                self.simple_element(node, decl, |value| self.datatypes.check(Some(&type_ref), value))
            }
            ElementType::Inline(simple) => {
                self.simple_element(node, decl, |value| self.datatypes.check_inline(simple, value))
            }
            ElementType::Complex(complex) => self.complex_element(node, decl, complex),
        }
    }

    fn simple_element(
        &self,
        node: Node<'_, '_>,
        decl: &ElementDecl,
        check: impl Fn(&str) -> Result<String, Violation>,
    ) -> Result<(), Violation> {
        let name = qualified_name(node);
        if let Some(attribute) = node.attributes().find(|a| a.namespace() != Some(XSI_NAMESPACE)) {
            return Err(self.invalid(
                node,
                format!(
                    "cvc-type.3.1.1: Element '{name}' is a simple type, so it cannot have attributes, excepting those whose namespace name is identical to '{XSI_NAMESPACE}' and whose [local name] is one of 'type', 'nil', 'schemaLocation' or 'noNamespaceSchemaLocation'. However, the attribute, '{}' was found.",
                    attribute_name(node, &attribute)
                ),
            ));
        }
        if node.children().any(|child| child.is_element()) {
            return Err(self.invalid(
                node,
                format!("cvc-type.3.1.2: Element '{name}' is a simple type, so it must have no element information item [children]."),
            ));
        }
        let value = check(&text_content(node)).map_err(|violation| self.located(node, violation))?;
        self.fixed_value(node, decl, &value)
    }

    fn fixed_value(&self, node: Node<'_, '_>, decl: &ElementDecl, value: &str) -> Result<(), Violation> {
        match &decl.fixed {
            Some(fixed) if fixed.trim() != value.trim() => Err(self.invalid(
                node,
                format!(
                    "cvc-elt.5.2.2.2.2: The value '{value}' of element '{}' does not match the {{value constraint}} value '{fixed}'.",
                    qualified_name(node)
                ),
            )),
            _ => Ok(()),
        }
    }

    fn complex_element(&self, node: Node<'_, '_>, decl: &ElementDecl, complex: &'s ComplexType) -> Result<(), Violation> {
        let name = qualified_name(node);
        self.attributes(node, complex)?;

        match &complex.content {
            Content::Empty => {
                let has_elements = node.children().any(|child| child.is_element());
                if has_elements || (!complex.mixed && has_character_content(node)) {
                    return Err(self.invalid(
                        node,
                        format!(
                            "cvc-complex-type.2.1: Element '{name}' must have no character or element information item [children], because the type's content type is empty."
                        ),
                    ));
                }
                Ok(())
            }
            Content::Simple(type_ref) => {
                if node.children().any(|child| child.is_element()) {
                    return Err(self.invalid(
                        node,
                        format!("cvc-complex-type.2.2: Element '{name}' must have no element [children], and the value must be valid."),
                    ));
                }
                let value = self
                    .datatypes
                    .check(Some(type_ref), &text_content(node))
                    .map_err(|violation| self.located(node, violation))?;
                self.fixed_value(node, decl, &value)
            }
            Content::Elements(particle) => {
                if !complex.mixed && has_character_content(node) {
                    return Err(self.invalid(
                        node,
                        format!(
                            "cvc-complex-type.2.3: Element '{name}' cannot have character [children], because the type's content type is element-only."
                        ),
                    ));
                }
                let children = element_children(node);
                let bindings = self.content_model(node, particle, &children)?;
                for (child, binding) in children.iter().zip(bindings) {
                    match binding {
                        Some(Binding::Element(child_decl)) => self.element(*child, child_decl)?,
                        Some(Binding::Wildcard(wildcard)) => self.wildcard_element(*child, wildcard)?,
                        None => {}
                    }
                }
                Ok(())
            }
        }
    }

    fn content_model(
        &self,
        node: Node<'_, '_>,
        particle: &'s Particle,
        children: &[Node<'_, '_>],
    ) -> Result<Vec<Option<Binding<'s>>>, Violation> {
        let names: Vec<QName> = children.iter().map(|child| node_name(*child)).collect();
        let outcome = match &particle.term {
            Term::All(items) => AllGroup::new(self.schema, particle.min, items)?.run(&names),
            _ => Automaton::build(self.schema, particle)?.run(&names),
        };
        let mismatch = match outcome {
            Ok(bindings) => return Ok(bindings),
            Err(mismatch) => mismatch,
        };

        let expected = format!("{{{}}}", mismatch.expected.join(", "));
        Err(match children.get(mismatch.position) {
            Some(child) if mismatch.expected.is_empty() => self.invalid(
                *child,
                format!(
                    "cvc-complex-type.2.4.d: Invalid content was found starting with element '{}'. No child element is expected at this point.",
                    qualified_name(*child)
                ),
            ),
            Some(child) => self.invalid(
                *child,
                format!(
                    "cvc-complex-type.2.4.a: Invalid content was found starting with element '{}'. One of '{expected}' is expected.",
                    qualified_name(*child)
                ),
            ),
            None => self.invalid(
                node,
                format!(
                    "cvc-complex-type.2.4.b: The content of element '{}' is not complete. One of '{expected}' is expected.",
                    qualified_name(node)
                ),
            ),
        })
    }

    fn wildcard_element(&self, node: Node<'_, '_>, wildcard: &Wildcard) -> Result<(), Violation> {
        let decl = self.schema.elements.get(&node_name(node));
        match (wildcard.process, decl) {
            (ProcessContents::Skip, _) => Ok(()),
            (_, Some(decl)) => self.element(node, decl),
            (ProcessContents::Lax, None) => self.lax_children(node),
            (ProcessContents::Strict, None) => Err(self.invalid(
                node,
                format!(
                    "cvc-complex-type.2.4.c: The matching wildcard is strict, but no declaration can be found for element '{}'.",
                    qualified_name(node)
                ),
            )),
        }
    }

    /// Validate the children of an element whose content is not constrained
    fn lax_children(&self, node: Node<'_, '_>) -> Result<(), Violation> {
        for child in node.children().filter(|child| child.is_element()) {
            match self.schema.elements.get(&node_name(child)) {
                Some(decl) => self.element(child, decl)?,
                None => self.lax_children(child)?,
            }
        }
        Ok(())
    }

    fn attributes(&self, node: Node<'_, '_>, complex: &ComplexType) -> Result<(), Violation> {
        let element = qualified_name(node);

        for attribute in node.attributes() {
            if attribute.namespace() == Some(XSI_NAMESPACE) {
                continue;
            }
            let name = QName::new(attribute.namespace(), attribute.name());
            let display = attribute_name(node, &attribute);

            let (type_ref, fixed) = match complex.attributes.iter().find(|declared| declared.name == name) {
                Some(declared) => (declared.type_ref.as_ref(), declared.fixed.as_deref()),
                None => {
                    let global = self.schema.attributes.get(&name);
                    match &complex.wildcard {
                        Some(wildcard) if wildcard.allows(name.namespace.as_deref()) => match (wildcard.process, global) {
                            (ProcessContents::Skip, _) => continue,
                            (_, Some(global)) => (global.type_ref.as_ref(), global.fixed.as_deref()),
                            (ProcessContents::Lax, None) => continue,
                            (ProcessContents::Strict, None) if name.namespace.as_deref() == Some(roxmltree::NS_XML_URI) => {
                                continue
                            }
                            (ProcessContents::Strict, None) => {
                                return Err(self.not_allowed(node, &display, &element));
                            }
                        },
                        _ => return Err(self.not_allowed(node, &display, &element)),
                    }
                }
            };

            let value = self
                .datatypes
                .check(type_ref, attribute.value())
                .map_err(|violation| self.located(node, violation))?;
            if let Some(fixed) = fixed.filter(|fixed| fixed.trim() != value.trim()) {
                return Err(self.invalid(
                    node,
                    format!(
                        "cvc-attribute.4: The value '{value}' of attribute '{display}' on element '{element}' is not valid with respect to its fixed {{value constraint}}. The attribute must have a value of '{fixed}'."
                    ),
                ));
            }
        }

        for required in complex.attributes.iter().filter(|a| a.usage == Use::Required) {
            let present = node
                .attributes()
                .any(|a| a.name() == required.name.local && a.namespace() == required.name.namespace.as_deref());
            if !present {
                return Err(self.invalid(
                    node,
                    format!(
                        "cvc-complex-type.4: Attribute '{}' must appear on element '{element}'.",
                        required.name.local
                    ),
                ));
            }
        }
        Ok(())
    }

    fn not_allowed(&self, node: Node<'_, '_>, attribute: &str, element: &str) -> Violation {
        self.invalid(
            node,
            format!("cvc-complex-type.3.2.2: Attribute '{attribute}' is not allowed to appear in element '{element}'."),
        )
    }
}

/// What a child element was matched against
#[derive(Clone, Copy)]
enum Binding<'s> {
    Element(&'s ElementDecl),
    Wildcard(&'s Wildcard),
}

impl Binding<'_> {
    fn matches(&self, name: &QName) -> bool {
        match self {
            Binding::Element(decl) => decl.name == *name,
            Binding::Wildcard(wildcard) => wildcard.allows(name.namespace.as_deref()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Binding::Element(decl) => decl.name.to_string(),
            Binding::Wildcard(wildcard) => describe_wildcard(wildcard),
        }
    }
}

/// Where matching stopped and what could have come next
struct Mismatch {
    position: usize,
    expected: Vec<String>,
}

impl Mismatch {
    fn new<'a, 's: 'a>(position: usize, candidates: impl IntoIterator<Item = &'a Binding<'s>>) -> Self {
        let mut expected: Vec<String> = Vec::new();
        for candidate in candidates {
            let what = candidate.describe();
            if !expected.contains(&what) {
                expected.push(what);
            }
        }
        Self { position, expected }
    }
}

/// Upper bound on automaton states; large `maxOccurs` values are unrolled
const MAX_STATES: usize = 1 << 16;

#[derive(Default)]
struct State<'s> {
    /// Transitions that consume nothing
    empty: Vec<usize>,
    /// Transitions that consume one child
    moves: Vec<(Binding<'s>, usize)>,
}

/// How a state was reached: the previous state and the binding of the
/// child consumed on the way
type Origin<'s> = Option<(usize, Binding<'s>)>;

/// Nondeterministic automaton of a content model
///
/// Children are consumed one at a time while the set of live states is
/// tracked, so memory and time grow linearly with the number of children.
struct Automaton<'s> {
    states: Vec<State<'s>>,
    accept: usize,
}

impl<'s> Automaton<'s> {
    fn build(schema: &'s Schema, particle: &'s Particle) -> Result<Self, Violation> {
        let mut automaton = Automaton {
            states: vec![State::default()],
            accept: 0,
        };
        automaton.accept = automaton.particle(schema, particle, 0)?;
        Ok(automaton)
    }

    fn add_state(&mut self) -> Result<usize, Violation> {
        if self.states.len() >= MAX_STATES {
            return Err(Violation::Grammar(format!(
                "content model needs more than {MAX_STATES} states"
            )));
        }
        self.states.push(State::default());
        Ok(self.states.len() - 1)
    }

    /// Add `particle` starting at `from`; returns the state it ends in
    fn particle(&mut self, schema: &'s Schema, particle: &'s Particle, from: usize) -> Result<usize, Violation> {
        let mut current = from;
        for _ in 0..particle.min {
            current = self.term(schema, &particle.term, current)?;
        }
        match particle.max {
            Some(max) if max <= particle.min => Ok(current),
            Some(max) => {
                let exit = self.add_state()?;
                for _ in particle.min..max {
                    self.states[current].empty.push(exit);
                    current = self.term(schema, &particle.term, current)?;
                }
                self.states[current].empty.push(exit);
                Ok(exit)
            }
            None => {
                let repeat = self.add_state()?;
                self.states[current].empty.push(repeat);
                let end = self.term(schema, &particle.term, repeat)?;
                self.states[end].empty.push(repeat);
                Ok(repeat)
            }
        }
    }

    fn term(&mut self, schema: &'s Schema, term: &'s Term, from: usize) -> Result<usize, Violation> {
        match term {
            Term::Element(reference) => {
                let to = self.add_state()?;
                let decl = match reference {
                    ElementRef::Local(decl) => Some(decl.as_ref()),
                    ElementRef::Global(name) => schema.elements.get(name),
                };
                if let Some(decl) = decl {
                    self.states[from].moves.push((Binding::Element(decl), to));
                }
                Ok(to)
            }
            Term::Any(wildcard) => {
                let to = self.add_state()?;
                self.states[from].moves.push((Binding::Wildcard(wildcard), to));
                Ok(to)
            }
            Term::Sequence(items) => items
                .iter()
                .try_fold(from, |current, item| self.particle(schema, item, current)),
            Term::Choice(items) => {
                let join = self.add_state()?;
                for item in items {
                    let end = self.particle(schema, item, from)?;
                    self.states[end].empty.push(join);
                }
                Ok(join)
            }
            Term::All(_) => Err(Violation::Grammar(
                "an xs:all group must be the whole content model".to_string(),
            )),
            // Unresolved group references never match
            Term::Group(_) => self.add_state(),
        }
    }

    /// States reachable from `seeds` without consuming a child, ordered by
    /// state; the first origin found for a state is kept
    fn closure(&self, seeds: Vec<(usize, Origin<'s>)>) -> Vec<(usize, Origin<'s>)> {
        let mut seen = vec![false; self.states.len()];
        let mut reached = Vec::new();
        let mut pending: Vec<(usize, Origin<'s>)> = seeds.into_iter().rev().collect();
        while let Some((state, origin)) = pending.pop() {
            if std::mem::replace(&mut seen[state], true) {
                continue;
            }
            reached.push((state, origin));
            pending.extend(self.states[state].empty.iter().rev().map(|&next| (next, origin)));
        }
        reached.sort_by_key(|&(state, _)| state);
        reached
    }

    fn mismatch(&self, position: usize, live: &[(usize, Origin<'s>)]) -> Mismatch {
        Mismatch::new(
            position,
            live.iter()
                .flat_map(|&(state, _)| self.states[state].moves.iter().map(|(binding, _)| binding)),
        )
    }

    fn run(&self, names: &[QName]) -> Result<Vec<Option<Binding<'s>>>, Mismatch> {
        let mut steps = Vec::with_capacity(names.len() + 1);
        steps.push(self.closure(vec![(0, None)]));
        for (position, name) in names.iter().enumerate() {
            let live = &steps[position];
            let seeds: Vec<(usize, Origin<'s>)> = live
                .iter()
                .flat_map(|&(state, _)| {
                    self.states[state]
                        .moves
                        .iter()
                        .filter(|(binding, _)| binding.matches(name))
                        .map(move |&(binding, target)| (target, Some((state, binding))))
                })
                .collect();
            if seeds.is_empty() {
                return Err(self.mismatch(position, live));
            }
            let next = self.closure(seeds);
            steps.push(next);
        }

        let last = &steps[names.len()];
        if !last.iter().any(|&(state, _)| state == self.accept) {
            return Err(self.mismatch(names.len(), last));
        }

        // Walk back from the accepting state to recover each child's binding
        let mut bindings = vec![None; names.len()];
        let mut state = self.accept;
        for position in (0..names.len()).rev() {
            let step = &steps[position + 1];
            let Ok(index) = step.binary_search_by_key(&state, |&(reached, _)| reached) else {
                break;
            };
            let Some((previous, binding)) = step[index].1 else {
                break;
            };
            bindings[position] = Some(binding);
            state = previous;
        }
        Ok(bindings)
    }
}

/// An `xs:all` group: every member at most once, in any order
struct AllGroup<'s> {
    min: u32,
    /// Member bindings and whether each is required
    members: Vec<(Binding<'s>, bool)>,
}

impl<'s> AllGroup<'s> {
    fn new(schema: &'s Schema, min: u32, items: &'s [Particle]) -> Result<Self, Violation> {
        let mut members = Vec::with_capacity(items.len());
        for item in items.iter().filter(|item| item.max != Some(0)) {
            let binding = match &item.term {
                Term::Element(ElementRef::Local(decl)) => Binding::Element(decl),
                Term::Element(ElementRef::Global(name)) => match schema.elements.get(name) {
                    Some(decl) => Binding::Element(decl),
                    None => continue,
                },
                Term::Any(wildcard) => Binding::Wildcard(wildcard),
                _ => {
                    return Err(Violation::Grammar(
                        "an xs:all group may only contain element declarations".to_string(),
                    ));
                }
            };
            members.push((binding, item.min > 0));
        }
        Ok(Self { min, members })
    }

    fn run(&self, names: &[QName]) -> Result<Vec<Option<Binding<'s>>>, Mismatch> {
        if names.is_empty() && self.min == 0 {
            return Ok(Vec::new());
        }
        let mut used = vec![false; self.members.len()];
        let mut bindings = Vec::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            let found = self
                .members
                .iter()
                .enumerate()
                .find(|(index, (binding, _))| !used[*index] && binding.matches(name));
            match found {
                Some((index, (binding, _))) => {
                    used[index] = true;
                    bindings.push(Some(*binding));
                }
                None => return Err(self.mismatch(position, &used)),
            }
        }
        let complete = self
            .members
            .iter()
            .zip(&used)
            .all(|((_, required), used)| *used || !required);
        if complete {
            Ok(bindings)
        } else {
            Err(self.mismatch(names.len(), &used))
        }
    }

    fn mismatch(&self, position: usize, used: &[bool]) -> Mismatch {
        Mismatch::new(
            position,
            self.members
                .iter()
                .zip(used)
                .filter(|(_, used)| !**used)
                .map(|((binding, _), _)| binding),
        )
    }
}

fn describe_wildcard(wildcard: &Wildcard) -> String {
    match &wildcard.namespaces {
        NamespaceConstraint::Any => "WC[##any]".to_string(),
        NamespaceConstraint::Not(Some(namespace)) => format!("WC[##other:\"{namespace}\"]"),
        NamespaceConstraint::Not(None) => "WC[##other]".to_string(),
        NamespaceConstraint::List(namespaces) => {
            let list: Vec<String> = namespaces
                .iter()
                .map(|namespace| match namespace {
                    Some(namespace) => format!("\"{namespace}\""),
                    None => "##local".to_string(),
                })
                .collect();
            format!("WC[{}]", list.join(", "))
        }
    }
}
