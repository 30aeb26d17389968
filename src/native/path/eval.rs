//! Path expression evaluation

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::iter::successors;
use std::rc::Rc;

use regex::RegexBuilder;
use roxmltree::{Attribute, Node};

use super::Keys;
use super::ast::{Arithmetic, Axis, Comparison, Expr, Function, NodeTest, Step};
use crate::native::writer::qualified_name;

/// One item of a result sequence
#[derive(Debug, Clone)]
pub enum Item<'a, 'input> {
    Node(Node<'a, 'input>),
    /// Attribute `index` of `owner`
    Attribute {
        owner: Node<'a, 'input>,
        index: usize,
    },
    String(String),
    Number(f64),
    Boolean(bool),
}

pub type Sequence<'a, 'input> = Vec<Item<'a, 'input>>;

/// Variable bindings in scope of an evaluation
pub type Variables<'a, 'input> = HashMap<String, Sequence<'a, 'input>>;

type EvalResult<T> = Result<T, String>;

impl<'a, 'input> Item<'a, 'input> {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_) | Item::Attribute { .. })
    }

    pub fn attribute(&self) -> Option<Attribute<'a, 'input>> {
        match self {
            Item::Attribute { owner, index } => owner.attributes().nth(*index),
            _ => None,
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            Item::Node(node) => node_string(*node),
            Item::Attribute { .. } => self.attribute().map(|a| a.value().to_string()).unwrap_or_default(),
            Item::String(value) => value.clone(),
            Item::Number(value) => format_number(*value),
            Item::Boolean(value) => value.to_string(),
        }
    }

    fn number_value(&self) -> f64 {
        match self {
            Item::Number(value) => *value,
            Item::Boolean(value) => f64::from(u8::from(*value)),
            other => to_number(&other.string_value()),
        }
    }

    /// Document order: nodes by id, attributes right after their owner
    pub fn order_key(&self) -> Option<(u32, usize)> {
        match self {
            Item::Node(node) => Some((node.id().get(), 0)),
            Item::Attribute { owner, index } => Some((owner.id().get(), index + 1)),
            _ => None,
        }
    }
}

type KeyIndex<'a, 'input> = HashMap<String, Sequence<'a, 'input>>;

/// Key indexes over one document, each built the first time its key is used
pub struct KeyTable<'k, 'a, 'input> {
    definitions: &'k Keys,
    root: Node<'a, 'input>,
    indexes: RefCell<HashMap<String, Rc<KeyIndex<'a, 'input>>>>,
}

impl<'k, 'a, 'input> KeyTable<'k, 'a, 'input> {
    pub fn new(definitions: &'k Keys, node: Node<'a, 'input>) -> Self {
        Self {
            definitions,
            root: node.document().root(),
            indexes: RefCell::default(),
        }
    }

    fn index(&self, name: &str, variables: &Variables<'a, 'input>) -> EvalResult<Rc<KeyIndex<'a, 'input>>> {
        if let Some(index) = self.indexes.borrow().get(name) {
            return Ok(Rc::clone(index));
        }
        let definitions = self
            .definitions
            .get(name)
            .ok_or_else(|| format!("key '{name}' is not declared"))?;

        let mut index = KeyIndex::new();
        for definition in definitions {
            let matched = evaluate(definition.pattern.expr(), &Context::new(Item::Node(self.root), variables, None))?;
            for item in matched {
                let values = evaluate(definition.value.expr(), &Context::new(item.clone(), variables, None))?;
                for value in values {
                    index.entry(value.string_value()).or_default().push(item.clone());
                }
            }
        }
        for items in index.values_mut() {
            document_order(items);
        }
        log::trace!("Indexed key '{}' with {} values", name, index.len());

        let index = Rc::new(index);
        self.indexes.borrow_mut().insert(name.to_string(), Rc::clone(&index));
        Ok(index)
    }
}

/// Dynamic context of one evaluation step
#[derive(Clone)]
pub struct Context<'v, 'a, 'input> {
    item: Item<'a, 'input>,
    position: usize,
    size: usize,
    current: Item<'a, 'input>,
    variables: &'v Variables<'a, 'input>,
    keys: Option<&'v KeyTable<'v, 'a, 'input>>,
}

impl<'v, 'a, 'input> Context<'v, 'a, 'input> {
    pub fn new(
        item: Item<'a, 'input>,
        variables: &'v Variables<'a, 'input>,
        keys: Option<&'v KeyTable<'v, 'a, 'input>>,
    ) -> Self {
        Self {
            current: item.clone(),
            item,
            position: 1,
            size: 1,
            variables,
            keys,
        }
    }

    fn focus(&self, item: Item<'a, 'input>, position: usize, size: usize) -> Self {
        Self {
            item,
            position,
            size,
            current: self.current.clone(),
            variables: self.variables,
            keys: self.keys,
        }
    }
}

pub fn evaluate<'a, 'input>(expr: &Expr, ctx: &Context<'_, 'a, 'input>) -> EvalResult<Sequence<'a, 'input>> {
    match expr {
        Expr::Literal(value) => Ok(vec![Item::String(value.clone())]),
        Expr::Number(value) => Ok(vec![Item::Number(*value)]),
        Expr::Variable(name) => ctx
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| format!("variable ${name} is not defined")),
        Expr::Root => {
            let node = match &ctx.item {
                Item::Node(node) => *node,
                Item::Attribute { owner, .. } => *owner,
                _ => return Err("'/' requires a context node".to_string()),
            };
            Ok(vec![Item::Node(node.document().root())])
        }
        Expr::Step(step) => axis_step(step, ctx),
        Expr::Slash(base, step) => {
            let items = evaluate(base, ctx)?;
            let size = items.len();
            let mut result = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                if !item.is_node() {
                    return Err("path step applied to an atomic value".to_string());
                }
                result.extend(evaluate(step, &ctx.focus(item, i + 1, size))?);
            }
            if result.iter().all(Item::is_node) {
                document_order(&mut result);
            }
            Ok(result)
        }
        Expr::Filter(primary, predicates) => {
            let mut items = evaluate(primary, ctx)?;
            for predicate in predicates {
                items = filter(items, predicate, ctx)?;
            }
            Ok(items)
        }
        Expr::Sequence(parts) => {
            let mut result = Vec::new();
            for part in parts {
                result.extend(evaluate(part, ctx)?);
            }
            Ok(result)
        }
        Expr::Union(left, right) => {
            let mut result = evaluate(left, ctx)?;
            result.extend(evaluate(right, ctx)?);
            if !result.iter().all(Item::is_node) {
                return Err("'|' requires node operands".to_string());
            }
            document_order(&mut result);
            Ok(result)
        }
        Expr::Or(left, right) => {
            let value = effective_boolean(&evaluate(left, ctx)?)? || effective_boolean(&evaluate(right, ctx)?)?;
            Ok(vec![Item::Boolean(value)])
        }
        Expr::And(left, right) => {
            let value = effective_boolean(&evaluate(left, ctx)?)? && effective_boolean(&evaluate(right, ctx)?)?;
            Ok(vec![Item::Boolean(value)])
        }
        Expr::General(comparison, left, right) => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            Ok(vec![Item::Boolean(general_compare(*comparison, &left, &right)?)])
        }
        Expr::Value(comparison, left, right) => {
            let (Some(left), Some(right)) = (singleton(evaluate(left, ctx)?)?, singleton(evaluate(right, ctx)?)?) else {
                return Ok(Vec::new());
            };
            Ok(vec![Item::Boolean(compare_items(*comparison, &left, &right))])
        }
        Expr::Arithmetic(op, left, right) => {
            let (Some(left), Some(right)) = (singleton(evaluate(left, ctx)?)?, singleton(evaluate(right, ctx)?)?) else {
                return Ok(Vec::new());
            };
            let (a, b) = (left.number_value(), right.number_value());
            let value = match op {
                Arithmetic::Add => a + b,
                Arithmetic::Subtract => a - b,
                Arithmetic::Multiply => a * b,
                Arithmetic::Divide => a / b,
                Arithmetic::Modulo => a % b,
            };
            Ok(vec![Item::Number(value)])
        }
        Expr::Negate(operand) => match singleton(evaluate(operand, ctx)?)? {
            Some(item) => Ok(vec![Item::Number(-item.number_value())]),
            None => Ok(Vec::new()),
        },
        Expr::Call(function, arguments) => call(*function, arguments, ctx),
    }
}

/// Effective boolean value of a sequence
pub fn effective_boolean(items: &[Item<'_, '_>]) -> EvalResult<bool> {
    match items {
        [] => Ok(false),
        [first, ..] if first.is_node() => Ok(true),
        [single] => Ok(item_boolean(single)),
        _ => Err("effective boolean value of several atomic values".to_string()),
    }
}

fn item_boolean(item: &Item<'_, '_>) -> bool {
    match item {
        Item::Boolean(value) => *value,
        Item::Number(value) => *value != 0.0 && !value.is_nan(),
        Item::String(value) => !value.is_empty(),
        Item::Node(_) | Item::Attribute { .. } => true,
    }
}

fn singleton<'a, 'input>(items: Sequence<'a, 'input>) -> EvalResult<Option<Item<'a, 'input>>> {
    if items.len() > 1 {
        return Err(format!("expected at most one item, found {}", items.len()));
    }
    Ok(items.into_iter().next())
}

fn document_order(items: &mut Sequence<'_, '_>) {
    items.sort_by_key(Item::order_key);
    items.dedup_by_key(|item| item.order_key());
}

fn filter<'a, 'input>(
    items: Sequence<'a, 'input>,
    predicate: &Expr,
    ctx: &Context<'_, 'a, 'input>,
) -> EvalResult<Sequence<'a, 'input>> {
    let size = items.len();
    let mut kept = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let result = evaluate(predicate, &ctx.focus(item.clone(), i + 1, size))?;
        let keep = match result.as_slice() {
            [Item::Number(position)] => *position == (i + 1) as f64,
            _ => effective_boolean(&result)?,
        };
        if keep {
            kept.push(item);
        }
    }
    Ok(kept)
}

fn axis_step<'a, 'input>(step: &Step, ctx: &Context<'_, 'a, 'input>) -> EvalResult<Sequence<'a, 'input>> {
    let candidates = match &ctx.item {
        Item::Node(node) => node_axis(*node, step.axis),
        Item::Attribute { owner, .. } => attribute_axis(&ctx.item, *owner, step.axis),
        _ => return Err("axis step applied to an atomic value".to_string()),
    };

    let mut selected: Sequence<'a, 'input> = candidates
        .into_iter()
        .filter(|item| matches_test(item, &step.test, step.axis))
        .collect();
    for predicate in &step.predicates {
        selected = filter(selected, predicate, ctx)?;
    }
    if step.axis.is_reverse() {
        selected.reverse();
    }
    Ok(selected)
}

/// Nodes on `axis` from `node`, nearest first
fn node_axis<'a, 'input>(node: Node<'a, 'input>, axis: Axis) -> Sequence<'a, 'input> {
    let nodes: Vec<Node<'a, 'input>> = match axis {
        Axis::Child => node.children().collect(),
        Axis::Descendant => node.descendants().skip(1).collect(),
        Axis::DescendantOrSelf => node.descendants().collect(),
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor => successors(node.parent(), |n| n.parent()).collect(),
        Axis::AncestorOrSelf => successors(Some(node), |n| n.parent()).collect(),
        Axis::FollowingSibling => successors(node.next_sibling(), |n| n.next_sibling()).collect(),
        Axis::PrecedingSibling => successors(node.prev_sibling(), |n| n.prev_sibling()).collect(),
        Axis::Following => following(node),
        Axis::Preceding => preceding(node),
        Axis::SelfNode => vec![node],
        Axis::Attribute => {
            return (0..node.attributes().len())
                .map(|index| Item::Attribute { owner: node, index })
                .collect();
        }
    };
    nodes.into_iter().map(Item::Node).collect()
}

fn attribute_axis<'a, 'input>(
    attribute: &Item<'a, 'input>,
    owner: Node<'a, 'input>,
    axis: Axis,
) -> Sequence<'a, 'input> {
    match axis {
        Axis::SelfNode => vec![attribute.clone()],
        Axis::Parent => vec![Item::Node(owner)],
        Axis::Ancestor => node_axis(owner, Axis::AncestorOrSelf),
        Axis::AncestorOrSelf => {
            let mut items = vec![attribute.clone()];
            items.extend(node_axis(owner, Axis::AncestorOrSelf));
            items
        }
        Axis::Following => {
            let mut items = node_axis(owner, Axis::Descendant);
            items.extend(node_axis(owner, Axis::Following));
            items
        }
        Axis::Preceding => node_axis(owner, Axis::Preceding),
        _ => Vec::new(),
    }
}

fn following<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    let mut nodes = Vec::new();
    for ancestor in successors(Some(node), |n| n.parent()) {
        for sibling in successors(ancestor.next_sibling(), |n| n.next_sibling()) {
            nodes.extend(sibling.descendants());
        }
    }
    nodes
}

/// Preceding nodes in reverse document order
fn preceding<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    let mut nodes = Vec::new();
    for ancestor in successors(Some(node), |n| n.parent()) {
        for sibling in successors(ancestor.prev_sibling(), |n| n.prev_sibling()) {
            let mut subtree: Vec<_> = sibling.descendants().collect();
            subtree.reverse();
            nodes.extend(subtree);
        }
    }
    nodes
}

fn matches_test(item: &Item<'_, '_>, test: &NodeTest, axis: Axis) -> bool {
    match item {
        Item::Attribute { .. } => {
            let Some(attribute) = item.attribute() else {
                return false;
            };
            match test {
                NodeTest::Node => true,
                _ if axis != Axis::Attribute => false,
                NodeTest::Any => true,
                NodeTest::Name { namespace, local } => {
                    attribute.namespace() == namespace.as_deref() && attribute.name() == local
                }
                NodeTest::Namespace(uri) => attribute.namespace() == Some(uri.as_str()),
                NodeTest::Local(local) => attribute.name() == local,
                _ => false,
            }
        }
        Item::Node(node) => match test {
            NodeTest::Node => true,
            NodeTest::Text => node.is_text(),
            NodeTest::Comment => node.is_comment(),
            NodeTest::ProcessingInstruction => node.is_pi(),
            NodeTest::Any => node.is_element(),
            NodeTest::Name { namespace, local } => {
                node.is_element()
                    && node.tag_name().namespace() == namespace.as_deref()
                    && node.tag_name().name() == local
            }
            NodeTest::Namespace(uri) => node.is_element() && node.tag_name().namespace() == Some(uri.as_str()),
            NodeTest::Local(local) => node.is_element() && node.tag_name().name() == local,
        },
        _ => false,
    }
}

fn general_compare(comparison: Comparison, left: &[Item<'_, '_>], right: &[Item<'_, '_>]) -> EvalResult<bool> {
    fn is_boolean(items: &[Item<'_, '_>]) -> bool {
        matches!(items, [Item::Boolean(_)])
    }

    if is_boolean(left) || is_boolean(right) {
        let (a, b) = (effective_boolean(left)?, effective_boolean(right)?);
        return Ok(compare_ordered(comparison, &a, &b));
    }
    Ok(left
        .iter()
        .any(|l| right.iter().any(|r| compare_items(comparison, l, r))))
}

fn compare_items(comparison: Comparison, left: &Item<'_, '_>, right: &Item<'_, '_>) -> bool {
    match (left, right) {
        (Item::Boolean(_), _) | (_, Item::Boolean(_)) => {
            compare_ordered(comparison, &item_boolean(left), &item_boolean(right))
        }
        (Item::Number(_), _) | (_, Item::Number(_)) => {
            compare_numbers(comparison, left.number_value(), right.number_value())
        }
        _ => {
            let (a, b) = (left.string_value(), right.string_value());
            match comparison {
                Comparison::Eq => a == b,
                Comparison::Ne => a != b,
                _ => {
                    let (x, y) = (to_number(&a), to_number(&b));
                    if x.is_nan() || y.is_nan() {
                        compare_ordered(comparison, &a, &b)
                    } else {
                        compare_numbers(comparison, x, y)
                    }
                }
            }
        }
    }
}

fn compare_numbers(comparison: Comparison, a: f64, b: f64) -> bool {
    match comparison {
        Comparison::Eq => a == b,
        Comparison::Ne => a != b,
        Comparison::Lt => a < b,
        Comparison::Le => a <= b,
        Comparison::Gt => a > b,
        Comparison::Ge => a >= b,
    }
}

fn compare_ordered<T: PartialOrd>(comparison: Comparison, a: &T, b: &T) -> bool {
    match comparison {
        Comparison::Eq => a == b,
        Comparison::Ne => a != b,
        Comparison::Lt => a < b,
        Comparison::Le => a <= b,
        Comparison::Gt => a > b,
        Comparison::Ge => a >= b,
    }
}

fn call<'a, 'input>(
    function: Function,
    arguments: &[Expr],
    ctx: &Context<'_, 'a, 'input>,
) -> EvalResult<Sequence<'a, 'input>> {
    let argument = |i: usize| -> EvalResult<Sequence<'a, 'input>> { evaluate(&arguments[i], ctx) };
    // Single string argument, defaulting to the context item
    let string_argument = |i: usize| -> EvalResult<String> {
        match arguments.get(i) {
            Some(expr) => Ok(first_string(&evaluate(expr, ctx)?)),
            None => Ok(ctx.item.string_value()),
        }
    };
    let node_argument = || -> EvalResult<Option<Item<'a, 'input>>> {
        match arguments.first() {
            Some(expr) => Ok(evaluate(expr, ctx)?.into_iter().next()),
            None => Ok(Some(ctx.item.clone())),
        }
    };

    let string = |value: String| Ok(vec![Item::String(value)]);
    let boolean = |value: bool| Ok(vec![Item::Boolean(value)]);
    let number = |value: f64| Ok(vec![Item::Number(value)]);

    match function {
        Function::Count => number(argument(0)?.len() as f64),
        Function::Empty => boolean(argument(0)?.is_empty()),
        Function::Exists => boolean(!argument(0)?.is_empty()),
        Function::Not => boolean(!effective_boolean(&argument(0)?)?),
        Function::Boolean => boolean(effective_boolean(&argument(0)?)?),
        Function::True => boolean(true),
        Function::False => boolean(false),
        Function::String => string(string_argument(0)?),
        Function::StringLength => number(string_argument(0)?.chars().count() as f64),
        Function::NormalizeSpace => string(normalize_space(&string_argument(0)?)),
        Function::Concat => {
            let mut result = String::new();
            for i in 0..arguments.len() {
                result.push_str(&string_argument(i)?);
            }
            string(result)
        }
        Function::Contains => boolean(string_argument(0)?.contains(string_argument(1)?.as_str())),
        Function::StartsWith => boolean(string_argument(0)?.starts_with(string_argument(1)?.as_str())),
        Function::EndsWith => boolean(string_argument(0)?.ends_with(string_argument(1)?.as_str())),
        Function::SubstringBefore => {
            let (value, separator) = (string_argument(0)?, string_argument(1)?);
            string(value.split_once(separator.as_str()).map(|(before, _)| before.to_string()).unwrap_or_default())
        }
        Function::SubstringAfter => {
            let (value, separator) = (string_argument(0)?, string_argument(1)?);
            string(value.split_once(separator.as_str()).map(|(_, after)| after.to_string()).unwrap_or_default())
        }
        Function::Substring => {
            let value = string_argument(0)?;
            let start = round(first_number(&argument(1)?));
            let length = match arguments.get(2) {
                Some(_) => Some(round(first_number(&argument(2)?))),
                None => None,
            };
            let result = value
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let position = (*i + 1) as f64;
                    position >= start && length.is_none_or(|length| position < start + length)
                })
                .map(|(_, c)| c)
                .collect();
            string(result)
        }
        Function::Translate => {
            let value = string_argument(0)?;
            let from: Vec<char> = string_argument(1)?.chars().collect();
            let to: Vec<char> = string_argument(2)?.chars().collect();
            let result = value
                .chars()
                .filter_map(|c| match from.iter().position(|f| *f == c) {
                    Some(index) => to.get(index).copied(),
                    None => Some(c),
                })
                .collect();
            string(result)
        }
        Function::Number => match arguments.first() {
            Some(expr) => number(first_number(&evaluate(expr, ctx)?)),
            None => number(ctx.item.number_value()),
        },
        Function::Sum => number(argument(0)?.iter().map(Item::number_value).sum()),
        Function::Name => string(node_argument()?.map(|item| node_name(&item)).unwrap_or_default()),
        Function::LocalName => string(node_argument()?.map(|item| local_name(&item)).unwrap_or_default()),
        Function::NamespaceUri => string(node_argument()?.map(|item| namespace_uri(&item)).unwrap_or_default()),
        Function::Matches => {
            let value = string_argument(0)?;
            let pattern = string_argument(1)?;
            let flags = match arguments.get(2) {
                Some(_) => string_argument(2)?,
                None => String::new(),
            };
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(flags.contains('i'))
                .dot_matches_new_line(flags.contains('s'))
                .multi_line(flags.contains('m'))
                .ignore_whitespace(flags.contains('x'))
                .build()
                .map_err(|e| format!("invalid regular expression '{pattern}': {e}"))?;
            boolean(regex.is_match(&value))
        }
        Function::LowerCase => string(string_argument(0)?.to_lowercase()),
        Function::UpperCase => string(string_argument(0)?.to_uppercase()),
        Function::StringJoin => {
            let separator = match arguments.get(1) {
                Some(_) => string_argument(1)?,
                None => String::new(),
            };
            let parts: Vec<String> = argument(0)?.iter().map(Item::string_value).collect();
            string(parts.join(&separator))
        }
        Function::DistinctValues => {
            let mut seen = HashSet::new();
            let mut result = Vec::new();
            for item in argument(0)? {
                let value = item.string_value();
                if seen.insert(value.clone()) {
                    result.push(match item {
                        Item::Number(_) | Item::Boolean(_) => item,
                        _ => Item::String(value),
                    });
                }
            }
            Ok(result)
        }
        Function::Position => number(ctx.position as f64),
        Function::Last => number(ctx.size as f64),
        Function::Current => Ok(vec![ctx.current.clone()]),
        Function::Key => {
            let name = string_argument(0)?;
            let keys = ctx.keys.ok_or_else(|| format!("key '{name}' is not declared"))?;
            let index = keys.index(&name, ctx.variables)?;
            let top = match arguments.get(2) {
                Some(expr) => match evaluate(expr, ctx)?.into_iter().next() {
                    Some(top) if top.is_node() => Some(top),
                    Some(_) => return Err("third argument of key() must be a node".to_string()),
                    None => return Ok(Vec::new()),
                },
                None => None,
            };

            let mut result = Vec::new();
            for value in argument(1)? {
                if let Some(items) = index.get(&value.string_value()) {
                    result.extend(items.iter().cloned());
                }
            }
            if let Some(top) = top {
                result.retain(|item| within(item, &top));
            }
            document_order(&mut result);
            Ok(result)
        }
    }
}

/// Whether `item` is `top` or lies in the subtree below it
fn within(item: &Item<'_, '_>, top: &Item<'_, '_>) -> bool {
    let node = match item {
        Item::Node(node) => *node,
        Item::Attribute { owner, .. } => *owner,
        _ => return false,
    };
    match top {
        Item::Node(top) => node.ancestors().any(|ancestor| ancestor == *top),
        _ => item.order_key() == top.order_key(),
    }
}

fn first_string(items: &[Item<'_, '_>]) -> String {
    items.first().map(Item::string_value).unwrap_or_default()
}

fn first_number(items: &[Item<'_, '_>]) -> f64 {
    items.first().map(Item::number_value).unwrap_or(f64::NAN)
}

fn round(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn node_name(item: &Item<'_, '_>) -> String {
    match item {
        Item::Node(node) if node.is_element() => qualified_name(*node),
        Item::Node(node) => node.pi().map(|pi| pi.target.to_string()).unwrap_or_default(),
        Item::Attribute { owner, .. } => {
            let Some(attribute) = item.attribute() else {
                return String::new();
            };
            let prefix = attribute.namespace().and_then(|uri| {
                if uri == roxmltree::NS_XML_URI {
                    Some("xml")
                } else {
                    owner.namespaces().filter(|ns| ns.uri() == uri).find_map(|ns| ns.name())
                }
            });
            match prefix {
                Some(prefix) => format!("{prefix}:{}", attribute.name()),
                None => attribute.name().to_string(),
            }
        }
        _ => String::new(),
    }
}

fn local_name(item: &Item<'_, '_>) -> String {
    match item {
        Item::Node(node) if node.is_element() => node.tag_name().name().to_string(),
        Item::Node(node) => node.pi().map(|pi| pi.target.to_string()).unwrap_or_default(),
        Item::Attribute { .. } => item.attribute().map(|a| a.name().to_string()).unwrap_or_default(),
        _ => String::new(),
    }
}

fn namespace_uri(item: &Item<'_, '_>) -> String {
    let uri = match item {
        Item::Node(node) => node.tag_name().namespace(),
        Item::Attribute { .. } => item.attribute().and_then(|a| a.namespace()),
        _ => None,
    };
    uri.unwrap_or_default().to_string()
}

fn node_string(node: Node<'_, '_>) -> String {
    if node.is_element() || node.is_root() {
        node.descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect()
    } else if let Some(pi) = node.pi() {
        pi.value.unwrap_or_default().to_string()
    } else {
        node.text().unwrap_or_default().to_string()
    }
}

pub fn normalize_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Numeric value of a string; anything but an optionally signed decimal
/// number is NaN
pub fn to_number(value: &str) -> f64 {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
