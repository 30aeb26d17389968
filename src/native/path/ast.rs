//! Path expression syntax tree

/// Compiled path expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    /// The root of the context node's document
    Root,
    /// One axis step relative to the context item
    Step(Step),
    /// `base/step`: evaluate `step` once per item of `base`
    Slash(Box<Expr>, Box<Expr>),
    /// A primary expression followed by predicates
    Filter(Box<Expr>, Vec<Expr>),
    /// `a, b`
    Sequence(Vec<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    /// Existential comparison (`=`, `<`, ...)
    General(Comparison, Box<Expr>, Box<Expr>),
    /// Singleton comparison (`eq`, `lt`, ...)
    Value(Comparison, Box<Expr>, Box<Expr>),
    Arithmetic(Arithmetic, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    SelfNode,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        let axis = match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "self" => Axis::SelfNode,
            _ => return None,
        };
        Some(axis)
    }

    /// Reverse axes number their predicate positions from the context node
    /// outwards
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Expanded name; `namespace` is resolved when the expression compiles
    Name {
        namespace: Option<String>,
        local: String,
    },
    /// `prefix:*`
    Namespace(String),
    /// `*:local`
    Local(String),
    /// `*`
    Any,
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`
    ProcessingInstruction,
}

impl Step {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

/// Library functions, with their arity checked at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    Empty,
    Exists,
    Not,
    Boolean,
    True,
    False,
    String,
    StringLength,
    NormalizeSpace,
    Concat,
    Contains,
    StartsWith,
    EndsWith,
    SubstringBefore,
    SubstringAfter,
    Substring,
    Translate,
    Number,
    Sum,
    Name,
    LocalName,
    NamespaceUri,
    Matches,
    LowerCase,
    UpperCase,
    StringJoin,
    DistinctValues,
    Position,
    Last,
    Current,
    Key,
}

impl Function {
    /// Look up a function by name, returning it with its minimum and
    /// maximum argument count (`None` for variadic)
    pub fn lookup(name: &str) -> Option<(Function, usize, Option<usize>)> {
        let name = name.strip_prefix("fn:").unwrap_or(name);
        let entry = match name {
            "count" => (Function::Count, 1, Some(1)),
            "empty" => (Function::Empty, 1, Some(1)),
            "exists" => (Function::Exists, 1, Some(1)),
            "not" => (Function::Not, 1, Some(1)),
            "boolean" => (Function::Boolean, 1, Some(1)),
            "true" => (Function::True, 0, Some(0)),
            "false" => (Function::False, 0, Some(0)),
            "string" => (Function::String, 0, Some(1)),
            "string-length" => (Function::StringLength, 0, Some(1)),
            "normalize-space" => (Function::NormalizeSpace, 0, Some(1)),
            "concat" => (Function::Concat, 2, None),
            "contains" => (Function::Contains, 2, Some(2)),
            "starts-with" => (Function::StartsWith, 2, Some(2)),
            "ends-with" => (Function::EndsWith, 2, Some(2)),
            "substring-before" => (Function::SubstringBefore, 2, Some(2)),
            "substring-after" => (Function::SubstringAfter, 2, Some(2)),
            "substring" => (Function::Substring, 2, Some(3)),
            "translate" => (Function::Translate, 3, Some(3)),
            "number" => (Function::Number, 0, Some(1)),
            "sum" => (Function::Sum, 1, Some(1)),
            "name" => (Function::Name, 0, Some(1)),
            "local-name" => (Function::LocalName, 0, Some(1)),
            "namespace-uri" => (Function::NamespaceUri, 0, Some(1)),
            "matches" => (Function::Matches, 2, Some(3)),
            "lower-case" => (Function::LowerCase, 1, Some(1)),
            "upper-case" => (Function::UpperCase, 1, Some(1)),
            "string-join" => (Function::StringJoin, 1, Some(2)),
            "distinct-values" => (Function::DistinctValues, 1, Some(1)),
            "position" => (Function::Position, 0, Some(0)),
            "last" => (Function::Last, 0, Some(0)),
            "current" => (Function::Current, 0, Some(0)),
            "key" => (Function::Key, 2, Some(3)),
            _ => return None,
        };
        Some(entry)
    }
}
