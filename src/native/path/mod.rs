//! Path expressions
//!
//! A compact XPath subset used for rule contexts, assertion tests, variable
//! values and message parts. Expressions compile once into an [`Expr`] tree
//! (names resolved, functions and arities checked) and are then evaluated
//! against `roxmltree` nodes any number of times.

pub mod ast;
pub mod eval;
pub mod lexer;

use std::collections::HashMap;

use roxmltree::Node;

use crate::engine::EngineError;

pub use ast::{Axis, Expr, Function, NodeTest, Step};
pub use eval::{Item, KeyTable, Sequence, Variables};
use ast::{Arithmetic, Comparison};
use lexer::Token;

/// Prefix bindings visible to an expression
#[derive(Debug, Clone)]
pub struct Namespaces {
    bindings: HashMap<String, String>,
}

impl Namespaces {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("xml".to_string(), roxmltree::NS_XML_URI.to_string());
        Self { bindings }
    }

    pub fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.insert(prefix.to_string(), uri.to_string());
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

/// One declaration of a named key: the nodes matching `pattern`, indexed by
/// the string values `value` yields for them
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub pattern: Expression,
    pub value: Expression,
}

/// Key declarations by name; declarations sharing a name are combined
pub type Keys = HashMap<String, Vec<KeyDefinition>>;

/// A compiled expression together with its source text
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// Evaluate with `node` as context item and current node
    pub fn evaluate<'a, 'input>(
        &self,
        node: Node<'a, 'input>,
        variables: &Variables<'a, 'input>,
    ) -> Result<Sequence<'a, 'input>, EngineError> {
        self.evaluate_item(Item::Node(node), variables, None)
    }

    /// Evaluate with `item` as context item and current node
    ///
    /// `key()` looks its keys up in `keys`; without a table every call to it
    /// fails.
    pub fn evaluate_item<'a, 'input>(
        &self,
        item: Item<'a, 'input>,
        variables: &Variables<'a, 'input>,
        keys: Option<&KeyTable<'_, 'a, 'input>>,
    ) -> Result<Sequence<'a, 'input>, EngineError> {
        let context = eval::Context::new(item, variables, keys);
        eval::evaluate(&self.root, &context).map_err(|message| self.error(message))
    }

    /// Effective boolean value of the result
    pub fn evaluate_boolean<'a, 'input>(
        &self,
        item: Item<'a, 'input>,
        variables: &Variables<'a, 'input>,
        keys: Option<&KeyTable<'_, 'a, 'input>>,
    ) -> Result<bool, EngineError> {
        let result = self.evaluate_item(item, variables, keys)?;
        eval::effective_boolean(&result).map_err(|message| self.error(message))
    }

    /// String values of the result items, separated by spaces
    pub fn evaluate_string<'a, 'input>(
        &self,
        item: Item<'a, 'input>,
        variables: &Variables<'a, 'input>,
        keys: Option<&KeyTable<'_, 'a, 'input>>,
    ) -> Result<String, EngineError> {
        let result = self.evaluate_item(item, variables, keys)?;
        Ok(result.iter().map(Item::string_value).collect::<Vec<_>>().join(" "))
    }

    fn error(&self, message: String) -> EngineError {
        EngineError::Path {
            expression: self.source.clone(),
            message,
        }
    }
}

/// Compile an expression
pub fn compile(expression: &str, namespaces: &Namespaces) -> Result<Expression, EngineError> {
    let error = |message: String| EngineError::Path {
        expression: expression.to_string(),
        message,
    };
    let tokens = lexer::tokenize(expression).map_err(error)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        namespaces,
    };
    let root = parser.parse_expr().map_err(error)?;
    if let Some(token) = parser.peek() {
        return Err(error(format!("unexpected {token:?}")));
    }
    Ok(Expression {
        source: expression.to_string(),
        root,
    })
}

/// Compile a rule context as a match pattern
///
/// Every relative branch of the pattern is anchored with `//`, so that
/// evaluating the result from any node of a document selects exactly the
/// nodes the pattern matches.
pub fn compile_pattern(pattern: &str, namespaces: &Namespaces) -> Result<Expression, EngineError> {
    let expression = compile(pattern, namespaces)?;
    Ok(Expression {
        source: expression.source,
        root: anchor(expression.root),
    })
}

fn anchor(expr: Expr) -> Expr {
    match expr {
        Expr::Union(left, right) => Expr::Union(Box::new(anchor(*left)), Box::new(anchor(*right))),
        expr if is_absolute(&expr) => expr,
        expr => Expr::Slash(Box::new(descendants_of_root()), Box::new(expr)),
    }
}

fn is_absolute(expr: &Expr) -> bool {
    match expr {
        Expr::Root => true,
        Expr::Slash(base, _) => is_absolute(base),
        _ => false,
    }
}

fn descendants_of_root() -> Expr {
    Expr::Slash(
        Box::new(Expr::Root),
        Box::new(Expr::Step(Step::new(Axis::DescendantOrSelf, NodeTest::Node))),
    )
}

struct Parser<'n> {
    tokens: Vec<Token>,
    pos: usize,
    namespaces: &'n Namespaces,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut items = vec![self.parse_or()?];
        while self.eat(&Token::Comma) {
            items.push(self.parse_or()?);
        }
        if items.len() == 1 {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Sequence(items))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;
        while self.eat(&Token::And) {
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_additive()?;
        let (general, comparison) = match self.peek() {
            Some(Token::Eq) => (true, Comparison::Eq),
            Some(Token::NotEq) => (true, Comparison::Ne),
            Some(Token::Lt) => (true, Comparison::Lt),
            Some(Token::LtEq) => (true, Comparison::Le),
            Some(Token::Gt) => (true, Comparison::Gt),
            Some(Token::GtEq) => (true, Comparison::Ge),
            Some(Token::ValueEq) => (false, Comparison::Eq),
            Some(Token::ValueNe) => (false, Comparison::Ne),
            Some(Token::ValueLt) => (false, Comparison::Lt),
            Some(Token::ValueLe) => (false, Comparison::Le),
            Some(Token::ValueGt) => (false, Comparison::Gt),
            Some(Token::ValueGe) => (false, Comparison::Ge),
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        let (left, right) = (Box::new(left), Box::new(right));
        Ok(if general {
            Expr::General(comparison, left, right)
        } else {
            Expr::Value(comparison, left, right)
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Arithmetic::Add,
                Some(Token::Minus) => Arithmetic::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Arithmetic(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => Arithmetic::Multiply,
                Some(Token::Div) => Arithmetic::Divide,
                Some(Token::Mod) => Arithmetic::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arithmetic(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.parse_unary();
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.peek().is_some_and(starts_step) {
                    self.parse_relative(Some(Expr::Root))
                } else {
                    Ok(Expr::Root)
                }
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                self.parse_relative(Some(descendants_of_root()))
            }
            _ => self.parse_relative(None),
        }
    }

    fn parse_relative(&mut self, base: Option<Expr>) -> Result<Expr, String> {
        let first = self.parse_step_expr()?;
        let mut path = match base {
            Some(base) => Expr::Slash(Box::new(base), Box::new(first)),
            None => first,
        };
        loop {
            if self.eat(&Token::Slash) {
                let step = self.parse_step_expr()?;
                path = Expr::Slash(Box::new(path), Box::new(step));
            } else if self.eat(&Token::DoubleSlash) {
                let any = Expr::Step(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                let step = self.parse_step_expr()?;
                path = Expr::Slash(
                    Box::new(Expr::Slash(Box::new(path), Box::new(any))),
                    Box::new(step),
                );
            } else {
                return Ok(path);
            }
        }
    }

    fn parse_step_expr(&mut self) -> Result<Expr, String> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;

        match token {
            Token::Dot => {
                self.pos += 1;
                self.finish_step(Axis::SelfNode, NodeTest::Node)
            }
            Token::DotDot => {
                self.pos += 1;
                self.finish_step(Axis::Parent, NodeTest::Node)
            }
            Token::At => {
                self.pos += 1;
                let test = self.parse_node_test()?;
                self.finish_step(Axis::Attribute, test)
            }
            Token::Name(name) if self.peek_at(1) == Some(&Token::ColonColon) => {
                let axis = Axis::from_name(&name).ok_or_else(|| format!("unknown axis '{name}'"))?;
                self.pos += 2;
                let test = self.parse_node_test()?;
                self.finish_step(axis, test)
            }
            Token::Name(name) if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(&name) => {
                let call = self.parse_call(&name)?;
                self.finish_filter(call)
            }
            Token::Name(_) | Token::PrefixWildcard(_) | Token::LocalWildcard(_) | Token::Star => {
                let test = self.parse_node_test()?;
                self.finish_step(Axis::Child, test)
            }
            Token::Literal(value) => {
                self.pos += 1;
                self.finish_filter(Expr::Literal(value))
            }
            Token::Number(value) => {
                self.pos += 1;
                self.finish_filter(Expr::Number(value))
            }
            Token::Variable(name) => {
                self.pos += 1;
                self.finish_filter(Expr::Variable(name))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = if self.peek() == Some(&Token::RParen) {
                    Expr::Sequence(Vec::new())
                } else {
                    self.parse_expr()?
                };
                self.expect(&Token::RParen)?;
                self.finish_filter(inner)
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }

    fn finish_step(&mut self, axis: Axis, test: NodeTest) -> Result<Expr, String> {
        let predicates = self.parse_predicates()?;
        Ok(Expr::Step(Step { axis, test, predicates }))
    }

    fn finish_filter(&mut self, primary: Expr) -> Result<Expr, String> {
        let predicates = self.parse_predicates()?;
        if predicates.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter(Box::new(primary), predicates))
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, String> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, String> {
        match self.next() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::PrefixWildcard(prefix)) => Ok(NodeTest::Namespace(self.resolve_prefix(&prefix)?.to_string())),
            Some(Token::LocalWildcard(local)) => Ok(NodeTest::Local(local)),
            Some(Token::Name(name)) if is_node_type(&name) && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                if name == "processing-instruction" {
                    if let Some(Token::Literal(_)) = self.peek() {
                        self.pos += 1;
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(match name.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "processing-instruction" => NodeTest::ProcessingInstruction,
                    _ => NodeTest::Node,
                })
            }
            Some(Token::Name(name)) => {
                let (namespace, local) = match name.split_once(':') {
                    Some((prefix, local)) => (Some(self.resolve_prefix(prefix)?.to_string()), local.to_string()),
                    None => (None, name),
                };
                Ok(NodeTest::Name { namespace, local })
            }
            other => Err(format!("expected a node test, found {other:?}")),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, String> {
        let (function, min, max) =
            Function::lookup(name).ok_or_else(|| format!("unknown function '{name}'"))?;
        self.pos += 2;

        let mut arguments = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                arguments.push(self.parse_or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }

        let count = arguments.len();
        if count < min || max.is_some_and(|max| count > max) {
            return Err(format!("wrong number of arguments for '{name}': {count}"));
        }
        Ok(Expr::Call(function, arguments))
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<&str, String> {
        self.namespaces
            .lookup(prefix)
            .ok_or_else(|| format!("unknown namespace prefix '{prefix}'"))
    }
}

fn starts_step(token: &Token) -> bool {
    matches!(
        token,
        Token::Name(_)
            | Token::PrefixWildcard(_)
            | Token::LocalWildcard(_)
            | Token::Star
            | Token::At
            | Token::Dot
            | Token::DotDot
    )
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespaces() -> Namespaces {
        let mut ns = Namespaces::new();
        ns.bind("cmd", "http://www.clarin.eu/cmd/1");
        ns
    }

    #[test]
    fn test_prefixes_are_resolved() {
        let expression = compile("cmd:Header", &namespaces()).unwrap();
        assert_eq!(
            expression.expr(),
            &Expr::Step(Step::new(
                Axis::Child,
                NodeTest::Name {
                    namespace: Some("http://www.clarin.eu/cmd/1".to_string()),
                    local: "Header".to_string(),
                }
            ))
        );
    }

    #[test]
    fn test_compile_errors() {
        let ns = namespaces();
        for bad in ["foo:Bar", "unknown-fn(1)", "count()", "concat('a')", "a[", "1 +", "a b", "bogus::a"] {
            let result = compile(bad, &ns);
            assert!(
                matches!(result, Err(EngineError::Path { .. })),
                "expected an error for {bad}"
            );
        }
    }

    #[test]
    fn test_abbreviated_paths() {
        let ns = namespaces();
        assert_eq!(compile("/", &ns).unwrap().expr(), &Expr::Root);
        assert!(matches!(compile("//a", &ns).unwrap().expr(), Expr::Slash(..)));
        assert!(matches!(
            compile("..", &ns).unwrap().expr(),
            Expr::Step(Step { axis: Axis::Parent, .. })
        ));
        assert!(matches!(compile("(a, b)[1]", &ns).unwrap().expr(), Expr::Filter(..)));
    }

    #[test]
    fn test_pattern_anchoring() {
        let ns = namespaces();
        let pattern = compile_pattern("a | /b", &ns).unwrap();
        let Expr::Union(left, right) = pattern.expr() else {
            panic!("expected a union");
        };
        assert!(is_absolute(left));
        assert_eq!(**right, compile("/b", &ns).unwrap().root);
    }
}
