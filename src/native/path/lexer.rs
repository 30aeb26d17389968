//! Path expression lexer
//!
//! Operator names (`and`, `div`, ...) and `*` are only operators when they
//! follow an operand; everywhere else they are names and name tests.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Plain or prefixed name, e.g. `Component`, `cmd:Header`
    Name(String),
    /// `prefix:*`
    PrefixWildcard(String),
    /// `*:local`
    LocalWildcard(String),
    /// `*` as a name test
    Star,
    Number(f64),
    Literal(String),
    Variable(String),
    Slash,
    DoubleSlash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Pipe,
    Plus,
    Minus,
    Multiply,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Div,
    Mod,
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
}

impl Token {
    /// Whether an operand may follow this token
    fn expects_operand(&self) -> bool {
        matches!(
            self,
            Token::At
                | Token::ColonColon
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Multiply
                | Token::Eq
                | Token::NotEq
                | Token::Lt
                | Token::LtEq
                | Token::Gt
                | Token::GtEq
                | Token::And
                | Token::Or
                | Token::Div
                | Token::Mod
                | Token::ValueEq
                | Token::ValueNe
                | Token::ValueLt
                | Token::ValueLe
                | Token::ValueGt
                | Token::ValueGe
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{b7}')
}

fn operator_name(name: &str) -> Option<Token> {
    let token = match name {
        "and" => Token::And,
        "or" => Token::Or,
        "div" => Token::Div,
        "mod" => Token::Mod,
        "eq" => Token::ValueEq,
        "ne" => Token::ValueNe,
        "lt" => Token::ValueLt,
        "le" => Token::ValueLe,
        "gt" => Token::ValueGt,
        "ge" => Token::ValueGe,
        _ => return None,
    };
    Some(token)
}

/// Split a path expression into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let operand_expected = tokens.last().is_none_or(Token::expects_operand);
        let peek = chars.get(i + 1).copied();

        let token = match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
                continue;
            }
            '(' if peek == Some(':') => {
                // XPath comment
                let end = find_comment_end(&chars, i + 2)
                    .ok_or_else(|| "unterminated comment".to_string())?;
                i = end;
                continue;
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if peek == Some('=') => {
                i += 2;
                Token::NotEq
            }
            '<' if peek == Some('=') => {
                i += 2;
                Token::LtEq
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if peek == Some('=') => {
                i += 2;
                Token::GtEq
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            ':' if peek == Some(':') => {
                i += 2;
                Token::ColonColon
            }
            '/' if peek == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '.' if peek == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if peek.is_some_and(|p| p.is_ascii_digit()) => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '"' | '\'' => {
                let (literal, end) = read_literal(&chars, i)?;
                i = end;
                Token::Literal(literal)
            }
            '$' => {
                let (name, end) = read_qname(&chars, i + 1);
                if name.is_empty() {
                    return Err("expected a variable name after '$'".to_string());
                }
                i = end;
                Token::Variable(name)
            }
            '*' if !operand_expected => {
                i += 1;
                Token::Multiply
            }
            '*' if peek == Some(':') && chars.get(i + 2).copied().is_some_and(is_name_start) => {
                let (local, end) = read_ncname(&chars, i + 2);
                i = end;
                Token::LocalWildcard(local)
            }
            '*' => {
                i += 1;
                Token::Star
            }
            c if c.is_ascii_digit() => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                let (name, end) = read_ncname(&chars, i);
                i = end;
                if !operand_expected {
                    if let Some(operator) = operator_name(&name) {
                        tokens.push(operator);
                        continue;
                    }
                }
                // prefix:* or prefix:local, but not axis::
                if chars.get(i) == Some(&':') && chars.get(i + 1) != Some(&':') {
                    match chars.get(i + 1) {
                        Some('*') => {
                            i += 2;
                            Token::PrefixWildcard(name)
                        }
                        Some(&next) if is_name_start(next) => {
                            let (local, end) = read_ncname(&chars, i + 1);
                            i = end;
                            Token::Name(format!("{name}:{local}"))
                        }
                        _ => return Err(format!("unexpected ':' after '{name}'")),
                    }
                } else {
                    Token::Name(name)
                }
            }
            other => return Err(format!("unexpected character '{other}'")),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn read_ncname(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && (if end == start { is_name_start(chars[end]) } else { is_name_char(chars[end]) }) {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn read_qname(chars: &[char], start: usize) -> (String, usize) {
    let (prefix, end) = read_ncname(chars, start);
    if !prefix.is_empty() && chars.get(end) == Some(&':') && chars.get(end + 1).copied().is_some_and(is_name_start) {
        let (local, end) = read_ncname(chars, end + 1);
        return (format!("{prefix}:{local}"), end);
    }
    (prefix, end)
}

fn read_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut end = start;
    let mut seen_dot = false;
    while end < chars.len() {
        match chars[end] {
            c if c.is_ascii_digit() => end += 1,
            '.' if !seen_dot && chars.get(end + 1) != Some(&'.') => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    let text: String = chars[start..end].iter().collect();
    (text.parse().unwrap_or(f64::NAN), end)
}

/// Quoted literal; a doubled quote stands for itself
fn read_literal(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut literal = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err("unterminated string literal".to_string()),
            Some(&c) if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    literal.push(quote);
                    i += 2;
                } else {
                    return Ok((literal, i + 1));
                }
            }
            Some(&c) => {
                literal.push(c);
                i += 1;
            }
        }
    }
}

fn find_comment_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('(', ':') => {
                depth += 1;
                i += 2;
            }
            (':', ')') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_path() {
        let tokens = tokenize("/cmd:CMD/Components//Item[@name]").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Slash,
                Token::Name("cmd:CMD".to_string()),
                Token::Slash,
                Token::Name("Components".to_string()),
                Token::DoubleSlash,
                Token::Name("Item".to_string()),
                Token::LBracket,
                Token::At,
                Token::Name("name".to_string()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_operator_names_depend_on_position() {
        let tokens = tokenize("and and or").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Name("and".to_string()), Token::And, Token::Name("or".to_string())]
        );

        let tokens = tokenize("* * *").unwrap();
        assert_eq!(tokens, vec![Token::Star, Token::Multiply, Token::Star]);
    }

    #[test]
    fn test_names_with_hyphens_and_axes() {
        let tokens = tokenize("following-sibling::Element-Name").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Name("following-sibling".to_string()),
                Token::ColonColon,
                Token::Name("Element-Name".to_string()),
            ]
        );
    }

    #[test]
    fn test_literals_numbers_and_wildcards() {
        let tokens = tokenize("'it''s' = 1.5 and $count >= .5 or cmd:* | *:Name").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Literal("it's".to_string()),
                Token::Eq,
                Token::Number(1.5),
                Token::And,
                Token::Variable("count".to_string()),
                Token::GtEq,
                Token::Number(0.5),
                Token::Or,
                Token::PrefixWildcard("cmd".to_string()),
                Token::Pipe,
                Token::LocalWildcard("Name".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("count(*) (: children (: nested :) :) > 1").unwrap();
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("$").is_err());
    }
}
