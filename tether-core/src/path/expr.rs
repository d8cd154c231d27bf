//! Path Expressions
//!
//! The declarative input to the compiler: a small expression AST and a parser
//! for the closure-like text forms callers write, e.g.
//!
//! ```text
//! x => x.next.is_true
//! (x) => x.next.is_true
//! |x| x.next.is_true
//! || vm.next.is_true        closed-over variable as the root
//! this.next.is_true
//! next.is_true              bare form, rooted at the root instance
//! ```
//!
//! The parser accepts a wider grammar than the compiler supports (method
//! calls, indexers, literals, unary and binary operators) so that an
//! unsupported expression is reported as an unsupported *shape* naming the
//! offending sub-expression, not as a syntax error.
//!
//! Expressions can also be loaded from their tagged JSON form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Str(String),
}

/// Expression AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// The lambda parameter.
    Parameter { name: String },
    /// A closed-over variable standing in for the root.
    Captured { name: String },
    /// `this` / `self`, or the implicit root of the bare form.
    This,
    Member {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Literal { value: Literal },
    Unary { op: String, operand: Box<Expr> },
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn parameter(name: &str) -> Self {
        Expr::Parameter {
            name: name.to_string(),
        }
    }

    pub fn captured(name: &str) -> Self {
        Expr::Captured {
            name: name.to_string(),
        }
    }

    pub fn this() -> Self {
        Expr::This
    }

    pub fn member(self, name: &str) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.to_string(),
        }
    }

    pub fn index(self, index: Expr) -> Self {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn call(self, method: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: Box::new(self),
            method: method.to_string(),
            args,
        }
    }

    pub fn string(value: &str) -> Self {
        Expr::Literal {
            value: Literal::Str(value.to_string()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Number(value) => write!(f, "{value}"),
            Literal::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Parameter { name } | Expr::Captured { name } => f.write_str(name),
            Expr::This => f.write_str("this"),
            Expr::Member { target, name } => write!(f, "{target}.{name}"),
            Expr::Index { target, index } => write!(f, "{target}[{index}]"),
            Expr::Call {
                target,
                method,
                args,
            } => {
                write!(f, "{target}.{method}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Literal { value } => write!(f, "{value}"),
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

/// A full path expression: an optional lambda parameter and a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathExpression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    pub body: Expr,
}

impl PathExpression {
    pub fn new(parameter: Option<&str>, body: Expr) -> Self {
        Self {
            parameter: parameter.map(str::to_string),
            body,
        }
    }

    /// Parse one of the text forms listed in the module docs.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        Parser {
            tokens,
            pos: 0,
            end: text.len(),
            scope: Scope::Bare,
            depth: 0,
            nodes: 0,
        }
        .parse_path()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(parameter) => write!(f, "{parameter} => {}", self.body),
            None => write!(f, "{}", self.body),
        }
    }
}

// ----------------------------------------------------------------------------
// Lexer
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    Arrow,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Op(&'static str),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "+", "-", "*", "/", "%", "<", ">", "!",
];

fn syntax(offset: usize, message: impl Into<String>) -> Error {
    Error::Syntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let rest = &text[offset..];
        let simple = match c {
            '.' => Some(Token::Dot),
            '|' => Some(Token::Pipe),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            _ => None,
        };

        if c.is_whitespace() {
            chars.next();
        } else if let Some(token) = simple {
            chars.next();
            tokens.push(Spanned { token, offset });
        } else if rest.starts_with("=>") {
            chars.next();
            chars.next();
            tokens.push(Spanned {
                token: Token::Arrow,
                offset,
            });
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !(c.is_alphanumeric() || c == '_') {
                    break;
                }
                ident.push(c);
                chars.next();
            }
            tokens.push(Spanned {
                token: Token::Ident(ident),
                offset,
            });
        } else if c.is_ascii_digit() {
            let mut literal = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !(c.is_ascii_digit() || c == '.' || c == '_') {
                    break;
                }
                literal.push(c);
                chars.next();
            }
            let number = literal
                .replace('_', "")
                .parse::<f64>()
                .map_err(|_| syntax(offset, format!("invalid number `{literal}`")))?;
            tokens.push(Spanned {
                token: Token::Number(number),
                offset,
            });
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, next)) = chars.next() {
                match next {
                    '\\' => match chars.next() {
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    },
                    q if q == c => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(syntax(offset, "unterminated string literal"));
            }
            tokens.push(Spanned {
                token: Token::Str(value),
                offset,
            });
        } else if let Some(&op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            for _ in 0..op.len() {
                chars.next();
            }
            tokens.push(Spanned {
                token: Token::Op(op),
                offset,
            });
        } else {
            return Err(syntax(offset, format!("unexpected character `{c}`")));
        }
    }

    Ok(tokens)
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

/// How a leading identifier in the body is interpreted.
#[derive(Debug, Clone)]
enum Scope {
    /// No lambda head: identifiers are attributes of the root.
    Bare,
    /// Inside a lambda: the parameter, `this`, or a captured variable.
    Lambda(Option<String>),
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    scope: Scope,
    /// Current recursion depth through `parse_unary`.
    depth: usize,
    /// AST nodes built so far; bounds the depth of the finished tree.
    nodes: usize,
}

const MAX_NESTING: usize = 64;
const MAX_NODES: usize = 512;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(syntax(self.offset(), format!("expected {what}, found {token:?}"))),
            None => Err(syntax(self.end, format!("expected {what}, found end of input"))),
        }
    }

    fn grow(&mut self) -> Result<()> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(syntax(self.offset(), "expression too large"));
        }
        Ok(())
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(syntax(self.offset(), format!("expected {what}"))),
        }
    }

    fn parse_path(mut self) -> Result<PathExpression> {
        let parameter = self.parse_head()?;
        if self.peek().is_none() {
            return Err(syntax(self.end, "expected a path body"));
        }
        let body = self.parse_expr()?;
        if self.peek().is_some() {
            return Err(syntax(self.offset(), "unexpected trailing input"));
        }
        Ok(PathExpression { parameter, body })
    }

    /// Consume a lambda head if present and set the scope accordingly.
    fn parse_head(&mut self) -> Result<Option<String>> {
        let parameter = match (self.peek(), self.peek_at(1), self.peek_at(2)) {
            // |x| body, || body
            (Some(Token::Pipe), _, _) => {
                self.pos += 1;
                let parameter = match self.peek() {
                    Some(Token::Ident(_)) => Some(self.ident("closure parameter")?),
                    _ => None,
                };
                self.expect(Token::Pipe, "`|`")?;
                parameter
            }
            // x => body
            (Some(Token::Ident(_)), Some(Token::Arrow), _) => {
                let parameter = self.ident("lambda parameter")?;
                self.pos += 1;
                Some(parameter)
            }
            // () => body
            (Some(Token::LParen), Some(Token::RParen), Some(Token::Arrow)) => {
                self.pos += 3;
                None
            }
            // (x) => body
            (Some(Token::LParen), Some(Token::Ident(_)), Some(Token::RParen))
                if self.peek_at(3) == Some(&Token::Arrow) =>
            {
                self.pos += 1;
                let parameter = self.ident("lambda parameter")?;
                self.pos += 2;
                Some(parameter)
            }
            _ => return Ok(None),
        };
        self.scope = Scope::Lambda(parameter.clone());
        Ok(parameter)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = op.to_string();
            if op == "!" {
                return Err(syntax(self.offset(), "`!` is not a binary operator"));
            }
            self.pos += 1;
            let rhs = self.parse_unary()?;
            self.grow()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.depth == MAX_NESTING {
            return Err(syntax(self.offset(), "expression nested too deeply"));
        }
        self.depth += 1;
        let expr = self.parse_operand();
        self.depth -= 1;
        expr
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op(op)) if *op == "!" || *op == "-" => {
                let op = op.to_string();
                self.pos += 1;
                let operand = self.parse_unary()?;
                self.grow()?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.ident("attribute name after `.`")?;
                    self.grow()?;
                    expr = if self.peek() == Some(&Token::LParen) {
                        let args = self.parse_args()?;
                        expr.call(&name, args)
                    } else {
                        expr.member(&name)
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "`]`")?;
                    self.grow()?;
                    expr = expr.index(index);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(syntax(self.offset(), "expected `,` or `)`")),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.grow()?;
        let offset = self.offset();
        match self.advance() {
            Some(Token::Ident(name)) => self.resolve_ident(name),
            Some(Token::Number(value)) => Ok(Expr::Literal {
                value: Literal::Number(value),
            }),
            Some(Token::Str(value)) => Ok(Expr::Literal {
                value: Literal::Str(value),
            }),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(token) => Err(syntax(offset, format!("unexpected {token:?}"))),
            None => Err(syntax(self.end, "unexpected end of input")),
        }
    }

    fn resolve_ident(&mut self, name: String) -> Result<Expr> {
        let literal = |value: bool| Expr::Literal {
            value: Literal::Bool(value),
        };
        match name.as_str() {
            "true" => return Ok(literal(true)),
            "false" => return Ok(literal(false)),
            "this" | "self" => return Ok(Expr::This),
            _ => {}
        }

        // A bare call like `compute()` is a method on the root.
        if self.peek() == Some(&Token::LParen) {
            let args = self.parse_args()?;
            return Ok(Expr::This.call(&name, args));
        }

        Ok(match &self.scope {
            Scope::Bare => Expr::This.member(&name),
            Scope::Lambda(Some(parameter)) if *parameter == name => Expr::Parameter { name },
            Scope::Lambda(_) => Expr::Captured { name },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> Expr {
        PathExpression::parse(text).unwrap().body
    }

    #[test]
    fn lambda_forms_parse_to_the_same_chain() {
        let expected = Expr::parameter("x").member("next").member("is_true");
        assert_eq!(body("x => x.next.is_true"), expected);
        assert_eq!(body("(x) => x.next.is_true"), expected);
        assert_eq!(body("|x| x.next.is_true"), expected);
    }

    #[test]
    fn captured_and_this_roots() {
        assert_eq!(body("|| vm.next"), Expr::captured("vm").member("next"));
        assert_eq!(body("() => vm.next"), Expr::captured("vm").member("next"));
        assert_eq!(body("this.next"), Expr::this().member("next"));
        assert_eq!(body("self.next"), Expr::this().member("next"));
        assert_eq!(body("next.is_true"), Expr::this().member("next").member("is_true"));
    }

    #[test]
    fn lambda_parameter_is_recorded() {
        let parsed = PathExpression::parse("node => node.next").unwrap();
        assert_eq!(parsed.parameter.as_deref(), Some("node"));
        assert_eq!(parsed.to_string(), "node => node.next");
        assert_eq!(PathExpression::parse("next").unwrap().parameter, None);
    }

    #[test]
    fn calls_indexers_and_operators_parse() {
        assert_eq!(
            body("x => x.items.first()"),
            Expr::parameter("x").member("items").call("first", vec![])
        );
        assert_eq!(
            body("x => x[\"next\"]"),
            Expr::parameter("x").index(Expr::string("next"))
        );
        assert!(matches!(body("x => x.count + 1"), Expr::Binary { ref op, .. } if op == "+"));
        assert!(matches!(body("x => !x.flag"), Expr::Unary { ref op, .. } if op == "!"));
    }

    #[test]
    fn bare_calls_target_the_root() {
        assert_eq!(body("x => compute(1)"), Expr::this().call("compute", vec![Expr::Literal { value: Literal::Number(1.0) }]));
    }

    #[test]
    fn display_renders_sub_expressions() {
        let expr = body("x => x.items.get(0, 'a').name");
        assert_eq!(expr.to_string(), "x.items.get(0, \"a\").name");
    }

    #[test]
    fn syntax_errors_carry_offsets() {
        let err = PathExpression::parse("x => x.").unwrap_err();
        assert!(matches!(err, Error::Syntax { offset: 7, .. }));

        let err = PathExpression::parse("x => x.next #").unwrap_err();
        assert!(matches!(err, Error::Syntax { offset: 12, .. }));

        let err = PathExpression::parse("x => ").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));

        let err = PathExpression::parse("x => x[\"open").unwrap_err();
        assert!(matches!(err, Error::Syntax { offset: 7, .. }));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let text = format!("x => {}x.next{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = PathExpression::parse(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Syntax { offset: 69, ref message } if message.contains("nested too deeply")
        ));

        let text = format!("x => {}x.flag", "!".repeat(200_000));
        let err = PathExpression::parse(&text).unwrap_err();
        assert!(matches!(err, Error::Syntax { ref message, .. } if message.contains("nested too deeply")));

        // Nesting within the limit still parses.
        let text = format!("x => {}x.next{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(body(&text), Expr::parameter("x").member("next"));
    }

    #[test]
    fn oversized_chains_are_a_syntax_error() {
        let text = format!("x => x{}", ".next".repeat(100_000));
        let err = PathExpression::parse(&text).unwrap_err();
        assert!(matches!(err, Error::Syntax { ref message, .. } if message.contains("too large")));

        let text = format!("x => x.count{}", " + x.count".repeat(100_000));
        let err = PathExpression::parse(&text).unwrap_err();
        assert!(matches!(err, Error::Syntax { ref message, .. } if message.contains("too large")));
    }

    #[test]
    fn json_form_matches_parsed_form() {
        let json = r#"{
            "parameter": "x",
            "body": {
                "kind": "member",
                "name": "is_true",
                "target": {
                    "kind": "member",
                    "name": "next",
                    "target": { "kind": "parameter", "name": "x" }
                }
            }
        }"#;
        let loaded = PathExpression::from_json(json).unwrap();
        assert_eq!(loaded, PathExpression::parse("x => x.next.is_true").unwrap());

        let back = PathExpression::from_json(&loaded.to_json().unwrap()).unwrap();
        assert_eq!(back, loaded);
    }
}
