//! Restricted condition expressions: tokenizer, recursive-descent parser and
//! the name whitelist check.
//!
//! ```text
//! expr     := or
//! or       := and ("or" and)*
//! and      := not ("and" not)*
//! not      := "not" not | compare
//! compare  := sum (cmp_op sum)*
//! sum      := term (("+" | "-") term)*
//! term     := unary (("*" | "/" | "//" | "%") unary)*
//! unary    := ("-" | "+") unary | postfix
//! postfix  := primary ("(" args ")" | "[" expr "]" | "." ident)*
//! primary  := number | string | ident | "(" expr ")" | "[" items "]"
//! ```
//!
//! Expressions are never evaluated; only the names they use are inspected.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::error::DiagnosticKind;
use crate::ir::CONDITION_NAMES;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("empty expression")]
    Empty,
    #[error("nested more than {max} levels deep", max = MAX_DEPTH)]
    TooDeep,
}

/// Deepest allowed nesting of brackets, calls and prefix operators.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Op(&'static str),
    Symbol(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) | Token::Number(s) => write!(f, "`{s}`"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Op(op) => write!(f, "`{op}`"),
            Token::Symbol(c) => write!(f, "`{c}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Str(String),
    Number(String),
    List(Vec<Expr>),
    Unary {
        op: &'static str,
        operand: Box<Expr>,
    },
    Binary {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `value.attr`; the attribute is not a name lookup.
    Attr {
        value: Box<Expr>,
        attr: String,
    },
}

impl Expr {
    /// Identifiers in name position, in source order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Name(n) = e {
                out.push(n.as_str());
            }
        });
        out
    }

    pub fn string_literals(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Str(s) = e {
                out.push(s.as_str());
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Name(_) | Expr::Str(_) | Expr::Number(_) => {}
            Expr::List(items) => items.iter().for_each(|i| i.walk(visit)),
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Call { func, args } => {
                func.walk(visit);
                args.iter().for_each(|a| a.walk(visit));
            }
            Expr::Index { value, index } => {
                value.walk(visit);
                index.walk(visit);
            }
            Expr::Attr { value, .. } => value.walk(visit),
        }
    }
}

/// Parse and whitelist-check one condition.
pub fn check_condition(src: &str) -> Result<Expr, DiagnosticKind> {
    let expr = parse(src).map_err(|e| DiagnosticKind::ExpressionSyntax {
        expr: src.to_string(),
        reason: e.to_string(),
    })?;
    if let Some(name) = expr
        .names()
        .into_iter()
        .find(|n| !CONDITION_NAMES.contains(n))
    {
        return Err(DiagnosticKind::UnboundName {
            name: name.to_string(),
            expr: src.to_string(),
        });
    }
    Ok(expr)
}

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.next() {
        None => Ok(expr),
        Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
    }
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?([eE][+-]?\d+)?").expect("static regex"));

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, ch)) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == ch {
                    closed = true;
                    break;
                }
                if c == '\\' {
                    match chars.next() {
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    }
                    continue;
                }
                value.push(c);
            }
            if !closed {
                return Err(ExprError::UnterminatedString);
            }
            tokens.push(Token::Str(value));
            continue;
        }

        if ch.is_ascii_digit() {
            let literal = NUMBER
                .find(&input[at..])
                .map(|m| m.as_str())
                .unwrap_or_default();
            while chars.next_if(|(i, _)| *i < at + literal.len()).is_some() {}
            tokens.push(Token::Number(literal.to_string()));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut value = String::new();
            while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_') {
                value.push(c);
            }
            tokens.push(Token::Ident(value));
            continue;
        }

        chars.next();
        let next = chars.peek().map(|(_, c)| *c);
        let op = match (ch, next) {
            ('=', Some('=')) => Some("=="),
            ('!', Some('=')) => Some("!="),
            ('<', Some('=')) => Some("<="),
            ('>', Some('=')) => Some(">="),
            ('/', Some('/')) => Some("//"),
            _ => None,
        };
        if let Some(op) = op {
            chars.next();
            tokens.push(Token::Op(op));
            continue;
        }
        let token = match ch {
            '<' => Token::Op("<"),
            '>' => Token::Op(">"),
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '(' | ')' | '[' | ']' | ',' | '.' => Token::Symbol(ch),
            other => return Err(ExprError::UnexpectedChar(other)),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

const KEYWORDS: [&str; 5] = ["and", "or", "not", "in", "is"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let out = parse(self);
        self.depth -= 1;
        out
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = binary("or", lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = binary("and", lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: "not",
                operand: Box::new(operand),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_sum()?;
        while let Some(op) = self.compare_op() {
            let rhs = self.parse_sum()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn compare_op(&mut self) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
                self.pos += 1;
                return Some(op);
            }
        }
        if self.eat_keyword("in") {
            return Some("in");
        }
        if self.peek_keyword("not") && self.peek_keyword_at(1, "in") {
            self.pos += 2;
            return Some("not in");
        }
        if self.eat_keyword("is") {
            if self.eat_keyword("not") {
                return Some("is not");
            }
            return Some("is");
        }
        None
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if let Some(op) = self.eat_op(&["-", "+"]) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut value = self.parse_primary()?;
        loop {
            if self.eat_symbol('(') {
                let args = self.nested(|p| p.parse_items(')'))?;
                value = Expr::Call {
                    func: Box::new(value),
                    args,
                };
            } else if self.eat_symbol('[') {
                let index = self.nested(Self::parse_or)?;
                self.expect_symbol(']')?;
                value = Expr::Index {
                    value: Box::new(value),
                    index: Box::new(index),
                };
            } else if self.eat_symbol('.') {
                match self.next() {
                    Some(Token::Ident(attr)) if !KEYWORDS.contains(&attr.as_str()) => {
                        value = Expr::Attr {
                            value: Box::new(value),
                            attr,
                        };
                    }
                    Some(tok) => return Err(ExprError::UnexpectedToken(tok.to_string())),
                    None => return Err(ExprError::UnexpectedEof),
                }
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => Ok(Expr::Name(name)),
            Some(Token::Symbol('(')) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect_symbol(')')?;
                Ok(inner)
            }
            Some(Token::Symbol('[')) => Ok(Expr::List(self.nested(|p| p.parse_items(']'))?)),
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_items(&mut self, close: char) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.eat_symbol(close) {
                return Ok(items);
            }
            items.push(self.parse_or()?);
            if !self.eat_symbol(',') {
                self.expect_symbol(close)?;
                return Ok(items);
            }
        }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_keyword_at(0, keyword)
    }

    fn peek_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.tokens.get(self.pos + offset), Some(Token::Ident(v)) if v == keyword)
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if let Some(Token::Symbol(c)) = self.peek() {
            if *c == symbol {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), ExprError> {
        if self.eat_symbol(symbol) {
            return Ok(());
        }
        match self.peek() {
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn binary(op: &'static str, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_conditions() {
        for src in [
            "state.get('score', 0) >= 0.8",
            "len(state['items']) > 0 and not state.get('done')",
            "state.get('status') in ['approved', 'pending']",
            "state.get('x') is not None",
            "state.get('a') not in state.get('b', [])",
            "abs(state['delta']) // 2 % 3 == -1",
            "any([state.get('a'), state.get('b'),])",
            "str(state.get('n')).startswith('x')",
            "True",
        ] {
            assert!(check_condition(src).is_ok(), "rejected: {src}");
        }
    }

    #[test]
    fn rejects_names_outside_whitelist() {
        let err = check_condition("os.system('rm -rf /')").unwrap_err();
        assert_eq!(
            err,
            DiagnosticKind::UnboundName {
                name: "os".into(),
                expr: "os.system('rm -rf /')".into(),
            }
        );

        let err = check_condition("state.get('x') > threshold").unwrap_err();
        assert!(matches!(err, DiagnosticKind::UnboundName { name, .. } if name == "threshold"));

        let err = check_condition("__import__('os')").unwrap_err();
        assert_eq!(err.code(), "E501");
    }

    #[test]
    fn syntax_errors_are_expression_syntax() {
        for src in [
            "state.get('x' ==",
            "state['x'] = 1",
            "lambda: 1",
            "state.get('x') >",
            "'unterminated",
            "state.and",
        ] {
            let err = check_condition(src).unwrap_err();
            assert_eq!(err.code(), "E503", "wrong code for {src}: {err:?}");
        }
    }

    #[test]
    fn number_literals_follow_python_floats() {
        assert_eq!(parse("1e5").unwrap(), Expr::Number("1e5".into()));
        assert_eq!(parse("2.5E-3").unwrap(), Expr::Number("2.5E-3".into()));
        assert!(check_condition("state.get('n', 0) < 1e5").is_ok());

        let err = check_condition("state.get('v') == 1.2.3").unwrap_err();
        assert_eq!(err.code(), "E503");
        assert!(parse("1.").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let ok = format!("{}1{}", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
        assert!(parse(&ok).is_ok());

        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse(&deep).unwrap_err(), ExprError::TooDeep);
        assert_eq!(check_condition(&deep).unwrap_err().code(), "E503");

        let negations = format!("{}True", "not ".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&negations).unwrap_err(), ExprError::TooDeep);
        assert_eq!(parse(&"-".repeat(10_000)).unwrap_err(), ExprError::TooDeep);
    }

    #[test]
    fn collects_names_and_literals_in_order() {
        let expr = parse("len(state['items']) > min(1, 2)").unwrap();
        assert_eq!(expr.names(), vec!["len", "state", "min"]);
        assert_eq!(expr.string_literals(), vec!["items"]);
    }
}
