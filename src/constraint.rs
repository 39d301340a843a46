//! Constraint language: tokenizer, syntax tree and recursive-descent parser.
//!
//! ```text
//! expr        := or_expr
//! or_expr     := and_expr ( "OR" and_expr )*
//! and_expr    := term ( "AND" term )*
//! term        := "NOT" term | "(" expr ")" | "EXIST" property | comparison
//! comparison  := property op literal
//!              | property "IN" "[" literal ( "," literal )* "]"
//!              | literal "IN" property
//! property    := "[" identifier "]" | identifier
//! literal     := quoted-string | number | "true" | "false"
//! ```
//!
//! Keywords are case-insensitive. Strings use single or double quotes and
//! have no escapes.

use crate::error::{FinderError, FinderResult};
use std::fmt;
use std::str::FromStr;

const KEYWORDS: [&str; 7] = ["and", "or", "not", "in", "exist", "true", "false"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
}

/// A node of the constraint syntax tree. The tree is owned top-down and
/// never changes after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Literal),
    Property(String),
    List(Vec<Literal>),
    Comparison {
        op: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Membership {
        value: Box<Node>,
        list: Box<Node>,
    },
    /// `Not` has exactly one child; `And`/`Or` chains are flattened.
    Logical {
        op: LogicalOp,
        children: Vec<Node>,
    },
    Exists(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) if s.contains('\'') => write!(f, "\"{s}\""),
            Literal::String(s) => write!(f, "'{s}'"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(lit) => write!(f, "{lit}"),
            Node::Property(key) => write!(f, "[{key}]"),
            Node::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Node::Comparison { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Node::Membership { value, list } => write!(f, "{value} IN {list}"),
            Node::Logical { op: LogicalOp::Not, children } => {
                write!(f, "NOT ")?;
                children.iter().try_for_each(|child| write!(f, "({child})"))
            }
            Node::Logical { op, children } => {
                let joiner = if *op == LogicalOp::And { " AND " } else { " OR " };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{joiner}")?;
                    }
                    write!(f, "({child})")?;
                }
                Ok(())
            }
            Node::Exists(key) => write!(f, "EXIST [{key}]"),
        }
    }
}

/// A compiled constraint, reusable across any number of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    source: String,
    root: Node,
}

impl Constraint {
    /// Compiles constraint text.
    ///
    /// # Errors
    ///
    /// [`FinderError::ConstraintSyntax`] with the byte offset of the first
    /// offending token.
    pub fn parse(text: &str) -> FinderResult<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: text.len(),
        };
        if parser.peek().is_none() {
            return Err(syntax_error(0, "empty constraint"));
        }
        let root = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(syntax_error(token.pos, "unexpected trailing input"));
        }
        Ok(Self {
            source: text.to_string(),
            root,
        })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Constraint {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

fn syntax_error(position: usize, message: impl Into<String>) -> FinderError {
    FinderError::ConstraintSyntax {
        position,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Op(CompareOp),
    Str(String),
    Num(f64),
    Word(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':')
}

fn tokenize(text: &str) -> FinderResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, pos });
            continue;
        }

        let kind = match c {
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.next_if(|&(_, next)| next == '=').is_some();
                let op = match (c, followed_by_eq) {
                    ('=', true) => CompareOp::Eq,
                    ('!', true) => CompareOp::Ne,
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Ge,
                    _ => return Err(syntax_error(pos, format!("incomplete operator '{c}'"))),
                };
                TokenKind::Op(op)
            }
            '\'' | '"' => {
                chars.next();
                let start = pos + 1;
                let end = loop {
                    match chars.next() {
                        Some((i, ch)) if ch == c => break i,
                        Some(_) => {}
                        None => return Err(syntax_error(pos, "unterminated string literal")),
                    }
                };
                TokenKind::Str(text[start..end].to_string())
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut end = pos;
                let mut seen_dot = false;
                chars.next();
                end += c.len_utf8();
                while let Some((i, ch)) =
                    chars.next_if(|&(_, ch)| ch.is_ascii_digit() || (ch == '.' && !seen_dot))
                {
                    seen_dot |= ch == '.';
                    end = i + ch.len_utf8();
                }
                let literal = &text[pos..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| syntax_error(pos, format!("invalid number '{literal}'")))?;
                TokenKind::Num(value)
            }
            c if is_word_start(c) => {
                let mut end = pos;
                while let Some((i, ch)) = chars.next_if(|&(_, ch)| is_word_char(ch)) {
                    end = i + ch.len_utf8();
                }
                TokenKind::Word(text[pos..end].to_string())
            }
            other => return Err(syntax_error(pos, format!("unexpected character '{other}'"))),
        };
        tokens.push(Token { kind, pos });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Position to report when the next token is wrong or missing.
    fn here(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case(keyword)
        )
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> FinderResult<()> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(syntax_error(self.here(), format!("expected {what}"))),
        }
    }

    fn parse_or(&mut self) -> FinderResult<Node> {
        self.parse_chain(LogicalOp::Or, "or", Self::parse_and)
    }

    fn parse_and(&mut self) -> FinderResult<Node> {
        self.parse_chain(LogicalOp::And, "and", Self::parse_term)
    }

    fn parse_chain(
        &mut self,
        op: LogicalOp,
        keyword: &str,
        operand: fn(&mut Self) -> FinderResult<Node>,
    ) -> FinderResult<Node> {
        let mut children = vec![operand(self)?];
        while self.at_keyword(keyword) {
            self.pos += 1;
            children.push(operand(self)?);
        }
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(Node::Logical { op, children })
    }

    fn parse_term(&mut self) -> FinderResult<Node> {
        if self.at_keyword("not") {
            self.pos += 1;
            let child = self.parse_term()?;
            return Ok(Node::Logical {
                op: LogicalOp::Not,
                children: vec![child],
            });
        }
        if self.at_keyword("exist") {
            self.pos += 1;
            return Ok(Node::Exists(self.parse_property()?));
        }
        if matches!(self.peek(), Some(Token { kind: TokenKind::LParen, .. })) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FinderResult<Node> {
        if self.at_literal() {
            let literal = self.parse_literal()?;
            if !self.at_keyword("in") {
                return Err(syntax_error(self.here(), "expected IN after literal"));
            }
            self.pos += 1;
            let key = self.parse_property()?;
            return Ok(Node::Membership {
                value: Box::new(Node::Literal(literal)),
                list: Box::new(Node::Property(key)),
            });
        }

        let key = self.parse_property()?;
        let left = Box::new(Node::Property(key));
        if self.at_keyword("in") {
            self.pos += 1;
            let list = self.parse_literal_list()?;
            return Ok(Node::Membership {
                value: left,
                list: Box::new(Node::List(list)),
            });
        }
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) => {
                let op = *op;
                self.pos += 1;
                let right = Box::new(Node::Literal(self.parse_literal()?));
                Ok(Node::Comparison { op, left, right })
            }
            _ => Err(syntax_error(self.here(), "expected comparison operator or IN")),
        }
    }

    fn at_literal(&self) -> bool {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Str(_) | TokenKind::Num(_)) => true,
            Some(TokenKind::Word(w)) => {
                w.eq_ignore_ascii_case("true") || w.eq_ignore_ascii_case("false")
            }
            _ => false,
        }
    }

    fn parse_literal(&mut self) -> FinderResult<Literal> {
        let here = self.here();
        let literal = match self.advance().map(|t| t.kind) {
            Some(TokenKind::Str(s)) => Literal::String(s),
            Some(TokenKind::Num(n)) => Literal::Number(n),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("true") => Literal::Bool(true),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("false") => Literal::Bool(false),
            _ => return Err(syntax_error(here, "expected literal")),
        };
        Ok(literal)
    }

    fn parse_literal_list(&mut self) -> FinderResult<Vec<Literal>> {
        self.expect(TokenKind::LBracket, "'[' to open literal list")?;
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token { kind: TokenKind::RBracket, .. })) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_literal()?);
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::RBracket) => {
                    self.pos += 1;
                    return Ok(items);
                }
                _ => return Err(syntax_error(self.here(), "expected ',' or ']' in literal list")),
            }
        }
    }

    /// `[identifier]` or a bare, non-keyword identifier.
    fn parse_property(&mut self) -> FinderResult<String> {
        let bracketed = matches!(self.peek(), Some(Token { kind: TokenKind::LBracket, .. }));
        if bracketed {
            self.pos += 1;
        }
        let here = self.here();
        let key = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(w)) if bracketed || !is_keyword(w) => w.clone(),
            _ => return Err(syntax_error(here, "expected property name")),
        };
        self.pos += 1;
        if bracketed {
            self.expect(TokenKind::RBracket, "']' after property name")?;
        }
        Ok(key)
    }
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k))
}
