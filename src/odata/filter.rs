//! `$filter` expressions: lexer, recursive-descent parser and type checking.
//!
//! Supported grammar, lowest precedence first:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := unary ("and" unary)*
//! unary      := "not" unary | primary
//! primary    := "(" or_expr ")"
//!             | ("contains" | "startswith" | "endswith") "(" operand "," string ")"
//!             | operand ("eq" | "ne" | "gt" | "ge" | "lt" | "le") operand
//!             | operand "in" "(" literal ("," literal)* ")"
//! operand    := literal | scalar_fn "(" operand ")" | property
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::odata::edm::{EdmType, EntityType};

/// Deepest nesting of parentheses, `not` and function calls.
pub const MAX_DEPTH: usize = 64;

/// Most `and`/`or` operators in one expression.
pub const MAX_OPERATORS: usize = 128;

/// Failure while reading a `$filter` expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}{}", .position.map(|p| format!(" (at position {p})")).unwrap_or_default())]
pub struct FilterError {
    pub message: String,
    /// Byte offset in the expression, for syntax errors only.
    pub position: Option<usize>,
}

impl FilterError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Error found on the parsed tree, with no source position.
    fn semantic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }
}

type Result<T> = std::result::Result<T, FilterError>;

/// Primitive literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Literal {
    /// Type of a non-null literal.
    pub fn kind(&self) -> Option<EdmType> {
        match self {
            Literal::Null => None,
            Literal::Boolean(_) => Some(EdmType::Boolean),
            Literal::Integer(_) => Some(EdmType::Int64),
            Literal::Decimal(_) => Some(EdmType::Double),
            Literal::String(_) => Some(EdmType::String),
            Literal::DateTime(_) => Some(EdmType::DateTimeOffset),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Decimal(d) => write!(f, "{d}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            _ => return None,
        })
    }

    /// SQL operator.
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// String matching functions returning a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFn {
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchFn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "contains" => MatchFn::Contains,
            "startswith" => MatchFn::StartsWith,
            "endswith" => MatchFn::EndsWith,
            _ => return None,
        })
    }
}

/// Functions usable as operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFn {
    ToLower,
    ToUpper,
    Trim,
    Length,
}

impl ScalarFn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "tolower" => ScalarFn::ToLower,
            "toupper" => ScalarFn::ToUpper,
            "trim" => ScalarFn::Trim,
            "length" => ScalarFn::Length,
            _ => return None,
        })
    }

    /// SQL function name.
    pub fn sql(&self) -> &'static str {
        match self {
            ScalarFn::ToLower => "LOWER",
            ScalarFn::ToUpper => "UPPER",
            ScalarFn::Trim => "BTRIM",
            ScalarFn::Length => "CHAR_LENGTH",
        }
    }

    fn result_kind(&self) -> EdmType {
        match self {
            ScalarFn::Length => EdmType::Int32,
            _ => EdmType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Property(String),
    Literal(Literal),
    Call(ScalarFn, Box<Operand>),
}

/// Boolean expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    In {
        operand: Operand,
        values: Vec<Literal>,
    },
    Match {
        function: MatchFn,
        operand: Operand,
        pattern: String,
    },
}

impl Expr {
    /// Parse `input` and check it against `entity_type`.
    pub fn parse(input: &str, entity_type: &EntityType) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
            operators: 0,
        };

        let expr = parser.or_expr()?;
        let next = parser.peek();
        if next.token != Token::Eof {
            return Err(FilterError::new(
                format!("unexpected {}", next.token),
                next.position,
            ));
        }

        expr.check(entity_type)?;
        Ok(expr)
    }

    fn check(&self, ty: &EntityType) -> Result<()> {
        match self {
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.check(ty)?;
                right.check(ty)
            },
            Expr::Not(inner) => inner.check(ty),
            Expr::Compare { op, left, right } => {
                let (left_kind, right_kind) = (left.kind(ty)?, right.kind(ty)?);
                match (left_kind, right_kind) {
                    (Some(l), Some(r)) if !l.is_comparable_with(r) => Err(FilterError::semantic(
                        format!("cannot compare {} with {}", l.name(), r.name()),
                    )),
                    (None, _) | (_, None) if !matches!(op, CompareOp::Eq | CompareOp::Ne) => {
                        Err(FilterError::semantic("null only supports 'eq' and 'ne'"))
                    },
                    _ => Ok(()),
                }
            },
            Expr::In { operand, values } => {
                let kind = operand
                    .kind(ty)?
                    .ok_or_else(|| FilterError::semantic("'in' requires a non-null operand"))?;
                for value in values {
                    match value.kind() {
                        Some(k) if kind.is_comparable_with(k) => {},
                        Some(k) => {
                            return Err(FilterError::semantic(format!(
                                "'in' list mixes {} with {}",
                                kind.name(),
                                k.name()
                            )));
                        },
                        None => {
                            return Err(FilterError::semantic("'in' list cannot contain null"));
                        },
                    }
                }
                Ok(())
            },
            Expr::Match { operand, .. } => match operand.kind(ty)? {
                Some(EdmType::String) => Ok(()),
                _ => Err(FilterError::semantic("string function expects an Edm.String operand")),
            },
        }
    }
}

impl Operand {
    /// Type of the operand, `None` for `null`.
    fn kind(&self, ty: &EntityType) -> Result<Option<EdmType>> {
        match self {
            Operand::Property(name) => ty
                .property(name)
                .map(|p| Some(p.kind))
                .ok_or_else(|| {
                    FilterError::semantic(format!("unknown property '{name}' on {}", ty.name))
                }),
            Operand::Literal(literal) => Ok(literal.kind()),
            Operand::Call(function, arg) => match arg.kind(ty)? {
                Some(EdmType::String) => Ok(Some(function.result_kind())),
                _ => Err(FilterError::semantic("string function expects an Edm.String operand")),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Literal),
    LParen,
    RParen,
    Comma,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(ident) => write!(f, "'{ident}'"),
            Token::Literal(literal) => write!(f, "literal {literal}"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Eof => f.write_str("end of expression"),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek_char() {
            if !predicate(c) {
                break;
            }
            self.position += c.len_utf8();
        }
        &self.input[start..self.position]
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            self.take_while(char::is_whitespace);
            let position = self.position;
            let Some(c) = self.peek_char() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    position,
                });
                return Ok(tokens);
            };

            let token = match c {
                '(' => {
                    self.position += 1;
                    Token::LParen
                },
                ')' => {
                    self.position += 1;
                    Token::RParen
                },
                ',' => {
                    self.position += 1;
                    Token::Comma
                },
                '\'' => Token::Literal(Literal::String(self.string(position)?)),
                '0'..='9' | '-' => Token::Literal(self.number(position)?),
                c if c.is_alphabetic() || c == '_' => {
                    let ident = self.take_while(|c| c.is_alphanumeric() || c == '_');
                    match ident {
                        "null" => Token::Literal(Literal::Null),
                        "true" => Token::Literal(Literal::Boolean(true)),
                        "false" => Token::Literal(Literal::Boolean(false)),
                        _ => Token::Ident(ident.to_owned()),
                    }
                },
                c => {
                    return Err(FilterError::new(format!("unexpected character '{c}'"), position));
                },
            };

            tokens.push(Spanned { token, position });
        }
    }

    /// Single-quoted string, `''` escapes a quote.
    fn string(&mut self, start: usize) -> Result<String> {
        self.position += 1;
        let mut value = String::new();

        loop {
            let Some(c) = self.peek_char() else {
                return Err(FilterError::new("unterminated string literal", start));
            };
            self.position += c.len_utf8();

            if c == '\'' {
                if self.peek_char() == Some('\'') {
                    self.position += 1;
                    value.push('\'');
                } else {
                    return Ok(value);
                }
            } else {
                value.push(c);
            }
        }
    }

    /// Integer, decimal, date or date-time literal.
    fn number(&mut self, start: usize) -> Result<Literal> {
        let raw = self.take_while(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | ':')
        });
        let invalid = || FilterError::new(format!("invalid literal '{raw}'"), start);

        // `2024-01-31` or `2024-01-31T08:00:00Z`; a sign never comes fifth.
        if raw.len() >= 10 && raw.as_bytes().get(4) == Some(&b'-') {
            if raw.len() == 10 {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
                return date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| Literal::DateTime(dt.and_utc()))
                    .ok_or_else(invalid);
            }
            return DateTime::parse_from_rfc3339(raw)
                .map(|dt| Literal::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| invalid());
        }

        if raw.contains(['.', 'e', 'E']) {
            return raw
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .map(Literal::Decimal)
                .ok_or_else(invalid);
        }

        raw.parse::<i64>().map(Literal::Integer).map_err(|_| invalid())
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // `tokenize` always ends with `Eof`, never consumed.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.cursor + offset).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn advance(&mut self) -> Spanned {
        let token = self.peek().clone();
        if token.token != Token::Eof {
            self.cursor += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().token, Token::Ident(ident) if ident == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let next = self.advance();
        if next.token == expected {
            Ok(())
        } else {
            Err(FilterError::new(
                format!("expected {expected}, found {}", next.token),
                next.position,
            ))
        }
    }

    /// Enter one nesting level, bounded by [`MAX_DEPTH`].
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FilterError::new(
                format!("expression nested deeper than {MAX_DEPTH} levels"),
                self.peek().position,
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Consume an `and`/`or`, bounded by [`MAX_OPERATORS`].
    fn binary_operator(&mut self) -> Result<()> {
        let keyword = self.advance();
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(FilterError::new(
                format!("expression has more than {MAX_OPERATORS} 'and'/'or' operators"),
                keyword.position,
            ));
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.is_keyword("or") {
            self.binary_operator()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while self.is_keyword("and") {
            self.binary_operator()?;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.is_keyword("not") {
            self.advance();
            self.descend()?;
            let inner = self.unary()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.peek().token == Token::LParen {
            self.advance();
            self.descend()?;
            let expr = self.or_expr()?;
            self.expect(Token::RParen)?;
            self.ascend();
            return Ok(expr);
        }

        if let Token::Ident(name) = &self.peek().token {
            if let Some(function) = MatchFn::from_name(name) {
                if *self.peek_at(1) == Token::LParen {
                    return self.match_call(function);
                }
            }
        }

        let operand = self.operand()?;
        let next = self.advance();
        match next.token {
            Token::Ident(ref keyword) if keyword == "in" => {
                let values = self.literal_list()?;
                Ok(Expr::In { operand, values })
            },
            Token::Ident(ref keyword) => match CompareOp::from_keyword(keyword) {
                Some(op) => Ok(Expr::Compare {
                    op,
                    left: operand,
                    right: self.operand()?,
                }),
                None => Err(FilterError::new(
                    format!("unknown operator '{keyword}'"),
                    next.position,
                )),
            },
            token => Err(FilterError::new(
                format!("expected comparison operator, found {token}"),
                next.position,
            )),
        }
    }

    fn match_call(&mut self, function: MatchFn) -> Result<Expr> {
        self.advance();
        self.expect(Token::LParen)?;
        let operand = self.operand()?;
        self.expect(Token::Comma)?;

        let next = self.advance();
        let pattern = match next.token {
            Token::Literal(Literal::String(pattern)) => pattern,
            token => {
                return Err(FilterError::new(
                    format!("expected string literal, found {token}"),
                    next.position,
                ));
            },
        };

        self.expect(Token::RParen)?;
        Ok(Expr::Match {
            function,
            operand,
            pattern,
        })
    }

    fn literal_list(&mut self) -> Result<Vec<Literal>> {
        self.expect(Token::LParen)?;
        let mut values = Vec::new();

        loop {
            let next = self.advance();
            match next.token {
                Token::Literal(literal) => values.push(literal),
                token => {
                    return Err(FilterError::new(
                        format!("expected literal, found {token}"),
                        next.position,
                    ));
                },
            }

            let next = self.advance();
            match next.token {
                Token::Comma => continue,
                Token::RParen => return Ok(values),
                token => {
                    return Err(FilterError::new(
                        format!("expected ',' or ')', found {token}"),
                        next.position,
                    ));
                },
            }
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        let next = self.advance();
        match next.token {
            Token::Literal(literal) => Ok(Operand::Literal(literal)),
            Token::Ident(name) if *self.peek_at(0) == Token::LParen => {
                let Some(function) = ScalarFn::from_name(&name) else {
                    return Err(FilterError::new(
                        format!("unsupported function '{name}'"),
                        next.position,
                    ));
                };
                self.advance();
                self.descend()?;
                let arg = self.operand()?;
                self.expect(Token::RParen)?;
                self.ascend();
                Ok(Operand::Call(function, Box::new(arg)))
            },
            Token::Ident(name) => Ok(Operand::Property(name)),
            token => Err(FilterError::new(
                format!("expected operand, found {token}"),
                next.position,
            )),
        }
    }
}
