//! Parser for the subset of the service's SQL dialect the in-memory store understands.
//!
//! ```text
//! SELECT [TOP n] [VALUE] (* | COUNT(1) | expr)
//! FROM alias
//! [WHERE expr]
//! [ORDER BY expr [ASC | DESC], ...]
//! [OFFSET n LIMIT m]
//! ```
//!
//! Expressions support literals, `@parameters`, property paths rooted at the alias
//! (`c.address.city`, `c["first-name"]`, `c.tags[0]`), array literals, comparisons, `IN`,
//! `AND`/`OR`/`NOT`, unary minus and a handful of built-in functions.

use serde_json::{Number, Value};

use feedlayer_core::{
    error::{FeedError, FeedResult},
    query::SortDirection,
};

/// A parsed `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub top: Option<SqlExpr>,
    pub projection: Projection,
    pub alias: String,
    pub filter: Option<SqlExpr>,
    pub order_by: Vec<OrderBy>,
    pub offset_limit: Option<(SqlExpr, SqlExpr)>,
}

/// What a statement returns for each matching item.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `SELECT *`: the whole item.
    Star,
    /// `SELECT VALUE expr`: the bare value of `expr`.
    Value(SqlExpr),
    /// `SELECT COUNT(1)` or `SELECT VALUE COUNT(1)`.
    Count { value: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Literal(Value),
    Parameter(String),
    Path {
        root: String,
        segments: Vec<PathSegment>,
    },
    Array(Vec<SqlExpr>),
    BinaryOp {
        left: Box<SqlExpr>,
        op: BinaryOp,
        right: Box<SqlExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<SqlExpr>,
    },
    In {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    Function {
        function: Function,
        args: Vec<SqlExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    IsDefined,
    IsNull,
    IsString,
    IsNumber,
    IsBool,
    IsArray,
    StartsWith,
    EndsWith,
    Contains,
    ArrayContains,
    Lower,
    Upper,
    Length,
    ArrayLength,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "IS_DEFINED" => Function::IsDefined,
            "IS_NULL" => Function::IsNull,
            "IS_STRING" => Function::IsString,
            "IS_NUMBER" => Function::IsNumber,
            "IS_BOOL" => Function::IsBool,
            "IS_ARRAY" => Function::IsArray,
            "STARTSWITH" => Function::StartsWith,
            "ENDSWITH" => Function::EndsWith,
            "CONTAINS" => Function::Contains,
            "ARRAY_CONTAINS" => Function::ArrayContains,
            "LOWER" => Function::Lower,
            "UPPER" => Function::Upper,
            "LENGTH" => Function::Length,
            "ARRAY_LENGTH" => Function::ArrayLength,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive.
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::StartsWith | Function::EndsWith | Function::Contains | Function::ArrayContains => (2, 3),
            _ => (1, 1),
        }
    }
}

/// Parses query text into a [`SelectStatement`].
///
/// # Errors
///
/// Returns [`FeedError::InvalidQuery`] for anything outside the supported subset.
pub fn parse(text: &str) -> FeedResult<SelectStatement> {
    let tokens = tokenize(text)?;
    let statement = Parser { tokens, pos: 0 }.select()?;

    let mut roots = Vec::new();
    if let Projection::Value(expr) = &statement.projection {
        collect_roots(expr, &mut roots);
    }
    if let Some(filter) = &statement.filter {
        collect_roots(filter, &mut roots);
    }
    for order in &statement.order_by {
        collect_roots(&order.expr, &mut roots);
    }

    if let Some(root) = roots.into_iter().find(|root| *root != statement.alias) {
        return invalid(format!("`{root}` is not the source alias `{}`", statement.alias));
    }

    Ok(statement)
}

fn collect_roots<'a>(expr: &'a SqlExpr, roots: &mut Vec<&'a str>) {
    match expr {
        SqlExpr::Path { root, .. } => roots.push(root),
        SqlExpr::Array(items) => items.iter().for_each(|item| collect_roots(item, roots)),
        SqlExpr::BinaryOp { left, right, .. } => {
            collect_roots(left, roots);
            collect_roots(right, roots);
        }
        SqlExpr::UnaryOp { expr, .. } => collect_roots(expr, roots),
        SqlExpr::In { expr, list, .. } => {
            collect_roots(expr, roots);
            list.iter().for_each(|item| collect_roots(item, roots));
        }
        SqlExpr::Function { args, .. } => args.iter().for_each(|arg| collect_roots(arg, roots)),
        SqlExpr::Literal(_) | SqlExpr::Parameter(_) => {}
    }
}

fn invalid<T>(message: impl Into<String>) -> FeedResult<T> {
    Err(FeedError::InvalidQuery(message.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Parameter(String),
    Number(Value),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Star,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

fn tokenize(text: &str) -> FeedResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' || c == '@' {
            let start = if c == '@' { i + 1 } else { i };
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }

            let word: String = chars[start..end].iter().collect();
            if c == '@' {
                if word.is_empty() {
                    return invalid("expected a parameter name after `@`");
                }
                tokens.push(Token::Parameter(word));
            } else {
                tokens.push(Token::Ident(word));
            }

            i = end;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                is_float = true;
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }

            let literal: String = chars[start..i].iter().collect();
            tokens.push(Token::Number(number_literal(&literal, is_float)?));
            continue;
        }

        if c == '\'' || c == '"' {
            let (value, next) = string_literal(&chars, i)?;
            tokens.push(Token::Str(value));
            i = next;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('*', _) => (Token::Star, 1),
            ('-', _) => (Token::Minus, 1),
            ('=', _) => (Token::Eq, 1),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('>')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('>', _) => (Token::Gt, 1),
            _ => return invalid(format!("unexpected character `{c}` at position {i}")),
        };

        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn number_literal(literal: &str, is_float: bool) -> FeedResult<Value> {
    if !is_float {
        if let Ok(integer) = literal.parse::<i64>() {
            return Ok(Value::from(integer));
        }
    }

    literal
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| FeedError::InvalidQuery(format!("invalid number `{literal}`")))
}

fn string_literal(chars: &[char], start: usize) -> FeedResult<(String, usize)> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((value, i + 1)),
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    break;
                };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    invalid("unterminated string literal")
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn select(mut self) -> FeedResult<SelectStatement> {
        self.expect_keyword("SELECT")?;

        let top = if self.keyword("TOP") { Some(self.primary()?) } else { None };
        let value = self.keyword("VALUE");
        let projection = self.projection(value)?;

        self.expect_keyword("FROM")?;
        let alias = match self.next() {
            Some(Token::Ident(alias)) => alias,
            other => return invalid(format!("expected a source alias after FROM, found {other:?}")),
        };

        let filter = if self.keyword("WHERE") { Some(self.expr()?) } else { None };

        let mut order_by = Vec::new();
        if self.keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expr()?;
                let direction = if self.keyword("DESC") {
                    SortDirection::Desc
                } else {
                    self.keyword("ASC");
                    SortDirection::Asc
                };
                order_by.push(OrderBy { expr, direction });

                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let offset_limit = if self.keyword("OFFSET") {
            let offset = self.unary()?;
            self.expect_keyword("LIMIT")?;
            Some((offset, self.unary()?))
        } else {
            None
        };

        if let Some(token) = self.peek() {
            return invalid(format!("unexpected {token:?} after the end of the query"));
        }

        Ok(SelectStatement { top, projection, alias, filter, order_by, offset_limit })
    }

    fn projection(&mut self, value: bool) -> FeedResult<Projection> {
        if self.eat(&Token::Star) {
            if value {
                return invalid("SELECT VALUE * is not valid");
            }
            return Ok(Projection::Star);
        }

        if self.peek_keyword("COUNT") && self.tokens.get(self.pos + 1) == Some(&Token::LParen) {
            self.pos += 2;
            match self.next() {
                Some(Token::Number(_) | Token::Star) => {}
                other => return invalid(format!("unsupported COUNT argument {other:?}")),
            }
            self.expect(&Token::RParen)?;
            return Ok(Projection::Count { value });
        }

        if value {
            return Ok(Projection::Value(self.expr()?));
        }

        invalid("only `*`, `VALUE` expressions and `COUNT(1)` projections are supported")
    }

    fn expr(&mut self) -> FeedResult<SqlExpr> {
        let mut left = self.and()?;
        while self.keyword("OR") {
            let right = self.and()?;
            left = SqlExpr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn and(&mut self) -> FeedResult<SqlExpr> {
        let mut left = self.not()?;
        while self.keyword("AND") {
            let right = self.not()?;
            left = SqlExpr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn not(&mut self) -> FeedResult<SqlExpr> {
        if self.keyword("NOT") {
            let expr = self.not()?;
            return Ok(SqlExpr::UnaryOp { op: UnaryOp::Not, expr: Box::new(expr) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> FeedResult<SqlExpr> {
        let left = self.unary()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::NotEq),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::LtEq) => Some(BinaryOp::LtEq),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::GtEq) => Some(BinaryOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.unary()?;
            return Ok(SqlExpr::BinaryOp { left: Box::new(left), op, right: Box::new(right) });
        }

        let negated = self.peek_keyword("NOT")
            && matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(word)) if word.eq_ignore_ascii_case("IN"));
        if negated {
            self.pos += 1;
        }
        if self.keyword("IN") {
            self.expect(&Token::LParen)?;
            let list = self.list(&Token::RParen)?;
            return Ok(SqlExpr::In { expr: Box::new(left), list, negated });
        }

        Ok(left)
    }

    fn unary(&mut self) -> FeedResult<SqlExpr> {
        if self.eat(&Token::Minus) {
            let expr = self.unary()?;
            return Ok(SqlExpr::UnaryOp { op: UnaryOp::Minus, expr: Box::new(expr) });
        }
        self.primary()
    }

    fn primary(&mut self) -> FeedResult<SqlExpr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => Ok(SqlExpr::Array(self.list(&Token::RBracket)?)),
            Some(Token::Number(value)) => Ok(SqlExpr::Literal(value)),
            Some(Token::Str(value)) => Ok(SqlExpr::Literal(Value::String(value))),
            Some(Token::Parameter(name)) => Ok(SqlExpr::Parameter(name)),
            Some(Token::Ident(word)) => self.identifier(word),
            other => invalid(format!("expected an expression, found {other:?}")),
        }
    }

    fn identifier(&mut self, word: String) -> FeedResult<SqlExpr> {
        match word.to_ascii_lowercase().as_str() {
            "true" => return Ok(SqlExpr::Literal(Value::Bool(true))),
            "false" => return Ok(SqlExpr::Literal(Value::Bool(false))),
            "null" => return Ok(SqlExpr::Literal(Value::Null)),
            _ => {}
        }

        if self.eat(&Token::LParen) {
            let Some(function) = Function::lookup(&word) else {
                return invalid(format!("unsupported function `{word}`"));
            };
            let args = self.list(&Token::RParen)?;
            let (min, max) = function.arity();
            if args.len() < min || args.len() > max {
                return invalid(format!("{word} takes {min} to {max} arguments, got {}", args.len()));
            }
            return Ok(SqlExpr::Function { function, args });
        }

        let mut segments = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.next() {
                    Some(Token::Ident(field)) => segments.push(PathSegment::Field(field)),
                    other => return invalid(format!("expected a property name after `.`, found {other:?}")),
                }
            } else if self.eat(&Token::LBracket) {
                match self.next() {
                    Some(Token::Str(field)) => segments.push(PathSegment::Field(field)),
                    Some(Token::Number(Value::Number(n))) if n.is_u64() => {
                        segments.push(PathSegment::Index(n.as_u64().unwrap_or_default() as usize))
                    }
                    other => return invalid(format!("expected a property name or index, found {other:?}")),
                }
                self.expect(&Token::RBracket)?;
            } else {
                break;
            }
        }

        Ok(SqlExpr::Path { root: word, segments })
    }

    fn list(&mut self, close: &Token) -> FeedResult<Vec<SqlExpr>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }

        loop {
            items.push(self.expr()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&Token::Comma)?;
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

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> FeedResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            invalid(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> FeedResult<()> {
        if self.keyword(keyword) {
            Ok(())
        } else {
            invalid(format!("expected {keyword}, found {:?}", self.peek()))
        }
    }
}
