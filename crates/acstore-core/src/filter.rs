// crates/acstore-core/src/filter.rs
// ============================================================================
// Module: Filter Expressions
// Description: Parser, evaluator, and SQL renderer for container filters.
// Purpose: Let callers select attribute containers by attribute values with
//          one expression that both in-memory and SQL-backed stores honor.
// Dependencies: thiserror, crate::containers
// ============================================================================

//! ## Overview
//! A filter expression compares attribute values against literals:
//!
//! ```text
//! name == 'svchost.exe' and (pid != 4 or not is_system)
//! ```
//!
//! ### Grammar (informal)
//! - **Literals**: `'text'` / `"text"` (escapes `\\ \' \" \n \t`), integers
//!   (optionally negative), `True`, `False`
//! - **Names**: attribute names (`[A-Za-z_][A-Za-z0-9_]*`)
//! - **Comparisons**: `a == b`, `a != b` (no chaining)
//! - **Boolean operators**: `not`, `and`, `or`, in decreasing precedence
//! - **Parentheses**: `( ... )` for explicit grouping
//!
//! In-memory evaluation treats an unknown attribute as an error; stores map
//! that error to "does not match". SQL rendering emits validated column names
//! and binds every literal as a positional parameter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::containers::AttributeValue;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum allowed filter expression size in bytes.
pub const MAX_FILTER_INPUT_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth for filter expressions.
pub const MAX_FILTER_NESTING: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing, evaluating, or rendering a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Input was empty or contained only whitespace.
    #[error("filter expression is empty")]
    EmptyInput,
    /// Input exceeded the size limit.
    #[error("filter expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the nesting limit.
    #[error("filter expression nesting exceeds limit of {max_depth} at {position}")]
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Unexpected token encountered during parsing.
    #[error("unexpected token `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The token that was actually seen.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// String literal without a closing quote.
    #[error("unterminated string literal at {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// Integer literal failed to parse or overflowed.
    #[error("invalid integer `{raw}` at {position}")]
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Comparisons cannot be chained (`a == b == c`).
    #[error("chained comparison at {position} is not supported")]
    ChainedComparison {
        /// Byte offset of the second comparison operator.
        position: usize,
    },
    /// Expression referenced an attribute that is not available.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
}

// ============================================================================
// SECTION: Expression Tree
// ============================================================================

/// Literal value in a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterLiteral {
    /// Boolean literal (`True` / `False`).
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// String literal.
    Str(String),
}

/// Operand of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperand {
    /// Attribute reference by name.
    Attribute(String),
    /// Literal value.
    Literal(FilterLiteral),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equality (`==`).
    Eq,
    /// Inequality (`!=`).
    NotEq,
}

/// Node of a parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    /// Bare operand, evaluated for truthiness.
    Operand(FilterOperand),
    /// Binary comparison.
    Compare {
        /// Left-hand operand.
        left: FilterOperand,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand operand.
        right: FilterOperand,
    },
    /// Logical negation.
    Not(Box<FilterNode>),
    /// Logical conjunction.
    And(Vec<FilterNode>),
    /// Logical disjunction.
    Or(Vec<FilterNode>),
}

/// Source of attribute values for in-memory evaluation.
pub trait AttributeLookup {
    /// Returns the value of a serializable attribute, or `None` when unset.
    fn lookup_attribute(&self, name: &str) -> Option<&AttributeValue>;
}

/// SQL rendering of a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    /// `WHERE` clause body using positional `?` placeholders.
    pub clause: String,
    /// Bound parameters in placeholder order.
    pub parameters: Vec<SqlParameter>,
}

/// Parameter bound into a rendered SQL filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParameter {
    /// Integer parameter (booleans bind as 0/1).
    Integer(i64),
    /// Text parameter.
    Text(String),
}

/// Parsed, validated filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    /// Original expression text.
    source: String,
    /// Root of the expression tree.
    root: FilterNode,
}

impl FilterExpression {
    /// Parses a filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] for syntax errors or limit violations.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        if input.len() > MAX_FILTER_INPUT_BYTES {
            return Err(FilterError::InputTooLarge {
                max_bytes: MAX_FILTER_INPUT_BYTES,
                actual_bytes: input.len(),
            });
        }
        let tokens = Lexer::new(input).lex()?;
        let mut parser = Parser::new(tokens);
        let root = parser.parse_expression()?;
        parser.expect_eof()?;
        Ok(Self {
            source: input.to_string(),
            root,
        })
    }

    /// Returns the original expression text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the root of the expression tree.
    #[must_use]
    pub const fn root(&self) -> &FilterNode {
        &self.root
    }

    /// Returns every attribute name referenced by the expression.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(&self.root, &mut names);
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Evaluates the expression against attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownAttribute`] when a referenced attribute
    /// is not set.
    pub fn evaluate<L: AttributeLookup + ?Sized>(&self, lookup: &L) -> Result<bool, FilterError> {
        evaluate_node(&self.root, lookup)
    }

    /// Renders the expression as a parameterised SQL `WHERE` clause.
    ///
    /// `is_column` decides whether a referenced name is a known column.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownAttribute`] for names that are not columns.
    pub fn to_sql<F>(&self, is_column: F) -> Result<SqlFilter, FilterError>
    where
        F: Fn(&str) -> bool,
    {
        let mut parameters = Vec::new();
        let clause = render_node(&self.root, &is_column, &mut parameters)?;
        Ok(SqlFilter {
            clause,
            parameters,
        })
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Comparable view of an operand value.
#[derive(Debug, PartialEq)]
enum Scalar<'a> {
    /// Integer-like value (booleans compare as 0/1).
    Int(i64),
    /// Text-like value (identifiers compare by string form).
    Str(Cow<'a, str>),
    /// Composite value compared structurally.
    Other(&'a AttributeValue),
}

/// Collects referenced attribute names.
fn collect_names<'a>(node: &'a FilterNode, names: &mut Vec<&'a str>) {
    let mut push = |operand: &'a FilterOperand| {
        if let FilterOperand::Attribute(name) = operand {
            names.push(name.as_str());
        }
    };
    match node {
        FilterNode::Operand(operand) => push(operand),
        FilterNode::Compare {
            left,
            right,
            ..
        } => {
            push(left);
            push(right);
        }
        FilterNode::Not(inner) => collect_names(inner, names),
        FilterNode::And(parts) | FilterNode::Or(parts) => {
            for part in parts {
                collect_names(part, names);
            }
        }
    }
}

/// Evaluates a node against the lookup.
fn evaluate_node<L: AttributeLookup + ?Sized>(
    node: &FilterNode,
    lookup: &L,
) -> Result<bool, FilterError> {
    match node {
        FilterNode::Operand(operand) => Ok(truthy(&resolve(operand, lookup)?)),
        FilterNode::Compare {
            left,
            op,
            right,
        } => {
            let equal = resolve(left, lookup)? == resolve(right, lookup)?;
            Ok(match op {
                CompareOp::Eq => equal,
                CompareOp::NotEq => !equal,
            })
        }
        FilterNode::Not(inner) => Ok(!evaluate_node(inner, lookup)?),
        FilterNode::And(parts) => {
            for part in parts {
                if !evaluate_node(part, lookup)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FilterNode::Or(parts) => {
            for part in parts {
                if evaluate_node(part, lookup)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Resolves an operand into a comparable scalar.
fn resolve<'a, L: AttributeLookup + ?Sized>(
    operand: &'a FilterOperand,
    lookup: &'a L,
) -> Result<Scalar<'a>, FilterError> {
    match operand {
        FilterOperand::Literal(FilterLiteral::Bool(value)) => Ok(Scalar::Int(i64::from(*value))),
        FilterOperand::Literal(FilterLiteral::Int(value)) => Ok(Scalar::Int(*value)),
        FilterOperand::Literal(FilterLiteral::Str(value)) => {
            Ok(Scalar::Str(Cow::Borrowed(value.as_str())))
        }
        FilterOperand::Attribute(name) => {
            let value = lookup
                .lookup_attribute(name)
                .ok_or_else(|| FilterError::UnknownAttribute(name.clone()))?;
            Ok(match value {
                AttributeValue::Bool(value) => Scalar::Int(i64::from(*value)),
                AttributeValue::Int(value) => Scalar::Int(*value),
                AttributeValue::Str(value) => Scalar::Str(Cow::Borrowed(value.as_str())),
                AttributeValue::Identifier(identifier) => match identifier.copy_to_string() {
                    Some(value) => Scalar::Str(Cow::Owned(value)),
                    None => Scalar::Other(value),
                },
                AttributeValue::Bytes(_) | AttributeValue::List(_) | AttributeValue::Map(_) => {
                    Scalar::Other(value)
                }
            })
        }
    }
}

/// Returns the truthiness of a scalar.
fn truthy(value: &Scalar<'_>) -> bool {
    match value {
        Scalar::Int(value) => *value != 0,
        Scalar::Str(value) => !value.is_empty(),
        Scalar::Other(AttributeValue::Bytes(bytes)) => !bytes.is_empty(),
        Scalar::Other(AttributeValue::List(items)) => !items.is_empty(),
        Scalar::Other(AttributeValue::Map(entries)) => !entries.is_empty(),
        Scalar::Other(_) => true,
    }
}

// ============================================================================
// SECTION: SQL Rendering
// ============================================================================

/// Renders a node into SQL, appending bound parameters.
fn render_node<F>(
    node: &FilterNode,
    is_column: &F,
    parameters: &mut Vec<SqlParameter>,
) -> Result<String, FilterError>
where
    F: Fn(&str) -> bool,
{
    match node {
        FilterNode::Operand(operand) => render_truth(operand, is_column),
        FilterNode::Compare {
            left,
            op,
            right,
        } => {
            let left = render_operand(left, is_column, parameters)?;
            let right = render_operand(right, is_column, parameters)?;
            let operator = match op {
                CompareOp::Eq => "=",
                CompareOp::NotEq => "<>",
            };
            Ok(format!("{left} {operator} {right}"))
        }
        FilterNode::Not(inner) => {
            Ok(format!("NOT ({})", render_node(inner, is_column, parameters)?))
        }
        FilterNode::And(parts) => render_join(parts, " AND ", is_column, parameters),
        FilterNode::Or(parts) => render_join(parts, " OR ", is_column, parameters),
    }
}

/// Renders a parenthesised list of nodes joined by an operator.
fn render_join<F>(
    parts: &[FilterNode],
    separator: &str,
    is_column: &F,
    parameters: &mut Vec<SqlParameter>,
) -> Result<String, FilterError>
where
    F: Fn(&str) -> bool,
{
    let rendered = parts
        .iter()
        .map(|part| render_node(part, is_column, parameters))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", rendered.join(separator)))
}

/// Renders a bare operand as a truth test matching in-memory evaluation.
///
/// Text is true when non-empty and numbers when non-zero. A NULL column
/// stays NULL so it never matches, even under `NOT`.
fn render_truth<F>(operand: &FilterOperand, is_column: &F) -> Result<String, FilterError>
where
    F: Fn(&str) -> bool,
{
    match operand {
        FilterOperand::Attribute(name) => {
            if !is_column(name) {
                return Err(FilterError::UnknownAttribute(name.clone()));
            }
            Ok(format!(
                "(CASE typeof(\"{name}\") WHEN 'text' THEN \"{name}\" <> '' \
                 WHEN 'blob' THEN length(\"{name}\") > 0 ELSE \"{name}\" <> 0 END)"
            ))
        }
        FilterOperand::Literal(literal) => {
            let value = match literal {
                FilterLiteral::Bool(value) => *value,
                FilterLiteral::Int(value) => *value != 0,
                FilterLiteral::Str(value) => !value.is_empty(),
            };
            Ok(String::from(if value { "1" } else { "0" }))
        }
    }
}

/// Renders an operand as a column reference or placeholder.
fn render_operand<F>(
    operand: &FilterOperand,
    is_column: &F,
    parameters: &mut Vec<SqlParameter>,
) -> Result<String, FilterError>
where
    F: Fn(&str) -> bool,
{
    match operand {
        FilterOperand::Attribute(name) => {
            if !is_column(name) {
                return Err(FilterError::UnknownAttribute(name.clone()));
            }
            Ok(format!("\"{name}\""))
        }
        FilterOperand::Literal(literal) => {
            parameters.push(match literal {
                FilterLiteral::Bool(value) => SqlParameter::Integer(i64::from(*value)),
                FilterLiteral::Int(value) => SqlParameter::Integer(*value),
                FilterLiteral::Str(value) => SqlParameter::Text(value.clone()),
            });
            Ok("?".to_string())
        }
    }
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token produced from the filter input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Attribute name.
    Ident(String),
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// `True` literal.
    True,
    /// `False` literal.
    False,
    /// `==` operator.
    Eq,
    /// `!=` operator.
    NotEq,
    /// `and` keyword.
    And,
    /// `or` keyword.
    Or,
    /// `not` keyword.
    Not,
    /// Left parenthesis.
    LParen,
    /// Right parenthesis.
    RParen,
    /// End-of-input marker.
    Eof,
}

impl Token {
    /// Describes the token for diagnostics.
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => name.clone(),
            Self::Str(value) => format!("'{value}'"),
            Self::Int(value) => value.to_string(),
            Self::True => "True".to_string(),
            Self::False => "False".to_string(),
            Self::Eq => "==".to_string(),
            Self::NotEq => "!=".to_string(),
            Self::And => "and".to_string(),
            Self::Or => "or".to_string(),
            Self::Not => "not".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
struct SpannedToken {
    /// Token value.
    token: Token,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer for filter expressions.
struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the input into a sequence of tokens.
    fn lex(mut self) -> Result<Vec<SpannedToken>, FilterError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while self.offset < bytes.len() {
            let start = self.offset;
            let token = match bytes[self.offset] {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                }
                b'(' => {
                    self.offset += 1;
                    Token::LParen
                }
                b')' => {
                    self.offset += 1;
                    Token::RParen
                }
                b'=' | b'!' => {
                    let first = bytes[self.offset];
                    if bytes.get(self.offset + 1) != Some(&b'=') {
                        return Err(FilterError::UnexpectedToken {
                            expected: "`==` or `!=`",
                            found: char::from(first).to_string(),
                            position: start,
                        });
                    }
                    self.offset += 2;
                    if first == b'=' { Token::Eq } else { Token::NotEq }
                }
                b'\'' | b'"' => Token::Str(self.lex_string()?),
                b'-' | b'0' ..= b'9' => Token::Int(self.lex_integer()?),
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    self.consume_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                    keyword_or_ident(&self.input[start .. self.offset])
                }
                other => {
                    let found = self.input[start ..]
                        .chars()
                        .next()
                        .map_or_else(|| char::from(other).to_string(), |ch| ch.to_string());
                    return Err(FilterError::UnexpectedToken {
                        expected: "name, literal, or operator",
                        found,
                        position: start,
                    });
                }
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }

        if tokens.is_empty() {
            return Err(FilterError::EmptyInput);
        }
        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Lexes a quoted string literal starting at the current offset.
    fn lex_string(&mut self) -> Result<String, FilterError> {
        let start = self.offset;
        let quote = self.input.as_bytes()[start];
        let mut value = String::new();
        let mut chars = self.input[start + 1 ..].char_indices();
        while let Some((index, ch)) = chars.next() {
            match ch {
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                ch if u32::from(ch) == u32::from(quote) => {
                    self.offset = start + 1 + index + 1;
                    return Ok(value);
                }
                ch => value.push(ch),
            }
        }
        Err(FilterError::UnterminatedString {
            position: start,
        })
    }

    /// Lexes an optionally negative integer literal.
    fn lex_integer(&mut self) -> Result<i64, FilterError> {
        let start = self.offset;
        if self.input.as_bytes()[start] == b'-' {
            self.offset += 1;
        }
        let digits_start = self.offset;
        self.consume_while(|b| b.is_ascii_digit());
        let raw = &self.input[start .. self.offset];
        if self.offset == digits_start {
            return Err(FilterError::InvalidNumber {
                raw: raw.to_string(),
                position: start,
            });
        }
        raw.parse::<i64>().map_err(|_| FilterError::InvalidNumber {
            raw: raw.to_string(),
            position: start,
        })
    }

    /// Advances while the condition matches the current byte.
    fn consume_while<F>(&mut self, condition: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&b) = self.input.as_bytes().get(self.offset) {
            if condition(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }
}

/// Maps a word to a keyword token or identifier token.
fn keyword_or_ident(word: &str) -> Token {
    match word {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "True" => Token::True,
        "False" => Token::False,
        _ => Token::Ident(word.to_string()),
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser for filter expressions.
struct Parser {
    /// Token stream with source positions.
    tokens: Vec<SpannedToken>,
    /// Current token index.
    index: usize,
    /// Current nesting depth.
    nesting: usize,
}

impl Parser {
    /// Creates a parser over the token stream.
    const fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> Result<FilterNode, FilterError> {
        self.parse_or()
    }

    /// Parses OR expressions.
    fn parse_or(&mut self) -> Result<FilterNode, FilterError> {
        let mut parts = vec![self.parse_and()?];
        while self.matches(&Token::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { FilterNode::Or(parts) })
    }

    /// Parses AND expressions.
    fn parse_and(&mut self) -> Result<FilterNode, FilterError> {
        let mut parts = vec![self.parse_not()?];
        while self.matches(&Token::And) {
            parts.push(self.parse_not()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { FilterNode::And(parts) })
    }

    /// Parses NOT expressions.
    fn parse_not(&mut self) -> Result<FilterNode, FilterError> {
        let position = self.current().position;
        if self.matches(&Token::Not) {
            self.enter(position)?;
            let inner = self.parse_not();
            self.nesting -= 1;
            return Ok(FilterNode::Not(Box::new(inner?)));
        }
        self.parse_comparison()
    }

    /// Parses a comparison or a bare operand.
    fn parse_comparison(&mut self) -> Result<FilterNode, FilterError> {
        if self.current().token == Token::LParen {
            let position = self.current().position;
            self.advance();
            self.enter(position)?;
            let inner = self.parse_expression();
            self.nesting -= 1;
            let inner = inner?;
            self.expect(&Token::RParen, "`)`")?;
            return Ok(inner);
        }
        let left = self.parse_operand()?;
        let op = match self.current().token {
            Token::Eq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            _ => return Ok(FilterNode::Operand(left)),
        };
        self.advance();
        let right = self.parse_operand()?;
        if matches!(self.current().token, Token::Eq | Token::NotEq) {
            return Err(FilterError::ChainedComparison {
                position: self.current().position,
            });
        }
        Ok(FilterNode::Compare {
            left,
            op,
            right,
        })
    }

    /// Parses a name or literal operand.
    fn parse_operand(&mut self) -> Result<FilterOperand, FilterError> {
        let operand = match &self.current().token {
            Token::Ident(name) => FilterOperand::Attribute(name.clone()),
            Token::Str(value) => FilterOperand::Literal(FilterLiteral::Str(value.clone())),
            Token::Int(value) => FilterOperand::Literal(FilterLiteral::Int(*value)),
            Token::True => FilterOperand::Literal(FilterLiteral::Bool(true)),
            Token::False => FilterOperand::Literal(FilterLiteral::Bool(false)),
            other => {
                return Err(FilterError::UnexpectedToken {
                    expected: "name or literal",
                    found: other.describe(),
                    position: self.current().position,
                });
            }
        };
        self.advance();
        Ok(operand)
    }

    /// Increments nesting depth, enforcing the limit.
    fn enter(&mut self, position: usize) -> Result<(), FilterError> {
        if self.nesting >= MAX_FILTER_NESTING {
            return Err(FilterError::NestingTooDeep {
                max_depth: MAX_FILTER_NESTING,
                position,
            });
        }
        self.nesting += 1;
        Ok(())
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    /// Advances to the next token.
    const fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    /// Advances when the current token matches.
    fn matches(&mut self, token: &Token) -> bool {
        if &self.current().token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Requires the current token to match.
    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), FilterError> {
        if self.matches(token) {
            Ok(())
        } else {
            Err(FilterError::UnexpectedToken {
                expected,
                found: self.current().token.describe(),
                position: self.current().position,
            })
        }
    }

    /// Requires the input to be fully consumed.
    fn expect_eof(&self) -> Result<(), FilterError> {
        match &self.current().token {
            Token::Eof => Ok(()),
            other => Err(FilterError::UnexpectedToken {
                expected: "end of input",
                found: other.describe(),
                position: self.current().position,
            }),
        }
    }
}
