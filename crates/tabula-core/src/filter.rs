//! Typed filter expressions.
//!
//! A [`Filter`] is built once per request from small `field <op> value`
//! conditions, optionally combined with [`Filter::All`], [`Filter::Any`], and
//! [`Filter::Not`]. Evaluation reads fields through [`Record::field`]; there
//! is no runtime type inspection of the record itself.
//!
//! # Expression syntax
//!
//! [`Filter::parse`] accepts `FIELD<op>VALUE` with these operators:
//!
//! | Op | Meaning |
//! |----|---------|
//! | `=` | equal |
//! | `!=` | not equal |
//! | `^=` | equal, ignoring case |
//! | `>` `>=` `<` `<=` | ordering |
//! | `~` | contains (case-insensitive substring, or list membership) |
//! | `!~` | does not contain |
//!
//! The value is kept as typed (surrounding quotes stripped) and only
//! converted when it meets a field: number, boolean and datetime fields
//! parse it, text fields compare against it verbatim. So `anexo=007`
//! matches the text `007`, while `count=007` matches the number 7. An
//! unquoted `null` is the null value.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::record::Record;
use crate::value::{parse_datetime, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    EqualIgnoreCase,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
}

// Longest symbols first so `>=` wins over `>`.
const OPERATORS: &[(&str, Operator)] = &[
    ("!~", Operator::NotContains),
    ("!=", Operator::NotEqual),
    ("^=", Operator::EqualIgnoreCase),
    (">=", Operator::GreaterThanOrEqual),
    ("<=", Operator::LessThanOrEqual),
    ("=", Operator::Equal),
    (">", Operator::GreaterThan),
    ("<", Operator::LessThan),
    ("~", Operator::Contains),
];

impl Operator {
    pub fn symbol(&self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(sym, _)| *sym)
            .unwrap_or("?")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("no operator in filter expression '{0}' (expected one of = != ^= > >= < <= ~ !~)")]
    MissingOperator(String),
    #[error("empty field name in filter expression '{0}'")]
    EmptyField(String),
}

/// A boolean test over a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition {
        field: String,
        op: Operator,
        value: Value,
    },
    /// True when every child matches. Empty is true.
    All(Vec<Filter>),
    /// True when any child matches. Empty is false.
    Any(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn condition(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Filter::Condition {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::Equal, value)
    }

    pub fn equals_ignore_case(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::EqualIgnoreCase, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::Contains, value)
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Parse a single `FIELD<op>VALUE` condition.
    pub fn parse(expr: &str) -> Result<Self, FilterParseError> {
        let (idx, sym, op) = find_operator(expr)
            .ok_or_else(|| FilterParseError::MissingOperator(expr.to_string()))?;
        let field = expr[..idx].trim();
        if field.is_empty() {
            return Err(FilterParseError::EmptyField(expr.to_string()));
        }
        let value = literal(&expr[idx + sym.len()..]);
        Ok(Self::condition(field, op, value))
    }

    /// Parse several conditions and combine them with AND (or OR when
    /// `any` is set). Returns `None` for an empty list.
    pub fn parse_all<S: AsRef<str>>(
        exprs: &[S],
        any: bool,
    ) -> Result<Option<Self>, FilterParseError> {
        let mut parsed = exprs
            .iter()
            .map(|e| Filter::parse(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match parsed.len() {
            0 => None,
            1 => parsed.pop(),
            _ if any => Some(Filter::Any(parsed)),
            _ => Some(Filter::All(parsed)),
        })
    }

    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        match self {
            Filter::Condition { field, op, value } => match record.field(field) {
                Some(lhs) => eval(&lhs, *op, value),
                None => false,
            },
            Filter::All(children) => children.iter().all(|f| f.matches(record)),
            Filter::Any(children) => children.iter().any(|f| f.matches(record)),
            Filter::Not(inner) => !inner.matches(record),
        }
    }
}

fn literal(raw: &str) -> Value {
    let s = raw.trim();
    if let Some(quoted) = strip_quotes(s) {
        return Value::Text(quoted.to_string());
    }
    if s.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    Value::Text(s.to_string())
}

fn strip_quotes(s: &str) -> Option<&str> {
    if s.len() >= 2 {
        for q in ['"', '\''] {
            if s.starts_with(q) && s.ends_with(q) {
                return Some(&s[1..s.len() - 1]);
            }
        }
    }
    None
}

fn find_operator(expr: &str) -> Option<(usize, &'static str, Operator)> {
    for (idx, _) in expr.char_indices() {
        let rest = &expr[idx..];
        for (sym, op) in OPERATORS {
            if rest.starts_with(sym) {
                return Some((idx, sym, *op));
            }
        }
    }
    None
}

fn eval(lhs: &Value, op: Operator, rhs: &Value) -> bool {
    match op {
        Operator::Equal => equals(lhs, rhs, false),
        Operator::NotEqual => !equals(lhs, rhs, false),
        Operator::EqualIgnoreCase => equals(lhs, rhs, true),
        Operator::GreaterThan => ordered(lhs, rhs, |o| o == Ordering::Greater),
        Operator::GreaterThanOrEqual => ordered(lhs, rhs, |o| o != Ordering::Less),
        Operator::LessThan => ordered(lhs, rhs, |o| o == Ordering::Less),
        Operator::LessThanOrEqual => ordered(lhs, rhs, |o| o != Ordering::Greater),
        Operator::Contains => contains(lhs, rhs),
        Operator::NotContains => !contains(lhs, rhs),
    }
}

/// Bring a literal to the field's kind where that is unambiguous: text
/// fields compare against the literal's text form, other scalar fields
/// parse text literals. A literal that does not parse is left as text and
/// so never compares equal or ordered.
fn align<'a>(lhs: &Value, rhs: &'a Value) -> Cow<'a, Value> {
    let aligned = match (lhs, rhs) {
        (Value::Text(_), Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::DateTime(_)) => {
            Some(Value::Text(rhs.to_string()))
        }
        (Value::Int(_) | Value::Float(_), Value::Text(s)) => parse_number(s),
        (Value::Bool(_), Value::Text(s)) => parse_bool(s),
        (Value::DateTime(_), Value::Text(s)) => parse_datetime(s.trim()).map(Value::DateTime),
        _ => None,
    };
    match aligned {
        Some(value) => Cow::Owned(value),
        None => Cow::Borrowed(rhs),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

fn parse_bool(s: &str) -> Option<Value> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn equals(lhs: &Value, rhs: &Value, ignore_case: bool) -> bool {
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) => a == b,
        (Value::List(items), _) => items.iter().any(|item| equals(item, rhs, ignore_case)),
        _ => {
            let rhs = align(lhs, rhs);
            match (lhs, rhs.as_ref()) {
                (Value::Text(a), Value::Text(b)) if ignore_case => {
                    a.to_lowercase() == b.to_lowercase()
                }
                (l, r) => l.compare(r) == Some(Ordering::Equal),
            }
        }
    }
}

fn ordered(lhs: &Value, rhs: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return false;
    }
    let rhs = align(lhs, rhs);
    lhs.compare(&rhs).map(accept).unwrap_or(false)
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::Text(haystack) => {
            let rhs = align(lhs, rhs);
            match rhs.as_ref() {
                Value::Text(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            }
        }
        Value::List(items) => items.iter().any(|item| equals(item, rhs, false)),
        _ => false,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Condition { field, op, value } => {
                write!(f, "{}{}{}", field, op.symbol(), value)
            }
            Filter::All(children) => write_joined(f, children, " AND ", "true"),
            Filter::Any(children) => write_joined(f, children, " OR ", "false"),
            Filter::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[Filter],
    sep: &str,
    empty: &str,
) -> fmt::Result {
    if children.is_empty() {
        return f.write_str(empty);
    }
    let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    write!(f, "({})", parts.join(sep))
}
