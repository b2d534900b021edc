//! Generic ordered document tree.
//!
//! A [`DocumentNode`] is a named node whose fields appear in an order fixed
//! by the CFDI schema (see [`crate::core::schema`]), never by insertion or
//! alphabetical order. Absent fields are omitted from rendering entirely;
//! a field explicitly set to an empty string is present and renders empty.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// A field value inside a [`DocumentNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    /// Exact decimal; rendered with the scale it carries (trailing zeros kept).
    Amount(Decimal),
    /// Zone-less local timestamp, rendered as `AAAA-MM-DDThh:mm:ss`.
    DateTime(NaiveDateTime),
    Node(DocumentNode),
    Sequence(Vec<Value>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            Value::Amount(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&DocumentNode> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Amount(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::DateTime(t)
    }
}

impl From<DocumentNode> for Value {
    fn from(n: DocumentNode) -> Self {
        Value::Node(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

/// Named node with a schema-fixed field order.
///
/// Construction is the normal build pattern: fields are filled in as the
/// builder computes them, and the node is treated as immutable once handed
/// to the canonical serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    kind: &'static str,
    order: &'static [&'static str],
    values: Vec<Option<Value>>,
}

impl DocumentNode {
    /// Create an empty node of the given kind with its schema field order.
    pub fn new(kind: &'static str, order: &'static [&'static str]) -> Self {
        Self {
            kind,
            order,
            values: vec![None; order.len()],
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Store a value under `field`.
    ///
    /// # Panics
    ///
    /// Panics if `field` is not part of this node kind's schema. Writing an
    /// unknown field is a programmer error in the build configuration, not a
    /// runtime fault.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        let idx = self.index_of(field);
        self.values[idx] = Some(value.into());
    }

    /// Store a value if present, otherwise drop the field from output.
    pub fn set_opt<V: Into<Value>>(&mut self, field: &str, value: Option<V>) {
        let idx = self.index_of(field);
        self.values[idx] = value.map(Into::into);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        let idx = self.order.iter().position(|f| *f == field)?;
        self.values[idx].as_ref()
    }

    /// Present fields in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.order
            .iter()
            .zip(self.values.iter())
            .filter_map(|(name, value)| value.as_ref().map(|v| (*name, v)))
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    fn index_of(&self, field: &str) -> usize {
        self.order
            .iter()
            .position(|f| *f == field)
            .unwrap_or_else(|| {
                panic!("field '{field}' is not part of node kind '{}'", self.kind)
            })
    }
}
