//! Value trees produced by decoding and consumed by encoding.

use std::fmt;

use bytes::Bytes;

/// A decoded IE value, one variant per descriptor kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer field
    Uint(u64),
    /// Signed integer field
    Int(i64),
    /// Single-bit flag
    Bool(bool),
    /// Tag-only IE (TS 24.007 type 2)
    Null,
    /// Octet buffer; bit-granular buffers are left-aligned
    Bytes(Bytes),
    /// BCD digit string
    Bcd(String),
    /// Ordered named sub-fields
    Envelope(Fields),
    /// Selected variant of a choice
    Choice {
        /// Discriminant of the selected variant
        key: u64,
        /// Value of the variant
        value: Box<Value>,
    },
    /// Repeated or fixed-count elements
    Sequence(Vec<Value>),
    /// Content captured without a descriptor
    Unknown {
        /// Tag or discriminant that was not recognised
        tag: u64,
        /// Raw octets
        raw: Bytes,
    },
}

impl Value {
    /// Builds a byte buffer value.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Value::Bytes(data.into())
    }

    /// Builds a choice value.
    pub fn choice(key: u64, value: Value) -> Self {
        Value::Choice {
            key,
            value: Box::new(value),
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint",
            Value::Int(_) => "int",
            Value::Bool(_) => "flag",
            Value::Null => "null",
            Value::Bytes(_) => "bytes",
            Value::Bcd(_) => "bcd",
            Value::Envelope(_) => "envelope",
            Value::Choice { .. } => "choice",
            Value::Sequence(_) => "sequence",
            Value::Unknown { .. } => "unknown",
        }
    }

    /// Returns the integer of a `Uint` value, or a flag as 0/1.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Returns the integer of an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the octets of a `Bytes` or `Unknown` value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) | Value::Unknown { raw: b, .. } => Some(b),
            _ => None,
        }
    }

    /// Returns the digits of a `Bcd` value.
    pub fn as_bcd(&self) -> Option<&str> {
        match self {
            Value::Bcd(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the sub-fields of an `Envelope` value.
    pub fn as_fields(&self) -> Option<&Fields> {
        match self {
            Value::Envelope(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the discriminant and inner value of a `Choice` value.
    pub fn as_choice(&self) -> Option<(u64, &Value)> {
        match self {
            Value::Choice { key, value } => Some((*key, value)),
            _ => None,
        }
    }

    /// Returns the elements of a `Sequence` value.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a field of an `Envelope` value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_fields().and_then(|f| f.get(name))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Uint(u64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Fields> for Value {
    fn from(f: Fields) -> Self {
        Value::Envelope(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

/// An insertion-ordered map of field names to values.
///
/// Decoding fills fields in descriptor order. Names are unique; inserting
/// an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns a mutable field by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the integer value of a field.
    pub fn uint(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_uint)
    }

    /// Removes a field and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns true if the field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no field is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (n, v) in iter {
            fields.insert(n, v);
        }
        fields
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::Null => write!(f, "present"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Bcd(s) => write!(f, "{s}"),
            Value::Envelope(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Choice { key, value } => write!(f, "<{key}> {value}"),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Unknown { tag, raw } => write!(f, "unknown({tag:#x}: 0x{})", hex::encode(raw)),
        }
    }
}
