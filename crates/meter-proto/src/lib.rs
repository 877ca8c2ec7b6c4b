//! Frozen wire vocabulary for the reliable-UDP combat protocol.
//!
//! This crate carries no behavior: just the endpoint/flow identifiers, the
//! self-describing `Value` tree, and the tag/command constants the
//! transport, classifier and decoder crates all need to agree on. Nothing
//! here parses bytes; see `meter-transport` and `meter-decode` for that.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

// ---------------------------------------------------------------------------
// Endpoints & flows
// ---------------------------------------------------------------------------

/// An IPv4 `(address, port)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Identifies one UDP conversation regardless of which side sent a given
/// datagram: `(a, b)` and `(b, a)` normalize to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey(Endpoint, Endpoint);

impl FlowKey {
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        if src <= dst {
            FlowKey(src, dst)
        } else {
            FlowKey(dst, src)
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.0, self.1)
    }
}

// ---------------------------------------------------------------------------
// Actor / player identifiers
// ---------------------------------------------------------------------------

/// Engine entity id. Not globally unique across zones — callers must clear
/// any `ActorId`-keyed state on zone change.
pub type ActorId = u32;

/// Stable, case-sensitive player name.
pub type PlayerName = String;

// ---------------------------------------------------------------------------
// Transport-layer constants
// ---------------------------------------------------------------------------

/// Command kinds carried inside a reliable-UDP datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Unreliable = 6,
    Reliable = 7,
    ReliableFragment = 8,
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(CommandType::Unreliable),
            7 => Ok(CommandType::Reliable),
            8 => Ok(CommandType::ReliableFragment),
            other => Err(other),
        }
    }
}

/// Signature byte every command body begins with in the observed dialect.
pub const PROTOCOL_SIGNATURE: u8 = 0xF3;

/// Top-level message kind, dispatched on by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Request = 2,
    Response = 3,
    Event = 4,
}

impl TryFrom<u8> for MessageKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(MessageKind::Request),
            3 => Ok(MessageKind::Response),
            4 => Ok(MessageKind::Event),
            other => Err(other),
        }
    }
}

/// A fully reassembled, classified message. Transient — consumed by the
/// decoder/semantics stages and never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalMessage {
    pub channel: u8,
    pub reliable: bool,
    pub seq: u16,
    pub kind: MessageKind,
    pub code: u8,
    /// Present on `Response` only; `None` for `Request`/`Event`.
    pub return_code: Option<i16>,
    /// Present on `Response` only.
    pub debug_str: Option<String>,
    pub params: ParamMap,
}

// ---------------------------------------------------------------------------
// Self-describing value tree
// ---------------------------------------------------------------------------

/// One-byte tag discriminants for the payload dictionary format. Values
/// match the wire byte exactly so decode dispatch is a single `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Nil = 0,
    Dict = 68,
    StringArray = 97,
    I8 = 98,
    Custom = 99,
    F64 = 100,
    Dictionary = 101,
    I32Array = 104,
    I64 = 105,
    I16 = 107,
    I32 = 108,
    F32 = 109,
    Bool = 111,
    String = 115,
    ByteArray = 120,
    Array = 121,
    ObjectArray = 122,
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tag::Nil),
            68 => Ok(Tag::Dict),
            97 => Ok(Tag::StringArray),
            98 => Ok(Tag::I8),
            99 => Ok(Tag::Custom),
            100 => Ok(Tag::F64),
            101 => Ok(Tag::Dictionary),
            104 => Ok(Tag::I32Array),
            105 => Ok(Tag::I64),
            107 => Ok(Tag::I16),
            108 => Ok(Tag::I32),
            109 => Ok(Tag::F32),
            111 => Ok(Tag::Bool),
            115 => Ok(Tag::String),
            120 => Ok(Tag::ByteArray),
            121 => Ok(Tag::Array),
            122 => Ok(Tag::ObjectArray),
            other => Err(other),
        }
    }
}

/// The self-describing value tree carried by every `ParamMap` entry.
///
/// A closed sum type, not a dynamic attribute bag: consumers match on the
/// variant they expect and treat a mismatch as absence, never as a panic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Custom-type-code-tagged opaque bytes (tag 99): `(custom_type_code, bytes)`.
    Custom(i8, Vec<u8>),
    /// Tag 121: a header tag read once, followed by `n` values of that tag.
    /// Also used to represent tags 97 (`StringArray`) and 104 (`I32Array`),
    /// whose element tag is implied by the outer tag rather than read from
    /// the body.
    TypedArray(Tag, Vec<Value>),
    /// Tags 68 (`Dict`, types declared once) and 101 (`Dictionary`,
    /// per-entry tags) both normalize to this: an ordered list of key/value
    /// pairs. Insertion order is preserved but not semantically meaningful.
    Dict(Vec<(Value, Value)>),
    /// Tag 122: each entry carries its own tag and data.
    ObjectArray(Vec<Value>),
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            Value::I16(v) => Some(i32::from(*v)),
            Value::I8(v) => Some(i32::from(*v)),
            Value::I64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(i64::from(*v)),
            Value::I16(v) => Some(i64::from(*v)),
            Value::I8(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Interpret as a list of strings, the shape `PlayerJoined`'s item array
    /// and `PartyUpdate`'s name array both use.
    pub fn as_string_list(&self) -> Option<Vec<&str>> {
        match self {
            Value::TypedArray(_, items) | Value::ObjectArray(items) => {
                items.iter().map(Value::as_str).collect()
            }
            _ => None,
        }
    }

    /// Interpret as a list of i32s, the shape `PlayerJoined`'s equipped-item
    /// id array uses.
    pub fn as_i32_list(&self) -> Option<Vec<i32>> {
        match self {
            Value::TypedArray(_, items) | Value::ObjectArray(items) => {
                items.iter().map(Value::as_i32).collect()
            }
            _ => None,
        }
    }
}

/// Mapping from one-byte key to `Value`. Keys are unique; iteration order is
/// deterministic (by key) but not semantically meaningful.
pub type ParamMap = BTreeMap<u8, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_key_is_order_independent() {
        let a = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 5055);
        let b = Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 5056);
        assert_eq!(FlowKey::new(a, b), FlowKey::new(b, a));
    }

    #[test]
    fn value_numeric_coercions() {
        assert_eq!(Value::I16(7).as_i32(), Some(7));
        assert_eq!(Value::I32(-100).as_i64(), Some(-100));
        assert_eq!(Value::I64(-100).as_i32(), Some(-100));
        assert_eq!(Value::String("x".into()).as_i32(), None);
    }

    #[test]
    fn command_type_round_trip() {
        assert_eq!(CommandType::try_from(7), Ok(CommandType::Reliable));
        assert_eq!(CommandType::try_from(8), Ok(CommandType::ReliableFragment));
        assert_eq!(CommandType::try_from(42), Err(42));
    }
}
