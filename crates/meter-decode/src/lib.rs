//! Recursive-descent decoder for the self-describing, tag-keyed payload
//! dictionary format (spec §4.3).
//!
//! The wire format for a top-level `ParamMap` is an `i16` entry count
//! followed by `(key: u8, tag: u8, value_body)` triples — this framing
//! isn't named explicitly by the reverse-engineered tag table, so it's an
//! implementation decision recorded in DESIGN.md, not a guess about any
//! single entry's own tag semantics (those match spec.md's table exactly).

mod cursor;
#[cfg(test)]
mod encode;

use cursor::Cursor;
use meter_proto::{ParamMap, Tag, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    #[error("unknown tag byte {0}")]
    UnknownTag(u8),
    #[error("invalid utf-8 string")]
    InvalidUtf8,
    #[error("negative length {0}")]
    NegativeLength(i32),
}

/// Result of decoding a top-level `ParamMap`. Never fails outright: on any
/// error the entries parsed before the failure are kept and the
/// undecoded tail is captured for the unknown-payload sink, per spec §4.3's
/// "recoverable error, not fatal" rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub params: ParamMap,
    pub error: Option<DecodeError>,
    /// Bytes from the point decoding stopped, dumped to the unknown-payload
    /// sink by the caller. `None` when decoding consumed the whole buffer.
    pub raw_remainder: Option<Vec<u8>>,
}

pub fn decode_param_map(data: &[u8]) -> DecodeOutcome {
    let mut cursor = Cursor::new(data);
    let mut params = ParamMap::new();

    let count = match cursor.read_i16() {
        Some(n) if n >= 0 => n,
        Some(n) => {
            return DecodeOutcome {
                params,
                error: Some(DecodeError::NegativeLength(i32::from(n))),
                raw_remainder: Some(data.to_vec()),
            };
        }
        None => {
            return DecodeOutcome {
                params,
                error: Some(DecodeError::UnexpectedEof),
                raw_remainder: Some(data.to_vec()),
            };
        }
    };

    for _ in 0..count {
        let entry_start = cursor.remaining();
        match decode_entry(&mut cursor) {
            Ok((key, value)) => {
                params.insert(key, value);
            }
            Err(e) => {
                return DecodeOutcome {
                    params,
                    error: Some(e),
                    raw_remainder: Some(entry_start.to_vec()),
                };
            }
        }
    }

    DecodeOutcome {
        params,
        error: None,
        raw_remainder: None,
    }
}

fn decode_entry(cursor: &mut Cursor<'_>) -> Result<(u8, Value), DecodeError> {
    let key = cursor.read_u8().ok_or(DecodeError::UnexpectedEof)?;
    let value = decode_tagged_value(cursor)?;
    Ok((key, value))
}

/// Read a tag byte, then its body.
pub fn decode_tagged_value(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    let tag_byte = cursor.read_u8().ok_or(DecodeError::UnexpectedEof)?;
    let tag = Tag::try_from(tag_byte).map_err(DecodeError::UnknownTag)?;
    decode_value_body(cursor, tag)
}

fn non_negative(n: i32) -> Result<usize, DecodeError> {
    usize::try_from(n).map_err(|_| DecodeError::NegativeLength(n))
}

fn decode_value_body(cursor: &mut Cursor<'_>, tag: Tag) -> Result<Value, DecodeError> {
    match tag {
        Tag::Nil => Ok(Value::Nil),
        Tag::Bool => cursor
            .read_bool()
            .map(Value::Bool)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::I8 => cursor
            .read_i8()
            .map(Value::I8)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::I16 => cursor
            .read_i16()
            .map(Value::I16)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::I32 => cursor
            .read_i32()
            .map(Value::I32)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::I64 => cursor
            .read_i64()
            .map(Value::I64)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::F32 => cursor
            .read_f32()
            .map(Value::F32)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::F64 => cursor
            .read_f64()
            .map(Value::F64)
            .ok_or(DecodeError::UnexpectedEof),
        Tag::String => {
            let len = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            cursor
                .read_string(len)
                .ok_or(DecodeError::UnexpectedEof)?
                .map(Value::String)
                .map_err(|_| DecodeError::InvalidUtf8)
        }
        Tag::ByteArray => {
            let len = non_negative(cursor.read_i32().ok_or(DecodeError::UnexpectedEof)?)?;
            cursor
                .read_bytes(len)
                .map(|b| Value::Bytes(b.to_vec()))
                .ok_or(DecodeError::UnexpectedEof)
        }
        Tag::Custom => {
            let code = cursor.read_i8().ok_or(DecodeError::UnexpectedEof)?;
            let len = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            cursor
                .read_bytes(len)
                .map(|b| Value::Custom(code, b.to_vec()))
                .ok_or(DecodeError::UnexpectedEof)
        }
        Tag::StringArray => {
            let count = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let len = non_negative(i32::from(
                    cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
                ))?;
                let s = cursor
                    .read_string(len)
                    .ok_or(DecodeError::UnexpectedEof)?
                    .map_err(|_| DecodeError::InvalidUtf8)?;
                items.push(Value::String(s));
            }
            Ok(Value::TypedArray(Tag::String, items))
        }
        Tag::I32Array => {
            let count = non_negative(cursor.read_i32().ok_or(DecodeError::UnexpectedEof)?)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(Value::I32(cursor.read_i32().ok_or(DecodeError::UnexpectedEof)?));
            }
            Ok(Value::TypedArray(Tag::I32, items))
        }
        Tag::Array => {
            let count = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            let elem_tag_byte = cursor.read_u8().ok_or(DecodeError::UnexpectedEof)?;
            let elem_tag = Tag::try_from(elem_tag_byte).map_err(DecodeError::UnknownTag)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value_body(cursor, elem_tag)?);
            }
            Ok(Value::TypedArray(elem_tag, items))
        }
        Tag::ObjectArray => {
            let count = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_tagged_value(cursor)?);
            }
            Ok(Value::ObjectArray(items))
        }
        Tag::Dict => {
            let count = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            let key_tag_byte = cursor.read_u8().ok_or(DecodeError::UnexpectedEof)?;
            let key_tag = Tag::try_from(key_tag_byte).map_err(DecodeError::UnknownTag)?;
            let val_tag_byte = cursor.read_u8().ok_or(DecodeError::UnexpectedEof)?;
            let val_tag = Tag::try_from(val_tag_byte).map_err(DecodeError::UnknownTag)?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = decode_value_body(cursor, key_tag)?;
                let val = decode_value_body(cursor, val_tag)?;
                pairs.push((key, val));
            }
            Ok(Value::Dict(pairs))
        }
        Tag::Dictionary => {
            let count = non_negative(i32::from(
                cursor.read_i16().ok_or(DecodeError::UnexpectedEof)?,
            ))?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = decode_tagged_value(cursor)?;
                let val = decode_tagged_value(cursor)?;
                pairs.push((key, val));
            }
            Ok(Value::Dict(pairs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_param_map, encode_tagged_value};

    #[test]
    fn decodes_scalar_entries() {
        let mut params = ParamMap::new();
        params.insert(0, Value::I32(-7));
        params.insert(2, Value::String("Alice".into()));
        params.insert(6, Value::Bool(true));
        let bytes = encode_param_map(&params);
        let outcome = decode_param_map(&bytes);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.params, params);
    }

    #[test]
    fn round_trip_all_tags() {
        let mut params = ParamMap::new();
        params.insert(0, Value::Nil);
        params.insert(1, Value::Bool(false));
        params.insert(2, Value::I8(-3));
        params.insert(3, Value::I16(-300));
        params.insert(4, Value::I32(70000));
        params.insert(5, Value::I64(-1));
        params.insert(6, Value::F32(1.5));
        params.insert(7, Value::F64(-2.25));
        params.insert(8, Value::String("hi".into()));
        params.insert(9, Value::Bytes(vec![1, 2, 3]));
        params.insert(10, Value::Custom(5, vec![9, 9]));
        params.insert(
            11,
            Value::TypedArray(Tag::String, vec![Value::String("a".into()), Value::String("b".into())]),
        );
        params.insert(12, Value::TypedArray(Tag::I32, vec![Value::I32(1), Value::I32(2)]));
        params.insert(
            13,
            Value::TypedArray(Tag::Bool, vec![Value::Bool(true), Value::Bool(false)]),
        );
        params.insert(
            14,
            Value::ObjectArray(vec![Value::I32(1), Value::String("x".into())]),
        );
        params.insert(
            15,
            Value::Dict(vec![(Value::String("k".into()), Value::I32(9))]),
        );

        let bytes = encode_param_map(&params);
        let outcome = decode_param_map(&bytes);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.params, params);
    }

    #[test]
    fn unknown_tag_yields_partial_map_and_raw_remainder() {
        let mut params = ParamMap::new();
        params.insert(0, Value::I32(1));
        let mut bytes = encode_param_map(&params);
        // Append a second entry with an invalid tag byte (count must say 2).
        bytes[1] = 2; // bump i16 count low byte to 2
        bytes.push(1); // key
        bytes.push(0xAB); // unknown tag byte
        bytes.push(0xFF); // trailing junk that should be preserved raw

        let outcome = decode_param_map(&bytes);
        assert_eq!(outcome.params.get(&0), Some(&Value::I32(1)));
        assert_eq!(outcome.error, Some(DecodeError::UnknownTag(0xAB)));
        let remainder = outcome.raw_remainder.expect("raw remainder present");
        assert_eq!(remainder, vec![1, 0xAB, 0xFF]);
    }

    #[test]
    fn truncated_buffer_is_recoverable_not_a_panic() {
        let outcome = decode_param_map(&[0, 1, 5]);
        assert!(outcome.params.is_empty());
        assert_eq!(outcome.error, Some(DecodeError::UnexpectedEof));
    }

    #[test]
    fn encode_tagged_value_helper_round_trips_single_value() {
        let v = Value::I32(42);
        let bytes = encode_tagged_value(&v);
        let mut cursor = Cursor::new(&bytes);
        let decoded = decode_tagged_value(&mut cursor).unwrap();
        assert_eq!(decoded, v);
    }
}
