//! Encoder used only by the round-trip test (`decode(encode(x)) == x`,
//! spec §8). Never exposed outside this crate: nothing in the live pipeline
//! re-encodes a `Value` tree.

use meter_proto::{ParamMap, Tag, Value};

pub fn encode_param_map(params: &ParamMap) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(params.len() as i16).to_be_bytes());
    for (key, value) in params {
        out.push(*key);
        out.extend_from_slice(&encode_tagged_value(value));
    }
    out
}

/// Encode a single value as `tag byte + body`.
pub fn encode_tagged_value(value: &Value) -> Vec<u8> {
    let mut out = vec![tag_of(value) as u8];
    encode_value_body(value, &mut out);
    out
}

fn tag_of(value: &Value) -> Tag {
    match value {
        Value::Nil => Tag::Nil,
        Value::Bool(_) => Tag::Bool,
        Value::I8(_) => Tag::I8,
        Value::I16(_) => Tag::I16,
        Value::I32(_) => Tag::I32,
        Value::I64(_) => Tag::I64,
        Value::F32(_) => Tag::F32,
        Value::F64(_) => Tag::F64,
        Value::String(_) => Tag::String,
        Value::Bytes(_) => Tag::ByteArray,
        Value::Custom(..) => Tag::Custom,
        // Always encoded via the generic header-tag array: decoding tag
        // 121 with any element tag produces the same `TypedArray` value
        // that the 97/104 shorthand tags would, so there's no need to
        // special-case string/i32 arrays on the write side.
        Value::TypedArray(..) => Tag::Array,
        // Always encoded with per-entry tags (101): correct regardless of
        // whether all keys/values share one type, unlike tag 68.
        Value::Dict(_) => Tag::Dictionary,
        Value::ObjectArray(_) => Tag::ObjectArray,
    }
}

fn encode_value_body(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil => {}
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::I8(v) => out.push(*v as u8),
        Value::I16(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::I64(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::F32(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::F64(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::String(s) => {
            out.extend_from_slice(&(s.len() as i16).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.extend_from_slice(&(b.len() as i32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::Custom(code, bytes) => {
            out.push(*code as u8);
            out.extend_from_slice(&(bytes.len() as i16).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Value::TypedArray(elem_tag, items) => {
            out.extend_from_slice(&(items.len() as i16).to_be_bytes());
            out.push(*elem_tag as u8);
            for item in items {
                encode_value_body(item, out);
            }
        }
        Value::ObjectArray(items) => {
            out.extend_from_slice(&(items.len() as i16).to_be_bytes());
            for item in items {
                out.extend_from_slice(&encode_tagged_value(item));
            }
        }
        Value::Dict(pairs) => {
            out.extend_from_slice(&(pairs.len() as i16).to_be_bytes());
            for (k, v) in pairs {
                out.extend_from_slice(&encode_tagged_value(k));
                out.extend_from_slice(&encode_tagged_value(v));
            }
        }
    }
}
