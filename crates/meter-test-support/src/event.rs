//! Event-body encoders for building synthetic combat-protocol traffic in
//! tests: the `{signature, message_type, code}` header spec.md §4.2
//! describes, followed by an encoded `ParamMap` in the §4.3 tag format.
//!
//! Deliberately independent of `meter-decode`'s own round-trip-only test
//! encoder (that one is private to its crate and scoped to exercising
//! `decode(encode(x)) == x`): this one is the crate-root integration
//! tests' and other suites' way to hand-build whole `Event` command
//! bodies, not just isolated `Value`s.

use meter_proto::{ParamMap, Tag, Value, PROTOCOL_SIGNATURE};

/// One complete `Event` command body: signature byte, `message_type = 4`,
/// `code`, then the encoded param map.
pub fn event_body(code: u8, params: &ParamMap) -> Vec<u8> {
    let mut body = vec![PROTOCOL_SIGNATURE, 4, code];
    body.extend_from_slice(&encode_param_map(params));
    body
}

/// One complete `Response` command body, for tests that need to exercise
/// the classifier's `return_code`/`debug_str` fields.
pub fn response_body(code: u8, return_code: i16, debug_str: &str, params: &ParamMap) -> Vec<u8> {
    let mut body = vec![PROTOCOL_SIGNATURE, 3, code];
    body.extend_from_slice(&return_code.to_be_bytes());
    body.extend_from_slice(&(debug_str.len() as i16).to_be_bytes());
    body.extend_from_slice(debug_str.as_bytes());
    body.extend_from_slice(&encode_param_map(params));
    body
}

pub fn encode_param_map(params: &ParamMap) -> Vec<u8> {
    let mut out = (params.len() as i16).to_be_bytes().to_vec();
    for (key, value) in params {
        out.push(*key);
        out.extend_from_slice(&encode_tagged_value(value));
    }
    out
}

fn encode_tagged_value(value: &Value) -> Vec<u8> {
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
        Value::TypedArray(..) => Tag::Array,
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

/// `{0: target_id, 2: value_delta, 6: actor_id}` (spec.md §4.4). Pass
/// `actor_id = None` to omit key 6 (the self-heal fallback path).
pub fn health_update_params(target_id: i32, value_delta: i32, actor_id: Option<i32>) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(0, Value::I32(target_id));
    params.insert(2, Value::I32(value_delta));
    if let Some(actor_id) = actor_id {
        params.insert(6, Value::I32(actor_id));
    }
    params
}

/// `{0: actor_id, 1: name, 40: item_ids[]}`.
pub fn player_joined_params(actor_id: i32, name: &str, item_ids: &[i32]) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(0, Value::I32(actor_id));
    params.insert(1, Value::String(name.to_owned()));
    params.insert(
        40,
        Value::TypedArray(Tag::I32, item_ids.iter().map(|&id| Value::I32(id)).collect()),
    );
    params
}

/// `{5: names[]}`.
pub fn party_update_params(names: &[&str]) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(
        5,
        Value::TypedArray(
            Tag::String,
            names.iter().map(|name| Value::String((*name).to_owned())).collect(),
        ),
    );
    params
}

/// `{0: actor_id, 1: name}`.
pub fn self_identified_params(actor_id: i32, name: &str) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(0, Value::I32(actor_id));
    params.insert(1, Value::String(name.to_owned()));
    params
}

/// `{0: actor_id, 1: in_combat}`.
pub fn combat_state_change_params(actor_id: i32, in_combat: bool) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(0, Value::I32(actor_id));
    params.insert(1, Value::Bool(in_combat));
    params
}

/// `{1: fame}`.
pub fn fame_gained_params(fame: i64) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(1, Value::I64(fame));
    params
}
