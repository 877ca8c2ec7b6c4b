//! Message classifier (spec.md §4.2): checks the signature byte, dispatches
//! on `message_type`, and builds a `LogicalMessage` by handing the
//! remaining bytes to `meter_decode::decode_param_map`.

mod cursor;

use cursor::Cursor;
use meter_decode::{DecodeError, decode_param_map};
use meter_proto::{LogicalMessage, MessageKind, PROTOCOL_SIGNATURE};
use meter_transport::ReassembledMessage;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("bad signature byte {0:#x}, expected {PROTOCOL_SIGNATURE:#x}")]
    BadSignature(u8),
    #[error("unknown message_type {0}")]
    UnknownMessageKind(u8),
    #[error("command body truncated before its header fields were read")]
    Truncated,
}

/// Classifies one reassembled command body into a `LogicalMessage`, or
/// reports why it couldn't be. The caller (the engine) is responsible for
/// counting failures into `malformed_total` — this function only detects.
pub fn classify(msg: &ReassembledMessage) -> Result<LogicalMessage, ClassifyError> {
    classify_verbose(msg).map(|(logical, _)| logical)
}

/// Same as [`classify`], but also surfaces the decoder's own diagnosis when
/// the param map only decoded partially (spec.md §7's "UnknownTag: ...
/// dump raw body"). The engine is the caller that owns the unknown-payload
/// sink and decides whether/where to write `msg.body`; this crate only
/// detects.
pub fn classify_verbose(
    msg: &ReassembledMessage,
) -> Result<(LogicalMessage, Option<DecodeError>), ClassifyError> {
    let mut cursor = Cursor::new(&msg.body);

    let signature = cursor.read_u8().ok_or(ClassifyError::Truncated)?;
    if signature != PROTOCOL_SIGNATURE {
        debug!(flow = %msg.flow, signature, "bad signature byte");
        return Err(ClassifyError::BadSignature(signature));
    }

    let message_type = cursor.read_u8().ok_or(ClassifyError::Truncated)?;
    let kind =
        MessageKind::try_from(message_type).map_err(ClassifyError::UnknownMessageKind)?;

    let code = cursor.read_u8().ok_or(ClassifyError::Truncated)?;

    let (return_code, debug_str) = match kind {
        MessageKind::Response => {
            let return_code = cursor.read_i16().ok_or(ClassifyError::Truncated)?;
            let debug_str = cursor.read_string().ok_or(ClassifyError::Truncated)?;
            (Some(return_code), Some(debug_str))
        }
        MessageKind::Request | MessageKind::Event => (None, None),
    };

    let outcome = decode_param_map(cursor.remaining());
    if let Some(err) = &outcome.error {
        debug!(flow = %msg.flow, code, error = %err, "partial param map, unknown tag sink triggered");
    }

    let logical = LogicalMessage {
        channel: msg.channel,
        reliable: msg.reliable,
        seq: msg.seq,
        kind,
        code,
        return_code,
        debug_str,
        params: outcome.params,
    };
    Ok((logical, outcome.error))
}
