//! Operation codec
//!
//! Encodes operations into the `changes` payload of a [`VersionedUpdate`]
//! and back. The payload is itself JSON, carried as a string field so the
//! outer message shape stays stable regardless of the operation encoding.

use cowrite_core::{OpKind, Operation};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::VersionedUpdate;

/// The serialized form of one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpPayload {
    kind: OpKind,
    position: usize,
    text: String,
}

/// Encode one operation into a `changes` payload
pub fn encode_op(op: &Operation) -> ProtocolResult<String> {
    let payload = OpPayload {
        kind: op.kind,
        position: op.position,
        text: op.text.clone(),
    };
    serde_json::to_string(&payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

/// Decode a `changes` payload back into an operation.
///
/// Attribution (`client_id`, `base_version`) travels outside the payload and
/// is re-attached here.
pub fn decode_op(changes: &str, client_id: &str, base_version: u64) -> ProtocolResult<Operation> {
    let payload: OpPayload =
        serde_json::from_str(changes).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    Ok(Operation {
        kind: payload.kind,
        position: payload.position,
        text: payload.text,
        client_id: client_id.to_string(),
        base_version,
    })
}

/// Encode a pending batch into wire updates, all based on `base_version`
pub fn encode_batch(ops: &[Operation], base_version: u64) -> ProtocolResult<Vec<VersionedUpdate>> {
    ops.iter()
        .map(|op| {
            Ok(VersionedUpdate {
                version: base_version,
                changes: encode_op(op)?,
                client_id: op.client_id.clone(),
            })
        })
        .collect()
}

/// Decode one wire update into the operation it sequences
pub fn decode_update(update: &VersionedUpdate) -> ProtocolResult<Operation> {
    decode_op(&update.changes, &update.client_id, update.version)
}
