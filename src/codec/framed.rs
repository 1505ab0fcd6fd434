//! Single-record framing for the direct broker backend.
//!
//! Each record travels as a 1-byte format marker, the registered schema id
//! as a 4-byte big-endian integer, then the record's binary encoding. Any
//! consumer of the same convention can recover the schema from the id
//! before touching the payload.

use apache_avro::types::Value;
use apache_avro::Schema;
use bytes::{BufMut, Bytes, BytesMut};

use crate::data::encode_datum;
use crate::Result;

/// Leading marker byte of every framed record.
pub const FORMAT_MARKER: u8 = 0x00;

/// Frames bytes the caller has already encoded.
pub fn frame_payload(schema_id: i32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(FORMAT_MARKER);
    buf.put_i32(schema_id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encodes a record under its schema and frames the result.
///
/// # Errors
///
/// Returns [`Error::Encoding`](crate::Error::Encoding) if the record does
/// not match the schema.
pub fn encode_framed(schema_id: i32, schema: &Schema, value: &Value) -> Result<Bytes> {
    Ok(frame_payload(schema_id, &encode_datum(schema, value)?))
}
