//! Binary wire formats.
//!
//! Two independent formats share the same integer primitives: the
//! [`record_set`] batch format consumed by the REST proxy, and the
//! [`framed`] single-record format written straight to the broker.

pub mod framed;
pub mod record_set;
pub mod varint;

pub use framed::{encode_framed, frame_payload, FORMAT_MARKER};
pub use record_set::encode_record_set;
pub use varint::{read_varint, write_varint};
