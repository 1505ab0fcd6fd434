//! The record-set wire format used by the REST proxy backend.
//!
//! One payload frames a whole batch sharing one key:
//!
//! ```text
//! varint(keySchemaVersion)
//! varint(valueSchemaVersion)
//! <key datum, binary-encoded under the key schema>
//! varint(n)                          -- block of n value blobs
//!   varint(len) <len bytes>          -- each blob independently encoded
//!   ...
//! varint(0)                          -- end of blocks
//! ```
//!
//! Value blobs are pulled from the batch's lazy encoding iterator, so a
//! blob that fails to encode aborts the build without encoding the rest.

use bytes::{BufMut, Bytes, BytesMut};

use super::varint::write_varint;
use crate::data::RecordData;
use crate::Result;

/// Frames a batch into one record-set payload.
///
/// # Errors
///
/// Returns [`Error::Encoding`](crate::Error::Encoding) if the key or any
/// value does not match its schema.
pub fn encode_record_set<D: RecordData>(
    key_version: i32,
    value_version: i32,
    data: &D,
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(256);
    write_varint(&mut buf, i64::from(key_version));
    write_varint(&mut buf, i64::from(value_version));

    buf.put_slice(&data.encoded_key()?);

    let values = data.encoded_values();
    if values.len() > 0 {
        write_varint(&mut buf, values.len() as i64);
        for blob in values {
            let blob = blob?;
            write_varint(&mut buf, blob.len() as i64);
            buf.put_slice(&blob);
        }
    }
    write_varint(&mut buf, 0);

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AvroRecordData;
    use crate::topic::AvroTopic;
    use apache_avro::types::Value;
    use std::sync::Arc;

    const KEY_SCHEMA: &str = r#"{
        "type": "record", "name": "Key", "fields": [
            {"name": "projectId", "type": ["null", "string"]},
            {"name": "userId", "type": ["null", "string"]},
            {"name": "sourceId", "type": "string"}
        ]
    }"#;

    const VALUE_SCHEMA: &str = r#"{
        "type": "record", "name": "Blob", "fields": [
            {"name": "payload", "type": {"type": "fixed", "name": "P20", "size": 20}}
        ]
    }"#;

    fn topic() -> Arc<AvroTopic> {
        Arc::new(AvroTopic::parse("test", KEY_SCHEMA, VALUE_SCHEMA).unwrap())
    }

    fn sparse_key(source_id: &str) -> Value {
        Value::Record(vec![
            ("projectId".into(), Value::Union(0, Box::new(Value::Null))),
            ("userId".into(), Value::Union(0, Box::new(Value::Null))),
            ("sourceId".into(), Value::String(source_id.into())),
        ])
    }

    #[test]
    fn matches_reference_bytes() {
        let value = Value::Record(vec![(
            "payload".into(),
            Value::Fixed(20, vec![0u8; 20]),
        )]);
        let data = AvroRecordData::from_values(topic(), sparse_key("b"), vec![value], 0);

        let bytes = encode_record_set(1, 2, &data).unwrap();

        let mut expected = vec![
            2, // key schema version 1
            4, // value schema version 2
            0, // projectId: null branch
            0, // userId: null branch
            2, b'b', // sourceId: "b"
            2,  // one blob in this block
            40, // blob length 20
        ];
        expected.extend_from_slice(&[0u8; 20]);
        expected.push(0); // end of blocks
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn several_records_share_one_block() {
        let value = |b: u8| {
            Value::Record(vec![(
                "payload".into(),
                Value::Fixed(20, vec![b; 20]),
            )])
        };
        let data = AvroRecordData::from_values(
            topic(),
            sparse_key("src"),
            vec![value(1), value(2), value(3)],
            0,
        );

        let bytes = encode_record_set(1, 1, &data).unwrap();

        // versions + key, then: count 3, three (len + 20 bytes), terminator
        let tail = &bytes[bytes.len() - (1 + 3 * 21 + 1)..];
        assert_eq!(tail[0], 6); // zig-zag 3
        assert_eq!(tail[1], 40);
        assert_eq!(*tail.last().unwrap(), 0);
    }

    #[test]
    fn empty_batch_is_just_headers_and_terminator() {
        let data = AvroRecordData::from_values(topic(), sparse_key("s"), vec![], 0);
        let bytes = encode_record_set(3, 5, &data).unwrap();

        // versions, key (0, 0, "s"), empty block list terminator
        assert_eq!(bytes.as_ref(), &[6, 10, 0, 0, 2, b's', 0]);
    }

    #[test]
    fn bad_value_aborts_encoding() {
        let data = AvroRecordData::from_values(
            topic(),
            sparse_key("s"),
            vec![Value::Record(vec![("payload".into(), Value::Int(1))])],
            0,
        );

        assert!(encode_record_set(1, 1, &data).is_err());
    }
}
