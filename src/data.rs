//! Records and record batches.
//!
//! A batch groups values that share one key so the whole group can be
//! framed and uploaded as a single unit. Encoding is exposed through a lazy
//! iterator: each value is binary-encoded at most once, on demand, so a
//! transport failure early in a request does not pay for encoding the rest.

use apache_avro::types::Value;
use apache_avro::Schema;
use std::sync::Arc;

use crate::topic::AvroTopic;
use crate::{Error, Result};

/// One observation: a sequence number and its value.
///
/// The offset is assigned by the sender that produced the record and
/// increases monotonically per topic sender; the direct backend reports the
/// last offset it handed to the broker. It is not a wire field for the REST
/// backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub offset: i64,
    pub value: Value,
}

/// An ordered collection of records sharing one key.
pub trait RecordData {
    fn topic(&self) -> &Arc<AvroTopic>;

    /// The key every record in this batch belongs to.
    fn key(&self) -> &Value;

    fn records(&self) -> &[Record];

    fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Offset of the last record, if any.
    fn last_offset(&self) -> Option<i64> {
        self.records().last().map(|r| r.offset)
    }

    /// Raw `(key, value)` pairs in order.
    fn pairs(&self) -> Pairs<'_>;

    /// Binary encoding of the key under the topic's key schema.
    fn encoded_key(&self) -> Result<Vec<u8>>;

    /// Lazy iterator over each value's binary encoding, in record order.
    fn encoded_values(&self) -> EncodedValues<'_>;
}

/// Record batch holding dynamically-typed Avro values.
#[derive(Debug, Clone)]
pub struct AvroRecordData {
    topic: Arc<AvroTopic>,
    key: Value,
    records: Vec<Record>,
}

impl AvroRecordData {
    pub fn new(topic: Arc<AvroTopic>, key: Value, records: Vec<Record>) -> Self {
        Self {
            topic,
            key,
            records,
        }
    }

    /// Builds a batch from bare values, assigning offsets `first_offset..`.
    pub fn from_values(
        topic: Arc<AvroTopic>,
        key: Value,
        values: Vec<Value>,
        first_offset: i64,
    ) -> Self {
        let records = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Record {
                offset: first_offset + i as i64,
                value,
            })
            .collect();
        Self::new(topic, key, records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Rough wire size of the encoded batch, without encoding anything.
    ///
    /// Useful for sizing request buffers; the estimate errs high for small
    /// numeric values and is exact for strings and bytes.
    pub fn estimated_size(&self) -> usize {
        let mut size = 16 + estimated_value_size(&self.key);
        for record in &self.records {
            size += 10 + estimated_value_size(&record.value);
        }
        size
    }
}

impl RecordData for AvroRecordData {
    fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    fn key(&self) -> &Value {
        &self.key
    }

    fn records(&self) -> &[Record] {
        &self.records
    }

    fn pairs(&self) -> Pairs<'_> {
        Pairs {
            key: &self.key,
            records: self.records.iter(),
        }
    }

    fn encoded_key(&self) -> Result<Vec<u8>> {
        encode_datum(self.topic.key_schema(), &self.key)
    }

    fn encoded_values(&self) -> EncodedValues<'_> {
        EncodedValues {
            schema: self.topic.value_schema(),
            records: self.records.iter(),
        }
    }
}

/// Iterator over `(key, value)` references of a batch.
pub struct Pairs<'a> {
    key: &'a Value,
    records: std::slice::Iter<'a, Record>,
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|r| (self.key, &r.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// Lazily encodes one value per `next()` call.
pub struct EncodedValues<'a> {
    schema: &'a Schema,
    records: std::slice::Iter<'a, Record>,
}

impl Iterator for EncodedValues<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(encode_datum(self.schema, &record.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for EncodedValues<'_> {}

/// Binary-encodes one datum, mapping shape mismatches to [`Error::Encoding`].
pub(crate) fn encode_datum(schema: &Schema, value: &Value) -> Result<Vec<u8>> {
    apache_avro::to_avro_datum(schema, value.clone())
        .map_err(|e| Error::Encoding(format!("value does not match its schema: {}", e)))
}

fn estimated_value_size(value: &Value) -> usize {
    match value {
        Value::Null => 1,
        Value::Boolean(_) => 1,
        Value::Int(_) | Value::Enum(_, _) => 5,
        Value::Long(_) | Value::TimestampMillis(_) | Value::TimestampMicros(_) => 10,
        Value::Float(_) => 4,
        Value::Double(_) => 8,
        Value::String(s) => 5 + s.len(),
        Value::Bytes(b) => 5 + b.len(),
        Value::Fixed(n, _) => *n,
        Value::Union(_, inner) => 1 + estimated_value_size(inner),
        Value::Array(items) => {
            10 + items.iter().map(estimated_value_size).sum::<usize>()
        }
        Value::Map(entries) => {
            10 + entries
                .iter()
                .map(|(k, v)| 5 + k.len() + estimated_value_size(v))
                .sum::<usize>()
        }
        Value::Record(fields) => fields
            .iter()
            .map(|(_, v)| estimated_value_size(v))
            .sum::<usize>(),
        _ => 10,
    }
}
