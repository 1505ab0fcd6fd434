//! Topic bindings: a named stream tied to its key and value schemas.
//!
//! An [`AvroTopic`] is validated once at construction so that a
//! misconfigured stream fails fast instead of at first send. The
//! [`SensorTopic`] variant adds the field requirements shared by all
//! sensor-style streams (timestamps on the value, source identity on the
//! key).

use apache_avro::schema::Schema;
use std::sync::Arc;

use crate::{Error, Result};

/// A named stream with its key and value schemas.
///
/// Immutable after construction; equality is by name and both schemas.
#[derive(Debug, Clone)]
pub struct AvroTopic {
    name: String,
    key_schema: Schema,
    value_schema: Schema,
}

/// Primitive kind of one value field, in schema field order.
///
/// Downstream collectors use this list to validate their assumptions about
/// the shape of the values they aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Other,
}

impl AvroTopic {
    /// Creates a topic binding, validating the topic name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopicName`] if `name` does not match
    /// `[A-Za-z][A-Za-z0-9_]*`.
    pub fn new(
        name: impl Into<String>,
        key_schema: Schema,
        value_schema: Schema,
    ) -> Result<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(Error::InvalidTopicName(name));
        }
        Ok(Self {
            name,
            key_schema,
            value_schema,
        })
    }

    /// Parses both schemas from their JSON definitions and builds the topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopicDefinition`] if either definition fails
    /// to parse, or [`Error::InvalidTopicName`] for a bad name.
    pub fn parse(name: impl Into<String>, key_json: &str, value_json: &str) -> Result<Self> {
        let key_schema = Schema::parse_str(key_json)
            .map_err(|e| Error::InvalidTopicDefinition(format!("key schema: {}", e)))?;
        let value_schema = Schema::parse_str(value_json)
            .map_err(|e| Error::InvalidTopicDefinition(format!("value schema: {}", e)))?;
        Self::new(name, key_schema, value_schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    pub fn value_schema(&self) -> &Schema {
        &self.value_schema
    }

    /// Ordered primitive kinds of the value record's fields.
    ///
    /// Nullable unions are reduced to their non-null branch, the way the
    /// fields are actually populated. Non-record value schemas yield an
    /// empty list.
    pub fn value_field_kinds(&self) -> Vec<FieldKind> {
        match &self.value_schema {
            Schema::Record(record) => record
                .fields
                .iter()
                .map(|f| field_kind(&f.schema))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for AvroTopic {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.key_schema == other.key_schema
            && self.value_schema == other.value_schema
    }
}

/// A topic carrying sensor observations.
///
/// On top of the plain binding this requires `time` and `timeReceived`
/// double fields on the value schema and `userId` and `sourceId` string
/// fields on the key schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTopic {
    inner: Arc<AvroTopic>,
}

impl SensorTopic {
    /// Validates the sensor field requirements over an existing binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopicDefinition`] naming the first missing
    /// or mistyped field.
    pub fn new(topic: AvroTopic) -> Result<Self> {
        require_field(topic.key_schema(), "userId", FieldKind::String)?;
        require_field(topic.key_schema(), "sourceId", FieldKind::String)?;
        require_field(topic.value_schema(), "time", FieldKind::Double)?;
        require_field(topic.value_schema(), "timeReceived", FieldKind::Double)?;
        Ok(Self {
            inner: Arc::new(topic),
        })
    }

    /// Parses schemas and validates in one step.
    pub fn parse(name: impl Into<String>, key_json: &str, value_json: &str) -> Result<Self> {
        Self::new(AvroTopic::parse(name, key_json, value_json)?)
    }

    pub fn topic(&self) -> &Arc<AvroTopic> {
        &self.inner
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn require_field(schema: &Schema, field: &str, kind: FieldKind) -> Result<()> {
    let record = match schema {
        Schema::Record(record) => record,
        other => {
            return Err(Error::InvalidTopicDefinition(format!(
                "expected a record schema, found {:?}",
                other
            )))
        }
    };
    match record.fields.iter().find(|f| f.name == field) {
        Some(f) if field_kind(&f.schema) == kind => Ok(()),
        Some(f) => Err(Error::InvalidTopicDefinition(format!(
            "field '{}' of {} must be {:?}, found {:?}",
            field, record.name, kind, f.schema
        ))),
        None => Err(Error::InvalidTopicDefinition(format!(
            "schema {} has no field '{}'",
            record.name, field
        ))),
    }
}

fn field_kind(schema: &Schema) -> FieldKind {
    match schema {
        // Nullable union: classify by the single non-null branch
        Schema::Union(union) => {
            let non_null: Vec<&Schema> = union
                .variants()
                .iter()
                .filter(|v| !matches!(v, Schema::Null))
                .collect();
            match non_null.as_slice() {
                [single] => field_kind(single),
                _ => FieldKind::Other,
            }
        }
        Schema::Boolean => FieldKind::Boolean,
        Schema::Int => FieldKind::Int,
        Schema::Long => FieldKind::Long,
        Schema::Float => FieldKind::Float,
        Schema::Double => FieldKind::Double,
        Schema::Bytes => FieldKind::Bytes,
        Schema::String | Schema::Enum(_) => FieldKind::String,
        _ => FieldKind::Other,
    }
}
