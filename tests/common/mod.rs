//! Shared helpers for integration tests: a capturing in-memory backend and
//! schema/value builders.

use apache_avro::types::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use stream_uplink::topic::AvroTopic;
use stream_uplink::{AvroRecordData, Error, Result, Sender, TopicSender};

pub const KEY_SCHEMA: &str = r#"{
    "type": "record", "name": "ObservationKey", "fields": [
        {"name": "userId", "type": "string"},
        {"name": "sourceId", "type": "string"}
    ]
}"#;

pub const VALUE_SCHEMA: &str = r#"{
    "type": "record", "name": "LightReading", "fields": [
        {"name": "time", "type": "double"},
        {"name": "timeReceived", "type": "double"},
        {"name": "light", "type": "float"}
    ]
}"#;

pub fn test_topic() -> Arc<AvroTopic> {
    Arc::new(AvroTopic::parse("mock_light", KEY_SCHEMA, VALUE_SCHEMA).unwrap())
}

pub fn observation_key(user: &str, source: &str) -> Value {
    Value::Record(vec![
        ("userId".into(), Value::String(user.into())),
        ("sourceId".into(), Value::String(source.into())),
    ])
}

pub fn light_reading(time: f64, light: f32) -> Value {
    Value::Record(vec![
        ("time".into(), Value::Double(time)),
        ("timeReceived".into(), Value::Double(time)),
        ("light".into(), Value::Float(light)),
    ])
}

/// State shared between a [`CapturingSender`] and the test body; the
/// sender itself is moved into the batching decorator.
#[derive(Default)]
pub struct CapturedState {
    pub batches: Mutex<Vec<AvroRecordData>>,
    pub connected: AtomicBool,
}

/// Backend that records every batch it is handed.
pub struct CapturingSender {
    state: Arc<CapturedState>,
}

impl CapturingSender {
    pub fn new() -> (Self, Arc<CapturedState>) {
        let state = Arc::new(CapturedState {
            batches: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

pub struct CapturingTopicSender {
    topic: Arc<AvroTopic>,
    state: Arc<CapturedState>,
}

impl Sender for CapturingSender {
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>> {
        Ok(Box::new(CapturingTopicSender {
            topic: Arc::clone(topic),
            state: Arc::clone(&self.state),
        }))
    }

    fn is_connected(&self) -> Result<bool> {
        Ok(self.state.connected.load(Ordering::SeqCst))
    }

    fn reset_connection(&self) -> Result<bool> {
        self.is_connected()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl TopicSender for CapturingTopicSender {
    fn send(&mut self, key: Value, value: Value) -> Result<()> {
        let data = AvroRecordData::from_values(Arc::clone(&self.topic), key, vec![value], 0);
        self.send_batch(data)
    }

    fn send_batch(&mut self, data: AvroRecordData) -> Result<()> {
        if !self.state.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("capturing backend offline".to_string()));
        }
        self.state.batches.lock().unwrap().push(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
