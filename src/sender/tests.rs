use super::*;
use crate::data::RecordData;
use crate::Error;
use apache_avro::types::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

const KEY_SCHEMA: &str = r#"{
    "type": "record", "name": "Key", "fields": [
        {"name": "userId", "type": "string"},
        {"name": "sourceId", "type": "string"}
    ]
}"#;

const VALUE_SCHEMA: &str = r#"{
    "type": "record", "name": "Point", "fields": [
        {"name": "time", "type": "double"},
        {"name": "timeReceived", "type": "double"},
        {"name": "light", "type": "float"}
    ]
}"#;

fn test_topic() -> Arc<AvroTopic> {
    Arc::new(AvroTopic::parse("light", KEY_SCHEMA, VALUE_SCHEMA).unwrap())
}

fn key(source: &str) -> Value {
    Value::Record(vec![
        ("userId".into(), Value::String("u1".into())),
        ("sourceId".into(), Value::String(source.into())),
    ])
}

fn point(time: f64) -> Value {
    Value::Record(vec![
        ("time".into(), Value::Double(time)),
        ("timeReceived".into(), Value::Double(time + 0.1)),
        ("light".into(), Value::Float(42.0)),
    ])
}

#[derive(Default)]
struct MockState {
    batches: Mutex<Vec<AvroRecordData>>,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    closed_topic_senders: AtomicUsize,
}

struct MockSender {
    state: Arc<MockState>,
}

impl MockSender {
    fn new(connected: bool) -> (Self, Arc<MockState>) {
        let state = Arc::new(MockState {
            connected: AtomicBool::new(connected),
            ..Default::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

struct MockTopicSender {
    topic: Arc<AvroTopic>,
    state: Arc<MockState>,
}

impl Sender for MockSender {
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>> {
        Ok(Box::new(MockTopicSender {
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

impl TopicSender for MockTopicSender {
    fn send(&mut self, key: Value, value: Value) -> Result<()> {
        let data = AvroRecordData::from_values(Arc::clone(&self.topic), key, vec![value], 0);
        self.send_batch(data)
    }

    fn send_batch(&mut self, data: AvroRecordData) -> Result<()> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock send failure".to_string()));
        }
        self.state.batches.lock().unwrap().push(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn close(&mut self) -> Result<()> {
        self.state.closed_topic_senders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn batching_sender(
    connected: bool,
    max_batch_size: usize,
    max_age: Duration,
) -> (BatchedSender<MockSender>, Arc<MockState>) {
    let (mock, state) = MockSender::new(connected);
    (
        BatchedSender::with_thresholds(mock, max_batch_size, max_age),
        state,
    )
}

#[test]
fn flushes_exactly_at_batch_size() {
    let (sender, state) = batching_sender(true, 3, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    for i in 0..7 {
        topic_sender.send(key("a"), point(i as f64)).unwrap();
    }

    {
        let batches = state.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 3));
    }

    topic_sender.flush().unwrap();
    let batches = state.batches.lock().unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[2].len(), 1);
}

#[test]
fn offsets_increase_across_batches() {
    let (sender, state) = batching_sender(true, 2, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    for i in 0..4 {
        topic_sender.send(key("a"), point(i as f64)).unwrap();
    }

    let batches = state.batches.lock().unwrap();
    let offsets: Vec<i64> = batches
        .iter()
        .flat_map(|b| b.records().iter().map(|r| r.offset))
        .collect();
    assert_eq!(offsets, vec![0, 1, 2, 3]);
}

#[test]
fn flushes_when_batch_age_exceeds_max() {
    let (sender, state) = batching_sender(true, 100, Duration::from_millis(10));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    assert!(state.batches.lock().unwrap().is_empty());

    sleep(Duration::from_millis(15));
    topic_sender.send(key("a"), point(2.0)).unwrap();

    let batches = state.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
}

#[test]
fn key_change_flushes_old_batch_first() {
    let (sender, state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    topic_sender.send(key("a"), point(2.0)).unwrap();
    topic_sender.send(key("b"), point(3.0)).unwrap();

    {
        let batches = state.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(*batches[0].key(), key("a"));
    }

    topic_sender.flush().unwrap();
    let batches = state.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(*batches[1].key(), key("b"));
    assert_eq!(batches[1].len(), 1);
}

#[test]
fn disconnected_send_fails_without_buffering() {
    let (sender, state) = batching_sender(false, 3, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    let err = topic_sender.send(key("a"), point(1.0)).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // Nothing was buffered: reconnecting and flushing sends nothing.
    state.connected.store(true, Ordering::SeqCst);
    topic_sender.flush().unwrap();
    assert!(state.batches.lock().unwrap().is_empty());
}

#[test]
fn failed_flush_clears_the_buffer() {
    let (sender, state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    state.fail_sends.store(true, Ordering::SeqCst);
    assert!(topic_sender.flush().is_err());

    // The failed batch is gone, not retried on the next flush.
    state.fail_sends.store(false, Ordering::SeqCst);
    topic_sender.flush().unwrap();
    assert!(state.batches.lock().unwrap().is_empty());
}

#[test]
fn clear_discards_without_sending() {
    let (sender, state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    topic_sender.clear();
    topic_sender.flush().unwrap();

    assert!(state.batches.lock().unwrap().is_empty());
}

#[test]
fn close_sends_one_final_batch() {
    let (sender, state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    topic_sender.send(key("a"), point(2.0)).unwrap();
    topic_sender.close().unwrap();

    let batches = state.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(state.closed_topic_senders.load(Ordering::SeqCst), 1);
}

#[test]
fn close_still_closes_backend_when_flush_fails() {
    let (sender, state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.send(key("a"), point(1.0)).unwrap();
    state.fail_sends.store(true, Ordering::SeqCst);

    let err = topic_sender.close().unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(state.closed_topic_senders.load(Ordering::SeqCst), 1);
}

#[test]
fn sending_after_close_is_illegal_usage() {
    let (sender, _state) = batching_sender(true, 100, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    topic_sender.close().unwrap();
    let err = topic_sender.send(key("a"), point(1.0)).unwrap_err();
    assert!(matches!(err, Error::IllegalUsage(_)));
}

#[test]
fn send_all_forwards_every_pair() {
    let (sender, state) = batching_sender(true, 2, Duration::from_secs(600));
    let mut topic_sender = sender.topic_sender(&test_topic()).unwrap();

    let pairs = (0..4).map(|i| (key("a"), point(i as f64)));
    topic_sender.send_all(pairs).unwrap();

    assert_eq!(state.batches.lock().unwrap().len(), 2);
}
