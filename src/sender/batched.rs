//! Size/age batching over any backend.
//!
//! The decorator buffers values that share one key and forwards them as a
//! single batch once either threshold fires: record count reaching
//! `max_batch_size`, or the first buffered value growing older than
//! `max_age`. A key change flushes the old batch first; a batch never mixes
//! keys. There is no timer thread: age is checked when records arrive, so a
//! quiet topic holds its last partial batch until the next send, an
//! explicit `flush()`, or `close()`.

use apache_avro::types::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{Sender, TopicSender};
use crate::config::BatchingConfig;
use crate::data::{AvroRecordData, Record};
use crate::topic::AvroTopic;
use crate::{Error, Result};

/// Decorates a backend [`Sender`] so derived topic senders batch.
pub struct BatchedSender<S> {
    inner: Arc<S>,
    max_batch_size: usize,
    max_age: Duration,
}

impl<S: Sender + 'static> BatchedSender<S> {
    pub fn new(inner: S, config: &BatchingConfig) -> Self {
        Self::with_thresholds(inner, config.max_batch_size, config.max_age())
    }

    pub fn with_thresholds(inner: S, max_batch_size: usize, max_age: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            max_batch_size: max_batch_size.max(1),
            max_age,
        }
    }
}

impl<S: Sender + 'static> Sender for BatchedSender<S> {
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>> {
        let backend = self.inner.topic_sender(topic)?;
        Ok(Box::new(BatchedTopicSender {
            topic: Arc::clone(topic),
            connectivity: Arc::clone(&self.inner) as Arc<dyn Sender>,
            inner: backend,
            max_batch_size: self.max_batch_size,
            max_age: self.max_age,
            cached_key: None,
            buffer: Vec::new(),
            started: None,
            next_offset: 0,
            closed: false,
        }))
    }

    fn is_connected(&self) -> Result<bool> {
        self.inner.is_connected()
    }

    fn reset_connection(&self) -> Result<bool> {
        self.inner.reset_connection()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// Topic sender accumulating one single-key batch at a time.
pub struct BatchedTopicSender {
    topic: Arc<AvroTopic>,
    connectivity: Arc<dyn Sender>,
    inner: Box<dyn TopicSender>,
    max_batch_size: usize,
    max_age: Duration,
    cached_key: Option<Value>,
    buffer: Vec<Record>,
    started: Option<Instant>,
    next_offset: i64,
    closed: bool,
}

impl BatchedTopicSender {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::IllegalUsage(format!(
                "topic sender for '{}' is closed",
                self.topic.name()
            )))
        } else {
            Ok(())
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connectivity.is_connected()? {
            Ok(())
        } else {
            Err(Error::Transport(format!(
                "transport is not connected; dropping record for '{}'",
                self.topic.name()
            )))
        }
    }

    fn thresholds_met(&self) -> bool {
        self.buffer.len() >= self.max_batch_size
            || self
                .started
                .map(|s| s.elapsed() >= self.max_age)
                .unwrap_or(false)
    }
}

impl TopicSender for BatchedTopicSender {
    fn send(&mut self, key: Value, value: Value) -> Result<()> {
        self.ensure_open()?;
        self.ensure_connected()?;

        if let Some(cached) = &self.cached_key {
            if *cached != key {
                debug!(topic = self.topic.name(), "key changed, flushing batch");
                self.flush()?;
            }
        }
        if self.cached_key.is_none() {
            self.cached_key = Some(key);
            self.started = Some(Instant::now());
        }

        self.buffer.push(Record {
            offset: self.next_offset,
            value,
        });
        self.next_offset += 1;
        trace!(
            topic = self.topic.name(),
            buffered = self.buffer.len(),
            "record buffered"
        );

        if self.thresholds_met() {
            self.flush()?;
        }
        Ok(())
    }

    fn send_batch(&mut self, data: AvroRecordData) -> Result<()> {
        self.ensure_open()?;
        self.ensure_connected()?;
        self.flush()?;
        self.inner.send_batch(data)
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.buffer.is_empty() {
            self.cached_key = None;
            self.started = None;
            return Ok(());
        }

        let key = match self.cached_key.take() {
            Some(key) => key,
            None => {
                return Err(Error::IllegalUsage(
                    "batch holds records without a key".to_string(),
                ))
            }
        };
        // The buffer is handed off before the send so a failed flush never
        // leaves records behind to be retried twice.
        let records = std::mem::take(&mut self.buffer);
        self.started = None;

        let count = records.len();
        let data = AvroRecordData::new(Arc::clone(&self.topic), key, records);
        debug!(topic = self.topic.name(), count, "flushing batch");
        self.inner.send_batch(data)
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.cached_key = None;
        self.started = None;
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush();
        self.closed = true;
        let closed = self.inner.close();
        // A flush failure takes precedence, but only after the wrapped
        // sender had its chance to close.
        match flushed {
            Err(e) => Err(e),
            Ok(()) => closed,
        }
    }
}
