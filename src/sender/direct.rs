//! Direct broker backend.
//!
//! Bypasses the REST proxy: every record is individually framed (format
//! marker, schema id, datum) and handed to the Kafka producer. The broker
//! client manages its own connectivity, so this backend always reports
//! connected; delivery failures surface from the producer itself.

use apache_avro::types::Value;
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{Sender, TopicSender};
use crate::config::{ApiCredentials, AuthConfig, BrokerConfig, RegistryConfig};
use crate::codec;
use crate::data::{AvroRecordData, RecordData};
use crate::schema::{SchemaRegistryClient, SchemaRetriever};
use crate::topic::AvroTopic;
use crate::{Error, Result};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend sender writing framed records straight to the broker.
pub struct DirectSender {
    producer: Arc<BaseProducer>,
    retriever: Arc<SchemaRetriever>,
}

impl DirectSender {
    /// Builds the producer and a registry-backed schema resolver.
    ///
    /// The direct backend has no REST base URL to fall back to, so
    /// `registry.url` must be set.
    pub fn new(
        broker: &BrokerConfig,
        registry: &RegistryConfig,
        auth: Option<&AuthConfig>,
    ) -> Result<Self> {
        let registry_url = registry.url.clone().ok_or_else(|| {
            Error::Config("registry.url is required for the direct backend".to_string())
        })?;
        let registry_client = SchemaRegistryClient::new(
            registry_url,
            Duration::from_secs(registry.request_timeout_secs),
            auth.map(ApiCredentials::from),
        )?;
        let retriever = Arc::new(SchemaRetriever::new(
            Box::new(registry_client),
            registry.cache_ttl(),
        ));
        Self::with_retriever(broker, retriever)
    }

    /// Reuses an existing schema resolver, e.g. one shared with a REST
    /// sender pointed at the same registry.
    pub fn with_retriever(broker: &BrokerConfig, retriever: Arc<SchemaRetriever>) -> Result<Self> {
        let producer: BaseProducer = ClientConfig::new()
            .set("bootstrap.servers", broker.bootstrap_servers.join(","))
            .set("compression.type", &broker.compression)
            .set("acks", &broker.acks)
            .set("linger.ms", broker.linger_ms.to_string())
            .set(
                "queue.buffering.max.kbytes",
                (broker.send_buffer_bytes / 1024).to_string(),
            )
            .create()?;

        Ok(Self {
            producer: Arc::new(producer),
            retriever,
        })
    }
}

impl Sender for DirectSender {
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>> {
        Ok(Box::new(DirectTopicSender {
            topic: Arc::clone(topic),
            producer: Arc::clone(&self.producer),
            retriever: Arc::clone(&self.retriever),
            last_sent_offset: None,
            next_offset: 0,
            closed: false,
        }))
    }

    fn is_connected(&self) -> Result<bool> {
        Ok(true)
    }

    fn reset_connection(&self) -> Result<bool> {
        Ok(true)
    }

    fn close(&self) -> Result<()> {
        self.producer.flush(FLUSH_TIMEOUT)?;
        Ok(())
    }
}

/// Per-topic producer handle tracking the last offset handed to the broker.
pub struct DirectTopicSender {
    topic: Arc<AvroTopic>,
    producer: Arc<BaseProducer>,
    retriever: Arc<SchemaRetriever>,
    last_sent_offset: Option<i64>,
    next_offset: i64,
    closed: bool,
}

impl DirectTopicSender {
    /// Offset of the last record handed to the broker client.
    pub fn last_sent_offset(&self) -> Option<i64> {
        self.last_sent_offset
    }

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
}

impl TopicSender for DirectTopicSender {
    fn send(&mut self, key: Value, value: Value) -> Result<()> {
        let offset = self.next_offset;
        self.next_offset += 1;
        self.send_batch(AvroRecordData::from_values(
            Arc::clone(&self.topic),
            key,
            vec![value],
            offset,
        ))
    }

    fn send_batch(&mut self, data: AvroRecordData) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(());
        }
        let name = self.topic.name();

        let key_metadata = self
            .retriever
            .resolve(name, false, self.topic.key_schema(), None)?;
        let value_metadata = self
            .retriever
            .resolve(name, true, self.topic.value_schema(), None)?;

        let key_bytes = codec::frame_payload(key_metadata.id, &data.encoded_key()?);

        for (record, encoded) in data.records().iter().zip(data.encoded_values()) {
            let payload = codec::frame_payload(value_metadata.id, &encoded?);
            self.producer
                .send(
                    BaseRecord::to(name)
                        .key(key_bytes.as_ref())
                        .payload(payload.as_ref()),
                )
                .map_err(|(e, _)| Error::Kafka(e))?;
            self.producer.poll(Duration::ZERO);
            self.last_sent_offset = Some(record.offset);
            trace!(topic = name, offset = record.offset, "record enqueued");
        }
        self.next_offset = data.last_offset().map(|o| o + 1).unwrap_or(self.next_offset);

        debug!(topic = name, records = data.len(), "batch handed to broker");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.producer.flush(FLUSH_TIMEOUT)?;
        Ok(())
    }

    fn clear(&mut self) {}

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.producer.flush(FLUSH_TIMEOUT)?;
        Ok(())
    }
}
