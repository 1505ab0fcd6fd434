//! REST proxy backend.
//!
//! Each flushed batch becomes one `POST {base}/topics/{name}` carrying the
//! record-set payload, with schema versions resolved through the registry
//! cache. Connectivity is tracked with the debounced state machine: a
//! lightweight `HEAD` probe runs only when the recorded state has decayed
//! to unknown, so repeated `is_connected()` calls do not hammer the server.

use apache_avro::types::Value;
use bytes::Bytes;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Sender, TopicSender};
use crate::config::{ApiCredentials, AuthConfig, RegistryConfig, ServerConfig};
use crate::connection::{ConnectionState, ConnectionStateTracker};
use crate::data::{AvroRecordData, RecordData};
use crate::schema::{SchemaRegistryClient, SchemaRetriever};
use crate::topic::AvroTopic;
use crate::{codec, Error, Result};

/// Payload media type of the record-set format.
pub const RECORD_SET_CONTENT_TYPE: &str = "application/vnd.recordset.v1+binary";

/// How long a probe result is trusted before re-probing.
const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(10);

struct RestClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
}

impl RestClient {
    fn new(server: &ServerConfig, credentials: Option<ApiCredentials>) -> Result<Self> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(server.request_timeout_secs));
        if let Some(proxy) = &server.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: server.base_url(),
            credentials,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(credentials) => request.header("Authorization", credentials.basic_header()),
            None => request,
        }
    }

    fn post_batch(&self, topic: &str, body: Bytes) -> reqwest::Result<Response> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        self.authorized(
            self.http
                .post(url)
                .header("Content-Type", RECORD_SET_CONTENT_TYPE)
                .body(body),
        )
        .send()
    }

    fn probe(&self) -> reqwest::Result<Response> {
        let url = format!("{}/topics", self.base_url);
        self.authorized(self.http.head(url)).send()
    }
}

/// Backend sender uploading through the binary REST endpoint.
pub struct RestSender {
    client: Arc<RestClient>,
    retriever: Arc<SchemaRetriever>,
    state: Arc<ConnectionStateTracker>,
}

impl RestSender {
    pub fn new(
        server: &ServerConfig,
        registry: &RegistryConfig,
        auth: Option<&AuthConfig>,
    ) -> Result<Self> {
        let credentials = auth.map(ApiCredentials::from);
        let client = RestClient::new(server, credentials.clone())?;

        let registry_url = registry
            .url
            .clone()
            .unwrap_or_else(|| server.base_url());
        let registry_client = SchemaRegistryClient::new(
            registry_url,
            Duration::from_secs(registry.request_timeout_secs),
            credentials,
        )?;
        let retriever = Arc::new(SchemaRetriever::new(
            Box::new(registry_client),
            registry.cache_ttl(),
        ));

        Ok(Self {
            client: Arc::new(client),
            retriever,
            state: Arc::new(ConnectionStateTracker::new(DEFAULT_STATE_TIMEOUT)),
        })
    }

    /// Adjusts how long probe results are trusted.
    pub fn set_connection_timeout(&self, timeout: Duration) {
        self.state.set_timeout(timeout);
    }

    /// Shared schema resolver, reusable by a direct backend pointed at the
    /// same registry.
    pub fn schema_retriever(&self) -> Arc<SchemaRetriever> {
        Arc::clone(&self.retriever)
    }

    #[instrument(skip(self))]
    fn probe_connection(&self) -> bool {
        match self.client.probe() {
            Ok(response) if !response.status().is_server_error() => {
                self.state.mark_connected();
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "endpoint probe failed");
                self.state.mark_disconnected();
                false
            }
            Err(e) => {
                warn!("endpoint unreachable: {}", e);
                self.state.mark_disconnected();
                false
            }
        }
    }
}

impl Sender for RestSender {
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>> {
        Ok(Box::new(RestTopicSender {
            topic: Arc::clone(topic),
            client: Arc::clone(&self.client),
            retriever: Arc::clone(&self.retriever),
            state: Arc::clone(&self.state),
            next_offset: 0,
            closed: false,
        }))
    }

    fn is_connected(&self) -> Result<bool> {
        Ok(match self.state.current_state() {
            ConnectionState::Connected => true,
            ConnectionState::Disconnected => false,
            ConnectionState::Unknown => self.probe_connection(),
        })
    }

    fn reset_connection(&self) -> Result<bool> {
        self.state.reset();
        self.is_connected()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Per-topic uploader over the REST client.
pub struct RestTopicSender {
    topic: Arc<AvroTopic>,
    client: Arc<RestClient>,
    retriever: Arc<SchemaRetriever>,
    state: Arc<ConnectionStateTracker>,
    next_offset: i64,
    closed: bool,
}

impl RestTopicSender {
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

    fn upload(&mut self, data: &AvroRecordData) -> Result<()> {
        let name = self.topic.name().to_string();
        let mut conflict_retried = false;

        loop {
            let key_metadata =
                self.retriever
                    .resolve(&name, false, self.topic.key_schema(), None)?;
            let value_metadata =
                self.retriever
                    .resolve(&name, true, self.topic.value_schema(), None)?;
            let body =
                codec::encode_record_set(key_metadata.version, value_metadata.version, data)?;

            let response = match self.client.post_batch(&name, body) {
                Ok(response) => response,
                Err(e) => {
                    self.state.mark_disconnected();
                    return Err(Error::Transport(e.to_string()));
                }
            };

            let status = response.status();
            if status.is_success() {
                self.state.mark_connected();
                debug!(
                    topic = %name,
                    records = data.len(),
                    "batch uploaded"
                );
                return Ok(());
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(Error::AuthenticationFailed(format!(
                    "upload to '{}' rejected with {}",
                    name, status
                )));
            } else if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY
            {
                if conflict_retried {
                    return Err(Error::SchemaValidationFailed {
                        subject: name,
                        message: "server still rejects the schemas after re-resolution"
                            .to_string(),
                    });
                }
                warn!(topic = %name, "schema conflict, re-resolving metadata");
                self.retriever.invalidate(&name);
                conflict_retried = true;
            } else {
                self.state.mark_disconnected();
                return Err(Error::Transport(format!(
                    "upload to '{}' failed with {}",
                    name, status
                )));
            }
        }
    }
}

impl TopicSender for RestTopicSender {
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
        self.next_offset = data.last_offset().map(|o| o + 1).unwrap_or(self.next_offset);
        self.upload(&data)
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn clear(&mut self) {}

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
