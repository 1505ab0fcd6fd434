//! Blocking HTTP client for a Confluent-style schema registry.
//!
//! Schemas are registered per subject (`{topic}-key` / `{topic}-value`).
//! Registration is idempotent on the registry side: posting a schema the
//! subject already knows returns its existing id. A compatibility conflict
//! is reported as [`RegisterOutcome::Conflict`] so the caller can fall back
//! to fetching the registered metadata instead.

use apache_avro::Schema;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::ApiCredentials;
use crate::{Error, Result};

/// The registry-assigned identity of one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMetadata {
    pub id: i32,
    pub version: i32,
    pub schema: Schema,
}

/// Result of a registration attempt.
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Registered(SchemaMetadata),
    /// The subject holds an incompatible schema; fetch it by version.
    Conflict,
}

/// Remote registry operations, seam for the cache layer and for tests.
pub trait SchemaRegistry: Send + Sync {
    /// Registers (or re-identifies) a schema under a subject.
    fn register(&self, subject: &str, schema: &Schema) -> Result<RegisterOutcome>;

    /// Fetches registered metadata; `None` means the latest version.
    fn fetch(&self, subject: &str, version: Option<i32>) -> Result<SchemaMetadata>;
}

pub struct SchemaRegistryClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: i32,
    version: Option<i32>,
}

#[derive(Deserialize)]
struct VersionResponse {
    id: i32,
    version: i32,
    schema: String,
}

impl SchemaRegistryClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Option<ApiCredentials>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build registry client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(credentials) => request.header("Authorization", credentials.basic_header()),
            None => request,
        }
    }
}

impl SchemaRegistry for SchemaRegistryClient {
    #[instrument(skip(self, schema), fields(subject = %subject))]
    fn register(&self, subject: &str, schema: &Schema) -> Result<RegisterOutcome> {
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let body = serde_json::json!({ "schema": schema.canonical_form() });

        let response = self
            .authorized(self.http.post(&url).json(&body))
            .send()
            .map_err(|e| Error::SchemaRegistryUnavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let registered: RegisterResponse = response
                    .json()
                    .map_err(|e| Error::SchemaRegistryUnavailable(e.to_string()))?;
                debug!(id = registered.id, "schema registered");
                // Not every registry generation reports the version on
                // registration; look it up from the subject when absent.
                let version = match registered.version {
                    Some(version) => version,
                    None => self.fetch(subject, None)?.version,
                };
                Ok(RegisterOutcome::Registered(SchemaMetadata {
                    id: registered.id,
                    version,
                    schema: schema.clone(),
                }))
            }
            status
                if status == StatusCode::CONFLICT
                    || status == StatusCode::UNPROCESSABLE_ENTITY =>
            {
                debug!("registry reported a schema conflict");
                Ok(RegisterOutcome::Conflict)
            }
            status if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(Error::AuthenticationFailed(format!(
                    "registry rejected credentials for subject {}",
                    subject
                )))
            }
            status => Err(Error::SchemaRegistryUnavailable(format!(
                "registry returned {} for subject {}",
                status, subject
            ))),
        }
    }

    #[instrument(skip(self), fields(subject = %subject))]
    fn fetch(&self, subject: &str, version: Option<i32>) -> Result<SchemaMetadata> {
        let version_path = match version {
            Some(version) => version.to_string(),
            None => "latest".to_string(),
        };
        let url = format!(
            "{}/subjects/{}/versions/{}",
            self.base_url, subject, version_path
        );

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .map_err(|e| Error::SchemaRegistryUnavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let fetched: VersionResponse = response
                    .json()
                    .map_err(|e| Error::SchemaRegistryUnavailable(e.to_string()))?;
                let schema = Schema::parse_str(&fetched.schema).map_err(|e| {
                    Error::SchemaValidationFailed {
                        subject: subject.to_string(),
                        message: format!("registry returned an unparsable schema: {}", e),
                    }
                })?;
                Ok(SchemaMetadata {
                    id: fetched.id,
                    version: fetched.version,
                    schema,
                })
            }
            status if status == StatusCode::NOT_FOUND => Err(Error::SchemaValidationFailed {
                subject: subject.to_string(),
                message: format!("version {} is not registered", version_path),
            }),
            status if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(Error::AuthenticationFailed(format!(
                    "registry rejected credentials for subject {}",
                    subject
                )))
            }
            status => Err(Error::SchemaRegistryUnavailable(format!(
                "registry returned {} for subject {}",
                status, subject
            ))),
        }
    }
}
