//! Schema identity resolution with a time-to-live cache.
//!
//! Payload encoding needs the registry-assigned `(id, version)` of every
//! schema it touches. The [`SchemaRetriever`] keeps one cache entry per
//! `(topic, key-or-value)` pair and only talks to the registry when the
//! entry is missing, expired, or pinned to the wrong version. Entries are
//! replaced wholesale, never mutated, so concurrent readers always observe
//! a complete entry.

pub mod registry;

pub use registry::{RegisterOutcome, SchemaMetadata, SchemaRegistry, SchemaRegistryClient};

use apache_avro::Schema;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    topic: String,
    is_value: bool,
}

struct CacheEntry {
    metadata: SchemaMetadata,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Resolves local schemas to registered metadata, cached with a TTL.
pub struct SchemaRetriever {
    registry: Box<dyn SchemaRegistry>,
    ttl: Duration,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl SchemaRetriever {
    pub fn new(registry: Box<dyn SchemaRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry subject for one side of a topic.
    pub fn subject(topic: &str, is_value: bool) -> String {
        if is_value {
            format!("{}-value", topic)
        } else {
            format!("{}-key", topic)
        }
    }

    /// Resolves a schema to its registered metadata.
    ///
    /// A live cache entry is returned as-is unless `expected_version` is
    /// set and disagrees with it. Otherwise the schema is registered
    /// (idempotent); a conflict falls back to fetching the registered
    /// metadata for `expected_version` (or the latest) and checking it
    /// against the local schema.
    ///
    /// # Errors
    ///
    /// [`Error::SchemaRegistryUnavailable`] on transport failure
    /// (retryable), [`Error::SchemaValidationFailed`] when the registered
    /// schema for the demanded version differs from the local one.
    pub fn resolve(
        &self,
        topic: &str,
        is_value: bool,
        schema: &Schema,
        expected_version: Option<i32>,
    ) -> Result<SchemaMetadata> {
        let key = CacheKey {
            topic: topic.to_string(),
            is_value,
        };

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                let version_matches = expected_version
                    .map(|v| v == entry.metadata.version)
                    .unwrap_or(true);
                if !entry.is_expired() && version_matches {
                    debug!(topic, is_value, "schema metadata served from cache");
                    return Ok(entry.metadata.clone());
                }
            }
        }

        let subject = Self::subject(topic, is_value);
        let metadata = match self.registry.register(&subject, schema)? {
            RegisterOutcome::Registered(metadata) => metadata,
            RegisterOutcome::Conflict => {
                let fetched = self.registry.fetch(&subject, expected_version)?;
                if expected_version.is_some()
                    && fetched.schema.canonical_form() != schema.canonical_form()
                {
                    return Err(Error::SchemaValidationFailed {
                        subject,
                        message: format!(
                            "registered version {} differs from the local schema",
                            fetched.version
                        ),
                    });
                }
                fetched
            }
        };

        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            key,
            CacheEntry {
                metadata: metadata.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(metadata)
    }

    /// Drops both cache entries of a topic, forcing re-resolution.
    pub fn invalidate(&self, topic: &str) {
        let mut cache = self.cache.lock().unwrap();
        for is_value in [false, true] {
            cache.remove(&CacheKey {
                topic: topic.to_string(),
                is_value,
            });
        }
    }
}
