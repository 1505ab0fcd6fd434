//! The sender abstraction: backends and the batching decorator.
//!
//! Applications program against [`Sender`] and [`TopicSender`] only. A
//! `Sender` is shared across threads and hands out one `TopicSender` per
//! topic; each `TopicSender` belongs to a single thread at a time (its
//! methods take `&mut self`). Two backends exist: the REST proxy
//! ([`rest::RestSender`]) and the direct broker ([`direct::DirectSender`]),
//! and [`batched::BatchedSender`] wraps either one with size/age batching.

pub mod batched;
pub mod direct;
pub mod rest;

#[cfg(test)]
mod tests;

pub use batched::BatchedSender;
pub use direct::DirectSender;
pub use rest::RestSender;

use apache_avro::types::Value;
use std::sync::Arc;

use crate::data::AvroRecordData;
use crate::topic::AvroTopic;
use crate::Result;

/// Shared entry point of one transport backend.
///
/// Thread-safe: `topic_sender`, `is_connected` and `reset_connection` may
/// be called concurrently. `close` must happen after every derived
/// [`TopicSender`] has been closed.
pub trait Sender: Send + Sync {
    /// Creates a sender bound to one topic. Cheap; create one per thread.
    fn topic_sender(&self, topic: &Arc<AvroTopic>) -> Result<Box<dyn TopicSender>>;

    /// Whether the transport is currently reachable, probing if the last
    /// recorded state has decayed.
    fn is_connected(&self) -> Result<bool>;

    /// Discards any recorded connection state and probes afresh.
    fn reset_connection(&self) -> Result<bool>;

    fn close(&self) -> Result<()>;
}

/// Per-topic upload handle. Owned by one thread at a time.
pub trait TopicSender {
    /// Submits one record.
    fn send(&mut self, key: Value, value: Value) -> Result<()>;

    /// Submits a prepared batch.
    fn send_batch(&mut self, data: AvroRecordData) -> Result<()>;

    /// Pushes out anything buffered.
    fn flush(&mut self) -> Result<()>;

    /// Discards anything buffered without sending it.
    fn clear(&mut self);

    /// Flushes and releases the handle. Further calls are illegal usage.
    fn close(&mut self) -> Result<()>;
}

/// Convenience operations over any [`TopicSender`].
pub trait TopicSenderExt {
    /// Sends every `(key, value)` pair in order, stopping at the first
    /// failure.
    fn send_all<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (Value, Value)>;
}

impl<T: TopicSender + ?Sized> TopicSenderExt for T {
    fn send_all<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        for (key, value) in pairs {
            self.send(key, value)?;
        }
        Ok(())
    }
}
