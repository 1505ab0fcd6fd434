pub mod codec;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod schema;
pub mod sender;
pub mod topic;

pub use config::Config;
pub use connection::{ConnectionState, ConnectionStateTracker};
pub use data::{AvroRecordData, Record, RecordData};
pub use error::{Error, Result};
pub use schema::{SchemaMetadata, SchemaRetriever};
pub use sender::{BatchedSender, DirectSender, RestSender, Sender, TopicSender, TopicSenderExt};
pub use topic::{AvroTopic, SensorTopic};
