//! Event relay: publishes match changes to a topic-routed broker and fans
//! events produced by other instances out to local connection groups.

/// Consume loop fanning remote events out to local groups.
pub mod consumer;
/// Relay envelope and payloads.
pub mod events;
/// In-process broker.
pub mod memory;
/// Background publisher task.
pub mod publisher;
/// Redis Streams broker.
#[cfg(feature = "redis-relay")]
pub mod redis;
/// Routing key pattern matching.
pub mod topic;

use futures::future::BoxFuture;
use thiserror::Error;

pub use self::events::{RelayEnvelope, RelayPayload};
pub use self::publisher::RelayPublisher;

/// Name of the topic exchange (the stream key for the Redis backend).
pub const EXCHANGE_NAME: &str = "mindlink.matches";
/// Prefix of the durable queue every instance binds.
pub const QUEUE_NAME: &str = "match_events_queue";
/// Binding pattern of the relay queue.
pub const BINDING_PATTERN: &str = "match.*";

/// Errors raised by broker backends.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The envelope could not be encoded or decoded.
    #[error("failed to encode relay envelope")]
    Encode(#[from] serde_json::Error),
    /// The broker could not be reached or refused the operation.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// What the relay was doing.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The delivery tag is unknown to the queue.
    #[error("unknown delivery tag `{0}`")]
    UnknownDelivery(String),
}

impl RelayError {
    /// Wrap a backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelayError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// One message handed to a consumer. It stays unacknowledged until the
/// consumer acks or nacks its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-specific handle used to settle the delivery.
    pub tag: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// JSON-encoded [`RelayEnvelope`].
    pub body: String,
    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,
}

/// Publishing side of a topic exchange.
pub trait EventPublisher: Send + Sync {
    /// Route `body` with `routing_key` to every bound queue.
    fn publish(&self, routing_key: &str, body: String) -> BoxFuture<'static, Result<(), RelayError>>;
}

/// Consuming side of one durable queue with manual acknowledgement.
pub trait EventQueue: Send + Sync {
    /// Wait for the next delivery. `None` means the queue was closed.
    fn next_delivery(&self) -> BoxFuture<'static, Result<Option<Delivery>, RelayError>>;
    /// Settle a delivery as processed.
    fn ack(&self, tag: &str) -> BoxFuture<'static, Result<(), RelayError>>;
    /// Reject a delivery and put it back at the head of the queue.
    fn nack_requeue(&self, tag: &str) -> BoxFuture<'static, Result<(), RelayError>>;
}

/// Queue name bound by one instance. Each instance owns its queue so every
/// instance sees every event.
pub fn queue_name_for(instance: &uuid::Uuid) -> String {
    format!("{QUEUE_NAME}.{instance}")
}
