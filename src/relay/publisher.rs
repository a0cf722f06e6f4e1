use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, error, warn};

use super::{EventPublisher, RelayEnvelope, RelayError};

const PUBLISHER_MAX_ATTEMPTS: u32 = 3;
const PUBLISHER_INITIAL_RETRY_DELAY_MS: u64 = 50;
const PUBLISHER_MAX_RETRY_DELAY_MS: u64 = 200;

/// Handle enqueuing envelopes for the background publisher task.
///
/// Enqueueing never blocks, so commands holding a match guard are not slowed
/// by the broker. Envelopes leave in enqueue order.
#[derive(Clone)]
pub struct RelayPublisher {
    tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl RelayPublisher {
    /// Spawn the forwarding task in front of `broker`.
    pub fn spawn(broker: Arc<dyn EventPublisher>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward(broker, rx));
        (Self { tx }, task)
    }

    /// Publisher that drops everything; used when no broker is wired.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Queue an envelope for publication.
    pub fn publish(&self, envelope: RelayEnvelope) {
        if let Err(err) = self.tx.send(envelope) {
            debug!(
                code = %err.0.code,
                routing_key = %err.0.routing_key,
                "relay publisher stopped; event not published"
            );
        }
    }
}

async fn forward(broker: Arc<dyn EventPublisher>, mut rx: mpsc::UnboundedReceiver<RelayEnvelope>) {
    while let Some(envelope) = rx.recv().await {
        if let Err(err) = publish_with_retry(broker.as_ref(), &envelope).await {
            error!(
                code = %envelope.code,
                sequence = envelope.sequence,
                routing_key = %envelope.routing_key,
                error = %err,
                "dropping relay event after repeated publish failures"
            );
        }
    }
}

/// Serialize and publish one envelope, retrying transient failures.
pub async fn publish_with_retry(
    broker: &dyn EventPublisher,
    envelope: &RelayEnvelope,
) -> Result<(), RelayError> {
    let encoded = serde_json::to_string(envelope)?;

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match broker.publish(&envelope.routing_key, encoded.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                if attempt >= PUBLISHER_MAX_ATTEMPTS {
                    return Err(err);
                }

                let delay_ms = PUBLISHER_INITIAL_RETRY_DELAY_MS
                    .saturating_mul(2_u64.pow(attempt - 1))
                    .min(PUBLISHER_MAX_RETRY_DELAY_MS);
                warn!(
                    error = %err,
                    attempt,
                    retry_delay_ms = delay_ms,
                    "relay publish failed, retrying"
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
