use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{Delivery, EventQueue, RelayEnvelope, RelayError, RelayPayload};
use crate::state::{AppState, SharedState};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How long the watermark of an ended match keeps rejecting redeliveries.
const TOMBSTONE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct Watermark {
    sequence: u64,
    ended_at: Option<Instant>,
}

/// Highest sequence already fanned out per match. Makes redelivered or
/// duplicated events harmless, including after the match ended.
#[derive(Debug, Default)]
pub struct SequenceLedger {
    last: DashMap<String, Watermark>,
}

impl SequenceLedger {
    /// Whether `sequence` is newer than anything handled for `code`.
    pub fn is_new(&self, code: &str, sequence: u64) -> bool {
        self.last
            .get(code)
            .is_none_or(|last| last.ended_at.is_none() && sequence > last.sequence)
    }

    /// Remember `sequence` as handled for `code`.
    pub fn record(&self, code: &str, sequence: u64) {
        self.last
            .entry(code.to_owned())
            .and_modify(|last| last.sequence = last.sequence.max(sequence))
            .or_insert(Watermark {
                sequence,
                ended_at: None,
            });
    }

    /// Turn the entry of an ended match into a tombstone: every later event
    /// of `code` counts as already handled until it expires.
    pub fn close(&self, code: &str, now: Instant) {
        if let Some(mut last) = self.last.get_mut(code) {
            last.ended_at.get_or_insert(now);
        }
        self.prune(now);
    }

    /// Drop tombstones older than [`TOMBSTONE_TTL`].
    pub fn prune(&self, now: Instant) {
        self.last.retain(|_, last| {
            last.ended_at
                .is_none_or(|ended| now.saturating_duration_since(ended) < TOMBSTONE_TTL)
        });
    }

    /// Matches tracked, tombstones included.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Fanned out to the local group.
    Delivered,
    /// Produced by this instance, which already delivered it directly.
    OwnOrigin,
    /// Sequence already handled.
    Duplicate,
    /// Body could not be decoded; settled so it cannot loop forever.
    Discarded,
}

/// Consume the instance queue until it closes.
pub async fn run(state: SharedState, queue: Arc<dyn EventQueue>) {
    let ledger = SequenceLedger::default();
    let mut delay = INITIAL_RETRY_DELAY;

    loop {
        match queue.next_delivery().await {
            Ok(Some(delivery)) => {
                delay = INITIAL_RETRY_DELAY;
                process_delivery(&state, queue.as_ref(), &ledger, delivery).await;
            }
            Ok(None) => {
                info!("relay queue closed; consumer stopping");
                break;
            }
            Err(err) => {
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "relay consume failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
    }
}

/// Handle one delivery and settle it: ack on success, nack-with-requeue on failure.
pub async fn process_delivery(
    state: &AppState,
    queue: &dyn EventQueue,
    ledger: &SequenceLedger,
    delivery: Delivery,
) -> Option<DeliveryOutcome> {
    match handle_delivery(state, ledger, &delivery) {
        Ok(outcome) => {
            if let Err(err) = queue.ack(&delivery.tag).await {
                warn!(tag = %delivery.tag, error = %err, "failed to ack relay delivery");
            }
            Some(outcome)
        }
        Err(err) => {
            warn!(
                tag = %delivery.tag,
                routing_key = %delivery.routing_key,
                error = %err,
                "relay handler failed; requeueing"
            );
            if let Err(err) = queue.nack_requeue(&delivery.tag).await {
                error!(tag = %delivery.tag, error = %err, "failed to requeue relay delivery");
            }
            None
        }
    }
}

/// Fan an event produced elsewhere out to the local connections of its match.
pub fn handle_delivery(
    state: &AppState,
    ledger: &SequenceLedger,
    delivery: &Delivery,
) -> Result<DeliveryOutcome, RelayError> {
    let envelope: RelayEnvelope = match serde_json::from_str(&delivery.body) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(
                tag = %delivery.tag,
                routing_key = %delivery.routing_key,
                error = %err,
                "discarding undecodable relay message"
            );
            return Ok(DeliveryOutcome::Discarded);
        }
    };

    if envelope.origin == state.instance_id() {
        return Ok(DeliveryOutcome::OwnOrigin);
    }

    if !ledger.is_new(&envelope.code, envelope.sequence) {
        debug!(
            code = %envelope.code,
            sequence = envelope.sequence,
            redelivered = delivery.redelivered,
            "skipping already handled relay event"
        );
        return Ok(DeliveryOutcome::Duplicate);
    }

    match envelope.payload.to_server_message() {
        Some(message) => {
            let text = serde_json::to_string(&message)?;
            let reached = state.groups().broadcast_text(&envelope.code, &text);
            debug!(
                code = %envelope.code,
                sequence = envelope.sequence,
                routing_key = %envelope.routing_key,
                reached,
                "relayed event to local group"
            );
        }
        None => {
            info!(code = %envelope.code, origin = %envelope.origin, "match created on another instance");
        }
    }

    ledger.record(&envelope.code, envelope.sequence);
    if matches!(envelope.payload, RelayPayload::MatchEnded { .. }) {
        state.groups().drop_group(&envelope.code);
        ledger.close(&envelope.code, Instant::now());
    }

    Ok(DeliveryOutcome::Delivered)
}
