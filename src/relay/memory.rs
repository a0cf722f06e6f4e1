//! In-process topic exchange used for tests and single-instance deployments.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Notify};

use super::{Delivery, EventPublisher, EventQueue, RelayError, topic::topic_matches};

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    body: String,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<String, StoredMessage>,
    next_tag: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl QueueInner {
    async fn push(&self, message: StoredMessage, front: bool) {
        {
            let mut state = self.state.lock().await;
            if front {
                state.ready.push_front(message);
            } else {
                state.ready.push_back(message);
            }
        }
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct ExchangeInner {
    bindings: Mutex<Vec<(String, Arc<QueueInner>)>>,
}

/// Topic exchange living in process memory. Messages published before any
/// queue is bound are dropped, as an unroutable message would be.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<ExchangeInner>,
}

impl InMemoryBroker {
    /// Create an exchange with no bound queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a queue bound to `pattern` and return its consumer handle.
    pub async fn bind_queue(&self, pattern: &str) -> InMemoryQueue {
        let queue = Arc::new(QueueInner::default());
        self.inner
            .bindings
            .lock()
            .await
            .push((pattern.to_owned(), queue.clone()));
        InMemoryQueue { inner: queue }
    }
}

impl EventPublisher for InMemoryBroker {
    fn publish(&self, routing_key: &str, body: String) -> BoxFuture<'static, Result<(), RelayError>> {
        let inner = self.inner.clone();
        let routing_key = routing_key.to_owned();
        Box::pin(async move {
            let targets: Vec<Arc<QueueInner>> = inner
                .bindings
                .lock()
                .await
                .iter()
                .filter(|(pattern, _)| topic_matches(pattern, &routing_key))
                .map(|(_, queue)| queue.clone())
                .collect();

            for queue in targets {
                queue
                    .push(
                        StoredMessage {
                            routing_key: routing_key.clone(),
                            body: body.clone(),
                            redelivered: false,
                        },
                        false,
                    )
                    .await;
            }
            Ok(())
        })
    }
}

/// Consumer handle on one in-memory queue.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    inner: Arc<QueueInner>,
}

impl InMemoryQueue {
    /// Stop handing out deliveries; pending `next_delivery` calls return `None`.
    pub async fn close(&self) {
        self.inner.state.lock().await.closed = true;
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    /// Messages waiting to be delivered.
    pub async fn ready_len(&self) -> usize {
        self.inner.state.lock().await.ready.len()
    }

    /// Messages delivered but not settled yet.
    pub async fn unacked_len(&self) -> usize {
        self.inner.state.lock().await.unacked.len()
    }
}

impl EventQueue for InMemoryQueue {
    fn next_delivery(&self) -> BoxFuture<'static, Result<Option<Delivery>, RelayError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            loop {
                {
                    let mut state = inner.state.lock().await;
                    if state.closed {
                        return Ok(None);
                    }
                    if let Some(message) = state.ready.pop_front() {
                        state.next_tag += 1;
                        let tag = state.next_tag.to_string();
                        state.unacked.insert(tag.clone(), message.clone());
                        return Ok(Some(Delivery {
                            tag,
                            routing_key: message.routing_key,
                            body: message.body,
                            redelivered: message.redelivered,
                        }));
                    }
                }
                inner.notify.notified().await;
            }
        })
    }

    fn ack(&self, tag: &str) -> BoxFuture<'static, Result<(), RelayError>> {
        let inner = self.inner.clone();
        let tag = tag.to_owned();
        Box::pin(async move {
            let mut state = inner.state.lock().await;
            state
                .unacked
                .remove(&tag)
                .map(|_| ())
                .ok_or(RelayError::UnknownDelivery(tag))
        })
    }

    fn nack_requeue(&self, tag: &str) -> BoxFuture<'static, Result<(), RelayError>> {
        let inner = self.inner.clone();
        let tag = tag.to_owned();
        Box::pin(async move {
            let message = {
                let mut state = inner.state.lock().await;
                state
                    .unacked
                    .remove(&tag)
                    .ok_or_else(|| RelayError::UnknownDelivery(tag.clone()))?
            };
            inner
                .push(
                    StoredMessage {
                        redelivered: true,
                        ..message
                    },
                    true,
                )
                .await;
            Ok(())
        })
    }
}
