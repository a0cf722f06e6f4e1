//! Redis Streams backend: the stream plays the exchange, a consumer group
//! plays the durable queue, `XACK` settles a delivery and re-reading the
//! pending entries list requeues it.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::future::BoxFuture;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, MultiplexedConnection},
    streams::{StreamReadOptions, StreamReadReply},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Delivery, EXCHANGE_NAME, EventPublisher, EventQueue, RelayError, topic::topic_matches};

const ROUTING_KEY_FIELD: &str = "routing_key";
const BODY_FIELD: &str = "body";
const READ_BLOCK_MS: usize = 2_000;

fn open_client(redis_url: &str) -> Result<Client, RelayError> {
    Client::open(redis_url).map_err(|err| RelayError::unavailable("invalid REDIS_URL", err))
}

/// Publisher appending events to the exchange stream.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    manager: ConnectionManager,
}

impl RedisStreamPublisher {
    /// Connect a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, RelayError> {
        let client = open_client(redis_url)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| RelayError::unavailable("unable to initialize Redis connection manager", err))?;
        Ok(Self { manager })
    }
}

impl EventPublisher for RedisStreamPublisher {
    fn publish(&self, routing_key: &str, body: String) -> BoxFuture<'static, Result<(), RelayError>> {
        let mut manager = self.manager.clone();
        let routing_key = routing_key.to_owned();
        Box::pin(async move {
            let _id: String = manager
                .xadd(
                    EXCHANGE_NAME,
                    "*",
                    &[(ROUTING_KEY_FIELD, routing_key.as_str()), (BODY_FIELD, body.as_str())],
                )
                .await
                .map_err(|err| RelayError::unavailable("XADD failed", err))?;
            Ok(())
        })
    }
}

struct QueueInner {
    reader: Mutex<MultiplexedConnection>,
    control: ConnectionManager,
    group: String,
    consumer: String,
    pattern: String,
    replay_pending: AtomicBool,
}

/// Consumer-group reader on the exchange stream.
#[derive(Clone)]
pub struct RedisStreamQueue {
    inner: Arc<QueueInner>,
}

impl RedisStreamQueue {
    /// Declare (idempotently) the consumer group `group`, starting at new
    /// entries, and open a reader.
    ///
    /// Entries left pending by a previous run of the same consumer are
    /// replayed first.
    pub async fn open(
        redis_url: &str,
        group: &str,
        consumer: &str,
        pattern: &str,
    ) -> Result<Self, RelayError> {
        let client = open_client(redis_url)?;
        let mut control = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| RelayError::unavailable("unable to initialize Redis connection manager", err))?;

        let created: redis::RedisResult<()> = control
            .xgroup_create_mkstream(EXCHANGE_NAME, group, "$")
            .await;
        match created {
            Ok(()) => info!(group, "created relay consumer group"),
            Err(err) if err.code() == Some("BUSYGROUP") => {
                debug!(group, "relay consumer group already exists")
            }
            Err(err) => return Err(RelayError::unavailable("XGROUP CREATE failed", err)),
        }

        // Blocking reads get their own connection so they never stall acks.
        let reader = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| RelayError::unavailable("unable to open Redis reader connection", err))?;

        Ok(Self {
            inner: Arc::new(QueueInner {
                reader: Mutex::new(reader),
                control,
                group: group.to_owned(),
                consumer: consumer.to_owned(),
                pattern: pattern.to_owned(),
                replay_pending: AtomicBool::new(true),
            }),
        })
    }
}

impl QueueInner {
    async fn read_one(&self, replay: bool) -> Result<Option<Delivery>, RelayError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1);
        let options = if replay { options } else { options.block(READ_BLOCK_MS) };
        let id = if replay { "0" } else { ">" };

        let reply: StreamReadReply = {
            let mut reader = self.reader.lock().await;
            reader
                .xread_options(&[EXCHANGE_NAME], &[id], &options)
                .await
                .map_err(|err| RelayError::unavailable("XREADGROUP failed", err))?
        };

        let entry = reply
            .keys
            .into_iter()
            .flat_map(|key| key.ids)
            .next();

        Ok(entry.map(|entry| Delivery {
            routing_key: entry.get(ROUTING_KEY_FIELD).unwrap_or_default(),
            body: entry.get(BODY_FIELD).unwrap_or_default(),
            tag: entry.id,
            redelivered: replay,
        }))
    }

    async fn xack(&self, tag: &str) -> Result<(), RelayError> {
        let mut control = self.control.clone();
        let acked: i64 = control
            .xack(EXCHANGE_NAME, &self.group, &[tag])
            .await
            .map_err(|err| RelayError::unavailable("XACK failed", err))?;
        if acked == 0 {
            return Err(RelayError::UnknownDelivery(tag.to_owned()));
        }
        Ok(())
    }
}

impl EventQueue for RedisStreamQueue {
    fn next_delivery(&self) -> BoxFuture<'static, Result<Option<Delivery>, RelayError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            loop {
                let replay = inner.replay_pending.load(Ordering::Acquire);
                match inner.read_one(replay).await? {
                    Some(delivery) if !topic_matches(&inner.pattern, &delivery.routing_key) => {
                        // The stream carries every key; unbound ones are settled and skipped.
                        inner.xack(&delivery.tag).await?;
                    }
                    Some(delivery) => return Ok(Some(delivery)),
                    None if replay => inner.replay_pending.store(false, Ordering::Release),
                    None => {}
                }
            }
        })
    }

    fn ack(&self, tag: &str) -> BoxFuture<'static, Result<(), RelayError>> {
        let inner = self.inner.clone();
        let tag = tag.to_owned();
        Box::pin(async move { inner.xack(&tag).await })
    }

    fn nack_requeue(&self, _tag: &str) -> BoxFuture<'static, Result<(), RelayError>> {
        // The entry stays in the pending list; the next read replays it.
        self.inner.replay_pending.store(true, Ordering::Release);
        Box::pin(async { Ok(()) })
    }
}
