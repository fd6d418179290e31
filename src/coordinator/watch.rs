//! Sentinel connection management and event delivery.
//!
//! # Responsibilities
//! - Drive the `query` and `subscription` connection slots
//! - Rotate through the endpoint group on every disconnect
//! - Publish the current query connection as a shared handle
//! - Dispatch pub/sub messages to registered channel handlers
//!
//! # Design Decisions
//! - Each slot is one explicit loop over an endpoint index, so exactly
//!   one reconnect happens per disconnect no matter how many error
//!   signals preceded it
//! - The slots own independent cursors and timers; they are not
//!   coordinated with each other
//! - Plain multiplexed connections, never the crate's
//!   ConnectionManager: that would reconnect to the same address
//!   behind our back, and failover across the group belongs here
//! - Dispatch never propagates an error; a message without a live
//!   query handle or a registered handler is dropped with a warning

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::config::schema::Endpoint;

/// Fixed delay before reconnecting after a session ends.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The multiplexed connection surfaces no disconnect event, so the
/// query slot probes liveness at this interval.
const QUERY_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Handler for one pub/sub channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, payload: &str, query: MultiplexedConnection);
}

/// Invoked each time the query slot establishes a connection.
#[async_trait]
pub trait ConnectedHook: Send + Sync {
    async fn on_connected(&self, query: MultiplexedConnection);
}

/// Static mapping from channel name to handler.
pub type HandlerMap = HashMap<&'static str, Arc<dyn ChannelHandler>>;

/// Shared view of the query slot's current connection.
///
/// Set when the slot connects, cleared when the connection dies; only
/// the slot's own loop mutates it.
#[derive(Clone, Default)]
pub struct QueryHandle {
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl QueryHandle {
    /// The live query connection, if any.
    pub async fn current(&self) -> Option<MultiplexedConnection> {
        self.conn.lock().await.clone()
    }

    async fn set(&self, conn: MultiplexedConnection) {
        *self.conn.lock().await = Some(conn);
    }

    async fn clear(&self) {
        *self.conn.lock().await = None;
    }
}

/// Watches one Sentinel endpoint group.
pub struct CoordinatorWatchClient {
    endpoints: Vec<Endpoint>,
    query: QueryHandle,
}

impl CoordinatorWatchClient {
    pub fn new(endpoints: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            endpoints,
            query: QueryHandle::default(),
        })
    }

    pub fn query_handle(&self) -> QueryHandle {
        self.query.clone()
    }

    /// Spawn the two slot tasks. They run for the life of the process.
    pub fn spawn(self: Arc<Self>, hook: Arc<dyn ConnectedHook>, handlers: HandlerMap) {
        let client = self.clone();
        tokio::spawn(async move {
            let endpoints = client.endpoints.clone();
            run_slot("query", &endpoints, RECONNECT_DELAY, move |endpoint| {
                let client = client.clone();
                let hook = hook.clone();
                Box::pin(async move { client.query_session(endpoint, hook).await })
            })
            .await;
        });

        let client = self.clone();
        let handlers = Arc::new(handlers);
        tokio::spawn(async move {
            let endpoints = client.endpoints.clone();
            run_slot("subscription", &endpoints, RECONNECT_DELAY, move |endpoint| {
                let client = client.clone();
                let handlers = handlers.clone();
                Box::pin(async move { client.subscription_session(endpoint, handlers).await })
            })
            .await;
        });
    }

    /// One query-slot session: connect, publish the handle, fire the
    /// connected hook, then hold until the connection dies.
    async fn query_session(
        self: Arc<Self>,
        endpoint: Endpoint,
        hook: Arc<dyn ConnectedHook>,
    ) -> Result<(), redis::RedisError> {
        let conn = connect(&endpoint).await?;
        tracing::info!(slot = "query", endpoint = %endpoint, "connected to sentinel");

        self.query.set(conn.clone()).await;
        hook.on_connected(conn.clone()).await;

        watch_liveness(conn).await;
        self.query.clear().await;
        Ok(())
    }

    /// One subscription-slot session: connect, subscribe the handler
    /// map's channels, then dispatch until the message stream ends.
    async fn subscription_session(
        self: Arc<Self>,
        endpoint: Endpoint,
        handlers: Arc<HandlerMap>,
    ) -> Result<(), redis::RedisError> {
        let client = redis::Client::open(redis_url(&endpoint))?;
        let mut pubsub = client.get_async_pubsub().await?;
        for channel in handlers.keys() {
            pubsub.subscribe(*channel).await?;
        }
        tracing::info!(
            slot = "subscription",
            endpoint = %endpoint,
            channels = handlers.len(),
            "subscribed to sentinel channels"
        );

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let channel = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(channel, error = %err, "undecodable message payload, dropping");
                    continue;
                }
            };
            self.dispatch(&channel, &payload, &handlers).await;
        }
        Ok(())
    }

    async fn dispatch(&self, channel: &str, payload: &str, handlers: &HandlerMap) {
        let Some(conn) = self.query.current().await else {
            tracing::warn!(channel, "no query connection available, dropping message");
            return;
        };
        let Some(handler) = handlers.get(channel) else {
            tracing::warn!(channel, "no handler registered for channel, dropping message");
            return;
        };
        handler.handle(payload, conn).await;
    }
}

/// Drive one connection slot forever.
///
/// Each iteration runs one session against `endpoints[index]`; when
/// it returns (clean stream end or connection failure alike) the slot
/// waits `delay` and advances to the next endpoint.
pub(crate) async fn run_slot<E, F>(
    slot: &'static str,
    endpoints: &[Endpoint],
    delay: Duration,
    mut session: F,
) where
    E: std::fmt::Display,
    F: FnMut(Endpoint) -> BoxFuture<'static, Result<(), E>>,
{
    let mut index = 0usize;
    loop {
        let endpoint = endpoints[index].clone();
        tracing::info!(slot, endpoint = %endpoint, "connecting to sentinel");
        match session(endpoint.clone()).await {
            Ok(()) => {
                tracing::warn!(slot, endpoint = %endpoint, "sentinel connection ended");
            }
            Err(err) => {
                tracing::warn!(slot, endpoint = %endpoint, error = %err, "sentinel connection failed");
            }
        }
        tokio::time::sleep(delay).await;
        index = (index + 1) % endpoints.len();
    }
}

async fn connect(endpoint: &Endpoint) -> Result<MultiplexedConnection, redis::RedisError> {
    let client = redis::Client::open(redis_url(endpoint))?;
    client.get_multiplexed_async_connection().await
}

/// Returns when the connection stops answering pings.
async fn watch_liveness(mut conn: MultiplexedConnection) {
    let mut ticker = tokio::time::interval(QUERY_PING_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
        {
            tracing::debug!(error = %err, "sentinel query connection stopped answering");
            return;
        }
    }
}

fn redis_url(endpoint: &Endpoint) -> String {
    format!("redis://{}:{}/", endpoint.host, endpoint.port)
}
