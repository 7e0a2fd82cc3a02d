//! The broker adapter: uniform publish/consume over lapin.
//!
//! Every queue in the system is declared with the same argument set
//! (message TTL, dead-letter exchange, max priority), so a queue declared
//! by any producer is accepted by any consumer. Messages are published
//! with persistent delivery; consumed messages are acknowledged manually,
//! and handler failures divert the message to the `dlx` fanout exchange
//! instead of requeueing.

use std::future::Future;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::BrokerError;
use crate::reconnect::{next_delay, ReconnectConfig};

/// Queue carrying code-execution submissions.
pub const CODE_EXECUTION_QUEUE: &str = "code_execution_queue";

/// Fanout exchange receiving dead-lettered and expired messages.
pub const DLX_EXCHANGE: &str = "dlx";

/// Per-message time-to-live applied to every queue (milliseconds).
const MESSAGE_TTL_MS: i32 = 30_000;

/// Maximum message priority accepted by every queue. Declared for
/// forward compatibility; no publisher currently sets a priority.
const MAX_PRIORITY: i32 = 10;

/// AMQP persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// The fixed argument set shared by all queues in this system.
pub fn queue_arguments() -> FieldTable {
    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongInt(MESSAGE_TTL_MS));
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );
    args.insert("x-max-priority".into(), AMQPValue::LongInt(MAX_PRIORITY));
    args
}

/// Live connection state: one connection, one channel for publishing.
struct BrokerState {
    connection: Connection,
    channel: Channel,
}

/// Adapter over a durable AMQP broker.
///
/// The connection is established lazily on first use and re-established
/// transparently when it drops. Thread-safe; designed to be wrapped in
/// `Arc` and shared between the submission API and the dispatcher.
pub struct Broker {
    url: String,
    state: Mutex<Option<BrokerState>>,
}

impl Broker {
    /// Create an adapter for the given AMQP URL. Does not connect.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(None),
        }
    }

    /// Get the shared publish channel, connecting first if necessary.
    ///
    /// Lazy initialization is race-safe: the whole check-and-connect runs
    /// under the state mutex.
    async fn channel(&self) -> Result<Channel, BrokerError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.as_ref() {
            if existing.connection.status().connected() && existing.channel.status().connected() {
                return Ok(existing.channel.clone());
            }
        }

        // Stale or absent connection; (re)connect.
        *state = None;
        let connection =
            Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        tracing::info!(url = %self.url, "Connected to broker");

        let cloned = channel.clone();
        *state = Some(BrokerState { connection, channel });
        Ok(cloned)
    }

    /// Open a fresh channel on the current connection, replacing the
    /// cached one. Used after a channel-closing protocol error.
    async fn reset_channel(&self) -> Result<Channel, BrokerError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.as_mut() {
            if existing.connection.status().connected() {
                let channel = existing.connection.create_channel().await?;
                existing.channel = channel.clone();
                return Ok(channel);
            }
        }

        *state = None;
        let connection =
            Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        let cloned = channel.clone();
        *state = Some(BrokerState { connection, channel });
        Ok(cloned)
    }

    /// Idempotently declare `queue` with the system-wide argument set.
    ///
    /// On a declaration clash (an existing queue with different
    /// arguments closes the channel), the queue is deleted and
    /// redeclared exactly once.
    async fn declare_queue(&self, queue: &str) -> Result<Channel, BrokerError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        let channel = self.channel().await?;
        match channel
            .queue_declare(queue, options, queue_arguments())
            .await
        {
            Ok(_) => Ok(channel),
            Err(e) => {
                tracing::warn!(
                    queue,
                    error = %e,
                    "Queue declaration clashed; deleting and redeclaring",
                );
                // The failed declare closed the channel; open a fresh one.
                let channel = self.reset_channel().await?;
                channel
                    .queue_delete(queue, QueueDeleteOptions::default())
                    .await?;
                channel
                    .queue_declare(queue, options, queue_arguments())
                    .await?;
                Ok(channel)
            }
        }
    }

    /// Idempotently declare the dead-letter fanout exchange.
    pub async fn setup_dlx(&self) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .exchange_declare(
                DLX_EXCHANGE,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        tracing::debug!(exchange = DLX_EXCHANGE, "Dead-letter exchange declared");
        Ok(())
    }

    /// Serialize `payload` as JSON and publish it to `queue` with
    /// persistent delivery via the default exchange.
    ///
    /// The queue is declared (idempotently) before the publish.
    pub async fn publish<T: Serialize>(&self, queue: &str, payload: &T) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(payload)?;
        let channel = self.declare_queue(queue).await?;

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;

        tracing::debug!(queue, bytes = body.len(), "Message published");
        Ok(())
    }

    /// Consume `queue` until `cancel` is triggered.
    ///
    /// Declares the queue, sets consumer prefetch, then iterates
    /// deliveries. Per message: decode JSON and invoke `handler`; on
    /// `Ok` acknowledge, on `Err` negative-acknowledge without requeue
    /// (diverting to the dead-letter exchange). Undecodable payloads are
    /// dead-lettered the same way.
    ///
    /// A dropped connection triggers reconnection with exponential
    /// backoff. `cancel` stops consuming after the in-flight message
    /// completes; `force` interrupts the in-flight handler.
    pub async fn consume<H, Fut>(
        &self,
        queue: &str,
        prefetch: u16,
        cancel: CancellationToken,
        force: CancellationToken,
        handler: H,
    ) -> Result<(), BrokerError>
    where
        H: Fn(serde_json::Value) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let backoff = ReconnectConfig::default();
        let mut delay = backoff.initial_delay;

        loop {
            match self
                .consume_inner(queue, prefetch, &cancel, &force, &handler)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    tracing::warn!(
                        queue,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Consumer connection lost; reconnecting",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = next_delay(delay, &backoff);
                }
            }
        }
    }

    /// One consume session over a live channel. Returns `Ok(())` on
    /// cancellation, `Err` when the connection or channel fails.
    async fn consume_inner<H, Fut>(
        &self,
        queue: &str,
        prefetch: u16,
        cancel: &CancellationToken,
        force: &CancellationToken,
        handler: &H,
    ) -> Result<(), BrokerError>
    where
        H: Fn(serde_json::Value) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let channel = self.declare_queue(queue).await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!(queue, prefetch, "Consumer started");

        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(queue, "Consumer cancelled");
                    return Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        tracing::warn!(queue, "Consumer stream ended");
                        return Err(BrokerError::ConsumerEnded);
                    }
                },
            };

            let outcome = match serde_json::from_slice::<serde_json::Value>(&delivery.data) {
                Ok(payload) => {
                    // The in-flight handler runs to completion on a
                    // graceful cancel; only `force` interrupts it.
                    tokio::select! {
                        result = handler(payload) => result,
                        _ = force.cancelled() => {
                            Err(anyhow::anyhow!("consumer force-cancelled"))
                        }
                    }
                }
                Err(e) => Err(anyhow::anyhow!("undecodable message payload: {e}")),
            };

            match outcome {
                Ok(()) => {
                    delivery.ack(BasicAckOptions::default()).await?;
                }
                Err(e) => {
                    tracing::warn!(queue, error = %e, "Handler failed; dead-lettering message");
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await?;
                }
            }

            if force.is_cancelled() {
                tracing::info!(queue, "Consumer force-cancelled");
                return Ok(());
            }
        }
    }

    /// Whether a broker connection is (or can be) established.
    pub async fn health(&self) -> bool {
        self.channel().await.is_ok()
    }

    /// Close channel then connection. Safe to call more than once.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(BrokerState {
            connection,
            channel,
        }) = state.take()
        {
            if let Err(e) = channel.close(200, "Normal shutdown").await {
                tracing::debug!(error = %e, "Channel close failed");
            }
            if let Err(e) = connection.close(200, "Normal shutdown").await {
                tracing::debug!(error = %e, "Connection close failed");
            }
            tracing::info!("Broker connection closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_arguments_carry_the_shared_set() {
        let args = queue_arguments();
        let lookup = |name: &str| {
            args.inner()
                .iter()
                .find(|(key, _)| key.as_str() == name)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(lookup("x-message-ttl"), Some(AMQPValue::LongInt(30_000)));
        assert_eq!(
            lookup("x-dead-letter-exchange"),
            Some(AMQPValue::LongString("dlx".into()))
        );
        assert_eq!(lookup("x-max-priority"), Some(AMQPValue::LongInt(10)));
    }

    #[test]
    fn queue_and_exchange_names_are_fixed() {
        assert_eq!(CODE_EXECUTION_QUEUE, "code_execution_queue");
        assert_eq!(DLX_EXCHANGE, "dlx");
    }

    #[tokio::test]
    async fn close_is_idempotent_without_connection() {
        let broker = Broker::new("amqp://localhost:5672/%2f");
        // Never connected; both calls must be no-ops.
        broker.close().await;
        broker.close().await;
    }
}
