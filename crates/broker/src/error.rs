/// Errors surfaced by the broker adapter.
///
/// Connection and protocol failures are reported to `publish` callers;
/// inside `consume` they trigger a reconnect cycle instead.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Connection, channel, or protocol failure from the AMQP client.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// A payload could not be serialized to JSON.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The consumer's delivery stream ended without cancellation.
    #[error("Consumer stream ended unexpectedly")]
    ConsumerEnded,
}
