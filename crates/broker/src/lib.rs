//! Durable message broker adapter.
//!
//! Wraps a lapin (AMQP 0.9.1) connection behind a uniform async
//! interface: declare-and-publish, prefetch-bounded consume with manual
//! acknowledgement, dead-letter routing, and reconnection with backoff.

pub mod adapter;
pub mod error;
pub mod reconnect;

pub use adapter::{Broker, CODE_EXECUTION_QUEUE, DLX_EXCHANGE};
pub use error::BrokerError;
