use std::sync::Arc;

use tokio::sync::watch;

use codestream_broker::Broker;

use crate::config::ServerConfig;
use crate::dispatch::DispatcherState;
use crate::ws::SubscriptionHub;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Broker adapter shared with the dispatcher.
    pub broker: Arc<Broker>,
    /// Subscription hub (subscriber sockets).
    pub hub: Arc<SubscriptionHub>,
    /// Dispatcher lifecycle, observed by the health probe.
    pub dispatcher_state: watch::Receiver<DispatcherState>,
}
