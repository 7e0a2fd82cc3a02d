//! The submission consumer loop.
//!
//! Drains `code_execution_queue` one message at a time, drives the
//! executor, and re-emits every record to the subscription hub wrapped
//! in the stream framing (`execution_started` / `execution_update` /
//! `execution_finished`).

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use codestream_broker::{Broker, CODE_EXECUTION_QUEUE};
use codestream_core::stream_events::{
    MSG_TYPE_EXECUTION_ERROR, MSG_TYPE_EXECUTION_FINISHED, MSG_TYPE_EXECUTION_STARTED,
    MSG_TYPE_EXECUTION_UPDATE,
};
use codestream_core::{combine_tabs, ExecutionEvent, Submission};
use codestream_executor::CodeExecutor;

use crate::ws::SubscriptionHub;

/// Prefetch is fixed at 1 so a slow execution does not starve
/// back-pressure.
const SUBMISSION_PREFETCH: u16 = 1;

/// Delay between retries of the pre-consume broker setup.
const SETUP_RETRY_SECS: u64 = 5;

/// Consumer lifecycle, observable through [`Dispatcher::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Long-lived consumer that executes submissions and fans results out
/// to subscribers.
pub struct Dispatcher {
    broker: Arc<Broker>,
    hub: Arc<SubscriptionHub>,
    executor: CodeExecutor,
    state: watch::Sender<DispatcherState>,
}

impl Dispatcher {
    pub fn new(broker: Arc<Broker>, hub: Arc<SubscriptionHub>, executor: CodeExecutor) -> Self {
        let (state, _) = watch::channel(DispatcherState::Stopped);
        Self {
            broker,
            hub,
            executor,
            state,
        }
    }

    /// Observe the consumer lifecycle (used by the health probe).
    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Run the consumer until `cancel` is triggered.
    ///
    /// Entering the running state requires the dead-letter exchange and
    /// queue setup to have completed; setup failures are retried until
    /// cancellation. A graceful cancel lets the in-flight submission
    /// finish its executor sequence; `force` escalates to a hard cancel.
    pub async fn run(&self, cancel: CancellationToken, force: CancellationToken) {
        self.state.send_replace(DispatcherState::Starting);

        loop {
            match self.broker.setup_dlx().await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_secs = SETUP_RETRY_SECS,
                        "Broker setup failed; retrying",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.state.send_replace(DispatcherState::Stopped);
                            return;
                        }
                        _ = tokio::time::sleep(std::time::Duration::from_secs(SETUP_RETRY_SECS)) => {}
                    }
                }
            }
        }

        self.state.send_replace(DispatcherState::Running);
        tracing::info!(queue = CODE_EXECUTION_QUEUE, "Dispatcher running");

        let result = self
            .broker
            .consume(
                CODE_EXECUTION_QUEUE,
                SUBMISSION_PREFETCH,
                cancel,
                force,
                |payload| self.handle(payload),
            )
            .await;

        self.state.send_replace(DispatcherState::Stopping);
        if let Err(e) = result {
            tracing::error!(error = %e, "Dispatcher consumer ended with error");
        }
        self.state.send_replace(DispatcherState::Stopped);
        tracing::info!("Dispatcher stopped");
    }

    /// Handle one submission message.
    ///
    /// Returns `Err` only for messages that cannot be attributed to an
    /// execution (undecodable, missing identifier); those dead-letter.
    /// Everything else is reported on the stream and acknowledged.
    pub async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let submission: Submission =
            serde_json::from_value(payload).context("invalid submission payload")?;

        if submission.execution_id.trim().is_empty() {
            anyhow::bail!("submission missing execution_id");
        }
        let execution_id = submission.execution_id.clone();

        if !submission.has_code() {
            // Caller error, not a retryable fault: report and acknowledge.
            tracing::warn!(execution_id = %execution_id, "Submission has no usable code");
            self.hub
                .send_to(
                    &execution_id,
                    &wrap_update(&ExecutionEvent::error(
                        &execution_id,
                        "No code provided for execution",
                    )),
                )
                .await;
            return Ok(());
        }

        if let Err(e) = self.process(&submission).await {
            tracing::error!(
                execution_id = %execution_id,
                error = %e,
                "Submission processing failed",
            );
            self.hub
                .send_to(
                    &execution_id,
                    &json!({
                        "type": MSG_TYPE_EXECUTION_ERROR,
                        "execution_id": execution_id,
                        "error": e.to_string(),
                        "message": "Code execution failed",
                    }),
                )
                .await;
        }

        Ok(())
    }

    /// Drive one submission through the executor, framing the stream.
    async fn process(&self, submission: &Submission) -> anyhow::Result<()> {
        let execution_id = &submission.execution_id;

        let code = match submission.tabs.as_deref() {
            Some(tabs) if !tabs.is_empty() => combine_tabs(tabs),
            _ => submission.code.clone().unwrap_or_default(),
        };

        tracing::info!(
            execution_id = %execution_id,
            language = %submission.language,
            code_len = code.len(),
            "Dispatching execution",
        );

        self.hub
            .send_to(
                execution_id,
                &json!({
                    "type": MSG_TYPE_EXECUTION_STARTED,
                    "execution_id": execution_id,
                    "language": submission.language,
                }),
            )
            .await;

        let mut records = self
            .executor
            .execute(code, &submission.language, execution_id);
        while let Some(event) = records.recv().await {
            self.hub.send_to(execution_id, &wrap_update(&event)).await;
        }

        self.hub
            .send_to(
                execution_id,
                &json!({
                    "type": MSG_TYPE_EXECUTION_FINISHED,
                    "execution_id": execution_id,
                }),
            )
            .await;

        Ok(())
    }
}

/// Flatten an execution record into an `execution_update` frame.
fn wrap_update(event: &ExecutionEvent) -> serde_json::Value {
    let mut value = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if let Some(fields) = value.as_object_mut() {
        fields.insert("type".into(), MSG_TYPE_EXECUTION_UPDATE.into());
    }
    value
}
