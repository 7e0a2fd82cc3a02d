//! WebSocket frame-type constants for the execution stream.
//!
//! Used by the dispatcher and the WebSocket handler when building frames
//! for subscribers of an execution identifier.

/// Sent immediately after a socket is accepted and bound.
pub const MSG_TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";

/// Reply to a client `ping` frame.
pub const MSG_TYPE_PONG: &str = "pong";

/// Sent when an inbound client frame is not valid JSON.
pub const MSG_TYPE_ERROR: &str = "error";

/// Framing: the dispatcher picked up a submission.
pub const MSG_TYPE_EXECUTION_STARTED: &str = "execution_started";

/// One execution record, flattened into the frame.
pub const MSG_TYPE_EXECUTION_UPDATE: &str = "execution_update";

/// Framing: the submission's stream is complete.
pub const MSG_TYPE_EXECUTION_FINISHED: &str = "execution_finished";

/// The dispatcher failed while processing the submission.
pub const MSG_TYPE_EXECUTION_ERROR: &str = "execution_error";
