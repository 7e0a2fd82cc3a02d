//! Execution records: the unit of work on the result stream.
//!
//! An [`ExecutionEvent`] is one record of the finite, ordered stream an
//! execution produces. The stage tag serializes as a `"status"` field so
//! the record can be flattened into an `execution_update` WebSocket frame
//! without colliding with the frame's own `"type"` discriminator.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Which captured pipe an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Lifecycle stage or captured output carried by one execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStage {
    /// Execution accepted; the program text is about to be staged.
    Starting,
    /// Pre-execution compile check in progress (Python only).
    Compiling,
    /// Compile check passed.
    CompilationSuccess,
    /// Compile check failed; the program was never executed.
    CompilationError {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },
    /// The child process has been (or is about to be) spawned.
    Executing,
    /// One decoded line of captured output.
    Output {
        stream: OutputStream,
        content: String,
    },
    /// The child exited. A non-zero `return_code` still counts as
    /// completed; the code distinguishes success from failure.
    Completed { return_code: i32 },
    /// The wall-clock bound expired and the child was killed.
    Timeout { message: String },
    /// The execution failed before or outside the child process.
    Error { message: String },
}

/// One record on an execution's result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// The execution this record belongs to.
    pub execution_id: String,
    /// When the record was produced (UTC).
    pub timestamp: Timestamp,
    /// Stage transition or output payload.
    #[serde(flatten)]
    pub stage: ExecutionStage,
}

impl ExecutionEvent {
    /// Build a record for `execution_id`, stamped with the current time.
    pub fn new(execution_id: impl Into<String>, stage: ExecutionStage) -> Self {
        Self {
            execution_id: execution_id.into(),
            timestamp: chrono::Utc::now(),
            stage,
        }
    }

    pub fn starting(execution_id: &str) -> Self {
        Self::new(execution_id, ExecutionStage::Starting)
    }

    pub fn compiling(execution_id: &str) -> Self {
        Self::new(execution_id, ExecutionStage::Compiling)
    }

    pub fn compilation_success(execution_id: &str) -> Self {
        Self::new(execution_id, ExecutionStage::CompilationSuccess)
    }

    pub fn compilation_error(
        execution_id: &str,
        message: impl Into<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Self {
        Self::new(
            execution_id,
            ExecutionStage::CompilationError {
                message: message.into(),
                line,
                column,
            },
        )
    }

    pub fn executing(execution_id: &str) -> Self {
        Self::new(execution_id, ExecutionStage::Executing)
    }

    pub fn output(execution_id: &str, stream: OutputStream, content: impl Into<String>) -> Self {
        Self::new(
            execution_id,
            ExecutionStage::Output {
                stream,
                content: content.into(),
            },
        )
    }

    pub fn completed(execution_id: &str, return_code: i32) -> Self {
        Self::new(execution_id, ExecutionStage::Completed { return_code })
    }

    pub fn timeout(execution_id: &str, message: impl Into<String>) -> Self {
        Self::new(
            execution_id,
            ExecutionStage::Timeout {
                message: message.into(),
            },
        )
    }

    pub fn error(execution_id: &str, message: impl Into<String>) -> Self {
        Self::new(
            execution_id,
            ExecutionStage::Error {
                message: message.into(),
            },
        )
    }

    /// True when this record terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.stage,
            ExecutionStage::Completed { .. }
                | ExecutionStage::Timeout { .. }
                | ExecutionStage::Error { .. }
                | ExecutionStage::CompilationError { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_record_serializes_with_status_tag() {
        let event = ExecutionEvent::output("exec-1", OutputStream::Stdout, "Hello");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["execution_id"], "exec-1");
        assert_eq!(json["status"], "output");
        assert_eq!(json["stream"], "stdout");
        assert_eq!(json["content"], "Hello");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn completed_record_carries_return_code() {
        let event = ExecutionEvent::completed("exec-1", 2);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["return_code"], 2);
    }

    #[test]
    fn compilation_error_carries_position() {
        let event =
            ExecutionEvent::compilation_error("exec-1", "SyntaxError: unexpected EOF", Some(1), Some(10));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "compilation_error");
        assert_eq!(json["message"], "SyntaxError: unexpected EOF");
        assert_eq!(json["line"], 1);
        assert_eq!(json["column"], 10);
    }

    #[test]
    fn stage_tags_use_snake_case() {
        let event = ExecutionEvent::compilation_success("e");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "compilation_success");

        let event = ExecutionEvent::starting("e");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "starting");
    }

    #[test]
    fn terminal_stages_are_classified() {
        assert!(ExecutionEvent::completed("e", 0).is_terminal());
        assert!(ExecutionEvent::timeout("e", "t").is_terminal());
        assert!(ExecutionEvent::error("e", "x").is_terminal());
        assert!(ExecutionEvent::compilation_error("e", "m", None, None).is_terminal());
        assert!(!ExecutionEvent::starting("e").is_terminal());
        assert!(!ExecutionEvent::output("e", OutputStream::Stderr, "x").is_terminal());
    }

    #[test]
    fn record_roundtrips_through_json() {
        let event = ExecutionEvent::output("exec-9", OutputStream::Stderr, "warning");
        let text = serde_json::to_string(&event).unwrap();
        let back: ExecutionEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
