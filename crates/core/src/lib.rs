//! Domain types for the code-execution pipeline.
//!
//! Everything the broker, executor, and API crates share lives here:
//! submissions, execution records, the language registry, the tab
//! combiner, and the WebSocket frame-type constants. No I/O.

pub mod error;
pub mod language;
pub mod record;
pub mod stream_events;
pub mod submission;
pub mod tabs;
pub mod types;

pub use error::CoreError;
pub use language::Language;
pub use record::{ExecutionEvent, ExecutionStage, OutputStream};
pub use submission::{Submission, Tab};
pub use tabs::combine_tabs;
