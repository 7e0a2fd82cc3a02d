//! Submission consumption and stream fan-out.

mod dispatcher;

pub use dispatcher::{Dispatcher, DispatcherState};
