//! Codestream API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! the subscription hub, and the dispatcher) so integration tests and
//! the binary entrypoint can both access them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;
