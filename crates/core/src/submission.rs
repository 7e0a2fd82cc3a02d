//! The submission: the unit of work carried on the broker queue.

use serde::{Deserialize, Serialize};

use crate::language::DEFAULT_LANGUAGE;
use crate::types::Timestamp;

/// A named fragment of source text within one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    /// Display name; empty names get a positional default when combined.
    #[serde(default)]
    pub name: String,
    /// Fragment source text.
    #[serde(default)]
    pub content: String,
}

/// A code-execution request as published to `code_execution_queue`.
///
/// Created by the submission API, never mutated afterwards; destroyed on
/// broker acknowledgement or diverted to the dead-letter exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Opaque identifier naming this execution and its result stream.
    pub execution_id: String,
    /// Single-snippet program text.
    #[serde(default)]
    pub code: Option<String>,
    /// Language tag from the closed set.
    #[serde(default = "default_language")]
    pub language: String,
    /// Ordered named fragments, combined into one program before execution.
    #[serde(default)]
    pub tabs: Option<Vec<Tab>>,
    /// Carried, not interpreted.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Wall clock at submission time.
    pub timestamp: Timestamp,
    /// Which boundary produced the submission.
    #[serde(default = "default_request_source")]
    pub request_source: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_request_source() -> String {
    "api".to_string()
}

impl Submission {
    /// Whether the submission carries anything executable: non-empty
    /// `code`, or at least one tab with non-whitespace content.
    pub fn has_code(&self) -> bool {
        if self.code.as_deref().is_some_and(|c| !c.is_empty()) {
            return true;
        }
        self.tabs
            .as_deref()
            .is_some_and(|tabs| tabs.iter().any(|t| !t.content.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
