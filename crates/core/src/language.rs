//! Closed set of supported execution languages.
//!
//! The tag set accepted on the wire is `python`, `javascript`, `js`,
//! and `node` (case-insensitive). `js` and `node` are aliases for the
//! Node.js toolchain.

use serde::{Deserialize, Serialize};

/// Language tags accepted by the submission API, in canonical order.
pub const SUPPORTED_LANGUAGES: &[&str] = &["python", "javascript", "js", "node"];

/// Default language when a submission omits the tag.
pub const DEFAULT_LANGUAGE: &str = "python";

/// A supported execution toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python 3, with a pre-execution AST compile check.
    Python,
    /// Node.js, no pre-execution check.
    JavaScript,
}

impl Language {
    /// Parse a language tag, case-insensitively, honouring aliases.
    ///
    /// Returns `None` for anything outside the closed set.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "python" => Some(Self::Python),
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            _ => None,
        }
    }

    /// Conventional source-file suffix for this language.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Python => ".py",
            Self::JavaScript => ".js",
        }
    }

    /// Interpreter program spawned to run a source file.
    pub fn interpreter(&self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::JavaScript => "node",
        }
    }

    /// Canonical tag used in outbound frames.
    pub fn canonical_tag(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
