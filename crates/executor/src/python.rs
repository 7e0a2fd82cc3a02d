//! Python AST compile check.
//!
//! Runs a small helper under `python3 -c` that parses the source read
//! from stdin and prints a JSON verdict on stdout. The same
//! JSON-over-pipes contract serves the pre-execution check and the
//! standalone validate endpoint.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::executor::ExecutorError;

/// Helper program: parse stdin as Python source, print a JSON verdict.
const AST_CHECK_HELPER: &str = r#"
import ast
import json
import sys

source = sys.stdin.read()
try:
    ast.parse(source)
    print(json.dumps({"valid": True}))
except SyntaxError as exc:
    print(json.dumps({
        "valid": False,
        "message": f"SyntaxError: {exc.msg}",
        "line": exc.lineno,
        "column": exc.offset,
    }))
"#;

/// Verdict of a compile check.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileCheck {
    /// Whether the source parses.
    pub valid: bool,
    /// Human-readable diagnostic, present when invalid.
    #[serde(default)]
    pub message: Option<String>,
    /// 1-based source line of the failure.
    #[serde(default)]
    pub line: Option<u32>,
    /// 1-based column of the failure.
    #[serde(default)]
    pub column: Option<u32>,
}

impl CompileCheck {
    /// A passing verdict.
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
            line: None,
            column: None,
        }
    }
}

/// Compile-check `code` with the Python 3 toolchain without executing it.
pub async fn compile_check(code: &str) -> Result<CompileCheck, ExecutorError> {
    let mut cmd = Command::new("python3");
    cmd.args(["-c", AST_CHECK_HELPER])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // Best-effort write; a helper that exits early surfaces below.
        let _ = stdin.write_all(code.as_bytes()).await;
        drop(stdin);
    }

    let output = child.wait_with_output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    serde_json::from_str(stdout.trim())
        .map_err(|e| ExecutorError::Check(format!("no verdict from checker: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_source_passes() {
        let check = compile_check("print('Hello')").await.unwrap();
        assert!(check.valid);
        assert!(check.message.is_none());
    }

    #[tokio::test]
    async fn empty_source_passes() {
        let check = compile_check("").await.unwrap();
        assert!(check.valid);
    }

    #[tokio::test]
    async fn unterminated_call_fails_on_line_one() {
        let check = compile_check("print('x'").await.unwrap();
        assert!(!check.valid);
        assert!(check.message.as_deref().unwrap().contains("SyntaxError"));
        assert_eq!(check.line, Some(1));
    }

    #[tokio::test]
    async fn error_line_is_reported() {
        let check = compile_check("x = 1\ny = (\n").await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.line, Some(2));
    }
}
