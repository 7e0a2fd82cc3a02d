//! The executor pipeline: stage records, temp-file staging, compile
//! check, child spawn, and the terminal record.

use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;

use codestream_core::{ExecutionEvent, Language};

use crate::python;
use crate::subprocess::{self, ExitOutcome};

/// Default wall-clock bound on one execution.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered records between the executor task and its consumer.
const EVENT_BUFFER: usize = 64;

/// Errors inside the execution pipeline.
///
/// These never escape [`CodeExecutor::execute`]: every fault becomes an
/// `error` record on the stream, except [`ExecutorError::Aborted`],
/// which means the consumer dropped the stream and nothing can be
/// delivered anymore.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Temp-file write, spawn, or pipe I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The compile-check helper produced no parseable verdict.
    #[error("Compile check failed: {0}")]
    Check(String),

    /// The record receiver was dropped; the stream is dead.
    #[error("Execution stream closed by consumer")]
    Aborted,
}

/// Executes one program text per call against a named language
/// toolchain, with a hard wall-clock bound.
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    timeout: Duration,
}

impl CodeExecutor {
    /// Create an executor with the given wall-clock bound.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured wall-clock bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `code` against `language_tag`, returning the record
    /// stream as a channel receiver.
    ///
    /// The sequence is finite and forward-only: `starting` first, at
    /// most one terminal record (`completed`, `timeout`,
    /// `compilation_error`, or `error`) last. An empty `execution_id`
    /// gets a fresh UUID as a defensive fallback; callers normally pass
    /// the submission's identifier. Dropping the receiver aborts the
    /// pipeline; the temp file and child process are released on every
    /// exit path.
    pub fn execute(
        &self,
        code: impl Into<String>,
        language_tag: &str,
        execution_id: &str,
    ) -> mpsc::Receiver<ExecutionEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let code = code.into();
        let language_tag = language_tag.to_string();
        let execution_id = if execution_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            execution_id.to_string()
        };
        let timeout = self.timeout;

        tokio::spawn(async move {
            let Some(language) = Language::parse(&language_tag) else {
                tracing::warn!(
                    execution_id = %execution_id,
                    language = %language_tag,
                    "Unsupported language",
                );
                let _ = tx
                    .send(ExecutionEvent::error(
                        &execution_id,
                        format!("Unsupported language: {language_tag}"),
                    ))
                    .await;
                return;
            };

            match run_pipeline(&code, language, &execution_id, timeout, &tx).await {
                Ok(()) => {}
                Err(ExecutorError::Aborted) => {
                    tracing::debug!(execution_id = %execution_id, "Stream consumer went away");
                }
                Err(e) => {
                    tracing::error!(execution_id = %execution_id, error = %e, "Execution failed");
                    let _ = tx
                        .send(ExecutionEvent::error(&execution_id, e.to_string()))
                        .await;
                }
            }
        });

        rx
    }
}

impl Default for CodeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTION_TIMEOUT)
    }
}

/// Push one record, translating a closed channel into [`ExecutorError::Aborted`].
async fn emit(
    tx: &mpsc::Sender<ExecutionEvent>,
    event: ExecutionEvent,
) -> Result<(), ExecutorError> {
    tx.send(event).await.map_err(|_| ExecutorError::Aborted)
}

/// The common per-language pipeline.
///
/// The temp file lives for the whole function body, so its deletion is
/// guaranteed on every exit path, after the child (which reads it) has
/// been reaped.
async fn run_pipeline(
    code: &str,
    language: Language,
    execution_id: &str,
    timeout: Duration,
    tx: &mpsc::Sender<ExecutionEvent>,
) -> Result<(), ExecutorError> {
    emit(tx, ExecutionEvent::starting(execution_id)).await?;

    let source_file = tempfile::Builder::new()
        .prefix("codestream_")
        .suffix(language.file_suffix())
        .tempfile_in(std::env::temp_dir())?;
    tokio::fs::write(source_file.path(), code).await?;
    tracing::debug!(
        execution_id = %execution_id,
        path = %source_file.path().display(),
        "Program text staged",
    );

    if language == Language::Python {
        emit(tx, ExecutionEvent::compiling(execution_id)).await?;
        let check = python::compile_check(code).await?;
        if check.valid {
            emit(tx, ExecutionEvent::compilation_success(execution_id)).await?;
        } else {
            emit(
                tx,
                ExecutionEvent::compilation_error(
                    execution_id,
                    check
                        .message
                        .unwrap_or_else(|| "SyntaxError".to_string()),
                    check.line,
                    check.column,
                ),
            )
            .await?;
            // The program is never executed on a failed check.
            return Ok(());
        }
    }

    emit(tx, ExecutionEvent::executing(execution_id)).await?;

    let mut cmd = Command::new(language.interpreter());
    cmd.arg(source_file.path())
        .current_dir(std::env::temp_dir());

    let outcome = subprocess::run_streaming(&mut cmd, execution_id, timeout, tx).await?;

    match outcome {
        ExitOutcome::Completed { return_code } => {
            tracing::info!(
                execution_id = %execution_id,
                return_code,
                "Execution completed",
            );
            emit(tx, ExecutionEvent::completed(execution_id, return_code)).await?;
        }
        ExitOutcome::TimedOut => {
            tracing::warn!(
                execution_id = %execution_id,
                timeout_secs = timeout.as_secs(),
                "Execution timed out",
            );
            emit(
                tx,
                ExecutionEvent::timeout(
                    execution_id,
                    format!("Execution timed out after {} seconds", timeout.as_secs()),
                ),
            )
            .await?;
        }
    }

    Ok(())
}
