//! Streaming child-process runner.
//!
//! Spawns the interpreter, drains stdout and stderr line-by-line into
//! the record channel from two cooperating tasks, and races the child's
//! exit against the wall-clock bound. On expiry the child is killed
//! before its exit is awaited, so a blocked pipe cannot deadlock the
//! reaping, and no zombie remains.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use codestream_core::{ExecutionEvent, OutputStream};

use crate::executor::ExecutorError;

/// Total captured output cap per execution, shared across both streams.
///
/// Past the cap a single truncation notice is emitted; further lines
/// are read (so the child cannot block on a full pipe) but discarded.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How one child process run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child exited within the bound; non-zero codes included.
    Completed { return_code: i32 },
    /// The wall clock expired and the child was killed.
    TimedOut,
}

/// Spawn `cmd` and stream its output as `output` records.
///
/// Output records for one stream are emitted in production order;
/// interleaving across the two streams is not ordered. Returns after
/// both pipes hit EOF and the child has been reaped, so the caller's
/// terminal record is always last.
pub async fn run_streaming(
    cmd: &mut Command,
    execution_id: &str,
    timeout: Duration,
    tx: &mpsc::Sender<ExecutionEvent>,
) -> Result<ExitOutcome, ExecutorError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // One byte counter across both streams; one truncation notice.
    let emitted = Arc::new(AtomicUsize::new(0));
    let truncated = Arc::new(AtomicBool::new(false));

    let stdout_task = tokio::spawn(drain_stream(
        stdout,
        OutputStream::Stdout,
        execution_id.to_string(),
        tx.clone(),
        Arc::clone(&emitted),
        Arc::clone(&truncated),
    ));
    let stderr_task = tokio::spawn(drain_stream(
        stderr,
        OutputStream::Stderr,
        execution_id.to_string(),
        tx.clone(),
        Arc::clone(&emitted),
        Arc::clone(&truncated),
    ));

    let outcome = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => ExitOutcome::Completed {
            return_code: status.code().unwrap_or(-1),
        },
        Ok(Err(e)) => {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            return Err(e.into());
        }
        Err(_elapsed) => {
            // Kill before awaiting exit: a child blocked on a full pipe
            // would otherwise never be reaped. `kill` also waits.
            if let Err(e) = child.kill().await {
                tracing::debug!(execution_id = %execution_id, error = %e, "Kill after timeout failed");
            }
            ExitOutcome::TimedOut
        }
    };

    // Drain remaining output (the pipes are at EOF once the child is
    // gone) so the terminal record follows every output record.
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    Ok(outcome)
}

/// Read one pipe to EOF, emitting a record per decoded line.
///
/// Lines that fail UTF-8 decoding become a `[Binary output: N bytes]`
/// placeholder. A closed record channel stops emission but the pipe is
/// still consumed so the child can exit.
async fn drain_stream<R: AsyncRead + Unpin>(
    handle: Option<R>,
    stream: OutputStream,
    execution_id: String,
    tx: mpsc::Sender<ExecutionEvent>,
    emitted: Arc<AtomicUsize>,
    truncated: Arc<AtomicBool>,
) {
    let Some(handle) = handle else { return };
    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();
    let mut receiver_gone = false;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if receiver_gone {
                    continue;
                }

                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }

                let total = emitted.fetch_add(buf.len(), Ordering::Relaxed) + buf.len();
                if total > MAX_OUTPUT_BYTES {
                    if !truncated.swap(true, Ordering::Relaxed) {
                        let notice = format!("[Output truncated after {MAX_OUTPUT_BYTES} bytes]");
                        let _ = tx
                            .send(ExecutionEvent::output(&execution_id, stream, notice))
                            .await;
                    }
                    continue;
                }

                let content = match std::str::from_utf8(&buf) {
                    Ok(text) => text.to_string(),
                    Err(_) => format!("[Binary output: {} bytes]", buf.len()),
                };

                if tx
                    .send(ExecutionEvent::output(&execution_id, stream, content))
                    .await
                    .is_err()
                {
                    receiver_gone = true;
                }
            }
            Err(e) => {
                tracing::debug!(execution_id = %execution_id, error = %e, "Pipe read error");
                break;
            }
        }
    }
}
