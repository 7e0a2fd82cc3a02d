//! Integration tests for the code executor, driving the real Python 3
//! toolchain end to end and asserting the record stream shape.

use std::time::Duration;

use codestream_core::{ExecutionEvent, ExecutionStage, OutputStream};
use codestream_executor::CodeExecutor;
use tokio::sync::mpsc;

/// Drain the full record stream into a vector.
async fn collect(mut rx: mpsc::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Short stage label per record, for sequence assertions.
fn stage_tag(event: &ExecutionEvent) -> &'static str {
    match &event.stage {
        ExecutionStage::Starting => "starting",
        ExecutionStage::Compiling => "compiling",
        ExecutionStage::CompilationSuccess => "compilation_success",
        ExecutionStage::CompilationError { .. } => "compilation_error",
        ExecutionStage::Executing => "executing",
        ExecutionStage::Output { .. } => "output",
        ExecutionStage::Completed { .. } => "completed",
        ExecutionStage::Timeout { .. } => "timeout",
        ExecutionStage::Error { .. } => "error",
    }
}

fn stage_tags(events: &[ExecutionEvent]) -> Vec<&'static str> {
    events.iter().map(stage_tag).collect()
}

/// Output record contents for one stream, in emission order.
fn output_lines(events: &[ExecutionEvent], which: OutputStream) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.stage {
            ExecutionStage::Output { stream, content } if *stream == which => {
                Some(content.clone())
            }
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test: Python happy path emits the full stage sequence in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn python_happy_path_stage_sequence() {
    let executor = CodeExecutor::default();
    let rx = executor.execute("print('Hello, World!')", "python", "t-happy");
    let events = collect(rx).await;

    assert_eq!(
        stage_tags(&events),
        vec![
            "starting",
            "compiling",
            "compilation_success",
            "executing",
            "output",
            "completed",
        ]
    );

    assert_eq!(
        output_lines(&events, OutputStream::Stdout),
        vec!["Hello, World!"]
    );

    let last = events.last().unwrap();
    assert_eq!(last.stage, ExecutionStage::Completed { return_code: 0 });

    // Every record is tagged with the caller's execution id.
    assert!(events.iter().all(|e| e.execution_id == "t-happy"));
}

// ---------------------------------------------------------------------------
// Test: syntax error short-circuits before execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn python_syntax_error_skips_execution() {
    let executor = CodeExecutor::default();
    let rx = executor.execute("print('x'", "python", "t-syntax");
    let events = collect(rx).await;

    assert_eq!(
        stage_tags(&events),
        vec!["starting", "compiling", "compilation_error"]
    );

    match &events.last().unwrap().stage {
        ExecutionStage::CompilationError { message, line, .. } => {
            assert!(message.contains("SyntaxError"), "got: {message}");
            assert_eq!(*line, Some(1));
        }
        other => panic!("expected compilation_error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: empty Python program compiles and completes with code 0
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_python_program_completes_cleanly() {
    let executor = CodeExecutor::default();
    let rx = executor.execute("", "python", "t-empty");
    let events = collect(rx).await;

    assert_eq!(
        stage_tags(&events),
        vec![
            "starting",
            "compiling",
            "compilation_success",
            "executing",
            "completed",
        ]
    );
    assert_eq!(
        events.last().unwrap().stage,
        ExecutionStage::Completed { return_code: 0 }
    );
}

// ---------------------------------------------------------------------------
// Test: unsupported language yields a single error record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_language_yields_single_error() {
    let executor = CodeExecutor::default();
    let rx = executor.execute("x", "brainfuck", "t-lang");
    let events = collect(rx).await;

    assert_eq!(events.len(), 1);
    match &events[0].stage {
        ExecutionStage::Error { message } => {
            assert_eq!(message, "Unsupported language: brainfuck");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: wall-clock bound kills the child and emits timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeout_kills_child_and_terminates_stream() {
    let executor = CodeExecutor::new(Duration::from_secs(1));
    let rx = executor.execute("import time\ntime.sleep(10)\n", "python", "t-slow");
    let events = collect(rx).await;

    let last = events.last().unwrap();
    match &last.stage {
        ExecutionStage::Timeout { message } => {
            assert!(message.contains("1 seconds"), "got: {message}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // `completed` must never follow (or replace) the timeout record.
    assert!(!stage_tags(&events).contains(&"completed"));
}

// ---------------------------------------------------------------------------
// Test: stderr is captured and a non-zero exit still completes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stderr_and_nonzero_exit_are_reported() {
    let executor = CodeExecutor::default();
    let code = "import sys\nprint('oops', file=sys.stderr)\nsys.exit(3)\n";
    let rx = executor.execute(code, "python", "t-stderr");
    let events = collect(rx).await;

    assert_eq!(output_lines(&events, OutputStream::Stderr), vec!["oops"]);
    assert_eq!(
        events.last().unwrap().stage,
        ExecutionStage::Completed { return_code: 3 }
    );
}

// ---------------------------------------------------------------------------
// Test: stdout lines arrive in production order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stdout_lines_keep_production_order() {
    let executor = CodeExecutor::default();
    let code = "for i in range(3):\n    print(f'line-{i}')\n";
    let rx = executor.execute(code, "python", "t-order");
    let events = collect(rx).await;

    assert_eq!(
        output_lines(&events, OutputStream::Stdout),
        vec!["line-0", "line-1", "line-2"]
    );
}

// ---------------------------------------------------------------------------
// Test: invalid UTF-8 output becomes a placeholder record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn binary_output_becomes_placeholder() {
    let executor = CodeExecutor::default();
    let code = "import sys\nsys.stdout.buffer.write(bytes([255, 254, 10]))\n";
    let rx = executor.execute(code, "python", "t-binary");
    let events = collect(rx).await;

    assert_eq!(
        output_lines(&events, OutputStream::Stdout),
        vec!["[Binary output: 2 bytes]"]
    );
}

// ---------------------------------------------------------------------------
// Test: an empty execution id gets a generated fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_execution_id_gets_generated_fallback() {
    let executor = CodeExecutor::default();
    let rx = executor.execute("print(1)", "python", "");
    let events = collect(rx).await;

    assert!(!events.is_empty());
    let id = &events[0].execution_id;
    assert!(!id.is_empty());
    assert!(events.iter().all(|e| e.execution_id == *id));
}
