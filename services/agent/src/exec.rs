//! Local command/script execution.
//!
//! Mirrors the source's `__execute_command`: shell-lex the command line,
//! resolve the executable on `PATH`, run it with output capture and a
//! deadline, killing on timeout. `kill_on_drop` on the child lets the
//! timeout simply drop the future to terminate the process rather than
//! juggling a separate kill signal.

use std::process::Stdio;
use std::time::Duration;

use botfleet_protocol::{ExitCode, ScriptType};

pub async fn execute_command(command: &str, timeout_secs: u64) -> (String, ExitCode) {
    let argv = match shlex::split(command) {
        Some(argv) if !argv.is_empty() => argv,
        _ => return (format!("{command} is unknown"), ExitCode::none()),
    };
    let program = &argv[0];
    if which::which(program).is_err() {
        return (format!("{program} is unknown"), ExitCode::none());
    }
    run(program, &argv[1..], timeout_secs).await
}

pub async fn execute_script(
    script_type: ScriptType,
    source: &str,
    timeout_secs: u64,
) -> (String, ExitCode) {
    let (interpreter, flag) = match script_type {
        ScriptType::Sh => ("sh", "-c"),
        ScriptType::Powershell => ("powershell", "-Command"),
        ScriptType::Python => ("python3", "-c"),
    };
    run(interpreter, &[flag.to_owned(), source.to_owned()], timeout_secs).await
}

async fn run(program: &str, args: &[String], timeout_secs: u64) -> (String, ExitCode) {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return (format!("{program} failed to start: {e}"), ExitCode::none()),
    };

    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = format_output(&output.stdout, &output.stderr, program);
            let code = output.status.code().map(ExitCode::code).unwrap_or_else(ExitCode::none);
            (result, code)
        }
        Ok(Err(e)) => (format!("{program} execution failed: {e}"), ExitCode::none()),
        Err(_) => (
            format!("{program} timed out after {timeout_secs}s and was killed"),
            ExitCode::none(),
        ),
    }
}

fn format_output(stdout: &[u8], stderr: &[u8], program: &str) -> String {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    match (out.trim().is_empty(), err.trim().is_empty()) {
        (false, false) => format!("Output: {out}, Error: {err}"),
        (false, true) => out.into_owned(),
        (true, false) => err.into_owned(),
        (true, true) => format!("Empty response from {program}"),
    }
}
