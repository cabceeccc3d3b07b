//! Shared subprocess handling for command-line backends.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use super::BackendError;
use crate::cancel::AbortSignal;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Captured output of a finished child process.
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion, killing it if `abort` fires first.
///
/// A non-zero exit becomes `BackendError::Failed` carrying stderr. A missing
/// executable becomes `BackendError::NotAvailable` with `install_hint`.
pub fn run_abortable(
    mut command: Command,
    abort: &AbortSignal,
    install_hint: &str,
) -> Result<ProcessOutput, BackendError> {
    if abort.is_aborted() {
        return Err(BackendError::Aborted);
    }

    let program = command.get_program().to_string_lossy().to_string();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotAvailable(install_hint.to_string()),
            _ => BackendError::Io(e),
        })?;

    // Drain pipes on threads so a chatty child never blocks on a full buffer.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if abort.is_aborted() {
            kill(&mut child, &program);
            let _ = stdout.join();
            let _ = stderr.join();
            return Err(BackendError::Aborted);
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        let detail = stderr.trim();
        let detail = if detail.is_empty() { stdout.trim() } else { detail };
        return Err(BackendError::Failed(format!(
            "{} exited with {}: {}",
            program,
            status,
            truncate(detail, 500)
        )));
    }

    Ok(ProcessOutput { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn kill(child: &mut Child, program: &str) {
    tracing::debug!("Aborting {} (pid {})", program, child.id());
    if let Err(e) = child.kill() {
        tracing::debug!("Failed to kill {}: {}", program, e);
    }
    let _ = child.wait();
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
