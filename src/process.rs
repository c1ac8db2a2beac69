//! Child processes with a timeout and bounded captured output.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

#[derive(Debug)]
pub struct CommandOutput {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Some output was dropped by the capture limit.
    pub truncated: bool,
    pub duration_ms: u128,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// stdout then stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// How much of each output stream is kept.
#[derive(Debug, Clone, Copy)]
pub struct Capture {
    pub limit: usize,
    /// Lines for which this returns true are kept even past `limit`.
    pub keep_line: Option<fn(&str) -> bool>,
}

impl Capture {
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit,
            keep_line: None,
        }
    }

    pub fn keeping(limit: usize, keep_line: fn(&str) -> bool) -> Self {
        Self {
            limit,
            keep_line: Some(keep_line),
        }
    }
}

/// Runs `cmd`, feeding `stdin` if given. Stdin is written and both pipes are
/// drained on background threads, so neither a chatty child nor one that
/// never reads its input can hold off the timeout. A timed-out child is killed.
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    capture: Capture,
) -> io::Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    tracing::debug!(command = ?cmd, timeout_secs = timeout.as_secs(), "spawning");
    let started = Instant::now();
    let mut child = cmd.spawn()?;

    // Detached: the writer returns once the child closes or exits.
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_vec();
        thread::spawn(move || {
            // A child that exits without reading its input is not an error here.
            if let Err(e) = pipe.write_all(&input) {
                tracing::debug!(err = %e, "child closed stdin early");
            }
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = thread::spawn(move || drain(stdout, capture));
    let err_handle = thread::spawn(move || drain(stderr, Capture::bounded(capture.limit)));

    let (status, timed_out) = match child.wait_timeout(timeout)? {
        Some(status) => (Some(status), false),
        None => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            if let Err(e) = child.kill() {
                // Lost the race with a child that exited on its own.
                tracing::debug!(err = %e, "kill failed");
            }
            (child.wait().ok(), true)
        }
    };

    let (stdout, out_truncated) = out_handle.join().unwrap_or_default();
    let (stderr, err_truncated) = err_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
        truncated: out_truncated || err_truncated,
        duration_ms: started.elapsed().as_millis(),
    })
}

fn drain<R: Read>(stream: Option<R>, capture: Capture) -> (String, bool) {
    let Some(stream) = stream else {
        return (String::new(), false);
    };

    let mut reader = BufReader::new(stream);
    let mut kept = Vec::new();
    let mut line = Vec::new();
    let mut truncated = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let room = capture.limit.saturating_sub(kept.len());
        if line.len() <= room {
            kept.extend_from_slice(&line);
            continue;
        }

        let wanted = capture
            .keep_line
            .map(|keep| keep(&String::from_utf8_lossy(&line)))
            .unwrap_or(false);
        if wanted {
            kept.extend_from_slice(&line);
        } else {
            kept.extend_from_slice(&line[..room]);
            truncated = true;
        }
    }

    (String::from_utf8_lossy(&kept).into_owned(), truncated)
}
