//! External command execution with captured output and a wall-clock limit.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Wall-clock limits applied to every external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimits {
    /// Maximum run time for one step before it is killed.
    pub timeout: Duration,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
        }
    }
}

/// Result of a completed (not timed out) step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `-1` when terminated by a signal.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Why a step produced no [`StepOutput`]. The caller maps these onto its
/// own error taxonomy (fatal build failure vs. advisory test failure).
#[derive(Debug)]
pub enum StepError {
    /// The process could not be started at all.
    SpawnFailed(String),
    /// The wall-clock limit elapsed; the process was killed.
    TimedOut(Duration),
}

/// Runs `argv` in `cwd`, draining both pipes, killing at the deadline.
pub fn run_step(argv: &[String], cwd: &Path, limits: &StepLimits) -> Result<StepOutput, StepError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| StepError::SpawnFailed("empty argv".to_string()))?;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| StepError::SpawnFailed(format!("{program}: {err}")))?;
    // Drain on threads so a chatty process cannot fill a pipe and stall.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let status = wait_with_deadline(&mut child, limits.timeout)?;
    Ok(StepOutput {
        success: status.map_or(false, |code| code == 0),
        code: status.unwrap_or(-1),
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<i32>, StepError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code()),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(StepError::TimedOut(timeout));
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => return Err(StepError::SpawnFailed(err.to_string())),
        }
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    reader.map(|mut reader| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = reader.read_to_end(&mut bytes);
            bytes
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
