//! Command supervisor: runs the user's rebuild command, serializing
//! re-invocations triggered by bursts of change events.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Result of one command execution.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,

    /// Signal the process was terminated by, if any.
    pub signal: Option<i32>,

    /// Combined stdout/stderr in real arrival order.
    pub output: String,
}

impl RunOutcome {
    /// Outcome for a run with no configured command: nothing to
    /// validate, treated as an unconditional success.
    pub fn clean() -> Self {
        Self {
            code: None,
            signal: None,
            output: String::new(),
        }
    }

    /// Whether the run validates a reload.
    pub fn success(&self) -> bool {
        self.signal.is_none() && self.code.unwrap_or(0) == 0
    }
}

/// Supervisor state while a child process is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    RunningWithPendingRerun,
}

/// Runs the configured command once per trigger, coalescing triggers
/// that arrive mid-run into exactly one follow-up run.
///
/// Owned by a single spawned task; triggers arrive on a channel and
/// completed outcomes are reported on another, consumed by the reload
/// coordinator.
pub struct Supervisor {
    command: Option<String>,
    triggers: mpsc::UnboundedReceiver<()>,
    completions: mpsc::UnboundedSender<RunOutcome>,
}

impl Supervisor {
    pub fn new(
        command: Option<String>,
        triggers: mpsc::UnboundedReceiver<()>,
        completions: mpsc::UnboundedSender<RunOutcome>,
    ) -> Self {
        Self {
            command,
            triggers,
            completions,
        }
    }

    /// Drive the supervisor until the trigger channel closes.
    pub async fn run(mut self) {
        while let Some(()) = self.triggers.recv().await {
            let Some(command) = self.command.clone() else {
                // No command configured: report an unconditional success.
                if self.completions.send(RunOutcome::clean()).is_err() {
                    return;
                }
                continue;
            };

            // One trigger starts a cycle; the cycle repeats while triggers
            // keep killing the in-flight run.
            loop {
                let (outcome, rerun) = self.run_once(&command).await;

                if rerun {
                    continue;
                }

                match outcome {
                    Some(outcome) => {
                        if self.completions.send(outcome).is_err() {
                            return;
                        }
                    }
                    // Spawn failure: warn and go back to idle.
                    None => {}
                }
                break;
            }
        }
    }

    /// Run the command once. Returns the outcome (None if the process
    /// could not be spawned) and whether a rerun was requested mid-run.
    async fn run_once(&mut self, command: &str) -> (Option<RunOutcome>, bool) {
        tracing::info!("> {command}");

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "Running command failed");
                return (None, false);
            }
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut output = String::new();
        let mut buf_out = [0u8; 4096];
        let mut buf_err = [0u8; 4096];
        let mut state = RunState::Running;

        let status = loop {
            tokio::select! {
                trigger = self.triggers.recv() => match trigger {
                    Some(()) => {
                        if state == RunState::Running {
                            state = RunState::RunningWithPendingRerun;
                            tracing::info!("Killing child process because something changed");
                            if let Err(e) = child.start_kill() {
                                tracing::warn!(error = %e, "Failed to kill child process");
                            }
                        }
                        // Further triggers coalesce into the pending rerun.
                    }
                    None => {
                        // Shutting down; let the child finish.
                        match child.wait().await {
                            Ok(status) => break status,
                            Err(e) => {
                                tracing::warn!(error = %e, "Waiting for child failed");
                                return (None, false);
                            }
                        }
                    }
                },
                chunk = read_some(&mut stdout, &mut buf_out) => {
                    if let Some(chunk) = chunk {
                        eprint!("{chunk}");
                        output.push_str(&chunk);
                    }
                },
                chunk = read_some(&mut stderr, &mut buf_err) => {
                    if let Some(chunk) = chunk {
                        eprint!("{chunk}");
                        output.push_str(&chunk);
                    }
                },
                status = child.wait() => match status {
                    Ok(status) => break status,
                    Err(e) => {
                        tracing::warn!(error = %e, "Waiting for child failed");
                        return (None, false);
                    }
                },
            }
        };

        // Drain whatever the pipes still hold after exit.
        drain(&mut stdout, &mut output).await;
        drain(&mut stderr, &mut output).await;

        let code = status.code();
        let signal = exit_signal(&status);

        if let Some(sig) = signal {
            tracing::info!(signal = sig, "Command exited due to signal");
        } else if let Some(code) = code {
            if code != 0 {
                tracing::info!(code, "Command exited with nonzero exit code");
            }
        }

        let rerun = state == RunState::RunningWithPendingRerun;
        (
            Some(RunOutcome {
                code,
                signal,
                output,
            }),
            rerun,
        )
    }
}

/// Read one chunk from an optional pipe, disabling it at EOF or error.
/// Pends forever once disabled so it never wins the select.
async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader {
        Some(r) => match r.read(buf).await {
            Ok(0) | Err(_) => {
                *reader = None;
                None
            }
            Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
        },
        None => std::future::pending().await,
    }
}

async fn drain<R>(reader: &mut Option<R>, output: &mut String)
where
    R: tokio::io::AsyncRead + Unpin,
{
    if let Some(r) = reader.take() {
        let mut rest = Vec::new();
        let mut r = r;
        if r.read_to_end(&mut rest).await.is_ok() && !rest.is_empty() {
            let text = String::from_utf8_lossy(&rest);
            eprint!("{text}");
            output.push_str(&text);
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_outcome_is_success() {
        assert!(RunOutcome::clean().success());
    }

    #[test]
    fn test_zero_exit_is_success() {
        let outcome = RunOutcome {
            code: Some(0),
            signal: None,
            output: String::new(),
        };
        assert!(outcome.success());
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let outcome = RunOutcome {
            code: Some(2),
            signal: None,
            output: String::new(),
        };
        assert!(!outcome.success());
    }

    #[test]
    fn test_signal_death_is_failure() {
        let outcome = RunOutcome {
            code: None,
            signal: Some(15),
            output: String::new(),
        };
        assert!(!outcome.success());
    }
}
