//! Real process runner using `tokio::process::Command`.
//!
//! Children are spawned with `kill_on_drop`, so a timed-out or cancelled
//! command does not outlive the future that started it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::ToolError;
use crate::traits::{ProcessOptions, ProcessOutput, ProcessRunner};

/// Subprocess execution backed by `tokio::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run_command(
        &self,
        command: &str,
        opts: &ProcessOptions,
    ) -> Result<ProcessOutput, ToolError> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new("sh");
        let _ = cmd
            .arg("-c")
            .arg(command)
            .current_dir(&opts.working_directory)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &opts.env {
            let _ = cmd.env(key, value);
        }

        debug!(command, working_dir = %opts.working_directory.display(), "spawning process");

        let child = cmd.spawn().map_err(|e| ToolError::Spawn {
            message: e.to_string(),
        })?;

        let timeout = Duration::from_millis(opts.timeout_ms);
        let cancel = opts.cancellation.clone();

        let output = tokio::select! {
            result = child.wait_with_output() => result?,
            () = tokio::time::sleep(timeout) => {
                warn!(command, timeout_ms = opts.timeout_ms, "process timed out");
                return Ok(ProcessOutput {
                    stderr: "Process timed out".into(),
                    exit_code: -1,
                    duration_ms: elapsed_ms(start),
                    timed_out: true,
                    ..ProcessOutput::default()
                });
            }
            () = cancel.cancelled() => {
                debug!(command, "process cancelled");
                return Ok(ProcessOutput {
                    stderr: "Process cancelled".into(),
                    exit_code: -1,
                    duration_ms: elapsed_ms(start),
                    interrupted: true,
                    ..ProcessOutput::default()
                });
            }
        };

        let duration_ms = elapsed_ms(start);
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(command, exit_code, duration_ms, "process completed");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            duration_ms,
            timed_out: false,
            interrupted: false,
        })
    }
}
