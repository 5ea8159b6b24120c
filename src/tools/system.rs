//! Process runner backed by `tokio::process`

use super::traits::{CommandRunner, Invocation, ProcessOutcome};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs tools as real child processes
///
/// Output is captured in full. The child is spawned with `kill_on_drop`, so
/// abandoning the wait on timeout also kills the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> crate::Result<ProcessOutcome> {
        let name = invocation.program_name();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        debug!(program = %name, args = invocation.args.len(), ?timeout, "spawning");
        let child = command
            .spawn()
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute {}: {}", name, e)))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutcome::Exited {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(crate::Error::ExternalTool(format!(
                "Failed to collect output of {}: {}",
                name, e
            ))),
            Err(_) => {
                warn!(program = %name, ?timeout, "process exceeded its time limit and was killed");
                Ok(ProcessOutcome::TimedOut { after: timeout })
            }
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
