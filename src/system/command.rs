use crate::{PureRootError, Result};
use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Exit status and captured output of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the privileged core and the processes it spawns.
///
/// `run_elevated` executes arbitrary shell text as the superuser. Callers
/// build the command line and must quote any identifier they splice into it
/// (see [`crate::system::quote_shell_arg`]); nothing is escaped here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command_line` inside an elevated shell, then `exit`.
    async fn run_elevated(&self, command_line: &str) -> Result<CommandOutcome>;

    /// Runs `program` directly, without a shell and without elevation.
    async fn run_direct(&self, program: &str, args: Vec<String>) -> Result<CommandOutcome>;
}

pub struct SuCommandRunner {
    su_binary: String,
    timeout_duration: Duration,
}

impl SuCommandRunner {
    pub fn new(su_binary: impl Into<String>) -> Self {
        Self {
            su_binary: su_binary.into(),
            timeout_duration: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout_duration: Duration) -> Self {
        self.timeout_duration = timeout_duration;
        self
    }

    async fn feed(child: &mut AsyncGroupChild, command_line: &str) -> std::io::Result<()> {
        let mut stdin = child
            .inner()
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::new(ErrorKind::BrokenPipe, "stdin was not captured"))?;

        stdin.write_all(command_line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.write_all(b"exit\n").await?;
        stdin.flush().await?;
        // Dropping stdin closes it.
        Ok(())
    }

    async fn collect(&self, mut child: AsyncGroupChild) -> Result<CommandOutcome> {
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();

        let running = &mut child;
        let waited = timeout(self.timeout_duration, async move {
            tokio::join!(running.wait(), drain(stdout), drain(stderr))
        })
        .await;

        let (status, stdout, stderr) = match waited {
            Ok(parts) => parts,
            Err(_) => {
                warn!("Command exceeded {:?}, killing process group", self.timeout_duration);
                child.kill().await.ok();
                return Err(PureRootError::Timeout(self.timeout_duration));
            }
        };

        let status = status.map_err(|e| PureRootError::Execution(format!("wait failed: {}", e)))?;
        let stdout = stdout.map_err(|e| PureRootError::Execution(format!("reading stdout: {}", e)))?;
        let stderr = stderr.map_err(|e| PureRootError::Execution(format!("reading stderr: {}", e)))?;

        Ok(CommandOutcome {
            exit_code: exit_code_of(status),
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl CommandRunner for SuCommandRunner {
    async fn run_elevated(&self, command_line: &str) -> Result<CommandOutcome> {
        info!("Executing elevated command: {}", command_line);

        let mut command = Command::new(&self.su_binary);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .group_spawn()
            .map_err(|e| PureRootError::Spawn(format!("{}: {}", self.su_binary, e)))?;

        if let Err(e) = Self::feed(&mut child, command_line).await {
            if e.kind() == ErrorKind::BrokenPipe {
                // The shell went away before reading everything; its status still counts.
                warn!("Elevated shell closed stdin early: {}", e);
            } else {
                child.kill().await.ok();
                return Err(PureRootError::Execution(format!(
                    "writing to {} failed: {}",
                    self.su_binary, e
                )));
            }
        }

        let outcome = self.collect(child).await?;
        debug!(
            exit_code = outcome.exit_code,
            stdout_len = outcome.stdout.len(),
            stderr_len = outcome.stderr.len(),
            "Elevated command finished"
        );
        Ok(outcome)
    }

    async fn run_direct(&self, program: &str, args: Vec<String>) -> Result<CommandOutcome> {
        debug!("Executing command: {} {:?}", program, args);

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .group_spawn()
            .map_err(|e| PureRootError::Spawn(format!("{}: {}", program, e)))?;

        self.collect(child).await
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Signal deaths map to `128 + signal`, as a shell reports them.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
