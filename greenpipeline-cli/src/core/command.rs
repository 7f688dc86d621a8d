use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    future::{Future, pending},
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    time::Duration,
};

use itertools::Itertools;
use nix::{
    errno::Errno,
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use serde::{Deserialize, Serialize};
use tokio::{
    process::{Child, Command},
    time::{sleep, timeout},
};

use crate::prelude::*;

/// How long the command may take to exit after `SIGTERM`.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Shell command whose footprint is measured.
#[derive(Clone, Debug)]
pub struct WrappedCommand {
    pub command: String,
    pub timeout: Option<Duration>,
}

impl WrappedCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), timeout: None }
    }

    /// Build the shell line from the command-line arguments.
    ///
    /// A single argument is taken as a complete shell line. Several arguments are an argv, so each
    /// one is quoted to reach the command unchanged.
    #[must_use]
    pub fn from_args(args: &[String]) -> Self {
        match args {
            [line] => Self::new(line.clone()),
            _ => Self::new(args.iter().map(|arg| quote(arg)).join(" ")),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command through `sh -c` with the inherited standard streams.
    ///
    /// Fails only when the command could not be spawned or awaited. The command runs in its own
    /// process group, which is terminated when the timeout elapses or `cancellation` resolves.
    #[instrument(skip_all, fields(command = %self.command))]
    pub async fn run(&self, cancellation: impl Future<Output = ()>) -> Result<CommandOutcome> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.command))?;
        info!(pid = ?child.id(), "running…");

        let timeout = async {
            match self.timeout {
                Some(timeout) => sleep(timeout).await,
                None => pending().await,
            }
        };
        let interruption = tokio::select! {
            status = child.wait() => {
                let status = status.context("failed to wait for the command")?;
                let outcome = CommandOutcome::from(status);
                info!(%outcome, "finished");
                return Ok(outcome);
            }
            () = timeout => CommandOutcome::TimedOut,
            () = cancellation => CommandOutcome::Cancelled,
        };

        warn!(outcome = %interruption, "terminating the command…");
        terminate_process_group(&mut child).await?;
        Ok(interruption)
    }
}

/// Send `SIGTERM` to the whole group, then `SIGKILL` to whatever is left after the grace period.
async fn terminate_process_group(child: &mut Child) -> Result {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let group = Pid::from_raw(i32::try_from(pid)?);
    signal_group(group, Signal::SIGTERM);
    if timeout(GRACE_PERIOD, child.wait()).await.is_err() {
        warn!(pid, "the command ignored `SIGTERM`");
    }
    signal_group(group, Signal::SIGKILL);
    child.wait().await.context("failed to wait for the killed command")?;
    Ok(())
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(error) => warn!(%group, ?signal, %error, "failed to signal the process group"),
    }
}

/// Single-quote the argument unless it consists of characters the shell leaves alone.
fn quote(arg: &str) -> Cow<'_, str> {
    let is_plain = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if is_plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

impl Display for WrappedCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Exited { code: i32 },
    Signalled { signal: i32 },
    TimedOut,
    Cancelled,
    FailedToStart,
}

impl CommandOutcome {
    /// Process exit code that mirrors the wrapped command, the way shells report it.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Exited { code } => (code & 0xFF) as u8,
            Self::Signalled { signal } => 128_u8.wrapping_add((signal & 0x7F) as u8),
            Self::TimedOut => 124,
            Self::Cancelled => 130,
            Self::FailedToStart => 127,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// The command was stopped before it could finish on its own.
    #[must_use]
    pub const fn is_interrupted(self) -> bool {
        matches!(self, Self::TimedOut | Self::Cancelled)
    }
}

impl From<ExitStatus> for CommandOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited { code },
            (None, Some(signal)) => Self::Signalled { signal },
            (None, None) => Self::Exited { code: -1 },
        }
    }
}

impl Display for CommandOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited { code: 0 } => write!(f, "succeeded"),
            Self::Exited { code } => write!(f, "failed with exit code {code}"),
            Self::Signalled { signal } => write!(f, "killed by signal {signal}"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::FailedToStart => write!(f, "failed to start"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_exit_code() -> Result {
        let outcome = WrappedCommand::new("exit 3").run(pending()).await?;
        assert_eq!(outcome, CommandOutcome::Exited { code: 3 });
        assert_eq!(outcome.exit_code(), 3);
        assert!(!outcome.is_success());
        Ok(())
    }

    #[tokio::test]
    async fn test_success() -> Result {
        let outcome = WrappedCommand::new("true && echo ok > /dev/null").run(pending()).await?;
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout() -> Result {
        let start_time = Instant::now();
        let outcome = WrappedCommand::new("sleep 10")
            .with_timeout(Some(Duration::from_millis(50)))
            .run(pending())
            .await?;
        assert_eq!(outcome, CommandOutcome::TimedOut);
        assert_eq!(outcome.exit_code(), 124);
        assert!(start_time.elapsed() < Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation() -> Result {
        let outcome =
            WrappedCommand::new("sleep 10").run(sleep(Duration::from_millis(50))).await?;
        assert_eq!(outcome, CommandOutcome::Cancelled);
        assert!(outcome.is_interrupted());
        assert_eq!(outcome.exit_code(), 130);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_kills_descendants() -> Result {
        let directory = tempfile::tempdir()?;
        let marker = directory.path().join("marker");
        let line = format!("(sleep 1; touch {}); true", marker.display());
        let outcome = WrappedCommand::new(line)
            .with_timeout(Some(Duration::from_millis(100)))
            .run(pending())
            .await?;
        assert_eq!(outcome, CommandOutcome::TimedOut);
        sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "the background subshell survived");
        Ok(())
    }

    #[test]
    fn test_from_args_quotes_arguments() {
        let args = ["printf", "%s|", "a b", "it's", ""].map(String::from);
        assert_eq!(WrappedCommand::from_args(&args).command, r"printf '%s|' 'a b' 'it'\''s' ''");
        let args = ["npm", "test", "--prefix=./web"].map(String::from);
        assert_eq!(WrappedCommand::from_args(&args).command, "npm test --prefix=./web");
        let args = ["cargo test && echo done".to_string()];
        assert_eq!(WrappedCommand::from_args(&args).command, "cargo test && echo done");
    }

    #[tokio::test]
    async fn test_from_args_preserves_spaces() -> Result {
        let args = ["test", "a b", "=", "a b"].map(String::from);
        let outcome = WrappedCommand::from_args(&args).run(pending()).await?;
        assert!(outcome.is_success(), "{outcome}");
        Ok(())
    }

    #[test]
    fn test_signal_exit_code() {
        assert_eq!(CommandOutcome::Signalled { signal: 9 }.exit_code(), 137);
        assert_eq!(CommandOutcome::Exited { code: 256 }.exit_code(), 0);
    }
}
