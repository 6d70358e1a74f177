// Thin async wrapper around the adb executable

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::AdbConfig;
use crate::error::{Error, Result};

/// Captured result of one adb invocation
#[derive(Debug, Clone, Default)]
pub struct AdbOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl AdbOutput {
    /// stdout followed by stderr; adb prints diagnostics on either stream
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs adb subcommands with a bounded wait.
#[derive(Debug, Clone)]
pub struct Adb {
    path: String,
    timeout: Duration,
}

impl Adb {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &AdbConfig) -> Self {
        Self::new(config.path.clone(), config.command_timeout())
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Base command, targeted at `serial` when given. Used directly for
    /// long-running children such as the capture server.
    #[must_use]
    pub fn command(&self, serial: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.path);
        if let Some(serial) = serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    pub async fn run<I, S>(&self, serial: Option<&str>, args: I) -> Result<AdbOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_with_timeout(serial, args, self.timeout).await
    }

    pub async fn run_with_timeout<I, S>(
        &self,
        serial: Option<&str>,
        args: I,
        timeout: Duration,
    ) -> Result<AdbOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(serial, args, timeout).await?;
        Ok(AdbOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run with stdout kept as raw bytes, for binary output such as
    /// `exec-out screencap -p`.
    pub async fn run_binary<I, S>(&self, serial: Option<&str>, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.output(serial, args, self.timeout).await
    }

    async fn output<I, S>(&self, serial: Option<&str>, args: I, timeout: Duration) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(serial);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(command = ?cmd.as_std(), "Running adb");

        tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| Error::Adb(format!("adb timed out after {}s", timeout.as_secs())))?
            .map_err(|e| Error::Adb(format!("Failed to run {}: {e}", self.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_adb_error() {
        let adb = Adb::new("/nonexistent/adb-binary", Duration::from_secs(1));
        let err = adb.run(None, ["devices"]).await.unwrap_err();
        assert_eq!(err.code(), "adb_unavailable");
    }

    #[test]
    fn test_combined_output() {
        let out = AdbOutput {
            success: false,
            stdout: "a\n".to_string(),
            stderr: "b".to_string(),
        };
        assert_eq!(out.combined(), "a\nb");
    }
}
