//! Remote driver that runs the agent over ssh.
//!
//! The query is shell-quoted into a single remote command line; the context
//! travels over ssh's stdin.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::config::{DriverOptions, DriverSettings};
use super::driver::Driver;
use super::process::{invoke, InvokeRequest};
use super::result::InvocationResult;
use crate::error::DriverError;

/// Local ssh client executable.
pub const SSH_BINARY: &str = "ssh";

/// Default command run on the remote host.
pub const DEFAULT_REMOTE_COMMAND: &str = "rlm";

/// Default ssh `ConnectTimeout`, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Driver that invokes the agent on a remote host.
#[derive(Debug, Clone)]
pub struct SshDriver {
    host: String,
    model: Option<String>,
    remote_command: String,
    connect_timeout_secs: u64,
    ssh_path: PathBuf,
}

impl SshDriver {
    /// Registry name.
    pub const NAME: &'static str = "ssh";

    /// Builds the driver; a host is mandatory.
    pub fn from_settings(settings: &DriverSettings) -> Result<Self, DriverError> {
        let host = settings
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| DriverError::Misconfigured {
                driver: Self::NAME.to_string(),
                reason: "a remote host is required (--host or RLM_EVAL_HOST)".to_string(),
            })?;

        Ok(Self {
            host,
            model: settings.model.clone(),
            remote_command: settings
                .remote_command
                .clone()
                .unwrap_or_else(|| DEFAULT_REMOTE_COMMAND.to_string()),
            connect_timeout_secs: settings
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ssh_path: PathBuf::from(SSH_BINARY),
        })
    }

    /// Overrides the local ssh executable.
    pub fn with_ssh_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_path = path.into();
        self
    }

    /// Remote host this driver targets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Trace locator for calls made by this driver.
    pub fn trace(&self) -> String {
        format!("ssh://{}", self.host)
    }

    fn build_request(
        &self,
        query: &str,
        context: Option<&str>,
        options: &DriverOptions,
    ) -> InvokeRequest {
        let remote = build_remote_command(
            &self.remote_command,
            query,
            options,
            self.model.as_deref(),
        );

        InvokeRequest::new(&self.ssh_path)
            .args([
                self.host.clone(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                format!("ConnectTimeout={}", self.connect_timeout_secs),
                remote,
            ])
            .with_stdin(context.map(str::to_string))
            .with_timeout(options.timeout)
    }
}

#[async_trait]
impl Driver for SshDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(
        &self,
        query: &str,
        context: Option<&str>,
        options: &DriverOptions,
    ) -> Result<InvocationResult, DriverError> {
        let request = self.build_request(query, context, options);
        let output = invoke(&request).await;

        debug!(
            host = %self.host,
            exit_code = output.exit_code,
            timed_out = output.timed_out,
            "Remote call finished"
        );

        Ok(InvocationResult::new(
            output.stdout.trim(),
            output.exit_code,
            output.wall_time_ms,
            self.trace(),
        ))
    }
}

/// Wraps `value` in single quotes for a POSIX shell.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Remote command line: limits as env assignments, then the quoted query.
pub fn build_remote_command(
    command: &str,
    query: &str,
    options: &DriverOptions,
    model: Option<&str>,
) -> String {
    let mut parts = vec![
        format!("RLM_MAX_ITERATIONS={}", options.max_iterations),
        format!("RLM_MAX_DEPTH={}", options.max_depth),
    ];
    if let Some(model) = model {
        parts.push(format!("RLM_MODEL={}", shell_escape(model)));
    }
    parts.push(command.to_string());
    parts.push(shell_escape(query));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("plain"), "'plain'");
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
        assert_eq!(shell_escape("$HOME; rm -rf /"), "'$HOME; rm -rf /'");
    }

    #[test]
    fn test_build_remote_command() {
        let options = DriverOptions::new().with_max_iterations(15).with_max_depth(2);
        let cmd = build_remote_command("rlm", "What's the code?", &options, Some("gpt-5"));
        assert_eq!(
            cmd,
            r"RLM_MAX_ITERATIONS=15 RLM_MAX_DEPTH=2 RLM_MODEL='gpt-5' rlm 'What'\''s the code?'"
        );
    }

    #[test]
    fn test_build_remote_command_without_model() {
        let options = DriverOptions::new().with_max_iterations(4).with_max_depth(1);
        let cmd = build_remote_command("rlm", "q", &options, None);
        assert_eq!(cmd, "RLM_MAX_ITERATIONS=4 RLM_MAX_DEPTH=1 rlm 'q'");
    }

    #[test]
    fn test_from_settings_requires_host() {
        assert!(SshDriver::from_settings(&DriverSettings::new()).is_err());
        assert!(SshDriver::from_settings(&DriverSettings::new().with_host("  ")).is_err());
    }

    #[test]
    fn test_build_request_args() {
        let driver = SshDriver::from_settings(
            &DriverSettings::new()
                .with_host("eval@box")
                .with_connect_timeout_secs(5),
        )
        .unwrap();

        let request = driver.build_request("q", Some("ctx"), &DriverOptions::default());

        assert_eq!(request.program, PathBuf::from("ssh"));
        assert_eq!(
            request.args,
            vec![
                "eval@box",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=5",
                "RLM_MAX_ITERATIONS=15 RLM_MAX_DEPTH=2 rlm 'q'",
            ]
        );
        assert_eq!(request.stdin.as_deref(), Some("ctx"));
        assert_eq!(driver.trace(), "ssh://eval@box");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_call_through_fake_ssh() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake_ssh = dir.path().join("ssh");
        // Echo the host and the remote command back, as a real ssh would run it.
        fs::write(&fake_ssh, "#!/bin/sh\ncat > /dev/null\necho \"$1 :: $6\"\n").unwrap();
        fs::set_permissions(&fake_ssh, fs::Permissions::from_mode(0o755)).unwrap();

        let driver = SshDriver::from_settings(&DriverSettings::new().with_host("box"))
            .unwrap()
            .with_ssh_path(&fake_ssh);

        let result = driver
            .call("q", Some("context"), &DriverOptions::default())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(
            result.answer,
            "box :: RLM_MAX_ITERATIONS=15 RLM_MAX_DEPTH=2 rlm 'q'"
        );
        assert_eq!(result.trace, "ssh://box");
        assert_eq!(result.iterations, None);
    }
}
