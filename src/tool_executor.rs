//! Sandboxed one-shot command execution: allow-listed subprocess
//! invocation with deny-listed environment keys and optional container
//! sandboxing.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Environment variable keys a caller may never override.
const ENV_DENYLIST: &[&str] = &["PATH", "LD_PRELOAD", "LD_LIBRARY_PATH"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sandbox {
    None,
    Docker,
    Podman,
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub timeout: Duration,
    pub cd: Option<String>,
    pub env: HashMap<String, String>,
    pub sandbox: Sandbox,
    pub bypass_allowlist: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            cd: None,
            env: HashMap::new(),
            sandbox: Sandbox::None,
            bypass_allowlist: false,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cd(mut self, cd: impl Into<String>) -> Self {
        self.cd = Some(cd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn bypass_allowlist(mut self) -> Self {
        self.bypass_allowlist = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecode {
    Success,
    Timeout,
    CommandNotFound,
    CommandNotExecutable,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn decode(&self) -> ExitDecode {
        match self.exit_code {
            0 => ExitDecode::Success,
            -1 => ExitDecode::Timeout,
            127 => ExitDecode::CommandNotFound,
            126 => ExitDecode::CommandNotExecutable,
            _ => ExitDecode::Failure,
        }
    }
}

/// Sandboxed, allow-listed command executor.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    allowlist: Vec<String>,
}

impl ToolExecutor {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    fn check_availability(sandbox: Sandbox) -> Result<()> {
        let binary = match sandbox {
            Sandbox::None => return Ok(()),
            Sandbox::Docker => "docker",
            Sandbox::Podman => "podman",
        };
        if which_available(binary) {
            Ok(())
        } else {
            Err(Error::sandbox_unavailable(binary))
        }
    }

    pub async fn run_command(
        &self,
        cmd: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> Result<ExecResult> {
        if !opts.bypass_allowlist && !self.allowlist.iter().any(|a| a == cmd) {
            return Err(Error::CommandNotAllowed(cmd.to_string()));
        }

        for key in opts.env.keys() {
            if ENV_DENYLIST.contains(&key.as_str()) {
                return Err(Error::ForbiddenEnvironmentKey(key.clone()));
            }
        }

        if let Some(dir) = &opts.cd {
            if !std::path::Path::new(dir).is_dir() {
                return Err(Error::DirectoryNotFound(dir.clone()));
            }
        }

        Self::check_availability(opts.sandbox)?;

        let (program, full_args) = match opts.sandbox {
            Sandbox::None => (cmd.to_string(), args.to_vec()),
            Sandbox::Docker | Sandbox::Podman => {
                let binary = if opts.sandbox == Sandbox::Docker { "docker" } else { "podman" };
                let mut sandboxed = vec!["run".to_string(), "--rm".to_string(), "alpine".to_string(), cmd.to_string()];
                sandboxed.extend(args.iter().cloned());
                (binary.to_string(), sandboxed)
            }
        };

        let mut command = Command::new(&program);
        command
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &opts.cd {
            command.current_dir(dir);
        }
        for (k, v) in &opts.env {
            command.env(k, v);
        }

        let start = std::time::Instant::now();
        let child_future = command.output();

        match timeout(opts.timeout, child_future).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                    duration_ms: start.elapsed().as_millis() as u64,
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(Error::Internal(format!("failed to spawn command: {e}"))),
            Err(_) => Ok(ExecResult {
                stdout: String::new(),
                stderr: "command timed out".to_string(),
                exit_code: -1,
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: true,
            }),
        }
    }
}

fn which_available(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                dir.join(binary).is_file() || dir.join(format!("{binary}.exe")).is_file()
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_commands_not_on_allowlist() {
        let executor = ToolExecutor::new(vec!["echo".to_string()]);
        let result = executor.run_command("rm", &[], &ExecOptions::default()).await;
        assert!(matches!(result, Err(Error::CommandNotAllowed(_))));
    }

    #[tokio::test]
    async fn bypass_allowlist_permits_any_command() {
        let executor = ToolExecutor::new(vec![]);
        let opts = ExecOptions::default().bypass_allowlist();
        let result = executor
            .run_command("echo", &["hi".to_string()], &opts)
            .await
            .unwrap();
        assert_eq!(result.decode(), ExitDecode::Success);
        assert!(result.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn rejects_forbidden_environment_keys() {
        let executor = ToolExecutor::new(vec!["echo".to_string()]);
        let opts = ExecOptions::default().with_env("PATH", "/bogus");
        let result = executor.run_command("echo", &[], &opts).await;
        assert!(matches!(result, Err(Error::ForbiddenEnvironmentKey(_))));
    }

    #[tokio::test]
    async fn rejects_missing_working_directory() {
        let executor = ToolExecutor::new(vec!["echo".to_string()]);
        let opts = ExecOptions::default().with_cd("/no/such/dir/ever");
        let result = executor.run_command("echo", &[], &opts).await;
        assert!(matches!(result, Err(Error::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn timeout_produces_timed_out_result() {
        let executor = ToolExecutor::new(vec!["sleep".to_string()]);
        let opts = ExecOptions::default().with_timeout(Duration::from_millis(20));
        let result = executor
            .run_command("sleep", &["2".to_string()], &opts)
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn unavailable_sandbox_runtime_errors() {
        let executor = ToolExecutor::new(vec!["echo".to_string()]);
        let opts = ExecOptions::default()
            .bypass_allowlist()
            .with_sandbox(Sandbox::Docker);
        if which_available("docker") {
            // Environment actually has docker; skip this assertion path.
            return;
        }
        let result = executor.run_command("echo", &[], &opts).await;
        assert!(matches!(result, Err(Error::SandboxUnavailable { .. })));
    }
}
