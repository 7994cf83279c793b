use crate::error::CommandError;
use async_trait::async_trait;
use tokio::process::Command;

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Runs an external program to completion
///
/// A non-zero exit status is an error; callers never inspect exit codes
/// themselves.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Render a program and its arguments for logs and error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Runner backed by real child processes
///
/// There is no timeout: the call blocks until the tool exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let rendered = command_line(program, args);
        tracing::debug!(command = %rendered, "executing");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| CommandError::spawn(rendered.clone(), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::ExitCode {
                command: rendered,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn renders_command_line() {
        assert_eq!(command_line("dd", &[]), "dd");
        assert_eq!(
            command_line("mkfs.ext4", &["-F", "-E", "discard", "/dev/sda"]),
            "mkfs.ext4 -F -E discard /dev/sda"
        );
    }

    #[tokio::test]
    async fn captures_stdout() {
        let output = SystemRunner.execute("echo", &["hello"]).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let result = SystemRunner.execute("false", &[]).await;
        assert_matches!(result, Err(CommandError::ExitCode { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = SystemRunner
            .execute("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
