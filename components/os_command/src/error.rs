use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command execution failed: {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command returned non-zero exit code {code:?}: {command}\nStderr: {stderr}")]
    ExitCode {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unable to locate {} in PATH", .0.join(", "))]
    Missing(Vec<String>),
}

impl CommandError {
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        CommandError::Spawn {
            command: command.into(),
            source,
        }
    }

    /// True when the program itself could not be started (not installed, not executable)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CommandError::Spawn { .. } | CommandError::Missing(_))
    }
}
