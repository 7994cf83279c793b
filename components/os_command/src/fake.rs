//! Scripted [`CommandRunner`] for tests
//!
//! Responses are matched by program name and, optionally, an argument the
//! invocation must contain. Later rules override earlier ones. Unmatched
//! invocations succeed with empty output.

use crate::error::CommandError;
use crate::runner::{command_line, CommandOutput, CommandRunner};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub enum Scripted {
    Succeed(String),
    Fail { code: i32, stderr: String },
    NotInstalled,
}

impl Scripted {
    pub fn stdout(s: impl Into<String>) -> Self {
        Scripted::Succeed(s.into())
    }

    pub fn fail(stderr: impl Into<String>) -> Self {
        Scripted::Fail {
            code: 1,
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        command_line(&self.program, &args)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

#[derive(Debug)]
struct Rule {
    program: String,
    with_arg: Option<String>,
    response: Scripted,
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every invocation of `program`
    pub fn on(self, program: &str, response: Scripted) -> Self {
        self.rules.lock().push(Rule {
            program: program.to_string(),
            with_arg: None,
            response,
        });
        self
    }

    /// Respond to invocations of `program` that include `arg`
    pub fn on_arg(self, program: &str, arg: &str, response: Scripted) -> Self {
        self.rules.lock().push(Rule {
            program: program.to_string(),
            with_arg: Some(arg.to_string()),
            response,
        });
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.program == program)
            .cloned()
            .collect()
    }

    fn response_for(&self, invocation: &Invocation) -> Option<Scripted> {
        self.rules
            .lock()
            .iter()
            .rev()
            .find(|rule| {
                rule.program == invocation.program
                    && rule
                        .with_arg
                        .as_deref()
                        .map(|arg| invocation.has_arg(arg))
                        .unwrap_or(true)
            })
            .map(|rule| rule.response.clone())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        let response = self.response_for(&invocation);
        let rendered = invocation.command_line();
        self.calls.lock().push(invocation);

        match response {
            None => Ok(CommandOutput::default()),
            Some(Scripted::Succeed(stdout)) => Ok(CommandOutput::stdout(stdout)),
            Some(Scripted::Fail { code, stderr }) => Err(CommandError::ExitCode {
                command: rendered,
                code: Some(code),
                stderr,
            }),
            Some(Scripted::NotInstalled) => Err(CommandError::spawn(
                rendered,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            )),
        }
    }
}
