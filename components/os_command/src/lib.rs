//! External command execution behind a capability trait
//!
//! Everything that shells out (erase utilities, formatting tools, kexec)
//! depends on [`CommandRunner`] rather than on `tokio::process` directly,
//! so tests can substitute a scripted runner.

mod error;
pub mod password;
mod required;
mod runner;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use error::CommandError;
pub use required::{ensure_available, REQUIRED_COMMANDS};
pub use runner::{command_line, CommandOutput, CommandRunner, SystemRunner};
