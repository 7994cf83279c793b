use os_command::CommandError;
use std::fmt;
use std::path::PathBuf;
use storage_primitives::DevicePath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WipeError {
    #[error("unable to gather disks from {path}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to {step} on {device}")]
    SecureErase {
        device: DevicePath,
        step: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("unable to secure erase nvme disk {device}")]
    NvmeFormat {
        device: DevicePath,
        #[source]
        source: CommandError,
    },

    #[error("overwrite of {device} failed after discard failed ({discard})")]
    Overwrite {
        device: DevicePath,
        discard: String,
        #[source]
        source: CommandError,
    },

    #[error("{} of the disks could not be wiped: {}", .failed.len(), DisplayFailures(.failed))]
    Incomplete { failed: Vec<DiskFailure> },
}

impl WipeError {
    pub fn discovery(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WipeError::Discovery {
            path: path.into(),
            source,
        }
    }
}

/// A disk the sweep could not wipe, with the reason
#[derive(Debug)]
pub struct DiskFailure {
    pub device: DevicePath,
    pub error: Box<WipeError>,
}

struct DisplayFailures<'a>(&'a [DiskFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.device, failure.error)?;
        }
        Ok(())
    }
}
