//! Provisioner error types
//!
//! Stage failures are wrapped in [`ProvisionError::Stage`] so the process
//! boundary always knows how far the pipeline got.

use control_plane::{ControlPlaneError, ProvisioningStage};
use disk_wipe::WipeError;
use os_command::CommandError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("stage {stage} failed")]
    Stage {
        stage: ProvisioningStage,
        #[source]
        source: StageError,
    },
}

impl ProvisionError {
    pub fn stage(&self) -> ProvisioningStage {
        match self {
            ProvisionError::Stage { stage, .. } => *stage,
        }
    }
}

/// What went wrong inside a stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Wipe(#[from] WipeError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("required commands are missing")]
    MissingCommands(#[source] CommandError),

    #[error("no network interfaces found in {path}")]
    NoInterfaces { path: PathBuf },

    #[error("unable to list network interfaces in {path}")]
    ListInterfaces {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to bring up interface {interface}")]
    InterfaceUp {
        interface: String,
        #[source]
        source: CommandError,
    },

    #[error("machine was not booted in UEFI mode ({path} is missing)")]
    NotUefi { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("reboot failed")]
    Reboot(#[source] CommandError),

    #[error("unable to load kernel {kernel}")]
    KexecLoad {
        kernel: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("kexec failed")]
    KexecExec(#[source] CommandError),

    #[error("kexec returned instead of replacing the running kernel")]
    KexecReturned,
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("unable to find a target disk")]
    Discovery(#[source] WipeError),

    #[error("no disk available to install onto")]
    NoDisk,

    #[error("{step} failed")]
    Command {
        step: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("io error during {operation} at {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to create http client")]
    HttpClient(#[source] reqwest::Error),

    #[error("unable to download image {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("image download from {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("invalid boot info in {path}")]
    BootInfo {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to serialize install configuration")]
    InstallConfig(#[source] serde_json::Error),
}

impl InstallError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn command(step: &'static str, source: CommandError) -> Self {
        InstallError::Command { step, source }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("control plane url is required")]
    MissingControlPlaneUrl,

    #[error("unable to read machine uuid from {path}")]
    ReadUuid {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid machine uuid {value:?}")]
    InvalidUuid {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidFlag { key: &'static str, value: String },
}

/// Render an error and its sources on one line, outermost first
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
