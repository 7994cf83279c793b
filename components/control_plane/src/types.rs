use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier the control plane returned on registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    pub url: String,
}

/// The workload assignment the machine waits for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAllocation {
    pub hostname: String,
    pub ssh_pub_keys: Vec<String>,
    /// Address in CIDR notation, or `dhcp`
    pub cidr: String,
    pub image: ImageRef,
    pub size_id: String,
    pub phone_home_token: String,
}

/// What kexec needs to start the installed operating system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootInfo {
    pub kernel: PathBuf,
    pub initrd: PathBuf,
    pub cmdline: String,
}

/// Result of the installation stage, consumed by reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub console_password: String,
}

impl InstallationOutcome {
    pub fn succeeded(console_password: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            console_password: console_password.into(),
        }
    }

    pub fn failed(console_password: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            console_password: console_password.into(),
        }
    }
}

/// Completion report body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationReport {
    pub success: bool,
    pub console_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&InstallationOutcome> for InstallationReport {
    fn from(outcome: &InstallationOutcome) -> Self {
        Self {
            success: outcome.success,
            console_password: outcome.console_password.clone(),
            message: outcome.error.clone(),
        }
    }
}
