use crate::error::ControlPlaneError;
use crate::events::ProgressEvent;
use crate::types::{BootInfo, InstallationReport, MachineAllocation, RegistrationId};
use async_trait::async_trait;

/// Announce this machine and its hardware to the control plane
#[async_trait]
pub trait Register: Send + Sync {
    async fn register(&self) -> Result<RegistrationId, ControlPlaneError>;
}

/// Block until an allocation for this machine exists
#[async_trait]
pub trait WaitForAllocation: Send + Sync {
    async fn wait(&self, id: &RegistrationId) -> Result<MachineAllocation, ControlPlaneError>;
}

/// Write the allocated image to local storage
#[async_trait]
pub trait Install: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn install(&self, allocation: &MachineAllocation) -> Result<BootInfo, Self::Error>;
}

/// Tell the control plane how the installation went
#[async_trait]
pub trait Report: Send + Sync {
    async fn report(&self, report: &InstallationReport) -> Result<(), ControlPlaneError>;
}

/// Deliver one progress event
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), ControlPlaneError>;
}
