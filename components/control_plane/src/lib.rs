//! Everything the agent exchanges with the fleet control plane
//!
//! Collaborators are narrow traits ([`Register`], [`WaitForAllocation`],
//! [`Install`], [`Report`], [`EventSink`]) so the orchestrator can run
//! against HTTP clients, devmode substitutes or test fakes alike.

mod collaborators;
mod error;
mod events;
mod http;
pub mod inventory;
mod types;

pub use collaborators::{EventSink, Install, Register, Report, WaitForAllocation};
pub use error::ControlPlaneError;
pub use events::{DeliveryTask, EventEmitter, EventKind, ProgressEvent, ProvisioningStage};
pub use http::{HttpControlPlane, HttpRegistrar};
pub use types::{
    BootInfo, ImageRef, InstallationOutcome, InstallationReport, MachineAllocation, RegistrationId,
};
