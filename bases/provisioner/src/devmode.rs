//! Collaborators that let the pipeline run without a reachable control plane
//!
//! Devmode is wired in by substituting these for the HTTP collaborators;
//! the orchestrator itself never looks at the devmode flag.

use crate::config::MachineSpec;
use crate::orchestrator::Collaborators;
use async_trait::async_trait;
use control_plane::{
    ControlPlaneError, ImageRef, MachineAllocation, Register, RegistrationId, WaitForAllocation,
};
use std::sync::Arc;

pub const DEVMODE_HOSTNAME: &str = "devmode";
pub const DEFAULT_CIDR: &str = "10.0.1.2/24";
pub const DHCP: &str = "dhcp";

const PLACEHOLDER_SSH_KEYS: [&str; 2] = [
    "not a valid ssh public key, can be specified during machine create.",
    "second public key",
];
const PLACEHOLDER_TOKEN: &str = "JWT";

/// Network configuration for a synthesized allocation
///
/// Without BGP the machine cannot announce a static address, so DHCP wins
/// over any override.
pub fn devmode_cidr(cidr_override: Option<&str>, bgp_enabled: bool) -> String {
    if !bgp_enabled {
        return DHCP.to_string();
    }
    match cidr_override {
        Some(cidr) if !cidr.is_empty() => cidr.to_string(),
        _ => DEFAULT_CIDR.to_string(),
    }
}

pub fn synthesize_allocation(spec: &MachineSpec) -> MachineAllocation {
    MachineAllocation {
        hostname: DEVMODE_HOSTNAME.to_string(),
        ssh_pub_keys: PLACEHOLDER_SSH_KEYS.iter().map(|k| k.to_string()).collect(),
        cidr: devmode_cidr(spec.cidr.as_deref(), spec.bgp_enabled),
        image: ImageRef {
            id: spec.image_id.clone().unwrap_or_default(),
            url: spec.image_url.clone().unwrap_or_default(),
        },
        size_id: spec.size_id.clone().unwrap_or_default(),
        phone_home_token: PLACEHOLDER_TOKEN.to_string(),
    }
}

/// Registration that degrades to a warning
pub struct BestEffortRegistrar {
    inner: Arc<dyn Register>,
    fallback: RegistrationId,
}

impl BestEffortRegistrar {
    pub fn new(inner: Arc<dyn Register>, fallback: RegistrationId) -> Self {
        Self { inner, fallback }
    }
}

#[async_trait]
impl Register for BestEffortRegistrar {
    async fn register(&self) -> Result<RegistrationId, ControlPlaneError> {
        match self.inner.register().await {
            Ok(id) => Ok(id),
            Err(e) => {
                tracing::warn!(fallback = %self.fallback, "registration failed, continuing in devmode: {}", e);
                Ok(self.fallback.clone())
            }
        }
    }
}

/// Allocation known up front instead of waited for
pub struct SynthesizedAllocation {
    allocation: MachineAllocation,
}

impl SynthesizedAllocation {
    pub fn new(allocation: MachineAllocation) -> Self {
        Self { allocation }
    }
}

#[async_trait]
impl WaitForAllocation for SynthesizedAllocation {
    async fn wait(&self, id: &RegistrationId) -> Result<MachineAllocation, ControlPlaneError> {
        tracing::info!(id = %id, hostname = %self.allocation.hostname, cidr = %self.allocation.cidr, "using synthesized allocation");
        Ok(self.allocation.clone())
    }
}

/// Replace registration and allocation wait with their devmode stand-ins
pub fn substitute(spec: &MachineSpec, collaborators: Collaborators) -> Collaborators {
    Collaborators {
        register: Arc::new(BestEffortRegistrar::new(
            collaborators.register,
            RegistrationId::new(spec.machine_uuid.to_string()),
        )),
        wait: Arc::new(SynthesizedAllocation::new(synthesize_allocation(spec))),
        ..collaborators
    }
}
