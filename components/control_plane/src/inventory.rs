//! Hardware inventory for registration
//!
//! The payload is whatever `lshw -json` prints; its schema belongs to the
//! control plane and is passed through untouched.

use crate::error::ControlPlaneError;
use os_command::CommandRunner;

const LSHW: &str = "lshw";

pub async fn collect(runner: &dyn CommandRunner) -> Result<serde_json::Value, ControlPlaneError> {
    let output = runner
        .execute(LSHW, &["-quiet", "-json"])
        .await
        .map_err(ControlPlaneError::Inventory)?;
    tracing::debug!(raw = %output.stdout, "lshw output");
    serde_json::from_str(&output.stdout).map_err(ControlPlaneError::InventoryFormat)
}
