//! Erase capability probing
//!
//! NVMe-ness is decided from the device name alone. SED support comes from
//! `hdparm -I`, whose security section looks like:
//!
//! ```text
//! Security:
//!         Master password revision code = 65534
//!                 supported
//!         not     enabled
//!         not     locked
//!                 frozen
//!         not     expired: security count
//!                 supported: enhanced erase
//! ```
//!
//! Probing never fails: an unavailable or failing `hdparm` means "not SED
//! capable" and the disk falls through to the non-SED strategies.

use os_command::CommandRunner;
use serde::Serialize;
use std::sync::Arc;
use storage_primitives::DevicePath;

const HDPARM: &str = "hdparm";
const NVME_PREFIX: &str = "/dev/nvme";

const ENHANCED_ERASE_MARKER: &str = "enhanced erase";
const FROZEN_MARKER: &str = "frozen";
const LOCKED_MARKER: &str = "locked";

/// Security state parsed from identify output
///
/// Every field defaults to `false`, the side that keeps a disk away from
/// the SED flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SedStatus {
    pub enhanced_erase: bool,
    pub frozen: bool,
    pub locked: bool,
}

impl SedStatus {
    /// Enhanced erase supported and not frozen; lock state does not matter
    pub fn eligible(&self) -> bool {
        self.enhanced_erase && !self.frozen
    }
}

/// Everything strategy selection needs to know about one disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub nvme: bool,
    pub sed: SedStatus,
}

impl Capability {
    pub fn sed_eligible(&self) -> bool {
        self.sed.eligible()
    }
}

pub fn is_nvme(device: &DevicePath) -> bool {
    device.as_str().starts_with(NVME_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    EnhancedErase,
    Frozen,
    Locked,
}

fn classify(line: &str) -> Option<Condition> {
    let erase = line.contains(ENHANCED_ERASE_MARKER) && line.contains("supported");
    let frozen = line.contains(FROZEN_MARKER);
    let locked = line.contains(LOCKED_MARKER);

    // a line naming more than one condition is ambiguous
    match (erase, frozen, locked) {
        (true, false, false) => Some(Condition::EnhancedErase),
        (false, true, false) => Some(Condition::Frozen),
        (false, false, true) => Some(Condition::Locked),
        _ => None,
    }
}

/// Parse `hdparm -I` output into a [`SedStatus`]
///
/// A condition holds if any line affirms it; a `not` token on a line
/// negates that line only. One affirmative `frozen` line is enough to
/// rule the disk out.
pub fn parse_identify(output: &str) -> SedStatus {
    let mut status = SedStatus::default();

    for line in output.lines() {
        let Some(condition) = classify(line) else {
            continue;
        };
        if line.split_whitespace().any(|word| word == "not") {
            continue;
        }

        match condition {
            Condition::EnhancedErase => status.enhanced_erase = true,
            Condition::Frozen => status.frozen = true,
            Condition::Locked => status.locked = true,
        }
    }

    status
}

/// Read-only capability probe for a single device
#[derive(Clone)]
pub struct Prober {
    runner: Arc<dyn CommandRunner>,
}

impl Prober {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn probe(&self, device: &DevicePath) -> Capability {
        Capability {
            nvme: is_nvme(device),
            sed: self.probe_sed(device).await,
        }
    }

    async fn probe_sed(&self, device: &DevicePath) -> SedStatus {
        let output = match self.runner.execute(HDPARM, &["-I", device.as_str()]).await {
            Ok(output) => output,
            Err(e) if e.is_unavailable() => {
                tracing::warn!(disk = %device, "hdparm unavailable, treating disk as not sed capable: {}", e);
                return SedStatus::default();
            }
            Err(e) => {
                tracing::info!(disk = %device, "sed probe inconclusive, treating as not capable: {}", e);
                return SedStatus::default();
            }
        };

        let status = parse_identify(&output.stdout);
        if !status.enhanced_erase {
            tracing::info!(disk = %device, "sed is not available, enhanced erase is not supported");
        } else if status.frozen {
            tracing::info!(disk = %device, "sed is not available, disk is frozen");
        } else {
            tracing::info!(disk = %device, locked = status.locked, "sed is available");
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use os_command::fake::{Scripted, ScriptedRunner};

    const SED_FROZEN: &str = "\
Security:
        Master password revision code = 65534
                supported
        not     enabled
        not     locked
                frozen
        not     expired: security count
                supported: enhanced erase
        6min for SECURITY ERASE UNIT. 32min for ENHANCED SECURITY ERASE UNIT.
";

    const SED_READY: &str = "\
Security:
        Master password revision code = 65534
                supported
        not     enabled
        not     locked
        not     frozen
        not     expired: security count
                supported: enhanced erase
        2min for SECURITY ERASE UNIT. 2min for ENHANCED SECURITY ERASE UNIT.
";

    #[test]
    fn frozen_disk_is_not_eligible() {
        let status = parse_identify(SED_FROZEN);
        assert!(status.enhanced_erase);
        assert!(status.frozen);
        assert!(!status.eligible());
    }

    #[test]
    fn unfrozen_enhanced_erase_is_eligible() {
        let status = parse_identify(SED_READY);
        assert_eq!(
            status,
            SedStatus {
                enhanced_erase: true,
                frozen: false,
                locked: false
            }
        );
        assert!(status.eligible());
    }

    #[test]
    fn missing_frozen_line_is_not_frozen() {
        let status = parse_identify("                supported: enhanced erase\n");
        assert!(status.eligible());
    }

    #[test]
    fn negated_enhanced_erase_is_not_supported() {
        let status = parse_identify("        not     supported: enhanced erase\n");
        assert!(!status.enhanced_erase);
    }

    #[test]
    fn locked_does_not_disqualify() {
        let output = SED_READY.replace("not     locked", "        locked");
        let status = parse_identify(&output);
        assert!(status.locked);
        assert!(status.eligible());
    }

    #[test]
    fn any_frozen_line_rules_the_disk_out() {
        let status = parse_identify("  not frozen\n  frozen\n  supported: enhanced erase\n");
        assert!(status.frozen);
        assert!(!status.eligible());
    }

    #[test]
    fn empty_output_defaults_to_not_capable() {
        assert_eq!(parse_identify(""), SedStatus::default());
    }

    #[test]
    fn nvme_is_decided_by_name() {
        assert!(is_nvme(&DevicePath::new("/dev/nvme0n1")));
        assert!(!is_nvme(&DevicePath::new("/dev/sda")));
    }

    #[tokio::test]
    async fn failing_hdparm_means_not_sed() {
        let runner = Arc::new(ScriptedRunner::new().on("hdparm", Scripted::fail("bad ioctl")));
        let prober = Prober::new(runner);

        let capability = prober.probe(&DevicePath::new("/dev/sda")).await;

        assert_eq!(capability, Capability::default());
    }

    #[tokio::test]
    async fn missing_hdparm_means_not_sed() {
        let runner = Arc::new(ScriptedRunner::new().on("hdparm", Scripted::NotInstalled));
        let prober = Prober::new(runner);

        let capability = prober.probe(&DevicePath::new("/dev/nvme1n1")).await;

        assert!(capability.nvme);
        assert!(!capability.sed_eligible());
    }

    #[tokio::test]
    async fn probe_runs_identify_only() {
        let runner = Arc::new(ScriptedRunner::new().on("hdparm", Scripted::stdout(SED_READY)));
        let prober = Prober::new(runner.clone());

        let capability = prober.probe(&DevicePath::new("/dev/sda")).await;

        assert!(capability.sed_eligible());
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command_line(), "hdparm -I /dev/sda");
    }
}
