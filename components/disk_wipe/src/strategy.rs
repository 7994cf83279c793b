use crate::probe::Capability;
use serde::Serialize;
use std::fmt;

/// How a disk gets erased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WipeStrategy {
    /// ATA security erase with a one-time password
    SecureEraseSED,
    /// NVMe format with user-data erase
    SecureEraseNVMe,
    /// mkfs with discard, trimming every block
    Discard,
    /// Zero-fill the whole capacity
    SlowOverwrite,
}

impl WipeStrategy {
    /// Pick the strategy for a probed disk; SED takes precedence over NVMe
    pub fn select(capability: &Capability) -> Self {
        if capability.sed_eligible() {
            WipeStrategy::SecureEraseSED
        } else if capability.nvme {
            WipeStrategy::SecureEraseNVMe
        } else {
            WipeStrategy::Discard
        }
    }

    /// Strategy to try when this one fails; only Discard has one
    pub fn fallback(&self) -> Option<WipeStrategy> {
        match self {
            WipeStrategy::Discard => Some(WipeStrategy::SlowOverwrite),
            _ => None,
        }
    }
}

impl fmt::Display for WipeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WipeStrategy::SecureEraseSED => "sed secure erase",
            WipeStrategy::SecureEraseNVMe => "nvme secure erase",
            WipeStrategy::Discard => "discard",
            WipeStrategy::SlowOverwrite => "slow overwrite",
        };
        write!(f, "{}", name)
    }
}
