//! Disk sanitization for freshly booted machines
//!
//! Every local disk is erased before the machine registers. The strategy
//! per disk is picked from live capability probing:
//!
//! ```text
//! SED enhanced erase, not frozen  -> SecureEraseSED   (hdparm security erase)
//! /dev/nvme*                      -> SecureEraseNVMe  (nvme format --ses=1)
//! anything else                   -> Discard          (mkfs.ext4 -E discard)
//!                                      └─ on failure -> SlowOverwrite (dd from /dev/zero)
//! ```
//!
//! Disks are wiped one after another; a failure on one disk never stops
//! the sweep over the rest.

mod discovery;
mod engine;
mod error;
mod probe;
mod strategy;

pub use discovery::{discover_disks, Disk, SYS_BLOCK};
pub use engine::{SweepReport, WipeEngine, OVERWRITE_BLOCK_SIZE};
pub use error::{DiskFailure, WipeError};
pub use probe::{is_nvme, parse_identify, Capability, Prober, SedStatus};
pub use strategy::WipeStrategy;
