//! Storage value types shared by disk discovery, wiping and installation
//!
//! This component provides type-safe wrappers with:
//! - Human-readable display formatting for capacities
//! - Device path handling (`/dev/<name>`, partition naming)
//! - Block arithmetic for streaming overwrites
//!
//! # Examples
//!
//! ```
//! use storage_primitives::{BlockSize, ByteSize, DevicePath};
//!
//! let capacity = ByteSize::from_sectors(2_000);
//! assert_eq!(capacity.bytes(), 1_024_000);
//!
//! let blocks = BlockSize::new(10_240).whole_blocks_in(capacity);
//! assert_eq!(blocks, 100);
//!
//! let disk = DevicePath::from_kernel_name("nvme0n1");
//! assert_eq!(disk.partition(2).as_str(), "/dev/nvme0n1p2");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a sysfs sector; `/sys/block/<dev>/size` is always in these units
pub const SYSFS_SECTOR_SIZE: u64 = 512;

/// Size in bytes with smart display formatting
///
/// The inner value is PRIVATE to ensure all construction goes through
/// the constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Create from a number of bytes
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from a sysfs sector count (saturating at u64::MAX)
    pub const fn from_sectors(sectors: u64) -> Self {
        Self(sectors.saturating_mul(SYSFS_SECTOR_SIZE))
    }

    /// Create from mebibytes (1 MiB = 1,048,576 bytes)
    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * 1_048_576)
    }

    /// Get the raw byte value
    pub const fn bytes(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: u64 = 1_000;
        const MB: u64 = 1_000_000;
        const GB: u64 = 1_000_000_000;
        const TB: u64 = 1_000_000_000_000;

        if self.0 >= TB {
            write!(f, "{:.1} TB", self.0 as f64 / TB as f64)
        } else if self.0 >= GB {
            write!(f, "{} GB", self.0 / GB)
        } else if self.0 >= MB {
            write!(f, "{} MB", self.0 / MB)
        } else if self.0 >= KB {
            write!(f, "{} KB", self.0 / KB)
        } else {
            write!(f, "{} bytes", self.0)
        }
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        ByteSize(bytes)
    }
}

/// Fixed transfer unit for streaming writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSize(u64);

impl BlockSize {
    /// Create a block size; zero is clamped to one byte
    pub const fn new(bytes: u64) -> Self {
        if bytes == 0 {
            Self(1)
        } else {
            Self(bytes)
        }
    }

    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// Number of whole blocks that fit in `capacity`
    ///
    /// Floor division: a trailing remainder smaller than one block is not
    /// counted.
    pub const fn whole_blocks_in(&self, capacity: ByteSize) -> u64 {
        capacity.0 / self.0
    }

    /// Bytes past the last whole block
    pub const fn remainder_of(&self, capacity: ByteSize) -> u64 {
        capacity.0 % self.0
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Path of a block device node, e.g. `/dev/sda`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePath(String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        DevicePath(path.into())
    }

    /// Build `/dev/<name>` from a kernel block device name such as `sda`
    pub fn from_kernel_name(name: &str) -> Self {
        DevicePath(format!("/dev/{}", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kernel name without the `/dev/` prefix
    pub fn kernel_name(&self) -> &str {
        self.0.strip_prefix("/dev/").unwrap_or(&self.0)
    }

    /// Path of partition `index` on this device
    ///
    /// Devices whose name ends in a digit (nvme0n1, mmcblk0) separate the
    /// partition number with `p`.
    pub fn partition(&self, index: u32) -> DevicePath {
        let needs_separator = self
            .0
            .chars()
            .last()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false);

        if needs_separator {
            DevicePath(format!("{}p{}", self.0, index))
        } else {
            DevicePath(format!("{}{}", self.0, index))
        }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DevicePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
