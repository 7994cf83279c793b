//! Block device enumeration from sysfs

use crate::error::WipeError;
use serde::Serialize;
use std::path::Path;
use storage_primitives::{ByteSize, DevicePath};
use tokio::fs;

pub const SYS_BLOCK: &str = "/sys/block";

/// Kernel devices that are never physical disks
const VIRTUAL_PREFIXES: &[&str] = &["loop", "ram", "dm-", "sr", "zram", "md", "nbd"];

/// A local disk found during this boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disk {
    pub device: DevicePath,
    pub capacity: ByteSize,
}

impl Disk {
    pub fn new(device: DevicePath, capacity: ByteSize) -> Self {
        Self { device, capacity }
    }

    pub fn name(&self) -> &str {
        self.device.kernel_name()
    }
}

/// Enumerate physical disks below a sysfs block directory (normally `/sys/block`)
///
/// Devices whose size cannot be read, or that report zero capacity, are
/// skipped. The result is sorted by kernel name.
pub async fn discover_disks(sys_block: impl AsRef<Path>) -> Result<Vec<Disk>, WipeError> {
    let sys_block = sys_block.as_ref();
    let mut entries = fs::read_dir(sys_block)
        .await
        .map_err(|e| WipeError::discovery(sys_block, e))?;

    let mut disks = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WipeError::discovery(sys_block, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }

        let capacity = match read_capacity(&entry.path()).await {
            Ok(capacity) => capacity,
            Err(e) => {
                tracing::warn!(disk = %name, "could not read capacity: {} - skipping", e);
                continue;
            }
        };

        if capacity.is_zero() {
            tracing::debug!(disk = %name, "zero capacity, skipping");
            continue;
        }

        disks.push(Disk::new(DevicePath::from_kernel_name(&name), capacity));
    }

    disks.sort_by(|a, b| a.device.cmp(&b.device));
    tracing::info!("detected {} disk(s)", disks.len());

    Ok(disks)
}

async fn read_capacity(device_dir: &Path) -> std::io::Result<ByteSize> {
    let raw = fs::read_to_string(device_dir.join("size")).await?;
    let sectors: u64 = raw
        .trim()
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(ByteSize::from_sectors(sectors))
}
