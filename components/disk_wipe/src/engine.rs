//! The erase decision engine

use crate::discovery::Disk;
use crate::error::{DiskFailure, WipeError};
use crate::probe::{Capability, Prober};
use crate::strategy::WipeStrategy;
use os_command::{password, CommandRunner};
use std::sync::Arc;
use storage_primitives::{BlockSize, DevicePath};
use tracing::Instrument;

/// Block size for the zero-fill fallback
pub const OVERWRITE_BLOCK_SIZE: BlockSize = BlockSize::new(10_240);

const SED_PASSWORD_LEN: usize = 10;

const HDPARM: &str = "hdparm";
const NVME: &str = "nvme";
const MKFS_EXT4: &str = "mkfs.ext4";
const DD: &str = "dd";

/// Strategy each disk ended up with in a successful sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub wiped: Vec<(DevicePath, WipeStrategy)>,
}

/// Selects and runs exactly one erase strategy per disk
#[derive(Clone)]
pub struct WipeEngine {
    runner: Arc<dyn CommandRunner>,
    prober: Prober,
    span: tracing::Span,
}

impl WipeEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, span: tracing::Span) -> Self {
        Self {
            prober: Prober::new(runner.clone()),
            runner,
            span,
        }
    }

    /// Probe a disk and choose its strategy without touching its contents
    pub async fn plan(&self, disk: &Disk) -> (Capability, WipeStrategy) {
        let capability = self.prober.probe(&disk.device).await;
        (capability, WipeStrategy::select(&capability))
    }

    /// Erase one disk, returning the strategy that completed
    pub async fn wipe(&self, disk: &Disk) -> Result<WipeStrategy, WipeError> {
        let span = tracing::info_span!(parent: &self.span, "wipe", disk = %disk.device);
        self.wipe_disk(disk).instrument(span).await
    }

    async fn wipe_disk(&self, disk: &Disk) -> Result<WipeStrategy, WipeError> {
        let (capability, strategy) = self.plan(disk).await;
        tracing::info!(strategy = %strategy, capacity = %disk.capacity, "selected wipe strategy");

        match strategy {
            WipeStrategy::SecureEraseSED => {
                if capability.sed.locked {
                    tracing::warn!("drive reports locked security state, attempting secure erase anyway");
                }
                self.secure_erase(&disk.device).await?;
                Ok(strategy)
            }
            WipeStrategy::SecureEraseNVMe => {
                self.secure_erase_nvme(&disk.device).await?;
                Ok(strategy)
            }
            WipeStrategy::Discard | WipeStrategy::SlowOverwrite => match self.discard(&disk.device).await {
                Ok(()) => Ok(WipeStrategy::Discard),
                Err(discard_error) => {
                    tracing::warn!(fallback = ?strategy.fallback(), "discard failed: {}", discard_error);
                    self.overwrite(disk)
                        .await
                        .map_err(|source| WipeError::Overwrite {
                            device: disk.device.clone(),
                            discard: discard_error.to_string(),
                            source,
                        })?;
                    Ok(WipeStrategy::SlowOverwrite)
                }
            },
        }
    }

    /// Wipe every disk in order
    ///
    /// All disks are attempted even when some fail; the failures are then
    /// returned together as [`WipeError::Incomplete`].
    pub async fn sweep(&self, disks: &[Disk]) -> Result<SweepReport, WipeError> {
        tracing::info!(parent: &self.span, "wipe {} existing disk(s)", disks.len());

        let mut report = SweepReport::default();
        let mut failed = Vec::new();

        for disk in disks {
            match self.wipe(disk).await {
                Ok(strategy) => {
                    tracing::info!(parent: &self.span, disk = %disk.device, strategy = %strategy, "disk wiped");
                    report.wiped.push((disk.device.clone(), strategy));
                }
                Err(e) => {
                    tracing::error!(parent: &self.span, disk = %disk.device, "unable to wipe: {}", e);
                    failed.push(DiskFailure {
                        device: disk.device.clone(),
                        error: Box::new(e),
                    });
                }
            }
        }

        if failed.is_empty() {
            Ok(report)
        } else {
            Err(WipeError::Incomplete { failed })
        }
    }

    async fn secure_erase(&self, device: &DevicePath) -> Result<(), WipeError> {
        tracing::info!("start fast deleting of existing data");
        let password = password::generate(SED_PASSWORD_LEN);

        self.runner
            .execute(
                HDPARM,
                &["--user-master", "u", "--security-set-pass", &password, device.as_str()],
            )
            .await
            .map_err(|source| WipeError::SecureErase {
                device: device.clone(),
                step: "set secure erase password",
                source,
            })?;

        self.runner
            .execute(
                HDPARM,
                &["--user-master", "u", "--security-erase", &password, device.as_str()],
            )
            .await
            .map_err(|source| WipeError::SecureErase {
                device: device.clone(),
                step: "secure erase",
                source,
            })?;

        Ok(())
    }

    async fn secure_erase_nvme(&self, device: &DevicePath) -> Result<(), WipeError> {
        tracing::info!("start very fast deleting of existing data");
        self.runner
            .execute(NVME, &["format", "--ses=1", device.as_str()])
            .await
            .map_err(|source| WipeError::NvmeFormat {
                device: device.clone(),
                source,
            })?;
        Ok(())
    }

    async fn discard(&self, device: &DevicePath) -> Result<(), os_command::CommandError> {
        tracing::info!("discard existing data");
        self.runner
            .execute(MKFS_EXT4, &["-F", "-E", "discard", device.as_str()])
            .await?;
        tracing::info!("finish discard of existing data");
        Ok(())
    }

    async fn overwrite(&self, disk: &Disk) -> Result<(), os_command::CommandError> {
        let count = OVERWRITE_BLOCK_SIZE.whole_blocks_in(disk.capacity);
        let remainder = OVERWRITE_BLOCK_SIZE.remainder_of(disk.capacity);
        tracing::info!(blocks = count, "slow deleting of existing data");
        if remainder > 0 {
            tracing::debug!(bytes = remainder, "trailing bytes beyond last whole block left untouched");
        }

        let output_arg = format!("of={}", disk.device);
        let bs_arg = format!("bs={}", OVERWRITE_BLOCK_SIZE);
        let count_arg = format!("count={}", count);

        self.runner
            .execute(
                DD,
                &["status=progress", "if=/dev/zero", &output_arg, &bs_arg, &count_arg],
            )
            .await?;

        tracing::info!("finish deleting of existing data");
        Ok(())
    }
}
