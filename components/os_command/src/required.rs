//! Startup check that the boot environment ships every tool we shell out to

use crate::error::CommandError;

/// Binaries the provisioning pipeline invokes
pub const REQUIRED_COMMANDS: &[&str] = &[
    "chroot",
    "dd",
    "hdparm",
    "ip",
    "kexec",
    "lshw",
    "mkfs.ext4",
    "mkfs.vfat",
    "mount",
    "nvme",
    "reboot",
    "sgdisk",
    "tar",
];

/// Fails with every missing command listed, not just the first
pub fn ensure_available(commands: &[&str]) -> Result<(), CommandError> {
    let missing: Vec<String> = commands
        .iter()
        .filter(|command| which::which(command).is_err())
        .map(|command| command.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Missing(missing))
    }
}
