//! Handing the machine over: hard reboot or kexec into the installed kernel

use crate::error::KernelError;
use async_trait::async_trait;
use control_plane::BootInfo;
use os_command::CommandRunner;
use std::sync::Arc;

#[async_trait]
pub trait Kernel: Send + Sync {
    /// Restart the machine; on real hardware this does not return
    async fn reboot(&self) -> Result<(), KernelError>;

    /// Replace the running kernel with the installed one
    async fn kexec(&self, boot_info: &BootInfo) -> Result<(), KernelError>;
}

/// Uses `reboot` and `kexec` from the boot environment
pub struct SystemKernel {
    runner: Arc<dyn CommandRunner>,
}

impl SystemKernel {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Kernel for SystemKernel {
    async fn reboot(&self) -> Result<(), KernelError> {
        tracing::warn!("rebooting");
        self.runner
            .execute("reboot", &["-f"])
            .await
            .map_err(KernelError::Reboot)?;
        Ok(())
    }

    async fn kexec(&self, boot_info: &BootInfo) -> Result<(), KernelError> {
        let kernel = boot_info.kernel.to_string_lossy();
        let initrd = format!("--initrd={}", boot_info.initrd.display());
        let cmdline = format!("--command-line={}", boot_info.cmdline);

        tracing::info!(kernel = %kernel, cmdline = %boot_info.cmdline, "loading kernel");
        self.runner
            .execute("kexec", &["--load", &*kernel, initrd.as_str(), cmdline.as_str()])
            .await
            .map_err(|source| KernelError::KexecLoad {
                kernel: boot_info.kernel.clone(),
                source,
            })?;

        self.runner
            .execute("kexec", &["--exec"])
            .await
            .map_err(KernelError::KexecExec)?;

        Err(KernelError::KexecReturned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use os_command::fake::{Scripted, ScriptedRunner};
    use std::path::PathBuf;

    fn boot_info() -> BootInfo {
        BootInfo {
            kernel: PathBuf::from("/rootfs/boot/vmlinuz"),
            initrd: PathBuf::from("/rootfs/boot/initrd.img"),
            cmdline: "root=LABEL=root console=ttyS0".to_string(),
        }
    }

    #[tokio::test]
    async fn kexec_loads_then_executes() {
        let runner = Arc::new(ScriptedRunner::new());
        let kernel = SystemKernel::new(runner.clone());

        let result = kernel.kexec(&boot_info()).await;

        assert_matches!(result, Err(KernelError::KexecReturned));
        let calls = runner.calls_to("kexec");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0], "--load");
        assert_eq!(calls[0].args[1], "/rootfs/boot/vmlinuz");
        assert!(calls[0].has_arg("--initrd=/rootfs/boot/initrd.img"));
        assert!(calls[0].has_arg("--command-line=root=LABEL=root console=ttyS0"));
        assert_eq!(calls[1].args, vec!["--exec"]);
    }

    #[tokio::test]
    async fn failed_load_skips_exec() {
        let runner = Arc::new(ScriptedRunner::new().on_arg("kexec", "--load", Scripted::fail("bad image")));
        let kernel = SystemKernel::new(runner.clone());

        assert_matches!(kernel.kexec(&boot_info()).await, Err(KernelError::KexecLoad { .. }));
        assert_eq!(runner.calls_to("kexec").len(), 1);
    }

    #[tokio::test]
    async fn reboot_forces_restart() {
        let runner = Arc::new(ScriptedRunner::new());
        SystemKernel::new(runner.clone()).reboot().await.unwrap();
        assert_eq!(runner.calls()[0].command_line(), "reboot -f");
    }
}
