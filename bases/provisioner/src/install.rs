//! Image installation onto the first local disk
//!
//! Layout written to the target disk:
//!
//! ```text
//! part 1  500 MiB  ef00  vfat "EFI"   mounted at <rootfs>/boot/efi
//! part 2  rest     8300  ext4 "root"  mounted at <rootfs>
//! ```

use crate::config::HostPaths;
use crate::error::InstallError;
use async_trait::async_trait;
use control_plane::{BootInfo, Install, MachineAllocation};
use disk_wipe::{discover_disks, Disk};
use os_command::CommandRunner;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage_primitives::{ByteSize, DevicePath};
use tokio::io::AsyncWriteExt;

const EFI_PARTITION_SIZE: ByteSize = ByteSize::from_mib(500);
const IMAGE_ARCHIVE: &str = ".image.tar.gz";
const INSTALL_CONFIG: &str = "etc/metal/install.json";
const BOOT_INFO: &str = "etc/metal/boot-info.json";
const INSTALL_SCRIPT: &str = "install.sh";

/// Handed to the image's install script
#[derive(Debug, Serialize)]
struct InstallConfig<'a> {
    hostname: &'a str,
    ssh_pub_keys: &'a [String],
    cidr: &'a str,
    phone_home_token: &'a str,
    console_password: &'a str,
    image_id: &'a str,
    size_id: &'a str,
}

pub struct ImageInstaller {
    runner: Arc<dyn CommandRunner>,
    client: reqwest::Client,
    sys_block: PathBuf,
    rootfs: PathBuf,
    console_password: String,
}

impl ImageInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        console_password: impl Into<String>,
        paths: &HostPaths,
    ) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(InstallError::HttpClient)?;
        Ok(Self {
            runner,
            client,
            sys_block: paths.sys_block.clone(),
            rootfs: paths.rootfs.clone(),
            console_password: console_password.into(),
        })
    }

    async fn run(&self, step: &'static str, program: &str, args: &[&str]) -> Result<(), InstallError> {
        self.runner
            .execute(program, args)
            .await
            .map_err(|source| InstallError::command(step, source))?;
        Ok(())
    }

    async fn target_disk(&self) -> Result<Disk, InstallError> {
        let disks = discover_disks(&self.sys_block)
            .await
            .map_err(InstallError::Discovery)?;
        disks.into_iter().next().ok_or(InstallError::NoDisk)
    }

    /// Returns the EFI and root partitions
    async fn partition(&self, device: &DevicePath) -> Result<(DevicePath, DevicePath), InstallError> {
        let disk = device.as_str();
        let efi_size = format!("--new=1:0:+{}M", EFI_PARTITION_SIZE.bytes() / 1_048_576);

        self.run("wipe partition table", "sgdisk", &["--zap-all", disk]).await?;
        self.run(
            "create efi partition",
            "sgdisk",
            &[efi_size.as_str(), "--typecode=1:ef00", "--change-name=1:efi", disk],
        )
        .await?;
        self.run(
            "create root partition",
            "sgdisk",
            &["--new=2:0:0", "--typecode=2:8300", "--change-name=2:root", disk],
        )
        .await?;

        Ok((device.partition(1), device.partition(2)))
    }

    async fn format(&self, efi: &DevicePath, root: &DevicePath) -> Result<(), InstallError> {
        self.run("format efi partition", "mkfs.vfat", &["-n", "EFI", efi.as_str()]).await?;
        self.run("format root partition", "mkfs.ext4", &["-F", "-L", "root", root.as_str()])
            .await
    }

    async fn mount(&self, efi: &DevicePath, root: &DevicePath) -> Result<(), InstallError> {
        create_dir(&self.rootfs).await?;
        let rootfs = self.rootfs.to_string_lossy();
        self.run("mount root partition", "mount", &["-t", "ext4", root.as_str(), &*rootfs])
            .await?;

        let efi_mount = self.rootfs.join("boot/efi");
        create_dir(&efi_mount).await?;
        let efi_mount = efi_mount.to_string_lossy();
        self.run("mount efi partition", "mount", &["-t", "vfat", efi.as_str(), &*efi_mount])
            .await
    }

    /// Stream the image archive to disk and unpack it into the root filesystem
    async fn pull_image(&self, url: &str) -> Result<(), InstallError> {
        let archive = self.rootfs.join(IMAGE_ARCHIVE);
        let download_error = |source| InstallError::Download {
            url: url.to_string(),
            source,
        };

        tracing::info!(url = %url, "pulling image");
        let mut response = self.client.get(url).send().await.map_err(download_error)?;
        if !response.status().is_success() {
            return Err(InstallError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(&archive)
            .await
            .map_err(|e| InstallError::io("create image archive", &archive, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download_error)? {
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::io("write image archive", &archive, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| InstallError::io("write image archive", &archive, e))?;
        tracing::info!(size = %ByteSize::new(written), "image downloaded");

        let archive_arg = archive.to_string_lossy();
        let rootfs = self.rootfs.to_string_lossy();
        self.run("extract image", "tar", &["-xzf", &*archive_arg, "-C", &*rootfs])
            .await?;

        tokio::fs::remove_file(&archive)
            .await
            .map_err(|e| InstallError::io("remove image archive", &archive, e))
    }

    async fn write_install_config(&self, allocation: &MachineAllocation) -> Result<(), InstallError> {
        let config = InstallConfig {
            hostname: &allocation.hostname,
            ssh_pub_keys: &allocation.ssh_pub_keys,
            cidr: &allocation.cidr,
            phone_home_token: &allocation.phone_home_token,
            console_password: &self.console_password,
            image_id: &allocation.image.id,
            size_id: &allocation.size_id,
        };
        let json = serde_json::to_vec_pretty(&config).map_err(InstallError::InstallConfig)?;

        let path = self.rootfs.join(INSTALL_CONFIG);
        if let Some(parent) = path.parent() {
            create_dir(parent).await?;
        }
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| InstallError::io("write install configuration", &path, e))
    }

    async fn run_install_script(&self) -> Result<(), InstallError> {
        let script = self.rootfs.join(INSTALL_SCRIPT);
        if tokio::fs::metadata(&script).await.is_err() {
            tracing::info!("image has no {}, skipping", INSTALL_SCRIPT);
            return Ok(());
        }

        let rootfs = self.rootfs.to_string_lossy();
        let in_chroot = format!("/{}", INSTALL_SCRIPT);
        self.run("run install script", "chroot", &[&*rootfs, in_chroot.as_str()])
            .await
    }

    async fn boot_info(&self) -> Result<BootInfo, InstallError> {
        let path = self.rootfs.join(BOOT_INFO);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| InstallError::BootInfo { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BootInfo {
                kernel: self.rootfs.join("boot/vmlinuz"),
                initrd: self.rootfs.join("boot/initrd.img"),
                cmdline: "root=LABEL=root".to_string(),
            }),
            Err(e) => Err(InstallError::io("read boot info", path, e)),
        }
    }
}

#[async_trait]
impl Install for ImageInstaller {
    type Error = InstallError;

    async fn install(&self, allocation: &MachineAllocation) -> Result<BootInfo, InstallError> {
        let disk = self.target_disk().await?;
        tracing::info!(disk = %disk.device, capacity = %disk.capacity, image = %allocation.image.id, "installing");

        let (efi, root) = self.partition(&disk.device).await?;
        self.format(&efi, &root).await?;
        self.mount(&efi, &root).await?;
        self.pull_image(&allocation.image.url).await?;
        self.write_install_config(allocation).await?;
        self.run_install_script().await?;

        let boot_info = self.boot_info().await?;
        tracing::info!(kernel = %boot_info.kernel.display(), "installation finished");
        Ok(boot_info)
    }
}

async fn create_dir(path: &Path) -> Result<(), InstallError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| InstallError::io("create directory", path, e))
}
