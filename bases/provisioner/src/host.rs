//! Host preparation stages: tool check, network bring-up, UEFI check

use crate::config::HostPaths;
use crate::error::HostError;
use os_command::{ensure_available, CommandRunner};
use std::path::PathBuf;
use std::sync::Arc;

pub struct Host {
    runner: Arc<dyn CommandRunner>,
    required: Vec<&'static str>,
    net_root: PathBuf,
    efi_root: PathBuf,
}

impl Host {
    pub fn new(runner: Arc<dyn CommandRunner>, required: &[&'static str], paths: &HostPaths) -> Self {
        Self {
            runner,
            required: required.to_vec(),
            net_root: paths.sys_class_net.clone(),
            efi_root: paths.sys_firmware_efi.clone(),
        }
    }

    pub async fn check_commands(&self) -> Result<(), HostError> {
        ensure_available(&self.required).map_err(HostError::MissingCommands)
    }

    /// Set every interface except loopback up
    pub async fn up_all_interfaces(&self) -> Result<Vec<String>, HostError> {
        let mut entries = tokio::fs::read_dir(&self.net_root)
            .await
            .map_err(|source| self.list_error(source))?;

        let mut interfaces = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| self.list_error(source))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != "lo" {
                interfaces.push(name);
            }
        }
        interfaces.sort();

        if interfaces.is_empty() {
            return Err(HostError::NoInterfaces {
                path: self.net_root.clone(),
            });
        }

        for interface in &interfaces {
            self.runner
                .execute("ip", &["link", "set", interface.as_str(), "up"])
                .await
                .map_err(|source| HostError::InterfaceUp {
                    interface: interface.clone(),
                    source,
                })?;
            tracing::info!(interface = %interface, "interface is up");
        }
        Ok(interfaces)
    }

    pub async fn ensure_uefi(&self) -> Result<(), HostError> {
        if tokio::fs::metadata(&self.efi_root).await.is_ok() {
            Ok(())
        } else {
            Err(HostError::NotUefi {
                path: self.efi_root.clone(),
            })
        }
    }

    fn list_error(&self, source: std::io::Error) -> HostError {
        HostError::ListInterfaces {
            path: self.net_root.clone(),
            source,
        }
    }
}
