// bases/provisioner/src/config.rs
use crate::error::ConfigError;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PROC_CMDLINE: &str = "/proc/cmdline";
pub const PRODUCT_UUID: &str = "/sys/class/dmi/id/product_uuid";
pub const CONSOLE_PASSWORD_LEN: usize = 16;

/// Host locations the pipeline reads from and installs into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub sys_block: PathBuf,
    pub sys_class_net: PathBuf,
    pub sys_firmware_efi: PathBuf,
    pub rootfs: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            sys_block: PathBuf::from(disk_wipe::SYS_BLOCK),
            sys_class_net: PathBuf::from("/sys/class/net"),
            sys_firmware_efi: PathBuf::from("/sys/firmware/efi"),
            rootfs: PathBuf::from("/rootfs"),
        }
    }
}

/// Everything the pipeline needs to know about this machine
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    pub machine_uuid: Uuid,
    pub control_plane_url: String,
    pub ip: Option<String>,
    pub cidr: Option<String>,
    pub devmode: bool,
    pub bgp_enabled: bool,
    /// Image and size overrides, only consulted in devmode
    pub image_url: Option<String>,
    pub image_id: Option<String>,
    pub size_id: Option<String>,
    pub console_password: String,
}

/// Metal Provisioner - wipes, registers, installs and boots a bare-metal machine
///
/// Every option may also be given as an environment variable or as a
/// KEY=value pair on the kernel command line.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Machine UUID (defaults to the DMI product uuid)
    #[arg(long, env = "MACHINE_UUID")]
    pub machine_uuid: Option<String>,

    /// Base URL of the control plane API
    #[arg(long, env = "CONTROL_PLANE_URL")]
    pub control_plane_url: Option<String>,

    /// IP address used during installation
    #[arg(long, env = "IP")]
    pub ip: Option<String>,

    /// Network configuration in CIDR notation
    #[arg(long, env = "CIDR")]
    pub cidr: Option<String>,

    /// Proceed without a reachable control plane, using synthesized data
    #[arg(long, env = "DEVMODE", value_parser = clap::builder::BoolishValueParser::new())]
    pub devmode: Option<bool>,

    /// Whether the installed machine announces its address via BGP
    #[arg(long, env = "BGP", value_parser = clap::builder::BoolishValueParser::new())]
    pub bgp: Option<bool>,

    /// Image to install in devmode
    #[arg(long, env = "IMAGE_URL")]
    pub image_url: Option<String>,

    #[arg(long, env = "IMAGE_ID")]
    pub image_id: Option<String>,

    #[arg(long, env = "SIZE_ID")]
    pub size_id: Option<String>,
}

/// KEY=value pairs from the kernel command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelCmdline {
    values: HashMap<String, String>,
}

impl KernelCmdline {
    /// Keys are matched case-insensitively; tokens without `=` are ignored
    pub fn parse(cmdline: &str) -> Self {
        let values = cmdline
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .map(|(key, value)| (key.to_ascii_uppercase(), value.trim_matches('"').to_string()))
            .collect();
        Self { values }
    }

    /// Read `/proc/cmdline`; an unreadable file yields no values
    pub fn read(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(cmdline) => Self::parse(&cmdline),
            Err(e) => {
                tracing::debug!("unable to read {}: {}", path.as_ref().display(), e);
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: value.to_string(),
        }),
    }
}

impl MachineSpec {
    /// Resolve flags and env (already merged by clap) over the kernel command line
    pub fn resolve(
        args: CliArgs,
        cmdline: &KernelCmdline,
        product_uuid_path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let fallback = |value: Option<String>, key: &str| -> Option<String> {
            value.or_else(|| cmdline.get(key).map(str::to_string))
        };
        let flag = |value: Option<bool>, key: &'static str| -> Result<bool, ConfigError> {
            match value {
                Some(v) => Ok(v),
                None => cmdline.get(key).map(|v| parse_bool(key, v)).unwrap_or(Ok(false)),
            }
        };

        let machine_uuid = match fallback(args.machine_uuid, "MACHINE_UUID") {
            Some(raw) => parse_uuid(&raw)?,
            None => read_product_uuid(product_uuid_path.as_ref())?,
        };

        let control_plane_url = fallback(args.control_plane_url, "CONTROL_PLANE_URL")
            .ok_or(ConfigError::MissingControlPlaneUrl)?;

        Ok(Self {
            machine_uuid,
            control_plane_url,
            ip: fallback(args.ip, "IP"),
            cidr: fallback(args.cidr, "CIDR"),
            devmode: flag(args.devmode, "DEVMODE")?,
            bgp_enabled: flag(args.bgp, "BGP")?,
            image_url: fallback(args.image_url, "IMAGE_URL"),
            image_id: fallback(args.image_id, "IMAGE_ID"),
            size_id: fallback(args.size_id, "SIZE_ID"),
            console_password: os_command::password::generate(CONSOLE_PASSWORD_LEN),
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, ConfigError> {
    let trimmed = raw.trim();
    Uuid::parse_str(trimmed).map_err(|source| ConfigError::InvalidUuid {
        value: trimmed.to_string(),
        source,
    })
}

fn read_product_uuid(path: &Path) -> Result<Uuid, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadUuid {
        path: path.to_path_buf(),
        source,
    })?;
    parse_uuid(&raw)
}
