//! Recording fakes shared by the unit tests

use crate::config::{HostPaths, MachineSpec};
use crate::error::{InstallError, KernelError};
use crate::kernel::Kernel;
use async_trait::async_trait;
use control_plane::{
    BootInfo, ControlPlaneError, DeliveryTask, EventEmitter, EventSink, ImageRef, Install,
    InstallationReport, MachineAllocation, ProgressEvent, Register, RegistrationId, Report,
    WaitForAllocation,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;

pub fn unavailable(operation: &'static str) -> ControlPlaneError {
    ControlPlaneError::Status {
        operation,
        status: 503,
        body: "control plane unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), ControlPlaneError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub fn emitter() -> (EventEmitter, Arc<RecordingSink>, DeliveryTask) {
    let sink = Arc::new(RecordingSink::default());
    let (emitter, task) = EventEmitter::spawn(sink.clone(), tracing::Span::none());
    (emitter, sink, task)
}

#[derive(Default)]
pub struct FakeKernel {
    reboots: Mutex<Vec<Instant>>,
    kexecs: Mutex<Vec<BootInfo>>,
}

impl FakeKernel {
    pub fn reboots(&self) -> usize {
        self.reboots.lock().len()
    }

    /// When each reboot was requested
    pub fn reboot_times(&self) -> Vec<Instant> {
        self.reboots.lock().clone()
    }

    pub fn kexecs(&self) -> Vec<BootInfo> {
        self.kexecs.lock().clone()
    }
}

#[async_trait]
impl Kernel for FakeKernel {
    async fn reboot(&self) -> Result<(), KernelError> {
        self.reboots.lock().push(Instant::now());
        Ok(())
    }

    async fn kexec(&self, boot_info: &BootInfo) -> Result<(), KernelError> {
        self.kexecs.lock().push(boot_info.clone());
        Ok(())
    }
}

pub struct FakeRegistrar {
    pub fail: bool,
    calls: Mutex<usize>,
}

impl FakeRegistrar {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Register for FakeRegistrar {
    async fn register(&self) -> Result<RegistrationId, ControlPlaneError> {
        *self.calls.lock() += 1;
        if self.fail {
            Err(unavailable("register"))
        } else {
            Ok(RegistrationId::new("registered-id"))
        }
    }
}

pub fn allocation(hostname: &str) -> MachineAllocation {
    MachineAllocation {
        hostname: hostname.to_string(),
        ssh_pub_keys: vec!["ssh-ed25519 AAAA".to_string()],
        cidr: "10.1.0.7/24".to_string(),
        image: ImageRef {
            id: "ubuntu-24.04".to_string(),
            url: "http://images/ubuntu.tar.gz".to_string(),
        },
        size_id: "c1-large".to_string(),
        phone_home_token: "token".to_string(),
    }
}

pub struct FakeWait {
    allocation: MachineAllocation,
    waited_for: Mutex<Vec<RegistrationId>>,
}

impl FakeWait {
    pub fn new(allocation: MachineAllocation) -> Self {
        Self {
            allocation,
            waited_for: Mutex::new(Vec::new()),
        }
    }

    pub fn waited_for(&self) -> Vec<RegistrationId> {
        self.waited_for.lock().clone()
    }
}

#[async_trait]
impl WaitForAllocation for FakeWait {
    async fn wait(&self, id: &RegistrationId) -> Result<MachineAllocation, ControlPlaneError> {
        self.waited_for.lock().push(id.clone());
        Ok(self.allocation.clone())
    }
}

pub fn boot_info() -> BootInfo {
    BootInfo {
        kernel: PathBuf::from("/rootfs/boot/vmlinuz"),
        initrd: PathBuf::from("/rootfs/boot/initrd.img"),
        cmdline: "root=LABEL=root".to_string(),
    }
}

pub struct FakeInstaller {
    pub fail: bool,
    installed: Mutex<Vec<MachineAllocation>>,
}

impl FakeInstaller {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            installed: Mutex::new(Vec::new()),
        }
    }

    pub fn installed(&self) -> Vec<MachineAllocation> {
        self.installed.lock().clone()
    }
}

#[async_trait]
impl Install for FakeInstaller {
    type Error = InstallError;

    async fn install(&self, allocation: &MachineAllocation) -> Result<BootInfo, InstallError> {
        self.installed.lock().push(allocation.clone());
        if self.fail {
            Err(InstallError::NoDisk)
        } else {
            Ok(boot_info())
        }
    }
}

pub struct FakeReporter {
    pub fail: bool,
    reports: Mutex<Vec<InstallationReport>>,
}

impl FakeReporter {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn reports(&self) -> Vec<InstallationReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Report for FakeReporter {
    async fn report(&self, report: &InstallationReport) -> Result<(), ControlPlaneError> {
        self.reports.lock().push(report.clone());
        if self.fail {
            Err(unavailable("report"))
        } else {
            Ok(())
        }
    }
}

pub fn spec(devmode: bool, bgp_enabled: bool, cidr: Option<&str>) -> MachineSpec {
    MachineSpec {
        machine_uuid: uuid::Uuid::nil(),
        control_plane_url: "http://cp".to_string(),
        ip: None,
        cidr: cidr.map(str::to_string),
        devmode,
        bgp_enabled,
        image_url: Some("http://images/ubuntu.tar.gz".to_string()),
        image_id: Some("ubuntu".to_string()),
        size_id: Some("c1".to_string()),
        console_password: "console-password".to_string(),
    }
}

/// Host layout rebased below `root`
pub fn host_paths_under(root: &Path) -> HostPaths {
    let defaults = HostPaths::default();
    let rebase = |path: &Path| root.join(path.strip_prefix("/").unwrap_or(path));
    HostPaths {
        sys_block: rebase(&defaults.sys_block),
        sys_class_net: rebase(&defaults.sys_class_net),
        sys_firmware_efi: rebase(&defaults.sys_firmware_efi),
        rootfs: rebase(&defaults.rootfs),
    }
}
