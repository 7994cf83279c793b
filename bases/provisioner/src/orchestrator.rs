//! Provisioning orchestrator
//!
//! Drives the machine through every [`ProvisioningStage`] in order:
//!
//! ```text
//! Preparing -> NetworkUp -> UEFICheck -> DiskWipe -> Registering -> Waiting
//!           -> Installing -> Reporting -> BootingNewKernel (kexec)
//! ```
//!
//! No stage is retried in place. A failed report is recovered by rebooting
//! the machine, which restarts the whole attempt from the boot environment.

use crate::config::{HostPaths, MachineSpec};
use crate::error::{error_chain, InstallError, ProvisionError, Result, StageError};
use crate::host::Host;
use crate::kernel::Kernel;
use crate::stages::StageExecutor;
use crate::watchdog::{Watchdog, AUTO_REBOOT_AFTER};
use control_plane::{
    BootInfo, EventEmitter, Install, InstallationOutcome, InstallationReport, ProvisioningStage,
    Register, Report, WaitForAllocation,
};
use disk_wipe::{discover_disks, SweepReport, WipeEngine, WipeError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

pub const REPORT_FAILURE_PAUSE: Duration = Duration::from_secs(10);

const KEXEC_EVENT_GRACE: Duration = Duration::from_secs(5);

/// The remote and machine-level collaborators of the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub register: Arc<dyn Register>,
    pub wait: Arc<dyn WaitForAllocation>,
    pub install: Arc<dyn Install<Error = InstallError>>,
    pub report: Arc<dyn Report>,
    pub kernel: Arc<dyn Kernel>,
}

/// What to do after the completion report could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFailurePolicy {
    /// Pause, then hard reboot to restart provisioning from scratch
    RebootAfter(Duration),
    /// Pause and carry on with the hand-off
    PauseOnly(Duration),
}

impl ReportFailurePolicy {
    pub fn for_spec(spec: &MachineSpec) -> Self {
        if spec.devmode {
            ReportFailurePolicy::PauseOnly(REPORT_FAILURE_PAUSE)
        } else {
            ReportFailurePolicy::RebootAfter(REPORT_FAILURE_PAUSE)
        }
    }

    pub fn pause(&self) -> Duration {
        match self {
            ReportFailurePolicy::RebootAfter(pause) | ReportFailurePolicy::PauseOnly(pause) => *pause,
        }
    }
}

pub struct Orchestrator {
    spec: Arc<MachineSpec>,
    host: Host,
    wipe: WipeEngine,
    sys_block: PathBuf,
    collaborators: Collaborators,
    executor: StageExecutor,
    policy: ReportFailurePolicy,
    span: tracing::Span,
}

impl Orchestrator {
    pub fn new(
        spec: Arc<MachineSpec>,
        host: Host,
        wipe: WipeEngine,
        collaborators: Collaborators,
        emitter: EventEmitter,
        paths: &HostPaths,
        span: tracing::Span,
    ) -> Self {
        let policy = ReportFailurePolicy::for_spec(&spec);
        Self {
            spec,
            host,
            wipe,
            sys_block: paths.sys_block.clone(),
            collaborators,
            executor: StageExecutor::new(emitter),
            policy,
            span,
        }
    }

    /// Run every stage; returns only if the final hand-off returns
    pub async fn run(&self) -> Result<()> {
        self.pipeline().instrument(self.span.clone()).await
    }

    async fn pipeline(&self) -> Result<()> {
        let executor = &self.executor;
        let c = &self.collaborators;

        tracing::info!(
            machine = %self.spec.machine_uuid,
            control_plane = %self.spec.control_plane_url,
            "🚀 Starting provisioning"
        );

        let _watchdog = Watchdog::arm(
            AUTO_REBOOT_AFTER,
            c.kernel.clone(),
            executor.emitter().clone(),
            tracing::info_span!("watchdog"),
        );

        executor
            .run(ProvisioningStage::Preparing, "starting provisioner", self.host.check_commands())
            .await?;

        executor
            .run(ProvisioningStage::NetworkUp, "all interfaces up", self.host.up_all_interfaces())
            .await?;

        executor
            .run(ProvisioningStage::UEFICheck, "booted in UEFI mode", self.host.ensure_uefi())
            .await?;

        executor
            .run(ProvisioningStage::DiskWipe, "all disks wiped", self.wipe_disks())
            .await?;

        let id = executor
            .run(ProvisioningStage::Registering, "machine registered", c.register.register())
            .await?;

        let allocation = executor
            .run(ProvisioningStage::Waiting, "allocation received", c.wait.wait(&id))
            .await?;

        let installed = executor
            .run(ProvisioningStage::Installing, "installation finished", c.install.install(&allocation))
            .await;

        let (outcome, installed) = match installed {
            Ok(boot_info) => (
                InstallationOutcome::succeeded(self.spec.console_password.clone()),
                Ok(boot_info),
            ),
            Err(e) => {
                tracing::error!("installation failed: {}", error_chain(&e));
                (
                    InstallationOutcome::failed(self.spec.console_password.clone(), failure_reason(&e)),
                    Err(e),
                )
            }
        };

        let report = InstallationReport::from(&outcome);
        if let Err(e) = executor
            .run(ProvisioningStage::Reporting, "installation reported", c.report.report(&report))
            .await
        {
            self.recover_from_report_failure(&e).await;
        }

        let boot_info = installed?;
        self.boot_into(&boot_info).await
    }

    async fn wipe_disks(&self) -> std::result::Result<SweepReport, WipeError> {
        let disks = discover_disks(&self.sys_block).await?;
        self.wipe.sweep(&disks).await
    }

    async fn recover_from_report_failure(&self, error: &ProvisionError) {
        let pause = self.policy.pause();
        tracing::error!(pause = ?pause, "report installation failed: {}", error_chain(error));
        tokio::time::sleep(pause).await;

        if let ReportFailurePolicy::RebootAfter(_) = self.policy {
            if let Err(e) = self.collaborators.kernel.reboot().await {
                tracing::error!("reboot failed: {}", e);
            }
        }
    }

    async fn boot_into(&self, boot_info: &BootInfo) -> Result<()> {
        let executor = &self.executor;
        executor.announce(ProvisioningStage::BootingNewKernel, "booting into distro kernel");
        executor.emitter().flush(KEXEC_EVENT_GRACE).await;

        executor
            .attempt(
                ProvisioningStage::BootingNewKernel,
                self.collaborators.kernel.kexec(boot_info),
            )
            .await
    }
}

/// The installation error as the control plane should see it
fn failure_reason(error: &ProvisionError) -> String {
    match error {
        ProvisionError::Stage {
            source: StageError::Install(e),
            ..
        } => error_chain(e),
        other => error_chain(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devmode;
    use crate::testing::{
        allocation, boot_info, emitter, host_paths_under, spec, FakeInstaller, FakeKernel, FakeRegistrar, FakeReporter,
        FakeWait, RecordingSink,
    };
    use assert_matches::assert_matches;
    use control_plane::{DeliveryTask, EventKind};
    use os_command::fake::{Scripted, ScriptedRunner};
    use tempfile::TempDir;

    struct Harness {
        _sysfs: TempDir,
        runner: Arc<ScriptedRunner>,
        registrar: Arc<FakeRegistrar>,
        wait: Arc<FakeWait>,
        installer: Arc<FakeInstaller>,
        reporter: Arc<FakeReporter>,
        kernel: Arc<FakeKernel>,
        sink: Arc<RecordingSink>,
        emitter: EventEmitter,
        _task: DeliveryTask,
        orchestrator: Orchestrator,
    }

    struct Setup {
        spec: MachineSpec,
        interfaces: bool,
        efi: bool,
        disks: &'static [(&'static str, &'static str)],
        runner: ScriptedRunner,
        register_fails: bool,
        install_fails: bool,
        report_fails: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                spec: spec(false, true, None),
                interfaces: true,
                efi: true,
                disks: &[("sda", "2000")],
                runner: ScriptedRunner::new(),
                register_fails: false,
                install_fails: false,
                report_fails: false,
            }
        }
    }

    impl Setup {
        fn build(self) -> Harness {
            let sysfs = TempDir::new().unwrap();
            let paths = host_paths_under(sysfs.path());
            std::fs::create_dir_all(&paths.sys_class_net).unwrap();
            std::fs::create_dir_all(&paths.sys_block).unwrap();
            if self.interfaces {
                std::fs::create_dir(paths.sys_class_net.join("eth0")).unwrap();
            }
            if self.efi {
                std::fs::create_dir_all(&paths.sys_firmware_efi).unwrap();
            }
            for (name, sectors) in self.disks {
                std::fs::create_dir(paths.sys_block.join(name)).unwrap();
                std::fs::write(paths.sys_block.join(name).join("size"), sectors).unwrap();
            }

            let runner = Arc::new(self.runner);
            let registrar = Arc::new(FakeRegistrar::new(self.register_fails));
            let wait = Arc::new(FakeWait::new(allocation("node-7")));
            let installer = Arc::new(FakeInstaller::new(self.install_fails));
            let reporter = Arc::new(FakeReporter::new(self.report_fails));
            let kernel = Arc::new(FakeKernel::default());
            let (emitter, sink, task) = emitter();

            let spec = Arc::new(self.spec);
            let mut collaborators = Collaborators {
                register: registrar.clone(),
                wait: wait.clone(),
                install: installer.clone(),
                report: reporter.clone(),
                kernel: kernel.clone(),
            };
            if spec.devmode {
                collaborators = devmode::substitute(&spec, collaborators);
            }

            let host = Host::new(runner.clone(), &[], &paths);
            let wipe = WipeEngine::new(runner.clone(), tracing::Span::none());
            let orchestrator = Orchestrator::new(
                spec,
                host,
                wipe,
                collaborators,
                emitter.clone(),
                &paths,
                tracing::Span::none(),
            );

            Harness {
                _sysfs: sysfs,
                runner,
                registrar,
                wait,
                installer,
                reporter,
                kernel,
                sink,
                emitter,
                _task: task,
                orchestrator,
            }
        }
    }

    impl Harness {
        async fn stages_emitted(&self) -> Vec<EventKind> {
            self.emitter.flush(Duration::from_secs(1)).await;
            self.sink.events().iter().map(|e| e.kind).collect()
        }
    }

    #[tokio::test]
    async fn happy_path_runs_every_stage_in_order() {
        let h = Setup::default().build();

        h.orchestrator.run().await.unwrap();

        let expected: Vec<EventKind> = ProvisioningStage::ALL.iter().map(|s| EventKind::Stage(*s)).collect();
        assert_eq!(h.stages_emitted().await, expected);
        assert_eq!(h.wait.waited_for()[0].as_str(), "registered-id");
        assert_eq!(h.installer.installed()[0].hostname, "node-7");
        let reports = h.reporter.reports();
        assert!(reports[0].success);
        assert_eq!(reports[0].console_password, "console-password");
        assert_eq!(h.kernel.kexecs(), vec![boot_info()]);
        assert_eq!(h.kernel.reboots(), 0);
        assert_eq!(h.runner.calls_to("mkfs.ext4").len(), 1);
    }

    #[tokio::test]
    async fn registration_failure_is_fatal_outside_devmode() {
        let h = Setup {
            register_fails: true,
            ..Default::default()
        }
        .build();

        let result = h.orchestrator.run().await;

        assert_matches!(
            result,
            Err(ProvisionError::Stage {
                stage: ProvisioningStage::Registering,
                source: StageError::ControlPlane(_)
            })
        );
        assert!(h.wait.waited_for().is_empty());
        assert!(h.installer.installed().is_empty());
        assert!(h.kernel.kexecs().is_empty());
    }

    #[tokio::test]
    async fn devmode_registration_failure_proceeds_with_dhcp_allocation() {
        let h = Setup {
            spec: spec(true, false, Some("192.168.1.5/24")),
            register_fails: true,
            ..Default::default()
        }
        .build();

        h.orchestrator.run().await.unwrap();

        assert_eq!(h.registrar.calls(), 1);
        let installed = h.installer.installed();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].hostname, "devmode");
        assert_eq!(installed[0].cidr, "dhcp");
        let stages = h.stages_emitted().await;
        assert!(stages.contains(&EventKind::Stage(ProvisioningStage::Waiting)));
        assert!(stages.contains(&EventKind::Stage(ProvisioningStage::Installing)));
    }

    #[tokio::test(start_paused = true)]
    async fn report_failure_reboots_after_pause() {
        let h = Setup {
            report_fails: true,
            ..Default::default()
        }
        .build();
        let started = tokio::time::Instant::now();

        h.orchestrator.run().await.unwrap();

        let reboots = h.kernel.reboot_times();
        assert_eq!(reboots.len(), 1);
        assert!(reboots[0] - started >= REPORT_FAILURE_PAUSE);
        assert_eq!(h.reporter.reports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn report_failure_in_devmode_pauses_without_reboot() {
        let h = Setup {
            spec: spec(true, true, None),
            report_fails: true,
            ..Default::default()
        }
        .build();
        let started = tokio::time::Instant::now();

        h.orchestrator.run().await.unwrap();

        assert!(started.elapsed() >= REPORT_FAILURE_PAUSE);
        assert_eq!(h.kernel.reboots(), 0);
        assert_eq!(h.kernel.kexecs().len(), 1);
    }

    #[tokio::test]
    async fn installation_failure_is_reported_then_fatal() {
        let h = Setup {
            install_fails: true,
            ..Default::default()
        }
        .build();

        let result = h.orchestrator.run().await;

        assert_matches!(
            result,
            Err(ProvisionError::Stage {
                stage: ProvisioningStage::Installing,
                source: StageError::Install(InstallError::NoDisk)
            })
        );
        let reports = h.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].success);
        assert_eq!(reports[0].message.as_deref(), Some("no disk available to install onto"));
        assert!(h.kernel.kexecs().is_empty());
        let stages = h.stages_emitted().await;
        assert!(stages.contains(&EventKind::Stage(ProvisioningStage::Reporting)));
        assert!(!stages.contains(&EventKind::Stage(ProvisioningStage::Installing)));
    }

    #[tokio::test]
    async fn network_failure_is_fatal() {
        let h = Setup {
            interfaces: false,
            ..Default::default()
        }
        .build();

        let result = h.orchestrator.run().await;

        assert_eq!(result.unwrap_err().stage(), ProvisioningStage::NetworkUp);
        assert_eq!(h.registrar.calls(), 0);
    }

    #[tokio::test]
    async fn missing_uefi_is_fatal() {
        let h = Setup {
            efi: false,
            ..Default::default()
        }
        .build();

        let result = h.orchestrator.run().await;

        assert_eq!(result.unwrap_err().stage(), ProvisioningStage::UEFICheck);
        assert!(h.runner.calls_to("mkfs.ext4").is_empty());
    }

    #[tokio::test]
    async fn wipe_failure_on_any_disk_is_fatal_after_the_sweep() {
        let h = Setup {
            disks: &[("sda", "2000"), ("sdb", "2000")],
            runner: ScriptedRunner::new()
                .on_arg("mkfs.ext4", "/dev/sda", Scripted::fail("discard not supported"))
                .on_arg("dd", "of=/dev/sda", Scripted::fail("I/O error")),
            ..Default::default()
        }
        .build();

        let result = h.orchestrator.run().await;

        assert_matches!(
            result,
            Err(ProvisionError::Stage {
                stage: ProvisioningStage::DiskWipe,
                source: StageError::Wipe(WipeError::Incomplete { .. })
            })
        );
        let discards = h.runner.calls_to("mkfs.ext4");
        assert_eq!(discards.len(), 2);
        assert!(discards[1].has_arg("/dev/sdb"));
        assert_eq!(h.registrar.calls(), 0);
    }
}
