// bases/provisioner/src/main.rs
use clap::Parser;
use color_eyre::Result;
use control_plane::{EventEmitter, EventKind, HttpControlPlane, HttpRegistrar};
use disk_wipe::WipeEngine;
use os_command::{CommandRunner, SystemRunner, REQUIRED_COMMANDS};
use std::sync::Arc;
use std::time::Duration;

mod config;
mod devmode;
mod error;
mod host;
mod install;
mod kernel;
mod orchestrator;
mod stages;
mod watchdog;

#[cfg(test)]
mod testing;

use config::{HostPaths, KernelCmdline, MachineSpec};
use host::Host;
use install::ImageInstaller;
use kernel::SystemKernel;
use orchestrator::{Collaborators, Orchestrator};

const CRASH_EVENT_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provisioner=info,disk_wipe=info,control_plane=info".into()),
        )
        .init();

    let args = config::CliArgs::parse();
    let cmdline = KernelCmdline::read(config::PROC_CMDLINE);
    let spec = Arc::new(MachineSpec::resolve(args, &cmdline, config::PRODUCT_UUID)?);

    tracing::info!(
        machine = %spec.machine_uuid,
        ip = ?spec.ip,
        bgp = spec.bgp_enabled,
        "provisioner run"
    );
    if spec.devmode {
        tracing::warn!("🔧 DEVMODE: registration failures are ignored and the allocation is synthesized");
    }

    let paths = HostPaths::default();
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let api = HttpControlPlane::new(&spec.control_plane_url, spec.machine_uuid.to_string())?;
    let (emitter, _delivery) = EventEmitter::spawn(Arc::new(api.clone()), tracing::info_span!("events"));

    let mut collaborators = Collaborators {
        register: Arc::new(HttpRegistrar::new(api.clone(), runner.clone())),
        wait: Arc::new(api.clone()),
        install: Arc::new(ImageInstaller::new(runner.clone(), spec.console_password.clone(), &paths)?),
        report: Arc::new(api),
        kernel: Arc::new(SystemKernel::new(runner.clone())),
    };
    if spec.devmode {
        collaborators = devmode::substitute(&spec, collaborators);
    }

    let orchestrator = Orchestrator::new(
        spec.clone(),
        Host::new(runner.clone(), REQUIRED_COMMANDS, &paths),
        WipeEngine::new(runner, tracing::info_span!("disk_wipe")),
        collaborators,
        emitter.clone(),
        &paths,
        tracing::info_span!("orchestrator"),
    );

    if let Err(e) = orchestrator.run().await {
        let chain = error::error_chain(&e);
        tracing::error!(stage = %e.stage(), "💥 provisioning failed: {}", chain);
        emitter.emit(EventKind::Crashed, chain);
        if !emitter.flush(CRASH_EVENT_GRACE).await {
            tracing::warn!("not every event reached the control plane");
        }
        return Err(e.into());
    }

    Ok(())
}
