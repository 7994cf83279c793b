//! Planned reboot when provisioning takes too long

use crate::kernel::Kernel;
use control_plane::{EventEmitter, EventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub const AUTO_REBOOT_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

const EVENT_GRACE: Duration = Duration::from_secs(5);

/// Armed reboot timer; dropping it disarms the timer
pub struct Watchdog {
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub fn arm(
        timeout: Duration,
        kernel: Arc<dyn Kernel>,
        emitter: EventEmitter,
        span: tracing::Span,
    ) -> Self {
        let task = async move {
            tokio::time::sleep(timeout).await;

            let message = format!("autoreboot after {}h", timeout.as_secs() / 3600);
            tracing::warn!("{}", message);
            emitter.emit(EventKind::PlannedReboot, message);
            emitter.flush(EVENT_GRACE).await;

            if let Err(e) = kernel.reboot().await {
                tracing::error!("planned reboot failed: {}", e);
            }
        };

        Self {
            handle: tokio::spawn(task.instrument(span)),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
