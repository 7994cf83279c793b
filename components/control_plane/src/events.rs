//! Progress events and their best-effort delivery
//!
//! [`EventEmitter::emit`] never waits on the network: events are queued in
//! emission order and a single background task delivers them one by one.
//! Delivery failures are logged and the event is dropped.

use crate::collaborators::EventSink;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Provisioning stages in the order they execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvisioningStage {
    Preparing,
    NetworkUp,
    UEFICheck,
    DiskWipe,
    Registering,
    Waiting,
    Installing,
    Reporting,
    BootingNewKernel,
}

impl ProvisioningStage {
    pub const ALL: [ProvisioningStage; 9] = [
        ProvisioningStage::Preparing,
        ProvisioningStage::NetworkUp,
        ProvisioningStage::UEFICheck,
        ProvisioningStage::DiskWipe,
        ProvisioningStage::Registering,
        ProvisioningStage::Waiting,
        ProvisioningStage::Installing,
        ProvisioningStage::Reporting,
        ProvisioningStage::BootingNewKernel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStage::Preparing => "Preparing",
            ProvisioningStage::NetworkUp => "Network up",
            ProvisioningStage::UEFICheck => "UEFI check",
            ProvisioningStage::DiskWipe => "Wiping disks",
            ProvisioningStage::Registering => "Registering",
            ProvisioningStage::Waiting => "Waiting",
            ProvisioningStage::Installing => "Installing",
            ProvisioningStage::Reporting => "Reporting",
            ProvisioningStage::BootingNewKernel => "Booting new kernel",
        }
    }

    pub fn next(&self) -> Option<ProvisioningStage> {
        let index = Self::ALL.iter().position(|stage| stage == self)?;
        Self::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Stage(ProvisioningStage),
    PlannedReboot,
    Crashed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Stage(stage) => write!(f, "{}", stage),
            EventKind::PlannedReboot => write!(f, "Planned Reboot"),
            EventKind::Crashed => write!(f, "Crashed"),
        }
    }
}

impl From<ProvisioningStage> for EventKind {
    fn from(stage: ProvisioningStage) -> Self {
        EventKind::Stage(stage)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: impl Into<EventKind>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            time: Utc::now(),
        }
    }
}

enum Envelope {
    Event(ProgressEvent),
    Flush(oneshot::Sender<()>),
}

/// Cheap, cloneable handle for emitting progress events
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// The background delivery task
pub struct DeliveryTask {
    handle: JoinHandle<()>,
}

impl EventEmitter {
    /// Start the delivery task and return the emitting handle
    pub fn spawn(sink: Arc<dyn EventSink>, span: tracing::Span) -> (EventEmitter, DeliveryTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(deliver(sink, rx).instrument(span));
        (EventEmitter { tx }, DeliveryTask { handle })
    }

    pub fn emit(&self, kind: impl Into<EventKind>, message: impl Into<String>) {
        let event = ProgressEvent::new(kind, message);
        tracing::info!(event = %event.kind, "{}", event.message);
        if self.tx.send(Envelope::Event(event)).is_err() {
            tracing::warn!("event delivery task has stopped, dropping event");
        }
    }

    /// Wait up to `grace` for every event emitted so far to be handled
    ///
    /// Returns false when the grace period ran out first.
    pub async fn flush(&self, grace: Duration) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done_tx)).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(grace, done_rx).await, Ok(Ok(())))
    }
}

impl DeliveryTask {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn deliver(sink: Arc<dyn EventSink>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Event(event) => {
                if let Err(e) = sink.deliver(&event).await {
                    tracing::warn!(event = %event.kind, "unable to deliver event: {}", e);
                }
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
