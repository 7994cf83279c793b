//! reqwest-backed collaborators talking to the control plane REST API

use crate::collaborators::{EventSink, Register, Report, WaitForAllocation};
use crate::error::ControlPlaneError;
use crate::events::ProgressEvent;
use crate::inventory;
use crate::types::{InstallationReport, MachineAllocation, RegistrationId};
use async_trait::async_trait;
use os_command::CommandRunner;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// REST client for one machine
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base: Url,
    machine_id: String,
    poll_interval: Duration,
}

impl HttpControlPlane {
    pub fn new(base: &str, machine_id: impl Into<String>) -> Result<Self, ControlPlaneError> {
        let base = Url::parse(base).map_err(|source| ControlPlaneError::Url {
            url: base.to_string(),
            source,
        })?;
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ControlPlaneError::http("build client", e))?;

        Ok(Self {
            client,
            base,
            machine_id: machine_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Delay between allocation polls after a transient failure
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn endpoint(&self, id: &str, action: &str) -> String {
        format!(
            "{}/machine/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            id,
            action
        )
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        operation: &'static str,
        url: String,
        body: &T,
    ) -> Result<(StatusCode, String), ControlPlaneError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ControlPlaneError::http(operation, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ControlPlaneError::http(operation, e))?;

        if status.as_u16() >= 400 {
            return Err(ControlPlaneError::Status {
                operation,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok((status, text))
    }

    /// POST the inventory; 200 means already known, 201 newly registered
    pub async fn register_inventory(
        &self,
        inventory: &serde_json::Value,
    ) -> Result<RegistrationId, ControlPlaneError> {
        let url = self.endpoint(&self.machine_id, "register");
        let (status, body) = self.post_json("register", url, inventory).await?;

        #[derive(Deserialize)]
        struct Registered {
            id: Option<String>,
        }

        let reported = serde_json::from_str::<Registered>(&body)
            .ok()
            .and_then(|r| r.id)
            .unwrap_or_else(|| "unknown".to_string());

        match status {
            StatusCode::OK => tracing::info!(uuid = %reported, "machine already registered"),
            StatusCode::CREATED => tracing::info!(uuid = %reported, "machine registered"),
            other => tracing::info!(uuid = %reported, status = %other, "registration accepted"),
        }

        if reported == "unknown" {
            Ok(RegistrationId::new(self.machine_id.clone()))
        } else {
            Ok(RegistrationId::new(reported))
        }
    }

    async fn poll_allocation(&self, id: &RegistrationId) -> Result<MachineAllocation, ControlPlaneError> {
        let response = self
            .client
            .get(self.endpoint(id.as_str(), "wait"))
            .timeout(WAIT_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ControlPlaneError::http("wait", e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ControlPlaneError::http("wait", e))?;

        if !status.is_success() {
            return Err(ControlPlaneError::Status {
                operation: "wait",
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|source| ControlPlaneError::Decode {
            operation: "wait",
            source,
        })
    }
}

#[async_trait]
impl WaitForAllocation for HttpControlPlane {
    /// Long-poll until allocated; transient failures are retried forever
    async fn wait(&self, id: &RegistrationId) -> Result<MachineAllocation, ControlPlaneError> {
        tracing::info!(id = %id, "waiting for allocation");
        loop {
            match self.poll_allocation(id).await {
                Ok(allocation) => {
                    tracing::info!(hostname = %allocation.hostname, image = %allocation.image.id, "machine allocated");
                    return Ok(allocation);
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!("no allocation yet: {}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Report for HttpControlPlane {
    async fn report(&self, report: &InstallationReport) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&self.machine_id, "report");
        self.post_json("report", url, report).await?;
        tracing::info!(success = report.success, "report image installation was successful");
        Ok(())
    }
}

#[async_trait]
impl EventSink for HttpControlPlane {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&self.machine_id, "event");
        self.post_json("event", url, event).await?;
        Ok(())
    }
}

/// Collects the hardware inventory and registers it
pub struct HttpRegistrar {
    api: HttpControlPlane,
    runner: Arc<dyn CommandRunner>,
}

impl HttpRegistrar {
    pub fn new(api: HttpControlPlane, runner: Arc<dyn CommandRunner>) -> Self {
        Self { api, runner }
    }
}

#[async_trait]
impl Register for HttpRegistrar {
    async fn register(&self) -> Result<RegistrationId, ControlPlaneError> {
        let inventory = inventory::collect(self.runner.as_ref()).await?;
        self.api.register_inventory(&inventory).await
    }
}
