//! Stage executor
//!
//! Runs one stage's action, attaches the stage to any failure and reports
//! the transition as a progress event once the action succeeded.

use crate::error::{ProvisionError, StageError};
use control_plane::{EventEmitter, ProvisioningStage};
use std::future::Future;

pub struct StageExecutor {
    emitter: EventEmitter,
}

impl StageExecutor {
    pub fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Run `action` and emit `message` for `stage` when it succeeds
    pub async fn run<T, E, F>(
        &self,
        stage: ProvisioningStage,
        message: &str,
        action: F,
    ) -> Result<T, ProvisionError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<StageError>,
    {
        let value = self.attempt(stage, action).await?;
        self.emitter.emit(stage, message);
        Ok(value)
    }

    /// Run `action` with stage context but without a progress event
    ///
    /// For hand-offs that do not come back, where the event has to be
    /// announced up front.
    pub async fn attempt<T, E, F>(&self, stage: ProvisioningStage, action: F) -> Result<T, ProvisionError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<StageError>,
    {
        tracing::info!(stage = %stage, "📍 Stage {}: {}", ordinal(stage), stage);
        action.await.map_err(|e| ProvisionError::Stage {
            stage,
            source: e.into(),
        })
    }

    pub fn announce(&self, stage: ProvisioningStage, message: &str) {
        self.emitter.emit(stage, message);
    }
}

fn ordinal(stage: ProvisioningStage) -> usize {
    ProvisioningStage::ALL
        .iter()
        .position(|s| *s == stage)
        .map(|i| i + 1)
        .unwrap_or(0)
}
