use os_command::CommandError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("request to {operation} failed")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} did not succeed: {status} {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("unable to decode {operation} response")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid control plane url {url}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to collect hardware inventory")]
    Inventory(#[source] CommandError),

    #[error("hardware inventory is not valid json")]
    InventoryFormat(#[source] serde_json::Error),
}

impl ControlPlaneError {
    pub fn http(operation: &'static str, source: reqwest::Error) -> Self {
        ControlPlaneError::Http { operation, source }
    }

    /// Worth polling again: gateway/timeout statuses and transport timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            ControlPlaneError::Http { source, .. } => source.is_timeout() || source.is_connect(),
            ControlPlaneError::Status { status, .. } => matches!(status, 408 | 502 | 503 | 504),
            _ => false,
        }
    }
}
