use thiserror::Error;

/// Errors that abort an inbound sync event before any remote call is made.
///
/// Remote failures are deliberately NOT part of this enum: once an event is
/// validated, per-room remote failures are recorded in the [`SyncReport`]
/// instead of aborting the event (see `sync::orchestrator`).
///
/// [`SyncReport`]: crate::sync::orchestrator::SyncReport
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or malformed input — the caller's fault (HTTP 400).
    #[error("{0}")]
    Validation(String),

    /// Shared secret missing the mark (HTTP 403).
    #[error("{0}")]
    Authorization(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }
}

/// A failed call against the Synapse admin API.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    /// The homeserver answered with a non-2xx status.
    /// Carries the raw body for diagnostics.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect error, timeout).
    #[error("request to homeserver failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RemoteCallError {
    /// The JSON `error` field of a non-2xx response body, if present.
    /// Synapse encodes machine-readable failure detail there.
    pub fn remote_error_message(&self) -> Option<String> {
        match self {
            Self::Status { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from)),
            Self::Transport(_) => None,
        }
    }
}
