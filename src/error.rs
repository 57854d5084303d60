//! Error taxonomy for the analysis-server client.

use std::time::Duration;

/// Failure kinds a caller can distinguish and react to.
///
/// Server-reported `success: false` replies are NOT errors — they arrive
/// as [`crate::types::Reply::Rejected`] because "no symbol under the
/// cursor" is an expected outcome, not a transport failure.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server binary could not be located or spawned. Fatal to the
    /// session; there is nothing to retry.
    #[error("failed to start analysis server `{command}`: {reason}")]
    Startup { command: String, reason: String },

    /// An operation was issued with no live server process.
    #[error("analysis server is not running")]
    NotRunning,

    /// No matching response arrived within the deadline. The caller
    /// treats this as "no data"; the client never retries on its own.
    #[error("no response from analysis server within {0:?}")]
    Timeout(Duration),

    /// The pipe closed or the process died mid-session. The caller
    /// decides whether to `restart()`.
    #[error("analysis server connection lost")]
    ConnectionLost,

    /// A sequence-matched response was structurally invalid (missing
    /// required fields, body of the wrong shape). Fails that call only.
    #[error("malformed response from analysis server: {0}")]
    Protocol(String),

    /// Writing the scoped temp copy of buffer contents failed.
    #[error("failed to stage buffer contents for reload: {0}")]
    ReloadStaging(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ClientError::Startup {
            command: "tsserver".to_string(),
            reason: "not found in PATH".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to start analysis server `tsserver`: not found in PATH"
        );
        assert_eq!(
            ClientError::NotRunning.to_string(),
            "analysis server is not running"
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(20)).to_string(),
            "no response from analysis server within 20s"
        );
    }

    #[test]
    fn test_io_error_converts_to_reload_staging() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ClientError = io.into();
        assert!(matches!(err, ClientError::ReloadStaging(_)));
    }
}
