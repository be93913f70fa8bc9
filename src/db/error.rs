//! Failure kinds surfaced by the pool factory and connection manager

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// Network-level failure reaching the server.
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Database authentication failed: {0}")]
    Authentication(String),

    #[error("Database provisioning failed: {0}")]
    Provisioning(String),

    #[error("Database health probe failed: {0}")]
    ProbeFailure(String),

    #[error("Database reconnect failed: {0}")]
    ReconnectFailure(String),

    #[error("Connection manager is not initialized")]
    NotInitialized,

    #[error("Connection manager is shut down")]
    Closed,
}

impl DbError {
    /// Whether `initialize` may spend another attempt on this failure.
    /// Provisioning and lifecycle errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Authentication(_) | Self::ProbeFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(DbError::Connection("refused".into()).is_retryable());
        assert!(DbError::Authentication("bad password".into()).is_retryable());
        assert!(!DbError::Provisioning("permission denied".into()).is_retryable());
        assert!(!DbError::Closed.is_retryable());
    }
}
