/// error types returned by cache handles and the client registry
///
use std::time::Duration;

/// Failures raised by a cache handle.  Inside benchmark and stress loops every
/// variant other than `Connection` is simply counted as a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The cache service could not be reached, or the handle is closed.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Generic per-operation failure reported by the service.
    #[error("cache fault: {0}")]
    Fault(String),
}

impl CacheError {
    /// true for anything that is counted rather than surfaced inside a run
    pub fn is_fault(&self) -> bool {
        !matches!(self, CacheError::Connection(_))
    }
}

/// Client registry misuse.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("client '{0}' already exists")]
    DuplicateClient(String),

    #[error("client '{0}' not found")]
    ClientNotFound(String),

    #[error("the registry has been disposed")]
    Empty,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classification() {
        assert!(!CacheError::Connection("down".to_string()).is_fault());
        assert!(CacheError::NotFound("k".to_string()).is_fault());
        assert!(CacheError::DuplicateKey("k".to_string()).is_fault());
        assert!(CacheError::Timeout(Duration::from_millis(5)).is_fault());
        assert!(CacheError::Fault("boom".to_string()).is_fault());
    }

    #[test]
    fn messages() {
        let err = RegistryError::DuplicateClient("alpha".to_string());
        assert_eq!(err.to_string(), "client 'alpha' already exists");

        let err: RegistryError = CacheError::Connection("refused".to_string()).into();
        assert_eq!(err.to_string(), "connection error: refused");
    }
}
