//! Backend implementations for state storage

mod local;

use std::path::Path;

pub use local::LocalBackend;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};

/// Create a backend from configuration
///
/// Only the local file backend exists; other types are rejected.
pub fn create_backend(
    config: &BackendConfig,
    base_dir: &Path,
) -> BackendResult<Box<dyn StateBackend>> {
    match config.backend_type.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config, base_dir)?)),
        other => Err(BackendError::UnsupportedBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn unsupported_backend() {
        let config = BackendConfig {
            backend_type: "s3".to_string(),
            attributes: HashMap::new(),
        };

        match create_backend(&config, Path::new(".")) {
            Err(BackendError::UnsupportedBackend(name)) => assert_eq!(name, "s3"),
            Err(e) => panic!("Expected UnsupportedBackend, got {}", e),
            Ok(_) => panic!("Expected UnsupportedBackend error"),
        }
    }

    #[test]
    fn local_backend_location() {
        let backend = create_backend(&BackendConfig::local(), Path::new("/tmp/x")).unwrap();
        assert_eq!(backend.location(), "/tmp/x/keel.state.json");
    }
}
