//! API-key authorization against the trusted service store.

use std::sync::Arc;

use thiserror::Error;

use crate::rpc::ErrorCode;
use crate::store::{StoreError, TrustedService, TrustedServiceStore};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing api_key")]
    MissingKey,

    #[error("invalid api_key")]
    InvalidKey,

    #[error("service is inactive")]
    Inactive,

    #[error("failed to validate api_key: {0}")]
    Lookup(#[from] StoreError),

    #[error("action '{action}' not allowed for service '{service}'")]
    Forbidden { action: String, service: String },
}

impl AuthError {
    /// Response code reported to the caller
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::Forbidden { .. } => ErrorCode::Forbidden,
            _ => ErrorCode::Unauthorized,
        }
    }
}

pub struct AuthService {
    services: Arc<dyn TrustedServiceStore>,
}

impl AuthService {
    pub fn new(services: Arc<dyn TrustedServiceStore>) -> Self {
        Self { services }
    }

    /// Resolve the active service owning `api_key`
    pub fn validate_api_key(&self, api_key: &str) -> Result<TrustedService, AuthError> {
        if api_key.is_empty() {
            return Err(AuthError::MissingKey);
        }

        let service = self
            .services
            .find_by_api_key(api_key)?
            .ok_or(AuthError::InvalidKey)?;
        if !service.is_active {
            return Err(AuthError::Inactive);
        }
        Ok(service)
    }

    pub fn validate_action(&self, service: &TrustedService, action: &str) -> Result<(), AuthError> {
        if !service.can_perform(action) {
            return Err(AuthError::Forbidden {
                action: action.to_string(),
                service: service.name.clone(),
            });
        }
        Ok(())
    }

    /// Both checks in order: key first, then action
    pub fn authorize(&self, api_key: &str, action: &str) -> Result<TrustedService, AuthError> {
        let service = self.validate_api_key(api_key)?;
        self.validate_action(&service, action)?;
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn auth() -> AuthService {
        let store = MemoryStore::new();
        store
            .add_trusted_service(TrustedService {
                id: String::new(),
                api_key: "reader-key".to_string(),
                name: "reader".to_string(),
                allowed_actions: vec!["api_request".to_string()],
                is_active: true,
            })
            .unwrap();
        AuthService::new(Arc::new(store))
    }

    #[test]
    fn test_missing_key() {
        let err = auth().authorize("", "api_request").unwrap_err();

        assert!(matches!(err, AuthError::MissingKey));
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn test_unknown_key() {
        let err = auth().authorize("nope", "api_request").unwrap_err();

        assert!(matches!(err, AuthError::InvalidKey));
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn test_action_not_allowed() {
        let err = auth().authorize("reader-key", "create_product").unwrap_err();

        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.to_string(), "action 'create_product' not allowed for service 'reader'");
    }

    #[test]
    fn test_authorized() {
        let service = auth().authorize("reader-key", "api_request").unwrap();

        assert_eq!(service.name, "reader");
    }
}
