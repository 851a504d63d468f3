//! The data-store collaborator, seen from the gateway.
use crate::descriptor::ModelDescriptor;
use crate::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;

/// Parameters as the backend receives them
pub type BackendParams = serde_json::Map<String, Value>;

/// What a backend query returns
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    /// Any JSON document, including a bare `null`
    Json(Value),
    /// An opaque payload such as a raw minidump
    Binary(Vec<u8>),
}

/// Narrow interface to the crash-reporting data store.
///
/// Calls are made once per request with no retries; errors are translated
/// by the caller, never swallowed here.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Answer a read-only model
    async fn get(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<BackendResult, BackendError>;

    /// Perform an action model (POST only)
    async fn act(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<Value, BackendError>;
}
