//! Unified Error Model
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key used for errors that belong to no single field
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Field name → messages, accumulated across every parameter of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("VALIDATION/{} invalid field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("FORBIDDEN/{0}")]
    Forbidden(String),

    #[error("NOT_FOUND/{0}")]
    NotFound(String),

    #[error("METHOD/{method} not allowed, use {allowed}")]
    MethodNotAllowed { method: String, allowed: &'static str },

    #[error("RATE/Too Many Requests")]
    RateLimited,

    #[error("BACKEND/{0}")]
    Backend(String),
}

/// Failures raised by the data-store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{0}")]
    MissingArgument(String),

    #[error("{message}")]
    BadArgument {
        param: Option<String>,
        message: String,
    },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl BackendError {
    pub fn bad_argument(message: impl Into<String>) -> Self {
        BackendError::BadArgument {
            param: None,
            message: message.into(),
        }
    }

    /// Argument-shaped failures are the caller's fault and become a 400
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            BackendError::MissingArgument(_) | BackendError::BadArgument { .. }
        )
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::MissingArgument(name) => {
                GatewayError::Validation(FieldErrors::single(name, "This field is required."))
            }
            BackendError::BadArgument { param, message } => GatewayError::Validation(
                FieldErrors::single(param.unwrap_or_else(|| NON_FIELD_ERRORS.to_string()), message),
            ),
            other => GatewayError::Backend(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("STORE/unavailable: {0}")]
    Unavailable(String),

    #[error("STORE/corrupt entry for {0}")]
    Corrupt(String),
}
