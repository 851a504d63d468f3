//! Crash-stats gateway core: the vocabulary every other crate speaks.
//!
//! The gateway sits in front of a crash-reporting data store and exposes a
//! family of named "models" over HTTP. This crate holds the pieces that are
//! independent of HTTP and of the concrete model catalogue:
//!
//! - [`Permission`] / [`PermissionSet`] and the polymorphic [`Caller`]
//! - [`ParamSpec`] declarations and the collecting [`validate`] step
//! - [`ModelDescriptor`], the data record the dispatcher interprets
//! - [`ModelBackend`], the narrow interface to the data store
//! - [`SharedStore`], the injected counter/cache store
//! - [`GatewayError`], the error taxonomy surfaced to callers

pub mod backend;
pub mod caller;
pub mod descriptor;
pub mod error;
pub mod params;
pub mod permission;
pub mod store;

pub use backend::{BackendParams, BackendResult, ModelBackend};
pub use caller::{Caller, TokenGrant, UserAccount};
pub use descriptor::{
    BinaryAttachment, ModelDescriptor, ModelKind, ParamGate, RedactionAction, RedactionRule,
};
pub use error::{BackendError, FieldErrors, GatewayError, StoreError};
pub use params::{
    validate, ParamDefault, ParamKind, ParamMap, ParamSpec, ParamValue, RawParams,
    ValidationContext,
};
pub use permission::{Permission, PermissionSet};
pub use store::{InMemoryStore, SharedStore};

/// Version reported by the documentation and health endpoints
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
