//! Crash-stats policy: who may call what, and what they get to see.
//!
//! ```text
//! Caller ─► authorize_model ─► authorize_params ─► filter_restricted_params
//!                                                            │
//!                                                         backend
//!                                                            │
//!           response ◄─ redact (drop / scrub) ◄──────────────┘
//! ```
//!
//! Every decision is driven by the [`ModelDescriptor`](crashstats_core::ModelDescriptor)
//! record; nothing here knows individual model names.

pub mod gate;
pub mod redaction;
pub mod scrub;
pub mod verdict;

pub use gate::{
    authorize, authorize_model, authorize_params, filter_restricted_params, hidden_fields,
    unselectable_fields,
};
pub use redaction::{redact, FieldRedaction};
pub use scrub::scrub_text;
pub use verdict::Verdict;
