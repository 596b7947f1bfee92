//! consent-mgt - consent lifecycle and purpose management
//!
//! Tracks consents granted by end-users to client applications within a
//! tenant, derives their status from the underlying authorization resources,
//! and manages the purposes those consents are bound to.

pub mod clock;
pub mod entities;
pub mod errors;
pub mod model;
pub mod purpose_types;
pub mod service;
pub mod settings;
pub mod status;
pub mod storage;

pub use errors::ConsentError;
pub use service::{ConsentService, PurposeService};
