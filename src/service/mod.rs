//! Request orchestration.
//!
//! Services validate input, resolve statuses and purpose references, and turn
//! each request into one [`WriteBatch`](crate::storage::WriteBatch). They are
//! also where raw storage errors are classified into [`ConsentError`].

pub mod consent;
pub mod purpose;

pub use consent::ConsentService;
pub use purpose::PurposeService;

use crate::errors::{ConsentError, FieldError};
use crate::storage::tx::BatchError;

pub(crate) fn require_tenant(org_id: &str) -> Result<(), ConsentError> {
    if org_id.trim().is_empty() {
        return Err(ConsentError::invalid_fields(
            "tenant is required",
            vec![FieldError::new("orgId", "must not be empty")],
        ));
    }
    Ok(())
}

pub(crate) fn batch_failed(context: impl Into<String>, err: BatchError) -> ConsentError {
    ConsentError::from_db(format!("{} ({})", context.into(), err.op), err.source)
}
