//! Atomic multi-entity writes.
//!
//! Services describe the writes a request needs as a list of [`WriteOp`]s and
//! hand the [`WriteBatch`] to [`WriteBatch::execute`], which runs them in order
//! inside one transaction. The first failure rolls back everything.

use super::{authorization, consent, purpose};
use crate::model::{
    AuthorizationResource, Consent, ConsentAttributes, ConsentPurpose, ConsentPurposeBinding,
    StatusAudit,
};
use crate::status::{AuthorizationStatus, ConsentStatus};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertConsent(Consent),
    UpdateConsent(Consent),
    SetConsentStatus {
        consent_id: String,
        org_id: String,
        status: ConsentStatus,
        updated_time: i64,
    },
    DeleteConsent {
        consent_id: String,
        org_id: String,
    },
    /// Delete-then-insert of the full attribute set.
    ReplaceConsentAttributes {
        consent_id: String,
        org_id: String,
        attributes: ConsentAttributes,
    },
    DeleteConsentAttributes {
        consent_id: String,
        org_id: String,
    },
    AppendStatusAudit(StatusAudit),
    /// Moves the consent from `from` to the audit's status and appends the
    /// audit row. A no-op when another writer already moved it.
    TransitionConsentStatus {
        from: ConsentStatus,
        audit: StatusAudit,
    },
    InsertAuthorization(AuthorizationResource),
    SetAuthorizationStatus {
        auth_id: String,
        org_id: String,
        status: AuthorizationStatus,
        updated_time: i64,
    },
    SetConsentAuthorizationsStatus {
        consent_id: String,
        org_id: String,
        status: AuthorizationStatus,
        updated_time: i64,
    },
    DeleteConsentAuthorizations {
        consent_id: String,
        org_id: String,
    },
    InsertPurpose(ConsentPurpose),
    /// Updates the purpose row and replaces its attribute set.
    UpdatePurpose(ConsentPurpose),
    DeletePurpose {
        purpose_id: String,
        org_id: String,
    },
    InsertPurposeMappings {
        consent_id: String,
        org_id: String,
        bindings: Vec<ConsentPurposeBinding>,
    },
    DeletePurposeMappings {
        consent_id: String,
        org_id: String,
    },
}

impl WriteOp {
    pub fn name(&self) -> &'static str {
        match self {
            WriteOp::InsertConsent(_) => "insert_consent",
            WriteOp::UpdateConsent(_) => "update_consent",
            WriteOp::SetConsentStatus { .. } => "set_consent_status",
            WriteOp::DeleteConsent { .. } => "delete_consent",
            WriteOp::ReplaceConsentAttributes { .. } => "replace_consent_attributes",
            WriteOp::DeleteConsentAttributes { .. } => "delete_consent_attributes",
            WriteOp::AppendStatusAudit(_) => "append_status_audit",
            WriteOp::TransitionConsentStatus { .. } => "transition_consent_status",
            WriteOp::InsertAuthorization(_) => "insert_authorization",
            WriteOp::SetAuthorizationStatus { .. } => "set_authorization_status",
            WriteOp::SetConsentAuthorizationsStatus { .. } => "set_consent_authorizations_status",
            WriteOp::DeleteConsentAuthorizations { .. } => "delete_consent_authorizations",
            WriteOp::InsertPurpose(_) => "insert_purpose",
            WriteOp::UpdatePurpose(_) => "update_purpose",
            WriteOp::DeletePurpose { .. } => "delete_purpose",
            WriteOp::InsertPurposeMappings { .. } => "insert_purpose_mappings",
            WriteOp::DeletePurposeMappings { .. } => "delete_purpose_mappings",
        }
    }

    async fn apply(&self, txn: &DatabaseTransaction) -> Result<(), DbErr> {
        match self {
            WriteOp::InsertConsent(c) => consent::insert_consent(txn, c).await,
            WriteOp::UpdateConsent(c) => consent::update_consent(txn, c).await,
            WriteOp::SetConsentStatus {
                consent_id,
                org_id,
                status,
                updated_time,
            } => {
                consent::update_consent_status(txn, consent_id, org_id, *status, *updated_time)
                    .await
            }
            WriteOp::DeleteConsent { consent_id, org_id } => {
                consent::delete_consent(txn, consent_id, org_id).await?;
                Ok(())
            }
            WriteOp::ReplaceConsentAttributes {
                consent_id,
                org_id,
                attributes,
            } => {
                consent::delete_attributes(txn, consent_id, org_id).await?;
                consent::insert_attributes(txn, consent_id, org_id, attributes).await
            }
            WriteOp::DeleteConsentAttributes { consent_id, org_id } => {
                consent::delete_attributes(txn, consent_id, org_id).await?;
                Ok(())
            }
            WriteOp::AppendStatusAudit(audit) => consent::insert_status_audit(txn, audit).await,
            WriteOp::TransitionConsentStatus { from, audit } => {
                let moved = consent::transition_consent_status(
                    txn,
                    &audit.consent_id,
                    &audit.org_id,
                    *from,
                    audit.current_status,
                    audit.action_time,
                )
                .await?;
                if moved {
                    consent::insert_status_audit(txn, audit).await?;
                }
                Ok(())
            }
            WriteOp::InsertAuthorization(auth) => {
                authorization::insert_authorization(txn, auth).await
            }
            WriteOp::SetAuthorizationStatus {
                auth_id,
                org_id,
                status,
                updated_time,
            } => {
                authorization::update_authorization_status(
                    txn,
                    auth_id,
                    org_id,
                    status,
                    *updated_time,
                )
                .await
            }
            WriteOp::SetConsentAuthorizationsStatus {
                consent_id,
                org_id,
                status,
                updated_time,
            } => {
                authorization::update_statuses_for_consent(
                    txn,
                    consent_id,
                    org_id,
                    status,
                    *updated_time,
                )
                .await?;
                Ok(())
            }
            WriteOp::DeleteConsentAuthorizations { consent_id, org_id } => {
                authorization::delete_for_consent(txn, consent_id, org_id).await?;
                Ok(())
            }
            WriteOp::InsertPurpose(p) => purpose::insert_purpose(txn, p).await,
            WriteOp::UpdatePurpose(p) => {
                purpose::update_purpose(txn, p).await?;
                purpose::delete_attributes(txn, &p.purpose_id, &p.org_id).await?;
                purpose::insert_attributes(txn, &p.purpose_id, &p.org_id, &p.attributes).await
            }
            WriteOp::DeletePurpose { purpose_id, org_id } => {
                purpose::delete_purpose(txn, purpose_id, org_id).await?;
                Ok(())
            }
            WriteOp::InsertPurposeMappings {
                consent_id,
                org_id,
                bindings,
            } => purpose::insert_mappings(txn, consent_id, org_id, bindings).await,
            WriteOp::DeletePurposeMappings { consent_id, org_id } => {
                purpose::delete_mappings_for_consent(txn, consent_id, org_id).await?;
                Ok(())
            }
        }
    }
}

/// The failing operation of a batch that was rolled back.
#[derive(Debug)]
pub struct BatchError {
    pub index: usize,
    pub op: &'static str,
    pub source: DbErr,
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = WriteOp>) -> &mut Self {
        self.ops.extend(ops);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Runs every operation in one transaction. Commits only if all succeed.
    pub async fn execute(self, db: &DatabaseConnection) -> Result<(), BatchError> {
        let txn = db.begin().await.map_err(|source| BatchError {
            index: 0,
            op: "begin",
            source,
        })?;

        for (index, op) in self.ops.iter().enumerate() {
            if let Err(source) = op.apply(&txn).await {
                tracing::error!(
                    op = op.name(),
                    index,
                    error = %source,
                    "Write failed, rolling back transaction"
                );
                if let Err(e) = txn.rollback().await {
                    tracing::error!(error = %e, "Rollback failed");
                }
                return Err(BatchError {
                    index,
                    op: op.name(),
                    source,
                });
            }
        }

        txn.commit().await.map_err(|source| BatchError {
            index: self.ops.len(),
            op: "commit",
            source,
        })
    }
}
