use super::{batch_failed, require_tenant};
use crate::clock::{self, Clock, SystemClock};
use crate::errors::{ConsentError, DbResultExt, FieldError};
use crate::model::{
    AuthorizationRequest, AuthorizationResource, Consent, ConsentCreateRequest, ConsentDetail,
    ConsentPurposeBinding, ConsentSearchFilter, ConsentUpdateRequest, ConsentValidation, Page,
    PurposeBindingRequest, StatusAudit,
};
use crate::settings::Pagination;
use crate::status::{
    check_expiry, AuthorizationStatus, ConsentStatus, ExpiryCheck, ExtensionRequest, StatusEngine,
    SYSTEM_ACTOR,
};
use crate::storage::{self, authorization, consent, purpose, WriteBatch, WriteOp};
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const REASON_CREATED: &str = "initial creation";
const REASON_UPDATED: &str = "consent updated";
const REASON_EXPIRED: &str = "validity time elapsed";
const REASON_AUTHORIZATION: &str = "authorization status changed";

pub const CODE_NOT_FOUND: &str = "consent_not_found";
pub const CODE_EXPIRED: &str = "consent_expired";
pub const CODE_NOT_ACTIVE: &str = "consent_not_active";
pub const CODE_USER_NOT_AUTHORIZED: &str = "user_not_authorized";

#[derive(Clone)]
pub struct ConsentService {
    db: DatabaseConnection,
    engine: StatusEngine,
    clock: Arc<dyn Clock>,
    pagination: Pagination,
}

impl std::fmt::Debug for ConsentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentService")
            .field("engine", &self.engine)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl ConsentService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            engine: StatusEngine::new(),
            clock: Arc::new(SystemClock),
            pagination: Pagination::default(),
        }
    }

    pub fn with_engine(mut self, engine: StatusEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    // ========================================================================
    // Create / read
    // ========================================================================

    pub async fn create(
        &self,
        request: ConsentCreateRequest,
        client_id: &str,
        org_id: &str,
    ) -> Result<ConsentDetail, ConsentError> {
        require_tenant(org_id)?;

        let mut errors = Vec::new();
        if client_id.trim().is_empty() {
            errors.push(FieldError::new("clientId", "must not be empty"));
        }
        if request.consent_type.trim().is_empty() {
            errors.push(FieldError::new("consentType", "must not be empty"));
        }
        check_non_negative(
            &mut errors,
            request.frequency,
            request.validity_time,
            request.data_access_validity_duration,
        );
        check_authorizations(&mut errors, &request.authorizations);
        check_bindings(&mut errors, &request.purposes);
        if !errors.is_empty() {
            return Err(ConsentError::invalid_fields("invalid consent request", errors));
        }

        let consent_id = storage::new_id();
        let statuses = parse_statuses(&request.authorizations);
        let status = self
            .engine
            .resolve(
                &statuses,
                ExtensionRequest {
                    org_id: org_id.to_string(),
                    consent_id: None,
                    consent_type: request.consent_type.clone(),
                    prior_status: None,
                    authorization_statuses: raw_statuses(&statuses),
                },
            )
            .await?;
        let bindings = self.resolve_bindings(org_id, &request.purposes).await?;

        let now = self.clock.now_millis();
        let consent = Consent {
            consent_id: consent_id.clone(),
            org_id: org_id.to_string(),
            client_id: client_id.to_string(),
            consent_type: request.consent_type,
            status,
            frequency: request.frequency,
            validity_time: request.validity_time,
            recurring_indicator: request.recurring_indicator,
            data_access_validity_duration: request.data_access_validity_duration,
            receipt: request.receipt,
            created_time: now,
            updated_time: now,
        };
        let authorizations = build_authorizations(
            &consent_id,
            org_id,
            request.authorizations,
            &statuses,
            now,
        );

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::InsertConsent(consent.clone()))
            .push(WriteOp::AppendStatusAudit(audit(
                &consent,
                None,
                Some(client_id),
                REASON_CREATED,
                now,
            )));
        if !request.attributes.is_empty() {
            batch.push(WriteOp::ReplaceConsentAttributes {
                consent_id: consent_id.clone(),
                org_id: org_id.to_string(),
                attributes: request.attributes.clone(),
            });
        }
        batch.extend(
            authorizations
                .iter()
                .cloned()
                .map(WriteOp::InsertAuthorization),
        );
        if !bindings.is_empty() {
            batch.push(WriteOp::InsertPurposeMappings {
                consent_id: consent_id.clone(),
                org_id: org_id.to_string(),
                bindings: bindings.clone(),
            });
        }
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("creating consent {consent_id}"), e))?;

        info!(
            consent_id = %consent_id,
            org_id,
            client_id,
            status = %status,
            "Created consent"
        );

        let validity_elapsed = clock::validity_elapsed(consent.validity_time, now);
        Ok(ConsentDetail {
            consent,
            attributes: request.attributes,
            authorizations,
            purposes: bindings,
            validity_elapsed,
        })
    }

    /// Loads a consent with everything it owns. An active consent past its
    /// validity time is moved to `Expired` on the way.
    pub async fn get(&self, consent_id: &str, org_id: &str) -> Result<ConsentDetail, ConsentError> {
        require_tenant(org_id)?;
        let mut consent = self.load(consent_id, org_id).await?;
        self.expire_if_elapsed(&mut consent).await?;
        self.detail(consent).await
    }

    /// Paginated search. Empty filter lists match everything.
    pub async fn search(
        &self,
        filter: &ConsentSearchFilter,
        org_id: &str,
    ) -> Result<Page<Consent>, ConsentError> {
        require_tenant(org_id)?;
        let (limit, offset) = self.pagination.window(filter.limit, filter.offset);
        let (items, total) = consent::list_consents(&self.db, org_id, filter, limit, offset)
            .await
            .context(|| format!("searching consents in {org_id}"))?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Ids of consents carrying attribute `key` (with `value`, when given).
    pub async fn search_by_attribute(
        &self,
        key: &str,
        value: Option<&str>,
        org_id: &str,
    ) -> Result<Vec<String>, ConsentError> {
        require_tenant(org_id)?;
        if key.trim().is_empty() {
            return Err(ConsentError::invalid_fields(
                "attribute key is required",
                vec![FieldError::new("key", "must not be empty")],
            ));
        }
        consent::find_consent_ids_by_attribute(&self.db, org_id, key, value)
            .await
            .context(|| format!("searching consents by attribute `{key}`"))
    }

    /// Status transitions recorded for a consent, oldest first.
    pub async fn status_history(
        &self,
        consent_id: &str,
        org_id: &str,
    ) -> Result<Vec<StatusAudit>, ConsentError> {
        require_tenant(org_id)?;
        let audits = consent::get_status_audits(&self.db, consent_id, org_id)
            .await
            .context(|| format!("loading status history of consent {consent_id}"))?;
        if audits.is_empty() {
            return Err(not_found(consent_id));
        }
        Ok(audits)
    }

    // ========================================================================
    // Lifecycle changes
    // ========================================================================

    pub async fn update(
        &self,
        consent_id: &str,
        org_id: &str,
        request: ConsentUpdateRequest,
    ) -> Result<ConsentDetail, ConsentError> {
        require_tenant(org_id)?;

        let mut errors = Vec::new();
        if matches!(&request.consent_type, Some(t) if t.trim().is_empty()) {
            errors.push(FieldError::new("consentType", "must not be empty"));
        }
        check_non_negative(
            &mut errors,
            request.frequency,
            request.validity_time,
            request.data_access_validity_duration,
        );
        if let Some(auths) = &request.authorizations {
            check_authorizations(&mut errors, auths);
        }
        if let Some(bindings) = &request.purposes {
            check_bindings(&mut errors, bindings);
        }
        if !errors.is_empty() {
            return Err(ConsentError::invalid_fields("invalid consent update", errors));
        }

        let existing = self.load(consent_id, org_id).await?;
        let now = self.clock.now_millis();

        // An update cannot un-expire the stored record.
        let stored_expired = existing.status == ConsentStatus::Expired
            || check_expiry(existing.status, existing.validity_time, now) == ExpiryCheck::Expire;

        let supplied_statuses = request.authorizations.as_deref().map(parse_statuses);
        let derived = if stored_expired {
            ConsentStatus::Expired
        } else if let Some(statuses) = &supplied_statuses {
            self.engine
                .resolve(
                    statuses,
                    ExtensionRequest {
                        org_id: org_id.to_string(),
                        consent_id: Some(consent_id.to_string()),
                        consent_type: request
                            .consent_type
                            .clone()
                            .unwrap_or_else(|| existing.consent_type.clone()),
                        prior_status: Some(existing.status),
                        authorization_statuses: raw_statuses(statuses),
                    },
                )
                .await?
        } else {
            existing.status
        };

        // The status about to be persisted gets the same expiry check as a read.
        let validity_time = request.validity_time.or(existing.validity_time);
        let expired =
            stored_expired || check_expiry(derived, validity_time, now) == ExpiryCheck::Expire;
        let status = if expired {
            ConsentStatus::Expired
        } else {
            derived
        };
        debug!(consent_id, org_id, from = %existing.status, to = %status, expired, "Derived status for update");

        let bindings = match &request.purposes {
            Some(requested) => Some(self.resolve_bindings(org_id, requested).await?),
            None => None,
        };

        let updated = Consent {
            consent_id: existing.consent_id.clone(),
            org_id: existing.org_id.clone(),
            client_id: existing.client_id.clone(),
            consent_type: request
                .consent_type
                .unwrap_or_else(|| existing.consent_type.clone()),
            status,
            frequency: request.frequency.or(existing.frequency),
            validity_time,
            recurring_indicator: request.recurring_indicator.or(existing.recurring_indicator),
            data_access_validity_duration: request
                .data_access_validity_duration
                .or(existing.data_access_validity_duration),
            receipt: request.receipt.or_else(|| existing.receipt.clone()),
            created_time: existing.created_time,
            updated_time: now,
        };

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateConsent(updated.clone()));
        if let Some(attributes) = request.attributes {
            batch.push(WriteOp::ReplaceConsentAttributes {
                consent_id: consent_id.to_string(),
                org_id: org_id.to_string(),
                attributes,
            });
        }
        if let (Some(requested), Some(statuses)) = (request.authorizations, supplied_statuses) {
            let statuses = if expired {
                vec![AuthorizationStatus::SystemExpired; statuses.len()]
            } else {
                statuses
            };
            batch.push(WriteOp::DeleteConsentAuthorizations {
                consent_id: consent_id.to_string(),
                org_id: org_id.to_string(),
            });
            batch.extend(
                build_authorizations(consent_id, org_id, requested, &statuses, now)
                    .into_iter()
                    .map(WriteOp::InsertAuthorization),
            );
        } else if expired {
            batch.push(WriteOp::SetConsentAuthorizationsStatus {
                consent_id: consent_id.to_string(),
                org_id: org_id.to_string(),
                status: AuthorizationStatus::SystemExpired,
                updated_time: now,
            });
        }
        if let Some(bindings) = bindings {
            batch.push(WriteOp::DeletePurposeMappings {
                consent_id: consent_id.to_string(),
                org_id: org_id.to_string(),
            });
            if !bindings.is_empty() {
                batch.push(WriteOp::InsertPurposeMappings {
                    consent_id: consent_id.to_string(),
                    org_id: org_id.to_string(),
                    bindings,
                });
            }
        }
        if status != existing.status {
            let (actor, reason) = if expired {
                (Some(SYSTEM_ACTOR), REASON_EXPIRED)
            } else {
                (
                    request.actor.as_deref(),
                    request.reason.as_deref().unwrap_or(REASON_UPDATED),
                )
            };
            batch.push(WriteOp::AppendStatusAudit(audit(
                &updated,
                Some(existing.status),
                actor,
                reason,
                now,
            )));
        }

        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("updating consent {consent_id}"), e))?;

        info!(consent_id, org_id, status = %status, "Updated consent");
        self.detail(updated).await
    }

    /// Moves a consent to `Revoked` and marks its authorizations system-revoked.
    pub async fn revoke(
        &self,
        consent_id: &str,
        org_id: &str,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> Result<ConsentDetail, ConsentError> {
        require_tenant(org_id)?;
        let consent = self.load(consent_id, org_id).await?;
        if consent.status == ConsentStatus::Revoked {
            return Err(ConsentError::validation(format!(
                "consent {consent_id} is already revoked"
            )));
        }
        let revoked = self
            .transition(
                consent,
                ConsentStatus::Revoked,
                AuthorizationStatus::SystemRevoked,
                actor,
                reason.unwrap_or("revoked"),
            )
            .await?;
        info!(consent_id, org_id, actor = ?actor, "Revoked consent");
        self.detail(revoked).await
    }

    /// Explicitly expires a consent that is not yet in a terminal status.
    pub async fn expire(
        &self,
        consent_id: &str,
        org_id: &str,
        actor: Option<&str>,
    ) -> Result<ConsentDetail, ConsentError> {
        require_tenant(org_id)?;
        let consent = self.load(consent_id, org_id).await?;
        if consent.status.is_terminal() {
            return Err(ConsentError::validation(format!(
                "consent {consent_id} is already {}",
                consent.status
            )));
        }
        let expired = self
            .transition(
                consent,
                ConsentStatus::Expired,
                AuthorizationStatus::SystemExpired,
                actor.or(Some(SYSTEM_ACTOR)),
                "expired",
            )
            .await?;
        info!(consent_id, org_id, "Expired consent");
        self.detail(expired).await
    }

    /// Removes a consent with its attributes, authorizations and purpose
    /// bindings. Status history is kept.
    pub async fn delete(&self, consent_id: &str, org_id: &str) -> Result<(), ConsentError> {
        require_tenant(org_id)?;
        let exists = consent::consent_exists(&self.db, consent_id, org_id)
            .await
            .context(|| format!("checking consent {consent_id}"))?;
        if !exists {
            return Err(not_found(consent_id));
        }

        let id = consent_id.to_string();
        let org = org_id.to_string();
        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::DeleteConsentAttributes {
                consent_id: id.clone(),
                org_id: org.clone(),
            })
            .push(WriteOp::DeleteConsentAuthorizations {
                consent_id: id.clone(),
                org_id: org.clone(),
            })
            .push(WriteOp::DeletePurposeMappings {
                consent_id: id.clone(),
                org_id: org.clone(),
            })
            .push(WriteOp::DeleteConsent {
                consent_id: id,
                org_id: org,
            });
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("deleting consent {consent_id}"), e))?;

        info!(consent_id, org_id, "Deleted consent");
        Ok(())
    }

    // ========================================================================
    // Authorization resources
    // ========================================================================

    pub async fn get_authorization(
        &self,
        auth_id: &str,
        org_id: &str,
    ) -> Result<AuthorizationResource, ConsentError> {
        require_tenant(org_id)?;
        authorization::get_authorization(&self.db, auth_id, org_id)
            .await
            .context(|| format!("loading authorization {auth_id}"))?
            .ok_or_else(|| ConsentError::NotFound(format!("authorization {auth_id}")))
    }

    pub async fn list_authorizations(
        &self,
        consent_id: &str,
        org_id: &str,
    ) -> Result<Vec<AuthorizationResource>, ConsentError> {
        require_tenant(org_id)?;
        let exists = consent::consent_exists(&self.db, consent_id, org_id)
            .await
            .context(|| format!("checking consent {consent_id}"))?;
        if !exists {
            return Err(not_found(consent_id));
        }
        authorization::list_authorizations(&self.db, consent_id, org_id)
            .await
            .context(|| format!("listing authorizations of consent {consent_id}"))
    }

    /// Adds an authorization resource and re-derives the consent status.
    pub async fn add_authorization(
        &self,
        consent_id: &str,
        org_id: &str,
        request: AuthorizationRequest,
        actor: Option<&str>,
    ) -> Result<AuthorizationResource, ConsentError> {
        require_tenant(org_id)?;
        let mut errors = Vec::new();
        check_authorizations(&mut errors, std::slice::from_ref(&request));
        if !errors.is_empty() {
            return Err(ConsentError::invalid_fields("invalid authorization", errors));
        }

        let consent = self.load_mutable(consent_id, org_id).await?;
        let mut current = authorization::list_authorizations(&self.db, consent_id, org_id)
            .await
            .context(|| format!("listing authorizations of consent {consent_id}"))?;

        let now = self.clock.now_millis();
        let status = AuthorizationStatus::parse(&request.status);
        let created = build_authorizations(
            consent_id,
            org_id,
            vec![request],
            std::slice::from_ref(&status),
            now,
        )
        .remove(0);
        current.push(created.clone());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertAuthorization(created.clone()));
        self.rederive(&consent, &current, actor, now, &mut batch)
            .await?;
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("adding authorization to consent {consent_id}"), e))?;

        info!(consent_id, org_id, auth_id = %created.auth_id, status = %status, "Added authorization");
        Ok(created)
    }

    /// Changes one authorization's state and re-derives the consent status.
    pub async fn update_authorization_status(
        &self,
        auth_id: &str,
        org_id: &str,
        status: &str,
        actor: Option<&str>,
    ) -> Result<AuthorizationResource, ConsentError> {
        require_tenant(org_id)?;
        let mut auth = self.get_authorization(auth_id, org_id).await?;
        let consent = self.load_mutable(&auth.consent_id, org_id).await?;
        let mut current = authorization::list_authorizations(&self.db, &consent.consent_id, org_id)
            .await
            .context(|| format!("listing authorizations of consent {}", consent.consent_id))?;

        let now = self.clock.now_millis();
        auth.status = AuthorizationStatus::parse(status);
        auth.updated_time = now;
        for a in current.iter_mut().filter(|a| a.auth_id == auth.auth_id) {
            *a = auth.clone();
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetAuthorizationStatus {
            auth_id: auth.auth_id.clone(),
            org_id: org_id.to_string(),
            status: auth.status.clone(),
            updated_time: now,
        });
        self.rederive(&consent, &current, actor, now, &mut batch)
            .await?;
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("updating authorization {auth_id}"), e))?;

        info!(auth_id, org_id, consent_id = %consent.consent_id, status = %auth.status, "Updated authorization status");
        Ok(auth)
    }

    // ========================================================================
    // Validation for downstream authorization checks
    // ========================================================================

    /// Whether a consent may be used right now, optionally on behalf of `user_id`.
    /// Negative outcomes are returned as data, not errors.
    pub async fn validate(
        &self,
        consent_id: &str,
        user_id: Option<&str>,
        org_id: &str,
    ) -> Result<ConsentValidation, ConsentError> {
        require_tenant(org_id)?;
        let mut consent = match consent::get_consent(&self.db, consent_id, org_id)
            .await
            .context(|| format!("loading consent {consent_id}"))?
        {
            Some(c) => c,
            None => {
                return Ok(ConsentValidation::invalid(
                    CODE_NOT_FOUND,
                    format!("consent {consent_id} not found"),
                    None,
                ))
            }
        };
        self.expire_if_elapsed(&mut consent).await?;
        let detail = self.detail(consent).await?;
        let status = detail.consent.status;

        if status == ConsentStatus::Expired || detail.validity_elapsed {
            return Ok(ConsentValidation::invalid(
                CODE_EXPIRED,
                "consent has expired",
                Some(detail),
            ));
        }
        if status != ConsentStatus::Active {
            return Ok(ConsentValidation::invalid(
                CODE_NOT_ACTIVE,
                format!("consent is {status}"),
                Some(detail),
            ));
        }
        if let Some(user) = user_id.filter(|u| !u.is_empty()) {
            let authorized = detail
                .authorizations
                .iter()
                .any(|a| a.user_id.as_deref() == Some(user));
            if !authorized {
                return Ok(ConsentValidation::invalid(
                    CODE_USER_NOT_AUTHORIZED,
                    format!("user {user} holds no authorization on this consent"),
                    Some(detail),
                ));
            }
        }
        Ok(ConsentValidation::valid(detail))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load(&self, consent_id: &str, org_id: &str) -> Result<Consent, ConsentError> {
        consent::get_consent(&self.db, consent_id, org_id)
            .await
            .context(|| format!("loading consent {consent_id}"))?
            .ok_or_else(|| not_found(consent_id))
    }

    /// Loads a consent that authorization changes may still apply to.
    async fn load_mutable(&self, consent_id: &str, org_id: &str) -> Result<Consent, ConsentError> {
        let mut consent = self.load(consent_id, org_id).await?;
        self.expire_if_elapsed(&mut consent).await?;
        if consent.status.is_terminal() {
            return Err(ConsentError::validation(format!(
                "consent {consent_id} is {} and can no longer change",
                consent.status
            )));
        }
        Ok(consent)
    }

    /// Persists the `Active` to `Expired` transition when validity has passed.
    async fn expire_if_elapsed(&self, consent: &mut Consent) -> Result<(), ConsentError> {
        let now = self.clock.now_millis();
        if check_expiry(consent.status, consent.validity_time, now) != ExpiryCheck::Expire {
            return Ok(());
        }

        let previous = consent.status;
        consent.status = ConsentStatus::Expired;
        consent.updated_time = now;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::TransitionConsentStatus {
            from: previous,
            audit: audit(
                consent,
                Some(previous),
                Some(SYSTEM_ACTOR),
                REASON_EXPIRED,
                now,
            ),
        });
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("expiring consent {}", consent.consent_id), e))?;

        info!(
            consent_id = %consent.consent_id,
            org_id = %consent.org_id,
            "Consent validity elapsed, marked expired"
        );
        Ok(())
    }

    async fn transition(
        &self,
        mut consent: Consent,
        to: ConsentStatus,
        auth_status: AuthorizationStatus,
        actor: Option<&str>,
        reason: &str,
    ) -> Result<Consent, ConsentError> {
        let now = self.clock.now_millis();
        let previous = consent.status;
        consent.status = to;
        consent.updated_time = now;

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::SetConsentStatus {
                consent_id: consent.consent_id.clone(),
                org_id: consent.org_id.clone(),
                status: to,
                updated_time: now,
            })
            .push(WriteOp::SetConsentAuthorizationsStatus {
                consent_id: consent.consent_id.clone(),
                org_id: consent.org_id.clone(),
                status: auth_status,
                updated_time: now,
            })
            .push(WriteOp::AppendStatusAudit(audit(
                &consent,
                Some(previous),
                actor,
                reason,
                now,
            )));
        batch.execute(&self.db).await.map_err(|e| {
            batch_failed(
                format!("moving consent {} to {to}", consent.consent_id),
                e,
            )
        })?;
        Ok(consent)
    }

    /// Queues a consent status change (and its audit row) if the authorization
    /// set now derives a different status.
    async fn rederive(
        &self,
        consent: &Consent,
        authorizations: &[AuthorizationResource],
        actor: Option<&str>,
        now: i64,
        batch: &mut WriteBatch,
    ) -> Result<(), ConsentError> {
        let statuses: Vec<AuthorizationStatus> =
            authorizations.iter().map(|a| a.status.clone()).collect();
        let status = self
            .engine
            .resolve(
                &statuses,
                ExtensionRequest {
                    org_id: consent.org_id.clone(),
                    consent_id: Some(consent.consent_id.clone()),
                    consent_type: consent.consent_type.clone(),
                    prior_status: Some(consent.status),
                    authorization_statuses: raw_statuses(&statuses),
                },
            )
            .await?;
        if status == consent.status {
            return Ok(());
        }

        let mut changed = consent.clone();
        changed.status = status;
        batch
            .push(WriteOp::SetConsentStatus {
                consent_id: consent.consent_id.clone(),
                org_id: consent.org_id.clone(),
                status,
                updated_time: now,
            })
            .push(WriteOp::AppendStatusAudit(audit(
                &changed,
                Some(consent.status),
                actor,
                REASON_AUTHORIZATION,
                now,
            )));
        debug!(consent_id = %consent.consent_id, from = %consent.status, to = %status, "Authorization change moves consent status");
        Ok(())
    }

    async fn detail(&self, consent: Consent) -> Result<ConsentDetail, ConsentError> {
        let id = consent.consent_id.as_str();
        let org = consent.org_id.as_str();
        let attributes = consent::get_attributes(&self.db, id, org)
            .await
            .context(|| format!("loading attributes of consent {id}"))?;
        let authorizations = authorization::list_authorizations(&self.db, id, org)
            .await
            .context(|| format!("loading authorizations of consent {id}"))?;
        let purposes = purpose::get_consent_bindings(&self.db, id, org)
            .await
            .context(|| format!("loading purposes of consent {id}"))?;
        let validity_elapsed =
            clock::validity_elapsed(consent.validity_time, self.clock.now_millis());

        Ok(ConsentDetail {
            consent,
            attributes,
            authorizations,
            purposes,
            validity_elapsed,
        })
    }

    /// Maps requested purpose names to stored purposes.
    async fn resolve_bindings(
        &self,
        org_id: &str,
        requested: &[PurposeBindingRequest],
    ) -> Result<Vec<ConsentPurposeBinding>, ConsentError> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = requested.iter().map(|p| p.name.trim().to_string()).collect();
        let found = purpose::get_purposes_by_names(&self.db, org_id, &names)
            .await
            .context(|| "resolving consent purposes".to_string())?;

        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !found.iter().any(|p| &p.name == *n))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!(org_id, missing = ?missing, "Consent references unknown purposes");
            return Err(ConsentError::NotFound(format!(
                "purposes not found: {}",
                missing.join(", ")
            )));
        }

        Ok(requested
            .iter()
            .zip(names)
            .filter_map(|(req, name)| {
                found.iter().find(|p| p.name == name).map(|p| ConsentPurposeBinding {
                    purpose_id: p.purpose_id.clone(),
                    name,
                    value: req.value.clone(),
                    is_user_approved: req.is_user_approved,
                    is_mandatory: req.is_mandatory,
                })
            })
            .collect())
    }
}

fn not_found(consent_id: &str) -> ConsentError {
    ConsentError::NotFound(format!("consent {consent_id}"))
}

fn audit(
    consent: &Consent,
    previous: Option<ConsentStatus>,
    actor: Option<&str>,
    reason: &str,
    now: i64,
) -> StatusAudit {
    StatusAudit {
        audit_id: storage::new_id(),
        consent_id: consent.consent_id.clone(),
        org_id: consent.org_id.clone(),
        current_status: consent.status,
        previous_status: previous,
        action_time: now,
        action_by: actor.map(str::to_string),
        reason: Some(reason.to_string()),
    }
}

fn parse_statuses(requests: &[AuthorizationRequest]) -> Vec<AuthorizationStatus> {
    requests
        .iter()
        .map(|r| AuthorizationStatus::parse(&r.status))
        .collect()
}

fn raw_statuses(statuses: &[AuthorizationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn build_authorizations(
    consent_id: &str,
    org_id: &str,
    requests: Vec<AuthorizationRequest>,
    statuses: &[AuthorizationStatus],
    now: i64,
) -> Vec<AuthorizationResource> {
    requests
        .into_iter()
        .zip(statuses.iter().cloned())
        .map(|(req, status)| AuthorizationResource {
            auth_id: storage::new_id(),
            org_id: org_id.to_string(),
            consent_id: consent_id.to_string(),
            auth_type: req.auth_type,
            user_id: req.user_id.filter(|u| !u.is_empty()),
            status,
            updated_time: now,
            approved_purpose_details: req.approved_purpose_details,
        })
        .collect()
}

fn check_non_negative(
    errors: &mut Vec<FieldError>,
    frequency: Option<i64>,
    validity_time: Option<i64>,
    data_access_validity_duration: Option<i64>,
) {
    for (field, value) in [
        ("frequency", frequency),
        ("validityTime", validity_time),
        ("dataAccessValidityDuration", data_access_validity_duration),
    ] {
        if matches!(value, Some(v) if v < 0) {
            errors.push(FieldError::new(field, "must not be negative"));
        }
    }
}

fn check_authorizations(errors: &mut Vec<FieldError>, requests: &[AuthorizationRequest]) {
    for (i, auth) in requests.iter().enumerate() {
        if auth.auth_type.trim().is_empty() {
            errors.push(FieldError::new(
                format!("authorizations[{i}].authType"),
                "must not be empty",
            ));
        }
    }
}

fn check_bindings(errors: &mut Vec<FieldError>, requests: &[PurposeBindingRequest]) {
    let mut seen = HashSet::new();
    for (i, binding) in requests.iter().enumerate() {
        let name = binding.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new(
                format!("purposes[{i}].name"),
                "must not be empty",
            ));
        } else if !seen.insert(name) {
            errors.push(FieldError::new(
                format!("purposes[{i}].name"),
                format!("purpose `{name}` listed more than once"),
            ));
        }
    }
}
