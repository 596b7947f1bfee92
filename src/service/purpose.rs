use super::{batch_failed, require_tenant};
use crate::errors::{ConsentError, DbResultExt, FieldError};
use crate::model::{ConsentPurpose, Page, PurposeRequest};
use crate::purpose_types::PurposeTypeRegistry;
use crate::settings::Pagination;
use crate::storage::{self, purpose, WriteBatch, WriteOp};
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PurposeService {
    db: DatabaseConnection,
    registry: Arc<PurposeTypeRegistry>,
    pagination: Pagination,
}

impl PurposeService {
    pub fn new(db: DatabaseConnection, registry: Arc<PurposeTypeRegistry>) -> Self {
        Self {
            db,
            registry,
            pagination: Pagination::default(),
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn list_types(&self) -> Vec<String> {
        self.registry.type_tags()
    }

    pub async fn create(
        &self,
        request: PurposeRequest,
        org_id: &str,
    ) -> Result<ConsentPurpose, ConsentError> {
        require_tenant(org_id)?;
        let purpose = self.prepare(storage::new_id(), request, org_id)?;

        let taken = purpose::existing_names(&self.db, org_id, std::slice::from_ref(&purpose.name))
            .await
            .context(|| format!("checking purpose name `{}`", purpose.name))?;
        if !taken.is_empty() {
            return Err(duplicate_name(&purpose.name));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertPurpose(purpose.clone()));
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("creating purpose `{}`", purpose.name), e))?;

        info!(purpose_id = %purpose.purpose_id, org_id, name = %purpose.name, "Created consent purpose");
        Ok(purpose)
    }

    /// Creates several purposes at once. Every request is validated before
    /// anything is written; one bad request fails the whole batch.
    pub async fn create_batch(
        &self,
        requests: Vec<PurposeRequest>,
        org_id: &str,
    ) -> Result<Vec<ConsentPurpose>, ConsentError> {
        require_tenant(org_id)?;
        if requests.is_empty() {
            return Err(ConsentError::invalid_fields(
                "no purposes supplied",
                vec![FieldError::new("purposes", "must not be empty")],
            ));
        }

        let mut purposes = Vec::with_capacity(requests.len());
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for (i, request) in requests.into_iter().enumerate() {
            match self.prepare(storage::new_id(), request, org_id) {
                Ok(p) => {
                    if !seen.insert(p.name.clone()) {
                        errors.push(FieldError::new(
                            format!("purposes[{i}].name"),
                            format!("`{}` appears more than once in the batch", p.name),
                        ));
                    }
                    purposes.push(p);
                }
                Err(ConsentError::Validation { fields, message }) if fields.is_empty() => {
                    errors.push(FieldError::new(format!("purposes[{i}]"), message));
                }
                Err(ConsentError::Validation { fields, .. }) => {
                    errors.extend(fields.into_iter().map(|f| {
                        FieldError::new(format!("purposes[{i}].{}", f.field), f.message)
                    }));
                }
                Err(other) => return Err(other),
            }
        }
        if !errors.is_empty() {
            warn!(org_id, errors = errors.len(), "Rejected purpose batch");
            return Err(ConsentError::invalid_fields("invalid purpose batch", errors));
        }

        let names: Vec<String> = purposes.iter().map(|p| p.name.clone()).collect();
        let taken = purpose::existing_names(&self.db, org_id, &names)
            .await
            .context(|| "checking purpose names".to_string())?;
        if !taken.is_empty() {
            warn!(org_id, taken = ?taken, "Purpose batch collides with existing names");
            return Err(ConsentError::Conflict(format!(
                "purposes already exist: {}",
                taken.join(", ")
            )));
        }

        let mut batch = WriteBatch::new();
        batch.extend(purposes.iter().cloned().map(WriteOp::InsertPurpose));
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed("creating purpose batch", e))?;

        info!(org_id, count = purposes.len(), "Created consent purposes");
        Ok(purposes)
    }

    pub async fn get(&self, purpose_id: &str, org_id: &str) -> Result<ConsentPurpose, ConsentError> {
        require_tenant(org_id)?;
        purpose::get_purpose(&self.db, purpose_id, org_id)
            .await
            .context(|| format!("loading purpose {purpose_id}"))?
            .ok_or_else(|| not_found(purpose_id))
    }

    pub async fn get_by_name(&self, name: &str, org_id: &str) -> Result<ConsentPurpose, ConsentError> {
        require_tenant(org_id)?;
        purpose::get_purpose_by_name(&self.db, name, org_id)
            .await
            .context(|| format!("loading purpose `{name}`"))?
            .ok_or_else(|| ConsentError::NotFound(format!("purpose `{name}`")))
    }

    pub async fn list(
        &self,
        org_id: &str,
        name_filter: Option<&str>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Page<ConsentPurpose>, ConsentError> {
        require_tenant(org_id)?;
        let (limit, offset) = self.pagination.window(limit, offset);
        let (items, total) = purpose::list_purposes(&self.db, org_id, name_filter, limit, offset)
            .await
            .context(|| format!("listing purposes in {org_id}"))?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Replaces a purpose's name, description, type and attributes. A rename
    /// is refused while consents are bound to the purpose.
    pub async fn update(
        &self,
        purpose_id: &str,
        org_id: &str,
        request: PurposeRequest,
    ) -> Result<ConsentPurpose, ConsentError> {
        require_tenant(org_id)?;
        let existing = self.get(purpose_id, org_id).await?;
        let updated = self.prepare(existing.purpose_id.clone(), request, org_id)?;

        if updated.name != existing.name {
            let bindings = self.binding_count(purpose_id, org_id).await?;
            if bindings > 0 {
                warn!(purpose_id, org_id, bindings, "Refused rename of bound purpose");
                return Err(ConsentError::Conflict(format!(
                    "purpose `{}` is bound to {bindings} consent(s) and cannot be renamed",
                    existing.name
                )));
            }
            let taken =
                purpose::existing_names(&self.db, org_id, std::slice::from_ref(&updated.name))
                    .await
                    .context(|| format!("checking purpose name `{}`", updated.name))?;
            if !taken.is_empty() {
                return Err(duplicate_name(&updated.name));
            }
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdatePurpose(updated.clone()));
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("updating purpose {purpose_id}"), e))?;

        info!(purpose_id, org_id, name = %updated.name, "Updated consent purpose");
        Ok(updated)
    }

    /// Deletes an unbound purpose and its attributes.
    pub async fn delete(&self, purpose_id: &str, org_id: &str) -> Result<(), ConsentError> {
        require_tenant(org_id)?;
        let existing = self.get(purpose_id, org_id).await?;

        let bindings = self.binding_count(purpose_id, org_id).await?;
        if bindings > 0 {
            warn!(purpose_id, org_id, bindings, "Refused delete of bound purpose");
            return Err(ConsentError::Conflict(format!(
                "purpose `{}` is bound to {bindings} consent(s) and cannot be deleted",
                existing.name
            )));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeletePurpose {
            purpose_id: purpose_id.to_string(),
            org_id: org_id.to_string(),
        });
        batch
            .execute(&self.db)
            .await
            .map_err(|e| batch_failed(format!("deleting purpose {purpose_id}"), e))?;

        info!(purpose_id, org_id, "Deleted consent purpose");
        Ok(())
    }

    /// The subset of `names` that exist for the tenant. Fails only when none do.
    pub async fn validate_names(
        &self,
        names: &[String],
        org_id: &str,
    ) -> Result<Vec<String>, ConsentError> {
        require_tenant(org_id)?;
        let mut unique: Vec<String> = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !unique.iter().any(|u| u == name) {
                unique.push(name.to_string());
            }
        }
        if unique.is_empty() {
            return Err(ConsentError::invalid_fields(
                "no purpose names supplied",
                vec![FieldError::new("names", "must not be empty")],
            ));
        }

        let found = purpose::existing_names(&self.db, org_id, &unique)
            .await
            .context(|| "validating purpose names".to_string())?;
        if found.is_empty() {
            return Err(ConsentError::NotFound(format!(
                "none of the purposes exist: {}",
                unique.join(", ")
            )));
        }
        Ok(found)
    }

    async fn binding_count(&self, purpose_id: &str, org_id: &str) -> Result<u64, ConsentError> {
        purpose::count_mappings(&self.db, purpose_id, org_id)
            .await
            .context(|| format!("counting bindings of purpose {purpose_id}"))
    }

    /// Checks shape and type rules and returns the purpose to store.
    fn prepare(
        &self,
        purpose_id: String,
        request: PurposeRequest,
        org_id: &str,
    ) -> Result<ConsentPurpose, ConsentError> {
        let name = request.name.trim().to_string();
        let purpose_type = request.purpose_type.trim().to_string();

        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if purpose_type.is_empty() {
            errors.push(FieldError::new("type", "must not be empty"));
        }
        if !errors.is_empty() {
            return Err(ConsentError::invalid_fields("invalid purpose", errors));
        }

        let attributes = self.registry.check(&purpose_type, request.attributes)?;
        Ok(ConsentPurpose {
            purpose_id,
            org_id: org_id.to_string(),
            name,
            description: request.description.filter(|d| !d.trim().is_empty()),
            purpose_type,
            attributes,
        })
    }
}

fn not_found(purpose_id: &str) -> ConsentError {
    ConsentError::NotFound(format!("purpose {purpose_id}"))
}

fn duplicate_name(name: &str) -> ConsentError {
    ConsentError::Conflict(format!("a purpose named `{name}` already exists"))
}
