use super::{decode_consent_status, decode_json, encode_json};
use crate::entities::{authorization_resource, consent, consent_attribute, consent_status_audit};
use crate::model::{Consent, ConsentAttributes, ConsentSearchFilter, StatusAudit};
use crate::status::ConsentStatus;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

fn to_consent(model: consent::Model) -> Result<Consent, DbErr> {
    Ok(Consent {
        status: decode_consent_status(&model.current_status)?,
        receipt: decode_json(model.receipt)?,
        consent_id: model.consent_id,
        org_id: model.org_id,
        client_id: model.client_id,
        consent_type: model.consent_type,
        frequency: model.consent_frequency,
        validity_time: model.validity_time,
        recurring_indicator: model.recurring_indicator,
        data_access_validity_duration: model.data_access_validity_duration,
        created_time: model.created_time,
        updated_time: model.updated_time,
    })
}

fn to_audit(model: consent_status_audit::Model) -> Result<StatusAudit, DbErr> {
    let previous_status = if model.previous_status.is_empty() {
        None
    } else {
        Some(decode_consent_status(&model.previous_status)?)
    };
    Ok(StatusAudit {
        current_status: decode_consent_status(&model.current_status)?,
        previous_status,
        audit_id: model.status_audit_id,
        consent_id: model.consent_id,
        org_id: model.org_id,
        action_time: model.action_time,
        action_by: model.action_by,
        reason: model.reason,
    })
}

// ============================================================================
// Reads
// ============================================================================

pub async fn get_consent(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<Option<Consent>, DbErr> {
    consent::Entity::find_by_id((consent_id.to_string(), org_id.to_string()))
        .one(db)
        .await?
        .map(to_consent)
        .transpose()
}

pub async fn consent_exists(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<bool, DbErr> {
    use consent::{Column, Entity};

    let count = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// One page of consents matching `filter`, newest first, plus the total number
/// of matches.
pub async fn list_consents(
    db: &DatabaseConnection,
    org_id: &str,
    filter: &ConsentSearchFilter,
    limit: u64,
    offset: u64,
) -> Result<(Vec<Consent>, u64), DbErr> {
    use consent::{Column, Entity};

    let mut cond = Condition::all().add(Column::OrgId.eq(org_id));
    if !filter.consent_types.is_empty() {
        cond = cond.add(Column::ConsentType.is_in(filter.consent_types.iter().cloned()));
    }
    if !filter.statuses.is_empty() {
        cond = cond.add(Column::CurrentStatus.is_in(filter.statuses.iter().map(|s| s.as_str())));
    }
    if !filter.client_ids.is_empty() {
        cond = cond.add(Column::ClientId.is_in(filter.client_ids.iter().cloned()));
    }
    if !filter.user_ids.is_empty() {
        cond = cond.add(
            Column::ConsentId.in_subquery(
                Query::select()
                    .column(authorization_resource::Column::ConsentId)
                    .from(authorization_resource::Entity)
                    .and_where(authorization_resource::Column::OrgId.eq(org_id))
                    .and_where(
                        authorization_resource::Column::UserId
                            .is_in(filter.user_ids.iter().cloned()),
                    )
                    .to_owned(),
            ),
        );
    }

    let total = Entity::find().filter(cond.clone()).count(db).await?;

    let rows = Entity::find()
        .filter(cond)
        .order_by_desc(Column::CreatedTime)
        .order_by_asc(Column::ConsentId)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;

    let items = rows
        .into_iter()
        .map(to_consent)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((items, total))
}

pub async fn get_attributes(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<ConsentAttributes, DbErr> {
    use consent_attribute::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.att_key, m.att_value))
        .collect())
}

/// Ids of consents carrying attribute `key`, optionally restricted to `value`.
pub async fn find_consent_ids_by_attribute(
    db: &DatabaseConnection,
    org_id: &str,
    key: &str,
    value: Option<&str>,
) -> Result<Vec<String>, DbErr> {
    use consent_attribute::{Column, Entity};

    let mut query = Entity::find()
        .select_only()
        .column(Column::ConsentId)
        .distinct()
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::AttKey.eq(key));
    if let Some(value) = value {
        query = query.filter(Column::AttValue.eq(value));
    }

    query
        .order_by_asc(Column::ConsentId)
        .into_tuple::<String>()
        .all(db)
        .await
}

/// Status history of a consent, oldest first.
pub async fn get_status_audits(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<Vec<StatusAudit>, DbErr> {
    use consent_status_audit::{Column, Entity};

    Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .order_by_asc(Column::Sequence)
        .order_by_asc(Column::ActionTime)
        .all(db)
        .await?
        .into_iter()
        .map(to_audit)
        .collect()
}

// ============================================================================
// Transaction-scoped writes
// ============================================================================

pub async fn insert_consent(txn: &DatabaseTransaction, consent: &Consent) -> Result<(), DbErr> {
    let model = consent::ActiveModel {
        consent_id: Set(consent.consent_id.clone()),
        org_id: Set(consent.org_id.clone()),
        client_id: Set(consent.client_id.clone()),
        consent_type: Set(consent.consent_type.clone()),
        current_status: Set(consent.status.as_str().to_string()),
        consent_frequency: Set(consent.frequency),
        validity_time: Set(consent.validity_time),
        recurring_indicator: Set(consent.recurring_indicator),
        data_access_validity_duration: Set(consent.data_access_validity_duration),
        receipt: Set(encode_json(&consent.receipt)?),
        created_time: Set(consent.created_time),
        updated_time: Set(consent.updated_time),
    };

    consent::Entity::insert(model)
        .exec_without_returning(txn)
        .await?;
    Ok(())
}

/// Overwrites every mutable column of an existing consent row.
pub async fn update_consent(txn: &DatabaseTransaction, consent: &Consent) -> Result<(), DbErr> {
    use consent::{Column, Entity};

    let model = consent::ActiveModel {
        consent_id: NotSet,
        org_id: NotSet,
        created_time: NotSet,
        client_id: Set(consent.client_id.clone()),
        consent_type: Set(consent.consent_type.clone()),
        current_status: Set(consent.status.as_str().to_string()),
        consent_frequency: Set(consent.frequency),
        validity_time: Set(consent.validity_time),
        recurring_indicator: Set(consent.recurring_indicator),
        data_access_validity_duration: Set(consent.data_access_validity_duration),
        receipt: Set(encode_json(&consent.receipt)?),
        updated_time: Set(consent.updated_time),
    };

    let result = Entity::update_many()
        .set(model)
        .filter(Column::ConsentId.eq(consent.consent_id.as_str()))
        .filter(Column::OrgId.eq(consent.org_id.as_str()))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(DbErr::RecordNotUpdated);
    }
    Ok(())
}

pub async fn update_consent_status(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
    status: ConsentStatus,
    updated_time: i64,
) -> Result<(), DbErr> {
    use consent::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::CurrentStatus, Expr::value(status.as_str()))
        .col_expr(Column::UpdatedTime, Expr::value(updated_time))
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(DbErr::RecordNotUpdated);
    }
    Ok(())
}

/// Compare-and-set on the status column. Returns whether the row moved.
pub async fn transition_consent_status(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
    from: ConsentStatus,
    to: ConsentStatus,
    updated_time: i64,
) -> Result<bool, DbErr> {
    use consent::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::CurrentStatus, Expr::value(to.as_str()))
        .col_expr(Column::UpdatedTime, Expr::value(updated_time))
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::CurrentStatus.eq(from.as_str()))
        .exec(txn)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn delete_consent(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn insert_attributes(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
    attributes: &ConsentAttributes,
) -> Result<(), DbErr> {
    if attributes.is_empty() {
        return Ok(());
    }

    let models = attributes.iter().map(|(k, v)| consent_attribute::ActiveModel {
        consent_id: Set(consent_id.to_string()),
        org_id: Set(org_id.to_string()),
        att_key: Set(k.clone()),
        att_value: Set(v.clone()),
    });

    consent_attribute::Entity::insert_many(models)
        .exec_without_returning(txn)
        .await?;
    Ok(())
}

pub async fn delete_attributes(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent_attribute::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn insert_status_audit(
    txn: &DatabaseTransaction,
    audit: &StatusAudit,
) -> Result<(), DbErr> {
    use consent_status_audit::{Column, Entity};

    let sequence = Entity::find()
        .filter(Column::ConsentId.eq(audit.consent_id.as_str()))
        .filter(Column::OrgId.eq(audit.org_id.as_str()))
        .count(txn)
        .await?;

    let model = consent_status_audit::ActiveModel {
        status_audit_id: Set(audit.audit_id.clone()),
        consent_id: Set(audit.consent_id.clone()),
        org_id: Set(audit.org_id.clone()),
        current_status: Set(audit.current_status.as_str().to_string()),
        previous_status: Set(audit
            .previous_status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default()),
        action_time: Set(audit.action_time),
        sequence: Set(sequence as i64),
        action_by: Set(audit.action_by.clone()),
        reason: Set(audit.reason.clone()),
    };

    Entity::insert(model)
        .exec_without_returning(txn)
        .await?;
    Ok(())
}
