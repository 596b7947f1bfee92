use super::{decode_json, encode_json};
use crate::entities::{consent_purpose, consent_purpose_attribute, consent_purpose_mapping};
use crate::model::{ConsentPurpose, ConsentPurposeBinding};
use crate::purpose_types::PurposeAttributes;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;

async fn load_attributes(
    db: &DatabaseConnection,
    org_id: &str,
    purpose_ids: &[String],
) -> Result<HashMap<String, PurposeAttributes>, DbErr> {
    use consent_purpose_attribute::{Column, Entity};

    let mut out: HashMap<String, PurposeAttributes> = HashMap::new();
    if purpose_ids.is_empty() {
        return Ok(out);
    }
    let rows = Entity::find()
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::PurposeId.is_in(purpose_ids.iter().cloned()))
        .all(db)
        .await?;
    for row in rows {
        out.entry(row.purpose_id)
            .or_default()
            .insert(row.att_key, row.att_value);
    }
    Ok(out)
}

/// Attaches attribute bags to purpose rows, preserving row order.
async fn hydrate(
    db: &DatabaseConnection,
    org_id: &str,
    rows: Vec<consent_purpose::Model>,
) -> Result<Vec<ConsentPurpose>, DbErr> {
    let ids: Vec<String> = rows.iter().map(|r| r.purpose_id.clone()).collect();
    let mut attributes = load_attributes(db, org_id, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| ConsentPurpose {
            attributes: attributes.remove(&row.purpose_id).unwrap_or_default(),
            purpose_id: row.purpose_id,
            org_id: row.org_id,
            name: row.name,
            description: row.description,
            purpose_type: row.purpose_type,
        })
        .collect())
}

// ============================================================================
// Reads
// ============================================================================

pub async fn get_purpose(
    db: &DatabaseConnection,
    purpose_id: &str,
    org_id: &str,
) -> Result<Option<ConsentPurpose>, DbErr> {
    let row = consent_purpose::Entity::find_by_id((purpose_id.to_string(), org_id.to_string()))
        .one(db)
        .await?;
    match row {
        Some(row) => Ok(hydrate(db, org_id, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

pub async fn get_purpose_by_name(
    db: &DatabaseConnection,
    name: &str,
    org_id: &str,
) -> Result<Option<ConsentPurpose>, DbErr> {
    use consent_purpose::{Column, Entity};

    let row = Entity::find()
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::Name.eq(name))
        .one(db)
        .await?;
    match row {
        Some(row) => Ok(hydrate(db, org_id, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Purposes whose names are in `names`. Unknown names are silently skipped.
pub async fn get_purposes_by_names(
    db: &DatabaseConnection,
    org_id: &str,
    names: &[String],
) -> Result<Vec<ConsentPurpose>, DbErr> {
    use consent_purpose::{Column, Entity};

    if names.is_empty() {
        return Ok(Vec::new());
    }
    let rows = Entity::find()
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::Name.is_in(names.iter().cloned()))
        .order_by_asc(Column::Name)
        .all(db)
        .await?;
    hydrate(db, org_id, rows).await
}

/// Names out of `names` that already exist for the tenant.
pub async fn existing_names(
    db: &DatabaseConnection,
    org_id: &str,
    names: &[String],
) -> Result<Vec<String>, DbErr> {
    use consent_purpose::{Column, Entity};

    if names.is_empty() {
        return Ok(Vec::new());
    }
    Entity::find()
        .select_only()
        .column(Column::Name)
        .filter(Column::OrgId.eq(org_id))
        .filter(Column::Name.is_in(names.iter().cloned()))
        .order_by_asc(Column::Name)
        .into_tuple::<String>()
        .all(db)
        .await
}

/// Page of purposes ordered by name plus the total count. `name_filter`
/// matches as a substring.
pub async fn list_purposes(
    db: &DatabaseConnection,
    org_id: &str,
    name_filter: Option<&str>,
    limit: u64,
    offset: u64,
) -> Result<(Vec<ConsentPurpose>, u64), DbErr> {
    use consent_purpose::{Column, Entity};

    let mut cond = Condition::all().add(Column::OrgId.eq(org_id));
    if let Some(name) = name_filter.filter(|n| !n.is_empty()) {
        cond = cond.add(Column::Name.contains(name));
    }

    let total = Entity::find().filter(cond.clone()).count(db).await?;
    let rows = Entity::find()
        .filter(cond)
        .order_by_asc(Column::Name)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;

    Ok((hydrate(db, org_id, rows).await?, total))
}

/// Number of consents bound to a purpose.
pub async fn count_mappings(
    db: &DatabaseConnection,
    purpose_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent_purpose_mapping::{Column, Entity};

    Entity::find()
        .filter(Column::PurposeId.eq(purpose_id))
        .filter(Column::OrgId.eq(org_id))
        .count(db)
        .await
}

pub async fn get_consent_bindings(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<Vec<ConsentPurposeBinding>, DbErr> {
    use consent_purpose_mapping::{Column, Entity};

    let mappings = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .all(db)
        .await?;
    if mappings.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = mappings.iter().map(|m| m.purpose_id.clone()).collect();
    let names: HashMap<String, String> = consent_purpose::Entity::find()
        .filter(consent_purpose::Column::OrgId.eq(org_id))
        .filter(consent_purpose::Column::PurposeId.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.purpose_id, p.name))
        .collect();

    let mut bindings = mappings
        .into_iter()
        .map(|m| {
            Ok(ConsentPurposeBinding {
                name: names.get(&m.purpose_id).cloned().unwrap_or_default(),
                value: decode_json(m.value)?,
                purpose_id: m.purpose_id,
                is_user_approved: m.is_user_approved,
                is_mandatory: m.is_mandatory,
            })
        })
        .collect::<Result<Vec<_>, DbErr>>()?;
    bindings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(bindings)
}

// ============================================================================
// Transaction-scoped writes
// ============================================================================

/// Inserts the purpose row and its attribute rows.
pub async fn insert_purpose(
    txn: &DatabaseTransaction,
    purpose: &ConsentPurpose,
) -> Result<(), DbErr> {
    let model = consent_purpose::ActiveModel {
        purpose_id: Set(purpose.purpose_id.clone()),
        org_id: Set(purpose.org_id.clone()),
        name: Set(purpose.name.clone()),
        description: Set(purpose.description.clone()),
        purpose_type: Set(purpose.purpose_type.clone()),
    };
    consent_purpose::Entity::insert(model)
        .exec_without_returning(txn)
        .await?;

    insert_attributes(txn, &purpose.purpose_id, &purpose.org_id, &purpose.attributes).await
}

/// Overwrites name, description and type of an existing purpose row.
pub async fn update_purpose(
    txn: &DatabaseTransaction,
    purpose: &ConsentPurpose,
) -> Result<(), DbErr> {
    use consent_purpose::{Column, Entity};

    let model = consent_purpose::ActiveModel {
        purpose_id: NotSet,
        org_id: NotSet,
        name: Set(purpose.name.clone()),
        description: Set(purpose.description.clone()),
        purpose_type: Set(purpose.purpose_type.clone()),
    };
    let result = Entity::update_many()
        .set(model)
        .filter(Column::PurposeId.eq(purpose.purpose_id.as_str()))
        .filter(Column::OrgId.eq(purpose.org_id.as_str()))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(DbErr::RecordNotUpdated);
    }
    Ok(())
}

pub async fn insert_attributes(
    txn: &DatabaseTransaction,
    purpose_id: &str,
    org_id: &str,
    attributes: &PurposeAttributes,
) -> Result<(), DbErr> {
    if attributes.is_empty() {
        return Ok(());
    }
    let models = attributes
        .iter()
        .map(|(k, v)| consent_purpose_attribute::ActiveModel {
            purpose_id: Set(purpose_id.to_string()),
            org_id: Set(org_id.to_string()),
            att_key: Set(k.clone()),
            att_value: Set(v.clone()),
        });
    consent_purpose_attribute::Entity::insert_many(models)
        .exec_without_returning(txn)
        .await?;
    Ok(())
}

pub async fn delete_attributes(
    txn: &DatabaseTransaction,
    purpose_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent_purpose_attribute::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::PurposeId.eq(purpose_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete_purpose(
    txn: &DatabaseTransaction,
    purpose_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent_purpose::{Column, Entity};

    delete_attributes(txn, purpose_id, org_id).await?;
    let result = Entity::delete_many()
        .filter(Column::PurposeId.eq(purpose_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn insert_mappings(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
    bindings: &[ConsentPurposeBinding],
) -> Result<(), DbErr> {
    if bindings.is_empty() {
        return Ok(());
    }
    let models = bindings
        .iter()
        .map(|b| {
            Ok(consent_purpose_mapping::ActiveModel {
                consent_id: Set(consent_id.to_string()),
                org_id: Set(org_id.to_string()),
                purpose_id: Set(b.purpose_id.clone()),
                value: Set(encode_json(&b.value)?),
                is_user_approved: Set(b.is_user_approved),
                is_mandatory: Set(b.is_mandatory),
            })
        })
        .collect::<Result<Vec<_>, DbErr>>()?;
    consent_purpose_mapping::Entity::insert_many(models)
        .exec_without_returning(txn)
        .await?;
    Ok(())
}

pub async fn delete_mappings_for_consent(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    use consent_purpose_mapping::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}
