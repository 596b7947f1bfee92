use super::{decode_json, encode_json};
use crate::entities::authorization_resource::{self, Column, Entity};
use crate::model::AuthorizationResource;
use crate::status::AuthorizationStatus;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

fn to_authorization(model: authorization_resource::Model) -> Result<AuthorizationResource, DbErr> {
    Ok(AuthorizationResource {
        status: AuthorizationStatus::parse(&model.auth_status),
        approved_purpose_details: decode_json(model.approved_purpose_details)?,
        auth_id: model.auth_id,
        org_id: model.org_id,
        consent_id: model.consent_id,
        auth_type: model.auth_type,
        user_id: model.user_id,
        updated_time: model.updated_time,
    })
}

pub async fn get_authorization(
    db: &DatabaseConnection,
    auth_id: &str,
    org_id: &str,
) -> Result<Option<AuthorizationResource>, DbErr> {
    Entity::find_by_id((auth_id.to_string(), org_id.to_string()))
        .one(db)
        .await?
        .map(to_authorization)
        .transpose()
}

pub async fn list_authorizations(
    db: &DatabaseConnection,
    consent_id: &str,
    org_id: &str,
) -> Result<Vec<AuthorizationResource>, DbErr> {
    Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .order_by_asc(Column::UpdatedTime)
        .order_by_asc(Column::AuthId)
        .all(db)
        .await?
        .into_iter()
        .map(to_authorization)
        .collect()
}

pub async fn insert_authorization(
    txn: &DatabaseTransaction,
    auth: &AuthorizationResource,
) -> Result<(), DbErr> {
    let model = authorization_resource::ActiveModel {
        auth_id: Set(auth.auth_id.clone()),
        org_id: Set(auth.org_id.clone()),
        consent_id: Set(auth.consent_id.clone()),
        auth_type: Set(auth.auth_type.clone()),
        user_id: Set(auth.user_id.clone()),
        auth_status: Set(auth.status.as_str().to_string()),
        updated_time: Set(auth.updated_time),
        approved_purpose_details: Set(encode_json(&auth.approved_purpose_details)?),
    };

    Entity::insert(model).exec_without_returning(txn).await?;
    Ok(())
}

pub async fn update_authorization_status(
    txn: &DatabaseTransaction,
    auth_id: &str,
    org_id: &str,
    status: &AuthorizationStatus,
    updated_time: i64,
) -> Result<(), DbErr> {
    let result = Entity::update_many()
        .col_expr(Column::AuthStatus, Expr::value(status.as_str()))
        .col_expr(Column::UpdatedTime, Expr::value(updated_time))
        .filter(Column::AuthId.eq(auth_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(DbErr::RecordNotUpdated);
    }
    Ok(())
}

/// Sets the state of every authorization resource under a consent.
pub async fn update_statuses_for_consent(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
    status: &AuthorizationStatus,
    updated_time: i64,
) -> Result<u64, DbErr> {
    let result = Entity::update_many()
        .col_expr(Column::AuthStatus, Expr::value(status.as_str()))
        .col_expr(Column::UpdatedTime, Expr::value(updated_time))
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete_for_consent(
    txn: &DatabaseTransaction,
    consent_id: &str,
    org_id: &str,
) -> Result<u64, DbErr> {
    let result = Entity::delete_many()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::OrgId.eq(org_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}
