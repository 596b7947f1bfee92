use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "authorization_resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub auth_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub org_id: String,
    pub consent_id: String,
    pub auth_type: String,
    pub user_id: Option<String>,
    pub auth_status: String,
    pub updated_time: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub approved_purpose_details: Option<String>, // JSON-encoded Value
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
