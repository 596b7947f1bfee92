use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "consents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub consent_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub org_id: String,
    pub client_id: String,
    pub consent_type: String,
    pub current_status: String,
    pub consent_frequency: Option<i64>,
    pub validity_time: Option<i64>,
    pub recurring_indicator: Option<bool>,
    pub data_access_validity_duration: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub receipt: Option<String>, // JSON-encoded receipt payload
    pub created_time: i64,
    pub updated_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
