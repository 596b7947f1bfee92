//! Persistence layer.
//!
//! Reads run directly against a [`DatabaseConnection`]. Writes take an open
//! [`sea_orm::DatabaseTransaction`] and never begin one themselves; callers
//! collect them in a [`WriteBatch`] so that writes across entity families
//! commit or roll back together. Errors are returned as raw [`DbErr`] and
//! classified by the service layer.

pub mod authorization;
pub mod consent;
pub mod purpose;
pub mod tx;

pub use tx::{WriteBatch, WriteOp};

use crate::settings::Database as DbCfg;
use sea_orm::{Database, DatabaseConnection, DbErr};
use serde_json::Value;

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn decode_json(raw: Option<String>) -> Result<Option<Value>, DbErr> {
    match raw {
        Some(s) if !s.is_empty() => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| DbErr::Json(e.to_string())),
        _ => Ok(None),
    }
}

fn encode_json(value: &Option<Value>) -> Result<Option<String>, DbErr> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DbErr::Json(e.to_string()))
}

fn decode_consent_status(raw: &str) -> Result<crate::status::ConsentStatus, DbErr> {
    crate::status::ConsentStatus::parse(raw)
        .ok_or_else(|| DbErr::Type(format!("unknown consent status `{raw}`")))
}
