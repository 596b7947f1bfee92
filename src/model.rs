//! Records produced by the core and requests accepted by the services.
//!
//! These are the canonical shapes; storage rows are mapped into them once in
//! the persistence layer.

use crate::purpose_types::PurposeAttributes;
use crate::status::{AuthorizationStatus, ConsentStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type ConsentAttributes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub consent_id: String,
    pub org_id: String,
    pub client_id: String,
    pub consent_type: String,
    pub status: ConsentStatus,
    pub frequency: Option<i64>,
    pub validity_time: Option<i64>,
    pub recurring_indicator: Option<bool>,
    pub data_access_validity_duration: Option<i64>,
    pub receipt: Option<Value>,
    pub created_time: i64,
    pub updated_time: i64,
}

/// A consent together with everything it owns or references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentDetail {
    #[serde(flatten)]
    pub consent: Consent,
    pub attributes: ConsentAttributes,
    pub authorizations: Vec<AuthorizationResource>,
    pub purposes: Vec<ConsentPurposeBinding>,
    /// Validity time has passed. Terminal consents keep their status but
    /// still report this.
    pub validity_elapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResource {
    pub auth_id: String,
    pub org_id: String,
    pub consent_id: String,
    pub auth_type: String,
    pub user_id: Option<String>,
    pub status: AuthorizationStatus,
    pub updated_time: i64,
    pub approved_purpose_details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAudit {
    pub audit_id: String,
    pub consent_id: String,
    pub org_id: String,
    pub current_status: ConsentStatus,
    /// `None` for the row written at creation.
    pub previous_status: Option<ConsentStatus>,
    pub action_time: i64,
    pub action_by: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPurpose {
    pub purpose_id: String,
    pub org_id: String,
    pub name: String,
    pub description: Option<String>,
    pub purpose_type: String,
    pub attributes: PurposeAttributes,
}

/// A consent's reference to a purpose, with the per-binding flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPurposeBinding {
    pub purpose_id: String,
    pub name: String,
    pub value: Option<Value>,
    pub is_user_approved: bool,
    pub is_mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentCreateRequest {
    pub consent_type: String,
    pub frequency: Option<i64>,
    pub validity_time: Option<i64>,
    pub recurring_indicator: Option<bool>,
    pub data_access_validity_duration: Option<i64>,
    pub receipt: Option<Value>,
    pub attributes: ConsentAttributes,
    pub authorizations: Vec<AuthorizationRequest>,
    pub purposes: Vec<PurposeBindingRequest>,
}

/// Fields left as `None` keep their stored value. Collections that are
/// supplied replace the stored ones wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentUpdateRequest {
    pub consent_type: Option<String>,
    pub frequency: Option<i64>,
    pub validity_time: Option<i64>,
    pub recurring_indicator: Option<bool>,
    pub data_access_validity_duration: Option<i64>,
    pub receipt: Option<Value>,
    pub attributes: Option<ConsentAttributes>,
    pub authorizations: Option<Vec<AuthorizationRequest>>,
    pub purposes: Option<Vec<PurposeBindingRequest>>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorizationRequest {
    pub auth_type: String,
    pub user_id: Option<String>,
    /// Raw state; blank means `created`.
    pub status: String,
    pub approved_purpose_details: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurposeBindingRequest {
    pub name: String,
    pub value: Option<Value>,
    pub is_user_approved: bool,
    pub is_mandatory: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentSearchFilter {
    pub consent_types: Vec<String>,
    pub statuses: Vec<ConsentStatus>,
    pub client_ids: Vec<String>,
    pub user_ids: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurposeRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub purpose_type: String,
    pub attributes: PurposeAttributes,
}

/// Answer to "may this consent be used right now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentValidation {
    pub is_valid: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub consent: Option<ConsentDetail>,
}

impl ConsentValidation {
    pub fn valid(consent: ConsentDetail) -> Self {
        Self {
            is_valid: true,
            error_code: None,
            error_message: None,
            consent: Some(consent),
        }
    }

    pub fn invalid(code: &str, message: impl Into<String>, consent: Option<ConsentDetail>) -> Self {
        Self {
            is_valid: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
            consent,
        }
    }
}
