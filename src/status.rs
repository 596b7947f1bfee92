//! Consent status derivation.
//!
//! A consent's status follows from the states of its authorization resources.
//! Each authorization state maps to a consent status on its own; several are
//! folded with a fixed precedence so a single refusal or revocation downgrades
//! the whole consent. States the engine does not know are handed to an optional
//! extension hook, or leave the prior status in place.

use crate::clock;
use crate::errors::ConsentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Actor recorded on audit rows written by time-based transitions.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Created,
    Active,
    Rejected,
    Revoked,
    Expired,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Created => "CREATED",
            ConsentStatus::Active => "ACTIVE",
            ConsentStatus::Rejected => "REJECTED",
            ConsentStatus::Revoked => "REVOKED",
            ConsentStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATED" => Some(ConsentStatus::Created),
            "ACTIVE" => Some(ConsentStatus::Active),
            "REJECTED" => Some(ConsentStatus::Rejected),
            "REVOKED" => Some(ConsentStatus::Revoked),
            "EXPIRED" => Some(ConsentStatus::Expired),
            _ => None,
        }
    }

    /// No further lifecycle transitions are allowed out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsentStatus::Rejected | ConsentStatus::Revoked | ConsentStatus::Expired
        )
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single authorization resource. Unknown states are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    Created,
    Approved,
    Rejected,
    Revoked,
    SystemExpired,
    SystemRevoked,
    Custom(String),
}

impl AuthorizationStatus {
    /// Parses a stored or requested state. Blank input is `Created`.
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "" | "created" => AuthorizationStatus::Created,
            "approved" | "authorized" | "authorised" => AuthorizationStatus::Approved,
            "rejected" => AuthorizationStatus::Rejected,
            "revoked" => AuthorizationStatus::Revoked,
            "system-expired" | "sys-expired" => AuthorizationStatus::SystemExpired,
            "system-revoked" | "sys-revoked" => AuthorizationStatus::SystemRevoked,
            _ => AuthorizationStatus::Custom(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthorizationStatus::Created => "created",
            AuthorizationStatus::Approved => "approved",
            AuthorizationStatus::Rejected => "rejected",
            AuthorizationStatus::Revoked => "revoked",
            AuthorizationStatus::SystemExpired => "system-expired",
            AuthorizationStatus::SystemRevoked => "system-revoked",
            AuthorizationStatus::Custom(s) => s,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AuthorizationStatus::Custom(_))
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuthorizationStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthorizationStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(AuthorizationStatus::parse(&s))
    }
}

/// Outcome of mapping authorization states onto a consent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Status(ConsentStatus),
    /// A custom state is involved; the extension hook or the prior status decides.
    Undetermined,
}

/// Maps one authorization state to a consent status.
///
/// Besides the four base states (blank, created, approved, rejected), the
/// revoked and system states map onto their terminal consent status instead
/// of being treated as custom.
pub fn derive_one(status: &AuthorizationStatus) -> Derivation {
    match status {
        AuthorizationStatus::Created => Derivation::Status(ConsentStatus::Created),
        AuthorizationStatus::Approved => Derivation::Status(ConsentStatus::Active),
        AuthorizationStatus::Rejected => Derivation::Status(ConsentStatus::Rejected),
        AuthorizationStatus::Revoked | AuthorizationStatus::SystemRevoked => {
            Derivation::Status(ConsentStatus::Revoked)
        }
        AuthorizationStatus::SystemExpired => Derivation::Status(ConsentStatus::Expired),
        AuthorizationStatus::Custom(_) => Derivation::Undetermined,
    }
}

/// Folds several authorization states into one consent status.
///
/// Precedence: rejected > revoked > expired > created > custom > active.
/// The expired tier only comes from `system-expired` authorizations and is an
/// addition to the base rejected > revoked > created > custom > active order.
/// No authorization resources at all yields `Created`.
pub fn derive_all(statuses: &[AuthorizationStatus]) -> Derivation {
    if statuses.is_empty() {
        return Derivation::Status(ConsentStatus::Created);
    }
    let derived: Vec<Derivation> = statuses.iter().map(derive_one).collect();
    let has = |s: ConsentStatus| derived.contains(&Derivation::Status(s));

    for status in [
        ConsentStatus::Rejected,
        ConsentStatus::Revoked,
        ConsentStatus::Expired,
        ConsentStatus::Created,
    ] {
        if has(status) {
            return Derivation::Status(status);
        }
    }
    if derived.contains(&Derivation::Undetermined) {
        return Derivation::Undetermined;
    }
    Derivation::Status(ConsentStatus::Active)
}

/// What the time-based check decided for a consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// Validity time not reached (or none set).
    Valid,
    /// Active consent past its validity time; must be moved to `Expired`.
    Expire,
    /// Past validity but in a status that is kept as is.
    Elapsed,
}

pub fn check_expiry(status: ConsentStatus, validity_time: Option<i64>, now_millis: i64) -> ExpiryCheck {
    if !clock::validity_elapsed(validity_time, now_millis) {
        return ExpiryCheck::Valid;
    }
    if status == ConsentStatus::Active {
        ExpiryCheck::Expire
    } else {
        ExpiryCheck::Elapsed
    }
}

/// Input handed to the extension hook when the engine cannot derive a status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequest {
    pub org_id: String,
    pub consent_id: Option<String>,
    pub consent_type: String,
    pub prior_status: Option<ConsentStatus>,
    pub authorization_statuses: Vec<String>,
}

/// External decision point for custom authorization states.
#[async_trait]
pub trait StatusExtension: Send + Sync {
    /// Returns the consent status to use, or `None` to keep the prior one.
    async fn resolve_status(
        &self,
        request: &ExtensionRequest,
    ) -> Result<Option<ConsentStatus>, ConsentError>;
}

/// Derivation plus the optional extension fallback.
#[derive(Clone, Default)]
pub struct StatusEngine {
    extension: Option<Arc<dyn StatusExtension>>,
}

impl fmt::Debug for StatusEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusEngine")
            .field("extension", &self.extension.is_some())
            .finish()
    }
}

impl StatusEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(extension: Arc<dyn StatusExtension>) -> Self {
        Self {
            extension: Some(extension),
        }
    }

    /// Resolves the consent status for a set of authorization states.
    /// Undetermined outcomes go to the extension if there is one, otherwise
    /// the prior status is kept (`Created` when there is none).
    pub async fn resolve(
        &self,
        statuses: &[AuthorizationStatus],
        request: ExtensionRequest,
    ) -> Result<ConsentStatus, ConsentError> {
        match derive_all(statuses) {
            Derivation::Status(status) => Ok(status),
            Derivation::Undetermined => {
                let fallback = request.prior_status.unwrap_or(ConsentStatus::Created);
                match &self.extension {
                    Some(ext) => {
                        tracing::debug!(
                            org_id = %request.org_id,
                            consent_id = ?request.consent_id,
                            "Consulting status extension for custom authorization states"
                        );
                        Ok(ext.resolve_status(&request).await?.unwrap_or(fallback))
                    }
                    None => Ok(fallback),
                }
            }
        }
    }
}
