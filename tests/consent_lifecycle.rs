mod helpers;

use async_trait::async_trait;
use consent_mgt::errors::ConsentError;
use consent_mgt::model::{
    AuthorizationRequest, ConsentSearchFilter, ConsentUpdateRequest,
};
use consent_mgt::status::{
    AuthorizationStatus, ConsentStatus, ExtensionRequest, StatusEngine, StatusExtension,
};
use consent_mgt::ConsentService;
use helpers::{ConsentBuilder, PurposeBuilder, TestEnv, NOW};
use std::sync::Arc;

const ORG: &str = "org-1";

#[tokio::test]
async fn test_create_without_authorizations_is_created() {
    let env = TestEnv::new().await;

    let detail = ConsentBuilder::new()
        .with_attribute("branch", "north")
        .create(&env.consents, ORG)
        .await;

    assert_eq!(detail.consent.status, ConsentStatus::Created);
    assert_eq!(detail.consent.created_time, NOW);
    assert_eq!(detail.attributes.get("branch").map(String::as_str), Some("north"));

    let history = env
        .consents
        .status_history(&detail.consent.consent_id, ORG)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_status, None);
    assert_eq!(history[0].current_status, ConsentStatus::Created);
    assert_eq!(history[0].reason.as_deref(), Some("initial creation"));
}

#[tokio::test]
async fn test_create_derives_status_from_authorizations() {
    let env = TestEnv::new().await;

    let active = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .create(&env.consents, ORG)
        .await;
    assert_eq!(active.consent.status, ConsentStatus::Active);

    let rejected = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_authorization("bob", "rejected")
        .with_authorization("carol", "created")
        .create(&env.consents, ORG)
        .await;
    assert_eq!(rejected.consent.status, ConsentStatus::Rejected);
    assert_eq!(rejected.authorizations.len(), 3);
}

#[tokio::test]
async fn test_create_rejects_malformed_input() {
    let env = TestEnv::new().await;

    let err = env
        .consents
        .create(ConsentBuilder::new().build(), "", ORG)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = env
        .consents
        .create(ConsentBuilder::new().build(), "client", "")
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let mut request = ConsentBuilder::new().with_type("").build();
    request.frequency = Some(-1);
    match env.consents.create(request, "client", ORG).await.unwrap_err() {
        ConsentError::Validation { fields, .. } => {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            assert!(names.contains(&"consentType"));
            assert!(names.contains(&"frequency"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_with_unknown_purpose_writes_nothing() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("AccountAccess")
        .create(&env.purposes, ORG)
        .await;

    let err = env
        .consents
        .create(
            ConsentBuilder::new()
                .with_purpose("AccountAccess")
                .with_purpose("Missing")
                .build(),
            "client",
            ORG,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let page = env
        .consents
        .search(&ConsentSearchFilter::default(), ORG)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_get_twice_is_identical() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_validity_time(NOW + 60_000)
        .create(&env.consents, ORG)
        .await;

    let first = env.consents.get(&created.consent.consent_id, ORG).await.unwrap();
    let second = env.consents.get(&created.consent.consent_id, ORG).await.unwrap();
    assert_eq!(first, second);
    assert!(!first.validity_elapsed);
}

#[tokio::test]
async fn test_get_missing_and_wrong_tenant() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new().create(&env.consents, ORG).await;

    assert!(env.consents.get("nope", ORG).await.unwrap_err().is_not_found());
    assert!(env
        .consents
        .get(&created.consent.consent_id, "org-2")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_get_expires_active_consent_past_validity() {
    let env = TestEnv::new().await;
    // Validity given in seconds
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_validity_time(NOW / 1000 + 60)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();
    assert_eq!(created.consent.status, ConsentStatus::Active);

    env.clock.advance(120_000);
    let detail = env.consents.get(&id, ORG).await.unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Expired);
    assert!(detail.validity_elapsed);

    let history = env.consents.status_history(&id, ORG).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.previous_status, Some(ConsentStatus::Active));
    assert_eq!(last.current_status, ConsentStatus::Expired);
    assert_eq!(last.action_by.as_deref(), Some("system"));

    // A second read does not write another transition
    env.consents.get(&id, ORG).await.unwrap();
    assert_eq!(env.consents.status_history(&id, ORG).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_revoked_consent_past_validity_keeps_status() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_validity_time(NOW + 1_000)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();
    env.consents
        .revoke(&id, ORG, Some("user request"), Some("alice"))
        .await
        .unwrap();

    env.clock.advance(10_000);
    let detail = env.consents.get(&id, ORG).await.unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Revoked);
    assert!(detail.validity_elapsed);
}

#[tokio::test]
async fn test_expired_consent_never_returns_to_active() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_validity_time(NOW + 1_000)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    env.clock.advance(5_000);
    env.consents.get(&id, ORG).await.unwrap();

    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                validity_time: Some(NOW + 10_000_000),
                authorizations: Some(vec![AuthorizationRequest {
                    auth_type: "authorisation".to_string(),
                    user_id: Some("alice".to_string()),
                    status: "approved".to_string(),
                    approved_purpose_details: None,
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Expired);
    assert!(detail
        .authorizations
        .iter()
        .all(|a| a.status == AuthorizationStatus::SystemExpired));

    let again = env.consents.get(&id, ORG).await.unwrap();
    assert_eq!(again.consent.status, ConsentStatus::Expired);
}

#[tokio::test]
async fn test_update_of_elapsed_active_consent_forces_expiry() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_authorization("bob", "approved")
        .with_validity_time(NOW + 1_000)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    env.clock.advance(5_000);
    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                frequency: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.consent.status, ConsentStatus::Expired);
    assert_eq!(detail.consent.frequency, Some(2));
    assert_eq!(detail.authorizations.len(), 2);
    assert!(detail
        .authorizations
        .iter()
        .all(|a| a.status == AuthorizationStatus::SystemExpired));
}

#[tokio::test]
async fn test_update_cannot_activate_elapsed_consent() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "created")
        .with_validity_time(NOW + 1_000)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();
    assert_eq!(created.consent.status, ConsentStatus::Created);

    env.clock.advance(5_000);
    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                authorizations: Some(vec![AuthorizationRequest {
                    auth_type: "authorisation".to_string(),
                    user_id: Some("alice".to_string()),
                    status: "approved".to_string(),
                    approved_purpose_details: None,
                }]),
                actor: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.consent.status, ConsentStatus::Expired);
    assert!(detail.validity_elapsed);
    assert!(detail
        .authorizations
        .iter()
        .all(|a| a.status == AuthorizationStatus::SystemExpired));

    let history = env.consents.status_history(&id, ORG).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].previous_status, Some(ConsentStatus::Created));
    assert_eq!(history[1].current_status, ConsentStatus::Expired);
    assert_eq!(history[1].action_by.as_deref(), Some("system"));

    // Later reads see the same record and write nothing
    let validation = env.consents.validate(&id, Some("alice"), ORG).await.unwrap();
    assert_eq!(validation.error_code.as_deref(), Some("consent_expired"));
    assert_eq!(env.consents.status_history(&id, ORG).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_extending_validity_keeps_consent_usable() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "created")
        .with_validity_time(NOW + 1_000)
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                validity_time: Some(NOW + 60_000),
                authorizations: Some(vec![AuthorizationRequest {
                    auth_type: "authorisation".to_string(),
                    user_id: Some("alice".to_string()),
                    status: "approved".to_string(),
                    approved_purpose_details: None,
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Active);
    assert_eq!(detail.consent.validity_time, Some(NOW + 60_000));

    env.clock.advance(5_000);
    let detail = env.consents.get(&id, ORG).await.unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Active);
    assert!(!detail.validity_elapsed);
}

#[tokio::test]
async fn test_update_replaces_attributes_and_audits_only_on_change() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_attribute("a", "1")
        .with_attribute("b", "2")
        .with_authorization("alice", "created")
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                attributes: Some([("c".to_string(), "3".to_string())].into_iter().collect()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.attributes.len(), 1);
    assert_eq!(detail.attributes.get("c").map(String::as_str), Some("3"));
    assert_eq!(env.consents.status_history(&id, ORG).await.unwrap().len(), 1);

    env.clock.advance(1_000);
    let detail = env
        .consents
        .update(
            &id,
            ORG,
            ConsentUpdateRequest {
                authorizations: Some(vec![AuthorizationRequest {
                    auth_type: "authorisation".to_string(),
                    user_id: Some("alice".to_string()),
                    status: "approved".to_string(),
                    approved_purpose_details: None,
                }]),
                actor: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.consent.status, ConsentStatus::Active);
    assert_eq!(detail.authorizations.len(), 1);

    let history = env.consents.status_history(&id, ORG).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_update_with_custom_state_preserves_prior_status() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .create(&env.consents, ORG)
        .await;

    let detail = env
        .consents
        .update(
            &created.consent.consent_id,
            ORG,
            ConsentUpdateRequest {
                authorizations: Some(vec![AuthorizationRequest {
                    auth_type: "authorisation".to_string(),
                    user_id: Some("alice".to_string()),
                    status: "awaiting-step-up".to_string(),
                    approved_purpose_details: None,
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.consent.status, ConsentStatus::Active);
    assert_eq!(
        detail.authorizations[0].status,
        AuthorizationStatus::Custom("awaiting-step-up".to_string())
    );
}

struct RejectCustom;

#[async_trait]
impl StatusExtension for RejectCustom {
    async fn resolve_status(
        &self,
        _request: &ExtensionRequest,
    ) -> Result<Option<ConsentStatus>, ConsentError> {
        Ok(Some(ConsentStatus::Rejected))
    }
}

#[tokio::test]
async fn test_extension_decides_custom_states() {
    let env = TestEnv::new().await;
    let consents = ConsentService::new(env.db.connection().clone())
        .with_clock(env.clock.clone())
        .with_engine(StatusEngine::with_extension(Arc::new(RejectCustom)));

    let detail = ConsentBuilder::new()
        .with_authorization("alice", "needs-review")
        .create(&consents, ORG)
        .await;
    assert_eq!(detail.consent.status, ConsentStatus::Rejected);
}

#[tokio::test]
async fn test_revoke() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    let revoked = env
        .consents
        .revoke(&id, ORG, Some("user request"), Some("alice"))
        .await
        .unwrap();
    assert_eq!(revoked.consent.status, ConsentStatus::Revoked);
    assert!(revoked
        .authorizations
        .iter()
        .all(|a| a.status == AuthorizationStatus::SystemRevoked));

    let history = env.consents.status_history(&id, ORG).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.current_status, ConsentStatus::Revoked);
    assert_eq!(last.reason.as_deref(), Some("user request"));

    let err = env.consents.revoke(&id, ORG, None, None).await.unwrap_err();
    assert!(err.is_validation());
    assert!(env
        .consents
        .revoke("missing", ORG, None, None)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_expire_explicitly() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    let expired = env.consents.expire(&id, ORG, None).await.unwrap();
    assert_eq!(expired.consent.status, ConsentStatus::Expired);
    assert_eq!(
        expired.authorizations[0].status,
        AuthorizationStatus::SystemExpired
    );
    assert!(env.consents.expire(&id, ORG, None).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_delete_cascades_but_keeps_history() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("AccountAccess")
        .create(&env.purposes, ORG)
        .await;
    let created = ConsentBuilder::new()
        .with_attribute("k", "v")
        .with_authorization("alice", "approved")
        .with_purpose("AccountAccess")
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();
    let auth_id = created.authorizations[0].auth_id.clone();

    env.consents.delete(&id, ORG).await.unwrap();

    assert!(env.consents.get(&id, ORG).await.unwrap_err().is_not_found());
    assert!(env
        .consents
        .get_authorization(&auth_id, ORG)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(env
        .consents
        .search_by_attribute("k", None, ORG)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(env.consents.status_history(&id, ORG).await.unwrap().len(), 1);

    // The purpose is no longer bound and may be deleted
    let purpose = env.purposes.get_by_name("AccountAccess", ORG).await.unwrap();
    env.purposes.delete(&purpose.purpose_id, ORG).await.unwrap();

    assert!(env.consents.delete(&id, ORG).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_search_by_attribute() {
    let env = TestEnv::new().await;
    let a = ConsentBuilder::new()
        .with_attribute("branch", "north")
        .create(&env.consents, ORG)
        .await;
    let b = ConsentBuilder::new()
        .with_attribute("branch", "south")
        .create(&env.consents, ORG)
        .await;
    ConsentBuilder::new()
        .with_attribute("other", "x")
        .create(&env.consents, ORG)
        .await;

    let mut all = env
        .consents
        .search_by_attribute("branch", None, ORG)
        .await
        .unwrap();
    all.sort();
    let mut expected = vec![a.consent.consent_id.clone(), b.consent.consent_id.clone()];
    expected.sort();
    assert_eq!(all, expected);

    let north = env
        .consents
        .search_by_attribute("branch", Some("north"), ORG)
        .await
        .unwrap();
    assert_eq!(north, vec![a.consent.consent_id.clone()]);

    assert!(env
        .consents
        .search_by_attribute(" ", None, ORG)
        .await
        .unwrap_err()
        .is_validation());
}

#[tokio::test]
async fn test_search_filters_and_paginates() {
    let env = TestEnv::new().await;
    for i in 0..3 {
        env.clock.advance(1);
        ConsentBuilder::new()
            .with_client("client-a")
            .with_authorization(&format!("user-{i}"), "approved")
            .create(&env.consents, ORG)
            .await;
    }
    ConsentBuilder::new()
        .with_client("client-b")
        .with_authorization("user-0", "rejected")
        .create(&env.consents, ORG)
        .await;

    let page = env
        .consents
        .search(
            &ConsentSearchFilter {
                statuses: vec![ConsentStatus::Active],
                limit: Some(2),
                ..Default::default()
            },
            ORG,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.limit, 2);

    let by_user = env
        .consents
        .search(
            &ConsentSearchFilter {
                user_ids: vec!["user-0".to_string()],
                ..Default::default()
            },
            ORG,
        )
        .await
        .unwrap();
    assert_eq!(by_user.total, 2);

    let by_client = env
        .consents
        .search(
            &ConsentSearchFilter {
                client_ids: vec!["client-b".to_string()],
                limit: Some(10_000),
                ..Default::default()
            },
            ORG,
        )
        .await
        .unwrap();
    assert_eq!(by_client.total, 1);
    assert_eq!(by_client.limit, 100);
}

#[tokio::test]
async fn test_authorization_changes_rederive_status() {
    let env = TestEnv::new().await;
    let created = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .create(&env.consents, ORG)
        .await;
    let id = created.consent.consent_id.clone();

    env.clock.advance(1_000);
    let bob = env
        .consents
        .add_authorization(
            &id,
            ORG,
            AuthorizationRequest {
                auth_type: "authorisation".to_string(),
                user_id: Some("bob".to_string()),
                status: "created".to_string(),
                approved_purpose_details: None,
            },
            Some("bob"),
        )
        .await
        .unwrap();
    assert_eq!(
        env.consents.get(&id, ORG).await.unwrap().consent.status,
        ConsentStatus::Created
    );

    env.clock.advance(1_000);
    env.consents
        .update_authorization_status(&bob.auth_id, ORG, "approved", Some("bob"))
        .await
        .unwrap();
    assert_eq!(
        env.consents.get(&id, ORG).await.unwrap().consent.status,
        ConsentStatus::Active
    );

    env.clock.advance(1_000);
    env.consents
        .update_authorization_status(&bob.auth_id, ORG, "rejected", Some("bob"))
        .await
        .unwrap();
    assert_eq!(
        env.consents.get(&id, ORG).await.unwrap().consent.status,
        ConsentStatus::Rejected
    );

    // Rejected is terminal
    let err = env
        .consents
        .update_authorization_status(&bob.auth_id, ORG, "approved", Some("bob"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let auths = env.consents.list_authorizations(&id, ORG).await.unwrap();
    assert_eq!(auths.len(), 2);
    let history = env.consents.status_history(&id, ORG).await.unwrap();
    let statuses: Vec<ConsentStatus> = history.iter().map(|a| a.current_status).collect();
    assert_eq!(
        statuses,
        vec![
            ConsentStatus::Active,
            ConsentStatus::Created,
            ConsentStatus::Active,
            ConsentStatus::Rejected
        ]
    );
}

#[tokio::test]
async fn test_validate() {
    let env = TestEnv::new().await;
    let active = ConsentBuilder::new()
        .with_authorization("alice", "approved")
        .with_validity_time(NOW + 10_000)
        .create(&env.consents, ORG)
        .await;
    let id = active.consent.consent_id.clone();

    let ok = env.consents.validate(&id, Some("alice"), ORG).await.unwrap();
    assert!(ok.is_valid);
    assert!(ok.consent.is_some());

    let wrong_user = env.consents.validate(&id, Some("mallory"), ORG).await.unwrap();
    assert!(!wrong_user.is_valid);
    assert_eq!(wrong_user.error_code.as_deref(), Some("user_not_authorized"));

    let missing = env.consents.validate("missing", None, ORG).await.unwrap();
    assert!(!missing.is_valid);
    assert_eq!(missing.error_code.as_deref(), Some("consent_not_found"));
    assert!(missing.consent.is_none());

    let pending = ConsentBuilder::new()
        .with_authorization("alice", "created")
        .create(&env.consents, ORG)
        .await;
    let not_active = env
        .consents
        .validate(&pending.consent.consent_id, None, ORG)
        .await
        .unwrap();
    assert_eq!(not_active.error_code.as_deref(), Some("consent_not_active"));
    assert!(not_active.consent.is_some());

    env.clock.advance(20_000);
    let expired = env.consents.validate(&id, Some("alice"), ORG).await.unwrap();
    assert!(!expired.is_valid);
    assert_eq!(expired.error_code.as_deref(), Some("consent_expired"));
    assert_eq!(
        expired.consent.unwrap().consent.status,
        ConsentStatus::Expired
    );
}
