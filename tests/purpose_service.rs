mod helpers;

use consent_mgt::errors::ConsentError;
use consent_mgt::model::ConsentUpdateRequest;
use helpers::{ConsentBuilder, PurposeBuilder, TestEnv};

const ORG: &str = "org-1";

#[tokio::test]
async fn test_list_types() {
    let env = TestEnv::new().await;
    assert_eq!(
        env.purposes.list_types(),
        vec!["attribute", "json-schema", "string"]
    );
}

#[tokio::test]
async fn test_attribute_purpose_round_trip() {
    let env = TestEnv::new().await;
    let created = PurposeBuilder::new("Balance")
        .with_type("attribute")
        .with_description("Account balance")
        .with_attribute("resourcePath", " /accounts ")
        .with_attribute("jsonPath", "$.balance")
        .create(&env.purposes, ORG)
        .await;

    let fetched = env.purposes.get(&created.purpose_id, ORG).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.purpose_type, "attribute");
    assert_eq!(fetched.description.as_deref(), Some("Account balance"));
    assert_eq!(
        fetched.attributes.get("resourcePath").map(String::as_str),
        Some("/accounts")
    );
    assert_eq!(
        fetched.attributes.get("jsonPath").map(String::as_str),
        Some("$.balance")
    );

    let by_name = env.purposes.get_by_name("Balance", ORG).await.unwrap();
    assert_eq!(by_name.purpose_id, created.purpose_id);

    // Purposes are tenant scoped
    assert!(env
        .purposes
        .get(&created.purpose_id, "org-2")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_json_schema_is_validated_and_compacted() {
    let env = TestEnv::new().await;
    let created = PurposeBuilder::new("Marketing")
        .with_type("json-schema")
        .with_attribute("validationSchema", "{ \"type\" : \"object\" }")
        .create(&env.purposes, ORG)
        .await;
    assert_eq!(
        created.attributes.get("validationSchema").map(String::as_str),
        Some(r#"{"type":"object"}"#)
    );

    let err = env
        .purposes
        .create(
            PurposeBuilder::new("Broken")
                .with_type("json-schema")
                .with_attribute("validationSchema", "{not json")
                .build(),
            ORG,
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_unknown_type_is_rejected() {
    let env = TestEnv::new().await;
    let err = env
        .purposes
        .create(PurposeBuilder::new("X").with_type("binary").build(), ORG)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_duplicate_name_conflicts() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("AccountAccess")
        .create(&env.purposes, ORG)
        .await;

    let err = env
        .purposes
        .create(PurposeBuilder::new("AccountAccess").build(), ORG)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Same name in another tenant is fine
    PurposeBuilder::new("AccountAccess")
        .create(&env.purposes, "org-2")
        .await;
}

#[tokio::test]
async fn test_batch_is_all_or_nothing_on_existing_name() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("Second")
        .create(&env.purposes, ORG)
        .await;

    let err = env
        .purposes
        .create_batch(
            vec![
                PurposeBuilder::new("First").build(),
                PurposeBuilder::new("Second").build(),
                PurposeBuilder::new("Third").build(),
            ],
            ORG,
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let page = env.purposes.list(ORG, None, None, None).await.unwrap();
    let names: Vec<&str> = page.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Second"]);
}

#[tokio::test]
async fn test_batch_reports_every_invalid_entry() {
    let env = TestEnv::new().await;

    let err = env
        .purposes
        .create_batch(
            vec![
                PurposeBuilder::new("A").build(),
                PurposeBuilder::new("B").with_type("json-schema").build(),
                PurposeBuilder::new("A").build(),
            ],
            ORG,
        )
        .await
        .unwrap_err();
    match err {
        ConsentError::Validation { fields, .. } => {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            assert!(names.contains(&"purposes[1].validationSchema"));
            assert!(names.contains(&"purposes[2].name"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let page = env.purposes.list(ORG, None, None, None).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_batch_creates_all() {
    let env = TestEnv::new().await;
    let created = env
        .purposes
        .create_batch(
            vec![
                PurposeBuilder::new("One").build(),
                PurposeBuilder::new("Two")
                    .with_type("attribute")
                    .with_attribute("resourcePath", "/accounts")
                    .with_attribute("jsonPath", "$.id")
                    .build(),
            ],
            ORG,
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    let page = env.purposes.list(ORG, None, None, None).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_list_filters_by_name_and_paginates() {
    let env = TestEnv::new().await;
    for name in ["AccountRead", "AccountWrite", "Payments"] {
        PurposeBuilder::new(name).create(&env.purposes, ORG).await;
    }

    let accounts = env
        .purposes
        .list(ORG, Some("Account"), None, None)
        .await
        .unwrap();
    assert_eq!(accounts.total, 2);

    let first = env.purposes.list(ORG, None, Some(2), None).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.items.len(), 2);
    let rest = env.purposes.list(ORG, None, Some(2), Some(2)).await.unwrap();
    assert_eq!(rest.items.len(), 1);
    assert_eq!(rest.offset, 2);
}

#[tokio::test]
async fn test_bound_purpose_cannot_be_renamed_or_deleted() {
    let env = TestEnv::new().await;
    let purpose = PurposeBuilder::new("AccountAccess")
        .create(&env.purposes, ORG)
        .await;
    let consent = ConsentBuilder::new()
        .with_purpose("AccountAccess")
        .create(&env.consents, ORG)
        .await;
    assert_eq!(consent.purposes.len(), 1);
    assert_eq!(consent.purposes[0].purpose_id, purpose.purpose_id);

    let err = env
        .purposes
        .update(
            &purpose.purpose_id,
            ORG,
            PurposeBuilder::new("AccountAccessV2").build(),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let updated = env
        .purposes
        .update(
            &purpose.purpose_id,
            ORG,
            PurposeBuilder::new("AccountAccess")
                .with_description("Read account data")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("Read account data"));

    assert!(env
        .purposes
        .delete(&purpose.purpose_id, ORG)
        .await
        .unwrap_err()
        .is_conflict());

    // Dropping the binding releases the purpose
    env.consents
        .update(
            &consent.consent.consent_id,
            ORG,
            ConsentUpdateRequest {
                purposes: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    env.purposes
        .update(
            &purpose.purpose_id,
            ORG,
            PurposeBuilder::new("AccountAccessV2").build(),
        )
        .await
        .unwrap();
    env.purposes.delete(&purpose.purpose_id, ORG).await.unwrap();
    assert!(env
        .purposes
        .get(&purpose.purpose_id, ORG)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_rename_onto_existing_name_conflicts() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("Taken").create(&env.purposes, ORG).await;
    let other = PurposeBuilder::new("Other").create(&env.purposes, ORG).await;

    let err = env
        .purposes
        .update(&other.purpose_id, ORG, PurposeBuilder::new("Taken").build())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_validate_names() {
    let env = TestEnv::new().await;
    PurposeBuilder::new("A").create(&env.purposes, ORG).await;
    PurposeBuilder::new("B").create(&env.purposes, ORG).await;

    let mut found = env
        .purposes
        .validate_names(
            &["A".to_string(), "C".to_string(), "B".to_string(), "A".to_string()],
            ORG,
        )
        .await
        .unwrap();
    found.sort();
    assert_eq!(found, vec!["A".to_string(), "B".to_string()]);

    assert!(env
        .purposes
        .validate_names(&["C".to_string()], ORG)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(env
        .purposes
        .validate_names(&[], ORG)
        .await
        .unwrap_err()
        .is_validation());
}
