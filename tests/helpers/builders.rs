use consent_mgt::model::{
    AuthorizationRequest, ConsentCreateRequest, ConsentDetail, ConsentPurpose,
    PurposeBindingRequest, PurposeRequest,
};
use consent_mgt::purpose_types::PurposeAttributes;
use consent_mgt::{ConsentService, PurposeService};

/// Builder for consent creation requests
pub struct ConsentBuilder {
    request: ConsentCreateRequest,
    client_id: String,
}

impl ConsentBuilder {
    pub fn new() -> Self {
        Self {
            request: ConsentCreateRequest {
                consent_type: "accounts".to_string(),
                ..Default::default()
            },
            client_id: "client-1".to_string(),
        }
    }

    pub fn with_client(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn with_type(mut self, consent_type: &str) -> Self {
        self.request.consent_type = consent_type.to_string();
        self
    }

    pub fn with_validity_time(mut self, validity_time: i64) -> Self {
        self.request.validity_time = Some(validity_time);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.request
            .attributes
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_authorization(mut self, user_id: &str, status: &str) -> Self {
        self.request.authorizations.push(AuthorizationRequest {
            auth_type: "authorisation".to_string(),
            user_id: Some(user_id.to_string()),
            status: status.to_string(),
            approved_purpose_details: None,
        });
        self
    }

    pub fn with_purpose(mut self, name: &str) -> Self {
        self.request.purposes.push(PurposeBindingRequest {
            name: name.to_string(),
            value: None,
            is_user_approved: true,
            is_mandatory: false,
        });
        self
    }

    pub fn build(self) -> ConsentCreateRequest {
        self.request
    }

    pub async fn create(self, service: &ConsentService, org_id: &str) -> ConsentDetail {
        let client_id = self.client_id.clone();
        service
            .create(self.request, &client_id, org_id)
            .await
            .expect("Failed to create test consent")
    }
}

impl Default for ConsentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for purpose requests
pub struct PurposeBuilder {
    request: PurposeRequest,
}

impl PurposeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            request: PurposeRequest {
                name: name.to_string(),
                description: None,
                purpose_type: "string".to_string(),
                attributes: PurposeAttributes::new(),
            },
        }
    }

    pub fn with_type(mut self, purpose_type: &str) -> Self {
        self.request.purpose_type = purpose_type.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.request.description = Some(description.to_string());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.request
            .attributes
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> PurposeRequest {
        self.request
    }

    pub async fn create(self, service: &PurposeService, org_id: &str) -> ConsentPurpose {
        service
            .create(self.request, org_id)
            .await
            .expect("Failed to create test purpose")
    }
}
