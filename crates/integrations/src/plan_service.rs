//! Internal plan-generation service client
//!
//! The generate-plan function is a separate deployment; this client carries
//! the service bearer token plus the internal secret header and surfaces the
//! response body on failure so the regeneration orchestrator can name the
//! failing plan type.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use coach_core::Pillar;

use crate::IntegrationError;

/// Plan-generation seam
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(
        &self,
        user_id: Uuid,
        plan_type: Pillar,
        user_profile: &Value,
    ) -> Result<(), IntegrationError>;
}

#[derive(Debug, Serialize)]
struct GeneratePlanRequest<'a> {
    #[serde(rename = "userId")]
    user_id: Uuid,
    #[serde(rename = "planType")]
    plan_type: &'a str,
    #[serde(rename = "userProfile")]
    user_profile: &'a Value,
}

/// HTTP client for the generate-plan function
pub struct HttpPlanService {
    url: String,
    service_key: String,
    internal_secret: Option<String>,
    client: Client,
}

impl HttpPlanService {
    pub fn new(
        settings: &coach_config::PlanServiceSettings,
        internal_secret: Option<String>,
    ) -> Result<Self, IntegrationError> {
        if settings.url.is_empty() || settings.service_key.is_empty() {
            return Err(IntegrationError::Configuration(
                "Plan service URL or key missing".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| IntegrationError::Network(e.to_string()))?;

        Ok(Self {
            url: settings.url.clone(),
            service_key: settings.service_key.clone(),
            internal_secret: internal_secret.filter(|s| !s.is_empty()),
            client,
        })
    }
}

#[async_trait]
impl PlanGenerator for HttpPlanService {
    async fn generate_plan(
        &self,
        user_id: Uuid,
        plan_type: Pillar,
        user_profile: &Value,
    ) -> Result<(), IntegrationError> {
        let mut request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.service_key)
            .json(&GeneratePlanRequest {
                user_id,
                plan_type: plan_type.as_str(),
                user_profile,
            });

        if let Some(secret) = &self.internal_secret {
            request = request.header("X-Internal-Secret", secret);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(user_id = %user_id, plan_type = %plan_type, "plan generated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_camel_case() {
        let profile = serde_json::json!({"goal_type": "emagrecer"});
        let user_id = Uuid::new_v4();
        let body = serde_json::to_value(GeneratePlanRequest {
            user_id,
            plan_type: Pillar::Nutritional.as_str(),
            user_profile: &profile,
        })
        .unwrap();

        assert_eq!(body["planType"], "nutritional");
        assert_eq!(body["userId"], serde_json::json!(user_id));
        assert_eq!(body["userProfile"]["goal_type"], "emagrecer");
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let settings = coach_config::PlanServiceSettings {
            url: "http://localhost:9000".to_string(),
            service_key: String::new(),
            timeout_secs: 5,
        };
        assert!(matches!(
            HttpPlanService::new(&settings, None),
            Err(IntegrationError::Configuration(_))
        ));
    }
}
