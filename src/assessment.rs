use crate::error::{AutomationError, Result};
use crate::extract::LeadInfo;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument};

/// Credentials minted by the external assessment platform. The login code is
/// one-time per leader and must never be regenerated once issued.
#[derive(Debug, Clone)]
pub struct AssessmentLink {
    pub login_code: String,
    pub response_url: Option<String>,
}

#[async_trait]
pub trait AssessmentApi: Send + Sync {
    /// Single synchronous call; a non-2xx response or a missing login code
    /// is a hard failure, not retried here.
    async fn create_link(&self, lead: &LeadInfo) -> Result<AssessmentLink>;
}

/// HTTP client for the assessment-link API.
pub struct HttpAssessmentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAssessmentClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Reads `ASSESSMENT_API_URL` and `ASSESSMENT_API_KEY` from the
    /// environment (populated via .env in development).
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let base_url = std::env::var("ASSESSMENT_API_URL")?;
        let api_key = std::env::var("ASSESSMENT_API_KEY")?;
        Self::new(&base_url, &api_key, timeout)
    }
}

#[async_trait]
impl AssessmentApi for HttpAssessmentClient {
    #[instrument(skip(self, lead), fields(email = %lead.email))]
    async fn create_link(&self, lead: &LeadInfo) -> Result<AssessmentLink> {
        let url = format!("{}/links", self.base_url);
        let body = json!({
            "email": lead.email,
            "firstName": lead.first_name,
            "lastName": lead.last_name,
            "company": lead.company_name,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AutomationError::LinkGeneration(format!(
                "API returned {status}: {detail}"
            )));
        }

        let payload: Value = response.json().await?;
        let login_code = payload["loginCode"]
            .as_str()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AutomationError::LinkGeneration("response missing loginCode".to_string())
            })?
            .to_string();
        let response_url = payload["responseUrl"]
            .as_str()
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        info!("Minted assessment login code");
        Ok(AssessmentLink {
            login_code,
            response_url,
        })
    }
}
