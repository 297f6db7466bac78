//! Salesforce REST client behind the `CrmClient` boundary.
//!
//! Lead writes go through the sobject endpoint; duplicate lookups go through
//! the SOQL query endpoint. Salesforce reports duplicate-rule rejections as a
//! 400 with an error array, so classification happens on the error payload
//! rather than the status code alone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use leadflow_core::config::CrmConfig;
use leadflow_core::domain::lead::LeadId;
use leadflow_core::domain::snapshot::CrmFieldMap;
use leadflow_engine::{CrmClient, CrmError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct SalesforceClient {
    client: Client,
    base_url: String,
    api_version: String,
    access_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct CreateLeadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    message: String,
    #[serde(rename = "errorCode")]
    error_code: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    records: Vec<QueryRecord>,
}

#[derive(Debug, Deserialize)]
struct QueryRecord {
    #[serde(rename = "Id")]
    id: String,
}

impl SalesforceClient {
    pub fn new(config: &CrmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn lead_url(&self) -> String {
        format!("{}/services/data/{}/sobjects/Lead", self.base_url, self.api_version)
    }

    fn query_url(&self) -> String {
        format!("{}/services/data/{}/query", self.base_url, self.api_version)
    }

    fn token(&self) -> &str {
        self.access_token.expose_secret()
    }

    async fn find_by_unique_field(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<LeadId>, CrmError> {
        let soql =
            format!("SELECT Id FROM Lead WHERE {field} = '{}' LIMIT 1", escape_soql(value));

        let response = self
            .client
            .get(self.query_url())
            .bearer_auth(self.token())
            .query(&[("q", soql.as_str())])
            .send()
            .await
            .map_err(|error| CrmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|error| CrmError::Transport(format!("query decode failed: {error}")))?;

        Ok(parsed.records.into_iter().next().map(|record| LeadId(record.id)))
    }
}

#[async_trait]
impl CrmClient for SalesforceClient {
    async fn create_lead(&self, fields: &CrmFieldMap) -> Result<LeadId, CrmError> {
        let response = self
            .client
            .post(self.lead_url())
            .bearer_auth(self.token())
            .json(fields)
            .send()
            .await
            .map_err(|error| CrmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "crm.salesforce.create_rejected", status = %status, body = %body);
            return Err(classify_error(status, &body));
        }

        let parsed: CreateLeadResponse = response
            .json()
            .await
            .map_err(|error| CrmError::Transport(format!("create decode failed: {error}")))?;

        debug!(event_name = "crm.salesforce.lead_created", lead_id = %parsed.id);
        Ok(LeadId(parsed.id))
    }

    async fn update_lead(&self, lead_id: &LeadId, fields: &CrmFieldMap) -> Result<(), CrmError> {
        let response = self
            .client
            .patch(format!("{}/{}", self.lead_url(), lead_id))
            .bearer_auth(self.token())
            .json(fields)
            .send()
            .await
            .map_err(|error| CrmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "crm.salesforce.update_rejected", status = %status, body = %body);
            return Err(classify_error(status, &body));
        }

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LeadId>, CrmError> {
        self.find_by_unique_field("Email", email).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<LeadId>, CrmError> {
        self.find_by_unique_field("Phone", phone).await
    }
}

/// Maps a non-success Salesforce response to the typed CRM error. Duplicate
/// rules arrive as a 400 whose error array carries the human-readable rule
/// message, so both the code and the message text are inspected.
fn classify_error(status: StatusCode, body: &str) -> CrmError {
    let entries: Vec<ApiErrorEntry> = serde_json::from_str(body).unwrap_or_default();

    for entry in &entries {
        let duplicate_rule = matches!(
            entry.error_code.as_str(),
            "DUPLICATES_DETECTED" | "DUPLICATE_VALUE" | "DUPLICATE_EXTERNAL_ID"
        );
        if duplicate_rule {
            let message = entry.message.to_ascii_lowercase();
            if message.contains("phone") {
                return CrmError::DuplicatePhone;
            }
            return CrmError::DuplicateEmail;
        }
    }

    let detail = entries
        .first()
        .map(|entry| format!("{}: {}", entry.error_code, entry.message))
        .unwrap_or_else(|| format!("status {status}"));

    match status {
        StatusCode::NOT_FOUND => CrmError::NotFound(detail),
        status if status.is_client_error() => CrmError::MalformedRequest(detail),
        _ => CrmError::Transport(detail),
    }
}

fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
