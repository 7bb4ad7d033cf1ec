//! Salesforce REST adapter: the single point of entry for all CRM calls.
//!
//! Authenticates with the OAuth2 username-password flow (password + security token),
//! caches the session, and logs in again once when a call comes back 401.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::crm::{CandidateRecord, CreateOutcome, CrmError, RecordStore};

pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_API_VERSION: &str = "v59.0";
pub const DEFAULT_OBJECT: &str = "Candidate__c";

#[derive(Debug, Clone)]
pub struct SalesforceSettings {
    pub login_url: String,
    pub api_version: String,
    pub object: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub security_token: String,
}

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    message: String,
    #[serde(default, rename = "errorCode", alias = "statusCode")]
    error_code: Option<String>,
}

impl ApiErrorItem {
    fn render(&self) -> String {
        match &self.error_code {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SalesforceClient {
    client: Client,
    settings: Arc<SalesforceSettings>,
    session: Arc<RwLock<Option<Session>>>,
}

impl SalesforceClient {
    pub fn new(settings: SalesforceSettings) -> Result<Self, CrmError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            settings: Arc::new(settings),
            session: Arc::new(RwLock::new(None)),
        })
    }

    async fn login(&self) -> Result<Session, CrmError> {
        let s = &self.settings;
        let password = format!("{}{}", s.password, s.security_token);
        let response = self
            .client
            .post(format!(
                "{}/services/oauth2/token",
                s.login_url.trim_end_matches('/')
            ))
            .form(&[
                ("grant_type", "password"),
                ("client_id", s.client_id.as_str()),
                ("client_secret", s.client_secret.as_str()),
                ("username", s.username.as_str()),
                ("password", password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OAuthError>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {desc}", e.error),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(CrmError::Auth(message));
        }

        let token: TokenResponse = response.json().await?;
        info!("Salesforce session established ({})", token.instance_url);
        Ok(Session {
            access_token: token.access_token,
            instance_url: token.instance_url,
        })
    }

    /// Returns the cached session, logging in when there is none.
    async fn session(&self, refresh: bool) -> Result<Session, CrmError> {
        if !refresh {
            if let Some(session) = self.session.read().await.clone() {
                return Ok(session);
            }
        }
        let session = self.login().await?;
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn post_record(
        &self,
        session: &Session,
        record: &CandidateRecord,
    ) -> Result<reqwest::Response, CrmError> {
        let url = format!(
            "{}/services/data/{}/sobjects/{}/",
            session.instance_url.trim_end_matches('/'),
            self.settings.api_version,
            self.settings.object
        );
        Ok(self
            .client
            .post(url)
            .bearer_auth(&session.access_token)
            .json(record)
            .send()
            .await?)
    }
}

#[async_trait]
impl RecordStore for SalesforceClient {
    async fn create(&self, record: &CandidateRecord) -> Result<CreateOutcome, CrmError> {
        let mut session = self.session(false).await?;
        let mut response = self.post_record(&session, record).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Salesforce session rejected, logging in again");
            session = self.session(true).await?;
            response = self.post_record(&session, record).await?;
        }

        let status = response.status();
        if status.is_success() {
            let created: CreateResponse = response.json().await?;
            debug!("Salesforce create returned success={}", created.success);
            return Ok(CreateOutcome {
                success: created.success,
                id: created.id,
                errors: created.errors.iter().map(ApiErrorItem::render).collect(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        // Validation failures come back as 400 with a JSON array of errors.
        if status == StatusCode::BAD_REQUEST {
            if let Ok(items) = serde_json::from_str::<Vec<ApiErrorItem>>(&body) {
                return Ok(CreateOutcome {
                    success: false,
                    id: None,
                    errors: items.iter().map(ApiErrorItem::render).collect(),
                });
            }
        }
        Err(CrmError::Api {
            status: status.as_u16(),
            message: body,
        })
    }
}
