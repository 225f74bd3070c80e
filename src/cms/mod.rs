//! DatoCMS management API integration for environment operations
//!
//! The orchestrator and retention only talk to [`CmsBackend`]; the reqwest
//! implementation below targets the site API's JSON:API wire format. Tests
//! substitute a scripted fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default base URL of the DatoCMS site API
pub const DEFAULT_API_BASE_URL: &str = "https://site-api.datocms.com";

/// A CMS environment as returned by the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    /// The designated production environment; never deletable by retention
    pub primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Errors from the CMS adapter
///
/// `NotFound` is distinguished because the orchestrator reacts to a missing
/// *source* environment by retrying the fork from the primary.
#[derive(Debug, Error)]
pub enum CmsError {
    #[error("environment not found: {0}")]
    NotFound(String),
    #[error("CMS API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("CMS request failed: {0}")]
    Http(String),
}

/// The narrow contract the core consumes from the CMS
#[async_trait]
pub trait CmsBackend: Send + Sync {
    async fn list_environments(&self, api_token: &str) -> Result<Vec<Environment>, CmsError>;

    async fn fork_environment(
        &self,
        api_token: &str,
        source_id: &str,
        new_id: &str,
    ) -> Result<Environment, CmsError>;

    async fn delete_environment(
        &self,
        api_token: &str,
        environment_id: &str,
    ) -> Result<(), CmsError>;

    /// Look up one environment by id; `None` when it does not exist
    async fn find_environment(
        &self,
        api_token: &str,
        environment_id: &str,
    ) -> Result<Option<Environment>, CmsError> {
        let environments = self.list_environments(api_token).await?;
        Ok(environments.into_iter().find(|e| e.id == environment_id))
    }
}

/// Outcome of one backup attempt; errors are carried, never propagated
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub success: bool,
    pub environment_id: Option<String>,
    pub error: Option<String>,
}

/// Create a backup by forking the source environment into `target_id`.
///
/// A leftover environment with the target name is deleted first so reruns
/// cannot collide. If the fork reports the *source* missing (stale or renamed
/// source config), it is retried exactly once from the primary environment.
pub async fn create_backup(
    cms: &dyn CmsBackend,
    api_token: &str,
    source_environment: &str,
    target_id: &str,
) -> BackupOutcome {
    let failure = |error: String| BackupOutcome {
        success: false,
        environment_id: None,
        error: Some(error),
    };

    // Remove a stale environment with the same target name, if any
    match cms.find_environment(api_token, target_id).await {
        Ok(Some(_)) => {
            if let Err(e) = cms.delete_environment(api_token, target_id).await {
                return failure(format!("Failed to replace existing {}: {}", target_id, e));
            }
        }
        Ok(None) => {}
        Err(e) => return failure(e.to_string()),
    }

    let forked = match cms
        .fork_environment(api_token, source_environment, target_id)
        .await
    {
        Ok(env) => env,
        Err(CmsError::NotFound(_)) => {
            // Source environment is gone; self-heal by forking the primary
            log::warn!(
                "Source environment '{}' not found, falling back to primary",
                source_environment
            );
            let primary = match cms.list_environments(api_token).await {
                Ok(environments) => environments.into_iter().find(|e| e.primary),
                Err(e) => return failure(e.to_string()),
            };
            let primary = match primary {
                Some(primary) => primary,
                None => return failure("No primary environment found".to_string()),
            };
            match cms
                .fork_environment(api_token, &primary.id, target_id)
                .await
            {
                Ok(env) => env,
                Err(e) => return failure(e.to_string()),
            }
        }
        Err(e) => return failure(e.to_string()),
    };

    BackupOutcome {
        success: true,
        environment_id: Some(forked.id),
        error: None,
    }
}

/// reqwest-backed client for the DatoCMS site API
pub struct DatoCmsClient {
    base_url: String,
    client: reqwest::Client,
}

impl DatoCmsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, api_token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", api_token))
            .header("Accept", "application/json")
            .header("X-Api-Version", "3")
            .header("User-Agent", "dato-backup")
    }

    async fn check(response: reqwest::Response) -> Result<serde_json::Value, CmsError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CmsError::NotFound(
                response.text().await.unwrap_or_default(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CmsError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Null);
        }
        response
            .json()
            .await
            .map_err(|e| CmsError::Http(format!("Failed to parse response: {}", e)))
    }

    fn parse_environment(data: &serde_json::Value) -> Environment {
        let created_at = data["meta"]["created_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Environment {
            id: data["id"].as_str().unwrap_or("").to_string(),
            primary: data["meta"]["primary"].as_bool().unwrap_or(false),
            created_at,
        }
    }
}

#[async_trait]
impl CmsBackend for DatoCmsClient {
    async fn list_environments(&self, api_token: &str) -> Result<Vec<Environment>, CmsError> {
        let response = self
            .request(reqwest::Method::GET, "/environments", api_token)
            .send()
            .await
            .map_err(|e| CmsError::Http(e.to_string()))?;

        let body = Self::check(response).await?;
        let environments = body["data"]
            .as_array()
            .map(|items| items.iter().map(Self::parse_environment).collect())
            .unwrap_or_default();

        Ok(environments)
    }

    async fn fork_environment(
        &self,
        api_token: &str,
        source_id: &str,
        new_id: &str,
    ) -> Result<Environment, CmsError> {
        let body = serde_json::json!({
            "data": {
                "id": new_id,
                "type": "environment",
            }
        });

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/environments/{}/fork", source_id),
                api_token,
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| CmsError::Http(e.to_string()))?;

        let body = Self::check(response).await?;
        Ok(Self::parse_environment(&body["data"]))
    }

    async fn delete_environment(
        &self,
        api_token: &str,
        environment_id: &str,
    ) -> Result<(), CmsError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/environments/{}", environment_id),
                api_token,
            )
            .send()
            .await
            .map_err(|e| CmsError::Http(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}
