use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::Mutex;

use super::AccessTokenProvider;
use crate::{
    error::{DigestError, DigestResult},
    util::check_expired,
    HttpClient,
};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Authorized user file, as written by Google's installed app flow.
/// Unknown fields are kept so the file survives a refresh intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        serialize_with = "serialize_expiry"
    )]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Accepts RFC 3339 as well as the naive `2024-03-05T14:30:00.123456` form, read as UTC
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_expiry))
}

fn serialize_expiry<S>(expiry: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match expiry {
        Some(expiry) => serializer.serialize_str(&expiry.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc()))
        .ok()
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Credentials backed by a token file. Expired tokens are refreshed through
/// the OAuth token endpoint and the file is rewritten.
pub struct TokenFile {
    path: PathBuf,
    http_client: HttpClient,
    cached: Mutex<Option<StoredCredentials>>,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>, http_client: HttpClient) -> Self {
        TokenFile {
            path: path.into(),
            http_client,
            cached: Mutex::new(None),
        }
    }

    async fn read(&self) -> DigestResult<StoredCredentials> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DigestError::Auth(format!(
                "Could not read token file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            DigestError::Auth(format!(
                "Invalid token file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn write(&self, creds: &StoredCredentials) -> DigestResult<()> {
        let content = serde_json::to_string_pretty(creds)
            .map_err(|e| DigestError::Internal(e.into()))?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            DigestError::Internal(anyhow::anyhow!(
                "Could not write token file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn exchange_refresh_token(
        &self,
        creds: &StoredCredentials,
    ) -> DigestResult<RefreshTokenResponse> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            creds.refresh_token.as_deref(),
            creds.client_id.as_deref(),
            creds.client_secret.as_deref(),
        ) else {
            return Err(DigestError::Auth(
                "Token expired and the token file has no refresh credentials".to_string(),
            ));
        };

        let resp = self
            .http_client
            .post(&creds.token_uri)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Error refreshing token: {:?}", e);
                match DigestError::from(e) {
                    DigestError::RequestTimeout => {
                        DigestError::Auth("Token refresh timed out".to_string())
                    }
                    other => DigestError::Auth(format!("Token refresh request failed: {other}")),
                }
            })?;

        let resp = resp.json::<serde_json::Value>().await.map_err(|e| {
            tracing::error!("Unexpected serde error: {:?}", e);
            DigestError::Auth(format!("Unreadable token refresh response: {e}"))
        })?;

        if let Some(error) = resp.get("error") {
            let description = resp
                .get("error_description")
                .and_then(|d| d.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            tracing::error!("Error refreshing token: {}", description);
            return Err(DigestError::Auth(description));
        }

        serde_json::from_value::<RefreshTokenResponse>(resp.clone()).map_err(|_| {
            tracing::error!("Unexpected oauth2 response: {:?}", resp);
            DigestError::Auth("Unexpected token refresh response".to_string())
        })
    }
}

impl AccessTokenProvider for TokenFile {
    async fn access_token(&self) -> DigestResult<String> {
        let mut cached = self.cached.lock().await;
        let mut creds = match cached.take() {
            Some(creds) => creds,
            None => self.read().await?,
        };

        let usable = match (&creds.token, creds.expiry) {
            (Some(token), Some(expiry)) => !token.is_empty() && !check_expired(expiry),
            (Some(token), None) => !token.is_empty() && creds.refresh_token.is_none(),
            (None, _) => false,
        };

        if !usable {
            tracing::info!("Access token expired, refreshing");
            let refreshed = self.exchange_refresh_token(&creds).await?;
            creds.token = Some(refreshed.access_token);
            creds.expiry = Some(Utc::now() + Duration::seconds(refreshed.expires_in));
            if let Err(e) = self.write(&creds).await {
                tracing::warn!("Refreshed token was not persisted: {}", e);
            }
        }

        let token = creds.token.clone().unwrap_or_default();
        *cached = Some(creds);
        Ok(token)
    }
}
