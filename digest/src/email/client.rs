use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use google_gmail1::api::{ListMessagesResponse, Message};
use leaky_bucket::RateLimiter;
use lib_email_clients::gmail::api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND};
use serde::{de::DeserializeOwned, Deserialize};
use strum::{Display, EnumString};

use crate::{digest_config::GmailSettings, HttpClient};

/// Gmail API error response structure
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiError {
    pub error: GmailApiErrorDetail,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<GmailApiErrorItem>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiErrorItem {
    pub message: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Format parameter for Gmail API message requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageFormat {
    /// Returns the full email message data with body content parsed
    Full,
    /// Returns email metadata (headers) and the snippet without body
    Metadata,
    /// Returns the full email message in RFC 2822 format as a base64url encoded string
    #[default]
    Raw,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Metadata => "metadata",
            MessageFormat::Raw => "raw",
        }
    }
}

/// Headers requested when fetching in metadata format
const METADATA_HEADERS: [&str; 3] = ["Subject", "From", "To"];

/// The two mail service calls the pipeline depends on.
///
/// `GmailClient` talks to the real API, tests plug in an in-memory mailbox.
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<ListMessagesResponse>;

    async fn get_message(&self, message_id: &str, format: MessageFormat)
        -> anyhow::Result<Message>;
}

macro_rules! gmail_url {
    ($base:expr, $($params:expr),*) => {
        {
            let list_params: Vec<&str> = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", $base, path)
        }
    };
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    http_client: HttpClient,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
    /// `<api_base>/users/<user_id>`
    user_endpoint: String,
    max_results: u32,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, settings: &GmailSettings, access_token: String) -> Self {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .max(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        let user_endpoint = format!(
            "{}/users/{}",
            settings.api_base.trim_end_matches('/'),
            settings.user_id
        );

        GmailClient {
            http_client,
            access_token,
            rate_limiter,
            user_endpoint,
            max_results: settings.max_results,
        }
    }

    pub async fn get_message_list(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let mut params = vec![
            ("q".to_string(), query.to_string()),
            ("maxResults".to_string(), self.max_results.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken".to_string(), token.to_string()));
        }

        let resp = self
            .http_client
            .get(gmail_url!(self.user_endpoint, "messages"))
            .query(&params)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        parse_response(resp)
            .await
            .context("Error listing messages")
    }

    pub async fn get_message_by_id(
        &self,
        message_id: &str,
        format: MessageFormat,
    ) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        let mut params = vec![("format", format.as_str())];
        if format == MessageFormat::Metadata {
            params.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));
        }

        let resp = self
            .http_client
            .get(gmail_url!(self.user_endpoint, "messages", message_id))
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;

        parse_response(resp).await.context("Error getting message")
    }
}

impl MessageSource for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<ListMessagesResponse> {
        self.get_message_list(query, page_token).await
    }

    async fn get_message(
        &self,
        message_id: &str,
        format: MessageFormat,
    ) -> anyhow::Result<Message> {
        self.get_message_by_id(message_id, format).await
    }
}

/// Deserialize a success body, or turn Gmail's error envelope into an error
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(Into::into);
    }

    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<GmailApiError>(&body) {
        Ok(GmailApiError { error }) => Err(anyhow!(
            "Gmail API error: {} (code: {}, status: {})",
            error.message,
            error.code,
            error.status.as_deref().unwrap_or("unknown")
        )),
        Err(_) => Err(anyhow!("Gmail API returned {}: {}", status, body)),
    }
}
