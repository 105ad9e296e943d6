pub mod token_file;

use std::{env, path::PathBuf};

pub use token_file::TokenFile;

use crate::{
    error::{DigestError, DigestResult},
    HttpClient,
};

pub const ACCESS_TOKEN_ENV: &str = "GMAIL_ACCESS_TOKEN";

/// Hands out a bearer token that is valid for at least the next request
#[allow(async_fn_in_trait)]
pub trait AccessTokenProvider {
    async fn access_token(&self) -> DigestResult<String>;
}

/// A token supplied from outside, used as is
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }

    /// `GMAIL_ACCESS_TOKEN`, if set and not blank
    pub fn from_env() -> Option<Self> {
        env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(|t| StaticToken(t.trim().to_string()))
    }
}

impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> DigestResult<String> {
        if self.0.is_empty() {
            return Err(DigestError::Auth("Access token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Where the run gets its bearer token from
pub enum CredentialSource {
    Static(StaticToken),
    File(TokenFile),
}

impl CredentialSource {
    /// `GMAIL_ACCESS_TOKEN` wins over the token file
    pub fn from_env_or_file(token_file: impl Into<PathBuf>, http_client: HttpClient) -> Self {
        match StaticToken::from_env() {
            Some(token) => {
                tracing::info!("Using access token from {}", ACCESS_TOKEN_ENV);
                CredentialSource::Static(token)
            }
            None => CredentialSource::File(TokenFile::new(token_file, http_client)),
        }
    }
}

impl AccessTokenProvider for CredentialSource {
    async fn access_token(&self) -> DigestResult<String> {
        match self {
            CredentialSource::Static(token) => token.access_token().await,
            CredentialSource::File(file) => file.access_token().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").access_token().await.unwrap(), "abc");

        let err = StaticToken::new("").access_token().await.unwrap_err();
        assert!(matches!(err, DigestError::Auth(_)));
    }

    #[tokio::test]
    async fn test_credential_source_dispatch() {
        let source = CredentialSource::Static(StaticToken::new("from-env"));
        assert_eq!(source.access_token().await.unwrap(), "from-env");

        let source = CredentialSource::File(TokenFile::new(
            "/nonexistent/token.json",
            HttpClient::new(),
        ));
        assert!(source.access_token().await.unwrap_err().is_fatal());
    }
}
