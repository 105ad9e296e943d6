use derive_more::derive::Display;
use reqwest::StatusCode;

pub type DigestResult<T> = Result<T, DigestError>;

/// Errors surfaced by a digest run.
///
/// `Auth`, `Config` and `Search` abort the run. The per-message kinds are
/// recovered where they happen and only show up in logs and batch failures.
#[derive(Debug, Display)]
pub enum DigestError {
    #[display("Authentication failed: {_0}")]
    Auth(String),
    #[display("Configuration error: {_0}")]
    Config(String),
    #[display("Search failed: {_0}")]
    Search(anyhow::Error),
    #[display("Failed to fetch message {id}: {source}")]
    ItemFetch { id: String, source: anyhow::Error },
    #[display("Failed to decode message: {_0}")]
    Decode(String),
    #[display("Inference failed: {_0}")]
    Inference(anyhow::Error),
    #[display("Request timed out")]
    RequestTimeout,
    #[display("Too many requests")]
    TooManyRequests,
    Internal(anyhow::Error),
}

impl std::error::Error for DigestError {}

impl DigestError {
    /// Fatal errors abort the whole run, everything else is isolated to one message
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DigestError::Auth(_) | DigestError::Config(_) | DigestError::Search(_)
        )
    }
}

impl From<anyhow::Error> for DigestError {
    fn from(error: anyhow::Error) -> Self {
        DigestError::Internal(error)
    }
}

impl From<reqwest::Error> for DigestError {
    fn from(error: reqwest::Error) -> Self {
        tracing::debug!("Reqwest error: {:?}", error);
        if error.is_timeout() {
            return DigestError::RequestTimeout;
        }
        match error.status() {
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
                DigestError::Auth(error.to_string())
            }
            Some(StatusCode::REQUEST_TIMEOUT) => DigestError::RequestTimeout,
            Some(StatusCode::TOO_MANY_REQUESTS) => DigestError::TooManyRequests,
            _ => DigestError::Internal(error.into()),
        }
    }
}

impl From<config::ConfigError> for DigestError {
    fn from(error: config::ConfigError) -> Self {
        DigestError::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(DigestError::Auth("expired".into()).is_fatal());
        assert!(DigestError::Search(anyhow!("500")).is_fatal());
        assert!(DigestError::Config("missing".into()).is_fatal());

        assert!(!DigestError::ItemFetch {
            id: "abc".into(),
            source: anyhow!("404"),
        }
        .is_fatal());
        assert!(!DigestError::Decode("bad base64".into()).is_fatal());
        assert!(!DigestError::Inference(anyhow!("connection refused")).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = DigestError::ItemFetch {
            id: "18c2".into(),
            source: anyhow!("not found"),
        };
        assert_eq!(err.to_string(), "Failed to fetch message 18c2: not found");
        assert_eq!(
            DigestError::Auth("no token".into()).to_string(),
            "Authentication failed: no token"
        );
    }
}
