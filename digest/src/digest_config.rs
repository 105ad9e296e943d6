use config::{Config, Environment};
use lib_email_clients::gmail::query::QueryFilter;
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::{
    email::client::MessageFormat,
    error::{DigestError, DigestResult},
    prompt::EnrichmentTask,
};

const ENV_PREFIX: &str = "DIGEST";

#[derive(Debug, Clone, Deserialize)]
pub struct GmailSettings {
    pub api_base: String,
    pub user_id: String,
    /// Authorized user file holding the OAuth tokens
    pub token_file: String,
    pub fetch_format: MessageFormat,
    /// Multipart messages without an HTML part fall back to their first text/plain part
    #[serde(default)]
    pub plain_text_fallback: bool,
    pub fetch_concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_results: u32,
    /// 1 means only the first page of search results is used
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    #[serde(flatten)]
    pub filter: QueryFilter,
    /// Used when there is no last run on record
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub n_predict: u32,
    pub timeout_secs: u64,
    pub task: EnrichmentTask,
    pub max_body_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySettings {
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateSettings {
    pub last_run_file: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    gmail: GmailSettings,
    query: QuerySettings,
    inference: InferenceSettings,
    categories: CategorySettings,
    state: StateSettings,
}

#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Directory the config file was read from, relative paths resolve against it
    pub root: PathBuf,
    pub gmail: GmailSettings,
    pub query: QuerySettings,
    pub inference: InferenceSettings,
    pub categories: CategorySettings,
    pub state: StateSettings,
}

impl std::fmt::Display for DigestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Digest Config ({}):\n\nGmail: {:?}\n\nQuery: {:?}\n\nInference: {:?}\n\nCategories: {}\n\nState: {:?}",
            self.root.display(),
            self.gmail,
            self.query,
            self.inference,
            self.categories.labels.join(", "),
            self.state,
        )
    }
}

impl DigestConfig {
    /// Load `config.toml` from `APP_DIR`, falling back to the workspace `config/` dir
    pub fn load() -> DigestResult<Self> {
        let root = match env::var("APP_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let dir = env::var("CARGO_MANIFEST_DIR").map_err(|_| {
                    DigestError::Config("CARGO_MANIFEST_DIR or APP_DIR is required".to_string())
                })?;
                Path::new(&dir)
                    .parent()
                    .map(|p| p.join("config"))
                    .ok_or_else(|| DigestError::Config(format!("{dir} has no parent")))?
            }
        };

        Self::from_file(root.join("config.toml"))
    }

    /// Read a config file, with `DIGEST__SECTION__KEY` environment overrides on top
    pub fn from_file(path: impl AsRef<Path>) -> DigestResult<Self> {
        let path = path.as_ref();
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let ConfigFile {
            gmail,
            query,
            inference,
            categories,
            state,
        } = cfg_file;

        let config = DigestConfig {
            root,
            gmail,
            query,
            inference,
            categories,
            state,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> DigestResult<()> {
        Url::parse(&self.gmail.api_base)
            .map_err(|e| DigestError::Config(format!("gmail.api_base is invalid: {e}")))?;
        Url::parse(&self.inference.endpoint)
            .map_err(|e| DigestError::Config(format!("inference.endpoint is invalid: {e}")))?;

        if self.gmail.fetch_concurrency == 0 {
            return Err(DigestError::Config(
                "gmail.fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_pages == 0 {
            return Err(DigestError::Config(
                "gmail.max_pages must be at least 1".to_string(),
            ));
        }
        if self.categories.labels.is_empty() {
            return Err(DigestError::Config(
                "categories.labels must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn gmail_timeout(&self) -> Duration {
        Duration::from_secs(self.gmail.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use lib_email_clients::gmail::query::TimeGranularity;

    use super::*;

    fn fixture_path() -> PathBuf {
        let root = env!("CARGO_MANIFEST_DIR");
        PathBuf::from(format!("{root}/src/testing/data/config.toml"))
    }

    #[test]
    fn test_load_fixture() {
        let config = DigestConfig::from_file(fixture_path()).expect("Unable to load config");

        assert_eq!(config.gmail.user_id, "me");
        assert_eq!(config.gmail.fetch_format, MessageFormat::Raw);
        assert_eq!(config.gmail.fetch_concurrency, 4);
        assert_eq!(config.gmail.max_pages, 1);
        assert!(config.query.filter.unread);
        assert!(config.query.filter.starred);
        assert_eq!(config.query.filter.folder.as_deref(), Some("inbox"));
        assert_eq!(config.query.filter.granularity, TimeGranularity::Seconds);
        assert_eq!(config.query.lookback_days, 2);
        assert_eq!(config.inference.n_predict, 128);
        assert_eq!(config.inference.task, EnrichmentTask::Summarize);
        assert!(config.categories.labels.contains(&"Work".to_string()));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = DigestConfig::from_file(fixture_path()).unwrap();
        let resolved = config.resolve_path(&config.state.last_run_file);
        assert!(resolved.starts_with(&config.root));
        assert!(resolved.ends_with("last_run.txt"));

        assert_eq!(
            config.resolve_path("/tmp/token.json"),
            PathBuf::from("/tmp/token.json")
        );
    }

    #[test]
    fn test_workspace_config_is_valid() {
        let root = env!("CARGO_MANIFEST_DIR");
        let path = format!("{root}/../config/config.toml");
        DigestConfig::from_file(path).expect("config/config.toml is invalid");
    }
}
