#![allow(dead_code)]

mod auth;
mod digest_config;
mod email;
mod error;
mod prompt;
mod report;
mod state;
mod testing;
mod util;

use auth::{AccessTokenProvider, CredentialSource};
use chrono::Utc;
use digest_config::DigestConfig;
use email::{client::GmailClient, mailbox::MailboxClient};
use error::DigestResult;
use lib_email_clients::gmail::query::build_query;
use mimalloc::MiMalloc;
use prompt::{category::CategorySet, enrichment::EnrichmentPipeline, llama::LlamaClient};
use state::{query_start, LastRunStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the digest, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = DigestConfig::load()?;
    tracing::debug!("{}", config);

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(config.gmail_timeout())
        .build()?;

    if let Err(e) = run(&config, http_client).await {
        if e.is_fatal() {
            tracing::error!("Digest run aborted: {}", e);
        } else {
            tracing::error!("Digest run failed: {}", e);
        }
        return Err(e.into());
    }

    Ok(())
}

/// One fetch and enrich cycle
async fn run(config: &DigestConfig, http_client: HttpClient) -> DigestResult<()> {
    let started_at = Utc::now();

    let credentials = CredentialSource::from_env_or_file(
        config.resolve_path(&config.gmail.token_file),
        http_client.clone(),
    );
    let access_token = credentials.access_token().await?;
    let mailbox = MailboxClient::new(
        GmailClient::new(http_client.clone(), &config.gmail, access_token),
        &config.gmail,
    );

    let last_run_store = LastRunStore::new(config.resolve_path(&config.state.last_run_file));
    let after = query_start(
        last_run_store.read().await,
        config.query.lookback_days,
        started_at,
    );
    let query = build_query(&config.query.filter, after);
    tracing::info!("Searching messages with query: {}", query);

    let ids = mailbox.search(&query).await?;
    let batch = mailbox.fetch_batch(&ids, config.gmail.fetch_format).await;
    tracing::info!(
        "Fetched {} of {} message(s), {} failed",
        batch.records.len(),
        ids.len(),
        batch.failures.len()
    );

    let pipeline = EnrichmentPipeline::new(
        LlamaClient::new(http_client, &config.inference),
        CategorySet::new(&config.categories.labels),
        config.inference.max_body_chars,
    );
    let enriched = pipeline
        .enrich_all(batch.records, config.inference.task)
        .await;

    print!("{}", report::render_report(&enriched)?);

    if let Err(e) = last_run_store.write(started_at).await {
        tracing::warn!("Could not record last run: {}", e);
    }
    tracing::info!("Digest done, {} message(s) processed", enriched.len());

    Ok(())
}
