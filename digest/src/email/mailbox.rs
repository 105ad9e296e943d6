use std::time::Duration;

use super::{
    batch::{BatchFetcher, BatchResult},
    client::{MessageFormat, MessageSource},
    mime::MimeDecoder,
    record::{EmailRecord, FetchRequest},
};
use crate::{
    digest_config::GmailSettings,
    error::{DigestError, DigestResult},
};

/// Search and batch retrieval on top of a `MessageSource`
pub struct MailboxClient<S: MessageSource> {
    source: S,
    decoder: MimeDecoder,
    concurrency: usize,
    timeout: Duration,
    max_pages: u32,
}

impl<S: MessageSource> MailboxClient<S> {
    pub fn new(source: S, settings: &GmailSettings) -> Self {
        Self {
            source,
            decoder: MimeDecoder::new().with_plain_text_fallback(settings.plain_text_fallback),
            concurrency: settings.fetch_concurrency,
            timeout: Duration::from_secs(settings.request_timeout_secs),
            max_pages: settings.max_pages,
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Ids of the messages matching `query`, following `nextPageToken` for at
    /// most `max_pages` pages. Any list failure aborts the search.
    pub async fn search(&self, query: &str) -> DigestResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 1..=self.max_pages {
            let resp = self
                .source
                .list_messages(query, page_token.as_deref())
                .await
                .map_err(DigestError::Search)?;

            ids.extend(
                resp.messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match resp.next_page_token {
                Some(token) if page < self.max_pages => page_token = Some(token),
                Some(_) => {
                    tracing::info!(
                        "More results available, stopping after {} page(s)",
                        self.max_pages
                    );
                    break;
                }
                None => break,
            }
        }

        tracing::info!("Search '{}' matched {} message(s)", query, ids.len());
        Ok(ids)
    }

    /// Fetch and decode every id. Messages that fail are dropped from the result.
    pub async fn fetch(&self, ids: &[String], format: MessageFormat) -> Vec<EmailRecord> {
        self.fetch_batch(ids, format).await.records
    }

    /// Like `fetch`, but keeps the per-message failures
    pub async fn fetch_batch(&self, ids: &[String], format: MessageFormat) -> BatchResult {
        let requests = ids
            .iter()
            .map(|id| FetchRequest::new(id.as_str(), format))
            .collect();

        BatchFetcher::new(&self.source, self.decoder, self.concurrency, self.timeout)
            .execute(requests)
            .await
    }
}
