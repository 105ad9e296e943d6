use std::time::Duration;

use anyhow::{anyhow, Context};
use futures::{stream, StreamExt};
use google_gmail1::api::Message;
use tokio::sync::Mutex;

use super::{
    client::{MessageFormat, MessageSource},
    mime::{get_header, MimeDecoder},
    record::{EmailContent, EmailRecord, FetchRequest},
};
use crate::error::DigestError;

/// A message that could not be fetched or decoded
#[derive(Debug)]
pub struct ItemFailure {
    pub id: String,
    pub error: DigestError,
}

/// Outcome of one batch. Every request ends up in exactly one of the two lists,
/// in completion order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<EmailRecord>,
    pub failures: Vec<ItemFailure>,
}

pub struct BatchFetcher<'a, S: MessageSource> {
    source: &'a S,
    decoder: MimeDecoder,
    concurrency: usize,
    timeout: Duration,
}

impl<'a, S: MessageSource> BatchFetcher<'a, S> {
    pub fn new(source: &'a S, decoder: MimeDecoder, concurrency: usize, timeout: Duration) -> Self {
        Self {
            source,
            decoder,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Run every request with at most `concurrency` in flight and wait for all
    /// of them. Per-item failures are logged and collected, never raised.
    pub async fn execute(&self, requests: Vec<FetchRequest>) -> BatchResult {
        let total = requests.len();
        let collector = Mutex::new(BatchResult {
            records: Vec::with_capacity(total),
            failures: Vec::new(),
        });

        stream::iter(requests)
            .map(|request| async move {
                let outcome = self.fetch_one(&request).await;
                (request, outcome)
            })
            .buffer_unordered(self.concurrency)
            .for_each(|(request, outcome)| {
                let collector = &collector;
                async move {
                    let mut result = collector.lock().await;
                    match outcome {
                        Ok(record) => result.records.push(record),
                        Err(error) => {
                            tracing::warn!("Skipping message {}: {}", request.id(), error);
                            result.failures.push(ItemFailure {
                                id: request.id().to_string(),
                                error,
                            });
                        }
                    }
                }
            })
            .await;

        let result = collector.into_inner();
        tracing::debug!(
            "Batch done: {} requested, {} fetched, {} failed",
            total,
            result.records.len(),
            result.failures.len()
        );
        result
    }

    async fn fetch_one(&self, request: &FetchRequest) -> Result<EmailRecord, DigestError> {
        let item_error = |source: anyhow::Error| DigestError::ItemFetch {
            id: request.id().to_string(),
            source,
        };

        let message = tokio::time::timeout(
            self.timeout,
            self.source.get_message(request.id(), request.format()),
        )
        .await
        .map_err(|_| item_error(anyhow!("Request timed out after {:?}", self.timeout)))?
        .map_err(item_error)?;

        self.complete(request, message).map_err(item_error)
    }

    /// Turn one fetched message into a record according to the requested format
    fn complete(&self, request: &FetchRequest, message: Message) -> anyhow::Result<EmailRecord> {
        let id = message.id.clone().unwrap_or_else(|| request.id().to_string());

        match request.format() {
            MessageFormat::Raw => {
                let raw = message.raw.context("Message has no raw content")?;
                let decoded = self.decoder.decode_raw(&raw)?;
                Ok(EmailRecord {
                    id,
                    sender: decoded.sender,
                    subject: decoded.subject,
                    recipient: decoded.recipient,
                    content: EmailContent::Body(decoded.body),
                })
            }
            MessageFormat::Metadata => {
                let payload = message.payload.unwrap_or_default();
                Ok(EmailRecord {
                    id,
                    sender: get_header(&payload, "From"),
                    subject: get_header(&payload, "Subject"),
                    recipient: get_header(&payload, "To"),
                    content: EmailContent::Snippet(message.snippet.unwrap_or_default()),
                })
            }
            MessageFormat::Full => {
                let payload = message.payload.context("Message has no payload")?;
                let decoded = self.decoder.decode_payload(&payload);
                Ok(EmailRecord {
                    id,
                    sender: decoded.sender,
                    subject: decoded.subject,
                    recipient: decoded.recipient,
                    content: EmailContent::Body(decoded.body),
                })
            }
        }
    }
}
