use serde::Serialize;

use super::{
    category::{CategoryLabel, CategorySet},
    category_prompt,
    llama::CompletionService,
    parse_category_answer, summary_prompt, EnrichmentTask,
};
use crate::{email::record::EmailRecord, error::DigestError};

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEmail {
    pub record: EmailRecord,
    pub summary: Option<String>,
    pub category: Option<CategoryLabel>,
}

/// Runs one completion per record and task, one record at a time.
/// Inference failures never reach the caller.
pub struct EnrichmentPipeline<C: CompletionService> {
    completion: C,
    categories: CategorySet,
    max_body_chars: usize,
}

impl<C: CompletionService> EnrichmentPipeline<C> {
    pub fn new(completion: C, categories: CategorySet, max_body_chars: usize) -> Self {
        Self {
            completion,
            categories,
            max_body_chars,
        }
    }

    /// Short summary of the record, empty on failure
    pub async fn summarize(&self, record: &EmailRecord) -> String {
        let prompt = summary_prompt(&record.to_prompt_string(self.max_body_chars));
        match self.completion.complete(&prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    "Could not summarize message {}: {}",
                    record.id,
                    DigestError::Inference(e)
                );
                String::new()
            }
        }
    }

    /// Category of the record, `Other` on failure or when the answer is outside the set
    pub async fn categorize(&self, record: &EmailRecord) -> CategoryLabel {
        let prompt = category_prompt(
            &self.categories,
            &record.to_prompt_string(self.max_body_chars),
        );
        match self.completion.complete(&prompt).await {
            Ok(answer) => {
                let label = parse_category_answer(&answer, &self.categories);
                if label.is_other() {
                    tracing::debug!("Message {} answered {:?}, using Other", record.id, answer);
                }
                label
            }
            Err(e) => {
                tracing::warn!(
                    "Could not categorize message {}: {}",
                    record.id,
                    DigestError::Inference(e)
                );
                CategoryLabel::other()
            }
        }
    }

    /// Enrich every record in order. Output order matches input order.
    pub async fn enrich_all(
        &self,
        records: Vec<EmailRecord>,
        task: EnrichmentTask,
    ) -> Vec<EnrichedEmail> {
        let total = records.len();
        let mut enriched = Vec::with_capacity(total);

        for (i, record) in records.into_iter().enumerate() {
            tracing::debug!("Enriching message {} ({}/{})", record.id, i + 1, total);
            let summary = if task.summarizes() {
                Some(self.summarize(&record).await)
            } else {
                None
            };
            let category = if task.categorizes() {
                Some(self.categorize(&record).await)
            } else {
                None
            };
            enriched.push(EnrichedEmail {
                record,
                summary,
                category,
            });
        }

        enriched
    }
}
