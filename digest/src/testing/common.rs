use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use google_gmail1::api::{ListMessagesResponse, Message, MessagePart, MessagePartHeader};

use crate::{
    digest_config::GmailSettings,
    email::client::{MessageFormat, MessageSource},
    prompt::llama::CompletionService,
};

pub fn fixture(name: &str) -> Vec<u8> {
    let root = env!("CARGO_MANIFEST_DIR");
    let path = format!("{root}/src/testing/data/{name}");
    std::fs::read(path).expect("Unable to read fixture")
}

pub fn gmail_settings(api_base: &str) -> GmailSettings {
    GmailSettings {
        api_base: api_base.to_string(),
        user_id: "me".to_string(),
        token_file: "token.json".to_string(),
        fetch_format: MessageFormat::Raw,
        plain_text_fallback: false,
        fetch_concurrency: 4,
        request_timeout_secs: 5,
        max_results: 100,
        max_pages: 1,
    }
}

pub fn raw_message(id: &str, raw: impl AsRef<[u8]>) -> Message {
    Message {
        id: Some(id.to_string()),
        thread_id: Some(format!("thread-{id}")),
        raw: Some(raw.as_ref().to_vec()),
        ..Default::default()
    }
}

pub fn metadata_message(id: &str, snippet: &str, headers: &[(&str, &str)]) -> Message {
    Message {
        id: Some(id.to_string()),
        snippet: Some(snippet.to_string()),
        payload: Some(MessagePart {
            headers: Some(
                headers
                    .iter()
                    .map(|(name, value)| MessagePartHeader {
                        name: Some(name.to_string()),
                        value: Some(value.to_string()),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Serve `router` on an ephemeral local port, returns the base url
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "inbox-digest-{}-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        name
    ))
}

/// In-memory mailbox. Each message answers after its own delay so completion
/// order differs from request order.
#[derive(Default)]
pub struct FakeMailbox {
    messages: HashMap<String, Message>,
    delays: HashMap<String, Duration>,
    pages: Vec<Vec<String>>,
    fail_list: bool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        let id = message.id.clone().unwrap_or_default();
        self.messages.insert(id, message);
        self
    }

    pub fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Each entry is one page of search results
    pub fn with_pages(mut self, pages: Vec<Vec<&str>>) -> Self {
        self.pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(str::to_string).collect())
            .collect();
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }
}

impl MessageSource for FakeMailbox {
    async fn list_messages(
        &self,
        _query: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<ListMessagesResponse> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(anyhow!("Gmail API error: Backend Error (code: 500)"));
        }

        let page = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let ids = self.pages.get(page).cloned().unwrap_or_default();
        let next_page_token = (page + 1 < self.pages.len()).then(|| (page + 1).to_string());

        Ok(ListMessagesResponse {
            messages: (!ids.is_empty()).then(|| {
                ids.into_iter()
                    .map(|id| Message {
                        id: Some(id),
                        ..Default::default()
                    })
                    .collect()
            }),
            next_page_token,
            ..Default::default()
        })
    }

    async fn get_message(
        &self,
        message_id: &str,
        _format: MessageFormat,
    ) -> anyhow::Result<Message> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self
            .delays
            .get(message_id)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| anyhow!("Gmail API error: Requested entity was not found. (code: 404)"))
    }
}

/// Completion service that replays scripted answers and records prompts
#[derive(Default, Clone)]
pub struct FakeCompletion {
    answers: Arc<Mutex<VecDeque<anyhow::Result<String>>>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, content: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .push_back(Ok(content.to_string()));
        self
    }

    pub fn fail(self, reason: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(reason.to_string())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl CompletionService for FakeCompletion {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("No scripted answer left")))
    }
}
