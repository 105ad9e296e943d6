use std::fmt;

use serde::Serialize;

use super::client::MessageFormat;

/// Text carried by a record. Raw and full fetches produce a decoded body,
/// metadata fetches only get Gmail's snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum EmailContent {
    Body(String),
    Snippet(String),
}

impl EmailContent {
    pub fn text(&self) -> &str {
        match self {
            EmailContent::Body(text) | EmailContent::Snippet(text) => text,
        }
    }
}

impl Default for EmailContent {
    fn default() -> Self {
        EmailContent::Body(String::new())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRecord {
    pub id: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub recipient: Option<String>,
    pub content: EmailContent,
}

impl EmailRecord {
    pub fn body(&self) -> &str {
        self.content.text()
    }

    /// Same rendering as `Display` with the content cut to `max_chars`
    pub fn to_prompt_string(&self, max_chars: usize) -> String {
        let text = self.content.text();
        let text = match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        };
        self.render(text)
    }

    fn render(&self, text: &str) -> String {
        let tag = match self.content {
            EmailContent::Body(_) => "body",
            EmailContent::Snippet(_) => "snippet",
        };
        format!(
            "<from>{}</from> <to>{}</to> <subject>{}</subject> <{tag}>{}</{tag}>",
            self.sender.as_deref().unwrap_or_default(),
            self.recipient.as_deref().unwrap_or_default(),
            self.subject.as_deref().unwrap_or_default(),
            text,
        )
    }
}

impl fmt::Display for EmailRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(self.content.text()))
    }
}

/// One message to retrieve and the representation to ask Gmail for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    id: String,
    format: MessageFormat,
}

impl FetchRequest {
    pub fn new(id: impl Into<String>, format: MessageFormat) -> Self {
        Self {
            id: id.into(),
            format,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }
}
