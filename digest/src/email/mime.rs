//! MIME decoding: turns a raw RFC 2822 message (or Gmail's pre-parsed payload
//! tree) into headers plus a plain-text body.
//!
//! Multipart messages contribute the first part whose declared content type
//! contains `html`, in document order. A multipart message without any HTML part
//! decodes to an empty body unless the plain text fallback is turned on.
//! Single part messages always go through the HTML extractor, which leaves plain
//! text untouched apart from entity decoding and whitespace normalization.
//!
//! HTML to text keeps only text nodes, joined by one space. Attribute values
//! (`alt`, `title`) and the contents of `script` and `style` are dropped.

use std::borrow::Cow;

use anyhow::Context;
use google_gmail1::api::MessagePart as PayloadPart;
use html5ever::{
    tendril::StrTendril,
    tokenizer::{
        states::RawKind, BufferQueue, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
        TokenizerOpts,
    },
};
use mail_parser::{Address, MessageParser, MessagePart, MimeHeaders, PartType};
use regex::Regex;

use crate::error::DigestError;

const RE_WHITESPACE_STR: &str = r"\s+";

lazy_static::lazy_static!(
    static ref RE_WHITESPACE: Regex = Regex::new(RE_WHITESPACE_STR).unwrap();
);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub recipient: Option<String>,
    pub body: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MimeDecoder {
    plain_text_fallback: bool,
}

impl MimeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the first `text/plain` part of a multipart message that has no HTML part
    pub fn with_plain_text_fallback(mut self, enabled: bool) -> Self {
        self.plain_text_fallback = enabled;
        self
    }

    pub fn decode_raw(&self, raw: &[u8]) -> anyhow::Result<DecodedMessage> {
        let parsed = MessageParser::default()
            .parse(raw)
            .context("Failed to parse MIME message")?;

        let body = match parsed.parts.first() {
            Some(root) if matches!(root.body, PartType::Multipart(_)) => {
                let html = parsed
                    .parts
                    .iter()
                    .find(|part| declared_type(*part).is_some_and(|ct| ct.contains("html")));
                let chosen = html.or_else(|| {
                    self.plain_text_fallback
                        .then(|| {
                            parsed
                                .parts
                                .iter()
                                .find(|part| declared_type(*part).as_deref() == Some("text/plain"))
                        })
                        .flatten()
                });
                match chosen {
                    Some(part) => part_body(part),
                    None => {
                        tracing::debug!("Multipart message has no HTML part, body left empty");
                        String::new()
                    }
                }
            }
            Some(root) => part_body(root),
            None => String::new(),
        };

        Ok(DecodedMessage {
            sender: format_address(parsed.from()),
            subject: parsed.subject().map(|s| s.trim().to_string()),
            recipient: format_address(parsed.to()),
            body,
        })
    }

    /// Decode Gmail's `format=full` payload tree. Body data there is already
    /// base64url decoded by the API types.
    pub fn decode_payload(&self, payload: &PayloadPart) -> DecodedMessage {
        let is_multipart = payload
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.to_lowercase().starts_with("multipart/"));

        let chosen = if is_multipart {
            find_payload_part(payload, &|mime: &str| mime.contains("html")).or_else(|| {
                self.plain_text_fallback
                    .then(|| find_payload_part(payload, &|mime: &str| mime == "text/plain"))
                    .flatten()
            })
        } else {
            Some(payload)
        };

        let body = chosen
            .and_then(|part| part.body.as_ref())
            .and_then(|body| body.data.as_ref())
            .map(|data| match std::str::from_utf8(data) {
                Ok(text) => html_to_text(text),
                Err(e) => {
                    tracing::warn!(
                        "{}, body left empty",
                        DigestError::Decode(format!("payload body is not valid UTF-8: {e}"))
                    );
                    String::new()
                }
            })
            .unwrap_or_default();

        DecodedMessage {
            sender: get_header(payload, "From"),
            subject: get_header(payload, "Subject"),
            recipient: get_header(payload, "To"),
            body,
        }
    }
}

/// Text nodes of a document in order. Character data is buffered until the
/// next tag, comment or doctype closes the node.
#[derive(Default)]
struct TextNodes {
    nodes: Vec<String>,
    current: String,
    in_raw_text: bool,
}

impl TextNodes {
    fn close_node(&mut self) {
        let text = std::mem::take(&mut self.current);
        if !text.trim().is_empty() {
            self.nodes.push(text);
        }
    }
}

impl TokenSink for TextNodes {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::CharacterTokens(text) => {
                if !self.in_raw_text {
                    self.current.push_str(&text);
                }
            }
            Token::TagToken(tag) => {
                self.close_node();
                let raw_kind = match &*tag.name {
                    "script" => Some(RawKind::ScriptData),
                    "style" => Some(RawKind::Rawtext),
                    _ => None,
                };
                if let Some(kind) = raw_kind {
                    self.in_raw_text = tag.kind == TagKind::StartTag && !tag.self_closing;
                    if self.in_raw_text {
                        return TokenSinkResult::RawData(kind);
                    }
                }
            }
            Token::CommentToken(_) | Token::DoctypeToken(_) | Token::EOFToken => {
                self.close_node()
            }
            Token::NullCharacterToken | Token::ParseError(_) => {}
        }
        TokenSinkResult::Continue
    }
}

/// Join every text node with a single space, decode entities and collapse whitespace.
/// Never fails: broken markup yields whatever text the tokenizer recovers.
pub fn html_to_text(html: &str) -> String {
    let mut input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(TextNodes::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    let text = tokenizer.sink.nodes.join(" ");
    RE_WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First value of a header in a payload tree node, case insensitive
pub fn get_header(part: &PayloadPart, name: &str) -> Option<String> {
    part.headers.as_ref()?.iter().find_map(|h| {
        if h.name.as_deref()?.eq_ignore_ascii_case(name) {
            h.value.clone()
        } else {
            None
        }
    })
}

/// "type/subtype" in lowercase
fn declared_type(part: &MessagePart) -> Option<String> {
    part.content_type().map(|ct| {
        let mime = match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        };
        mime.to_lowercase()
    })
}

fn part_body(part: &MessagePart) -> String {
    let text: Option<Cow<'_, str>> = match &part.body {
        PartType::Text(text) | PartType::Html(text) => Some(Cow::Borrowed(&**text)),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            String::from_utf8(bytes.to_vec()).ok().map(Cow::Owned)
        }
        _ => None,
    };

    match text {
        Some(text) => html_to_text(&text),
        None => {
            let mime = declared_type(part).unwrap_or_else(|| "untyped".to_string());
            tracing::warn!(
                "{}, body left empty",
                DigestError::Decode(format!("unreadable {mime} part"))
            );
            String::new()
        }
    }
}

/// Depth first, document order
fn find_payload_part<'a>(
    part: &'a PayloadPart,
    matches: &dyn Fn(&str) -> bool,
) -> Option<&'a PayloadPart> {
    let mime = part.mime_type.as_deref().unwrap_or("").to_lowercase();
    if !mime.starts_with("multipart/") && matches(&mime) {
        return Some(part);
    }
    part.parts
        .as_ref()?
        .iter()
        .find_map(|sub_part| find_payload_part(sub_part, matches))
}

fn format_address(address: Option<&Address>) -> Option<String> {
    address.and_then(|a| a.first()).map(|addr| match addr.name() {
        Some(name) => format!("{} <{}>", name, addr.address().unwrap_or_default()),
        None => addr.address().unwrap_or_default().to_string(),
    })
}
