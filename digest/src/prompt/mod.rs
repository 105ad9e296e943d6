pub mod category;
pub mod enrichment;
pub mod llama;

use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use strum::{Display, EnumString};

use category::{CategoryLabel, CategorySet};

/// What the enrichment pass asks the model for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnrichmentTask {
    #[default]
    Summarize,
    Categorize,
    Both,
}

impl EnrichmentTask {
    pub fn summarizes(&self) -> bool {
        matches!(self, EnrichmentTask::Summarize | EnrichmentTask::Both)
    }

    pub fn categorizes(&self) -> bool {
        matches!(self, EnrichmentTask::Categorize | EnrichmentTask::Both)
    }
}

pub fn summary_prompt(email_content: &str) -> String {
    formatdoc! {r#"
        Please give me a short summary (about 3 sentences) of the following email.
        The sender is between the <from> tags, the recipient between the <to> tags, the subject between the <subject> tags and the decoded body between the <body> tags.
        Only answer with the summary.

        {email_content}
        Summary:"#,
    email_content = email_content}
}

pub fn category_prompt(categories: &CategorySet, email_content: &str) -> String {
    formatdoc! {r#"
        You are a helpful assistant that can categorize emails such as the categories inside the square brackets below.
        [{categories}]
        Choose a single category from the above for the following email, based on the subject between the <subject> tags and the body between the <body> tags.
        You will only respond with a JSON object with the key category. Do not provide explanations or multiple categories.

        {email_content}
        Answer:"#,
    categories = categories.labels().join(", "),
    email_content = email_content}
}

#[derive(Debug, Deserialize)]
struct AnswerJson {
    category: String,
}

static RE_CAT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""category"\s*:\s*"(.*?)""#).unwrap());
static RE_JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*?\}").unwrap());

/// Pull a category out of a raw completion. Tries a JSON answer, then a
/// `"category": "..."` fragment, then the bare answer or its first word.
/// Anything that is not a member of `categories` becomes `Other`.
pub fn parse_category_answer(answer: &str, categories: &CategorySet) -> CategoryLabel {
    let answer = answer.trim();

    let from_json = RE_JSON_OBJECT
        .find(answer)
        .and_then(|m| serde_json::from_str::<AnswerJson>(m.as_str()).ok())
        .map(|parsed| parsed.category);
    if let Some(category) = from_json {
        return categories.resolve(&category);
    }

    if let Some(caps) = RE_CAT.captures(answer) {
        return categories.resolve(&caps[1]);
    }

    let token = |s: &str| {
        s.trim_matches(|c: char| !c.is_alphanumeric())
            .to_string()
    };
    categories
        .lookup(&token(answer))
        .or_else(|| {
            answer
                .split_whitespace()
                .next()
                .and_then(|word| categories.lookup(&token(word)))
        })
        .unwrap_or_else(|| {
            tracing::debug!("Could not parse a category from answer: {:?}", answer);
            CategoryLabel::other()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> CategorySet {
        CategorySet::new(["Work", "Personal", "Finance", "Newsletter"])
    }

    #[test]
    fn test_category_prompt() {
        let prompt = category_prompt(&categories(), "<subject>Hi</subject>");
        let expected = concat!(
            "You are a helpful assistant that can categorize emails such as the categories inside the square brackets below.\n",
            "[Work, Personal, Finance, Newsletter, Other]\n",
            "Choose a single category from the above for the following email, based on the subject between the <subject> tags and the body between the <body> tags.\n",
            "You will only respond with a JSON object with the key category. Do not provide explanations or multiple categories.\n",
            "\n",
            "<subject>Hi</subject>\n",
            "Answer:",
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_summary_prompt_embeds_content() {
        let prompt = summary_prompt("<from>a</from> <body>b</body>");
        assert!(prompt.starts_with("Please give me a short summary"));
        assert!(prompt.contains("\n\n<from>a</from> <body>b</body>\nSummary:"));
    }

    #[test]
    fn test_parse_json_answer() {
        let set = categories();
        assert_eq!(
            parse_category_answer(r#"{"category": "Finance"}"#, &set).as_str(),
            "Finance"
        );
        assert_eq!(
            parse_category_answer(
                "Sure! Here you go:\n{\"category\": \"work\", \"confidence\": 0.9}\nHope it helps",
                &set
            )
            .as_str(),
            "Work"
        );
        assert!(parse_category_answer(r#"{"category": "Spam"}"#, &set).is_other());
    }

    #[test]
    fn test_parse_broken_json_with_regex() {
        let set = categories();
        assert_eq!(
            parse_category_answer(r#"{"category": "Newsletter", "confidence": }"#, &set).as_str(),
            "Newsletter"
        );
    }

    #[test]
    fn test_parse_plain_token() {
        let set = categories();
        assert_eq!(parse_category_answer("Personal", &set).as_str(), "Personal");
        assert_eq!(parse_category_answer(" finance.\n", &set).as_str(), "Finance");
        assert_eq!(
            parse_category_answer("Work, because it mentions a meeting", &set).as_str(),
            "Work"
        );
    }

    #[test]
    fn test_unparseable_answers_are_other() {
        let set = categories();
        for answer in ["", "I cannot decide", "Spam", "{}", "null", "Workish"] {
            let label = parse_category_answer(answer, &set);
            assert!(label.is_other(), "{answer:?} gave {label}");
        }
    }

    #[test]
    fn test_task_parsing() {
        assert_eq!("both".parse::<EnrichmentTask>().unwrap(), EnrichmentTask::Both);
        assert!(EnrichmentTask::Both.summarizes() && EnrichmentTask::Both.categorizes());
        assert!(!EnrichmentTask::Summarize.categorizes());
        assert_eq!(EnrichmentTask::Categorize.to_string(), "categorize");
    }
}
