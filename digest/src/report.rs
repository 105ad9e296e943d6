use anyhow::Context;
use indexmap::IndexMap;
use minijinja::{context, Environment};

use crate::prompt::enrichment::EnrichedEmail;

const DIVIDER: &str = "-------------------------------------------------------";

const DIGEST_TEMPLATE: &str = r#"{% for email in emails %}
{{ divider }}
From: {{ email.record.sender or "" }}, Subject: {{ email.record.subject or "" }}
{% if email.category %}
Category: {{ email.category }}
{% endif %}
{% if email.summary %}
{{ email.summary }}
{% endif %}
{{ divider }}


{% endfor %}
{% if tally %}
Categories:
{% for name, count in tally %}
  {{ name }}: {{ count }}
{% endfor %}
{% endif %}
"#;

/// Number of emails per category, in order of first appearance
pub fn category_tally(emails: &[EnrichedEmail]) -> IndexMap<String, usize> {
    let mut tally = IndexMap::new();
    for category in emails.iter().filter_map(|e| e.category.as_ref()) {
        *tally.entry(category.to_string()).or_insert(0) += 1;
    }
    tally
}

/// Plain text digest printed at the end of a run
pub fn render_report(emails: &[EnrichedEmail]) -> anyhow::Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("digest", DIGEST_TEMPLATE)
        .context("Invalid digest template")?;

    let tally: Vec<(String, usize)> = category_tally(emails).into_iter().collect();
    let report = env
        .get_template("digest")?
        .render(context! { emails, tally, divider => DIVIDER })
        .context("Failed to render digest")?;

    Ok(report)
}
