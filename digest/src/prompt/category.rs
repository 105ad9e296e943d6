use std::fmt;

use serde::Serialize;

pub const OTHER_CATEGORY: &str = "Other";

/// A member of a `CategorySet`. Only the set hands these out, so a label is
/// always one of the configured names or `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CategoryLabel(String);

impl CategoryLabel {
    pub fn other() -> Self {
        CategoryLabel(OTHER_CATEGORY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_other(&self) -> bool {
        self.0 == OTHER_CATEGORY
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of category names. `Other` is always a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    pub fn new<I, T>(labels: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() || set.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                continue;
            }
            if label.eq_ignore_ascii_case(OTHER_CATEGORY) {
                set.push(OTHER_CATEGORY.to_string());
            } else {
                set.push(label.to_string());
            }
        }
        if !set.iter().any(|l| l == OTHER_CATEGORY) {
            set.push(OTHER_CATEGORY.to_string());
        }

        CategorySet { labels: set }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The configured label matching `candidate`, ignoring case and surrounding whitespace
    pub fn lookup(&self, candidate: &str) -> Option<CategoryLabel> {
        let candidate = candidate.trim();
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(candidate))
            .map(|l| CategoryLabel(l.clone()))
    }

    /// Like `lookup`, with `Other` for anything outside the set
    pub fn resolve(&self, candidate: &str) -> CategoryLabel {
        self.lookup(candidate).unwrap_or_else(CategoryLabel::other)
    }
}
