use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};

/// Precision of the `after:` predicate.
///
/// Gmail accepts either epoch seconds or a calendar date. Dates only have day
/// precision, so anything that has to resume from an exact last run uses seconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimeGranularity {
    #[default]
    Seconds,
    Day,
}

/// Filter profile translated into Gmail search operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    pub unread: bool,
    pub starred: bool,
    /// e.g. "inbox" -> `in:inbox`
    pub folder: Option<String>,
    pub label: Option<String>,
    pub granularity: TimeGranularity,
}

impl QueryFilter {
    pub fn unread() -> Self {
        QueryFilter {
            unread: true,
            ..Default::default()
        }
    }

    pub fn starred(mut self) -> Self {
        self.starred = true;
        self
    }

    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_granularity(mut self, granularity: TimeGranularity) -> Self {
        self.granularity = granularity;
        self
    }
}

/// Build a Gmail search query for messages newer than `after`
pub fn build_query(filter: &QueryFilter, after: DateTime<Utc>) -> String {
    let mut terms = Vec::with_capacity(5);

    if filter.unread {
        terms.push("is:unread".to_string());
    }
    if filter.starred {
        terms.push("is:starred".to_string());
    }
    if let Some(folder) = non_empty(&filter.folder) {
        terms.push(format!("in:{}", operator_value(folder)));
    }
    if let Some(label) = non_empty(&filter.label) {
        terms.push(format!("label:{}", operator_value(label)));
    }
    terms.push(time_predicate(after, filter.granularity));

    terms.join(" ")
}

/// `after:<epoch-seconds>` or `after:<YYYY/MM/DD>`
pub fn time_predicate(after: DateTime<Utc>, granularity: TimeGranularity) -> String {
    match granularity {
        TimeGranularity::Seconds => format!("after:{}", after.timestamp()),
        TimeGranularity::Day => format!("after:{}", after.format("%Y/%m/%d")),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// Gmail operators don't take spaces, multi word labels are written with dashes
fn operator_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_unread_with_epoch_seconds() {
        let query = build_query(&QueryFilter::unread(), ts());
        assert_eq!(query, format!("is:unread after:{}", ts().timestamp()));
        assert!(query.contains("after:1709649000"));
    }

    #[test]
    fn test_unread_with_calendar_date() {
        let filter = QueryFilter::unread().with_granularity(TimeGranularity::Day);
        assert_eq!(build_query(&filter, ts()), "is:unread after:2024/03/05");
    }

    #[test]
    fn test_full_profile_ordering() {
        let filter = QueryFilter::unread().starred().in_folder("Inbox");
        assert_eq!(
            build_query(&filter, ts()),
            "is:unread is:starred in:inbox after:1709649000"
        );
    }

    #[test]
    fn test_label_with_spaces() {
        let filter = QueryFilter::default().with_label("Project  Updates");
        assert_eq!(
            build_query(&filter, ts()),
            "label:project-updates after:1709649000"
        );
    }

    #[test]
    fn test_blank_folder_is_ignored() {
        let filter = QueryFilter::unread().in_folder("   ");
        assert_eq!(build_query(&filter, ts()), "is:unread after:1709649000");
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("day".parse::<TimeGranularity>().unwrap(), TimeGranularity::Day);
        assert_eq!(
            "seconds".parse::<TimeGranularity>().unwrap(),
            TimeGranularity::Seconds
        );
        assert!("hourly".parse::<TimeGranularity>().is_err());
    }
}
