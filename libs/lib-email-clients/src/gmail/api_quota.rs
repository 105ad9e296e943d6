/// Quota units charged by Gmail per method call.
/// https://developers.google.com/gmail/api/reference/quota
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
};

/// Per-user limit is 250 units/sec, stay under it
pub const GMAIL_QUOTA_PER_SECOND: usize = 200;
