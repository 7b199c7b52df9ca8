use serde::{Deserialize, Serialize};

/// Fields for a new email campaign.
#[derive(Debug, Clone, Serialize)]
pub struct NewEmail {
    pub name: String,
    pub subject: String,
    #[serde(rename = "customHtml")]
    pub custom_html: String,
    pub description: String,
    #[serde(rename = "fromAddress")]
    pub from_address: String,
    #[serde(rename = "fromName")]
    pub from_name: String,
    #[serde(rename = "replyToAddress")]
    pub reply_to_address: String,
    #[serde(rename = "isPublished")]
    pub is_published: bool,
    #[serde(rename = "emailType")]
    pub email_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Email {
    pub id: i64,
    #[serde(default, rename = "sentCount")]
    pub sent_count: i64,
    #[serde(default, rename = "readCount")]
    pub read_count: i64,
    #[serde(default, rename = "clickCount")]
    pub click_count: i64,
    #[serde(default, rename = "unsubscribeCount")]
    pub unsubscribe_count: i64,
    #[serde(default, rename = "bounceCount")]
    pub bounce_count: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmailEnvelope {
    pub email: Email,
}

/// Result of a segment send: counts plus the raw gateway response for the
/// archive row.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub sent_count: i64,
    pub failed_recipients: i64,
    pub raw_response: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(default, rename = "sentCount")]
    pub sent_count: i64,
    #[serde(default, rename = "failedRecipients")]
    pub failed_recipients: i64,
}

/// Email statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EmailStats {
    pub sent_count: i64,
    pub read_count: i64,
    pub click_count: i64,
    pub unsubscribe_count: i64,
    pub bounce_count: i64,
}
