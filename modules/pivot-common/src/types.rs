//! Domain records shared across the pipeline. These serialize directly to
//! the tabular store's field maps; field names here are the store's field
//! names.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PivotError;

// ---------------------------------------------------------------------------
// Newsletter variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsletterVariant {
    Pivot5,
    Signal,
}

impl NewsletterVariant {
    pub fn display_name(&self) -> &'static str {
        match self {
            NewsletterVariant::Pivot5 => "Pivot 5",
            NewsletterVariant::Signal => "Signal",
        }
    }

    pub fn newsletter_id(&self) -> &'static str {
        match self {
            NewsletterVariant::Pivot5 => "pivot_ai",
            NewsletterVariant::Signal => "signal",
        }
    }

    /// The order slots are selected in. Signal fills its long-form sections
    /// first and picks the five quick-hits last.
    pub fn slot_order(&self) -> &'static [u8] {
        match self {
            NewsletterVariant::Pivot5 => &[1, 2, 3, 4, 5],
            NewsletterVariant::Signal => &[1, 3, 4, 5, 2],
        }
    }

    /// Field-key prefixes for slot references on the Issue row.
    /// Pivot 5: `slot_1`..`slot_5`. Signal: the four section names plus
    /// `signal_1`..`signal_5`.
    pub fn slot_keys(&self) -> Vec<String> {
        match self {
            NewsletterVariant::Pivot5 => (1..=5).map(|n| format!("slot_{n}")).collect(),
            NewsletterVariant::Signal => {
                let mut keys: Vec<String> = ["top_story", "ai_at_work", "emerging", "beyond"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                keys.extend((1..=5).map(|n| format!("signal_{n}")));
                keys
            }
        }
    }

    /// Signal section key for a source slot (slot 2 quick-hits are keyed by
    /// their ordinal instead).
    pub fn section_for_slot(&self, slot: u8) -> Option<&'static str> {
        match (self, slot) {
            (NewsletterVariant::Signal, 1) => Some("top_story"),
            (NewsletterVariant::Signal, 3) => Some("ai_at_work"),
            (NewsletterVariant::Signal, 4) => Some("emerging"),
            (NewsletterVariant::Signal, 5) => Some("beyond"),
            _ => None,
        }
    }
}

impl std::str::FromStr for NewsletterVariant {
    type Err = PivotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pivot5" | "pivot_5" | "pivot_ai" | "pivot-5" => Ok(NewsletterVariant::Pivot5),
            "signal" => Ok(NewsletterVariant::Signal),
            other => Err(PivotError::Validation(format!(
                "unknown newsletter variant: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Issue lifecycle. Transitions are monotonic; `rank` orders them and
/// `can_advance_to` rejects regressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "decorated")]
    Decorated,
    #[serde(rename = "compiled")]
    Compiled,
    #[serde(rename = "next-send")]
    NextSend,
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "sent")]
    Sent,
    #[serde(rename = "failed")]
    Failed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Decorated => "decorated",
            IssueStatus::Compiled => "compiled",
            IssueStatus::NextSend => "next-send",
            IssueStatus::Scheduled => "scheduled",
            IssueStatus::Sent => "sent",
            IssueStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IssueStatus::Pending => 0,
            IssueStatus::Decorated => 1,
            IssueStatus::Compiled => 2,
            IssueStatus::NextSend => 3,
            IssueStatus::Scheduled => 3,
            IssueStatus::Sent => 4,
            IssueStatus::Failed => 4,
        }
    }

    /// An Issue never regresses in status. `scheduled` and `next-send` are
    /// peers (the scheduled sweep flips one to the other), as are the
    /// terminal `sent`/`failed`.
    pub fn can_advance_to(&self, next: IssueStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = PivotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IssueStatus::Pending),
            "decorated" => Ok(IssueStatus::Decorated),
            "compiled" => Ok(IssueStatus::Compiled),
            "next-send" => Ok(IssueStatus::NextSend),
            "scheduled" => Ok(IssueStatus::Scheduled),
            "sent" => Ok(IssueStatus::Sent),
            "failed" => Ok(IssueStatus::Failed),
            other => Err(PivotError::Validation(format!("unknown issue status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStatus {
    Pending,
    Scored,
    Rejected,
}

impl FitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStatus::Pending => "pending",
            FitStatus::Scored => "scored",
            FitStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageStatus {
    #[serde(rename = "needs_image")]
    NeedsImage,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "generated")]
    Generated,
    #[serde(rename = "failed")]
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::NeedsImage => "needs_image",
            ImageStatus::Pending => "pending",
            ImageStatus::Generated => "generated",
            ImageStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A raw ingested item. Created by ingest; only scoring mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub fingerprint: String,
    pub canonical_url: String,
    pub title: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub needs_scoring: bool,
    pub fit_status: FitStatus,
}

/// An article that passed scoring, carrying extracted content and derived
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Select {
    pub fingerprint: String,
    pub source_name: String,
    pub canonical_url: String,
    pub headline: String,
    #[serde(default)]
    pub raw_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_body: Option<String>,
    pub interest_score: f64,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub ai_processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_session: Option<String>,
    #[serde(default)]
    pub extractor_used: bool,
}

/// One (article, slot) eligibility row written by the prefilter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefilterRow {
    pub fingerprint: String,
    pub article_id: String,
    pub headline: String,
    pub canonical_url: String,
    pub source_name: String,
    pub slot: u8,
    pub prefiltered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// A slot (or section) reference on an Issue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    /// Field-key prefix: `slot_1`, `top_story`, `signal_3`, ...
    pub key: String,
    pub fingerprint: String,
    pub headline: String,
    pub story_id: String,
}

/// A planned newsletter for a civil date.
#[derive(Debug, Clone)]
pub struct Issue {
    pub issue_id: String,
    pub issue_date: NaiveDate,
    pub status: IssueStatus,
    pub subject_line: Option<String>,
    pub compiled_html: Option<String>,
    pub scheduled_send_time: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub slots: Vec<SlotRef>,
}

impl Issue {
    pub fn new(issue_id: String, issue_date: NaiveDate) -> Self {
        Self {
            issue_id,
            issue_date,
            status: IssueStatus::Pending,
            subject_line: None,
            compiled_html: None,
            scheduled_send_time: None,
            sent_at: None,
            slots: Vec::new(),
        }
    }

    pub fn slot(&self, key: &str) -> Option<&SlotRef> {
        self.slots.iter().find(|s| s.key == key)
    }

    /// All fingerprints referenced by this issue's slots.
    pub fn fingerprints(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| !s.fingerprint.is_empty())
            .map(|s| s.fingerprint.as_str())
            .collect()
    }

    /// Flatten into a store field map: scalar columns plus
    /// `{key}_fingerprint` / `{key}_headline` / `{key}_story_id` per slot.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("issue_id".into(), Value::String(self.issue_id.clone()));
        fields.insert(
            "issue_date".into(),
            Value::String(self.issue_date.format("%Y-%m-%d").to_string()),
        );
        fields.insert(
            "status".into(),
            Value::String(self.status.as_str().to_string()),
        );
        if let Some(subject) = &self.subject_line {
            fields.insert("subject_line".into(), Value::String(subject.clone()));
        }
        if let Some(html) = &self.compiled_html {
            fields.insert("compiled_html".into(), Value::String(html.clone()));
        }
        if let Some(t) = &self.scheduled_send_time {
            fields.insert(
                "scheduled_send_time".into(),
                Value::String(t.to_rfc3339()),
            );
        }
        if let Some(t) = &self.sent_at {
            fields.insert("sent_at".into(), Value::String(t.to_rfc3339()));
        }
        for slot in &self.slots {
            fields.insert(
                format!("{}_fingerprint", slot.key),
                Value::String(slot.fingerprint.clone()),
            );
            fields.insert(
                format!("{}_headline", slot.key),
                Value::String(slot.headline.clone()),
            );
            fields.insert(
                format!("{}_story_id", slot.key),
                Value::String(slot.story_id.clone()),
            );
        }
        fields
    }

    /// Rebuild from a store field map, reading the slot keys the variant
    /// defines. Missing slots are simply absent.
    pub fn from_fields(variant: NewsletterVariant, fields: &Map<String, Value>) -> Option<Self> {
        let get = |key: &str| fields.get(key).and_then(Value::as_str);

        let issue_id = get("issue_id")?.to_string();
        let issue_date = NaiveDate::parse_from_str(get("issue_date")?, "%Y-%m-%d").ok()?;
        let status = get("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(IssueStatus::Pending);

        let mut slots = Vec::new();
        for key in variant.slot_keys() {
            let fingerprint = get(&format!("{key}_fingerprint")).unwrap_or_default();
            let headline = get(&format!("{key}_headline")).unwrap_or_default();
            let story_id = get(&format!("{key}_story_id")).unwrap_or_default();
            if fingerprint.is_empty() && headline.is_empty() && story_id.is_empty() {
                continue;
            }
            slots.push(SlotRef {
                key,
                fingerprint: fingerprint.to_string(),
                headline: headline.to_string(),
                story_id: story_id.to_string(),
            });
        }

        Some(Self {
            issue_id,
            issue_date,
            status,
            subject_line: get("subject_line").map(str::to_string),
            compiled_html: get("compiled_html").map(str::to_string),
            scheduled_send_time: get("scheduled_send_time")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
            sent_at: get("sent_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
            slots,
        })
    }
}

/// A decorated story attached to an Issue. One struct serves both variants;
/// the optional fields differ by variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueStory {
    pub story_id: String,
    pub issue_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_order: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub headline: String,
    // Pivot 5 fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dek: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b3: Option<String>,
    // Signal fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_liner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_it_matters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whats_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_blurb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_attribution: Option<String>,
    // Shared metadata.
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_status: Option<ImageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_source: Option<String>,
    #[serde(default)]
    pub raw_excerpt: String,
}

/// A compiled issue queued for sending. `html` is the rich variant;
/// `html_deliverability` is the stripped-down one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalIssue {
    pub issue_id: String,
    pub newsletter_id: String,
    pub html: String,
    #[serde(default)]
    pub html_deliverability: String,
    pub subject_line: String,
    pub status: IssueStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_plus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_send_time: Option<DateTime<Utc>>,
}

/// The archive row upserted after a send attempt, keyed on `issue_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRow {
    pub issue_id: String,
    pub newsletter_id: String,
    pub send_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    pub subject_line: String,
    pub status: IssueStatus,
    pub html: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub gateway_sent_count: i64,
    #[serde(default)]
    pub gateway_failed_recipients: i64,
    #[serde(default)]
    pub gateway_send_status: String,
    #[serde(default)]
    pub gateway_response_raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_monotonicity() {
        assert!(IssueStatus::Pending.can_advance_to(IssueStatus::Decorated));
        assert!(IssueStatus::Decorated.can_advance_to(IssueStatus::Compiled));
        assert!(IssueStatus::Compiled.can_advance_to(IssueStatus::NextSend));
        assert!(IssueStatus::NextSend.can_advance_to(IssueStatus::Sent));
        assert!(IssueStatus::NextSend.can_advance_to(IssueStatus::Failed));
        // Peers may flip between each other.
        assert!(IssueStatus::Scheduled.can_advance_to(IssueStatus::NextSend));
        // Regressions are rejected.
        assert!(!IssueStatus::Sent.can_advance_to(IssueStatus::Pending));
        assert!(!IssueStatus::Compiled.can_advance_to(IssueStatus::Decorated));
        assert!(!IssueStatus::Decorated.can_advance_to(IssueStatus::Pending));
    }

    #[test]
    fn variant_slot_orders() {
        assert_eq!(NewsletterVariant::Pivot5.slot_order(), &[1, 2, 3, 4, 5]);
        assert_eq!(NewsletterVariant::Signal.slot_order(), &[1, 3, 4, 5, 2]);
    }

    #[test]
    fn signal_slot_keys_cover_sections_and_quick_hits() {
        let keys = NewsletterVariant::Signal.slot_keys();
        assert_eq!(keys.len(), 9);
        assert!(keys.contains(&"top_story".to_string()));
        assert!(keys.contains(&"signal_5".to_string()));
    }

    #[test]
    fn issue_round_trips_through_fields() {
        let mut issue = Issue::new(
            "Pivot 5 - Jan 02".into(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        issue.subject_line = Some("AI Shakes Up Everything".into());
        issue.slots.push(SlotRef {
            key: "slot_1".into(),
            fingerprint: "p5-abc123".into(),
            headline: "Nvidia Eyes $3B Deal".into(),
            story_id: "rec001".into(),
        });

        let fields = issue.to_fields();
        assert_eq!(fields["slot_1_fingerprint"], "p5-abc123");

        let back = Issue::from_fields(NewsletterVariant::Pivot5, &fields).unwrap();
        assert_eq!(back.issue_id, issue.issue_id);
        assert_eq!(back.status, IssueStatus::Pending);
        assert_eq!(back.slots.len(), 1);
        assert_eq!(back.slot("slot_1").unwrap().headline, "Nvidia Eyes $3B Deal");
    }

    #[test]
    fn issue_fingerprints_skip_empty() {
        let mut issue = Issue::new("Signal - Jan 12".into(), NaiveDate::from_ymd_opt(2026, 1, 12).unwrap());
        issue.slots.push(SlotRef {
            key: "top_story".into(),
            fingerprint: "p5-x".into(),
            headline: "A".into(),
            story_id: "rec1".into(),
        });
        issue.slots.push(SlotRef {
            key: "signal_1".into(),
            fingerprint: String::new(),
            headline: "B".into(),
            story_id: "rec2".into(),
        });
        assert_eq!(issue.fingerprints(), vec!["p5-x"]);
    }
}
