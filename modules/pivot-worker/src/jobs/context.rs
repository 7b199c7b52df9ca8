//! Per-run selection state. The cumulative context is a value threaded
//! through the slot loop; the 14-day history is read once at stage start.
//! Neither ever crosses runs.

use std::collections::{HashMap, HashSet};

use pivot_common::types::Issue;

/// What the current run has already chosen.
#[derive(Debug, Default, Clone)]
pub struct SelectionContext {
    pub selected_story_ids: Vec<String>,
    pub selected_fingerprints: HashSet<String>,
    pub selected_headlines: HashSet<String>,
    pub selected_companies: Vec<String>,
    pub selected_sources: HashMap<String, u32>,
}

impl SelectionContext {
    pub fn record(
        &mut self,
        story_id: &str,
        fingerprint: &str,
        headline: &str,
        source: &str,
        company: Option<&str>,
    ) {
        if !story_id.is_empty() {
            self.selected_story_ids.push(story_id.to_string());
        }
        if !fingerprint.is_empty() {
            self.selected_fingerprints.insert(fingerprint.to_string());
        }
        if !headline.is_empty() {
            self.selected_headlines
                .insert(headline.to_lowercase().trim().to_string());
        }
        if !source.is_empty() {
            *self.selected_sources.entry(source.to_string()).or_insert(0) += 1;
        }
        if let Some(company) = company {
            let trimmed = company.trim();
            if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null") {
                self.selected_companies.push(trimmed.to_string());
            }
        }
    }

    pub fn source_count(&self, source: &str) -> u32 {
        self.selected_sources.get(source).copied().unwrap_or(0)
    }

    pub fn contains_story(&self, story_id: &str) -> bool {
        self.selected_story_ids.iter().any(|s| s == story_id)
    }

    pub fn contains_fingerprint(&self, fingerprint: &str) -> bool {
        self.selected_fingerprints.contains(fingerprint)
    }

    pub fn contains_headline(&self, headline: &str) -> bool {
        self.selected_headlines
            .contains(&headline.to_lowercase().trim().to_string())
    }
}

/// Identifiers from the rolling issue history, extracted once per run.
#[derive(Debug, Default, Clone)]
pub struct RecentIssueData {
    pub story_ids: HashSet<String>,
    pub fingerprints: HashSet<String>,
    /// Lowercased, trimmed.
    pub headlines: HashSet<String>,
    pub yesterday_headlines: Vec<String>,
    pub yesterday_fingerprints: HashSet<String>,
    pub yesterday_slot1_headline: Option<String>,
}

impl RecentIssueData {
    /// `issues` must be newest first; the first issue is "yesterday".
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut data = Self::default();

        for (idx, issue) in issues.iter().enumerate() {
            for slot in &issue.slots {
                if !slot.story_id.is_empty() {
                    data.story_ids.insert(slot.story_id.clone());
                }
                if !slot.fingerprint.is_empty() {
                    data.fingerprints.insert(slot.fingerprint.clone());
                }
                if !slot.headline.is_empty() {
                    data.headlines
                        .insert(slot.headline.to_lowercase().trim().to_string());
                    if idx == 0 {
                        data.yesterday_headlines.push(slot.headline.clone());
                    }
                }
                if idx == 0 && !slot.fingerprint.is_empty() {
                    data.yesterday_fingerprints.insert(slot.fingerprint.clone());
                }
            }
            if idx == 0 {
                data.yesterday_slot1_headline = issue
                    .slot("slot_1")
                    .or_else(|| issue.slot("top_story"))
                    .map(|s| s.headline.clone())
                    .filter(|h| !h.is_empty());
            }
        }

        data
    }

    /// The core deduplication check: fingerprint, case-insensitive headline,
    /// or story id seen in the history or in the current run.
    pub fn is_duplicate(
        &self,
        ctx: &SelectionContext,
        fingerprint: &str,
        headline: &str,
        story_id: &str,
    ) -> bool {
        let headline_key = headline.to_lowercase().trim().to_string();
        (!fingerprint.is_empty()
            && (self.fingerprints.contains(fingerprint) || ctx.contains_fingerprint(fingerprint)))
            || (!headline_key.is_empty()
                && (self.headlines.contains(&headline_key) || ctx.contains_headline(headline)))
            || (!story_id.is_empty()
                && (self.story_ids.contains(story_id) || ctx.contains_story(story_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pivot_common::types::SlotRef;

    fn issue_with(key: &str, fingerprint: &str, headline: &str, story_id: &str) -> Issue {
        let mut issue = Issue::new(
            "Pivot 5 - Jan 02".into(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        issue.slots.push(SlotRef {
            key: key.into(),
            fingerprint: fingerprint.into(),
            headline: headline.into(),
            story_id: story_id.into(),
        });
        issue
    }

    #[test]
    fn extracts_yesterday_and_history() {
        let issues = vec![
            issue_with("slot_1", "p5-new", "Nvidia Eyes $3B Deal", "rec1"),
            issue_with("slot_2", "p5-old", "Old Story", "rec9"),
        ];
        let data = RecentIssueData::from_issues(&issues);

        assert_eq!(
            data.yesterday_slot1_headline.as_deref(),
            Some("Nvidia Eyes $3B Deal")
        );
        assert_eq!(data.yesterday_headlines, vec!["Nvidia Eyes $3B Deal"]);
        assert!(data.fingerprints.contains("p5-old"));
        assert!(data.story_ids.contains("rec9"));
    }

    #[test]
    fn duplicate_check_is_case_insensitive_on_headline() {
        let issues = vec![issue_with("slot_1", "p5-a", "Nvidia Eyes $3B Deal", "rec1")];
        let data = RecentIssueData::from_issues(&issues);
        let ctx = SelectionContext::default();

        assert!(data.is_duplicate(&ctx, "", "NVIDIA EYES $3B DEAL", ""));
        assert!(data.is_duplicate(&ctx, "p5-a", "Different", ""));
        assert!(data.is_duplicate(&ctx, "", "", "rec1"));
        assert!(!data.is_duplicate(&ctx, "p5-b", "Fresh Story", "rec2"));
    }

    #[test]
    fn duplicate_check_sees_current_run() {
        let data = RecentIssueData::default();
        let mut ctx = SelectionContext::default();
        ctx.record("rec5", "p5-x", "Chosen Today", "Reuters", Some("Anthropic"));

        assert!(data.is_duplicate(&ctx, "p5-x", "", ""));
        assert!(data.is_duplicate(&ctx, "", "chosen today", ""));
        assert!(data.is_duplicate(&ctx, "", "", "rec5"));
        assert_eq!(ctx.source_count("Reuters"), 1);
        assert_eq!(ctx.selected_companies, vec!["Anthropic"]);
    }

    #[test]
    fn null_companies_are_ignored() {
        let mut ctx = SelectionContext::default();
        ctx.record("rec1", "p5-a", "H", "Reuters", Some("null"));
        ctx.record("rec2", "p5-b", "H2", "Reuters", None);
        assert!(ctx.selected_companies.is_empty());
        assert_eq!(ctx.source_count("Reuters"), 2);
    }
}
