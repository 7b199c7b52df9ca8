//! Deliverability variant: a single safe font, no images, no links beyond
//! the unsubscribe placeholder, and the brand name rewritten to a generic
//! equivalent.

use regex::Regex;

use pivot_common::types::IssueStory;

use super::escape::escape_html;

/// Build the stripped-down HTML from decorated stories. `brand_replacement`
/// substitutes for any occurrence of the Pivot 5 brand name.
pub fn strip_for_deliverability(
    stories: &[IssueStory],
    _subject_line: &str,
    brand_replacement: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(
        "<div style=\"font-family: Arial, Helvetica, sans-serif; font-size: 15px; line-height: 1.7; color: #333;\">"
            .to_string(),
    );

    // Leading headline from the first story.
    if let Some(first) = stories.first() {
        if !first.headline.is_empty() {
            parts.push(format!(
                "<div style=\"font-size: 18px; font-weight: bold; color: #111; margin-bottom: 24px;\">{}</div>",
                escape_html(&first.headline, false)
            ));
        }
    }

    for (i, story) in stories.iter().enumerate() {
        if !story.label.is_empty() {
            parts.push(format!(
                "<div style=\"font-size: 12px; font-weight: bold; color: #666; text-transform: uppercase; letter-spacing: 1px; margin-bottom: 8px;\">{}</div>",
                escape_html(&story.label, false)
            ));
        }

        if !story.headline.is_empty() {
            parts.push(format!(
                "<div style=\"font-size: 16px; font-weight: 600; color: #111; margin-bottom: 12px;\">{}</div>",
                escape_html(&story.headline, false)
            ));
        }

        for bullet in [&story.b1, &story.b2, &story.b3] {
            if let Some(bullet) = bullet.as_deref().filter(|b| !b.is_empty()) {
                parts.push(format!(
                    "<div style=\"margin-bottom: 10px; padding-left: 16px;\">\u{2022} {}</div>",
                    escape_html(bullet.trim(), true)
                ));
            }
        }

        if i < stories.len() - 1 {
            parts.push(
                "<hr style=\"border: none; border-top: 1px solid #e0e0e0; margin: 24px 0;\">"
                    .to_string(),
            );
        }
    }

    parts.push(
        "<div style=\"font-size: 12px; color: #888; margin-top: 20px;\">\
         You're receiving this because you subscribed to our daily AI briefing.<br>\
         Unsubscribe: {{unsubscribe_url}}\
         </div>"
            .to_string(),
    );
    parts.push("</div>".to_string());

    let html = parts.join("\n");

    // Brand rewrite for deliverability; the replacement is configurable.
    let brand = Regex::new(r"(?i)Pivot\s*5").expect("static regex");
    brand.replace_all(&html, brand_replacement).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(headline: &str) -> IssueStory {
        IssueStory {
            story_id: "s1".into(),
            issue_id: "Pivot 5 - Jan 02".into(),
            slot_order: Some(1),
            headline: headline.into(),
            b1: Some("Pivot 5 grows. A <b>bold</b> claim.".into()),
            b2: Some("Second point.".into()),
            label: "BIG TECH".into(),
            image_url: Some("https://imagedelivery.net/x/public".into()),
            ..Default::default()
        }
    }

    #[test]
    fn brand_is_rewritten_case_insensitively() {
        let html = strip_for_deliverability(
            &[story("PIVOT 5 Hits a Milestone")],
            "Subject",
            "Daily AI Briefing",
        );
        assert!(!html.to_lowercase().contains("pivot 5"));
        assert!(html.contains("Daily AI Briefing"));
    }

    #[test]
    fn no_images_and_single_font() {
        let html = strip_for_deliverability(&[story("Headline")], "Subject", "Daily AI Briefing");
        assert!(!html.contains("<img"));
        assert!(!html.contains("<a href"));
        assert!(html.contains("Arial, Helvetica, sans-serif"));
        assert!(html.contains("{{unsubscribe_url}}"));
    }

    #[test]
    fn bold_markers_survive_in_bullets() {
        let html = strip_for_deliverability(&[story("Headline")], "Subject", "Daily AI Briefing");
        assert!(html.contains("<b>bold</b>"));
    }

    #[test]
    fn separators_only_between_stories() {
        let html =
            strip_for_deliverability(&[story("A"), story("B")], "Subject", "Daily AI Briefing");
        assert_eq!(html.matches("<hr").count(), 1);
    }
}
