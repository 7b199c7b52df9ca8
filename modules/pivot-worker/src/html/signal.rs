//! Signal email template: Georgia serif, green accent, 600px, no links and
//! no images. An At-a-Glance digest up top, then the four full stories and
//! the five numbered signals. Deterministic for identical inputs.

use chrono::{Datelike, NaiveDate};

use pivot_common::types::IssueStory;

use super::escape::{escape_html, format_bullet_list};

const ACCENT: &str = "#059669";

/// Display order for sections in the compiled email.
pub const SECTION_ORDER: &[&str] = &["top_story", "ai_at_work", "emerging", "beyond"];

const SECTION_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("top_story", "TOP STORY"),
    ("ai_at_work", "AI AT WORK"),
    ("emerging", "EMERGING MOVES"),
    ("beyond", "BEYOND BUSINESS"),
];

fn display_name(section: &str) -> String {
    SECTION_DISPLAY_NAMES
        .iter()
        .find(|(key, _)| *key == section)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| section.to_uppercase())
}

fn section_story<'a>(stories: &'a [IssueStory], section: &str) -> Option<&'a IssueStory> {
    stories
        .iter()
        .find(|s| s.section.as_deref() == Some(section))
}

fn signal_story(stories: &[IssueStory], ordinal: u8) -> Option<&IssueStory> {
    stories
        .iter()
        .find(|s| s.section.as_deref() == Some("signal") && s.slot_order == Some(ordinal))
}

pub fn render(stories: &[IssueStory], subject_line: &str, issue_date: NaiveDate) -> String {
    let date_display = issue_date.format("%B %d, %Y").to_string();
    let year = issue_date.year();

    let at_a_glance = build_at_a_glance(stories);
    let full_stories = build_full_stories(stories);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>
    body {{ margin: 0; padding: 0; background-color: #f8fafc; }}
    table {{ border-collapse: collapse; }}
    .signal-wrap {{ width: 600px; max-width: 100%; }}
    @media only screen and (max-width: 640px) {{
      .signal-wrap {{ width: 100% !important; }}
      .sig-block {{ display: block !important; width: 100% !important; }}
    }}
  </style>
</head>
<body style="margin:0; padding:0; background-color:#f8fafc;">
  <!-- Hidden preheader -->
  <div style="display:none; max-height:0; overflow:hidden; opacity:0; font-size:1px; line-height:1px; color:#f8fafc;">
    {title}
  </div>

  <center style="width:100%; background-color:#f8fafc;">
    <table role="presentation" width="100%" cellspacing="0" cellpadding="0" border="0">
      <tr>
        <td align="center" style="padding:32px 16px;">
          <table role="presentation" class="signal-wrap" cellspacing="0" cellpadding="0" border="0" style="background-color:#ffffff; border:1px solid #e2e8f0; border-radius:8px;">

            <!-- Brand accent bar -->
            <tr>
              <td style="background-color:#143330; height:4px; padding:0; border-radius:8px 8px 0 0;"></td>
            </tr>

            <!-- Header -->
            <tr>
              <td style="padding:32px 32px 24px 32px; border-bottom:1px solid #e2e8f0;">
                <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
                  <tr>
                    <td align="center">
                      <div style="font-family:Georgia, serif; font-size:32px; font-weight:bold; color:#1e293b; letter-spacing:2px;">SIGNAL</div>
                      <div style="font-family:Georgia, serif; font-size:13px; color:#64748b; margin-top:8px;">{date}</div>
                    </td>
                  </tr>
                </table>
              </td>
            </tr>

            <!-- Intro -->
            <tr>
              <td style="padding:24px 32px; background-color:#f8fafc;">
                <div style="font-family:Georgia, serif; font-size:16px; line-height:1.7; color:#475569; text-align:center;">
                  Your daily AI briefing is ready. Here's what matters today.
                </div>
              </td>
            </tr>

            <!-- At-a-Glance -->
            <tr>
              <td style="padding:0 32px 24px 32px;">
                <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="background-color:#f1f5f9; border-radius:6px;">
                  <tr>
                    <td style="padding:24px;">
{at_a_glance}
                    </td>
                  </tr>
                </table>
              </td>
            </tr>

            <!-- Full Stories -->
{full_stories}
            <!-- Footer -->
            <tr>
              <td style="padding:24px 32px; border-top:1px solid #e2e8f0; background-color:#f8fafc;">
                <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
                  <tr>
                    <td style="font-family:Georgia, serif; font-size:12px; line-height:1.6; color:#94a3b8; text-align:center;">
                      You're receiving this because you subscribed to Signal.<br />
                      {{{{unsubscribe_url}}}}
                    </td>
                  </tr>
                  <tr>
                    <td align="center" style="padding-top:16px; font-family:Georgia, serif; font-size:11px; color:#94a3b8;">
                      &copy; {year} Signal AI Briefing
                    </td>
                  </tr>
                </table>
              </td>
            </tr>

          </table>
        </td>
      </tr>
    </table>
  </center>
</body>
</html>"#,
        title = escape_html(subject_line, false),
        date = escape_html(&date_display, false),
        at_a_glance = at_a_glance,
        full_stories = full_stories,
        year = year,
    )
}

/// Four section headlines with one-liners, then the five signals as a
/// numbered list.
fn build_at_a_glance(stories: &[IssueStory]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for section in SECTION_ORDER {
        let Some(story) = section_story(stories, section) else {
            continue;
        };
        if story.headline.is_empty() {
            continue;
        }
        let one_liner = story.one_liner.as_deref().unwrap_or_default();
        parts.push(format!(
            "                      <div style=\"margin-bottom:16px;\">\n\
             <div style=\"font-family:Georgia, serif; font-size:11px; font-weight:bold; text-transform:uppercase; letter-spacing:0.5px; color:{ACCENT}; margin-bottom:4px;\">{}</div>\n\
             <div style=\"font-family:Georgia, serif; font-size:15px; font-weight:600; color:#1e293b; line-height:1.4;\">{}</div>\n\
             <div style=\"font-family:Georgia, serif; font-size:14px; color:#64748b; line-height:1.5; margin-top:4px;\">{}</div>\n\
             </div>",
            escape_html(&display_name(section), false),
            escape_html(&story.headline, false),
            escape_html(one_liner, false),
        ));
    }

    let mut signal_items: Vec<String> = Vec::new();
    for ordinal in 1..=5u8 {
        let Some(story) = signal_story(stories, ordinal) else {
            continue;
        };
        if story.headline.is_empty() {
            continue;
        }
        signal_items.push(format!(
            "                        <div style=\"font-family:Georgia, serif; font-size:14px; color:#475569; line-height:1.5; margin-bottom:8px; padding-left:20px; text-indent:-20px;\"><span style=\"color:{ACCENT}; font-weight:600;\">{ordinal}.</span> {}</div>",
            escape_html(&story.headline, false),
        ));
    }

    if !signal_items.is_empty() {
        parts.push(format!(
            "                      <div style=\"margin-top:20px; padding-top:16px; border-top:1px solid #cbd5e1;\">\n\
             <div style=\"font-family:Georgia, serif; font-size:11px; font-weight:bold; text-transform:uppercase; letter-spacing:0.5px; color:#64748b; margin-bottom:12px;\">SIGNALS</div>\n{}\n\
             </div>",
            signal_items.join("\n")
        ));
    }

    parts.join("\n")
}

/// The four expanded stories (lead paragraphs, why-it-matters and
/// what's-next bullet tables) followed by the signals with blurbs.
fn build_full_stories(stories: &[IssueStory]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for section in SECTION_ORDER {
        let Some(story) = section_story(stories, section) else {
            continue;
        };
        if story.headline.is_empty() {
            continue;
        }

        let mut block = format!(
            "            <tr>\n\
             <td class=\"sig-block\" style=\"padding:24px 32px; border-top:1px solid #e2e8f0;\">\n\
             <div style=\"font-family:Georgia, serif; font-size:11px; font-weight:bold; text-transform:uppercase; letter-spacing:1px; color:{ACCENT}; margin-bottom:8px;\">{}</div>\n\
             <div style=\"font-family:Georgia, serif; font-size:20px; font-weight:600; color:#1e293b; line-height:1.3; margin-bottom:16px;\">{}</div>\n",
            escape_html(&display_name(section), false),
            escape_html(&story.headline, false),
        );

        // The lead's blank lines become paragraph breaks.
        if let Some(lead) = story.lead.as_deref().filter(|l| !l.is_empty()) {
            let paragraphs: String = lead
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    format!(
                        "<p style=\"font-family:Georgia, serif; font-size:16px; color:#475569; line-height:1.7; margin:0 0 12px 0;\">{}</p>",
                        escape_html(p, true)
                    )
                })
                .collect();
            block.push_str(&format!(
                "             <div style=\"margin-bottom:16px;\">{paragraphs}</div>\n"
            ));
        }

        for (field, heading) in [
            (&story.why_it_matters, "Why It Matters"),
            (&story.whats_next, "What's Next"),
        ] {
            if let Some(content) = field.as_deref().filter(|c| !c.is_empty()) {
                block.push_str(&format!(
                    "             <div style=\"margin-bottom:16px;\">\n\
                     <div style=\"font-family:Georgia, serif; font-size:12px; font-weight:bold; text-transform:uppercase; letter-spacing:0.5px; color:#64748b; margin-bottom:6px;\">{heading}</div>\n\
                     <div>{}</div>\n\
                     </div>\n",
                    format_bullet_list(content, ACCENT)
                ));
            }
        }

        block.push_str("              </td>\n            </tr>\n");
        parts.push(block);
    }

    let mut signal_parts: Vec<String> = Vec::new();
    for ordinal in 1..=5u8 {
        let Some(story) = signal_story(stories, ordinal) else {
            continue;
        };
        if story.headline.is_empty() {
            continue;
        }
        let blurb = story.signal_blurb.as_deref().unwrap_or_default();
        signal_parts.push(format!(
            "                <div style=\"margin-bottom:16px;\">\n\
             <div style=\"font-family:Georgia, serif; font-size:15px; font-weight:600; color:#1e293b; line-height:1.4;\"><span style=\"color:{ACCENT};\">{ordinal}.</span> {}</div>\n\
             <div style=\"font-family:Georgia, serif; font-size:14px; color:#64748b; line-height:1.5; margin-top:4px;\">{}</div>\n\
             </div>",
            escape_html(&story.headline, false),
            escape_html(blurb, false),
        ));
    }

    if !signal_parts.is_empty() {
        parts.push(format!(
            "            <tr>\n\
             <td class=\"sig-block\" style=\"padding:24px 32px; border-top:1px solid #e2e8f0;\">\n\
             <div style=\"font-family:Georgia, serif; font-size:11px; font-weight:bold; text-transform:uppercase; letter-spacing:1px; color:{ACCENT}; margin-bottom:16px;\">SIGNALS</div>\n{}\n\
             </td>\n            </tr>\n",
            signal_parts.join("\n")
        ));
    }

    parts.join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(section: &str, headline: &str) -> IssueStory {
        IssueStory {
            story_id: format!("story-{section}"),
            issue_id: "Signal - Jan 12".into(),
            section: Some(section.into()),
            slot_order: Some(1),
            headline: headline.into(),
            one_liner: Some("One liner.".into()),
            lead: Some("A.\n\nB.".into()),
            why_it_matters: Some("\u{2022} X <b>y</b>.\n\u{2022} Z.".into()),
            whats_next: Some("\u{2022} P.\n\u{2022} Q.".into()),
            source_attribution: Some("via Bloomberg".into()),
            ..Default::default()
        }
    }

    fn quick(ordinal: u8, headline: &str) -> IssueStory {
        IssueStory {
            story_id: format!("story-s{ordinal}"),
            issue_id: "Signal - Jan 12".into(),
            section: Some("signal".into()),
            slot_order: Some(ordinal),
            headline: headline.into(),
            signal_blurb: Some("One sentence of context.".into()),
            ..Default::default()
        }
    }

    #[test]
    fn lead_renders_as_two_paragraphs() {
        let stories = vec![full("top_story", "Top Headline")];
        let html = render(
            &stories,
            "Subject",
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );
        assert_eq!(html.matches("<p style=").count(), 2);
        assert!(html.contains("Why It Matters"));
        assert!(html.contains("What's Next"));
        // Two bullet rows in each of the two bullet tables.
        assert_eq!(html.matches("&#8226;").count(), 4);
        assert!(html.contains("<b>y</b>"));
    }

    #[test]
    fn sections_render_in_fixed_order_with_signals_last() {
        let stories = vec![
            quick(1, "Signal One"),
            full("beyond", "Beyond Headline"),
            full("top_story", "Top Headline"),
        ];
        let html = render(
            &stories,
            "Subject",
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );

        let top = html.find("Top Headline").unwrap();
        let beyond = html.find("Beyond Headline").unwrap();
        assert!(top < beyond);
        let signal = html.rfind("Signal One").unwrap();
        assert!(beyond < signal);
    }

    #[test]
    fn no_images_and_no_external_links() {
        let stories = vec![full("top_story", "Top"), quick(1, "S1")];
        let html = render(
            &stories,
            "Subject",
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );
        assert!(!html.contains("<img"));
        assert!(!html.contains("<a href"));
        assert!(html.contains("{{unsubscribe_url}}"));
    }

    #[test]
    fn deterministic_output() {
        let stories = vec![full("top_story", "Top"), quick(2, "S2")];
        let date = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        assert_eq!(
            render(&stories, "Subject", date),
            render(&stories, "Subject", date)
        );
    }
}
