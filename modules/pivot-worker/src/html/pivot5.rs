//! Pivot 5 rich email template: responsive single-column table layout with
//! per-story image, label, headline, dek, and bullets. Inline styles only.
//! Rendering is deterministic: identical inputs produce identical bytes.

use chrono::{Datelike, NaiveDate};

use pivot_common::types::IssueStory;

use super::escape::escape_html;

const ACCENT: &str = "#f97316";

pub fn render(stories: &[IssueStory], subject_line: &str, issue_date: NaiveDate) -> String {
    let date_display = issue_date.format("%B %d, %Y").to_string();
    let year = issue_date.year();

    let story_blocks: String = stories.iter().map(story_block).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>
    body {{ margin: 0; padding: 0; background-color: #f4f4f5; }}
    table {{ border-collapse: collapse; }}
    .wrapper {{ width: 640px; max-width: 100%; }}
    @media only screen and (max-width: 680px) {{
      .wrapper {{ width: 100% !important; }}
      .stack {{ display: block !important; width: 100% !important; }}
    }}
  </style>
</head>
<body style="margin:0; padding:0; background-color:#f4f4f5;">
  <!-- Hidden preheader -->
  <div style="display:none; max-height:0; overflow:hidden; opacity:0; font-size:1px; line-height:1px; color:#f4f4f5;">
    {title}
  </div>

  <center style="width:100%; background-color:#f4f4f5;">
    <table role="presentation" width="100%" cellspacing="0" cellpadding="0" border="0">
      <tr>
        <td align="center" style="padding:24px 16px;">
          <table role="presentation" class="wrapper" cellspacing="0" cellpadding="0" border="0" style="background-color:#ffffff; border:1px solid #e4e4e7; border-radius:8px;">

            <!-- Brand accent bar -->
            <tr>
              <td style="background-color:{accent}; height:4px; padding:0; border-radius:8px 8px 0 0;"></td>
            </tr>

            <!-- Header -->
            <tr>
              <td style="padding:24px 24px 16px 24px; border-bottom:1px solid #e4e4e7;">
                <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
                  <tr>
                    <td align="center">
                      <div style="font-family:Arial, Helvetica, sans-serif; font-size:28px; font-weight:bold; color:#18181b; letter-spacing:1px;">PIVOT 5</div>
                      <div style="font-family:Arial, Helvetica, sans-serif; font-size:13px; color:#71717a; margin-top:6px;">5 headlines. 5 minutes. 5 days a week.</div>
                      <div style="font-family:Arial, Helvetica, sans-serif; font-size:12px; color:#a1a1aa; margin-top:4px;">{date}</div>
                    </td>
                  </tr>
                </table>
              </td>
            </tr>
{stories}
            <!-- Footer -->
            <tr>
              <td style="padding:24px; border-top:1px solid #e4e4e7; background-color:#fafafa;">
                <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
                  <tr>
                    <td style="font-family:Arial, Helvetica, sans-serif; font-size:12px; line-height:1.6; color:#a1a1aa; text-align:center;">
                      You're receiving this because you subscribed to Pivot 5.<br />
                      {{{{unsubscribe_url}}}}
                    </td>
                  </tr>
                  <tr>
                    <td align="center" style="padding-top:12px; font-family:Arial, Helvetica, sans-serif; font-size:11px; color:#a1a1aa;">
                      &copy; {year} Pivot Media
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
        accent = ACCENT,
        date = escape_html(&date_display, false),
        stories = story_blocks,
        year = year,
    )
}

fn story_block(story: &IssueStory) -> String {
    let mut block = String::from(
        "\n            <!-- Story -->\n            <tr>\n              <td class=\"stack\" style=\"padding:24px; border-bottom:1px solid #e4e4e7;\">\n",
    );

    if let Some(url) = story.image_url.as_deref().filter(|u| !u.is_empty()) {
        block.push_str(&format!(
            "                <img src=\"{}\" width=\"592\" alt=\"\" style=\"width:100%; max-width:592px; height:auto; border-radius:6px; margin-bottom:16px;\" />\n",
            escape_html(url, false)
        ));
    }

    if !story.label.is_empty() {
        block.push_str(&format!(
            "                <div style=\"font-family:Arial, Helvetica, sans-serif; font-size:11px; font-weight:bold; text-transform:uppercase; letter-spacing:1px; color:{ACCENT}; margin-bottom:8px;\">{}</div>\n",
            escape_html(&story.label, false)
        ));
    }

    block.push_str(&format!(
        "                <div style=\"font-family:Arial, Helvetica, sans-serif; font-size:20px; font-weight:bold; color:#18181b; line-height:1.3; margin-bottom:8px;\">{}</div>\n",
        escape_html(&story.headline, false)
    ));

    if let Some(dek) = story.dek.as_deref().filter(|d| !d.is_empty()) {
        block.push_str(&format!(
            "                <div style=\"font-family:Arial, Helvetica, sans-serif; font-size:15px; color:#52525b; line-height:1.5; margin-bottom:12px;\">{}</div>\n",
            escape_html(dek, false)
        ));
    }

    for bullet in [&story.b1, &story.b2, &story.b3] {
        if let Some(bullet) = bullet.as_deref().filter(|b| !b.is_empty()) {
            block.push_str(&format!(
                "                <div style=\"font-family:Arial, Helvetica, sans-serif; font-size:15px; color:#3f3f46; line-height:1.6; margin-bottom:8px; padding-left:16px;\">&#8226; {}</div>\n",
                escape_html(bullet, true)
            ));
        }
    }

    block.push_str("              </td>\n            </tr>\n");
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivot_common::types::ImageStatus;

    fn story(slot: u8, headline: &str) -> IssueStory {
        IssueStory {
            story_id: format!("story-{slot}"),
            issue_id: "Pivot 5 - Jan 02".into(),
            slot_order: Some(slot),
            headline: headline.into(),
            dek: Some("A hook.".into()),
            b1: Some("First <b>bold</b> point. Detail.".into()),
            b2: Some("Second point. Detail.".into()),
            b3: Some("Third point. Detail.".into()),
            label: "BIG TECH".into(),
            image_url: Some("https://imagedelivery.net/x/public".into()),
            image_status: Some(ImageStatus::Generated),
            ..Default::default()
        }
    }

    #[test]
    fn renders_all_stories_with_inline_styles_only() {
        let stories: Vec<IssueStory> =
            (1..=5).map(|n| story(n, &format!("Headline {n}"))).collect();
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let html = render(&stories, "Today's AI Brief", date);

        for n in 1..=5 {
            assert!(html.contains(&format!("Headline {n}")));
        }
        assert!(html.contains("{{unsubscribe_url}}"));
        assert!(html.contains("&copy; 2026"));
        assert!(!html.contains("class=\"external-css\""));
        // Bold emphasis survives escaping.
        assert!(html.contains("<b>bold</b>"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let stories = vec![story(1, "Same Input")];
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let first = render(&stories, "Subject", date);
        let second = render(&stories, "Subject", date);
        assert_eq!(first, second);
    }

    #[test]
    fn user_text_is_escaped() {
        let mut s = story(1, "Profits & <script>alert(1)</script>");
        s.dek = Some("\"quoted\" text".into());
        let html = render(
            &[s],
            "Subject",
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        assert!(html.contains("Profits &amp; &lt;script&gt;"));
        assert!(html.contains("&quot;quoted&quot;"));
    }
}
