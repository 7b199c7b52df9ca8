//! HTML escaping that preserves the decoration's `<b>` emphasis markers, and
//! bullet-list formatting for the Signal sections.

const BOLD_OPEN: &str = "___BOLD_OPEN___";
const BOLD_CLOSE: &str = "___BOLD_CLOSE___";

/// Escape HTML special characters. With `preserve_bold`, `<b>`/`</b>` pairs
/// survive; everything else user-sourced is escaped.
pub fn escape_html(text: &str, preserve_bold: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut work = text.to_string();
    if preserve_bold {
        work = work.replace("<b>", BOLD_OPEN).replace("</b>", BOLD_CLOSE);
    }

    work = work
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;");

    if preserve_bold {
        work = work.replace(BOLD_OPEN, "<b>").replace(BOLD_CLOSE, "</b>");
    }
    work
}

/// Convert "• item" lines into a table-based bullet list for email clients.
/// Text without bullets is returned escaped as-is.
pub fn format_bullet_list(text: &str, accent_color: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let bullets: Vec<&str> = text
        .split('\u{2022}')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if bullets.is_empty() {
        return escape_html(text, true);
    }

    let items: Vec<String> = bullets
        .iter()
        .map(|bullet| {
            format!(
                "<tr>\n\
                 <td valign=\"top\" style=\"width:20px; font-family:Georgia, serif; font-size:15px; color:{accent_color}; padding-right:8px;\">&#8226;</td>\n\
                 <td style=\"font-family:Georgia, serif; font-size:15px; color:#475569; line-height:1.7;\">{}</td>\n\
                 </tr>",
                escape_html(bullet, true)
            )
        })
        .collect();

    format!(
        "<table role=\"presentation\" cellspacing=\"0\" cellpadding=\"0\" border=\"0\" style=\"margin:0;\">\n{}\n</table>",
        items.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(
            escape_html("Profits & \"losses\" <up>", false),
            "Profits &amp; &quot;losses&quot; &lt;up&gt;"
        );
    }

    #[test]
    fn preserves_bold_markers() {
        assert_eq!(
            escape_html("A <b>key</b> point & more", true),
            "A <b>key</b> point &amp; more"
        );
    }

    #[test]
    fn escapes_bold_markers_when_not_preserving() {
        assert_eq!(escape_html("<b>x</b>", false), "&lt;b&gt;x&lt;/b&gt;");
    }

    #[test]
    fn bullet_list_renders_two_rows() {
        let html = format_bullet_list("\u{2022} X <b>y</b>.\n\u{2022} Z.", "#059669");
        assert_eq!(html.matches("<tr>").count(), 2);
        assert!(html.contains("<b>y</b>"));
    }

    #[test]
    fn bulletless_text_is_escaped_verbatim() {
        let html = format_bullet_list("No bullets here", "#059669");
        assert_eq!(html, "No bullets here");
    }
}
