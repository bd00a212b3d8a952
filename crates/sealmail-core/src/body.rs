//! Plain text to HTML conversion.

use html_escape::{encode_double_quoted_attribute, encode_safe};
use linkify::{LinkFinder, LinkKind};

/// Converts a plain text body to HTML.
///
/// Text is escaped, bare URLs become links and line breaks become `<br>`.
#[must_use]
pub fn text_to_html(text: &str) -> String {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut html = String::with_capacity(text.len() + text.len() / 8);
    for span in finder.spans(text) {
        if span.kind() == Some(&LinkKind::Url) {
            let url = span.as_str();
            html.push_str("<a href=\"");
            html.push_str(&encode_double_quoted_attribute(url));
            html.push_str("\">");
            html.push_str(&encode_safe(url));
            html.push_str("</a>");
        } else {
            push_text(&mut html, span.as_str());
        }
    }
    html
}

fn push_text(html: &mut String, text: &str) {
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        html.push_str(&encode_safe(line.strip_suffix('\r').unwrap_or(line)));
        if lines.peek().is_some() {
            html.push_str("<br>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_breaks() {
        assert_eq!(text_to_html("a\nb\r\nc"), "a<br>b<br>c");
        assert_eq!(text_to_html("end\n"), "end<br>");
        assert_eq!(text_to_html(""), "");
    }

    #[test]
    fn test_escapes_markup() {
        let html = text_to_html("<script>x</script> & more");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&amp;"));
    }

    #[test]
    fn test_links_urls() {
        let html = text_to_html("see https://example.com/a?b=1\nthanks");
        assert!(html.starts_with("see <a href=\"https://example.com/a?b=1\">"));
        assert!(html.ends_with("</a><br>thanks"));
    }

    #[test]
    fn test_email_addresses_stay_text() {
        assert_eq!(text_to_html("mail me@example.com"), "mail me@example.com");
    }
}
