//! HTML document holding the `<img>` elements that images are spliced into.
//!
//! Only `<img>` start tags are parsed; the rest of the markup is carried
//! through untouched, so serialization returns the input with just the
//! edited `src` attributes changed.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)]
static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap());

#[allow(clippy::unwrap_used)]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

/// An HTML document being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    html: String,
}

#[derive(Debug)]
struct ImgTag {
    /// Byte range of the tag in the document.
    range: Range<usize>,
    attributes: Vec<Attribute>,
}

#[derive(Debug)]
struct Attribute {
    name: String,
    value: String,
    /// Absolute byte range of `name="value"`.
    range: Range<usize>,
}

impl ImgTag {
    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn matches(&self, name: &str, expected: &str) -> bool {
        self.attribute(name)
            .is_some_and(|a| a.value.trim().eq_ignore_ascii_case(expected))
    }
}

impl HtmlDocument {
    /// Wraps an HTML string.
    #[must_use]
    pub fn parse(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Returns the current markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// Serializes the document.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.html.clone()
    }

    /// Number of `<img>` elements in the document.
    #[must_use]
    pub fn image_count(&self) -> usize {
        IMG_TAG.find_iter(&self.html).count()
    }

    /// Sets the `src` of the `<img>` elements that reference `content_id`.
    ///
    /// Elements are looked up with `src="cid:<id>"`, then `src="<id>"`, then
    /// `rel="<id>"`; the first lookup that matches anything is used.
    /// Returns the number of elements changed.
    pub fn splice(&mut self, content_id: &str, src: &str) -> usize {
        let tags = self.img_tags();
        let cid_src = format!("cid:{content_id}");
        let lookups = [
            ("src", cid_src.as_str()),
            ("src", content_id),
            ("rel", content_id),
        ];

        let Some(matched) = lookups.iter().find_map(|(name, expected)| {
            let matched: Vec<&ImgTag> =
                tags.iter().filter(|tag| tag.matches(name, expected)).collect();
            (!matched.is_empty()).then_some(matched)
        }) else {
            return 0;
        };

        let replacement = format!("src=\"{src}\"");
        // Edit from the back so earlier ranges stay valid.
        for tag in matched.iter().rev() {
            match tag.attribute("src") {
                Some(attr) => self.html.replace_range(attr.range.clone(), &replacement),
                None => {
                    let at = tag.range.start + "<img".len();
                    self.html.insert_str(at, &format!(" {replacement}"));
                }
            }
        }
        matched.len()
    }

    fn img_tags(&self) -> Vec<ImgTag> {
        IMG_TAG
            .find_iter(&self.html)
            .map(|tag| {
                let inner_start = tag.start() + "<img".len();
                let inner = &self.html[inner_start..tag.end() - 1];
                let attributes = ATTRIBUTE
                    .captures_iter(inner)
                    .filter_map(|caps| {
                        let whole = caps.get(0)?;
                        let name = caps.get(1)?.as_str().to_ascii_lowercase();
                        let value = caps
                            .get(2)
                            .or_else(|| caps.get(3))
                            .or_else(|| caps.get(4))
                            .map_or_else(String::new, |m| m.as_str().to_string());
                        Some(Attribute {
                            name,
                            value,
                            range: inner_start + whole.start()..inner_start + whole.end(),
                        })
                    })
                    .collect();
                ImgTag {
                    range: tag.range(),
                    attributes,
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_splice_cid_reference() {
        let mut doc = HtmlDocument::parse(
            r#"<p>Hi</p><img alt="logo" src="cid:logo@x" width="10"><img src="other.png">"#,
        );
        assert_eq!(doc.splice("logo@x", "data:image/jpeg;base64,AAAA"), 1);
        assert_eq!(
            doc.serialize(),
            r#"<p>Hi</p><img alt="logo" src="data:image/jpeg;base64,AAAA" width="10"><img src="other.png">"#
        );
    }

    #[test]
    fn test_splice_all_matching_elements() {
        let mut doc = HtmlDocument::parse(r#"<img src="cid:a"><br><IMG SRC='CID:a' />"#);
        assert_eq!(doc.image_count(), 2);
        assert_eq!(doc.splice("a", "data:x"), 2);
        assert_eq!(doc.as_str(), r#"<img src="data:x"><br><IMG src="data:x" />"#);
    }

    #[test]
    fn test_lookup_order() {
        let mut doc = HtmlDocument::parse(r#"<img src="pic"><img rel="pic">"#);
        assert_eq!(doc.splice("pic", "data:y"), 1);
        assert_eq!(doc.as_str(), r#"<img src="data:y"><img rel="pic">"#);
    }

    #[test]
    fn test_rel_match_inserts_src() {
        let mut doc = HtmlDocument::parse(r#"<img rel="pic" alt='a > b'>"#);
        assert_eq!(doc.splice("pic", "data:z"), 1);
        assert_eq!(doc.as_str(), r#"<img src="data:z" rel="pic" alt='a > b'>"#);
    }

    #[test]
    fn test_no_match_leaves_document() {
        let html = r#"<img src="cid:other"><imgx src="cid:a">"#;
        let mut doc = HtmlDocument::parse(html);
        assert_eq!(doc.splice("a", "data:x"), 0);
        assert_eq!(doc.as_str(), html);
    }

    #[test]
    fn test_unquoted_attribute() {
        let mut doc = HtmlDocument::parse("<img src=cid:u1 alt=x>");
        assert_eq!(doc.splice("u1", "data:q"), 1);
        assert_eq!(doc.as_str(), r#"<img src="data:q" alt=x>"#);
    }

    proptest! {
        #[test]
        fn splice_never_panics(html in ".{0,200}", cid in "[a-z0-9@.]{1,12}") {
            let mut doc = HtmlDocument::parse(html);
            let _ = doc.splice(&cid, "data:image/jpeg;base64,AA==");
        }
    }
}
