//! HTML extraction: titles, plain text, outbound links, charset handling.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*charset\s*=\s*["']?([^"'>\s]+)"#).expect("valid charset regex")
});
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Decodes a raw response body into UTF-8 text.
///
/// The declared encoding is sniffed from the first `<meta charset=…>` tag
/// (default UTF-8). Anything else is transcoded with `encoding_rs`; unknown
/// labels and undecodable bytes degrade to lossy UTF-8.
pub fn decode_body(body: &[u8]) -> String {
    let probe = String::from_utf8_lossy(body);
    let declared = CHARSET_RE
        .captures(&probe)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_else(|| "UTF-8".to_string());

    if declared != "UTF-8" && declared != "UTF8" {
        if let Some(encoding) = encoding_rs::Encoding::for_label(declared.as_bytes()) {
            let (decoded, _, _) = encoding.decode(body);
            return decoded.into_owned();
        }
    }
    probe.into_owned()
}

/// Extracts the first `<title>` contents, tag-stripped and trimmed.
/// Returns an empty string when the document has none.
pub fn extract_title(html: &str) -> String {
    match TITLE_RE.captures(html).and_then(|caps| caps.get(1)) {
        Some(inner) => extract_text(inner.as_str()),
        None => String::new(),
    }
}

/// Reduces a document to plain text: every tag becomes a space, whitespace
/// runs collapse to single spaces, and the ends are trimmed.
pub fn extract_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collects every `<a href>` target, resolved against `base_url`.
///
/// Empty hrefs, `javascript:` and `mailto:` pseudo-schemes, and in-page
/// fragments are skipped, as are hrefs the base cannot resolve.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = match anchor.value().attr("href") {
            Some(href) => href.trim(),
            None => continue,
        };
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with('#')
        {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            links.push(resolved.to_string());
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_found_case_insensitively_and_tag_stripped() {
        let html = "<html><head><TITLE lang=\"en\">My <b>bold</b>  page</TITLE></head></html>";
        assert_eq!(extract_title(html), "My bold page");
    }

    #[test]
    fn missing_title_yields_empty_string() {
        assert_eq!(extract_title("<html><body>no title here</body></html>"), "");
    }

    #[test]
    fn text_extraction_strips_tags_and_collapses_whitespace() {
        let html = "<p>one</p>\n\n  <div>two <span>three</span></div>  ";
        assert_eq!(extract_text(html), "one two three");
    }

    #[test]
    fn links_resolve_against_the_base_url() {
        let html = concat!(
            "<a href=\"c\">rel</a>",
            "<a href=\"/d\">abs path</a>",
            "<a href=\"http://x/e\">abs</a>",
            "<a href=\"#top\">frag</a>",
            "<a href=\"mailto:x@y\">mail</a>",
            "<a href=\"javascript:void(0)\">js</a>",
            "<a href=\"\">empty</a>",
        );
        let links = extract_links(html, "http://example.com/a/b");
        assert_eq!(
            links,
            vec![
                "http://example.com/a/c".to_string(),
                "http://example.com/d".to_string(),
                "http://x/e".to_string(),
            ]
        );
    }

    #[test]
    fn links_from_unparsable_base_are_dropped() {
        assert!(extract_links("<a href=\"x\">x</a>", "not a url").is_empty());
    }

    #[test]
    fn utf8_bodies_pass_through() {
        let html = "<html><meta charset=\"utf-8\"><body>héllo</body></html>";
        assert_eq!(decode_body(html.as_bytes()), html);
    }

    #[test]
    fn declared_legacy_charsets_are_transcoded() {
        let mut body = b"<html><meta charset=\"ISO-8859-1\"><body>caf".to_vec();
        body.push(0xE9); // 'é' in Latin-1
        body.extend_from_slice(b"</body></html>");
        let decoded = decode_body(&body);
        assert!(decoded.contains("café"));
    }

    #[test]
    fn unknown_charset_labels_fall_back_to_lossy_utf8() {
        let html = "<meta charset=\"no-such-encoding\"><body>plain</body>";
        assert_eq!(decode_body(html.as_bytes()), html);
    }
}
