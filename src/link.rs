//! Link splitting and classification.

use percent_encoding::percent_decode_str;
use url::Url;

/// How a raw `href` must be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `http:` or `https:` and parseable as an absolute URL.
    External,
    /// Starts with `.` or `/`: a file inside the docs tree.
    Local,
    /// Starts with `#`: an anchor in the referencing document itself.
    SameDocumentAnchor,
    /// Anything else. Reported, never fatal.
    Unknown,
}

/// A link split into its root and optional anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    /// Percent-decoded fragment. `Some("")` for a trailing bare `#`.
    pub anchor: Option<String>,
    /// The link with its fragment removed, exactly as written.
    pub root: String,
}

impl ParsedLink {
    /// Whether the link ends in a `#` with nothing after it.
    pub fn has_empty_anchor(&self) -> bool {
        return self.anchor.as_deref() == Some("");
    }
}

/// Categorize a raw link. Callers drop [`is_ignorable`] links first.
pub fn classify(href: &str) -> LinkKind {
    if href.starts_with('#') {
        return LinkKind::SameDocumentAnchor;
    }
    if is_http(href) {
        return if Url::parse(href).is_ok() { LinkKind::External } else { LinkKind::Unknown };
    }
    if href.starts_with('.') || href.starts_with('/') {
        return LinkKind::Local;
    }
    return LinkKind::Unknown;
}

/// Percent-decode an anchor, keeping the raw text when it isn't valid UTF-8.
pub fn decode_anchor(raw: &str) -> String {
    return percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_err| return raw.to_string(), |s| return s.into_owned());
}

/// Schemes that are never checked.
pub fn is_ignorable(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    return lower.is_empty()
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || lower.starts_with("data:");
}

/// Case-insensitive `http:`/`https:` prefix check.
fn is_http(href: &str) -> bool {
    let lower = href.get(..8).unwrap_or(href).to_ascii_lowercase();
    return lower.starts_with("http:") || lower.starts_with("https:");
}

/// Split a link into root and anchor.
///
/// Absolute URLs split at the first `#`: in URL syntax the query precedes the
/// fragment and a literal `#` can only start the fragment. Local links split
/// at the last `#`, so a `#` inside a path segment stays part of the path.
pub fn parse_link(href: &str) -> ParsedLink {
    let split = if is_http(href) { href.split_once('#') } else { href.rsplit_once('#') };
    return match split {
        None => ParsedLink { anchor: None, root: href.to_string() },
        Some((root, raw_anchor)) => ParsedLink {
            anchor: Some(decode_anchor(raw_anchor)),
            root: root.to_string(),
        },
    };
}

/// Canonical form of an external root: parsed, fragment dropped, re-serialized.
/// Two spellings of the same resource share one fetch.
pub fn canonical_root(href: &str) -> Option<String> {
    let mut url = Url::parse(href).ok()?;
    url.set_fragment(None);
    return Some(url.to_string());
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn classifies_each_kind() {
        assert_eq!(classify("https://example.com/a"), LinkKind::External);
        assert_eq!(classify("HTTP://example.com"), LinkKind::External);
        assert_eq!(classify("./guide.md"), LinkKind::Local);
        assert_eq!(classify("../up.md#x"), LinkKind::Local);
        assert_eq!(classify("/root/page"), LinkKind::Local);
        assert_eq!(classify("#section"), LinkKind::SameDocumentAnchor);
        assert_eq!(classify("guide.md"), LinkKind::Unknown);
        assert_eq!(classify("ftp://example.com"), LinkKind::Unknown);
        assert_eq!(classify("https://"), LinkKind::Unknown);
    }

    #[test]
    fn mail_and_phone_links_are_ignorable() {
        assert!(is_ignorable("mailto:someone@example.com"));
        assert!(is_ignorable("tel:+123"));
        assert!(!is_ignorable("https://example.com"));
    }

    #[test]
    fn local_links_split_on_last_hash() {
        let parsed = parse_link("./a%23b#c/d.md#sec%20one");
        assert_eq!(parsed.root, "./a%23b#c/d.md");
        assert_eq!(parsed.anchor.as_deref(), Some("sec one"));
    }

    #[test]
    fn urls_split_on_first_hash_after_query() {
        let parsed = parse_link("https://example.com/p?q=1#frag#more");
        assert_eq!(parsed.root, "https://example.com/p?q=1");
        assert_eq!(parsed.anchor.as_deref(), Some("frag#more"));
    }

    #[test]
    fn trailing_hash_is_an_empty_anchor() {
        assert!(parse_link("./page.md#").has_empty_anchor());
        assert!(!parse_link("./page.md").has_empty_anchor());
    }

    #[test]
    fn canonical_root_drops_fragment() {
        assert_eq!(
            canonical_root("https://Example.com/a#x").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(canonical_root("https://example.com").as_deref(), Some("https://example.com/"));
    }

    proptest! {
        #[test]
        fn prop_local_split_reconstructs(path in "\\./[a-z0-9/#]{0,12}", anchor in "[a-z0-9-]{1,8}") {
            let href = format!("{path}#{anchor}");
            let parsed = parse_link(&href);
            let rebuilt = format!("{}#{}", parsed.root, parsed.anchor.unwrap_or_default());
            prop_assert_eq!(rebuilt, href);
        }

        #[test]
        fn prop_url_split_reconstructs(path in "[a-z0-9/]{0,12}", query in "[a-z0-9=&]{0,8}", anchor in "[a-z0-9#-]{0,8}") {
            let href = format!("https://example.com/{path}?{query}#{anchor}");
            let parsed = parse_link(&href);
            let rebuilt = format!("{}#{}", parsed.root, parsed.anchor.unwrap_or_default());
            prop_assert_eq!(rebuilt, href);
        }
    }
}
