//! Tag-level HTML scanning for anchor definitions and link targets.
//!
//! This is not an HTML parser. It reads start tags of a fixed allowlist and
//! pulls attribute values out of them, which is all anchor checking needs.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::link::decode_anchor;

/// Start tags of the elements that may define an anchor.
static ANCHOR_TAG: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?is)<(section|h[1-6]|div|a)\b([^>]*)>").expect("valid regex");
});

/// One attribute in double, single or no quotes.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid regex");
});

/// Start tags of anchors carrying an `href`.
static LINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"(?is)<a\b([^>]*)>").expect("valid regex"));

/// Value of attribute `name` in a start tag's attribute text.
fn attribute<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    for cap in ATTRIBUTE.captures_iter(attributes) {
        let Some(key) = cap.get(1) else { continue };
        if !key.as_str().eq_ignore_ascii_case(name) {
            continue;
        }
        let value = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4));
        return Some(value.map_or("", |v| return v.as_str()));
    }
    return None;
}

/// Collect the ids defined in `html`.
///
/// Scans `section`, `h1`..`h6`, `div` and `a` for `id` (and `name` on `a`).
/// With `include_hrefs`, fragment-only `href="#x"` targets count as anchors as
/// well; this is for third-party pages whose ids are assigned by scripts.
/// Same-site documents never set it.
pub fn extract_anchors(html: &str, include_hrefs: bool) -> BTreeSet<String> {
    let mut anchors = BTreeSet::new();
    for cap in ANCHOR_TAG.captures_iter(html) {
        let tag = cap.get(1).map_or("", |m| return m.as_str());
        let attributes = cap.get(2).map_or("", |m| return m.as_str());
        let is_link = tag.eq_ignore_ascii_case("a");

        if let Some(id) = attribute(attributes, "id").filter(|id| return !id.is_empty()) {
            anchors.insert(unescape_entities(id));
        }
        if is_link && let Some(name) = attribute(attributes, "name").filter(|n| return !n.is_empty()) {
            anchors.insert(unescape_entities(name));
        }
        if is_link
            && include_hrefs
            && let Some(fragment) = attribute(attributes, "href").and_then(|h| return h.strip_prefix('#'))
            && !fragment.is_empty()
        {
            anchors.insert(decode_anchor(&unescape_entities(fragment)));
        }
    }
    return anchors;
}

/// Collect `href` values of `<a>` tags in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    return LINK_TAG
        .captures_iter(html)
        .filter_map(|cap| return cap.get(1))
        .filter_map(|attrs| return attribute(attrs.as_str(), "href"))
        .map(unescape_entities)
        .collect();
}

/// Decode the handful of entities that show up inside attribute values.
fn unescape_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    return value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ids_from_allowlisted_tags_only() {
        let html = r#"<h2 id="sec1">One</h2><span id="skip"></span><div class='x' id='box'></div>
<section id=plain></section><a name="legacy"></a>"#;
        let anchors = extract_anchors(html, false);
        let expected: BTreeSet<String> =
            ["box", "legacy", "plain", "sec1"].iter().map(|s| return (*s).to_string()).collect();
        assert_eq!(anchors, expected);
    }

    #[test]
    fn fragment_hrefs_count_only_when_requested() {
        let html = r##"<a href="#from-href">x</a><a href="/elsewhere#nope">y</a>"##;
        assert!(extract_anchors(html, false).is_empty());
        let anchors = extract_anchors(html, true);
        assert!(anchors.contains("from-href"));
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn does_not_confuse_data_id_with_id() {
        let anchors = extract_anchors(r#"<div data-id="nope" id="yes"></div>"#, false);
        assert!(anchors.contains("yes"));
        assert!(!anchors.contains("nope"));
    }

    #[test]
    fn extracts_link_hrefs_with_entities() {
        let links = extract_links(r#"<p><a class="c" href="https://a.example/?x=1&amp;y=2">a</a></p>"#);
        assert_eq!(links, vec!["https://a.example/?x=1&y=2".to_string()]);
    }
}
