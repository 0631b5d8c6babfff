//! Markdown documents to links and anchors.

use std::collections::{BTreeSet, HashMap, HashSet};

use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};

use crate::dom;
use crate::link;

/// What a document exposes to the link checker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Ids defined by the rendered document.
    pub anchors: BTreeSet<String>,
    /// Link targets in first-seen order, without duplicates.
    pub links: Vec<String>,
}

/// GitHub-style heading slugs, with `-N` suffixes for repeats.
#[derive(Default)]
struct Slugger {
    /// How many times each base slug has been handed out.
    seen: HashMap<String, usize>,
}

impl Slugger {
    /// Reserve an explicit `{#id}` so generated slugs step around it.
    fn reserve(&mut self, id: &str) {
        self.seen.entry(id.to_string()).or_insert(1);
    }

    /// Slug for a heading's text, unique within this document.
    fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut candidate = base.clone();
        loop {
            let count = self.seen.entry(candidate.clone()).or_insert(0);
            if *count == 0 {
                *count = 1;
                return candidate;
            }
            let n = *count;
            *count = count.saturating_add(1);
            candidate = format!("{base}-{n}");
        }
    }
}

/// Markdown options matching the published site: raw HTML passes through,
/// bare URLs are not linkified.
fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    return options;
}

/// Parse a Markdown document into its anchors and links.
///
/// The document is rendered to HTML first and anchors are read from the
/// rendered output, so headings and raw HTML ids are treated alike.
/// Fragment-only `href`s do not define anchors here.
pub fn parse_document(text: &str) -> ParsedDocument {
    let mut events: Vec<Event<'_>> = Parser::new_ext(text, options()).collect();
    assign_heading_ids(&mut events);

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |href: String| {
        let href = href.trim().to_string();
        if !link::is_ignorable(&href) && seen.insert(href.clone()) {
            links.push(href);
        }
    };

    for event in &events {
        match event {
            Event::Start(Tag::Link { link_type, dest_url, .. }) => {
                if *link_type != LinkType::Email {
                    push(dest_url.to_string());
                }
            },
            Event::Html(html) | Event::InlineHtml(html) => {
                for href in dom::extract_links(html) {
                    push(href);
                }
            },
            _ => {},
        }
    }

    let mut html = String::with_capacity(text.len());
    pulldown_cmark::html::push_html(&mut html, events.into_iter());

    return ParsedDocument { anchors: dom::extract_anchors(&html, false), links };
}

/// Give every heading an id: its explicit `{#id}` or a slug of its text.
fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut slugger = Slugger::default();
    for event in events.iter() {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            slugger.reserve(id);
        }
    }

    let mut index = 0;
    while index < events.len() {
        let needs_id = matches!(events.get(index), Some(Event::Start(Tag::Heading { id: None, .. })));
        if needs_id {
            let text = heading_text(events.get(index.saturating_add(1)..).unwrap_or_default());
            let slug = slugger.slug(&text);
            if let Some(Event::Start(Tag::Heading { id, .. })) = events.get_mut(index) {
                *id = Some(CowStr::from(slug));
            }
        }
        index = index.saturating_add(1);
    }
}

/// Concatenated text of a heading, up to its end tag.
fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            _ => {},
        }
    }
    return text;
}

/// Lowercase, keep alphanumerics, `-` and `_`, turn spaces into `-`, drop the rest.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            slug.extend(ch.to_lowercase());
        } else if ch == ' ' {
            slug.push('-');
        }
    }
    return slug;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_get_slug_ids() {
        let doc = parse_document("# Getting Started\n\n## API: `fetch()` & more\n");
        assert!(doc.anchors.contains("getting-started"));
        assert!(doc.anchors.contains("api-fetch--more"));
    }

    #[test]
    fn repeated_headings_are_suffixed() {
        let doc = parse_document("## Usage\n\n## Usage\n\n## Usage\n");
        for id in ["usage", "usage-1", "usage-2"] {
            assert!(doc.anchors.contains(id), "missing {id}");
        }
    }

    #[test]
    fn explicit_heading_ids_win() {
        let doc = parse_document("## Install {#setup}\n");
        assert!(doc.anchors.contains("setup"));
        assert!(!doc.anchors.contains("install"));
    }

    #[test]
    fn raw_html_contributes_anchors_and_links() {
        let doc = parse_document("<div id=\"custom\"></div>\n\nText <a href=\"./other.md\">x</a> and <a name=\"old\"></a>\n");
        assert!(doc.anchors.contains("custom"));
        assert!(doc.anchors.contains("old"));
        assert_eq!(doc.links, vec!["./other.md".to_string()]);
    }

    #[test]
    fn links_are_deduplicated_in_first_seen_order() {
        let doc = parse_document(
            "[b](./b.md) [a](https://a.example/) [b again](./b.md) ![img](./pic.png) <mailto:x@y.z> <x@y.z> [t](tel:+1)",
        );
        assert_eq!(doc.links, vec!["./b.md".to_string(), "https://a.example/".to_string()]);
    }

    #[test]
    fn same_page_hrefs_do_not_define_anchors() {
        let doc = parse_document("[jump](#nowhere)\n");
        assert!(doc.anchors.is_empty());
        assert_eq!(doc.links, vec!["#nowhere".to_string()]);
    }

    #[test]
    fn bare_urls_are_not_linkified() {
        let doc = parse_document("see https://example.com for more\n");
        assert!(doc.links.is_empty());
    }
}
