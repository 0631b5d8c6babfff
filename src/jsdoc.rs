//! Links in the doc comments of a TypeScript/JavaScript module's exports.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::Error;
use crate::markdown;

/// Maximum module source size (16 MiB).
const MAX_FILE_SIZE: usize = 16 * 1024 * 1024;

/// `{@link target}`, `{@link target | text}`, `{@link target text}` and the
/// `linkcode`/`linkplain` variants.
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"\{@link(?:code|plain)?\s+([^\s|}]+)(?:\s*\|\s*|\s+)?([^}]*)\}").expect("valid regex");
});

/// Map a module extension to its tree-sitter language.
///
/// # Errors
///
/// Returns `Error::UnsupportedLanguage` for anything that isn't TypeScript or JavaScript.
pub fn language_for_path(path: &Path) -> Result<Language, Error> {
    let ext = path.extension().and_then(|e| return e.to_str()).unwrap_or("");

    return match ext {
        "cjs" | "cts" | "js" | "mjs" | "mts" | "ts" => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "jsx" | "tsx" => Ok(tree_sitter_typescript::LANGUAGE_TSX.into()),
        _ => Err(Error::UnsupportedLanguage { ext: ext.to_string() }),
    };
}

/// Links found in the doc comments of every top-level export, deduplicated
/// in first-seen order.
///
/// # Errors
///
/// Returns `Error::UnsupportedLanguage` for unknown extensions, or
/// `Error::ParseFailed` if the source is too large or tree-sitter cannot parse it.
pub fn doc_comment_links(file: &Path, source: &str) -> Result<Vec<String>, Error> {
    if source.len() > MAX_FILE_SIZE {
        return Err(Error::ParseFailed {
            file: file.to_path_buf(),
            reason: format!("{} bytes exceeds the {MAX_FILE_SIZE} byte limit", source.len()),
        });
    }
    let language = language_for_path(file)?;
    let tree = parse_source(file, source, &language)?;

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for comment in export_doc_comments(tree.root_node(), source) {
        for href in markdown::parse_document(&to_markdown(comment)).links {
            if seen.insert(href.clone()) {
                links.push(href);
            }
        }
    }
    return Ok(links);
}

/// Parse source into a tree-sitter tree.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or parsing fails.
fn parse_source(file: &Path, source: &str, language: &Language) -> Result<Tree, Error> {
    let mut parser = Parser::new();
    parser.set_language(language).map_err(|e| {
        return Error::ParseFailed { file: file.to_path_buf(), reason: e.to_string() };
    })?;

    return parser.parse(source, None).ok_or_else(|| {
        return Error::ParseFailed { file: file.to_path_buf(), reason: "tree-sitter returned None".to_string() };
    });
}

/// The `/** */` comment directly above each top-level `export`.
fn export_doc_comments<'s>(root: Node<'_>, source: &'s str) -> Vec<&'s str> {
    let mut comments = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() != "export_statement" {
            continue;
        }
        let Some(previous) = child.prev_named_sibling().filter(|n| return n.kind() == "comment") else {
            continue;
        };
        let Some(text) = source.get(previous.byte_range()) else {
            continue;
        };
        if text.starts_with("/**") {
            comments.push(text);
        }
    }
    return comments;
}

/// Strip comment markers and turn inline link tags into Markdown links.
pub fn to_markdown(comment: &str) -> String {
    let body = comment.trim().trim_start_matches("/**").trim_end_matches("*/");
    let cleaned: Vec<&str> = body
        .lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line.strip_prefix('*').unwrap_or(line);
            return line.strip_prefix(' ').unwrap_or(line);
        })
        .collect();
    let text = cleaned.join("\n");

    return INLINE_LINK
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let target = caps.get(1).map_or("", |m| return m.as_str());
            let label = caps.get(2).map(|m| return m.as_str().trim()).filter(|l| return !l.is_empty()).unwrap_or(target);
            if is_linkable(target) {
                return format!("[{label}]({target})");
            }
            return label.to_string();
        })
        .into_owned();
}

/// URLs and relative paths become links; symbol references stay text.
fn is_linkable(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    return lower.starts_with("http://")
        || lower.starts_with("https://")
        || target.starts_with('.')
        || target.starts_with('/')
        || target.starts_with('#');
}
