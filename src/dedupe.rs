//! Collapse per-document issues into records and find where each one is written.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Error;
use crate::issues::{Issue, IssueCode};

/// One occurrence line of a search string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based character columns where the string starts.
    pub columns: Vec<usize>,
    /// 1-based line number.
    pub line: usize,
}

/// A file an issue occurs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Document path relative to the root, or a module URL.
    pub filepath: String,
    /// Every line and column the search string appears at.
    pub locations: Vec<Location>,
}

/// One distinct issue and every file that has it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// The issue itself.
    pub details: Issue,
    /// Contributing files, sorted.
    pub stack: Vec<StackEntry>,
}

/// Records grouped by kind.
pub type IssueGroups = BTreeMap<IssueCode, Vec<IssueRecord>>;

/// A record that claims a file whose text doesn't contain its search string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateFailure {
    /// Kind of the record.
    pub code: IssueCode,
    /// The file in its stack.
    pub filepath: String,
    /// The string that wasn't found.
    pub search: String,
}

/// Where document text comes from: files under the root, or text already in
/// memory for documents that don't live on disk.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    /// Text of documents that were fetched, keyed by their URL.
    pub in_memory: HashMap<String, String>,
    /// Docs root.
    pub root: PathBuf,
}

impl Sources {
    /// Sources read from `root`.
    pub fn new(root: PathBuf) -> Self {
        return Self { in_memory: HashMap::new(), root };
    }

    /// Whether `filepath` is an in-memory document.
    pub fn is_in_memory(&self, filepath: &str) -> bool {
        return self.in_memory.contains_key(filepath);
    }

    /// Current text of a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` when an on-disk document cannot be read.
    pub fn text(&self, filepath: &str) -> Result<String, Error> {
        if let Some(text) = self.in_memory.get(filepath) {
            return Ok(text.clone());
        }
        let path = self.root.join(filepath);
        return std::fs::read_to_string(&path).map_err(|e| return Error::read(path, e));
    }
}

/// Group structurally equal issues. Each record's stack lists every distinct
/// document that produced it.
pub fn deduplicate(issues: &BTreeMap<String, Vec<Issue>>) -> IssueGroups {
    let mut by_issue: BTreeMap<&Issue, BTreeSet<&str>> = BTreeMap::new();
    for (doc, doc_issues) in issues {
        for issue in doc_issues {
            by_issue.entry(issue).or_default().insert(doc);
        }
    }

    let mut groups = IssueGroups::new();
    for (issue, docs) in by_issue {
        let stack = docs
            .into_iter()
            .map(|doc| return StackEntry { filepath: doc.to_string(), locations: Vec::new() })
            .collect();
        groups.entry(issue.code()).or_default().push(IssueRecord { details: issue.clone(), stack });
    }
    return groups;
}

/// Fill in `locations` for every stack entry.
///
/// A search string missing from a file in its own stack means the issue and
/// its evidence disagree; it is logged as a bug and returned.
///
/// # Errors
///
/// Returns `Error::FileRead` when a document in a stack cannot be read.
pub fn locate_all(groups: &mut IssueGroups, sources: &Sources) -> Result<Vec<LocateFailure>, Error> {
    let mut texts: HashMap<String, String> = HashMap::new();
    let mut failures = Vec::new();
    for (code, records) in groups.iter_mut() {
        for record in records {
            let search = record.details.search_string().to_string();
            for entry in &mut record.stack {
                if !texts.contains_key(&entry.filepath) {
                    texts.insert(entry.filepath.clone(), sources.text(&entry.filepath)?);
                }
                let text = texts.get(&entry.filepath).map_or("", String::as_str);
                entry.locations = locate(text, &search);
                if entry.locations.is_empty() {
                    error!(code = %code, file = %entry.filepath, search = %search, "BUG: issue text not found in its own source file");
                    failures.push(LocateFailure { code: *code, filepath: entry.filepath.clone(), search: search.clone() });
                }
            }
        }
    }
    return Ok(failures);
}

/// Every line and column where `search` occurs verbatim.
pub fn locate(text: &str, search: &str) -> Vec<Location> {
    if search.is_empty() {
        return Vec::new();
    }
    let mut locations = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let columns: Vec<usize> = line
            .match_indices(search)
            .map(|(offset, _)| return line.get(..offset).map_or(0, |prefix| return prefix.chars().count()).saturating_add(1))
            .collect();
        if !columns.is_empty() {
            locations.push(Location { columns, line: index.saturating_add(1) });
        }
    }
    return locations;
}
