//! Best-effort rewriting of fixable issues, repeated until nothing changes.
//!
//! Fixes are literal find-and-replace over whole files. They are heuristic and
//! need a human to review the diff.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dedupe::{IssueGroups, IssueRecord, Sources};
use crate::error::Error;
use crate::issues::{Issue, IssueCode, IssueKind};
use crate::link;

/// Order fixable kinds are visited in within a round. Redirects go first so
/// the rewritten roots carry into anchor fixes on the same links.
const FIX_ORDER: [IssueCode; 5] = [
    IssueCode::Redirected,
    IssueCode::WrongExtension,
    IssueCode::DisallowExtension,
    IssueCode::EmptyAnchor,
    IssueCode::MissingAnchor,
];

/// What a fix run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixSummary {
    /// File rewrites performed.
    pub applied: usize,
    /// Rounds run, the final no-op round included.
    pub rounds: usize,
}

/// Applies rewrites to documents on disk.
pub struct Fixer<'s> {
    /// Generated subtree that is never rewritten.
    reference_dir: PathBuf,
    /// Minimum similarity for an anchor suggestion.
    similarity_threshold: f64,
    /// Document text access.
    sources: &'s Sources,
}

/// Closest anchor to `anchor` scoring above `threshold`. Ties go to the
/// lexicographically first candidate.
pub fn best_anchor_match<'c>(anchor: &str, candidates: &'c BTreeSet<String>, threshold: f64) -> Option<&'c str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::normalized_levenshtein(anchor, candidate);
        if score <= threshold {
            continue;
        }
        if best.is_none_or(|(_, top)| return score > top) {
            best = Some((candidate.as_str(), score));
        }
    }
    return best.map(|(candidate, _)| return candidate);
}

/// Replace a trailing `.{from}` extension on the link root, keeping any anchor.
fn swap_extension(reference: &str, from: &str, to: Option<&str>) -> Option<String> {
    let parsed = link::parse_link(reference);
    let stem = parsed.root.strip_suffix(&format!(".{from}"))?;
    let mut fixed = match to {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    };
    if let Some(anchor) = reference.get(parsed.root.len()..)
        && !anchor.is_empty()
    {
        fixed.push_str(anchor);
    }
    return Some(fixed);
}

/// The literal `(old, new)` rewrite for an issue, if it has one.
pub fn rewrite_pair(issue: &Issue, threshold: f64) -> Option<(String, String)> {
    let reference = &issue.reference;
    let new = match &issue.kind {
        IssueKind::Redirected { from, to } => return Some((from.clone(), to.clone())),
        IssueKind::MissingAnchor { anchor, all_anchors } => {
            let best = best_anchor_match(anchor, all_anchors, threshold)?;
            format!("{}#{best}", link::parse_link(reference).root)
        },
        IssueKind::EmptyAnchor => {
            let stripped = reference.strip_suffix('#')?;
            if stripped.is_empty() {
                return None;
            }
            stripped.to_string()
        },
        IssueKind::WrongExtension { actual, expected } => swap_extension(reference, actual, Some(expected.as_str()))?,
        IssueKind::DisallowExtension { extension } => swap_extension(reference, extension, None)?,
        IssueKind::EmptyDom
        | IssueKind::Inaccessible { .. }
        | IssueKind::LinkedFileNotFound { .. }
        | IssueKind::LocalAltAvailable { .. }
        | IssueKind::MissingGithubComment
        | IssueKind::NoResponse
        | IssueKind::NotOkResponse { .. }
        | IssueKind::UnknownLinkFormat => return None,
    };
    if new == *reference {
        return None;
    }
    return Some((reference.clone(), new));
}

impl<'s> Fixer<'s> {
    /// Fixer writing under `sources.root`, never touching `reference_dir`.
    pub fn new(sources: &'s Sources, reference_dir: &Path, similarity_threshold: f64) -> Self {
        return Self { reference_dir: reference_dir.to_path_buf(), similarity_threshold, sources };
    }

    /// Run rounds until one makes no rewrite. Fixed records leave `groups`.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` or `Error::Io` when a document cannot be read
    /// or written back.
    pub fn fix(&self, groups: &mut IssueGroups) -> Result<FixSummary, Error> {
        let mut summary = FixSummary::default();
        loop {
            let applied = self.round(groups)?;
            summary.rounds = summary.rounds.saturating_add(1);
            summary.applied = summary.applied.saturating_add(applied);
            if applied == 0 {
                return Ok(summary);
            }
        }
    }

    /// One pass over every fixable record. Works on a slot snapshot that is
    /// swapped back into `groups` at the end.
    fn round(&self, groups: &mut IssueGroups) -> Result<usize, Error> {
        let mut slots: Vec<(IssueCode, Vec<Option<IssueRecord>>)> = std::mem::take(groups)
            .into_iter()
            .map(|(code, records)| return (code, records.into_iter().map(Some).collect()))
            .collect();

        let mut applied = 0_usize;
        let mut rewritten: HashSet<String> = HashSet::new();
        let mut result = Ok(());
        'groups: for code in FIX_ORDER {
            let Some(group_index) = slots.iter().position(|(c, _)| return *c == code) else {
                continue;
            };
            let record_count = slots.get(group_index).map_or(0, |(_, records)| return records.len());
            for record_index in 0..record_count {
                let Some(mut record) = slots
                    .get_mut(group_index)
                    .and_then(|(_, records)| return records.get_mut(record_index))
                    .and_then(Option::take)
                else {
                    continue;
                };

                let Some((old, new)) = rewrite_pair(&record.details, self.similarity_threshold) else {
                    debug!(reference = %record.details.reference, code = %record.details.code(), "no rewrite available");
                    put_back(&mut slots, group_index, record_index, record);
                    continue;
                };

                match self.apply(&mut record, &old, &new, &mut rewritten) {
                    Ok(count) => applied = applied.saturating_add(count),
                    Err(e) => {
                        put_back(&mut slots, group_index, record_index, record);
                        result = Err(e);
                        break 'groups;
                    },
                }
                propagate(&mut slots, &old, &new, &rewritten);
                if !record.stack.is_empty() {
                    put_back(&mut slots, group_index, record_index, record);
                }
            }
        }

        *groups = slots
            .into_iter()
            .map(|(code, records)| return (code, records.into_iter().flatten().collect::<Vec<_>>()))
            .filter(|(_, records)| return !records.is_empty())
            .collect();
        result?;
        return Ok(applied);
    }

    /// Rewrite `old` → `new` in every writable file of the record's stack,
    /// dropping the files that were rewritten.
    fn apply(&self, record: &mut IssueRecord, old: &str, new: &str, rewritten: &mut HashSet<String>) -> Result<usize, Error> {
        let mut applied = 0_usize;
        let mut kept = Vec::with_capacity(record.stack.len());
        for entry in std::mem::take(&mut record.stack) {
            if self.is_protected(&entry.filepath) {
                debug!(file = %entry.filepath, "protected document left as is");
                kept.push(entry);
                continue;
            }
            let text = self.sources.text(&entry.filepath)?;
            if !text.contains(old) {
                kept.push(entry);
                continue;
            }
            let path = self.sources.root.join(&entry.filepath);
            std::fs::write(&path, text.replace(old, new))?;
            info!(file = %entry.filepath, old, new, "fixed");
            rewritten.insert(entry.filepath);
            applied = applied.saturating_add(1);
        }
        record.stack = kept;
        return Ok(applied);
    }

    /// Generated or remote documents are never written.
    fn is_protected(&self, filepath: &str) -> bool {
        return self.sources.is_in_memory(filepath)
            || link::classify(filepath) == link::LinkKind::External
            || Path::new(filepath).starts_with(&self.reference_dir);
    }
}

/// Return a record to its slot.
fn put_back(slots: &mut [(IssueCode, Vec<Option<IssueRecord>>)], group: usize, index: usize, record: IssueRecord) {
    if let Some(slot) = slots.get_mut(group).and_then(|(_, records)| return records.get_mut(index)) {
        *slot = Some(record);
    }
}

/// Carry a rewrite into other fixable records whose every file has already been
/// rewritten this round.
fn propagate(slots: &mut [(IssueCode, Vec<Option<IssueRecord>>)], old: &str, new: &str, rewritten: &HashSet<String>) {
    for (code, records) in slots.iter_mut() {
        if !code.is_fixable() {
            continue;
        }
        for record in records.iter_mut().flatten() {
            let all_rewritten = record.stack.iter().all(|entry| return rewritten.contains(&entry.filepath));
            if all_rewritten {
                record.details.replace_text(old, new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dedupe::{StackEntry, deduplicate};

    fn anchors(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    fn groups_for(entries: &[(&str, Issue)]) -> IssueGroups {
        let mut issues: BTreeMap<String, Vec<Issue>> = BTreeMap::new();
        for (doc, issue) in entries {
            issues.entry((*doc).to_string()).or_default().push(issue.clone());
        }
        deduplicate(&issues)
    }

    #[test]
    fn rewrite_pairs_per_kind() {
        let redirect = Issue::new("http://a/x#y", IssueKind::Redirected { from: "http://a/x".into(), to: "http://b/y".into() });
        assert_eq!(rewrite_pair(&redirect, 0.6), Some(("http://a/x".into(), "http://b/y".into())));

        let empty = Issue::new("./a.md#", IssueKind::EmptyAnchor);
        assert_eq!(rewrite_pair(&empty, 0.6), Some(("./a.md#".into(), "./a.md".into())));
        assert_eq!(rewrite_pair(&Issue::new("#", IssueKind::EmptyAnchor), 0.6), None);

        let wrong = Issue::new("./a.html#x", IssueKind::WrongExtension { actual: "html".into(), expected: "md".into() });
        assert_eq!(rewrite_pair(&wrong, 0.6), Some(("./a.html#x".into(), "./a.md#x".into())));

        let disallowed = Issue::new("./a.md", IssueKind::DisallowExtension { extension: "md".into() });
        assert_eq!(rewrite_pair(&disallowed, 0.6), Some(("./a.md".into(), "./a".into())));

        let missing = Issue::new(
            "./b.md#instalation",
            IssueKind::MissingAnchor { all_anchors: anchors(&["installation", "usage"]), anchor: "instalation".into() },
        );
        assert_eq!(rewrite_pair(&missing, 0.6), Some(("./b.md#instalation".into(), "./b.md#installation".into())));

        let hopeless = Issue::new(
            "./b.md#zzz",
            IssueKind::MissingAnchor { all_anchors: anchors(&["installation"]), anchor: "zzz".into() },
        );
        assert_eq!(rewrite_pair(&hopeless, 0.6), None);
        assert_eq!(rewrite_pair(&Issue::new("./gone.md", IssueKind::NoResponse), 0.6), None);
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let set = anchors(&["abd", "abe"]);
        assert_eq!(best_anchor_match("abc", &set, 0.5), Some("abd"));
    }

    #[test]
    fn fixes_files_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "[x](./b.md#instal) [y](./c.html)\n").unwrap();
        std::fs::write(dir.path().join("z.md"), "see [x](./b.md#instal)\n").unwrap();
        let mut groups = groups_for(&[
            ("a.md", Issue::new("./b.md#instal", IssueKind::MissingAnchor {
                all_anchors: anchors(&["install"]),
                anchor: "instal".into(),
            })),
            ("z.md", Issue::new("./b.md#instal", IssueKind::MissingAnchor {
                all_anchors: anchors(&["install"]),
                anchor: "instal".into(),
            })),
            ("a.md", Issue::new("./c.html", IssueKind::WrongExtension { actual: "html".into(), expected: "md".into() })),
        ]);

        let sources = Sources::new(dir.path().to_path_buf());
        let fixer = Fixer::new(&sources, Path::new("reference"), 0.6);
        let first = fixer.fix(&mut groups).unwrap();
        assert_eq!(first.applied, 3);
        assert!(groups.is_empty());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "[x](./b.md#install) [y](./c.md)\n");

        let second = fixer.fix(&mut groups).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.rounds, 1);
    }

    #[test]
    fn reference_documents_are_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("reference")).unwrap();
        std::fs::write(dir.path().join("reference/api.md"), "[x](./a.md#)\n").unwrap();
        let mut groups = groups_for(&[("reference/api.md", Issue::new("./a.md#", IssueKind::EmptyAnchor))]);

        let sources = Sources::new(dir.path().to_path_buf());
        let summary = Fixer::new(&sources, Path::new("reference"), 0.6).fix(&mut groups).unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(groups[&IssueCode::EmptyAnchor][0].stack.len(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("reference/api.md")).unwrap(), "[x](./a.md#)\n");
    }

    #[test]
    fn rewrites_reach_only_records_whose_files_were_all_rewritten() {
        let record = |reference: &str, kind: IssueKind, files: &[&str]| IssueRecord {
            details: Issue::new(reference, kind),
            stack: files.iter().map(|f| StackEntry { filepath: (*f).to_string(), locations: Vec::new() }).collect(),
        };
        let missing = || IssueKind::MissingAnchor { all_anchors: anchors(&["intro"]), anchor: "intr".into() };
        let mut slots = vec![
            (IssueCode::MissingAnchor, vec![
                Some(record("http://old.example/p#intr", missing(), &["a.md"])),
                Some(record("http://old.example/p#intr", missing(), &["a.md", "b.md"])),
            ]),
            (IssueCode::NoResponse, vec![Some(record("http://old.example/p", IssueKind::NoResponse, &["a.md"]))]),
        ];
        let rewritten: HashSet<String> = ["a.md".to_string()].into_iter().collect();

        propagate(&mut slots, "http://old.example/p", "https://new.example/p", &rewritten);

        let references: Vec<&str> =
            slots.iter().flat_map(|(_, records)| records.iter().flatten().map(|r| r.details.reference.as_str())).collect();
        assert_eq!(references, vec!["https://new.example/p#intr", "http://old.example/p#intr", "http://old.example/p"]);
    }

    #[test]
    fn redirect_fix_carries_into_dependent_missing_anchor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "[x](http://old.example/p#intro)\n").unwrap();
        let mut groups = groups_for(&[
            ("a.md", Issue::new("http://old.example/p#intro", IssueKind::Redirected {
                from: "http://old.example/p".into(),
                to: "https://new.example/p".into(),
            })),
            ("a.md", Issue::new("http://old.example/p#intro", IssueKind::MissingAnchor {
                all_anchors: anchors(&["intros"]),
                anchor: "intro".into(),
            })),
        ]);

        let sources = Sources::new(dir.path().to_path_buf());
        let summary = Fixer::new(&sources, Path::new("reference"), 0.5).fix(&mut groups).unwrap();
        assert_eq!(summary.applied, 2);
        assert!(groups.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "[x](https://new.example/p#intros)\n"
        );
    }
}
