use std::fmt::Write as _;

use crate::dedupe::{IssueGroups, IssueRecord, LocateFailure};
use crate::error::Error;
use crate::fixer::best_anchor_match;
use crate::issues::IssueKind;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Print markdown-ish text, bolding `#` headings.
fn print_bolded(md: &str, to_stderr: bool) {
    for line in md.lines() {
        let line = if line.starts_with('#') { format!("{BOLD}{line}{RESET}") } else { line.to_string() };
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_bolded(&render_error(e), true);
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::CacheCorrupt { reason } => format!(
            "\
# Error: Issue Cache Corrupt

{reason}

## Fix

Delete `.doclinks-cache.json` and run again with `--debug` to rebuild it.
"
        ),
        Error::FileRead { path, source } => format!(
            "\
# Error: Cannot Read File

`{}`: {source}
",
            path.display()
        ),
        Error::InvalidEntryPoint { entry, reason } => format!(
            "\
# Error: Invalid Module Entry Point

`{entry}`: {reason}

## Fix

Pass a local `.ts`/`.js` file or an http(s) URL:

    doclinks module ./mod.ts
"
        ),
        Error::ModuleFetchFailed { reason, url } => format!(
            "\
# Error: Module Fetch Failed

Could not download `{url}`: {reason}
"
        ),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{}`: {reason}
",
            file.display()
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid Config

`.doclinks.toml` is malformed:

{e}
"
        ),
        Error::UnsupportedLanguage { ext } => format!(
            "\
# Error: Unsupported Language

No grammar for `.{ext}` modules.

## Supported extensions

ts, tsx, mts, cts, js, jsx, mjs, cjs
"
        ),
        Error::Io(_) | Error::Json(_) => format!(
            "\
# Error

{e}
"
        ),
    };
}

/// Report layout knobs.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Leave warning groups out.
    pub hide_warnings: bool,
    /// Threshold for "did you mean" suggestions.
    pub similarity_threshold: f64,
}

/// Whether any non-warning record remains.
pub fn has_errors(groups: &IssueGroups) -> bool {
    return groups.iter().any(|(code, records)| return !code.is_warning() && !records.is_empty());
}

/// Print the grouped report to stdout.
pub fn print_report(groups: &IssueGroups, failures: &[LocateFailure], options: ReportOptions) {
    print_bolded(&render_report(groups, failures, options), false);
}

/// Render every group: title with count, description, then per record its
/// message and `path:line:column` locations.
pub fn render_report(groups: &IssueGroups, failures: &[LocateFailure], options: ReportOptions) -> String {
    let mut out = String::new();
    for (code, records) in groups {
        if records.is_empty() || (options.hide_warnings && code.is_warning()) {
            continue;
        }
        let _ = writeln!(out, "# {} ({})", code.title(), records.len());
        let _ = writeln!(out, "{}\n", code.description());
        for record in records {
            render_record(&mut out, record, options.similarity_threshold);
        }
    }

    if !failures.is_empty() {
        out.push_str("# BUG: issues without evidence in their own files\n\n");
        for failure in failures {
            let _ = writeln!(out, "- [{}] `{}` not found in {}", failure.code, failure.search, failure.filepath);
        }
        out.push('\n');
    }

    if out.is_empty() {
        out.push_str("No issues found.\n");
    }
    return out;
}

/// One record: message, suggestion, locations.
fn render_record(out: &mut String, record: &IssueRecord, threshold: f64) {
    let _ = writeln!(out, "- {}", record.details.message());
    if let IssueKind::MissingAnchor { anchor, all_anchors } = &record.details.kind
        && let Some(suggestion) = best_anchor_match(anchor, all_anchors, threshold)
    {
        let _ = writeln!(out, "  did you mean #{suggestion}?");
    }
    for entry in &record.stack {
        if entry.locations.is_empty() {
            let _ = writeln!(out, "    {}", entry.filepath);
        }
        for location in &entry.locations {
            for column in &location.columns {
                let _ = writeln!(out, "    {}:{}:{column}", entry.filepath, location.line);
            }
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::dedupe::{Location, StackEntry};
    use crate::issues::{Issue, IssueCode};

    const OPTIONS: ReportOptions = ReportOptions { hide_warnings: false, similarity_threshold: 0.6 };

    fn record(issue: Issue, file: &str) -> IssueRecord {
        IssueRecord {
            details: issue,
            stack: vec![StackEntry { filepath: file.into(), locations: vec![Location { columns: vec![3, 9], line: 4 }] }],
        }
    }

    #[test]
    fn report_lists_locations_and_suggestions() {
        let mut groups = IssueGroups::new();
        let all: BTreeSet<String> = ["installation".to_string()].into_iter().collect();
        groups.insert(IssueCode::MissingAnchor, vec![record(
            Issue::new("./b.md#instalation", IssueKind::MissingAnchor { all_anchors: all, anchor: "instalation".into() }),
            "a.md",
        )]);

        let out = render_report(&groups, &[], OPTIONS);
        assert!(out.contains("# Missing anchor (1)"));
        assert!(out.contains("did you mean #installation?"));
        assert!(out.contains("a.md:4:3"));
        assert!(out.contains("a.md:4:9"));
    }

    #[test]
    fn warnings_can_be_hidden_and_never_count_as_errors() {
        let mut groups = BTreeMap::new();
        groups.insert(IssueCode::Inaccessible, vec![record(
            Issue::new("https://x.example/", IssueKind::Inaccessible { reason: "challenge".into() }),
            "a.md",
        )]);
        assert!(!has_errors(&groups));

        let hidden = render_report(&groups, &[], ReportOptions { hide_warnings: true, ..OPTIONS });
        assert_eq!(hidden, "No issues found.\n");
        assert!(render_report(&groups, &[], OPTIONS).contains("# Inaccessible (1)"));
    }

    #[test]
    fn locate_failures_are_printed_as_bugs() {
        let failure = LocateFailure { code: IssueCode::Redirected, filepath: "a.md".into(), search: "http://x/".into() };
        let out = render_report(&IssueGroups::new(), &[failure], OPTIONS);
        assert!(out.contains("# BUG"));
        assert!(out.contains("`http://x/` not found in a.md"));
    }

    #[test]
    fn cache_errors_explain_the_fix() {
        let out = render_error(&Error::CacheCorrupt { reason: "version 9".into() });
        assert!(out.starts_with("# Error: Issue Cache Corrupt"));
        assert!(out.contains("--debug"));
    }
}
