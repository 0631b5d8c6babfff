//! CLI commands for doclinks: check, module.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{self, CACHE_FILE};
use crate::config::Config;
use crate::dedupe::{IssueGroups, Sources, deduplicate, locate_all};
use crate::error::Error;
use crate::fetch::{FetchOptions, Fetcher, UreqClient};
use crate::fixer::Fixer;
use crate::github::{GithubComments, IssueCommentSource};
use crate::jsdoc;
use crate::local::display_path;
use crate::report::{self, ReportOptions};
use crate::scanner;
use crate::session::Session;

/// Command-line switches shared by every command. Each one set here wins
/// over `.doclinks.toml`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Accept `.html` on local links.
    pub allow_html: bool,
    /// Clean-URL addressing.
    pub clean_urls: bool,
    /// Read/write the on-disk issue cache.
    pub debug: bool,
    /// Rewrite fixable issues in place.
    pub fix: bool,
    /// Drop warnings from the report.
    pub hide_warnings: bool,
    /// Crawl the reference subtree.
    pub include_reference: bool,
    /// Directory index file name.
    pub index_file: Option<String>,
}

impl RunOptions {
    /// Layer the switches over a loaded config.
    fn apply(&self, mut config: Config) -> Config {
        config.allow_html_extension |= self.allow_html;
        config.clean_urls |= self.clean_urls;
        config.hide_warnings |= self.hide_warnings;
        config.include_reference |= self.include_reference;
        if let Some(index_file) = &self.index_file {
            config.index_file.clone_from(index_file);
        }
        return config;
    }
}

/// Crawl the Markdown tree at `root`, reconcile anchors, report.
///
/// With `--debug` and an existing cache the crawl is skipped and the cached
/// issues are reported (and fixed) instead.
///
/// # Errors
///
/// Returns errors from config loading, the crawl, the cache, or the fixer.
pub fn check(root: &Path, options: &RunOptions) -> Result<ExitCode, Error> {
    let config = options.apply(Config::load(root)?).with_token_from_env();
    let sources = Sources::new(config.root.clone());
    let cache_path = config.root.join(CACHE_FILE);

    let cached = if options.debug { cache::read(&cache_path)? } else { None };
    let groups = if let Some(groups) = cached {
        info!(path = %cache_path.display(), "using cached issues, skipping crawl");
        groups
    } else {
        let groups = crawl(&config)?;
        if options.debug {
            cache::write(&cache_path, &groups)?;
            info!(path = %cache_path.display(), "wrote issue cache");
        }
        groups
    };

    return finish(groups, &sources, &config, options);
}

/// Walk every document through one session and group the result.
///
/// # Errors
///
/// Returns errors from scanning or reading documents.
fn crawl(config: &Config) -> Result<IssueGroups, Error> {
    let client = UreqClient::new(config.fetch.timeout);
    let fetcher = Fetcher::new(&client, config.fetch.clone());
    let comments = comment_source(config, &fetcher);
    let mut session = Session::new(config, &client, comments.as_ref().map(|c| return c as &dyn IssueCommentSource));

    let documents = scanner::scan(config)?;
    info!(documents = documents.len(), root = %config.root.display(), "crawling");
    for document in &documents {
        if session.is_cancelled() {
            warn!("crawl cancelled, reconciling what was gathered");
            break;
        }
        let text = std::fs::read_to_string(&document.path).map_err(|e| return Error::read(document.path.clone(), e))?;
        debug!(doc = %document.id, "processing");
        session.process_markdown(&document.id, &text)?;
    }
    session.reconcile()?;

    return Ok(deduplicate(&session.into_issues()));
}

/// Issue-comment lookups need a token; without one they are skipped.
fn comment_source<'a>(config: &Config, fetcher: &Fetcher<'a>) -> Option<GithubComments<'a>> {
    let Some(token) = config.token.clone() else {
        debug!("no API token, issue-comment anchors will not be verified");
        return None;
    };
    return Some(GithubComments::new(fetcher.clone(), token));
}

/// Check the links in the doc comments of a module's exports.
///
/// `entry` is a local `.ts`/`.js` file or an http(s) URL to one.
///
/// # Errors
///
/// Returns `Error::InvalidEntryPoint` when `entry` is neither,
/// `Error::ModuleFetchFailed` when a remote module can't be downloaded, and
/// parse or I/O errors from the scan.
pub fn module(entry: &str, options: &RunOptions) -> Result<ExitCode, Error> {
    let config = options.apply(Config::load(Path::new("."))?).with_token_from_env();
    let mut sources = Sources::new(config.root.clone());

    let client = UreqClient::new(config.fetch.timeout);
    let fetcher = Fetcher::new(&client, config.fetch.clone());
    let comments = comment_source(&config, &fetcher);
    let mut session = Session::new(&config, &client, comments.as_ref().map(|c| return c as &dyn IssueCommentSource));

    if is_remote(entry) {
        let url = Url::parse(entry).map_err(|e| {
            return Error::InvalidEntryPoint { entry: entry.to_string(), reason: e.to_string() };
        })?;
        let text = download(&fetcher, url.as_str())?;
        let links = jsdoc::doc_comment_links(Path::new(url.path()), &text)?;
        info!(links = links.len(), module = %url, "scanning remote module");
        sources.in_memory.insert(entry.to_string(), text);
        session.process_links(entry, &links, Some(&url))?;
    } else {
        let path = local_entry(entry)?;
        let text = std::fs::read_to_string(&path).map_err(|e| return Error::read(path.clone(), e))?;
        let links = jsdoc::doc_comment_links(&path, &text)?;
        info!(links = links.len(), module = %path.display(), "scanning module");
        session.process_links(&display_path(&path), &links, None)?;
    }
    session.reconcile()?;

    let groups = deduplicate(&session.into_issues());
    return finish(groups, &sources, &config, options);
}

/// Whether a module entry point names a URL rather than a path.
fn is_remote(entry: &str) -> bool {
    let lower = entry.to_ascii_lowercase();
    return lower.starts_with("http://") || lower.starts_with("https://");
}

/// A local entry point must be an existing file.
///
/// # Errors
///
/// Returns `Error::InvalidEntryPoint` otherwise.
fn local_entry(entry: &str) -> Result<PathBuf, Error> {
    if entry.contains("://") {
        return Err(Error::InvalidEntryPoint {
            entry: entry.to_string(),
            reason: "only http and https URLs are supported".to_string(),
        });
    }
    let path = PathBuf::from(entry);
    if !path.is_file() {
        return Err(Error::InvalidEntryPoint { entry: entry.to_string(), reason: "no such file".to_string() });
    }
    return Ok(path.strip_prefix("./").map_or_else(|_| return path.clone(), Path::to_path_buf));
}

/// Body of a remote module.
///
/// # Errors
///
/// Returns `Error::ModuleFetchFailed` without a successful response.
fn download(fetcher: &Fetcher<'_>, url: &str) -> Result<String, Error> {
    let outcome = fetcher.fetch(url, &FetchOptions::default());
    return match outcome.response {
        Some(response) if response.is_ok() => Ok(response.body),
        Some(response) => Err(Error::ModuleFetchFailed {
            reason: format!("{} {}", response.status, response.status_text),
            url: url.to_string(),
        }),
        None => Err(Error::ModuleFetchFailed { reason: "no response".to_string(), url: url.to_string() }),
    };
}

/// Locate, optionally fix, report, and pick the exit code.
///
/// # Errors
///
/// Returns errors from reading documents back or from the fixer.
fn finish(mut groups: IssueGroups, sources: &Sources, config: &Config, options: &RunOptions) -> Result<ExitCode, Error> {
    let mut failures = locate_all(&mut groups, sources)?;

    if options.fix {
        let fixer = Fixer::new(sources, &config.reference_dir, config.similarity_threshold);
        let summary = fixer.fix(&mut groups)?;
        info!(applied = summary.applied, rounds = summary.rounds, "auto-fix finished");
        if summary.applied > 0 {
            println!("Applied {} fixes", summary.applied);
        }
        failures = locate_all(&mut groups, sources)?;
    }

    let report_options =
        ReportOptions { hide_warnings: config.hide_warnings, similarity_threshold: config.similarity_threshold };
    report::print_report(&groups, &failures, report_options);

    if report::has_errors(&groups) {
        return Ok(ExitCode::FAILURE);
    }
    return Ok(ExitCode::SUCCESS);
}
