//! One crawl: which anchors each target defines, which anchors each document
//! asks of it, and the issues that follow.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::dom;
use crate::error::Error;
use crate::fetch::{FetchOptions, Fetcher, HttpClient};
use crate::github::{self, GroupResolver, IssueCommentSource, RepoId};
use crate::heuristics::{AnchorRules, RedirectRules};
use crate::issues::{Issue, IssueKind};
use crate::link::{self, LinkKind};
use crate::local::{LocalResolver, display_path};
use crate::markdown;

/// Prefix of the ids GitHub gives issue comments.
const COMMENT_ANCHOR_PREFIX: &str = "issuecomment-";

/// Something a link can point at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// Canonical root URL, or the content-API key of a grouped link.
    External(String),
    /// File path relative to the docs root.
    Local(PathBuf),
}

/// An anchor asked for, with the link text that asked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsedAnchor {
    /// Decoded anchor.
    pub anchor: String,
    /// Link as written.
    pub reference: String,
}

/// What fetching an external root produced, shared by every link to it.
#[derive(Debug, Clone, Default)]
struct ExternalEntry {
    /// Whether the page body can be checked for anchors.
    has_anchors: bool,
    /// Problems with the root itself.
    issues: Vec<IssueKind>,
    /// Final URL when the fetch was redirected.
    redirected_to: Option<String>,
}

/// Crawl state. Documents go in one at a time, then [`Session::reconcile`]
/// turns the accumulated anchor usage into issues.
pub struct Session<'a> {
    /// Anchor-membership rules.
    anchor_rules: AnchorRules,
    /// Anchors each target defines.
    anchors: HashMap<Target, BTreeSet<String>>,
    /// Set to stop before the next document.
    cancel: Arc<AtomicBool>,
    /// Comment ids per issue, `None` when the listing failed.
    comment_cache: HashMap<(RepoId, u64), Option<BTreeSet<String>>>,
    /// Optional capability for `#issuecomment-N` anchors.
    comments: Option<&'a dyn IssueCommentSource>,
    /// Run configuration.
    config: &'a Config,
    /// One fetch per canonical root.
    external: HashMap<String, ExternalEntry>,
    /// HTTP with retries.
    fetcher: Fetcher<'a>,
    /// Content-API resolution for GitHub-rendered files.
    groups: GroupResolver<'a>,
    /// Issues per document.
    issues: BTreeMap<String, Vec<Issue>>,
    /// Local link resolution.
    local: LocalResolver,
    /// Redirect acceptance rules.
    redirect_rules: RedirectRules,
    /// target → referencing document → anchors asked for.
    used: BTreeMap<Target, BTreeMap<String, BTreeSet<UsedAnchor>>>,
}

impl<'a> Session<'a> {
    /// Empty session for one run.
    pub fn new(config: &'a Config, client: &'a dyn HttpClient, comments: Option<&'a dyn IssueCommentSource>) -> Self {
        let fetcher = Fetcher::new(client, config.fetch.clone());
        return Self {
            anchor_rules: AnchorRules { extra_suffixed_hosts: config.suffixed_anchor_hosts.clone() },
            anchors: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            comment_cache: HashMap::new(),
            comments,
            config,
            external: HashMap::new(),
            groups: GroupResolver::new(fetcher.clone(), config.token.clone()),
            fetcher,
            issues: BTreeMap::new(),
            local: LocalResolver::from_config(config),
            redirect_rules: RedirectRules { known: config.known_redirects.clone() },
            used: BTreeMap::new(),
        };
    }

    /// Shared flag that stops the crawl before the next document when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        return Arc::clone(&self.cancel);
    }

    /// Whether the crawl was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        return self.cancel.load(Ordering::Relaxed);
    }

    /// Issues gathered so far, per document.
    pub const fn issues(&self) -> &BTreeMap<String, Vec<Issue>> {
        return &self.issues;
    }

    /// Consume the session, keeping only its issues.
    pub fn into_issues(self) -> BTreeMap<String, Vec<Issue>> {
        return self.issues;
    }

    /// Record a Markdown document's anchors and check its links.
    ///
    /// `doc` is the document's path relative to the docs root.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors other than not-found.
    pub fn process_markdown(&mut self, doc: &str, text: &str) -> Result<(), Error> {
        if self.is_cancelled() {
            return Ok(());
        }
        let parsed = markdown::parse_document(text);
        self.anchors.insert(Target::Local(PathBuf::from(doc)), parsed.anchors);
        return self.process_links(doc, &parsed.links, None);
    }

    /// Check a list of links found in `doc`. With `base`, relative links are
    /// joined against it and checked as external links.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors other than not-found.
    pub fn process_links(&mut self, doc: &str, links: &[String], base: Option<&Url>) -> Result<(), Error> {
        if self.is_cancelled() {
            return Ok(());
        }
        for href in links {
            if link::is_ignorable(href) {
                continue;
            }
            let kind = link::classify(href);
            match (kind, base) {
                (LinkKind::External, _) => self.process_external(doc, href, href),
                (LinkKind::SameDocumentAnchor, _) => self.process_same_document(doc, href),
                (LinkKind::Local | LinkKind::Unknown, Some(base)) => match base.join(href) {
                    Ok(absolute) => self.process_external(doc, href, absolute.as_str()),
                    Err(_) => self.push(doc, href, IssueKind::UnknownLinkFormat),
                },
                (LinkKind::Local, None) => self.process_local(doc, href)?,
                (LinkKind::Unknown, None) => self.push(doc, href, IssueKind::UnknownLinkFormat),
            }
        }
        return Ok(());
    }

    /// Emit `missing_anchor` for every used anchor its target doesn't define.
    /// Local targets no document was crawled for are parsed here. The used
    /// anchors are consumed, so a second call only sees links processed since.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` when a linked Markdown file exists but cannot be read.
    pub fn reconcile(&mut self) -> Result<(), Error> {
        let used = std::mem::take(&mut self.used);
        for (target, by_document) in &used {
            let all_anchors = self.anchors_of(target)?;
            let url = match target {
                Target::External(key) => Url::parse(key).ok(),
                Target::Local(_) => None,
            };
            for (doc, anchors) in by_document {
                for used_anchor in anchors {
                    if self.anchor_rules.is_valid_anchor(&all_anchors, url.as_ref(), &used_anchor.anchor) {
                        continue;
                    }
                    self.push(
                        doc,
                        &used_anchor.reference,
                        IssueKind::MissingAnchor { all_anchors: all_anchors.clone(), anchor: used_anchor.anchor.clone() },
                    );
                }
            }
        }
        return Ok(());
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    /// `#anchor` in the document itself.
    fn process_same_document(&mut self, doc: &str, href: &str) {
        let parsed = link::parse_link(href);
        match parsed.anchor.as_deref() {
            Some("") | None => self.push(doc, href, IssueKind::EmptyAnchor),
            Some(anchor) => self.use_anchor(Target::Local(PathBuf::from(doc)), doc, anchor, href),
        }
    }

    /// A file in the docs tree.
    fn process_local(&mut self, doc: &str, href: &str) -> Result<(), Error> {
        let parsed = link::parse_link(href);
        let doc_dir = Path::new(doc).parent().unwrap_or_else(|| return Path::new(""));
        let target = self.local.resolve(doc_dir, &parsed.root)?;
        for kind in target.issues {
            self.push(doc, href, kind);
        }
        if parsed.has_empty_anchor() {
            self.push(doc, href, IssueKind::EmptyAnchor);
            return Ok(());
        }
        if let (Some(path), Some(anchor)) = (target.path, parsed.anchor.as_deref())
            && path.extension().is_some_and(|e| return e == "md")
        {
            self.use_anchor(Target::Local(path), doc, anchor, href);
        }
        return Ok(());
    }

    /// An http(s) URL. `reference` is the link as written, `absolute` what it
    /// resolves to.
    fn process_external(&mut self, doc: &str, reference: &str, absolute: &str) {
        if let Some(reason) = self.local_alternative(absolute) {
            self.push(doc, reference, IssueKind::LocalAltAvailable { reason });
            return;
        }
        let parsed = link::parse_link(absolute);
        let Ok(url) = Url::parse(absolute) else {
            self.push(doc, reference, IssueKind::UnknownLinkFormat);
            return;
        };
        if parsed.has_empty_anchor() {
            self.push(doc, reference, IssueKind::EmptyAnchor);
        }

        if let Some(group) = github::detect(&url) {
            self.process_grouped(doc, reference, &group, parsed.anchor.as_deref().unwrap_or_default());
            return;
        }

        let Some(key) = link::canonical_root(&parsed.root) else {
            self.push(doc, reference, IssueKind::UnknownLinkFormat);
            return;
        };
        let entry = self.external_entry(&key);
        if let Some(to) = &entry.redirected_to
            && !self.redirect_rules.is_valid_redirection(&parsed.root, to)
        {
            // Joined links must carry the text as written so it can be found in the document.
            let from = if reference == absolute { parsed.root.clone() } else { link::parse_link(reference).root };
            self.push(doc, reference, IssueKind::Redirected { from, to: to.clone() });
        }
        for kind in entry.issues {
            self.push(doc, reference, kind);
        }

        let Some(anchor) = parsed.anchor.as_deref().filter(|a| return !a.is_empty()) else {
            return;
        };
        if !entry.has_anchors {
            return;
        }
        if anchor.starts_with(COMMENT_ANCHOR_PREFIX)
            && !self.defines(&Target::External(key.clone()), anchor)
            && let Some((repo, number)) = github::issue_reference(&url)
            && !self.confirm_comment(doc, reference, &key, repo, number, anchor)
        {
            return;
        }
        self.use_anchor(Target::External(key), doc, anchor, reference);
    }

    /// A GitHub-rendered file checked through the content API.
    fn process_grouped(&mut self, doc: &str, reference: &str, group: &github::GroupedLink, anchor: &str) {
        if anchor.is_empty() || github::is_known_safe(group, anchor) {
            return;
        }
        let key = GroupResolver::target_key(group);
        match self.groups.resolve(group) {
            Ok(anchors) => {
                self.anchors.entry(Target::External(key.clone())).or_insert(anchors);
                self.use_anchor(Target::External(key), doc, anchor, reference);
            },
            Err(kind) => self.push(doc, reference, kind),
        }
    }

    // ── State ──────────────────────────────────────────────────────────

    /// Anchors defined by `target`, parsing unvisited Markdown files on demand.
    fn anchors_of(&mut self, target: &Target) -> Result<BTreeSet<String>, Error> {
        if let Some(anchors) = self.anchors.get(target) {
            return Ok(anchors.clone());
        }
        let Target::Local(path) = target else {
            return Ok(BTreeSet::new());
        };
        if !path.extension().is_some_and(|e| return e == "md") {
            return Ok(BTreeSet::new());
        }
        let full = self.config.root.join(path);
        let anchors = match std::fs::read_to_string(&full) {
            Ok(text) => markdown::parse_document(&text).anchors,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(Error::read(full, e)),
        };
        debug!(path = %display_path(path), count = anchors.len(), "parsed linked document for anchors");
        self.anchors.insert(target.clone(), anchors.clone());
        return Ok(anchors);
    }

    /// Ask the comment source whether `anchor` names a real comment, merging
    /// every comment id of the issue into the target's anchors. Returns whether
    /// the anchor should still be checked the normal way.
    fn confirm_comment(&mut self, doc: &str, reference: &str, key: &str, repo: RepoId, number: u64, anchor: &str) -> bool {
        let Some(source) = self.comments else {
            debug!(reference, "no issue comment source configured; comment anchor not verified");
            return false;
        };
        let cache_key = (repo, number);
        let ids = self
            .comment_cache
            .entry(cache_key.clone())
            .or_insert_with(|| {
                let (repo, number) = &cache_key;
                return match source.fetch_issue_comments(&repo.owner, &repo.name, *number) {
                    Ok(ids) => Some(ids.into_iter().map(|id| return format!("{COMMENT_ANCHOR_PREFIX}{id}")).collect()),
                    Err(reason) => {
                        warn!(reference, reason = %reason, "cannot list issue comments");
                        None
                    },
                };
            })
            .clone();
        let Some(ids) = ids else {
            return false;
        };
        let found = ids.contains(anchor);
        self.anchors.entry(Target::External(key.to_string())).or_default().extend(ids);
        if !found {
            self.push(doc, reference, IssueKind::MissingGithubComment);
        }
        return found;
    }

    /// Whether `target` is already known to define `anchor`.
    fn defines(&self, target: &Target, anchor: &str) -> bool {
        return self.anchors.get(target).is_some_and(|a| return a.contains(anchor));
    }

    /// Fetch `key` unless an earlier link already did.
    fn external_entry(&mut self, key: &str) -> ExternalEntry {
        if let Some(entry) = self.external.get(key) {
            debug!(url = key, "external root cache hit");
            return entry.clone();
        }

        let outcome = self.fetcher.fetch(key, &FetchOptions::default());
        let mut entry = ExternalEntry {
            redirected_to: outcome.redirected.then(|| return outcome.redirected_url.clone()),
            ..ExternalEntry::default()
        };
        match outcome.response {
            None => entry.issues.push(IssueKind::NoResponse),
            Some(response) => {
                if let Some(reason) = self.fetcher.blocking_reason(key, &response) {
                    entry.issues.push(IssueKind::Inaccessible { reason });
                } else if outcome.redirected && response.is_redirect() {
                    debug!(url = key, to = %outcome.redirected_url, "manual redirect, nothing to scan");
                } else if !response.is_ok() {
                    entry.issues.push(IssueKind::NotOkResponse {
                        status: response.status,
                        status_text: response.status_text.clone(),
                    });
                } else if response.body.trim().is_empty() {
                    entry.issues.push(IssueKind::EmptyDom);
                } else {
                    entry.has_anchors = true;
                    self.anchors.insert(Target::External(key.to_string()), dom::extract_anchors(&response.body, true));
                }
            },
        }
        self.external.insert(key.to_string(), entry.clone());
        return entry;
    }

    /// Reason to prefer a relative link, when `absolute` is on the published site.
    fn local_alternative(&self, absolute: &str) -> Option<String> {
        let site = self.config.site_url.as_deref()?.trim_end_matches('/');
        if site.is_empty() {
            return None;
        }
        let root = link::parse_link(absolute).root;
        let under_site = root == site || root.strip_prefix(site).is_some_and(|rest| return rest.starts_with('/'));
        if !under_site {
            return None;
        }
        return Some(format!("{site} is built from this tree; link the file relatively"));
    }

    /// Append an issue to a document.
    fn push(&mut self, doc: &str, reference: &str, kind: IssueKind) {
        self.issues.entry(doc.to_string()).or_default().push(Issue::new(reference, kind));
    }

    /// Record that `doc` asks `target` for `anchor`.
    fn use_anchor(&mut self, target: Target, doc: &str, anchor: &str, reference: &str) {
        self.used
            .entry(target)
            .or_default()
            .entry(doc.to_string())
            .or_default()
            .insert(UsedAnchor { anchor: anchor.to_string(), reference: reference.to_string() });
    }
}
