//! Links into GitHub-rendered files, whose anchors only exist after client-side
//! rendering, resolved through the content API instead of the web page.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::dom;
use crate::fetch::{FetchOptions, Fetcher, HttpResponse};
use crate::issues::IssueKind;

/// Web host of the code host.
const WEB_HOST: &str = "github.com";

/// REST API base.
const API_BASE: &str = "https://api.github.com";

/// Page size for paginated API listings.
const PAGE_SIZE: usize = 100;

/// Prefix GitHub puts on ids in rendered user content.
const USER_CONTENT_PREFIX: &str = "user-content-";

/// Extensions GitHub renders as markup.
const MARKUP_EXTENSIONS: &[&str] = &["adoc", "asciidoc", "markdown", "md", "mdown", "mdx", "org", "rst", "textile"];

/// `owner/name` of a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoId {
    /// Repository name.
    pub name: String,
    /// User or organization.
    pub owner: String,
}

/// A link that needs the content API to verify its anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupedLink {
    /// A repository or directory front page showing its README.
    Readme {
        /// Repository.
        repo: RepoId,
        /// `{branch}/{dir}` after `/tree/`, `None` for the repository root.
        tree_rest: Option<String>,
    },
    /// A rendered markup file.
    File {
        /// Repository.
        repo: RepoId,
        /// `{branch}/{path}` after `/blob/`.
        rest: String,
    },
}

/// Anchors of a resolved file, or the issue that prevented resolving it.
pub type Resolution = Result<BTreeSet<String>, IssueKind>;

/// Non-empty path segments of a `github.com` URL.
fn github_segments(url: &Url) -> Option<Vec<&str>> {
    if !url.host_str().is_some_and(|h| return h.eq_ignore_ascii_case(WEB_HOST)) {
        return None;
    }
    return Some(url.path_segments()?.filter(|s| return !s.is_empty()).collect());
}

/// Whether the URL has a non-empty fragment.
fn has_anchor(url: &Url) -> bool {
    return url.fragment().is_some_and(|f| return !f.is_empty());
}

/// `https://github.com/{owner}/{repo}[/tree/{branch}/{dir}]#anchor`.
pub fn is_github_readme_with_anchor_url(url: &Url) -> bool {
    let Some(segments) = github_segments(url) else {
        return false;
    };
    let is_front_page = segments.len() == 2 || (segments.len() > 3 && segments.get(2) == Some(&"tree"));
    return is_front_page && has_anchor(url);
}

/// `https://github.com/{owner}/{repo}/blob/{branch}/{path}.md#anchor`.
pub fn is_github_file_with_anchor_url(url: &Url) -> bool {
    let Some(segments) = github_segments(url) else {
        return false;
    };
    if segments.len() < 5 || segments.get(2) != Some(&"blob") {
        return false;
    }
    let is_markup = segments.last().and_then(|name| return name.rsplit_once('.')).is_some_and(|(_, ext)| {
        return MARKUP_EXTENSIONS.iter().any(|m| return m.eq_ignore_ascii_case(ext));
    });
    return is_markup && has_anchor(url);
}

/// Classify a URL as a grouped link, if it is one.
pub fn detect(url: &Url) -> Option<GroupedLink> {
    let readme = is_github_readme_with_anchor_url(url);
    if !readme && !is_github_file_with_anchor_url(url) {
        return None;
    }
    let segments = github_segments(url)?;
    let repo = RepoId { name: (*segments.get(1)?).to_string(), owner: (*segments.first()?).to_string() };
    let rest = segments.get(3..).map(|s| return s.join("/")).filter(|s| return !s.is_empty());
    if readme {
        return Some(GroupedLink::Readme { repo, tree_rest: rest });
    }
    return Some(GroupedLink::File { repo, rest: rest? });
}

/// Whether resolving can be skipped: `#readme` on a README page always exists.
pub fn is_known_safe(link: &GroupedLink, anchor: &str) -> bool {
    return matches!(link, GroupedLink::Readme { .. }) && anchor == "readme";
}

/// The repository and number of an issue or pull request URL.
pub fn issue_reference(url: &Url) -> Option<(RepoId, u64)> {
    let segments = github_segments(url)?;
    let [owner, name, kind, number, ..] = segments.as_slice() else {
        return None;
    };
    if *kind != "issues" && *kind != "pull" {
        return None;
    }
    let number = number.parse().ok()?;
    return Some((RepoId { name: (*name).to_string(), owner: (*owner).to_string() }, number));
}

/// Pick the longest branch that is a whole-segment prefix of `rest`, returning
/// it with the path that follows.
///
/// Overlapping names such as `release` and `release/v2` resolve to the longer
/// one when both match. Equal-length matches fall back to lexicographic order.
pub fn longest_branch_match<'b>(branches: &'b [String], rest: &str) -> Option<(&'b str, String)> {
    let mut best: Option<&String> = None;
    for branch in branches {
        let matched = rest == branch.as_str()
            || rest.strip_prefix(branch.as_str()).is_some_and(|tail| return tail.starts_with('/'));
        if !matched {
            continue;
        }
        best = match best {
            Some(current) if current.len() > branch.len() => Some(current),
            Some(current) if current.len() == branch.len() && current <= branch => Some(current),
            _ => Some(branch),
        };
    }
    let branch = best?;
    let path = rest.get(branch.len()..).unwrap_or_default().trim_start_matches('/').to_string();
    return Some((branch.as_str(), path));
}

/// Strip GitHub's `user-content-` id prefix from rendered anchors.
fn rendered_anchors(html: &str) -> BTreeSet<String> {
    return dom::extract_anchors(html, false)
        .into_iter()
        .map(|id| return id.strip_prefix(USER_CONTENT_PREFIX).map_or(id.clone(), str::to_string))
        .collect();
}

/// Issue for a failed API response.
fn response_issue(response: Option<&HttpResponse>) -> IssueKind {
    return match response {
        None => IssueKind::NoResponse,
        Some(r) => IssueKind::NotOkResponse { status: r.status, status_text: r.status_text.clone() },
    };
}

/// Request headers for the REST API.
fn api_headers(token: Option<&str>, accept: &str) -> FetchOptions {
    let mut headers = vec![
        ("Accept".to_string(), accept.to_string()),
        ("X-GitHub-Api-Version".to_string(), "2022-11-28".to_string()),
    ];
    if let Some(token) = token {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
    }
    return FetchOptions { headers };
}

/// One entry of the branch listing.
#[derive(Deserialize)]
struct BranchEntry {
    name: String,
}

/// One entry of the issue comment listing.
#[derive(Deserialize)]
struct CommentEntry {
    id: u64,
}

/// Per-repository cache.
#[derive(Default)]
struct RepoCache {
    /// Every branch name, fetched once.
    branches: Option<Result<Vec<String>, IssueKind>>,
    /// branch → path → resolution. The default branch is stored under `""`.
    files: HashMap<String, HashMap<String, Resolution>>,
}

/// Resolves grouped links, one API call per (repository, branch, file).
pub struct GroupResolver<'a> {
    /// Per-repository state.
    cache: HashMap<RepoId, RepoCache>,
    /// HTTP with retries.
    fetcher: Fetcher<'a>,
    /// Optional bearer token.
    token: Option<String>,
}

impl<'a> GroupResolver<'a> {
    /// Resolver on top of `fetcher`, authenticating with `token` when given.
    pub fn new(fetcher: Fetcher<'a>, token: Option<String>) -> Self {
        return Self { cache: HashMap::new(), fetcher, token };
    }

    /// Stable key for the target the link resolves to.
    pub fn target_key(link: &GroupedLink) -> String {
        return match link {
            GroupedLink::Readme { repo, tree_rest } => {
                format!("{API_BASE}/repos/{}/{}/readme/{}", repo.owner, repo.name, tree_rest.as_deref().unwrap_or(""))
            },
            GroupedLink::File { repo, rest } => format!("{API_BASE}/repos/{}/{}/contents/{rest}", repo.owner, repo.name),
        };
    }

    /// Anchors defined by the rendered file, fetched at most once.
    pub fn resolve(&mut self, link: &GroupedLink) -> Resolution {
        let (repo, rest) = match link {
            GroupedLink::Readme { repo, tree_rest: None } => {
                return self.resolve_file(repo, "", "", true);
            },
            GroupedLink::Readme { repo, tree_rest: Some(rest) } | GroupedLink::File { repo, rest } => (repo, rest),
        };

        let branches = self.branches(repo)?;
        let Some((branch, path)) = longest_branch_match(&branches, rest) else {
            return Err(IssueKind::NotOkResponse { status: 404, status_text: "No matching branch".to_string() });
        };
        let branch = branch.to_string();
        return self.resolve_file(repo, &branch, &path, matches!(link, GroupedLink::Readme { .. }));
    }

    /// Cached branch list of `repo`.
    fn branches(&mut self, repo: &RepoId) -> Result<Vec<String>, IssueKind> {
        if let Some(cached) = self.cache.get(repo).and_then(|c| return c.branches.clone()) {
            return cached;
        }
        let fetched = self.fetch_branches(repo);
        self.cache.entry(repo.clone()).or_default().branches = Some(fetched.clone());
        return fetched;
    }

    /// Page through the branch listing until a short page.
    fn fetch_branches(&self, repo: &RepoId) -> Result<Vec<String>, IssueKind> {
        let options = api_headers(self.token.as_deref(), "application/vnd.github+json");
        let mut names = Vec::new();
        let mut page = 1_u32;
        loop {
            let url = format!("{API_BASE}/repos/{}/{}/branches?per_page={PAGE_SIZE}&page={page}", repo.owner, repo.name);
            let response = match self.fetcher.fetch(&url, &options).response {
                Some(response) if response.is_ok() => response,
                other => return Err(response_issue(other.as_ref())),
            };
            let entries: Vec<BranchEntry> = serde_json::from_str(&response.body).map_err(|e| {
                return IssueKind::NotOkResponse { status: response.status, status_text: format!("unreadable branch list: {e}") };
            })?;
            let count = entries.len();
            names.extend(entries.into_iter().map(|b| return b.name));
            if count < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        debug!(repo = %format!("{}/{}", repo.owner, repo.name), count = names.len(), "branches listed");
        return Ok(names);
    }

    /// Fetch and cache one rendered file or README.
    fn resolve_file(&mut self, repo: &RepoId, branch: &str, path: &str, readme: bool) -> Resolution {
        if let Some(hit) = self.cache.get(repo).and_then(|c| return c.files.get(branch)?.get(path)) {
            debug!(repo = %repo.name, branch, path, "grouped link cache hit");
            return hit.clone();
        }

        let mut url = if readme {
            let dir = if path.is_empty() { String::new() } else { format!("/{path}") };
            format!("{API_BASE}/repos/{}/{}/readme{dir}", repo.owner, repo.name)
        } else {
            format!("{API_BASE}/repos/{}/{}/contents/{path}", repo.owner, repo.name)
        };
        if !branch.is_empty() {
            url.push_str("?ref=");
            url.push_str(branch);
        }

        let options = api_headers(self.token.as_deref(), "application/vnd.github.html+json");
        let outcome = self.fetcher.fetch(&url, &options);
        let resolution = match outcome.response {
            Some(response) if response.is_ok() => Ok(rendered_anchors(&response.body)),
            other => Err(response_issue(other.as_ref())),
        };

        self.cache
            .entry(repo.clone())
            .or_default()
            .files
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), resolution.clone());
        return resolution;
    }
}

/// Source of comment ids for an issue or pull request.
pub trait IssueCommentSource {
    /// Ids of every comment on `owner/repo#number`.
    ///
    /// # Errors
    ///
    /// Returns a description when the listing cannot be retrieved.
    fn fetch_issue_comments(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<u64>, String>;
}

/// [`IssueCommentSource`] backed by the REST API.
pub struct GithubComments<'a> {
    /// HTTP with retries.
    fetcher: Fetcher<'a>,
    /// Bearer token.
    token: String,
}

impl<'a> GithubComments<'a> {
    /// Client authenticating with `token`.
    pub fn new(fetcher: Fetcher<'a>, token: String) -> Self {
        return Self { fetcher, token };
    }
}

impl IssueCommentSource for GithubComments<'_> {
    fn fetch_issue_comments(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<u64>, String> {
        let options = api_headers(Some(&self.token), "application/vnd.github+json");
        let mut ids = Vec::new();
        let mut page = 1_u32;
        loop {
            let url = format!("{API_BASE}/repos/{owner}/{repo}/issues/{number}/comments?per_page={PAGE_SIZE}&page={page}");
            let response = self
                .fetcher
                .fetch(&url, &options)
                .response
                .ok_or_else(|| return format!("no response from {url}"))?;
            if !response.is_ok() {
                return Err(format!("{url} answered {}", response.status));
            }
            let entries: Vec<CommentEntry> = serde_json::from_str(&response.body).map_err(|e| return e.to_string())?;
            let count = entries.len();
            ids.extend(entries.into_iter().map(|c| return c.id));
            if count < PAGE_SIZE {
                return Ok(ids);
            }
            page = page.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{ScriptedClient, fast_settings, ok, status};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn repo() -> RepoId {
        RepoId { name: "r".into(), owner: "o".into() }
    }

    #[test]
    fn readme_urls_need_an_anchor() {
        assert!(is_github_readme_with_anchor_url(&url("https://github.com/o/r#readme")));
        assert!(!is_github_readme_with_anchor_url(&url("https://github.com/o/r")));
        assert!(is_github_readme_with_anchor_url(&url("https://github.com/o/r/tree/main/docs#usage")));
        assert!(!is_github_readme_with_anchor_url(&url("https://gitlab.com/o/r#readme")));
    }

    #[test]
    fn file_urls_need_markup_and_anchor() {
        assert!(is_github_file_with_anchor_url(&url("https://github.com/o/r/blob/main/docs/a.md#x")));
        assert!(!is_github_file_with_anchor_url(&url("https://github.com/o/r/blob/main/src/lib.rs#L10")));
        assert!(!is_github_file_with_anchor_url(&url("https://github.com/o/r/blob/main/docs/a.md")));
    }

    #[test]
    fn detect_splits_repo_and_rest() {
        let link = detect(&url("https://github.com/o/r/blob/feature/x/docs/a.md#y")).unwrap();
        assert_eq!(link, GroupedLink::File { repo: repo(), rest: "feature/x/docs/a.md".into() });
        let readme = detect(&url("https://github.com/o/r#install")).unwrap();
        assert_eq!(readme, GroupedLink::Readme { repo: repo(), tree_rest: None });
        assert!(is_known_safe(&readme, "readme"));
        assert!(!is_known_safe(&link, "readme"));
    }

    #[test]
    fn longest_branch_wins() {
        let branches = vec!["release".to_string(), "release/v2".to_string(), "main".to_string()];
        let (branch, path) = longest_branch_match(&branches, "release/v2/docs/a.md").unwrap();
        assert_eq!(branch, "release/v2");
        assert_eq!(path, "docs/a.md");

        let (branch, path) = longest_branch_match(&branches, "release/docs/a.md").unwrap();
        assert_eq!(branch, "release");
        assert_eq!(path, "docs/a.md");

        assert!(longest_branch_match(&branches, "mainline/a.md").is_none());
    }

    #[test]
    fn issue_references_parse_number() {
        let (repo_id, number) = issue_reference(&url("https://github.com/o/r/issues/42#issuecomment-7")).unwrap();
        assert_eq!(repo_id, repo());
        assert_eq!(number, 42);
        assert!(issue_reference(&url("https://github.com/o/r/blob/main/a.md")).is_none());
    }

    #[test]
    fn resolves_file_through_content_api_once() {
        let client = ScriptedClient::default();
        let branches_url = "https://api.github.com/repos/o/r/branches?per_page=100&page=1";
        client.page(branches_url, r#"[{"name":"main"},{"name":"dev"}]"#);
        let content_url = "https://api.github.com/repos/o/r/contents/docs/a.md?ref=main";
        client.page(content_url, r##"<h2><a id="user-content-setup" class="anchor" href="#setup"></a>Setup</h2>"##);

        let mut resolver = GroupResolver::new(Fetcher::new(&client, fast_settings()), Some("t0k".into()));
        let link = GroupedLink::File { repo: repo(), rest: "main/docs/a.md".into() };
        let anchors = resolver.resolve(&link).unwrap();
        assert!(anchors.contains("setup"));

        resolver.resolve(&link).unwrap();
        assert_eq!(client.count(content_url), 1);
        assert_eq!(client.count(branches_url), 1);

        let calls = client.calls.borrow();
        let content_call = calls.iter().find(|c| c.url == content_url).unwrap();
        assert!(content_call.headers.iter().any(|(k, v)| k == "Authorization" && v == "Bearer t0k"));
    }

    #[test]
    fn missing_file_becomes_not_ok_response() {
        let client = ScriptedClient::default();
        let readme_url = "https://api.github.com/repos/o/r/readme";
        client.respond(readme_url, status(readme_url, 404, "Not Found"));

        let mut resolver = GroupResolver::new(Fetcher::new(&client, fast_settings()), None);
        let link = GroupedLink::Readme { repo: repo(), tree_rest: None };
        assert_eq!(
            resolver.resolve(&link),
            Err(IssueKind::NotOkResponse { status: 404, status_text: "Not Found".into() })
        );
    }

    #[test]
    fn unknown_branch_is_reported() {
        let client = ScriptedClient::default();
        let branches_url = "https://api.github.com/repos/o/r/branches?per_page=100&page=1";
        client.respond(branches_url, ok(branches_url, r#"[{"name":"main"}]"#));

        let mut resolver = GroupResolver::new(Fetcher::new(&client, fast_settings()), None);
        let link = GroupedLink::File { repo: repo(), rest: "gone/a.md".into() };
        assert!(matches!(resolver.resolve(&link), Err(IssueKind::NotOkResponse { status: 404, .. })));
    }
}
