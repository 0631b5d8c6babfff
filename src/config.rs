use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Name of the optional config file in the docs root.
pub const CONFIG_FILE: &str = ".doclinks.toml";

/// Environment variable holding the code-host API bearer token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Directory names skipped while walking, unless the config overrides them.
const DEFAULT_IGNORE: &[&str] = &[".git", "node_modules", "target", "vendor"];

/// Resolved configuration for one run: `.doclinks.toml` with CLI overrides applied.
#[derive(Debug, Clone)]
pub struct Config {
    /// Accept `.html` on local links in extension mode without a `wrong_extension` issue.
    pub allow_html_extension: bool,
    /// Clean-URL addressing: local links carry no file extension.
    pub clean_urls: bool,
    /// Network behavior of the resilient fetcher.
    pub fetch: FetchSettings,
    /// Drop warning-class issues from the report.
    pub hide_warnings: bool,
    /// Directory names never descended into.
    pub ignore: Vec<String>,
    /// Crawl the generated reference subtree too.
    pub include_reference: bool,
    /// File that a directory link resolves to.
    pub index_file: String,
    /// Extra (from, to) pairs accepted as valid redirects.
    pub known_redirects: Vec<(String, String)>,
    /// Generated subtree, relative to the root. Never rewritten by the fixer.
    pub reference_dir: PathBuf,
    /// Documentation root every document path is relative to.
    pub root: PathBuf,
    /// Minimum `normalized_levenshtein` score for an anchor suggestion.
    pub similarity_threshold: f64,
    /// Published site; external links under it should be relative links.
    pub site_url: Option<String>,
    /// Extra hosts whose duplicate headings get `_N` suffixed ids.
    pub suffixed_anchor_hosts: Vec<String>,
    /// Bearer token for the code-host content API.
    pub token: Option<String>,
}

/// Retry, timeout and per-host policy for outgoing requests.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total attempts per URL, first try included.
    pub attempts: u32,
    /// URLs fetched without following redirects.
    pub manual_redirect: Vec<String>,
    /// Hosts known to sit behind DDoS protection.
    pub protected_hosts: Vec<String>,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        return Self {
            attempts: 5,
            manual_redirect: Vec::new(),
            protected_hosts: Vec::new(),
            retry_delay: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        };
    }
}

/// Raw TOML structure for `.doclinks.toml`.
#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct DoclinksTomlConfig {
    allow_html_extension: Option<bool>,
    clean_urls: Option<bool>,
    fetch: RawFetch,
    hide_warnings: Option<bool>,
    ignore: Option<Vec<String>>,
    include_reference: Option<bool>,
    index_file: Option<String>,
    redirects: Vec<RawRedirect>,
    reference_dir: Option<String>,
    similarity_threshold: Option<f64>,
    site_url: Option<String>,
    suffixed_anchor_hosts: Vec<String>,
}

/// Raw `[fetch]` table.
#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawFetch {
    attempts: Option<u32>,
    manual_redirect: Vec<String>,
    protected_hosts: Vec<String>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

/// Raw `[[redirects]]` entry.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRedirect {
    from: String,
    to: String,
}

impl Config {
    /// Defaults for a docs tree at `root`, as if no config file existed.
    pub fn defaults(root: &Path) -> Self {
        return Self {
            allow_html_extension: false,
            clean_urls: false,
            fetch: FetchSettings::default(),
            hide_warnings: false,
            ignore: DEFAULT_IGNORE.iter().map(|s| return (*s).to_string()).collect(),
            include_reference: false,
            index_file: "README.md".to_string(),
            known_redirects: Vec::new(),
            reference_dir: PathBuf::from("reference"),
            root: root.to_path_buf(),
            similarity_threshold: 0.6,
            site_url: None,
            suffixed_anchor_hosts: Vec::new(),
            token: None,
        };
    }

    /// Load `.doclinks.toml` from `root`, falling back to defaults when it doesn't exist.
    /// A file that exists but is malformed is an error: never silently
    /// fall back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::defaults(root)),
            Err(e) => return Err(Error::read(path, e)),
            Ok(c) => c,
        };
        return Self::parse(root, &content);
    }

    /// Merge raw TOML content over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed.
    pub fn parse(root: &Path, content: &str) -> Result<Self, Error> {
        let raw: DoclinksTomlConfig = toml::from_str(content)?;
        let mut config = Self::defaults(root);

        config.allow_html_extension = raw.allow_html_extension.unwrap_or(config.allow_html_extension);
        config.clean_urls = raw.clean_urls.unwrap_or(config.clean_urls);
        config.hide_warnings = raw.hide_warnings.unwrap_or(config.hide_warnings);
        config.include_reference = raw.include_reference.unwrap_or(config.include_reference);
        if let Some(ignore) = raw.ignore {
            config.ignore = ignore;
        }
        if let Some(index_file) = raw.index_file {
            config.index_file = index_file;
        }
        if let Some(reference_dir) = raw.reference_dir {
            config.reference_dir = PathBuf::from(reference_dir);
        }
        config.similarity_threshold = raw.similarity_threshold.unwrap_or(config.similarity_threshold);
        config.site_url = raw.site_url;
        config.suffixed_anchor_hosts = raw.suffixed_anchor_hosts;
        config.known_redirects = raw.redirects.into_iter().map(|r| return (r.from, r.to)).collect();

        config.fetch.attempts = raw.fetch.attempts.unwrap_or(config.fetch.attempts).max(1);
        config.fetch.manual_redirect = raw.fetch.manual_redirect;
        config.fetch.protected_hosts = raw.fetch.protected_hosts;
        if let Some(ms) = raw.fetch.retry_delay_ms {
            config.fetch.retry_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = raw.fetch.timeout_secs {
            config.fetch.timeout = Duration::from_secs(secs);
        }

        return Ok(config);
    }

    /// Whether a root-relative document path lies in the generated reference subtree.
    pub fn is_reference_path(&self, relative_path: &Path) -> bool {
        return relative_path.starts_with(&self.reference_dir);
    }

    /// Pick up the API token from the environment, ignoring empty values.
    #[must_use]
    pub fn with_token_from_env(mut self) -> Self {
        self.token = std::env::var(TOKEN_ENV).ok().filter(|t| return !t.trim().is_empty());
        return self;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.index_file, "README.md");
        assert!(!config.clean_urls);
        assert_eq!(config.fetch.attempts, 5);
        assert!(config.ignore.iter().any(|d| d == "node_modules"));
    }

    #[test]
    fn file_values_override_defaults() {
        let toml = r#"
clean_urls = true
index_file = "index.md"
similarity_threshold = 0.8

[fetch]
attempts = 2
retry_delay_ms = 0

[[redirects]]
from = "https://a.example/old"
to = "https://a.example/new"
"#;
        let config = Config::parse(Path::new("docs"), toml).unwrap();
        assert!(config.clean_urls);
        assert_eq!(config.index_file, "index.md");
        assert_eq!(config.fetch.attempts, 2);
        assert_eq!(config.fetch.retry_delay, Duration::ZERO);
        assert_eq!(config.known_redirects.len(), 1);
        assert!((config.similarity_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "clean_urls = \"yes\"").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }

    #[test]
    fn reference_paths_are_detected_by_prefix() {
        let config = Config::defaults(Path::new("."));
        assert!(config.is_reference_path(Path::new("reference/api.md")));
        assert!(!config.is_reference_path(Path::new("guide/reference.md")));
    }
}
