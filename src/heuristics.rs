//! Pure decisions about redirects and anchors that tolerate cosmetic differences.

use std::collections::BTreeSet;

use url::Url;

use crate::link::decode_anchor;

/// Redirect pairs that are known to be harmless.
const KNOWN_REDIRECTS: &[(&str, &str)] = &[
    ("https://github.com/new", "https://github.com/login?return_to=https%3A%2F%2Fgithub.com%2Fnew"),
    ("https://discord.gg/deno", "https://discord.com/invite/deno"),
    ("https://twitter.com/", "https://x.com/"),
];

/// Hosts that serve sign-in and sign-up flows.
const IDENTITY_HOSTS: &[&str] = &[
    "accounts.google.com",
    "auth0.com",
    "github.com",
    "gitlab.com",
    "login.live.com",
    "login.microsoftonline.com",
];

/// Path fragments that mark an authentication page.
const AUTH_PATH_MARKERS: &[&str] = &["login", "signin", "sign_in", "sign-in", "signup", "sign_up", "sign-up", "oauth"];

/// Hosts (or host suffixes) whose duplicate headings get `_N` ids after hydration.
const SUFFIXED_ANCHOR_HOSTS: &[&str] = &["readthedocs.io", "docs.python.org"];

/// Highest `_N` suffix probed for suffixed-anchor hosts.
const MAX_ANCHOR_SUFFIX: usize = 5;

/// Short-link hosts and the canonical host they expand to with a `v` query.
const SHORT_LINK_HOSTS: &[(&str, &str)] = &[("youtu.be", "youtube.com")];

/// Anchor rules with the user-configured host list on top of the built-in one.
#[derive(Debug, Clone, Default)]
pub struct AnchorRules {
    /// Extra suffixed-anchor hosts from the config.
    pub extra_suffixed_hosts: Vec<String>,
}

impl AnchorRules {
    /// Whether `anchor` is defined in `all_anchors`, directly, percent-decoded,
    /// or for a known lazily-hydrated host as `anchor_N`.
    pub fn is_valid_anchor(&self, all_anchors: &BTreeSet<String>, url: Option<&Url>, anchor: &str) -> bool {
        if all_anchors.contains(anchor) {
            return true;
        }
        let decoded = decode_anchor(anchor);
        if all_anchors.contains(&decoded) {
            return true;
        }
        let Some(host) = url.and_then(Url::host_str) else {
            return false;
        };
        if !self.has_suffixed_anchors(host) {
            return false;
        }
        return (1..=MAX_ANCHOR_SUFFIX).any(|i| return all_anchors.contains(&format!("{decoded}_{i}")));
    }

    /// Host match against built-in and configured suffixed-anchor hosts.
    fn has_suffixed_anchors(&self, host: &str) -> bool {
        let matches = |candidate: &str| return host == candidate || host.ends_with(&format!(".{candidate}"));
        return SUFFIXED_ANCHOR_HOSTS.iter().any(|h| return matches(*h))
            || self.extra_suffixed_hosts.iter().any(|h| return matches(h.as_str()));
    }
}

/// Redirect rules with the user-configured known pairs on top of the built-in table.
#[derive(Debug, Clone, Default)]
pub struct RedirectRules {
    /// Extra accepted (from, to) pairs from the config.
    pub known: Vec<(String, String)>,
}

impl RedirectRules {
    /// Whether redirecting from `from` to `to` is an acceptable evolution of the link.
    ///
    /// The decision table runs against `from` as written, then with `www.`
    /// added to its host, then with `http` upgraded to `https`.
    pub fn is_valid_redirection(&self, from: &str, to: &str) -> bool {
        if self.passes(from, to) {
            return true;
        }
        let (Ok(from_url), Ok(to_url)) = (Url::parse(from), Url::parse(to)) else {
            return false;
        };
        if let Some(with_www) = with_www_host(&from_url)
            && self.passes(with_www.as_str(), to)
        {
            return true;
        }
        if from_url.scheme() == "http" {
            let mut upgraded = from_url.clone();
            if upgraded.set_scheme("https").is_ok() && self.passes(upgraded.as_str(), to_url.as_str()) {
                return true;
            }
        }
        return false;
    }

    /// One pass of the decision table.
    fn passes(&self, from: &str, to: &str) -> bool {
        if from == to || self.is_known_pair(from, to) {
            return true;
        }
        let (Ok(from_url), Ok(to_url)) = (Url::parse(from), Url::parse(to)) else {
            return false;
        };
        return from_url == to_url
            || is_pinned_version(&from_url, &to_url)
            || is_versioned_manual(&from_url, &to_url)
            || is_short_link_expansion(&from_url, &to_url)
            || is_trailing_slash_only(&from_url, &to_url)
            || is_query_only(&from_url, &to_url)
            || is_auth_redirect(&to_url);
    }

    /// Exact lookup in the built-in and configured override tables.
    fn is_known_pair(&self, from: &str, to: &str) -> bool {
        return KNOWN_REDIRECTS.iter().any(|(f, t)| return *f == from && *t == to)
            || self.known.iter().any(|(f, t)| return f == from && t == to);
    }
}

/// Target is a sign-in or sign-up page on an identity provider.
fn is_auth_redirect(to: &Url) -> bool {
    let Some(host) = to.host_str() else { return false };
    let host = host.trim_start_matches("www.");
    if !IDENTITY_HOSTS.iter().any(|h| return host == *h || host.ends_with(&format!(".{h}"))) {
        return false;
    }
    let path = to.path().to_ascii_lowercase();
    return AUTH_PATH_MARKERS.iter().any(|marker| return path.contains(marker));
}

/// Looks like a version qualifier: `1.2.3`, `v2`, `0.200.0`.
fn is_version(text: &str) -> bool {
    let digits = text.strip_prefix('v').unwrap_or(text);
    return !digits.is_empty()
        && digits.starts_with(|c: char| return c.is_ascii_digit())
        && digits.chars().all(|c| return c.is_ascii_alphanumeric() || c == '.' || c == '-');
}

/// Package registry: exactly one path segment gained an `@version` qualifier.
fn is_pinned_version(from: &Url, to: &Url) -> bool {
    if !same_origin(from, to) || from.query() != to.query() {
        return false;
    }
    let from_segments: Vec<&str> = from.path().split('/').collect();
    let to_segments: Vec<&str> = to.path().split('/').collect();
    if from_segments.len() != to_segments.len() {
        return false;
    }
    let mut pinned = 0_usize;
    for (f, t) in from_segments.iter().zip(&to_segments) {
        if f == t {
            continue;
        }
        let Some(version) = t.strip_prefix(*f).and_then(|rest| return rest.strip_prefix('@')) else {
            return false;
        };
        if !is_version(version) {
            return false;
        }
        pinned = pinned.saturating_add(1);
    }
    return pinned == 1;
}

/// Unversioned manual links landing on `/manual@vX.Y.Z/...` with the same remainder.
fn is_versioned_manual(from: &Url, to: &Url) -> bool {
    let Some(rest) = from.path().strip_prefix("/manual") else { return false };
    let Some(versioned) = to.path().strip_prefix("/manual@") else { return false };
    let (version, to_rest) = versioned.split_once('/').unwrap_or((versioned, ""));
    let to_rest = if to_rest.is_empty() { String::new() } else { format!("/{to_rest}") };
    return is_version(version) && rest.trim_end_matches('/') == to_rest.trim_end_matches('/');
}

/// Query strings differ, scheme, host and path do not.
fn is_query_only(from: &Url, to: &Url) -> bool {
    return same_origin(from, to) && from.path() == to.path() && from.query() != to.query();
}

/// Same scheme, host and port.
fn same_origin(from: &Url, to: &Url) -> bool {
    return from.scheme() == to.scheme() && from.host_str() == to.host_str() && from.port() == to.port();
}

/// `youtu.be/ID` expanding to `youtube.com/watch?v=ID`.
fn is_short_link_expansion(from: &Url, to: &Url) -> bool {
    let (Some(from_host), Some(to_host)) = (from.host_str(), to.host_str()) else {
        return false;
    };
    let to_host = to_host.trim_start_matches("www.").trim_start_matches("m.");
    let Some((_, canonical)) = SHORT_LINK_HOSTS.iter().find(|(short, _)| return *short == from_host) else {
        return false;
    };
    if to_host != *canonical {
        return false;
    }
    let id = from.path().trim_matches('/');
    return !id.is_empty() && to.query_pairs().any(|(key, value)| return key == "v" && value == id);
}

/// Paths differ only by a trailing slash.
fn is_trailing_slash_only(from: &Url, to: &Url) -> bool {
    return same_origin(from, to)
        && from.query() == to.query()
        && from.path() != to.path()
        && from.path().trim_end_matches('/') == to.path().trim_end_matches('/');
}

/// `from` with `www.` prepended to its host, if it doesn't already have one.
fn with_www_host(from: &Url) -> Option<Url> {
    let host = from.host_str()?;
    if host.starts_with("www.") || from.host().is_some_and(|h| return !matches!(h, url::Host::Domain(_))) {
        return None;
    }
    let mut url = from.clone();
    url.set_host(Some(&format!("www.{host}"))).ok()?;
    return Some(url);
}
