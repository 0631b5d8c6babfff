//! HTTP GET with bounded retries, per-request timeouts and manual redirect
//! inspection for a small set of URLs.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::config::FetchSettings;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("doclinks/", env!("CARGO_PKG_VERSION"));

/// URLs whose redirect is itself the meaningful content (sign-up flows and the like).
const MANUAL_REDIRECT_URLS: &[&str] = &["https://dash.deno.com/new", "https://dash.deno.com/signup"];

/// Hosts known to answer crawlers with a DDoS-protection challenge.
const PROTECTED_HOSTS: &[&str] = &["www.npmjs.com", "npmjs.com", "stackoverflow.com", "medium.com"];

/// One GET request as handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Follow 3xx responses natively.
    pub follow_redirects: bool,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Absolute URL.
    pub url: String,
}

/// A response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    /// Response body, empty when it isn't UTF-8 text.
    pub body: String,
    /// URL of the final response after any followed redirects.
    pub final_url: String,
    /// Header names lowercased.
    pub headers: BTreeMap<String, String>,
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase.
    pub status_text: String,
}

impl HttpResponse {
    /// Header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        return self.headers.get(name).map(String::as_str);
    }

    /// 2xx.
    pub const fn is_ok(&self) -> bool {
        return self.status >= 200 && self.status < 300;
    }

    /// 3xx.
    pub const fn is_redirect(&self) -> bool {
        return self.status >= 300 && self.status < 400;
    }
}

/// A failure below HTTP: DNS, TLS, connect, timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport: {0}")]
pub struct TransportError(
    /// Description from the HTTP stack.
    pub String,
);

/// The network capability the engine depends on.
pub trait HttpClient {
    /// Perform one GET. Non-2xx statuses are responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when no HTTP response was received.
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `ureq`-backed client with one agent that follows redirects and one that doesn't.
pub struct UreqClient {
    /// Agent with redirect following on.
    following: ureq::Agent,
    /// Agent that hands 3xx responses back.
    manual: ureq::Agent,
}

impl UreqClient {
    /// Build both agents with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let build = |max_redirects: u32| {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .max_redirects(max_redirects)
                .max_redirects_will_error(false)
                .user_agent(USER_AGENT)
                .build();
            return ureq::Agent::new_with_config(config);
        };
        return Self { following: build(10), manual: build(0) };
    }
}

impl HttpClient for UreqClient {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        use ureq::ResponseExt as _;

        let agent = if request.follow_redirects { &self.following } else { &self.manual };
        let mut builder = agent.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut response = builder.call().map_err(|e| return TransportError(e.to_string()))?;

        let status = response.status();
        let final_url = response.get_uri().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                return (name.as_str().to_ascii_lowercase(), value.to_str().unwrap_or_default().to_string());
            })
            .collect();
        let body = response.body_mut().read_to_string().unwrap_or_else(|e| {
            debug!(url = %request.url, error = %e, "response body is not readable text");
            return String::new();
        });

        return Ok(HttpResponse {
            body,
            final_url,
            headers,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }
}

/// Extra knobs for a single fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

/// Result of a fetch after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Whether the request ended somewhere other than where it started.
    pub redirected: bool,
    /// Where it ended (the request URL when not redirected).
    pub redirected_url: String,
    /// `None` when every attempt failed below HTTP. Not the same as a 4xx/5xx.
    pub response: Option<HttpResponse>,
}

/// Retrying GET on top of an [`HttpClient`].
#[derive(Clone)]
pub struct Fetcher<'a> {
    /// Network capability.
    client: &'a dyn HttpClient,
    /// Retry and per-host policy.
    settings: FetchSettings,
}

impl<'a> Fetcher<'a> {
    /// Wrap a client with the given policy.
    pub fn new(client: &'a dyn HttpClient, settings: FetchSettings) -> Self {
        return Self { client, settings };
    }

    /// Reason the response looks like a DDoS-protection challenge rather than
    /// the page itself, if it does.
    pub fn blocking_reason(&self, url: &str, response: &HttpResponse) -> Option<String> {
        if response.header("cf-mitigated").is_some_and(|v| return v.eq_ignore_ascii_case("challenge")) {
            return Some("blocked by a Cloudflare challenge".to_string());
        }
        let behind_protection = response
            .header("server")
            .is_some_and(|s| return s.to_ascii_lowercase().contains("cloudflare") || s.eq_ignore_ascii_case("ddos-guard"));
        if !behind_protection || !matches!(response.status, 403 | 429 | 503) {
            return None;
        }
        let host = Url::parse(url).ok().and_then(|u| return u.host_str().map(str::to_ascii_lowercase))?;
        let known = PROTECTED_HOSTS.iter().any(|h| return *h == host)
            || self.settings.protected_hosts.iter().any(|h| return h.eq_ignore_ascii_case(&host));
        if !known {
            return None;
        }
        return Some(format!("{host} answered {} from behind DDoS protection", response.status));
    }

    /// GET `url`, retrying transport failures and 408/5xx responses.
    ///
    /// Other non-OK statuses are returned at once: they are reported, not retried.
    /// When every attempt fails without a response, `response` is `None`.
    pub fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        let manual = self.needs_manual_redirect(url);
        let request = HttpRequest {
            follow_redirects: !manual,
            headers: options.headers.clone(),
            url: url.to_string(),
        };

        let attempts = self.settings.attempts.max(1);
        let mut last_response = None;
        for attempt in 1..=attempts {
            debug!(url, attempt, "fetching");
            match self.client.get(&request) {
                Ok(response) if response.status == 408 || response.status >= 500 => {
                    warn!(url, attempt, status = response.status, "retryable status");
                    last_response = Some(response);
                },
                Ok(response) => return outcome(url, manual, Some(response)),
                Err(e) => warn!(url, attempt, error = %e, "request failed"),
            }
            if attempt < attempts && !self.settings.retry_delay.is_zero() {
                std::thread::sleep(self.settings.retry_delay);
            }
        }

        if last_response.is_none() {
            warn!(url, attempts, "no response after all attempts");
        }
        return outcome(url, manual, last_response);
    }

    /// Whether `url` is on the built-in or configured manual-redirect list.
    fn needs_manual_redirect(&self, url: &str) -> bool {
        return MANUAL_REDIRECT_URLS.contains(&url) || self.settings.manual_redirect.iter().any(|u| return u == url);
    }
}

/// Synthesize the redirect fields from either the `Location` header (manual
/// mode) or the final URL (native following).
fn outcome(url: &str, manual: bool, response: Option<HttpResponse>) -> FetchOutcome {
    let Some(response) = response else {
        return FetchOutcome { redirected: false, redirected_url: url.to_string(), response: None };
    };

    let target = if manual {
        response
            .header("location")
            .filter(|_| return response.is_redirect())
            .map(|location| return resolve_location(url, location))
    } else if response.final_url.is_empty() || same_url(url, &response.final_url) {
        None
    } else {
        Some(response.final_url.clone())
    };

    return FetchOutcome {
        redirected: target.is_some(),
        redirected_url: target.unwrap_or_else(|| return url.to_string()),
        response: Some(response),
    };
}

/// Resolve a possibly relative `Location` against the request URL.
fn resolve_location(url: &str, location: &str) -> String {
    return Url::parse(url)
        .and_then(|base| return base.join(location))
        .map_or_else(|_err| return location.to_string(), |u| return u.to_string());
}

/// Equal after URL normalization.
fn same_url(a: &str, b: &str) -> bool {
    return match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    };
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted client for tests: canned responses per URL, call log.

    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Answers from a table; unknown URLs fail at transport level.
    #[derive(Default)]
    pub struct ScriptedClient {
        /// Every request seen, in order.
        pub calls: RefCell<Vec<HttpRequest>>,
        /// Queued answers per URL. The last one repeats.
        pub routes: RefCell<HashMap<String, Vec<Result<HttpResponse, TransportError>>>>,
    }

    impl ScriptedClient {
        /// How many requests went to `url`.
        pub fn count(&self, url: &str) -> usize {
            return self.calls.borrow().iter().filter(|r| return r.url == url).count();
        }

        /// Queue a transport failure for `url`.
        pub fn fail(&self, url: &str) {
            self.routes
                .borrow_mut()
                .entry(url.to_string())
                .or_default()
                .push(Err(TransportError("connection refused".into())));
        }

        /// Queue a 200 HTML page for `url`.
        pub fn page(&self, url: &str, body: &str) {
            self.respond(url, ok(url, body));
        }

        /// Queue an arbitrary response for `url`.
        pub fn respond(&self, url: &str, response: HttpResponse) {
            self.routes.borrow_mut().entry(url.to_string()).or_default().push(Ok(response));
        }
    }

    impl HttpClient for ScriptedClient {
        fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.borrow_mut().push(request.clone());
            let mut routes = self.routes.borrow_mut();
            let Some(queue) = routes.get_mut(&request.url) else {
                return Err(TransportError(format!("no route for {}", request.url)));
            };
            if queue.len() > 1 {
                return queue.remove(0);
            }
            return queue.first().cloned().unwrap_or_else(|| return Err(TransportError("empty route".into())));
        }
    }

    /// A 200 response served from `url`.
    pub fn ok(url: &str, body: &str) -> HttpResponse {
        return HttpResponse {
            body: body.to_string(),
            final_url: url.to_string(),
            status: 200,
            status_text: "OK".into(),
            ..HttpResponse::default()
        };
    }

    /// A response with the given status.
    pub fn status(url: &str, status: u16, text: &str) -> HttpResponse {
        return HttpResponse { final_url: url.to_string(), status, status_text: text.into(), ..HttpResponse::default() };
    }

    /// Settings without delays.
    pub fn fast_settings() -> FetchSettings {
        return FetchSettings { retry_delay: Duration::ZERO, ..FetchSettings::default() };
    }
}
