use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::proxy_pool::ProxyPool;
use crate::response::HttpResponse;

/// User agents to rotate through to avoid bot detection
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

/// Per-call request parameters. `..Default::default()` fills the rest.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub method: Method,
    /// Full header override; when unset the client defaults (plus any
    /// absorbed cookies) are sent.
    pub headers: Option<HeaderMap>,
    pub params: Option<Vec<(String, String)>>,
    pub form: Option<Vec<(String, String)>>,
    pub json: Option<Value>,
    /// Explicit proxy URL for this call; disables rotation.
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    /// Initial attempt count, counted against the retry ceiling.
    pub retries: u32,
    /// Sleep for `Retry-After` and retry on 429 instead of failing.
    pub ratelimit_retry: bool,
    pub ignore_set_cookie: bool,
    /// Pick proxies from the pool. On by default; explicit/default proxies
    /// are used as-is when off.
    pub use_pool: bool,
    /// Extra 5xx statuses to pass through, merged with the client's list.
    pub ignore_codes: Vec<u16>,
    /// Transport session for this call, reused instead of the client's own.
    pub session: Option<reqwest::Client>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            url: None,
            method: Method::GET,
            headers: None,
            params: None,
            form: None,
            json: None,
            proxy: None,
            timeout: None,
            retries: 0,
            ratelimit_retry: false,
            ignore_set_cookie: false,
            use_pool: true,
            ignore_codes: Vec::new(),
            session: None,
        }
    }
}

/// HTTP client with proxy rotation, rate-limit handling and bounded retries.
///
/// One logical request is an explicit loop: each iteration checks the retry
/// budget, resolves a proxy (excluding ones that already failed in this
/// chain), dispatches, scores the proxy, and decides between returning,
/// backing off on a transient server error, or handling a 429. Retry state
/// is local to the call, so concurrent requests never share counters.
pub struct HttpClient {
    config: ClientConfig,
    transport: reqwest::Client,
    default_headers: Mutex<HeaderMap>,
    pool: Mutex<ProxyPool>,
}

impl HttpClient {
    pub fn new() -> Result<Self, Error> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, Error> {
        let transport = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout())
            .build()?;
        Self::with_transport(config, transport)
    }

    /// Build around an externally supplied transport session.
    pub fn with_transport(config: ClientConfig, transport: reqwest::Client) -> Result<Self, Error> {
        let default_headers = build_default_headers(&config)?;
        Ok(HttpClient {
            config,
            transport,
            default_headers: Mutex::new(default_headers),
            pool: Mutex::new(ProxyPool::new()),
        })
    }

    pub fn with_pool(self, pool: ProxyPool) -> Self {
        HttpClient {
            pool: Mutex::new(pool),
            ..self
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Mutex<ProxyPool> {
        &self.pool
    }

    /// Snapshot of the default headers, including absorbed cookies.
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers.lock().unwrap().clone()
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, Error> {
        self.request(RequestOptions {
            url: Some(url.to_string()),
            ..RequestOptions::default()
        })
        .await
    }

    pub async fn post(&self, url: &str) -> Result<HttpResponse, Error> {
        self.request(RequestOptions {
            url: Some(url.to_string()),
            method: Method::POST,
            ..RequestOptions::default()
        })
        .await
    }

    pub async fn put(&self, url: &str) -> Result<HttpResponse, Error> {
        self.request(RequestOptions {
            url: Some(url.to_string()),
            method: Method::PUT,
            ..RequestOptions::default()
        })
        .await
    }

    pub async fn delete(&self, url: &str) -> Result<HttpResponse, Error> {
        self.request(RequestOptions {
            url: Some(url.to_string()),
            method: Method::DELETE,
            ..RequestOptions::default()
        })
        .await
    }

    /// Execute one logical request with retry, backoff and proxy rotation.
    pub async fn request(&self, options: RequestOptions) -> Result<HttpResponse, Error> {
        let url = self.resolve_url(options.url.as_deref())?;
        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());
        let mut ignore_codes = self.config.ignore_codes.clone();
        ignore_codes.extend(&options.ignore_codes);

        let mut attempt = options.retries;
        let mut excluded: Vec<String> = Vec::new();
        let mut last_status: Option<u16> = None;

        loop {
            if attempt > self.config.max_retries {
                return Err(Error::TooManyRetries {
                    url,
                    attempts: attempt,
                    last_status,
                });
            }

            let (proxy_url, picked_from_pool) = self.select_proxy(&options, &excluded);

            let transport = match &proxy_url {
                Some(proxy) => self.proxied_transport(proxy, timeout)?,
                None => options
                    .session
                    .clone()
                    .unwrap_or_else(|| self.transport.clone()),
            };

            let headers = match &options.headers {
                Some(map) => map.clone(),
                None => self.default_headers.lock().unwrap().clone(),
            };

            let mut request = transport
                .request(options.method.clone(), url.as_str())
                .headers(headers)
                .timeout(timeout);
            if let Some(params) = &options.params {
                request = request.query(params);
            }
            if let Some(form) = &options.form {
                request = request.form(form);
            }
            if let Some(json) = &options.json {
                request = request.json(json);
            }

            let raw = request.send().await?;
            let status = raw.status().as_u16();
            let response_headers = raw.headers().clone();
            let final_url = raw.url().clone();
            let text = raw.text().await?;
            let response = HttpResponse::new(status, response_headers, final_url, text);

            if let Some(proxy) = &proxy_url {
                self.score_proxy(proxy);
            }
            last_status = Some(response.status);

            if response.status >= 500 && !ignore_codes.contains(&response.status) {
                log::warn!(
                    "{} returned {}, retrying (attempt {} of {})",
                    url,
                    response.status,
                    attempt + 1,
                    self.config.max_retries + 1,
                );
                sleep(self.config.retry_backoff()).await;
                attempt += 1;
                if picked_from_pool {
                    self.exclude_proxy(&mut excluded, proxy_url);
                }
                continue;
            }

            if response.status == 429 {
                let retry_after = response
                    .header("retry-after")
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(1.0);
                if !options.ratelimit_retry {
                    return Err(Error::RateLimited { url, retry_after });
                }
                log::warn!("{} rate limited, sleeping {}s", url, retry_after);
                sleep(Duration::from_secs_f64(retry_after)).await;
                attempt += 1;
                if picked_from_pool {
                    self.exclude_proxy(&mut excluded, proxy_url);
                }
                continue;
            }

            if !options.ignore_set_cookie {
                self.absorb_cookies(&response.headers);
            }

            return Ok(response);
        }
    }

    fn resolve_url(&self, url: Option<&str>) -> Result<String, Error> {
        let url = url.filter(|u| !u.is_empty()).ok_or(Error::MissingUrl)?;
        let url = url.replace(' ', "%20");
        if url.starts_with("http") {
            Ok(url)
        } else {
            let base = self.config.base_url.as_deref().unwrap_or("https://");
            Ok(format!("{base}{url}"))
        }
    }

    /// Choose the proxy for one attempt. Returns the connection URL and
    /// whether it came from the pool (only pool picks are excluded and
    /// scored on retry).
    fn select_proxy(&self, options: &RequestOptions, excluded: &[String]) -> (Option<String>, bool) {
        if let Some(explicit) = &options.proxy {
            return (Some(explicit.clone()), false);
        }
        if !options.use_pool {
            return (self.config.default_proxy.clone(), false);
        }
        let mut pool = self.pool.lock().unwrap();
        if pool.is_empty() {
            return (self.config.default_proxy.clone(), false);
        }
        match pool.pick(excluded) {
            Some(proxy) => {
                proxy.mark_used();
                (Some(proxy.url()), true)
            }
            None => (self.config.default_proxy.clone(), false),
        }
    }

    fn proxied_transport(&self, proxy_url: &str, timeout: Duration) -> Result<reqwest::Client, Error> {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| Error::InvalidProxy(format!("{proxy_url}: {e}")))?;
        // TLS terminates at the proxy for proxied traffic
        let transport = reqwest::Client::builder()
            .proxy(proxy)
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .build()?;
        Ok(transport)
    }

    /// Record elapsed time since the proxy was marked used as its latency,
    /// when the pool tracks it.
    fn score_proxy(&self, proxy_url: &str) {
        let mut pool = self.pool.lock().unwrap();
        if let Some(tracked) = pool.get_by_url(proxy_url) {
            if let Some(marked) = tracked.last_used {
                tracked.latency = Some(marked.elapsed().as_millis() as u64);
            }
        }
    }

    fn exclude_proxy(&self, excluded: &mut Vec<String>, proxy_url: Option<String>) {
        let Some(url) = proxy_url else { return };
        let pool = self.pool.lock().unwrap();
        if pool.len() > 1 && !excluded.contains(&url) {
            excluded.push(url);
        }
    }

    /// Fold `Set-Cookie` values into the default `Cookie` header so later
    /// calls on this client carry the session.
    fn absorb_cookies(&self, headers: &HeaderMap) {
        let incoming: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter(|pair| pair.contains('='))
            .collect();
        if incoming.is_empty() {
            return;
        }
        let mut defaults = self.default_headers.lock().unwrap();
        let existing = defaults
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let merged = merge_cookies(existing, &incoming);
        if let Ok(value) = HeaderValue::from_str(&merged) {
            defaults.insert(COOKIE, value);
        }
    }
}

fn build_default_headers(config: &ClientConfig) -> Result<HeaderMap, Error> {
    let mut headers = config.headers.to_header_map()?;
    if !headers.contains_key(USER_AGENT) {
        let agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent)
                .map_err(|e| Error::InvalidHeader(format!("user_agent: {e}")))?,
        );
    }
    Ok(headers)
}

/// Merge incoming `name=value` cookie pairs into an existing `Cookie`
/// header value, replacing same-named cookies.
fn merge_cookies(existing: &str, incoming: &[&str]) -> String {
    let mut pairs: Vec<(String, String)> = existing
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    for cookie in incoming {
        let Some((name, value)) = cookie.trim().split_once('=') else {
            continue;
        };
        match pairs.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => pairs.push((name.to_string(), value.to_string())),
        }
    }
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent() {
        let ua1 = random_user_agent();
        let ua2 = random_user_agent();
        assert!(USER_AGENTS.contains(&ua1));
        assert!(USER_AGENTS.contains(&ua2));
    }

    #[test]
    fn test_default_options() {
        let options = RequestOptions::default();
        assert!(options.use_pool);
        assert!(!options.ratelimit_retry);
        assert_eq!(options.method, Method::GET);
        assert_eq!(options.retries, 0);
    }

    #[test]
    fn test_resolve_url() {
        let client = HttpClient::new().unwrap();
        assert!(matches!(
            client.resolve_url(None),
            Err(Error::MissingUrl)
        ));
        assert!(matches!(
            client.resolve_url(Some("")),
            Err(Error::MissingUrl)
        ));
        assert_eq!(
            client.resolve_url(Some("http://a.b/c d")).unwrap(),
            "http://a.b/c%20d"
        );
        // no base url configured: relative paths get a scheme prefix
        assert_eq!(
            client.resolve_url(Some("shikimori.one/api")).unwrap(),
            "https://shikimori.one/api"
        );

        let config = ClientConfig {
            base_url: Some("https://animego.org/".to_string()),
            ..ClientConfig::default()
        };
        let client = HttpClient::with_config(config).unwrap();
        assert_eq!(
            client.resolve_url(Some("search/all")).unwrap(),
            "https://animego.org/search/all"
        );
        assert_eq!(
            client.resolve_url(Some("https://other.site/x")).unwrap(),
            "https://other.site/x"
        );
    }

    #[test]
    fn test_default_headers_have_user_agent() {
        let client = HttpClient::new().unwrap();
        let headers = client.default_headers();
        assert!(headers.contains_key(USER_AGENT));

        let config = ClientConfig {
            user_agent: Some("moe-scraper/0.1".to_string()),
            ..ClientConfig::default()
        };
        let client = HttpClient::with_config(config).unwrap();
        assert_eq!(
            client.default_headers().get(USER_AGENT).unwrap(),
            "moe-scraper/0.1"
        );
    }

    #[test]
    fn test_merge_cookies() {
        assert_eq!(merge_cookies("", &["sid=abc"]), "sid=abc");
        assert_eq!(merge_cookies("sid=abc", &["lang=en"]), "sid=abc; lang=en");
        // same-named cookies are replaced, not duplicated
        assert_eq!(
            merge_cookies("sid=abc; lang=en", &["sid=def"]),
            "sid=def; lang=en"
        );
    }

    #[test]
    fn test_exclusion_requires_multiple_proxies() {
        let client = HttpClient::new().unwrap();
        {
            let mut pool = client.pool().lock().unwrap();
            pool.add_url("http://1.1.1.1:8080").unwrap();
        }
        let mut excluded = Vec::new();
        client.exclude_proxy(&mut excluded, Some("http://1.1.1.1:8080".to_string()));
        assert!(excluded.is_empty());

        {
            let mut pool = client.pool().lock().unwrap();
            pool.add_url("http://2.2.2.2:8080").unwrap();
        }
        client.exclude_proxy(&mut excluded, Some("http://1.1.1.1:8080".to_string()));
        assert_eq!(excluded, ["http://1.1.1.1:8080"]);
    }
}
