use thiserror::Error;

/// Errors surfaced by the scraping client.
///
/// Proxy validation failures are intentionally absent: the pool reports
/// those as `None`/`false` so a dead proxy can never abort a caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The retry ceiling for one logical request was exhausted.
    #[error("too many retries for {url}: gave up after {attempts} attempts (last status: {last_status:?})")]
    TooManyRetries {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
    },

    /// No URL could be resolved from the request arguments.
    #[error("no request url: set RequestOptions::url or use get/post/put/delete")]
    MissingUrl,

    /// The server answered 429 and automatic handling is disabled.
    #[error("rate limited by {url}, retry after {retry_after}s; set RequestOptions::ratelimit_retry to sleep and retry automatically")]
    RateLimited { url: String, retry_after: f64 },

    /// A proxy URL could not be parsed into a usable endpoint.
    #[error("invalid proxy url: {0}")]
    InvalidProxy(String),

    /// A configured header name or value is not a legal HTTP header.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Malformed configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport-level failure (DNS, connect, timeout), passed through
    /// unchanged from the HTTP stack.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
