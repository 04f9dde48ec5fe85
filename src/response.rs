use reqwest::header::HeaderMap;
use reqwest::Url;
use scraper::Html;
use serde_json::Value;

/// One completed HTTP exchange, normalized for the extraction layers.
///
/// The body is parsed as JSON and as HTML up front; a body that is not
/// valid JSON simply yields `json == None`, and the HTML view is built
/// with a tolerant parser so malformed markup never fails here. Instances
/// are read-only; a retried request produces a fresh one.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Final URL of the exchange, after any redirects.
    pub url: Url,
    pub text: String,
    pub json: Option<Value>,
    html: Html,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HeaderMap, url: Url, text: String) -> Self {
        let json = serde_json::from_str(&text).ok();
        let html = Html::parse_document(&text);
        HttpResponse {
            status,
            headers,
            url,
            text,
            json,
            html,
        }
    }

    /// Parsed-HTML view of the body.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
