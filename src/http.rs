use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use std::time::Duration;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("static selector"));

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) infra-scan-rs/0.1";

/// Transport configuration. Redirects are never followed by the client:
/// the probe engine chases a single hop itself so that both the redirecting
/// endpoint and its destination are reported.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub custom_headers: Vec<(String, String)>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            proxy: None,
            custom_headers: Vec::new(),
        }
    }
}

/// Thin wrapper over a pooled reqwest client with the scanner's defaults.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(opts: &HttpOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &opts.custom_headers {
            let name: HeaderName = name
                .parse()
                .with_context(|| format!("invalid header name: {name}"))?;
            let value: HeaderValue = value
                .parse()
                .with_context(|| format!("invalid header value for {name}"))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .connect_timeout(opts.timeout)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .default_headers(headers);
        if let Some(proxy) = &opts.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy: {proxy}"))?,
            );
        }
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Issue a single GET. Any transport-level failure (refused, DNS,
    /// timeout) surfaces as an error; HTTP error statuses do not.
    pub async fn get(&self, url: &str, extra_headers: Option<&HeaderMap>) -> Result<HttpResponse> {
        let mut req = self.client.get(url);
        if let Some(h) = extra_headers {
            req = req.headers(h.clone());
        }
        let resp = req.send().await.with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        Ok(HttpResponse {
            status_code: status,
            headers,
            body,
        })
    }
}

/// A fully buffered HTTP response with the derived fields the enrichment
/// pipeline reads.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body length, preferring the Content-Length header when present.
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len() as u64)
    }

    /// `<title>` text with collapsed whitespace, empty when absent.
    pub fn title(&self) -> String {
        let doc = Html::parse_document(&self.text());
        doc.select(&TITLE_SELECTOR)
            .next()
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_body(body: &str) -> HttpResponse {
        HttpResponse {
            status_code: 200,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn title_is_extracted_and_trimmed() {
        let resp =
            response_with_body("<html><head><title>\n  Admin   Panel </title></head></html>");
        assert_eq!(resp.title(), "Admin Panel");
    }

    #[test]
    fn missing_title_is_empty() {
        let resp = response_with_body("<html><body>no head</body></html>");
        assert_eq!(resp.title(), "");
    }

    #[test]
    fn content_length_prefers_header() {
        let mut resp = response_with_body("abcdef");
        assert_eq!(resp.content_length(), 6);
        resp.headers
            .insert("content-length", HeaderValue::from_static("1234"));
        assert_eq!(resp.content_length(), 1234);
    }
}
