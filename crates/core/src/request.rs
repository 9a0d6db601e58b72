//! Requests, responses and the identifiers they are cached under.

use bytes::Bytes;
use url::Url;

use crate::Error;
use crate::cache::hash::compute_cache_key;

/// Resolve a resource identifier against the application origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join relative identifiers onto `origin`; absolute ones replace it
/// 3. Require an http(s) scheme
/// 4. Remove fragment (#...)
/// 5. Keep path and query string intact (case-sensitive, not reordered)
pub fn resolve(origin: &Url, identifier: &str) -> Result<Url, Error> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty resource identifier".into()));
    }

    let mut url = origin
        .join(trimmed)
        .map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    url.set_fragment(None);
    Ok(url)
}

/// An outbound request made by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self { method: method.into().to_ascii_uppercase(), url, headers: Vec::new() }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// The identifier this request is stored under.
    pub fn key(&self) -> RequestKey {
        RequestKey { method: self.method.clone(), url: self.url.clone() }
    }
}

/// Identifies one entry within a generation: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: Url,
}

impl RequestKey {
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url }
    }

    /// Stable hex digest used as the storage key.
    pub fn digest(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}

/// A network response as seen by the agent.
///
/// Deliberately not `Clone`: a response headed to both the caller and the
/// store is split with [`Response::duplicate`] before either side reads it.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Produce an independent copy of this response.
    ///
    /// `Bytes` is reference counted, so the body buffer is shared rather
    /// than copied.
    pub fn duplicate(&self) -> Self {
        Self {
            url: self.url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Whether the status is in the 200-299 range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
