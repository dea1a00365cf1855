//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The core
//! crate builds `HttpRequest` values and parses `HttpResponse` values without
//! ever touching the network; the caller (host) executes the actual I/O.
//!
//! Query parameters are kept as a separate, sorted list of pairs rather than
//! baked into `path`, so hosts can hand them to their HTTP client's own
//! encoder and tests can compare them without decoding a URL.

use url::Url;

use crate::error::{ApiError, ApiResult};

/// Header the delivery API uses to identify a request in its logs.
pub const REQUEST_ID_HEADER: &str = "x-contentful-request-id";

/// HTTP method for a request. The delivery API is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL without the query string.
    pub path: String,
    /// Query parameters in a stable order.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub(crate) fn get(path: String, query: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            query,
            headers: vec![("accept".to_string(), "application/json".to_string())],
        }
    }

    /// The full URL with the query string percent-encoded.
    pub fn url(&self) -> ApiResult<String> {
        let mut url = Url::parse(&self.path).map_err(|e| ApiError::Config(e.to_string()))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url.to_string())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the caller after executing an `HttpRequest`, then passed
/// to `DeliveryClient::parse_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_query_pairs() {
        let req = HttpRequest::get(
            "https://cdn.example.net/spaces/cfexampleapi/entries".to_string(),
            vec![
                ("fields.description[match]".to_string(), "bacon pancakes".to_string()),
                ("sys.id[in]".to_string(), "finn,jake".to_string()),
            ],
        );
        assert_eq!(
            req.url().unwrap(),
            "https://cdn.example.net/spaces/cfexampleapi/entries?fields.description%5Bmatch%5D=bacon+pancakes&sys.id%5Bin%5D=finn%2Cjake"
        );
        assert_eq!(req.query_param("sys.id[in]"), Some("finn,jake"));
        assert_eq!(req.query_param("limit"), None);
    }

    #[test]
    fn url_without_query_has_no_question_mark() {
        let req = HttpRequest::get("http://localhost:3000/spaces/x".to_string(), Vec::new());
        assert_eq!(req.url().unwrap(), "http://localhost:3000/spaces/x");
        assert_eq!(req.method.as_str(), "GET");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("X-Contentful-Request-Id".to_string(), "abc".to_string())],
            body: String::new(),
        };
        assert_eq!(response.header(REQUEST_ID_HEADER), Some("abc"));
        assert_eq!(response.header("etag"), None);
    }
}
