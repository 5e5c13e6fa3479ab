//! Structured request descriptor.
//!
//! A request is plain data, so the executor can replay it mechanically after a
//! token refresh instead of re-invoking caller code.

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;

/// HTTP methods used by the service API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// One API call: method, path relative to the base URL, query, JSON body,
/// and whether a bearer token must be attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub needs_auth: bool,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            needs_auth: true,
        }
    }

    /// Authorized GET
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Authorized POST
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Authorized PUT
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// Mark the request as not carrying a bearer token (sign-in endpoints)
    pub fn anonymous(mut self) -> Self {
        self.needs_auth = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body serialized from `body`
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::transport(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Full URL for this request against `base_url`
    pub fn url(&self, base_url: &str) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined)
            .map_err(|e| ApiError::transport(format!("Invalid request URL {}: {}", joined, e)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joins_base_and_path() {
        let req = ApiRequest::get("/bills/bill-categories");
        assert_eq!(
            req.url("https://example.com/api/v1/").unwrap().as_str(),
            "https://example.com/api/v1/bills/bill-categories"
        );
    }

    #[test]
    fn test_url_encodes_query() {
        let req = ApiRequest::get("payments/transaction-history")
            .query("page", 2)
            .query("page_size", 10)
            .query("search", "meter 42&x");
        assert_eq!(
            req.url("https://example.com").unwrap().as_str(),
            "https://example.com/payments/transaction-history?page=2&page_size=10&search=meter+42%26x"
        );
    }

    #[test]
    fn test_url_rejects_garbage_base() {
        let err = ApiRequest::get("x").url("not a url").unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
    }

    #[test]
    fn test_anonymous_clears_auth_flag() {
        let req = ApiRequest::post("user/authenticate").anonymous();
        assert!(!req.needs_auth);
        assert!(ApiRequest::get("user/profile").needs_auth);
    }

    #[test]
    fn test_json_body() {
        let req = ApiRequest::post("user/reset-password")
            .json(&json!({"email": "a@b.co"}))
            .unwrap();
        assert_eq!(req.body, Some(json!({"email": "a@b.co"})));
        assert_eq!(req.method.as_str(), "POST");
    }
}
