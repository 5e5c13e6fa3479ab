//! Payment-completion detection for the embedded browser.
//!
//! Browsers expose two hooks around the same navigation: a "state changed"
//! observer and a "should start load" interceptor. Both go through
//! [`CallbackMatcher::decide`], so a platform that only fires one of them still
//! completes the payment.

use reqwest::Url;

use crate::config::WorkflowConfig;

/// What the browser should do with a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserDecision {
    /// Let the browser load the page
    Allow,
    /// Payment finished; stop loading and close the browser
    Intercept,
}

/// Recognises the gateway's success callback URL
#[derive(Debug, Clone)]
pub struct CallbackMatcher {
    host: String,
    path: String,
}

impl CallbackMatcher {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            host: host.into().to_ascii_lowercase(),
            path,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(&config.callback_host, &config.callback_path)
    }

    /// Whether `url` is the success callback
    pub fn is_callback(&self, url: &str) -> bool {
        match Url::parse(url.trim()) {
            Ok(parsed) => {
                let host_matches = parsed.host_str().is_some_and(|host| {
                    let host = host.to_ascii_lowercase();
                    host == self.host || host.ends_with(&format!(".{}", self.host))
                });
                host_matches && parsed.path().starts_with(&self.path)
            }
            // Some webviews report partial URLs
            Err(_) => url.contains(&format!("{}{}", self.host, self.path)),
        }
    }

    pub fn decide(&self, url: &str) -> BrowserDecision {
        if self.is_callback(url) {
            BrowserDecision::Intercept
        } else {
            BrowserDecision::Allow
        }
    }
}
