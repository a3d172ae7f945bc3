//! # Core Types
//!
//! Data structures shared between the registry, the round-robin router and
//! the HTTP surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A backend broker instance as advertised by the instance registry
///
/// The router only ever reads these. Both URLs are kept as raw strings because
/// registry data is not validated on ingestion; a malformed URL is detected
/// when a redirect to it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEndpoint {
    /// Unique instance identifier
    pub id: String,

    /// Plain HTTP base URL, e.g. `http://broker-1:8080`
    pub web_service_url: String,

    /// TLS base URL, e.g. `https://broker-1:8443`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_service_url_tls: Option<String>,
}

impl InstanceEndpoint {
    /// Create an instance that only advertises a plain endpoint
    pub fn new<I: Into<String>, U: Into<String>>(id: I, web_service_url: U) -> Self {
        Self {
            id: id.into(),
            web_service_url: web_service_url.into(),
            web_service_url_tls: None,
        }
    }

    /// Attach the TLS endpoint
    pub fn with_tls_url<U: Into<String>>(mut self, url: U) -> Self {
        self.web_service_url_tls = Some(url.into());
        self
    }

    /// Pick the base URL to redirect to for the given inbound scheme
    pub fn url_for(&self, scheme: RequestScheme) -> Option<&str> {
        match scheme {
            RequestScheme::Plain => Some(self.web_service_url.as_str()),
            RequestScheme::Encrypted => self.web_service_url_tls.as_deref(),
        }
    }
}

/// Scheme of an inbound request as seen by the redirect handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestScheme {
    Plain,
    Encrypted,
}

impl RequestScheme {
    /// Classify a URI scheme string (`http`, `https`, ...)
    pub fn from_scheme_str(scheme: &str) -> Self {
        if scheme.eq_ignore_ascii_case("https") {
            Self::Encrypted
        } else {
            Self::Plain
        }
    }
}

impl fmt::Display for RequestScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "http"),
            Self::Encrypted => write!(f, "https"),
        }
    }
}
