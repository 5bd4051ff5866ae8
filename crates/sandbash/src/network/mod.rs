//! Network seam
//!
//! The interpreter itself never performs network I/O; commands that want it
//! receive an optional [`NetworkAdapter`] through their execution context.
//! Access is deny-by-default: a URL must pass the [`NetworkAllowlist`]
//! before the adapter is consulted.

use async_trait::async_trait;
use std::collections::BTreeSet;
use url::Url;

use crate::error::Result;

/// An HTTP-ish request handed to the adapter after allowlist clearance.
#[derive(Debug, Clone)]
pub struct NetRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The adapter's response.
#[derive(Debug, Clone)]
pub struct NetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Host-provided network backend.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    async fn fetch(&self, request: NetRequest) -> Result<NetResponse>;
}

/// Adapter wrapper that consults the allowlist before every fetch.
/// Commands never see the raw adapter, so there is no bypass path.
pub struct GatedAdapter {
    inner: std::sync::Arc<dyn NetworkAdapter>,
    allowlist: NetworkAllowlist,
}

impl GatedAdapter {
    pub fn new(inner: std::sync::Arc<dyn NetworkAdapter>, allowlist: NetworkAllowlist) -> Self {
        Self { inner, allowlist }
    }
}

#[async_trait]
impl NetworkAdapter for GatedAdapter {
    async fn fetch(&self, request: NetRequest) -> Result<NetResponse> {
        match self.allowlist.check(&request.url) {
            UrlMatch::Allowed => self.inner.fetch(request).await,
            UrlMatch::Blocked { reason } | UrlMatch::Invalid { reason } => Err(
                crate::Error::Execution(format!("network access denied: {reason}")),
            ),
        }
    }
}

/// Result of matching a URL against the allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlMatch {
    Allowed,
    Blocked { reason: String },
    Invalid { reason: String },
}

/// URL allowlist; empty means everything is blocked.
///
/// A pattern is `scheme://host[:port][/path-prefix]`. A URL matches when
/// scheme, host, and port agree and the URL's path starts with the
/// pattern's path.
#[derive(Debug, Clone, Default)]
pub struct NetworkAllowlist {
    patterns: BTreeSet<String>,
    allow_all: bool,
}

impl NetworkAllowlist {
    /// An empty allowlist: every URL is blocked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow every URL. For tests and fully trusted scripts only.
    pub fn allow_all() -> Self {
        Self {
            patterns: BTreeSet::new(),
            allow_all: true,
        }
    }

    /// Add a URL pattern.
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.insert(pattern.into());
        self
    }

    /// Check a URL against the allowlist.
    pub fn check(&self, url: &str) -> UrlMatch {
        if self.allow_all {
            return UrlMatch::Allowed;
        }
        if self.patterns.is_empty() {
            return UrlMatch::Blocked {
                reason: "no URLs are allowed (empty allowlist)".to_string(),
            };
        }

        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return UrlMatch::Invalid {
                    reason: format!("invalid URL: {e}"),
                }
            }
        };

        for pattern in &self.patterns {
            let Ok(allowed) = Url::parse(pattern) else {
                continue;
            };
            if parsed.scheme() == allowed.scheme()
                && parsed.host_str() == allowed.host_str()
                && parsed.port_or_known_default() == allowed.port_or_known_default()
                && parsed.path().starts_with(allowed.path())
            {
                return UrlMatch::Allowed;
            }
        }
        UrlMatch::Blocked {
            reason: format!("{url} does not match any allowlist entry"),
        }
    }
}
