//! Host allow-listing for outbound gateway calls.
//!
//! Every absolute URL is checked before any network I/O. A rejection is
//! terminal: it is never retried and never triggers a session refresh.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::GatewayError;

/// Predicate deciding whether a URL may be called.
///
/// Implementations must be pure: the answer depends only on the URL and the
/// statically configured policy.
pub trait HostPolicy: Send + Sync {
    /// Returns `true` if `url` may be requested
    fn is_allowed_host(&self, url: &str) -> bool;
}

/// One permitted `scheme://host[:port]` origin.
///
/// Without an explicit port only the scheme's default port matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl AllowedOrigin {
    /// Creates an origin from its parts; scheme and host are lowercased
    #[must_use]
    pub fn new(scheme: &str, host: &str, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Extracts the origin of an absolute URL
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        Some(Self::new(url.scheme(), host, url.port()))
    }

    fn matches(&self, url: &Url) -> bool {
        if url.scheme() != self.scheme {
            return false;
        }
        if !url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&self.host)) {
            return false;
        }
        match self.port {
            Some(port) => url.port_or_known_default() == Some(port),
            None => url.port().is_none(),
        }
    }
}

impl fmt::Display for AllowedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{port}", self.scheme, self.host),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Error returned when an allow-list entry cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid allowed origin `{0}`")]
pub struct InvalidOrigin(pub String);

impl FromStr for AllowedOrigin {
    type Err = InvalidOrigin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Url::parse(trimmed)
            .ok()
            .filter(|u| u.path() == "/" || u.path().is_empty())
            .and_then(|u| Self::from_url(&u))
            .ok_or_else(|| InvalidOrigin(trimmed.to_string()))
    }
}

/// Static list of permitted origins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    origins: Vec<AllowedOrigin>,
}

impl AllowList {
    /// Creates an allow-list from origins
    #[must_use]
    pub fn new(origins: impl IntoIterator<Item = AllowedOrigin>) -> Self {
        let mut list = Self::default();
        for origin in origins {
            list.push(origin);
        }
        list
    }

    /// Parses a comma-separated list of origins, skipping invalid entries
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        let origins = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|entry| match entry.parse::<AllowedOrigin>() {
                Ok(origin) => Some(origin),
                Err(e) => {
                    tracing::warn!(%e, "skipping allow-list entry");
                    None
                }
            });
        Self::new(origins)
    }

    /// Adds an origin if not already present
    pub fn push(&mut self, origin: AllowedOrigin) {
        if !self.origins.contains(&origin) {
            self.origins.push(origin);
        }
    }

    /// The configured origins
    #[must_use]
    pub fn origins(&self) -> &[AllowedOrigin] {
        &self.origins
    }

    /// Returns `true` when nothing is allowed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl HostPolicy for AllowList {
    fn is_allowed_host(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        // Embedded credentials are never legitimate for gateway calls
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return false;
        }
        self.origins.iter().any(|o| o.matches(&parsed))
    }
}

impl<F> HostPolicy for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed_host(&self, url: &str) -> bool {
        self(url)
    }
}

/// Rejects `url` with a security violation unless `policy` allows it
pub(crate) fn ensure_allowed(policy: &dyn HostPolicy, url: &str) -> Result<(), GatewayError> {
    if policy.is_allowed_host(url) {
        return Ok(());
    }
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    tracing::warn!(host = %host, "request blocked by host allow-list");
    Err(GatewayError::security_violation(url))
}
