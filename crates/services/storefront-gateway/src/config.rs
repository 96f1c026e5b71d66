use std::collections::BTreeMap;

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::security::{AllowList, AllowedOrigin, HostPolicy};
use crate::url_builder::{QueryParams, build_url};

/// Default gateway base URL
pub const GATEWAY_DEFAULT_BASE: &str = "http://localhost:8080";
/// Service name of the authentication backend
pub const SERVICE_AUTH: &str = "auth";
/// Default refresh path on the auth service
pub const DEFAULT_REFRESH_PATH: &str = "/refresh";

/// Environment variable holding the gateway base URL
pub const ENV_BASE_URL: &str = "GATEWAY_BASE_URL";
/// Environment variable holding the auth service base URL
pub const ENV_AUTH_BASE_URL: &str = "GATEWAY_AUTH_BASE_URL";
/// Environment variable holding comma-separated allowed origins
pub const ENV_ALLOWED_ORIGINS: &str = "GATEWAY_ALLOWED_ORIGINS";

/// Helper to read and normalize an env var (trim + filter empty).
fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration for the gateway client.
///
/// Unless an allow-list is set explicitly, it is derived from the origins of
/// the configured base URLs and kept in sync as bases change.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "GatewaySettings")]
pub struct GatewayConfig {
    api_base: String,
    services: BTreeMap<String, String>,
    refresh_path: String,
    allow_list: AllowList,
    explicit_allow_list: bool,
    headers: HeaderMap,
}

/// Deserializable form of [`GatewayConfig`], e.g. a section of an app config file
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewaySettings {
    /// Gateway base URL
    pub api_base: Option<String>,
    /// Auth service base URL
    pub auth_base: Option<String>,
    /// Additional named service bases
    pub services: BTreeMap<String, String>,
    /// Allowed origins (`scheme://host[:port]`); empty means derive from bases
    pub allowed_origins: Vec<String>,
    /// Refresh path on the auth service
    pub refresh_path: Option<String>,
}

impl From<GatewaySettings> for GatewayConfig {
    fn from(s: GatewaySettings) -> Self {
        let api_base = s.api_base.unwrap_or_else(|| GATEWAY_DEFAULT_BASE.into());
        let mut cfg = Self::bare(api_base, s.auth_base);
        for (name, base) in s.services {
            cfg = cfg.with_service(name, base);
        }
        if let Some(path) = s.refresh_path {
            cfg.refresh_path = path;
        }
        if !s.allowed_origins.is_empty() {
            cfg = cfg.with_allow_list(AllowList::parse_lenient(&s.allowed_origins.join(",")));
        }
        cfg
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let api_base = env_trimmed(ENV_BASE_URL).unwrap_or_else(|| GATEWAY_DEFAULT_BASE.into());
        let cfg = Self::bare(api_base, env_trimmed(ENV_AUTH_BASE_URL));

        match env_trimmed(ENV_ALLOWED_ORIGINS) {
            Some(raw) => cfg.with_allow_list(AllowList::parse_lenient(&raw)),
            None => cfg,
        }
    }
}

impl GatewayConfig {
    /// Creates a new configuration with default settings
    ///
    /// Reads from environment variables:
    /// - `GATEWAY_BASE_URL` for the gateway base (defaults to `http://localhost:8080`)
    /// - `GATEWAY_AUTH_BASE_URL` for the auth service (defaults to `<base>/auth`)
    /// - `GATEWAY_ALLOWED_ORIGINS` for the allow-list (defaults to the bases' origins)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for `base` without consulting the environment
    #[must_use]
    pub fn from_base(base: impl Into<String>) -> Self {
        Self::bare(base.into(), None)
    }

    fn bare(api_base: String, auth_base: Option<String>) -> Self {
        let auth_base =
            auth_base.unwrap_or_else(|| build_url(&api_base, SERVICE_AUTH, &QueryParams::new()));
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut cfg = Self {
            api_base,
            services: BTreeMap::from([(SERVICE_AUTH.to_string(), auth_base)]),
            refresh_path: DEFAULT_REFRESH_PATH.into(),
            allow_list: AllowList::default(),
            explicit_allow_list: false,
            headers,
        };
        cfg.derive_allow_list();
        cfg
    }

    fn derive_allow_list(&mut self) {
        if self.explicit_allow_list {
            return;
        }
        let origins = std::iter::once(&self.api_base)
            .chain(self.services.values())
            .filter_map(|base| url::Url::parse(base).ok())
            .filter_map(|u| AllowedOrigin::from_url(&u));
        self.allow_list = AllowList::new(origins);
    }

    /// Sets the gateway base URL
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self.derive_allow_list();
        self
    }

    /// Sets the auth service base URL
    #[must_use]
    pub fn with_auth_base(self, base: impl Into<String>) -> Self {
        self.with_service(SERVICE_AUTH, base)
    }

    /// Routes a named service to its own base URL
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, base: impl Into<String>) -> Self {
        self.services.insert(name.into(), base.into());
        self.derive_allow_list();
        self
    }

    /// Sets the refresh path on the auth service (default `/refresh`)
    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Replaces the allow-list; it no longer follows the base URLs
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self.explicit_allow_list = true;
        self
    }

    /// Adds a header sent with every request
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the gateway base URL
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the auth service base URL
    #[must_use]
    pub fn auth_base(&self) -> &str {
        self.service_base(Some(SERVICE_AUTH))
    }

    /// Returns the effective allow-list
    #[must_use]
    pub const fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    fn service_base(&self, service: Option<&str>) -> &str {
        match service {
            None => &self.api_base,
            Some(name) => self.services.get(name).map_or_else(
                || {
                    tracing::debug!(service = name, "unknown service, routing through gateway base");
                    self.api_base.as_str()
                },
                String::as_str,
            ),
        }
    }
}

/// Configuration trait for the gateway client
///
/// Implement this trait to route services or supply a different host policy.
pub trait Config: Send + Sync {
    /// Returns HTTP headers to include in every request
    fn headers(&self) -> HeaderMap;

    /// Constructs the absolute URL for a call on `service` (or the gateway base)
    fn url(&self, service: Option<&str>, path: &str, query: &QueryParams) -> String;

    /// Absolute URL of the session refresh endpoint
    fn refresh_url(&self) -> String;

    /// Policy deciding which hosts may be called
    fn host_policy(&self) -> &dyn HostPolicy;
}

impl Config for GatewayConfig {
    fn headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    fn url(&self, service: Option<&str>, path: &str, query: &QueryParams) -> String {
        build_url(self.service_base(service), path, query)
    }

    fn refresh_url(&self) -> String {
        build_url(self.auth_base(), &self.refresh_path, &QueryParams::new())
    }

    fn host_policy(&self) -> &dyn HostPolicy {
        &self.allow_list
    }
}
