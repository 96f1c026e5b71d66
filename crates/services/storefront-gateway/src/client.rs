use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, GatewayConfig};
use crate::error::{GatewayError, classify_response, map_deser};
use crate::refresh::{RefreshCoordinator, RefreshResult};
use crate::request::{RequestBody, RequestDescriptor};
use crate::security::ensure_allowed;
use crate::session::{InMemorySessionStore, SessionStore};

/// Which send of a logical call is in progress, for logging
#[derive(Debug, Clone, Copy)]
enum Attempt {
    Initial,
    Retry,
}

impl Attempt {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Retry => "retry",
        }
    }
}

/// Storefront gateway client
///
/// Every call is built from a [`RequestDescriptor`], checked against the
/// configured host policy, and sent with the transport's cookie store enabled.
/// A 401 triggers one session refresh followed by one replay of the call.
///
/// The client is generic over a [`Config`] implementation that provides base
/// URLs, static headers, and the host policy. Clones share the session store
/// and the refresh in flight.
#[derive(Clone)]
pub struct Client<C: Config> {
    http: reqwest::Client,
    config: C,
    session: Arc<dyn SessionStore>,
    refresh: Arc<RefreshCoordinator>,
}

impl<C: Config + fmt::Debug> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("refresh_dedup", &self.refresh.dedup())
            .finish_non_exhaustive()
    }
}

impl Client<GatewayConfig> {
    /// Creates a new client with default configuration
    ///
    /// Uses environment variables for routing:
    /// - `GATEWAY_BASE_URL` for the gateway base
    /// - `GATEWAY_AUTH_BASE_URL` for the auth service
    /// - `GATEWAY_ALLOWED_ORIGINS` for the host allow-list
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::new())
    }
}

impl<C: Config + Default> Default for Client<C> {
    fn default() -> Self {
        Self::with_config(C::default())
    }
}

/// Builds the default transport: cookies on, redirects off.
///
/// Redirects are not followed because the target of a redirect would bypass
/// the host policy.
fn default_http() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

impl<C: Config> Client<C> {
    /// Creates a new client with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the reqwest client cannot be built.
    #[must_use]
    pub fn with_config(config: C) -> Self {
        Self {
            http: default_http(),
            config,
            session: Arc::new(InMemorySessionStore::new()),
            refresh: Arc::new(RefreshCoordinator::new(true)),
        }
    }

    /// Replaces the HTTP client with a custom one
    ///
    /// The replacement must keep a cookie store enabled, otherwise the session
    /// cookie is never sent.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Replaces the session store
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session = store;
        self
    }

    /// Enables or disables sharing one refresh between concurrent 401s (default on)
    #[must_use]
    pub fn with_refresh_dedup(mut self, dedup: bool) -> Self {
        self.refresh = Arc::new(RefreshCoordinator::new(dedup));
        self
    }

    /// Returns a reference to the client's configuration
    #[must_use]
    pub const fn config(&self) -> &C {
        &self.config
    }

    /// Returns the session store
    #[must_use]
    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    /// Sends a call and returns its JSON body, or `None` for an empty body.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] for blocked hosts, transport failures, and
    /// non-success responses (after at most one refresh-and-retry on 401).
    pub async fn send(&self, req: &RequestDescriptor) -> Result<Option<Value>, GatewayError> {
        self.send_inner(req, None).await
    }

    /// Like [`send`](Self::send), aborting with a cancelled network error when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_cancellable(
        &self,
        req: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, GatewayError> {
        self.send_inner(req, Some(cancel)).await
    }

    /// Sends a call and deserializes its body. An empty body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send). A body that does not match `O` yields an
    /// `INVALID_RESPONSE` API error.
    pub async fn send_json<O: DeserializeOwned>(
        &self,
        req: &RequestDescriptor,
    ) -> Result<O, GatewayError> {
        let (status, body) = self.call(req, None).await?;
        decode(status, &body)
    }

    /// Like [`send_json`](Self::send_json) with cancellation.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn send_json_cancellable<O: DeserializeOwned>(
        &self,
        req: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<O, GatewayError> {
        let (status, body) = self.call(req, Some(cancel)).await?;
        decode(status, &body)
    }

    /// Refreshes the session explicitly, joining a refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns the refresh call's own error. The session cache is cleared on failure.
    pub async fn refresh_session(&self) -> Result<(), GatewayError> {
        self.refresh.run(|| self.refresh_future()).await
    }

    async fn send_inner(
        &self,
        req: &RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Value>, GatewayError> {
        let (status, body) = self.call(req, cancel).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| map_deser(&e, status, &body))
    }

    /// One logical call: execute, and on 401 refresh once and replay once.
    async fn call(
        &self,
        req: &RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> Result<(StatusCode, Bytes), GatewayError> {
        let original = match self.execute(req, cancel, Attempt::Initial).await {
            Err(err) if err.is_auth_expired() && req.refreshes_on_401() => err,
            other => return other,
        };

        let refreshed = with_cancel(cancel, self.refresh.run(|| self.refresh_future())).await?;
        if refreshed.is_err() {
            return Err(original);
        }

        tracing::info!(path = req.path(), "session refreshed, replaying request");
        self.execute(req, cancel, Attempt::Retry).await
    }

    /// URL build, host check, and one network exchange.
    async fn execute(
        &self,
        req: &RequestDescriptor,
        cancel: Option<&CancellationToken>,
        attempt: Attempt,
    ) -> Result<(StatusCode, Bytes), GatewayError> {
        let url = self
            .config
            .url(req.service_name(), req.path(), req.query_params());
        ensure_allowed(self.config.host_policy(), &url)?;

        let request = self.build_request(req, &url)?;
        tracing::debug!(
            method = %req.method(),
            path = request.url().path(),
            attempt = attempt.as_str(),
            "sending gateway request"
        );

        let (status, body) = with_cancel(cancel, exchange(&self.http, request)).await??;
        tracing::debug!(status = status.as_u16(), "gateway response");

        if status.is_success() {
            Ok((status, body))
        } else {
            Err(classify_response(status, &body))
        }
    }

    fn build_request(
        &self,
        req: &RequestDescriptor,
        url: &str,
    ) -> Result<reqwest::Request, GatewayError> {
        let builder = self
            .http
            .request(req.method().clone(), url)
            .headers(self.config.headers())
            .headers(req.headers().clone());

        let builder = match req.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
            RequestBody::Binary { data, content_type } => {
                let builder = builder.body(data.clone());
                match content_type {
                    Some(ct) => builder.header(CONTENT_TYPE, ct.as_str()),
                    None => builder,
                }
            }
        };
        Ok(builder.build()?)
    }

    /// Builds the refresh call. It runs outside the coordinator so its own 401
    /// cannot recurse into another refresh.
    fn refresh_future(&self) -> BoxFuture<'static, RefreshResult> {
        let url = self.config.refresh_url();
        let request = ensure_allowed(self.config.host_policy(), &url).and_then(|()| {
            self.http
                .post(&url)
                .headers(self.config.headers())
                .build()
                .map_err(GatewayError::from)
        });
        let http = self.http.clone();
        let session = Arc::clone(&self.session);

        async move {
            let result = match request {
                Ok(request) => match exchange(&http, request).await {
                    Ok((status, _)) if status.is_success() => Ok(()),
                    Ok((status, body)) => Err(classify_response(status, &body)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                tracing::warn!(
                    status = e.http_status(),
                    code = e.code().unwrap_or_default(),
                    "session refresh failed, clearing cached identity"
                );
                session.clear();
            }
            result
        }
        .boxed()
    }
}

/// Sends `request` and reads the whole body. 204 always yields an empty body.
async fn exchange(
    http: &reqwest::Client,
    request: reqwest::Request,
) -> Result<(StatusCode, Bytes), GatewayError> {
    let response = http.execute(request).await?;
    let status = response.status();
    let body = response.bytes().await?;
    if status == StatusCode::NO_CONTENT {
        return Ok((status, Bytes::new()));
    }
    Ok((status, body))
}

/// Races `fut` against the caller's cancellation token.
async fn with_cancel<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = T>,
) -> Result<T, GatewayError> {
    match cancel {
        None => Ok(fut.await),
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(GatewayError::cancelled()),
            out = fut => Ok(out),
        },
    }
}

fn decode<O: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<O, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(Value::Null).map_err(|e| map_deser(&e, status, body));
    }
    serde_json::from_slice(body).map_err(|e| map_deser(&e, status, body))
}
