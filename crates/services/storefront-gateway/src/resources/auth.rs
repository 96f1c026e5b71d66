use secrecy::{ExposeSecret, SecretString};

use crate::{
    client::Client,
    config::{Config, SERVICE_AUTH},
    error::GatewayError,
    request::RequestDescriptor,
    session::Identity,
};

/// Login endpoint path on the auth service
pub const PATH_LOGIN: &str = "/login";
/// Logout endpoint path on the auth service
pub const PATH_LOGOUT: &str = "/logout";
/// Account withdrawal endpoint path on the auth service
pub const PATH_WITHDRAW: &str = "/withdraw";
/// Current-user endpoint path on the auth service
pub const PATH_ME: &str = "/me";

/// Credentials for `POST /login`
///
/// Debug output redacts `password` via [`SecretString`].
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Account password
    pub password: SecretString,
}

impl LoginRequest {
    /// Creates a login request
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// JSON body sent to the login endpoint; the only place the password is exposed
    fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "email": self.email,
            "password": self.password.expose_secret(),
        })
    }
}

/// API resource for the auth service's session lifecycle.
///
/// Keeps the client's session cache in step with the server: populated on
/// login, cleared on logout and withdrawal.
pub struct Auth<'c, C: Config> {
    client: &'c Client<C>,
}

impl<'c, C: Config> Auth<'c, C> {
    /// Creates a new Auth resource
    #[must_use]
    pub const fn new(client: &'c Client<C>) -> Self {
        Self { client }
    }

    /// Logs in and caches the returned identity.
    ///
    /// A 401 here means the credentials were rejected, so it is never treated
    /// as an expired session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API returns an error.
    pub async fn login(&self, req: &LoginRequest) -> Result<Identity, GatewayError> {
        let desc = RequestDescriptor::post(PATH_LOGIN)
            .service(SERVICE_AUTH)
            .without_refresh()
            .json_value(req.to_body());
        let identity: Identity = self.client.send_json(&desc).await?;
        self.client.session().set_cached_identity(identity.clone());
        Ok(identity)
    }

    /// Fetches the current identity and refreshes the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API returns an error.
    pub async fn me(&self) -> Result<Identity, GatewayError> {
        let desc = RequestDescriptor::get(PATH_ME).service(SERVICE_AUTH);
        let identity: Identity = self.client.send_json(&desc).await?;
        self.client.session().set_cached_identity(identity.clone());
        Ok(identity)
    }

    /// Logs out. The cache is cleared even when the call fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API returns an error.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let desc = RequestDescriptor::post(PATH_LOGOUT).service(SERVICE_AUTH);
        let result = self.client.send(&desc).await;
        self.client.session().clear();
        result.map(|_| ())
    }

    /// Withdraws (deletes) the account and clears the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API returns an error.
    pub async fn withdraw(&self) -> Result<(), GatewayError> {
        let desc = RequestDescriptor::delete(PATH_WITHDRAW).service(SERVICE_AUTH);
        self.client.send(&desc).await?;
        self.client.session().clear();
        Ok(())
    }

    /// Refreshes the session explicitly.
    ///
    /// # Errors
    ///
    /// Returns the refresh call's error; the cache is cleared on failure.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        self.client.refresh_session().await
    }
}

// Add accessor to client
impl<C: Config> crate::Client<C> {
    /// Returns the Auth API resource
    #[must_use]
    pub const fn auth(&self) -> Auth<'_, C> {
        Auth::new(self)
    }
}
