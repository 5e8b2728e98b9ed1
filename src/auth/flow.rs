//! IndieAuth sign-in and Micropub authorization handshake
//!
//! The handshake is split across two independent requests, possibly served by
//! different processes:
//!
//! 1. **Initiation** ([`IndieAuthClient::start_authentication`] /
//!    [`IndieAuthClient::start_authorization`]): normalize the identifier,
//!    discover its endpoints, issue a CSRF-protected `state`, cache the
//!    endpoints in the session and return a redirect to the authorization
//!    endpoint.
//! 2. **Callback** ([`IndieAuthClient::handle_authentication_callback`] /
//!    [`IndieAuthClient::handle_authorization_callback`]): verify `state`,
//!    verify the code with the authorization endpoint, and for the
//!    authorization flow exchange it for an access token.
//!
//! ```text
//! INIT -> REDIRECTED -> CALLBACK_RECEIVED -> CSRF_FAILED
//!                                          | CODE_INVALID
//!                                          | IDENTITY_CONFIRMED -> NO_TOKEN_ENDPOINT
//!                                                               | TOKEN_REQUEST_FAILED
//!                                                               | TOKEN_ISSUED
//! ```
//!
//! Callbacks never return an error: every terminal state is an
//! [`AuthResult`].

use std::sync::Arc;

use url::Url;

use crate::auth::discovery::{discover_endpoints, EndpointSet};
use crate::auth::http::HttpClient;
use crate::auth::result::{AuthResult, CallbackParams, RedirectInstruction};
use crate::auth::session::{self, SessionStore};
use crate::auth::state;
use crate::auth::token::{exchange_token, TokenRequest};
use crate::config::ClientConfig;
use crate::error::{IndieAuthError, Result};

/// Message used when neither the session nor re-discovery yields an
/// authorization endpoint.
pub const NO_AUTHORIZATION_ENDPOINT: &str = "no authorization endpoint";

/// Message used when the authorization endpoint confirms a code without
/// naming the user.
pub const MISSING_ME: &str = "missing me in response";

/// Normalizes a user identifier into an absolute URL string.
///
/// Identifiers without an `http://` or `https://` prefix get `http://`
/// prepended. The value is otherwise left untouched.
///
/// # Errors
///
/// Returns [`IndieAuthError::InvalidIdentifier`] for blank input or input
/// that still does not parse as a URL with a host.
///
/// # Examples
///
/// ```
/// use indieauth_client::auth::flow::normalize_me;
///
/// assert_eq!(normalize_me("example.com").unwrap(), "http://example.com");
/// assert_eq!(normalize_me("https://example.com").unwrap(), "https://example.com");
/// assert!(normalize_me("   ").is_err());
/// ```
pub fn normalize_me(me: &str) -> Result<String> {
    let me = me.trim();
    if me.is_empty() {
        return Err(IndieAuthError::InvalidIdentifier("identifier is empty".to_string()).into());
    }

    let lower = me.to_ascii_lowercase();
    let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
        me.to_string()
    } else {
        format!("http://{me}")
    };

    match Url::parse(&normalized) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(normalized),
        _ => Err(IndieAuthError::InvalidIdentifier(me.to_string()).into()),
    }
}

/// Identity confirmed by the authorization endpoint, plus what the token
/// exchange needs.
struct ConfirmedIdentity {
    me: String,
    code: String,
    state: String,
    continuation_target: Option<String>,
    endpoints: EndpointSet,
}

/// Drives the IndieAuth handshake for one client application.
///
/// Holds only process-wide values: the HTTP capability and the client
/// configuration. All per-handshake state lives in the [`SessionStore`]
/// passed to each call.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use indieauth_client::auth::flow::IndieAuthClient;
/// use indieauth_client::auth::http::ReqwestHttpClient;
/// use indieauth_client::auth::session::MemorySession;
/// use indieauth_client::config::ClientConfig;
///
/// # async fn example() -> indieauth_client::error::Result<()> {
/// let http = Arc::new(ReqwestHttpClient::new(reqwest::Client::new()));
/// let client = IndieAuthClient::new(http, ClientConfig::default());
///
/// let mut session = MemorySession::default();
/// let redirect = client
///     .start_authorization(
///         &mut session,
///         "alice.example",
///         "https://app.example/callback/authorize",
///         Some("/posts/new"),
///         Some("create"),
///     )
///     .await?;
/// println!("send the user to {}", redirect.location);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IndieAuthClient {
    http: Arc<dyn HttpClient>,
    config: ClientConfig,
}

impl std::fmt::Debug for IndieAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndieAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IndieAuthClient {
    /// Creates a client from an HTTP capability and client configuration.
    pub fn new(http: Arc<dyn HttpClient>, config: ClientConfig) -> Self {
        Self { http, config }
    }

    /// The identifier sent as `client_id`.
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Discovers endpoints for an already normalized identifier, applying the
    /// configured `https` requirement.
    pub async fn discover(&self, me: &str) -> EndpointSet {
        let endpoints = discover_endpoints(self.http.as_ref(), me).await;
        if self.config.require_https_endpoints {
            endpoints.require_https()
        } else {
            endpoints
        }
    }

    /// Starts a sign-in-only handshake.
    ///
    /// # Errors
    ///
    /// Returns [`IndieAuthError::InvalidIdentifier`] when `me` cannot be
    /// normalized. Discovery failures are not errors.
    pub async fn start_authentication(
        &self,
        session: &mut dyn SessionStore,
        me: &str,
        redirect_uri: &str,
        continuation_target: Option<&str>,
    ) -> Result<RedirectInstruction> {
        self.start(session, me, redirect_uri, continuation_target, None)
            .await
    }

    /// Starts a handshake that also requests an access token.
    ///
    /// `scope` falls back to the configured default when absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`IndieAuthError::InvalidIdentifier`] when `me` cannot be
    /// normalized. Discovery failures are not errors.
    pub async fn start_authorization(
        &self,
        session: &mut dyn SessionStore,
        me: &str,
        redirect_uri: &str,
        continuation_target: Option<&str>,
        scope: Option<&str>,
    ) -> Result<RedirectInstruction> {
        let scope = scope
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(self.config.default_scope.as_str());
        self.start(session, me, redirect_uri, continuation_target, Some(scope))
            .await
    }

    async fn start(
        &self,
        session: &mut dyn SessionStore,
        me: &str,
        redirect_uri: &str,
        continuation_target: Option<&str>,
        scope: Option<&str>,
    ) -> Result<RedirectInstruction> {
        let me = normalize_me(me)?;

        let mut endpoints = self.discover(&me).await;
        if endpoints.authorization_endpoint.is_none() {
            tracing::info!(
                me = %me,
                fallback = %self.config.default_authorization_endpoint,
                "no authorization endpoint advertised, using default"
            );
            endpoints.authorization_endpoint =
                Some(self.config.default_authorization_endpoint.clone());
        }

        let handshake = state::issue(session, continuation_target);
        session::store_endpoints(session, &endpoints)?;

        let location = build_authorization_url(
            endpoints.authorization_endpoint.as_deref().unwrap_or_default(),
            &me,
            &self.config.client_id,
            redirect_uri,
            &handshake.combined(),
            scope,
        )?;

        tracing::info!(me = %me, scope = ?scope, "redirecting to authorization endpoint");
        Ok(RedirectInstruction { location })
    }

    /// Finishes a sign-in-only handshake.
    ///
    /// `redirect_uri` must be the same callback URL passed to
    /// [`start_authentication`](Self::start_authentication).
    pub async fn handle_authentication_callback(
        &self,
        session: &mut dyn SessionStore,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> AuthResult {
        match self.confirm_identity(session, params, redirect_uri).await {
            Ok(identity) => {
                tracing::info!(me = %identity.me, "identity confirmed");
                AuthResult::authenticated(identity.me, identity.continuation_target)
            }
            Err(result) => result,
        }
    }

    /// Finishes a handshake that requested an access token.
    ///
    /// `redirect_uri` must be the same callback URL passed to
    /// [`start_authorization`](Self::start_authorization).
    pub async fn handle_authorization_callback(
        &self,
        session: &mut dyn SessionStore,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> AuthResult {
        let identity = match self.confirm_identity(session, params, redirect_uri).await {
            Ok(identity) => identity,
            Err(result) => return result,
        };

        let request = TokenRequest {
            code: &identity.code,
            me: &identity.me,
            redirect_uri,
            client_id: &self.config.client_id,
            state: &identity.state,
        };

        exchange_token(
            self.http.as_ref(),
            &identity.endpoints,
            &request,
            identity.continuation_target.clone(),
        )
        .await
    }

    /// Verifies `state` and the authorization code.
    ///
    /// `Err` carries the terminal [`AuthResult`] for every failure.
    async fn confirm_identity(
        &self,
        session: &mut dyn SessionStore,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> std::result::Result<ConfirmedIdentity, AuthResult> {
        let continuation_target = match state::verify(session, params.state.as_deref()) {
            Ok(target) => target,
            Err(rejection) => {
                tracing::warn!(reason = %rejection, "rejecting callback");
                // A rejected handshake must not leave endpoints behind.
                session.remove(session::ENDPOINTS_SESSION_KEY);
                return Err(AuthResult::failure(
                    format!("csrf check failed: {rejection}"),
                    None,
                ));
            }
        };

        let cached = match session::take_endpoints(session) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "discarding endpoint cache");
                None
            }
        };

        if let Some(error) = &params.error {
            tracing::info!(error = %error, "authorization server returned an error");
            return Err(AuthResult::failure(
                format!(
                    "authorization server returned error: {}: {}",
                    error,
                    params.error_description.as_deref().unwrap_or_default()
                ),
                continuation_target,
            ));
        }

        let Some(code) = params.code.clone().filter(|c| !c.is_empty()) else {
            return Err(AuthResult::failure(
                "missing code in callback",
                continuation_target,
            ));
        };

        let endpoints = match cached {
            Some(endpoints) => endpoints,
            None => self.rediscover(params.me.as_deref()).await,
        };

        let Some(authorization_endpoint) = endpoints.authorization_endpoint.clone() else {
            return Err(AuthResult::failure(
                NO_AUTHORIZATION_ENDPOINT,
                continuation_target,
            ));
        };

        // `state` verified above, so it is present.
        let raw_state = params.state.clone().unwrap_or_default();
        let form = [
            ("code", code.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("state", raw_state.as_str()),
        ];

        let resp = match self.http.post_form(&authorization_endpoint, &form).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(endpoint = %authorization_endpoint, error = %e, "code verification request failed");
                return Err(AuthResult::failure(
                    format!("authorization request failed: {e}"),
                    continuation_target,
                ));
            }
        };

        let mut data = resp.form();

        if !resp.is_success() {
            tracing::warn!(status = resp.status, "authorization endpoint rejected the code");
            let message = match data.get("error") {
                Some(error) => format!(
                    "authorization failed. {}: {}",
                    error,
                    data.get("error_description").map(String::as_str).unwrap_or_default()
                ),
                None => format!("authorization failed. HTTP {}", resp.status),
            };
            return Err(AuthResult::failure(message, continuation_target));
        }

        let Some(me) = data.remove("me").filter(|m| !m.is_empty()) else {
            tracing::warn!("authorization endpoint response has no me");
            return Err(AuthResult::failure(MISSING_ME, continuation_target));
        };

        if params
            .me
            .as_deref()
            .is_some_and(|claimed| !same_identifier(claimed, &me))
        {
            tracing::debug!(
                claimed = ?params.me,
                confirmed = %me,
                "authorization endpoint returned a different identifier"
            );
        }

        Ok(ConfirmedIdentity {
            me,
            code,
            state: raw_state,
            continuation_target,
            endpoints,
        })
    }

    /// Re-runs discovery when the session lost the cached endpoints.
    async fn rediscover(&self, me: Option<&str>) -> EndpointSet {
        let Some(me) = me else {
            tracing::warn!("no cached endpoints and no me in callback");
            return EndpointSet::default();
        };

        match normalize_me(me) {
            Ok(me) => {
                tracing::debug!(me = %me, "endpoint cache missing, rediscovering");
                self.discover(&me).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot rediscover endpoints");
                EndpointSet::default()
            }
        }
    }
}

/// Compares a claimed identifier with a confirmed one after normalizing
/// both, so `alice.example` matches `http://alice.example/`.
fn same_identifier(claimed: &str, confirmed: &str) -> bool {
    let parse = |me: &str| normalize_me(me).ok().and_then(|me| Url::parse(&me).ok());
    match (parse(claimed), parse(confirmed)) {
        (Some(claimed), Some(confirmed)) => claimed == confirmed,
        _ => claimed == confirmed,
    }
}

/// Builds the redirect URL to the authorization endpoint.
fn build_authorization_url(
    authorization_endpoint: &str,
    me: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    scope: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint).map_err(|e| {
        IndieAuthError::Discovery(format!(
            "invalid authorization endpoint URL {authorization_endpoint}: {e}"
        ))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("me", me);
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("state", state);
        if let Some(scope) = scope {
            query.append_pair("scope", scope);
        }
    }

    Ok(url.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
