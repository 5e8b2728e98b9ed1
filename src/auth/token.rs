//! Micropub access token exchange
//!
//! Runs after the authorization endpoint has confirmed the user's identity.
//! Every outcome here keeps the confirmed identifier: a missing endpoint or a
//! failed exchange is a partial success, not a failed sign-in.

use crate::auth::discovery::EndpointSet;
use crate::auth::http::HttpClient;
use crate::auth::result::AuthResult;

/// Message used when discovery found no token or Micropub endpoint.
pub const NO_MICROPUB_ENDPOINT: &str = "no micropub endpoint found";

/// Inputs to the token request, all taken from the verified callback.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    /// The authorization code already verified with the authorization
    /// endpoint.
    pub code: &'a str,

    /// The confirmed identifier.
    pub me: &'a str,

    /// The callback URL sent with the original redirect.
    pub redirect_uri: &'a str,

    /// The process-wide client identifier.
    pub client_id: &'a str,

    /// The raw `state` value from the callback.
    pub state: &'a str,
}

/// Exchanges a verified authorization code for an access token.
///
/// # Returns
///
/// - [`AuthResult::authorized`] when the token endpoint answers 2xx with an
///   `access_token`.
/// - [`AuthResult::partial`] when either endpoint is missing, the request
///   fails, the status is not 2xx, or the response lacks `access_token`.
pub async fn exchange_token(
    http: &dyn HttpClient,
    endpoints: &EndpointSet,
    request: &TokenRequest<'_>,
    continuation_target: Option<String>,
) -> AuthResult {
    let me = request.me.to_string();

    let (Some(token_endpoint), Some(micropub_endpoint)) =
        (&endpoints.token_endpoint, &endpoints.micropub_endpoint)
    else {
        tracing::info!(me = %me, "identity confirmed but no micropub endpoint discovered");
        return AuthResult::partial(me, NO_MICROPUB_ENDPOINT, continuation_target);
    };

    let form = [
        ("code", request.code),
        ("me", request.me),
        ("redirect_uri", request.redirect_uri),
        ("client_id", request.client_id),
        ("state", request.state),
    ];

    let resp = match http.post_form(token_endpoint, &form).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(me = %me, token_endpoint = %token_endpoint, error = %e, "token request failed");
            return AuthResult::partial(
                me,
                format!("token request failed: {e}"),
                continuation_target,
            );
        }
    };

    if !resp.is_success() {
        tracing::warn!(me = %me, status = resp.status, "token endpoint returned non-success status");
        let data = resp.form();
        let detail = match data.get("error") {
            Some(error) => format!(
                "{}: {}",
                error,
                data.get("error_description").map(String::as_str).unwrap_or_default()
            ),
            None => resp.status.to_string(),
        };
        return AuthResult::partial(
            me,
            format!("bad response from token endpoint: {detail}"),
            continuation_target,
        );
    }

    let mut data = resp.form();
    let Some(access_token) = data.remove("access_token").filter(|t| !t.is_empty()) else {
        tracing::warn!(me = %me, "token endpoint response missing access_token");
        return AuthResult::partial(
            me,
            "response from token endpoint missing access_token",
            continuation_target,
        );
    };

    tracing::info!(me = %me, "access token issued");
    AuthResult::authorized(
        me,
        access_token,
        micropub_endpoint.clone(),
        data.remove("scope"),
        continuation_target,
    )
}
