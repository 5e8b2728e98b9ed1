//! Values passed in and out of the handshake

use serde::{Deserialize, Serialize};

/// Query parameters of the callback request.
///
/// Deserializes straight from the callback query string.
///
/// # Examples
///
/// ```
/// use indieauth_client::auth::result::CallbackParams;
///
/// let params: CallbackParams =
///     serde_urlencoded::from_str("code=abc123&state=tok%7C%2Fnext&me=alice.example").unwrap();
/// assert_eq!(params.code.as_deref(), Some("abc123"));
/// assert_eq!(params.state.as_deref(), Some("tok|/next"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    /// The user identifier echoed by the authorization server.
    #[serde(default)]
    pub me: Option<String>,

    /// The authorization code to verify.
    #[serde(default)]
    pub code: Option<String>,

    /// The combined state issued when the handshake started.
    #[serde(default)]
    pub state: Option<String>,

    /// Error code when the authorization server refused the request.
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable companion to `error`.
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Where to send the user agent to continue the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectInstruction {
    /// Absolute URL of the authorization endpoint including all query
    /// parameters.
    pub location: String,
}

/// Terminal value of a handshake.
///
/// Exactly one of three shapes is produced by the constructors:
///
/// - failure: `identifier` absent, `error_message` set
/// - identity confirmed: `identifier` set, `error_message` absent, or set
///   when a token was requested but could not be issued
/// - authorized: `identifier`, `access_token` and `micropub_endpoint` set,
///   `error_message` absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    /// The confirmed identifier returned by the authorization endpoint.
    pub identifier: Option<String>,

    /// Endpoint the access token is valid for.
    pub micropub_endpoint: Option<String>,

    /// Bearer token issued by the token endpoint.
    pub access_token: Option<String>,

    /// Scope granted alongside the token, when the endpoint reported one.
    pub scope: Option<String>,

    /// The continuation target recovered from `state`.
    pub continuation_target: Option<String>,

    /// Why the handshake did not fully succeed.
    pub error_message: Option<String>,
}

impl AuthResult {
    /// A handshake that never confirmed an identity.
    pub fn failure(message: impl Into<String>, continuation_target: Option<String>) -> Self {
        Self {
            continuation_target,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Identity confirmed with nothing else requested.
    pub fn authenticated(identifier: String, continuation_target: Option<String>) -> Self {
        Self {
            identifier: Some(identifier),
            continuation_target,
            ..Default::default()
        }
    }

    /// Identity confirmed but no access token could be obtained.
    pub fn partial(
        identifier: String,
        message: impl Into<String>,
        continuation_target: Option<String>,
    ) -> Self {
        Self {
            identifier: Some(identifier),
            continuation_target,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Identity confirmed and access token issued.
    pub fn authorized(
        identifier: String,
        access_token: String,
        micropub_endpoint: String,
        scope: Option<String>,
        continuation_target: Option<String>,
    ) -> Self {
        Self {
            identifier: Some(identifier),
            micropub_endpoint: Some(micropub_endpoint),
            access_token: Some(access_token),
            scope,
            continuation_target,
            error_message: None,
        }
    }

    /// `true` once the identifier is confirmed, regardless of token outcome.
    pub fn is_authenticated(&self) -> bool {
        self.identifier.is_some()
    }

    /// `true` only when an access token was issued.
    pub fn is_authorized(&self) -> bool {
        self.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_has_no_identifier() {
        let result = AuthResult::failure("state token mismatch", None);
        assert!(!result.is_authenticated());
        assert!(!result.is_authorized());
        assert_eq!(result.error_message.as_deref(), Some("state token mismatch"));
    }

    #[test]
    fn test_partial_keeps_identifier_and_error() {
        let result = AuthResult::partial(
            "https://alice.example/".to_string(),
            "no micropub endpoint found",
            Some("/next".to_string()),
        );
        assert!(result.is_authenticated());
        assert!(!result.is_authorized());
        assert!(result.error_message.is_some());
        assert_eq!(result.continuation_target.as_deref(), Some("/next"));
    }

    #[test]
    fn test_authorized_has_no_error() {
        let result = AuthResult::authorized(
            "https://alice.example/".to_string(),
            "tok_xyz".to_string(),
            "https://alice.example/micropub".to_string(),
            Some("create".to_string()),
            None,
        );
        assert!(result.is_authorized());
        assert!(result.error_message.is_none());
        assert!(result.identifier.is_some());
    }

    #[test]
    fn test_callback_params_ignore_unknown_fields() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=c&state=s&extra=1").unwrap();
        assert_eq!(params.code.as_deref(), Some("c"));
        assert!(params.me.is_none());
    }
}
