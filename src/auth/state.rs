//! CSRF-protected `state` parameter
//!
//! Each handshake gets a fresh random token. The token is stored in the
//! session and also travels to the authorization server packed together with
//! the caller's continuation target:
//!
//! ```text
//! state = <csrf token> "|" <continuation target>
//! ```
//!
//! The token alphabet is base64url, which never contains `|`, so splitting on
//! the first separator is unambiguous even when the target itself contains
//! one. Verification deletes the stored token whether it succeeds or not.

use base64::Engine as _;

use crate::auth::session::SessionStore;

/// Session key holding the outstanding CSRF token.
pub const CSRF_SESSION_KEY: &str = "indieauth.csrf";

/// Separator between the CSRF token and the continuation target.
pub const STATE_SEPARATOR: char = '|';

/// Random bytes per token (encodes to 43 base64url characters).
const TOKEN_BYTES: usize = 32;

/// A freshly issued handshake state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeState {
    /// The unguessable per-handshake token.
    pub csrf_token: String,

    /// Where the caller wants to go once the handshake completes.
    pub continuation_target: Option<String>,
}

impl HandshakeState {
    /// The opaque value sent as the `state` query parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use indieauth_client::auth::state::HandshakeState;
    ///
    /// let state = HandshakeState {
    ///     csrf_token: "abc".to_string(),
    ///     continuation_target: Some("/posts/new".to_string()),
    /// };
    /// assert_eq!(state.combined(), "abc|/posts/new");
    /// ```
    pub fn combined(&self) -> String {
        format!(
            "{}{}{}",
            self.csrf_token,
            STATE_SEPARATOR,
            self.continuation_target.as_deref().unwrap_or_default()
        )
    }
}

/// Why a received `state` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRejection {
    /// The callback carried no `state` at all.
    Missing,
    /// The value had no separator.
    Malformed,
    /// No token was outstanding for this session.
    NotIssued,
    /// The token differs from the one issued to this session.
    Mismatch,
}

impl std::fmt::Display for StateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Missing => "missing state parameter",
            Self::Malformed => "malformed state parameter",
            Self::NotIssued => "no state token issued for this session",
            Self::Mismatch => "state token mismatch",
        };
        f.write_str(msg)
    }
}

/// Generates a token, stores it in `session` and returns the handshake state.
///
/// An empty continuation target is treated as absent. Issuing again for the
/// same session replaces any earlier token.
pub fn issue(session: &mut dyn SessionStore, continuation_target: Option<&str>) -> HandshakeState {
    use rand::RngCore as _;

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let csrf_token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

    session.set(CSRF_SESSION_KEY, csrf_token.clone());

    HandshakeState {
        csrf_token,
        continuation_target: continuation_target
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

/// Checks a received `state` against the token stored in `session`.
///
/// Returns the continuation target on success. The stored token is removed
/// before any comparison, so a given token verifies at most once.
pub fn verify(
    session: &mut dyn SessionStore,
    received: Option<&str>,
) -> std::result::Result<Option<String>, StateRejection> {
    let expected = session.remove(CSRF_SESSION_KEY);

    let received = received
        .filter(|s| !s.is_empty())
        .ok_or(StateRejection::Missing)?;
    let (token, target) = received
        .split_once(STATE_SEPARATOR)
        .ok_or(StateRejection::Malformed)?;
    let expected = expected.ok_or(StateRejection::NotIssued)?;

    if token.is_empty() || !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(StateRejection::Mismatch);
    }

    Ok(Some(target).filter(|t| !t.is_empty()).map(str::to_string))
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::MemorySession;

    #[test]
    fn test_issue_stores_token_in_session() {
        let mut session = MemorySession::default();
        let state = issue(&mut session, Some("/next"));
        assert_eq!(session.get(CSRF_SESSION_KEY), Some(state.csrf_token.clone()));
        assert_eq!(state.continuation_target.as_deref(), Some("/next"));
    }

    #[test]
    fn test_issue_token_is_url_safe_and_long() {
        let mut session = MemorySession::default();
        let state = issue(&mut session, None);
        assert_eq!(state.csrf_token.len(), 43);
        assert!(state
            .csrf_token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_issue_produces_unique_tokens() {
        let mut session = MemorySession::default();
        let a = issue(&mut session, None);
        let b = issue(&mut session, None);
        assert_ne!(a.csrf_token, b.csrf_token);
    }

    #[test]
    fn test_round_trip_with_target() {
        let mut session = MemorySession::default();
        let state = issue(&mut session, Some("https://app.example/after?x=1"));
        let target = verify(&mut session, Some(&state.combined())).unwrap();
        assert_eq!(target.as_deref(), Some("https://app.example/after?x=1"));
    }

    #[test]
    fn test_round_trip_without_target() {
        for target in [None, Some("")] {
            let mut session = MemorySession::default();
            let state = issue(&mut session, target);
            assert_eq!(verify(&mut session, Some(&state.combined())), Ok(None));
        }
    }

    #[test]
    fn test_round_trip_target_containing_separator() {
        let mut session = MemorySession::default();
        let state = issue(&mut session, Some("/a|b|c"));
        let target = verify(&mut session, Some(&state.combined())).unwrap();
        assert_eq!(target.as_deref(), Some("/a|b|c"));
    }

    #[test]
    fn test_verify_is_single_use() {
        let mut session = MemorySession::default();
        let combined = issue(&mut session, Some("/next")).combined();
        assert!(verify(&mut session, Some(&combined)).is_ok());
        assert_eq!(
            verify(&mut session, Some(&combined)),
            Err(StateRejection::NotIssued)
        );
    }

    #[test]
    fn test_verify_rejects_token_from_other_handshake() {
        let mut other = MemorySession::default();
        let foreign = issue(&mut other, None).combined();

        let mut session = MemorySession::default();
        issue(&mut session, None);
        assert_eq!(
            verify(&mut session, Some(&foreign)),
            Err(StateRejection::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_truncated_state() {
        let mut session = MemorySession::default();
        let combined = issue(&mut session, Some("/next")).combined();
        let truncated = &combined[..10];
        assert_eq!(
            verify(&mut session, Some(truncated)),
            Err(StateRejection::Malformed)
        );
    }

    #[test]
    fn test_verify_rejects_mangled_token() {
        let mut session = MemorySession::default();
        let combined = issue(&mut session, None).combined();
        let replacement = if combined.starts_with('x') { 'y' } else { 'x' };
        let mangled = format!("{replacement}{}", &combined[1..]);
        assert_eq!(
            verify(&mut session, Some(&mangled)),
            Err(StateRejection::Mismatch)
        );
    }

    #[test]
    fn test_verify_failure_still_consumes_token() {
        let mut session = MemorySession::default();
        let combined = issue(&mut session, None).combined();
        assert!(verify(&mut session, Some("wrong|")).is_err());
        assert!(session.get(CSRF_SESSION_KEY).is_none());
        assert!(verify(&mut session, Some(&combined)).is_err());
    }

    #[test]
    fn test_verify_missing_state() {
        let mut session = MemorySession::default();
        issue(&mut session, None);
        assert_eq!(verify(&mut session, None), Err(StateRejection::Missing));
    }

    #[test]
    fn test_verify_empty_token_is_mismatch() {
        let mut session = MemorySession::default();
        session.set(CSRF_SESSION_KEY, String::new());
        assert_eq!(verify(&mut session, Some("|/next")), Err(StateRejection::Mismatch));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
