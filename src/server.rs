//! axum host for the handshake
//!
//! Wires [`IndieAuthClient`] to HTTP routes:
//!
//! | Route                         | Purpose                                   |
//! |-------------------------------|-------------------------------------------|
//! | `GET /?me=..&next=..&scope=..` | start the authorization flow             |
//! | `GET /login?me=..&next=..`    | start the sign-in-only flow               |
//! | registered callback paths     | finish a flow and hand off the result     |
//!
//! Sessions are kept in memory and keyed by a random id stored in a cookie.
//! Callback routes are registered explicitly through [`CallbackRoute`]; each
//! carries the handler that turns the final [`AuthResult`] into a response.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

use crate::auth::http::ReqwestHttpClient;
use crate::auth::result::{AuthResult, CallbackParams};
use crate::auth::session::MemorySession;
use crate::auth::IndieAuthClient;
use crate::config::Config;
use crate::error::{IndieAuthError, Result};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "indieauth_session";

/// Default path of the sign-in-only callback.
pub const AUTHENTICATE_CALLBACK_PATH: &str = "/callback/authenticate";

/// Default path of the authorization callback.
pub const AUTHORIZE_CALLBACK_PATH: &str = "/callback/authorize";

/// Which handshake a callback finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Identity only.
    Authenticate,
    /// Identity plus access token.
    Authorize,
}

/// Turns a finished handshake into the response sent to the user agent.
pub type CallbackHandler = Arc<dyn Fn(AuthResult) -> Response + Send + Sync>;

/// A callback path bound to the flow it finishes and the handler receiving
/// the result.
#[derive(Clone)]
pub struct CallbackRoute {
    /// Route path, e.g. `/callback/authorize`.
    pub path: String,
    /// The flow this route finishes.
    pub kind: FlowKind,
    /// Receives the [`AuthResult`].
    pub handler: CallbackHandler,
}

impl CallbackRoute {
    /// Binds `handler` to `path` for the given flow.
    pub fn new<F>(path: impl Into<String>, kind: FlowKind, handler: F) -> Self
    where
        F: Fn(AuthResult) -> Response + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            kind,
            handler: Arc::new(handler),
        }
    }
}

/// Callback routes that answer with the [`AuthResult`] as JSON.
pub fn default_callbacks() -> Vec<CallbackRoute> {
    let render = |result: AuthResult| {
        let status = if result.is_authenticated() {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        };
        (status, Json(result)).into_response()
    };

    vec![
        CallbackRoute::new(AUTHENTICATE_CALLBACK_PATH, FlowKind::Authenticate, render),
        CallbackRoute::new(AUTHORIZE_CALLBACK_PATH, FlowKind::Authorize, render),
    ]
}

/// In-memory sessions keyed by cookie id.
///
/// Each session sits behind its own lock, held for the whole of a start or
/// callback request, so two requests carrying the same cookie run one after
/// the other and a `state` can only be consumed once.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<MemorySession>>>>>,
}

impl SessionRegistry {
    /// Locks the session, creating an empty one if needed.
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<MemorySession> {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            Arc::clone(sessions.entry(id.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    /// Unlocks the session. An empty session nobody else is waiting on is
    /// dropped.
    async fn release(&self, id: &str, guard: OwnedMutexGuard<MemorySession>) {
        let empty = guard.is_empty();
        drop(guard);
        if !empty {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        // Slots are only cloned under the registry lock, so a count of one
        // means no other request holds or awaits this session.
        let idle = sessions.get(id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|s| s.is_empty())
        });
        if idle {
            sessions.remove(id);
        }
    }

    /// Number of sessions currently holding handshake state.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` when no session holds handshake state.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Clone)]
struct AppState {
    client: IndieAuthClient,
    sessions: SessionRegistry,
    external_url: String,
    callback_paths: Arc<HashMap<FlowKind, String>>,
}

impl AppState {
    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.external_url.trim_end_matches('/'), path)
    }

    fn callback_url(&self, kind: FlowKind) -> Option<String> {
        let path = self.callback_paths.get(&kind)?;
        Some(self.url_for(path))
    }
}

#[derive(Debug, Deserialize)]
struct StartParams {
    me: Option<String>,
    next: Option<String>,
    scope: Option<String>,
}

/// Builds the router.
///
/// `external_url` is the externally reachable base URL used to build the
/// `redirect_uri` of each callback. When several callbacks are registered for
/// the same [`FlowKind`], the last one is used for redirects.
pub fn build_router(
    client: IndieAuthClient,
    sessions: SessionRegistry,
    external_url: impl Into<String>,
    callbacks: Vec<CallbackRoute>,
) -> Router {
    let callback_paths = callbacks
        .iter()
        .map(|route| (route.kind, route.path.clone()))
        .collect::<HashMap<_, _>>();

    let state = AppState {
        client,
        sessions,
        external_url: external_url.into(),
        callback_paths: Arc::new(callback_paths),
    };

    let mut router = Router::new()
        .route("/", get(start_authorization))
        .route("/login", get(start_authentication));

    for route in callbacks {
        let CallbackRoute {
            path,
            kind,
            handler,
        } = route;
        let route_path = path.clone();
        router = router.route(
            &route_path,
            get(
                move |State(state): State<AppState>,
                      cookies: Cookies,
                      Query(params): Query<CallbackParams>| async move {
                    let redirect_uri = state.url_for(&path);
                    finish(state, cookies, kind, &redirect_uri, params, handler).await
                },
            ),
        );
    }

    router.layer(CookieManagerLayer::new()).with_state(state)
}

/// Runs the host until the process is stopped.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the listener
/// cannot bind.
pub async fn serve(config: &Config) -> Result<()> {
    let http = Arc::new(ReqwestHttpClient::from_config(&config.http)?);
    let client = IndieAuthClient::new(http, config.client.clone());
    let router = build_router(
        client,
        SessionRegistry::default(),
        config.server.external_url.clone(),
        default_callbacks(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(IndieAuthError::Io)?;
    tracing::info!(
        bind = %config.server.bind,
        external_url = %config.server.external_url,
        "listening"
    );

    axum::serve(listener, router).await.map_err(IndieAuthError::Io)?;
    Ok(())
}

/// Returns the session id from the cookie, creating one if needed.
fn session_id(cookies: &Cookies) -> String {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        return cookie.value().to_string();
    }

    let id = uuid::Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    cookies.add(cookie);
    id
}

async fn start_authorization(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<StartParams>,
) -> Response {
    start(state, cookies, FlowKind::Authorize, params).await
}

async fn start_authentication(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<StartParams>,
) -> Response {
    start(state, cookies, FlowKind::Authenticate, params).await
}

async fn start(state: AppState, cookies: Cookies, kind: FlowKind, params: StartParams) -> Response {
    let Some(me) = params.me.filter(|m| !m.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing me parameter").into_response();
    };

    let Some(redirect_uri) = state.callback_url(kind) else {
        tracing::error!(?kind, "no callback route registered");
        return (StatusCode::INTERNAL_SERVER_ERROR, "no callback route registered")
            .into_response();
    };

    let id = session_id(&cookies);
    let mut session = state.sessions.acquire(&id).await;

    let redirect = match kind {
        FlowKind::Authenticate => {
            state
                .client
                .start_authentication(&mut *session, &me, &redirect_uri, params.next.as_deref())
                .await
        }
        FlowKind::Authorize => {
            state
                .client
                .start_authorization(
                    &mut *session,
                    &me,
                    &redirect_uri,
                    params.next.as_deref(),
                    params.scope.as_deref(),
                )
                .await
        }
    };

    state.sessions.release(&id, session).await;

    match redirect {
        Ok(redirect) => Redirect::to(&redirect.location).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "could not start handshake");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

async fn finish(
    state: AppState,
    cookies: Cookies,
    kind: FlowKind,
    redirect_uri: &str,
    params: CallbackParams,
    handler: CallbackHandler,
) -> Response {
    let id = session_id(&cookies);
    let mut session = state.sessions.acquire(&id).await;

    let result = match kind {
        FlowKind::Authenticate => {
            state
                .client
                .handle_authentication_callback(&mut *session, &params, redirect_uri)
                .await
        }
        FlowKind::Authorize => {
            state
                .client
                .handle_authorization_callback(&mut *session, &params, redirect_uri)
                .await
        }
    };

    state.sessions.release(&id, session).await;

    handler(result)
}
