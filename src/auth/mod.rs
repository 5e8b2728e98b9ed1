//! IndieAuth sign-in and Micropub token handshake
//!
//! # Module Layout
//!
//! - [`discovery`] -- endpoint discovery from `Link` headers and HTML
//! - [`flow`]      -- initiation and callback handling
//! - [`http`]      -- outbound HTTP capability
//! - [`result`]    -- callback parameters, redirects and handshake results
//! - [`session`]   -- per-user session capability
//! - [`state`]     -- CSRF-protected `state` parameter
//! - [`token`]     -- Micropub access token exchange

pub mod discovery;
pub mod flow;
pub mod http;
pub mod result;
pub mod session;
pub mod state;
pub mod token;

pub use discovery::EndpointSet;
pub use flow::IndieAuthClient;
pub use result::{AuthResult, CallbackParams, RedirectInstruction};
pub use session::{MemorySession, SessionStore};
