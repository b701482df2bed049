//! Content-Security-Policy decorators for server-rendered pages.
//!
//! Three decorators wrap host services and apply CSP per request:
//! [`assets::AssetPolicyFilter`] (script asset resolution),
//! [`render::RenderPreprocessor`] (root render element) and
//! [`session::SessionCookiePolicy`] (session cookie options). All of them read
//! the same request-scoped [`policy::RequestPolicy`].

pub mod assets;
pub mod crypto;
pub mod csp;
pub mod error;
pub mod hash;
pub mod policy;
pub mod render;
pub mod session;

pub use error::{Error, Result};
