use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{CONTENT_SECURITY_POLICY, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use shieldwall_core::crypto::Nonce;
use shieldwall_core::csp::ContentSecurityPolicy;
use shieldwall_core::hash::HashStore;
use shieldwall_core::policy::RequestPolicy;
use shieldwall_core::session::SessionConfiguration;

use crate::error::AppError;
use crate::state::AppState;

/// CSP context for the current request, inserted by [`apply`].
///
/// Handlers pass `policy` to every decorator they use; the middleware builds
/// the response header from the same policy and `store` afterwards.
#[derive(Clone, Debug)]
pub struct RequestCsp {
    pub policy: RequestPolicy,
    pub store: Arc<HashStore>,
}

impl RequestCsp {
    pub fn for_request(state: &AppState, parts: &Parts) -> Self {
        let store = Arc::new(HashStore::new());
        let sends_csp_header = state.settings.csp_enabled;
        let has_session = state.sessions.has_session(parts);

        let policy = if state.settings.nonce_policy.allows(has_session) {
            RequestPolicy::with_nonce(
                sends_csp_header,
                Nonce::generate(),
                store.clone(),
                state.hasher.clone(),
            )
        } else {
            RequestPolicy::with_hashes(sends_csp_header, store.clone(), state.hasher.clone())
        };
        tracing::debug!(
            path = %parts.uri.path(),
            has_session,
            nonce = policy.can_use_nonce(),
            "resolved request CSP mode"
        );

        Self { policy, store }
    }
}

impl<S> FromRequestParts<S> for RequestCsp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Fails when the route is not behind [`apply`].
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            AppError::Internal("CSP context missing from request extensions".to_string())
        })
    }
}

/// Attach a [`RequestCsp`] to the request and, for HTML responses, emit the
/// `Content-Security-Policy` header assembled from it plus the baseline
/// security headers.
pub async fn apply(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let csp = RequestCsp::for_request(&state, &parts);
    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(csp.clone());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));

    let is_html = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || !csp.policy.sends_csp_header() {
        return response;
    }

    let value = ContentSecurityPolicy::for_request(&csp.policy, &csp.store).header_value();
    match HeaderValue::from_str(&value) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(err) => tracing::error!(error = %err, "CSP header value is not a valid header"),
    }
    response
}
