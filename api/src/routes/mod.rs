pub mod health;
pub mod page;
pub mod session;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::state::AppState;

/// Full application router; static files under the asset root are the fallback.
pub fn app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.settings.asset_root);

    Router::new()
        .merge(health::router())
        .merge(page::router())
        .merge(session::router())
        .fallback_service(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::csp::apply,
                )),
        )
        .with_state(state)
}
