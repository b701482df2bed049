use axum::extract::State;
use axum::response::Html;
use axum::{Router, routing::get};
use serde_json::json;
use shieldwall_core::assets::{AssetPolicyFilter, AssetResolver, AttachedAssets};
use shieldwall_core::render::RenderElement;

use crate::error::AppError;
use crate::middleware::csp::RequestCsp;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Server-rendered landing page.
///
/// Assets go through [`AssetPolicyFilter`] and the finished tree through the
/// render pipeline, both with the request's CSP policy.
pub async fn index(
    State(state): State<AppState>,
    csp: RequestCsp,
) -> Result<Html<String>, AppError> {
    let attached = AttachedAssets::libraries(state.settings.page_libraries.iter().cloned())
        .with_settings(json!({ "path": "/" }));
    let resolver = AssetPolicyFilter::new(state.resolver.as_ref(), &csp.policy);

    let styles = resolver.resolve_styles(&attached, true)?;
    let scripts = resolver.resolve_scripts(&attached, true)?;

    let head = RenderElement::new("head")
        .child(RenderElement::new("meta").attr("charset", "utf-8"))
        .child(RenderElement::new("title").text("Shieldwall"))
        .children(styles.iter().filter_map(RenderElement::from_style))
        .children(scripts.header.iter().filter_map(RenderElement::from_script));
    let body = RenderElement::new("body")
        .child(RenderElement::new("main").child(RenderElement::new("h1").text("Shieldwall")))
        .children(scripts.footer.iter().filter_map(RenderElement::from_script));
    let tree = RenderElement::new("html")
        .attr("lang", "en")
        .child(head)
        .child(body);

    Ok(Html(state.pipeline.render(tree, &csp.policy)))
}
