use std::sync::Arc;

use shieldwall_core::assets::LibraryAssetResolver;
use shieldwall_core::hash::FileHasher;
use shieldwall_core::render::RenderPipeline;
use shieldwall_core::session::{CookieSessionConfiguration, SessionCookiePolicy};

use crate::config::Settings;

pub type SessionConfig = SessionCookiePolicy<CookieSessionConfiguration>;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub resolver: Arc<LibraryAssetResolver>,
    pub hasher: Arc<FileHasher>,
    pub sessions: Arc<SessionConfig>,
    pub pipeline: Arc<RenderPipeline>,
}

impl AppState {
    pub fn new(settings: Settings, resolver: LibraryAssetResolver) -> Self {
        let mut hasher = FileHasher::new(&settings.asset_root);
        if let Some(origin) = settings.public_origin.clone() {
            hasher = hasher.with_origin(origin);
        }

        let sessions = SessionCookiePolicy::new(CookieSessionConfiguration {
            cookie_name: settings.session_cookie.clone(),
            lifetime_secs: settings.cookie_lifetime_secs,
            secure: settings.require_https,
            same_site: settings.cookie_samesite.clone(),
        });

        Self {
            settings: Arc::new(settings),
            resolver: Arc::new(resolver),
            hasher: Arc::new(hasher),
            sessions: Arc::new(sessions),
            pipeline: Arc::new(RenderPipeline::with_csp()),
        }
    }
}
