use std::path::PathBuf;

use url::Url;

/// Libraries used when `SHIELDWALL_LIBRARIES` is not set.
pub const DEFAULT_LIBRARIES: &str = r#"{
  "core": {
    "js": [
      {"type": "file", "data": "/js/app.js", "scope": "header"},
      {"type": "inline", "data": "document.documentElement.classList.add('js');"}
    ],
    "css": [
      {"type": "file", "data": "/css/app.css"}
    ]
  }
}"#;

/// When a request may be served in nonce mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoncePolicy {
    Always,
    Never,
    /// Only requests carrying a session; anonymous pages may be cached and shared.
    Session,
}

impl NoncePolicy {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "always" => Self::Always,
            "never" => Self::Never,
            _ => Self::Session,
        }
    }

    pub fn allows(self, has_session: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Session => has_session,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub csp_enabled: bool,
    pub nonce_policy: NoncePolicy,
    pub asset_root: PathBuf,
    pub public_origin: Option<Url>,
    pub libraries_path: Option<PathBuf>,
    pub page_libraries: Vec<String>,
    pub session_cookie: String,
    pub cookie_samesite: String,
    pub cookie_lifetime_secs: u64,
    pub require_https: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        let public_origin = lookup("SHIELDWALL_PUBLIC_ORIGIN").and_then(|origin| {
            Url::parse(&origin)
                .inspect_err(|err| {
                    tracing::warn!(%origin, error = %err, "ignoring invalid SHIELDWALL_PUBLIC_ORIGIN")
                })
                .ok()
        });

        let page_libraries = lookup("SHIELDWALL_PAGE_LIBRARIES")
            .unwrap_or_else(|| "core".to_string())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();

        Self {
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
            csp_enabled: flag("SHIELDWALL_CSP_ENABLED", true),
            nonce_policy: NoncePolicy::parse(
                &lookup("SHIELDWALL_NONCE_POLICY").unwrap_or_default(),
            ),
            asset_root: lookup("SHIELDWALL_ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./public")),
            public_origin,
            libraries_path: lookup("SHIELDWALL_LIBRARIES").map(PathBuf::from),
            page_libraries,
            session_cookie: lookup("SHIELDWALL_SESSION_COOKIE")
                .unwrap_or_else(|| "sw_session".to_string()),
            cookie_samesite: lookup("SHIELDWALL_COOKIE_SAMESITE")
                .unwrap_or_else(|| "Strict".to_string()),
            cookie_lifetime_secs: lookup("SHIELDWALL_COOKIE_LIFETIME")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            require_https: flag("SHIELDWALL_REQUIRE_HTTPS", false),
        }
    }
}
