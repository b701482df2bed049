use std::collections::BTreeMap;

use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use http::header::COOKIE;
use http::request::Parts;

pub const COOKIE_NAME: &str = "cookie_name";
pub const COOKIE_PATH: &str = "cookie_path";
pub const COOKIE_LIFETIME: &str = "cookie_lifetime";
pub const COOKIE_HTTPONLY: &str = "cookie_httponly";
pub const COOKIE_SECURE: &str = "cookie_secure";
pub const COOKIE_SAMESITE: &str = "cookie_samesite";

/// Cookie configuration for one request's session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions(BTreeMap<String, String>);

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| value == "true")
    }

    fn same_site(&self) -> Option<SameSite> {
        match self.get(COOKIE_SAMESITE)?.to_ascii_lowercase().as_str() {
            "lax" => Some(SameSite::Lax),
            "strict" => Some(SameSite::Strict),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }

    /// Build the session cookie carrying `session_id` under these options.
    ///
    /// A lifetime of `0`, or one that is not a positive number, yields a
    /// browser-session cookie without `Max-Age`.
    pub fn cookie(&self, session_id: &str) -> Cookie<'static> {
        let mut cookie = Cookie::build((
            self.get(COOKIE_NAME).unwrap_or("session").to_string(),
            session_id.to_string(),
        ))
        .path(self.get(COOKIE_PATH).unwrap_or("/").to_string())
        .http_only(self.flag(COOKIE_HTTPONLY))
        .secure(self.flag(COOKIE_SECURE));
        if let Some(same_site) = self.same_site() {
            cookie = cookie.same_site(same_site);
        }
        if let Some(secs) = self
            .get(COOKIE_LIFETIME)
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
        {
            cookie = cookie.max_age(Duration::seconds(secs));
        }
        cookie.build()
    }

    /// `Set-Cookie` header value for [`SessionOptions::cookie`].
    pub fn set_cookie_header(&self, session_id: &str) -> String {
        self.cookie(session_id).to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

pub trait SessionConfiguration {
    fn has_session(&self, request: &Parts) -> bool;

    fn options(&self, request: &Parts) -> SessionOptions;
}

impl<C: SessionConfiguration + ?Sized> SessionConfiguration for &C {
    fn has_session(&self, request: &Parts) -> bool {
        (**self).has_session(request)
    }

    fn options(&self, request: &Parts) -> SessionOptions {
        (**self).options(request)
    }
}

/// Session configuration that keys sessions on a named cookie.
#[derive(Debug, Clone)]
pub struct CookieSessionConfiguration {
    pub cookie_name: String,
    pub lifetime_secs: u64,
    pub secure: bool,
    pub same_site: String,
}

impl CookieSessionConfiguration {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            lifetime_secs: 0,
            secure: false,
            same_site: "Strict".to_string(),
        }
    }

    /// Value of the session cookie on `request`, if present and non-empty.
    pub fn session_id(&self, request: &Parts) -> Option<String> {
        request
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl SessionConfiguration for CookieSessionConfiguration {
    fn has_session(&self, request: &Parts) -> bool {
        self.session_id(request).is_some()
    }

    fn options(&self, _request: &Parts) -> SessionOptions {
        [
            (COOKIE_NAME, self.cookie_name.clone()),
            (COOKIE_PATH, "/".to_string()),
            (COOKIE_LIFETIME, self.lifetime_secs.to_string()),
            (COOKIE_HTTPONLY, "true".to_string()),
            (COOKIE_SECURE, self.secure.to_string()),
            (COOKIE_SAMESITE, self.same_site.clone()),
        ]
        .into_iter()
        .collect()
    }
}

/// Decorator forcing `SameSite=Lax` on whatever the wrapped configuration emits.
pub struct SessionCookiePolicy<C> {
    inner: C,
}

impl<C: SessionConfiguration> SessionCookiePolicy<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: SessionConfiguration> SessionConfiguration for SessionCookiePolicy<C> {
    fn has_session(&self, request: &Parts) -> bool {
        self.inner.has_session(request)
    }

    fn options(&self, request: &Parts) -> SessionOptions {
        let mut options = self.inner.options(request);
        options.insert(COOKIE_SAMESITE, "Lax");
        options
    }
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn parts(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(()).unwrap().into_parts().0
    }

    struct Stub {
        session: bool,
        options: SessionOptions,
    }

    impl SessionConfiguration for Stub {
        fn has_session(&self, _: &Parts) -> bool {
            self.session
        }

        fn options(&self, _: &Parts) -> SessionOptions {
            self.options.clone()
        }
    }

    #[test]
    fn has_session_passes_through() {
        for session in [true, false] {
            let policy = SessionCookiePolicy::new(Stub {
                session,
                options: SessionOptions::new(),
            });
            assert_eq!(policy.has_session(&parts(None)), session);
        }
    }

    #[test]
    fn options_force_lax_over_any_value() {
        for same_site in [Some("Strict"), Some("None"), Some("Lax"), None] {
            let mut options: SessionOptions = [(COOKIE_NAME, "sid")].into_iter().collect();
            if let Some(same_site) = same_site {
                options.insert(COOKIE_SAMESITE, same_site);
            }
            let policy = SessionCookiePolicy::new(Stub {
                session: true,
                options: options.clone(),
            });

            let forced = policy.options(&parts(None));

            options.insert(COOKIE_SAMESITE, "Lax");
            assert_eq!(forced, options);
        }
    }

    #[test]
    fn cookie_configuration_detects_session_cookie() {
        let config = CookieSessionConfiguration::new("sw_session");
        assert!(config.has_session(&parts(Some("theme=dark; sw_session=abc"))));
        assert_eq!(
            config.session_id(&parts(Some("sw_session=abc"))).as_deref(),
            Some("abc")
        );
        assert!(!config.has_session(&parts(Some("sw_session="))));
        assert!(!config.has_session(&parts(Some("other=abc"))));
        assert!(!config.has_session(&parts(None)));
    }

    #[test]
    fn session_id_skips_malformed_pairs() {
        let config = CookieSessionConfiguration::new("sw_session");
        assert_eq!(
            config
                .session_id(&parts(Some("garbage; =x; sw_session=abc")))
                .as_deref(),
            Some("abc")
        );
        assert!(!config.has_session(&parts(Some("sw_session_old=abc"))));
    }

    #[test]
    fn set_cookie_header_reflects_policy_options() {
        let mut config = CookieSessionConfiguration::new("sw_session");
        config.secure = true;
        config.lifetime_secs = 3600;
        let policy = SessionCookiePolicy::new(&config);

        let forced = Cookie::parse(policy.options(&parts(None)).set_cookie_header("abc"))
            .expect("set-cookie value should parse");
        assert_eq!(forced.name(), "sw_session");
        assert_eq!(forced.value(), "abc");
        assert_eq!(forced.path(), Some("/"));
        assert_eq!(forced.max_age(), Some(Duration::seconds(3600)));
        assert_eq!(forced.http_only(), Some(true));
        assert_eq!(forced.secure(), Some(true));
        assert_eq!(forced.same_site(), Some(SameSite::Lax));

        let inner = Cookie::parse(config.options(&parts(None)).set_cookie_header("abc"))
            .expect("set-cookie value should parse");
        assert_eq!(inner.same_site(), Some(SameSite::Strict));
    }

    #[test]
    fn cookie_omits_max_age_for_session_and_invalid_lifetimes() {
        for lifetime in ["0", "-5", "soon", "99999999999999999999"] {
            let options: SessionOptions = [(COOKIE_NAME, "sid"), (COOKIE_LIFETIME, lifetime)]
                .into_iter()
                .collect();
            assert_eq!(options.cookie("abc").max_age(), None, "lifetime {lifetime}");
        }

        let options: SessionOptions = [(COOKIE_LIFETIME, "9223372036854775807")]
            .into_iter()
            .collect();
        assert_eq!(
            options.cookie("abc").max_age(),
            Some(Duration::seconds(i64::MAX))
        );
    }

    #[test]
    fn cookie_same_site_is_case_insensitive_and_ignores_unknown_values() {
        let same_site = |value: &str| {
            let options: SessionOptions = [(COOKIE_SAMESITE, value)].into_iter().collect();
            options.cookie("abc").same_site()
        };
        assert_eq!(same_site("lax"), Some(SameSite::Lax));
        assert_eq!(same_site("STRICT"), Some(SameSite::Strict));
        assert_eq!(same_site("sideways"), None);
    }
}
