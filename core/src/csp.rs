// Content-Security-Policy header assembly.
//
// Script and style sources come from the request policy: the nonce in nonce
// mode, the stored hashes in hash mode. Everything else is a fixed baseline.

use crate::hash::HashStore;
use crate::policy::{CspMode, RequestPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    sources: Vec<String>,
}

impl ContentSecurityPolicy {
    pub fn for_request(policy: &RequestPolicy, store: &HashStore) -> Self {
        let sources = match policy.mode() {
            CspMode::Nonce(nonce) => vec![format!("'nonce-{nonce}'")],
            CspMode::Hash => store
                .hashes()
                .into_iter()
                .map(|hash| format!("'{hash}'"))
                .collect(),
        };
        Self { sources }
    }

    fn source_list(&self) -> String {
        std::iter::once("'self'")
            .chain(self.sources.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn header_value(&self) -> String {
        let sources = self.source_list();
        // - script-src/style-src: only self plus the request nonce or stored hashes
        // - object-src: block plugins
        // - base-uri: prevent base tag injection
        // - frame-ancestors: prevent clickjacking
        // - form-action: forms submit to same origin only
        format!(
            "default-src 'self'; \
             script-src {sources}; \
             style-src {sources}; \
             object-src 'none'; \
             base-uri 'self'; \
             frame-ancestors 'none'; \
             form-action 'self'"
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::Nonce;
    use crate::hash::{FileHasher, HashSink};

    #[test]
    fn nonce_mode_allows_only_the_nonce() {
        let store = Arc::new(HashStore::new());
        store.store_hash("sha256-ignored");
        let policy = RequestPolicy::with_nonce(
            true,
            Nonce::from("abc123"),
            store.clone(),
            Arc::new(FileHasher::new("public")),
        );

        let value = ContentSecurityPolicy::for_request(&policy, &store).header_value();

        assert!(value.contains("script-src 'self' 'nonce-abc123';"));
        assert!(value.contains("style-src 'self' 'nonce-abc123';"));
        assert!(!value.contains("sha256"));
    }

    #[test]
    fn hash_mode_lists_stored_hashes() {
        let store = Arc::new(HashStore::new());
        let policy =
            RequestPolicy::with_hashes(true, store.clone(), Arc::new(FileHasher::new("public")));
        policy.store_hash("sha256-b");
        policy.store_hash("sha256-a");

        let value = ContentSecurityPolicy::for_request(&policy, &store).header_value();

        assert_eq!(
            value,
            "default-src 'self'; script-src 'self' 'sha256-a' 'sha256-b'; \
             style-src 'self' 'sha256-a' 'sha256-b'; object-src 'none'; base-uri 'self'; \
             frame-ancestors 'none'; form-action 'self'"
        );
    }
}
