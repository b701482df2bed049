use std::sync::Arc;

use crate::crypto::Nonce;
use crate::error::Result;
use crate::hash::{HashSink, LocatorHasher};

/// How CSP allow-listing is done for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CspMode<'a> {
    /// Tags carry the request nonce.
    Nonce(&'a Nonce),
    /// Exact content hashes are allow-listed instead.
    Hash,
}

/// Request-scoped CSP context shared by every decorator handling one response.
///
/// The nonce/hash decision is fixed at construction: a policy built with a
/// nonce stays in nonce mode for its whole lifetime, so the asset filter and
/// the render preprocessor always agree.
#[derive(Clone)]
pub struct RequestPolicy {
    sends_csp_header: bool,
    nonce: Option<Nonce>,
    hashes: Arc<dyn HashSink>,
    hasher: Arc<dyn LocatorHasher>,
}

impl RequestPolicy {
    /// Policy in nonce mode.
    pub fn with_nonce(
        sends_csp_header: bool,
        nonce: Nonce,
        hashes: Arc<dyn HashSink>,
        hasher: Arc<dyn LocatorHasher>,
    ) -> Self {
        Self {
            sends_csp_header,
            nonce: Some(nonce),
            hashes,
            hasher,
        }
    }

    /// Policy in hash mode.
    pub fn with_hashes(
        sends_csp_header: bool,
        hashes: Arc<dyn HashSink>,
        hasher: Arc<dyn LocatorHasher>,
    ) -> Self {
        Self {
            sends_csp_header,
            nonce: None,
            hashes,
            hasher,
        }
    }

    pub fn sends_csp_header(&self) -> bool {
        self.sends_csp_header
    }

    pub fn can_use_nonce(&self) -> bool {
        self.nonce.is_some()
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }

    pub fn mode(&self) -> CspMode<'_> {
        match &self.nonce {
            Some(nonce) => CspMode::Nonce(nonce),
            None => CspMode::Hash,
        }
    }

    /// Hash source for the resource behind `locator`; empty results count as none.
    pub fn hash_from_locator(&self, locator: &str) -> Result<Option<String>> {
        Ok(self
            .hasher
            .hash_from_locator(locator)?
            .filter(|hash| !hash.is_empty()))
    }

    pub fn store_hash(&self, hash: &str) {
        self.hashes.store_hash(hash);
    }
}

impl std::fmt::Debug for RequestPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPolicy")
            .field("sends_csp_header", &self.sends_csp_header)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Sink that records every call, duplicates included.
    #[derive(Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HashSink for RecordingSink {
        fn store_hash(&self, hash: &str) {
            self.calls.lock().unwrap().push(hash.to_string());
        }
    }

    /// Hasher backed by a fixed locator table.
    #[derive(Default)]
    pub struct TableHasher(pub HashMap<String, String>);

    impl TableHasher {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(locator, hash)| (locator.to_string(), hash.to_string()))
                    .collect(),
            )
        }
    }

    impl LocatorHasher for TableHasher {
        fn hash_from_locator(&self, locator: &str) -> Result<Option<String>> {
            Ok(self.0.get(locator).cloned())
        }
    }

    pub fn nonce_policy(
        sends_csp_header: bool,
        nonce: &str,
    ) -> (RequestPolicy, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let policy = RequestPolicy::with_nonce(
            sends_csp_header,
            Nonce::from(nonce),
            sink.clone(),
            Arc::new(TableHasher::default()),
        );
        (policy, sink)
    }

    pub fn hash_policy(
        sends_csp_header: bool,
        table: &[(&str, &str)],
    ) -> (RequestPolicy, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let policy = RequestPolicy::with_hashes(
            sends_csp_header,
            sink.clone(),
            Arc::new(TableHasher::with(table)),
        );
        (policy, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn mode_follows_construction() {
        let (policy, _) = nonce_policy(true, "abc123");
        assert!(policy.can_use_nonce());
        assert_eq!(policy.mode(), CspMode::Nonce(&Nonce::from("abc123")));

        let (policy, _) = hash_policy(false, &[]);
        assert!(!policy.can_use_nonce());
        assert!(!policy.sends_csp_header());
        assert_eq!(policy.mode(), CspMode::Hash);
        assert_eq!(policy.nonce(), None);
    }

    #[test]
    fn empty_locator_hash_counts_as_none() {
        let (policy, _) = hash_policy(true, &[("a.js", "h1"), ("b.js", "")]);
        assert_eq!(policy.hash_from_locator("a.js").unwrap(), Some("h1".into()));
        assert_eq!(policy.hash_from_locator("b.js").unwrap(), None);
        assert_eq!(policy.hash_from_locator("c.js").unwrap(), None);
    }
}
