//! Named token caches, one per configured client

use std::collections::{btree_map, BTreeMap};

use tessera_clock::{Clock, System};
use thiserror::Error;

use crate::{AccessToken, TokenCache, TokenProvider, TokenUnavailable};

/// An error obtaining a token for a named client
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No cache is registered under this name
    #[error("no token cache registered for client `{0}`")]
    UnknownClient(String),
    /// The client's cache has no usable token
    #[error("access token for client `{client}` is unavailable")]
    Unavailable {
        /// The client name
        client: String,
        /// The underlying error
        #[source]
        source: TokenUnavailable,
    },
}

/// A registry mapping client names to their token caches
///
/// Built once at startup; lookups are by name.
#[derive(Debug)]
pub struct TokenCacheRegistry<P, C = System> {
    caches: BTreeMap<String, TokenCache<P, C>>,
}

impl<P, C> Default for TokenCacheRegistry<P, C> {
    fn default() -> Self {
        Self {
            caches: BTreeMap::new(),
        }
    }
}

impl<P, C> TokenCacheRegistry<P, C> {
    /// Constructs an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under `name`, returning any cache it replaces
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        cache: TokenCache<P, C>,
    ) -> Option<TokenCache<P, C>> {
        self.caches.insert(name.into(), cache)
    }

    /// Gets the cache registered under `name`
    pub fn get(&self, name: &str) -> Option<&TokenCache<P, C>> {
        self.caches.get(name)
    }

    /// Registered client names, in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    /// Iterates over the registered caches by name
    pub fn iter(&self) -> btree_map::Iter<'_, String, TokenCache<P, C>> {
        self.caches.iter()
    }

    /// Number of registered caches
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether no cache is registered
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl<P, C> TokenCacheRegistry<P, C>
where
    P: TokenProvider + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Gets an access token from the cache registered under `name`
    pub async fn get_access_token(&self, name: &str) -> Result<AccessToken, RegistryError> {
        let cache = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownClient(name.to_owned()))?;

        cache
            .get_access_token()
            .await
            .map_err(|source| RegistryError::Unavailable {
                client: name.to_owned(),
                source,
            })
    }
}

impl<P, C> FromIterator<(String, TokenCache<P, C>)> for TokenCacheRegistry<P, C> {
    fn from_iter<I: IntoIterator<Item = (String, TokenCache<P, C>)>>(iter: I) -> Self {
        Self {
            caches: iter.into_iter().collect(),
        }
    }
}

impl<'a, P, C> IntoIterator for &'a TokenCacheRegistry<P, C> {
    type Item = (&'a String, &'a TokenCache<P, C>);
    type IntoIter = btree_map::Iter<'a, String, TokenCache<P, C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_clock::{DurationSecs, TestClock, UnixMillis};

    use super::*;
    use crate::{test_util::ScriptedProvider, CacheConfig};

    fn registry() -> (
        TokenCacheRegistry<Arc<ScriptedProvider>, TestClock>,
        Arc<ScriptedProvider>,
        Arc<ScriptedProvider>,
    ) {
        let clock = TestClock::new(UnixMillis(1_700_000_000_000));
        let one = Arc::new(ScriptedProvider::new().then_token("one-token", 300));
        let two = Arc::new(ScriptedProvider::new());

        let one_config = CacheConfig::builder()
            .refresh_thresholds(DurationSecs(15), DurationSecs(30))
            .throttle_times(DurationSecs(2), DurationSecs(300))
            .build()
            .unwrap();
        let two_config = CacheConfig::builder()
            .refresh_thresholds(DurationSecs(60), DurationSecs(120))
            .throttle_times(DurationSecs(3), DurationSecs(450))
            .build()
            .unwrap();

        let registry = [
            (
                "one".to_owned(),
                TokenCache::with_clock(Arc::clone(&one), one_config, clock.clone()),
            ),
            (
                "two".to_owned(),
                TokenCache::with_clock(Arc::clone(&two), two_config, clock),
            ),
        ]
        .into_iter()
        .collect();

        (registry, one, two)
    }

    #[test]
    fn each_client_keeps_its_own_configuration() {
        let (registry, _, _) = registry();

        let one = registry.get("one").unwrap();
        assert_eq!(one.must_refresh_threshold(), DurationSecs(15));
        assert_eq!(one.should_refresh_threshold(), DurationSecs(30));
        assert_eq!(one.min_throttle_time(), DurationSecs(2));
        assert_eq!(one.max_throttle_time(), DurationSecs(300));

        let two = registry.get("two").unwrap();
        assert_eq!(two.must_refresh_threshold(), DurationSecs(60));
        assert_eq!(two.should_refresh_threshold(), DurationSecs(120));
        assert_eq!(two.min_throttle_time(), DurationSecs(3));
        assert_eq!(two.max_throttle_time(), DurationSecs(450));

        assert_eq!(registry.names().collect::<Vec<_>>(), ["one", "two"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn tokens_are_served_per_client() {
        let (registry, one, two) = registry();

        let token = registry.get_access_token("one").await.unwrap();
        assert_eq!(token.as_str(), "one-token");

        assert_eq!(
            registry.get_access_token("two").await,
            Err(RegistryError::Unavailable {
                client: "two".to_owned(),
                source: TokenUnavailable,
            })
        );

        assert_eq!(one.requests(), 1);
        assert_eq!(two.requests(), 1);
    }

    #[tokio::test]
    async fn unknown_client_is_reported() {
        let (registry, _, _) = registry();

        assert_eq!(
            registry.get_access_token("three").await,
            Err(RegistryError::UnknownClient("three".to_owned()))
        );
    }
}
