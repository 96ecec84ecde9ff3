//! Facilities for caching and proactively refreshing access tokens
//!
//! This library keeps a short-lived bearer token on hand for a client and
//! shields callers from an authorization server that is briefly unavailable.
//! A [`TokenCache`] holds a single token obtained from a [`TokenProvider`]
//! and decides on every read whether that token can be served as-is, should
//! be replaced in the background, or must be replaced before answering.
//!
//! Two thresholds drive that decision, both counted back from the lifetime
//! the authority reported for the token:
//!
//! * the _should-refresh_ threshold: once crossed, the next read kicks off a
//!   reload in the background while every reader keeps getting the current
//!   token;
//! * the _must-refresh_ threshold: once crossed, reads wait for the reload.
//!
//! When a reload fails, the previous token keeps being served until its own
//! must-refresh point, and further reloads are retried with exponential
//! backoff between the configured minimum and maximum throttle times. Only
//! when no usable token is left do reads fail with [`TokenUnavailable`].
//!
//! At most one reload is in flight at any time; everyone waiting on a reload
//! receives that reload's outcome.
//!
//! ```
//! use tessera_clock::DurationSecs;
//! use tessera_tokens::{CacheConfig, TokenCache};
//! # use tessera_tokens::{AccessToken, RefreshTokenRef, Token, TokenProvider};
//! #
//! # #[derive(Debug)]
//! # struct Authority;
//! #
//! # #[async_trait::async_trait]
//! # impl TokenProvider for Authority {
//! #     type Error = std::io::Error;
//! #     async fn request_access_token(&self) -> Result<Token, Self::Error> {
//! #         Ok(Token::new(AccessToken::from_static("token"), DurationSecs(300)))
//! #     }
//! #     async fn renew_access_token(&self, _: &RefreshTokenRef) -> Result<Token, Self::Error> {
//! #         self.request_access_token().await
//! #     }
//! #     async fn revoke_refresh_token(&self, _: &RefreshTokenRef) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! #
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::builder()
//!     .refresh_thresholds(DurationSecs(10), DurationSecs(30))
//!     .build()?;
//!
//! let cache = TokenCache::new(Authority, config);
//!
//! let token = cache.get_access_token().await?;
//! tracing::info!(token = format_args!("{:#?}", token), "first access token");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod backoff;
mod braids;
mod cache;
pub mod config;
mod provider;
pub mod registry;
#[cfg(test)]
mod test_util;
mod tokens;

pub use braids::*;
pub use cache::{TokenCache, TokenUnavailable};
pub use config::{CacheConfig, CacheConfigBuilder, CacheSettings, ConfigError};
pub use provider::TokenProvider;
pub use registry::{RegistryError, TokenCacheRegistry};
pub use tokens::{CacheStatus, CachedToken, Token, TokenSnapshot};
