//! Middleware to automatically attach authorization to outgoing requests
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`AccessTokenMiddleware`] in the middleware stack to send
//! the access token held by a [`TokenCache`] with each outbound request.
//!
//! If a request already has specified an `Authorization` header value by
//! the time that the middleware executes, the existing value will be left
//! in place, allowing overrides to be specified as required. When the cache
//! has no usable token, the request is not sent and a middleware error is
//! returned instead.
//!
//! ```
//! use tessera_reqwest::AccessTokenMiddleware;
//! use tessera_tokens::{CacheConfig, TokenCache};
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//! # use tessera_clock::DurationSecs;
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
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let cache = TokenCache::new(Authority, CacheConfig::default());
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(AccessTokenMiddleware::new(cache))
//!     .build();
//!
//! let req = client
//!     .get("https://example.com");
//! # async move { req
//!     .send()
//!     .await
//!     .unwrap();
//! # };
//! # }
//! ```
//!
//! The middleware can also be configured to add an authorization token
//! only conditionally. This can be useful in the event that you want to
//! use a single common middleware stack with multiple potential backends
//! and want to ensure that specific tokens are used for specific backends.
//!
//! These predicates can be composed together to evaluate more complex
//! requirements prior to attaching a token to a request.
//!
//! ```
//! use tessera_reqwest::{
//!     AccessTokenMiddleware, ExactHostMatch, HttpsOnly
//! };
//! use predicates::prelude::PredicateBooleanExt;
//! # use tessera_clock::DurationSecs;
//! # use tessera_tokens::{
//! #    AccessToken, CacheConfig, RefreshTokenRef, Token, TokenCache, TokenProvider,
//! # };
//! # #[derive(Debug)]
//! # struct Authority;
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
//! # let cache = TokenCache::new(Authority, CacheConfig::default());
//!
//! AccessTokenMiddleware::new(cache)
//!     .with_predicate(HttpsOnly.and(ExactHostMatch::new("example.com")));
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::fmt;

use bytes::{BufMut, BytesMut};
use predicates::{prelude::*, reflection};
use reqwest::{header, Request, Response};
use reqwest_middleware::{Error, Middleware, Next, Result};
use tessera_clock::{Clock, System};
use tessera_tokens::{AccessTokenRef, TokenCache, TokenProvider};

/// A middleware that injects an access token into outgoing requests
pub struct AccessTokenMiddleware<P, C = System, Pred = HttpsOnly> {
    cache: TokenCache<P, C>,
    predicate: Pred,
}

impl<P, C> AccessTokenMiddleware<P, C, HttpsOnly> {
    /// Construct a new middleware from a token cache
    ///
    /// By default, this middleware will only send its token if the request
    /// is being sent via HTTPS. To change this behavior, provide a
    /// custom predicate with [`with_predicate()`][Self::with_predicate()].
    pub fn new(cache: TokenCache<P, C>) -> Self {
        Self {
            cache,
            predicate: HttpsOnly,
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<Pred>(self, predicate: Pred) -> AccessTokenMiddleware<P, C, Pred> {
        AccessTokenMiddleware {
            cache: self.cache,
            predicate,
        }
    }
}

impl<P, C, Pred> AccessTokenMiddleware<P, C, Pred> {
    /// The cache tokens are drawn from
    pub fn cache(&self) -> &TokenCache<P, C> {
        &self.cache
    }
}

impl<P, C, Pred> AccessTokenMiddleware<P, C, Pred>
where
    P: TokenProvider + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn authorization(&self) -> Result<header::HeaderValue> {
        let token = self.cache.get_access_token().await.map_err(Error::middleware)?;

        tracing::trace!(
            token.status = ?self.cache.status(),
            token = format_args!("{:#?}", token),
            "obtained access token"
        );

        bearer(&token).map_err(Error::middleware)
    }
}

fn bearer(token: &AccessTokenRef) -> std::result::Result<header::HeaderValue, header::InvalidHeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = header::HeaderValue::from_maybe_shared(header_value.freeze())?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait::async_trait]
impl<P, C, Pred> Middleware for AccessTokenMiddleware<P, C, Pred>
where
    P: TokenProvider + 'static,
    C: Clock + Send + Sync + 'static,
    Pred: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if self.predicate.eval(&req) && !req.headers().contains_key(header::AUTHORIZATION) {
            let value = self.authorization().await?;
            req.headers_mut().insert(header::AUTHORIZATION, value);
        }

        next.run(req, extensions).await
    }
}

impl<P, C, Pred: Clone> Clone for AccessTokenMiddleware<P, C, Pred> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<P, C, Pred> fmt::Debug for AccessTokenMiddleware<P, C, Pred>
where
    P: fmt::Debug,
    C: fmt::Debug,
    Pred: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenMiddleware")
            .field("cache", &self.cache)
            .field("predicate", &self.predicate)
            .finish()
    }
}

/// Only attach an access token if the request is being sent over HTTPS
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<Request> for HttpsOnly {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "scheme",
                    req.url().scheme().to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https")
    }
}

/// Only attach an access token if the request is being sent to the exact host specified
#[derive(Clone, Debug)]
pub struct ExactHostMatch {
    host: String,
}

impl ExactHostMatch {
    /// Construct a new predicate from a host string
    pub fn new<S>(host: S) -> Self
    where
        S: ToString,
    {
        Self {
            host: host.to_string(),
        }
    }
}

impl Predicate<Request> for ExactHostMatch {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().host_str() == Some(&self.host)
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "host",
                    req.url()
                        .host_str()
                        .unwrap_or("<value not valid utf-8>")
                        .to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for ExactHostMatch {}
impl fmt::Display for ExactHostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("host == ")?;
        f.write_str(&self.host)
    }
}
