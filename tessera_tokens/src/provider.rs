//! Token providers

use std::{error, sync::Arc};

use async_trait::async_trait;

use crate::{RefreshTokenRef, Token};

/// An asynchronous provider of tokens, usually backed by an authorization server
///
/// The cache only ever calls [`request_access_token()`](Self::request_access_token)
/// when reloading. The refresh token operations are available to callers that
/// manage refresh tokens themselves.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The error type returned in the event that talking to the authority fails
    type Error: error::Error + Send + Sync + 'static;

    /// Requests a freshly issued token without using any refresh token
    async fn request_access_token(&self) -> Result<Token, Self::Error>;

    /// Requests a new token in exchange for a refresh token
    async fn renew_access_token(&self, refresh_token: &RefreshTokenRef) -> Result<Token, Self::Error>;

    /// Invalidates a refresh token
    async fn revoke_refresh_token(&self, refresh_token: &RefreshTokenRef) -> Result<(), Self::Error>;
}

#[async_trait]
impl<P: TokenProvider + ?Sized> TokenProvider for Arc<P> {
    type Error = P::Error;

    async fn request_access_token(&self) -> Result<Token, Self::Error> {
        (**self).request_access_token().await
    }

    async fn renew_access_token(&self, refresh_token: &RefreshTokenRef) -> Result<Token, Self::Error> {
        (**self).renew_access_token(refresh_token).await
    }

    async fn revoke_refresh_token(&self, refresh_token: &RefreshTokenRef) -> Result<(), Self::Error> {
        (**self).revoke_refresh_token(refresh_token).await
    }
}

#[async_trait]
impl<P: TokenProvider + ?Sized> TokenProvider for Box<P> {
    type Error = P::Error;

    async fn request_access_token(&self) -> Result<Token, Self::Error> {
        (**self).request_access_token().await
    }

    async fn renew_access_token(&self, refresh_token: &RefreshTokenRef) -> Result<Token, Self::Error> {
        (**self).renew_access_token(refresh_token).await
    }

    async fn revoke_refresh_token(&self, refresh_token: &RefreshTokenRef) -> Result<(), Self::Error> {
        (**self).revoke_refresh_token(refresh_token).await
    }
}
