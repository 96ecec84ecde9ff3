//! A token provider that uses an OAuth2 server as an authority

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::Url;
use tessera_tokens::{ClientIdRef, RefreshTokenRef, Token, TokenProvider};
use thiserror::Error;

use crate::dto::{
    Audience, AudienceRef, ClientCredentials, ClientCredentialsGrant, RefreshTokenGrant,
    Revocation, TokenResponse,
};

const TOKEN_PATH: &str = "oauth/token";
const REVOKE_PATH: &str = "oauth/revoke";

/// A provider for the client credentials flow against an Auth0-style authority
///
/// Tokens are requested from `oauth/token` and refresh tokens revoked at
/// `oauth/revoke`, both relative to the authority's base URL.
#[derive(Debug)]
pub struct ClientCredentialsProvider<T = JsonBody> {
    client: reqwest::Client,
    base_url: Url,
    credentials: ClientCredentials,
    audience: Audience,
    content_type: PhantomData<fn() -> T>,
}

impl ClientCredentialsProvider<JsonBody> {
    /// Constructs a new client credentials provider
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        credentials: ClientCredentials,
        audience: Audience,
    ) -> Self {
        Self {
            client,
            base_url: with_trailing_slash(base_url),
            credentials,
            audience,
            content_type: PhantomData,
        }
    }

    /// Constructs a new client credentials provider from the authority's domain
    ///
    /// A bare domain such as `tenant.auth0.com` is reached over HTTPS. A
    /// value that already names an `http` or `https` scheme is used as-is.
    pub fn from_domain(
        client: reqwest::Client,
        domain: &str,
        credentials: ClientCredentials,
        audience: Audience,
    ) -> Result<Self, InvalidDomain> {
        let base_url = base_url_for_domain(domain)?;
        Ok(Self::new(client, base_url, credentials, audience))
    }

    /// Configures the provider to send credentials to
    /// the authority as form data
    pub fn using_form_data(self) -> ClientCredentialsProvider<FormBody> {
        ClientCredentialsProvider {
            client: self.client,
            base_url: self.base_url,
            credentials: self.credentials,
            audience: self.audience,
            content_type: PhantomData,
        }
    }
}

impl<T> ClientCredentialsProvider<T> {
    /// The authority's base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The client ID presented to the authority
    pub fn client_id(&self) -> &ClientIdRef {
        &self.credentials.client_id
    }

    /// The audience tokens are requested for
    pub fn audience(&self) -> &AudienceRef {
        &self.audience
    }

    fn endpoint(&self, path: &'static str) -> Result<Url, TokenRequestError> {
        self.base_url
            .join(path)
            .map_err(|_| TokenRequestError::InvalidEndpoint(path))
    }
}

#[async_trait]
impl<T: RequestType> TokenProvider for ClientCredentialsProvider<T> {
    type Error = TokenRequestError;

    async fn request_access_token(&self) -> Result<Token, Self::Error> {
        let payload = ClientCredentialsGrant {
            credentials: &self.credentials,
            audience: &self.audience,
        };

        request_token::<_, T>(
            &self.client,
            self.endpoint(TOKEN_PATH)?,
            "client_credentials",
            &self.credentials.client_id,
            &payload,
        )
        .await
    }

    async fn renew_access_token(&self, refresh_token: &RefreshTokenRef) -> Result<Token, Self::Error> {
        let payload = RefreshTokenGrant {
            credentials: &self.credentials,
            refresh_token,
        };

        let token = request_token::<_, T>(
            &self.client,
            self.endpoint(TOKEN_PATH)?,
            "refresh_token",
            &self.credentials.client_id,
            &payload,
        )
        .await?;

        // Non-rotating authorities omit the refresh token on renewal
        if token.refresh_token().is_none() {
            Ok(token.with_refresh_token(refresh_token.to_owned()))
        } else {
            Ok(token)
        }
    }

    #[tracing::instrument(
        err,
        skip(self, refresh_token),
        fields(client_id = %self.credentials.client_id),
    )]
    async fn revoke_refresh_token(&self, refresh_token: &RefreshTokenRef) -> Result<(), Self::Error> {
        let payload = Revocation {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            token: refresh_token,
        };

        let req = T::attach_payload(self.client.post(self.endpoint(REVOKE_PATH)?), &payload);
        let resp = req.send().await.map_err(TokenRequestError::RequestSend)?;
        check_status(resp).await?;

        tracing::info!("revoked refresh token");
        Ok(())
    }
}

/// The authority's domain could not be turned into a base URL
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("`{domain}` is not a valid authority domain")]
pub struct InvalidDomain {
    /// The rejected domain
    pub domain: String,
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// An error from the authority with an error body
    #[error("error requesting token from authority: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from authority")]
    TokenBodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(reqwest::Error),
    /// Unable to send a token request to the authority
    #[error("error sending request to authority")]
    RequestSend(reqwest::Error),
    /// The endpoint path could not be resolved against the base URL
    #[error("unable to resolve `{0}` against the authority's base URL")]
    InvalidEndpoint(&'static str),
}

pub(crate) fn base_url_for_domain(domain: &str) -> Result<Url, InvalidDomain> {
    let domain = domain.trim();
    let invalid = || InvalidDomain {
        domain: domain.to_owned(),
    };

    if domain.is_empty() {
        return Err(invalid());
    }

    let url = if domain.starts_with("https://") || domain.starts_with("http://") {
        Url::parse(domain)
    } else {
        Url::parse(&format!("https://{domain}/"))
    }
    .map_err(|_| invalid())?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(invalid());
    }

    Ok(with_trailing_slash(url))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TokenRequestError> {
    if let Err(error) = resp.error_for_status_ref() {
        let body = resp
            .text()
            .await
            .map_err(TokenRequestError::BodyReadError)?;
        return Err(TokenRequestError::ErrorWithBody {
            source: error,
            body,
        });
    }

    Ok(resp)
}

#[tracing::instrument(
    err,
    skip(client, token_url, grant_type, client_id, payload),
    fields(
        token_url = %token_url,
        credentials.grant_type = grant_type,
        credentials.client_id = %client_id,
    ),
)]
async fn request_token<S: serde::Serialize, T: RequestType>(
    client: &reqwest::Client,
    token_url: Url,
    grant_type: &'static str,
    client_id: &ClientIdRef,
    payload: &S,
) -> Result<Token, TokenRequestError> {
    tracing::trace!("requesting token from authority");

    let req = T::attach_payload(client.post(token_url), payload);
    let resp = req.send().await.map_err(TokenRequestError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received token response from issuing authority"
    );

    let resp = check_status(resp).await?;
    let body = resp
        .bytes()
        .await
        .map_err(TokenRequestError::BodyReadError)?;
    let resp: TokenResponse = serde_json::from_slice(&body)?;

    let mut token = Token::new(resp.access_token.to_owned(), resp.expires_in);
    if let Some(expires_at) = resp.expires_at {
        token = token.with_expires_at(expires_at);
    }
    if let Some(rt) = resp.refresh_token {
        tracing::info!("received new refresh token");
        token = token.with_refresh_token(rt.to_owned());
    }

    tracing::info!(
        has_refresh_token = resp.refresh_token.is_some(),
        expires_in = resp.expires_in.0,
        expires_at = resp.expires_at.map(|t| t.0),
        "received new access token"
    );

    Ok(token)
}

/// A manner of attaching a serializable payload to a request
pub trait RequestType: Send + Sync + 'static {
    /// Attaches the serializable payload to the request body
    fn attach_payload<S: serde::Serialize>(
        request: reqwest::RequestBuilder,
        payload: &S,
    ) -> reqwest::RequestBuilder;
}

/// Attaches credentials to the request body as JSON
#[derive(Debug)]
pub struct JsonBody;

/// Attaches credentials to the request body as URL-encoded form data
#[derive(Debug)]
pub struct FormBody;

impl RequestType for JsonBody {
    fn attach_payload<S: serde::Serialize>(
        request: reqwest::RequestBuilder,
        payload: &S,
    ) -> reqwest::RequestBuilder {
        request.json(payload)
    }
}

impl RequestType for FormBody {
    fn attach_payload<S: serde::Serialize>(
        request: reqwest::RequestBuilder,
        payload: &S,
    ) -> reqwest::RequestBuilder {
        request.form(payload)
    }
}
