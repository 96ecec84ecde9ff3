//! DTOs for interacting with an OAuth2 token endpoint

use aliri_braid::braid;
use serde::{Deserialize, Serialize, Serializer};
use tessera_clock::{DurationSecs, UnixTime};
use tessera_tokens::{AccessTokenRef, ClientId, ClientSecret, RefreshTokenRef};

/// The audience (API identifier) a token is requested for
#[braid(serde)]
pub struct Audience;

/// Client credentials
#[derive(Debug, Serialize)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

/// Body of a client credentials grant
#[derive(Debug)]
pub(crate) struct ClientCredentialsGrant<'a> {
    pub credentials: &'a ClientCredentials,
    pub audience: &'a AudienceRef,
}

impl Serialize for ClientCredentialsGrant<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentialsGrant", 4)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.serialize_field("client_id", &self.credentials.client_id)?;
        ser.serialize_field("client_secret", &self.credentials.client_secret)?;
        ser.serialize_field("audience", self.audience)?;
        ser.end()
    }
}

/// Body of a refresh token grant
#[derive(Debug)]
pub(crate) struct RefreshTokenGrant<'a> {
    pub credentials: &'a ClientCredentials,
    pub refresh_token: &'a RefreshTokenRef,
}

impl Serialize for RefreshTokenGrant<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshTokenGrant", 4)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        ser.serialize_field("client_id", &self.credentials.client_id)?;
        ser.serialize_field("client_secret", &self.credentials.client_secret)?;
        ser.serialize_field("refresh_token", self.refresh_token)?;
        ser.end()
    }
}

/// Body of a refresh token revocation
#[derive(Debug, Serialize)]
pub(crate) struct Revocation<'a> {
    pub client_id: &'a ClientId,
    pub client_secret: &'a ClientSecret,
    pub token: &'a RefreshTokenRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse<'a> {
    #[serde(borrow)]
    pub access_token: &'a AccessTokenRef,
    #[serde(borrow, default)]
    pub refresh_token: Option<&'a RefreshTokenRef>,
    pub expires_in: DurationSecs,
    #[serde(default)]
    pub expires_at: Option<UnixTime>,
}
