//! Settings for one or many named Auth0 clients
//!
//! Settings are read from TOML. Cache thresholds may be set once at the top
//! level as defaults and overridden per client:
//!
//! ```toml
//! must_refresh_threshold = 60
//! should_refresh_threshold = 120
//!
//! [auth0.partner]
//! domain = "partner.eu.auth0.com"
//! client_id = "abc"
//! secret = "xyz"
//! audience = "https://api.example.com"
//! must_refresh_threshold = 15
//! should_refresh_threshold = 30
//! ```

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Deserialize;
use tessera_tokens::{
    CacheConfig, CacheSettings, ClientId, ClientSecret, ConfigError, TokenCache,
    TokenCacheRegistry,
};
use thiserror::Error;

use crate::{
    dto::{Audience, ClientCredentials},
    provider::{ClientCredentialsProvider, InvalidDomain},
};

/// An error turning settings into token caches
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required provider credential is missing or blank
    #[error("client `{client}` is missing required setting `{field}`")]
    MissingCredential {
        /// The client name
        client: String,
        /// The missing setting
        field: &'static str,
    },
    /// The cache thresholds for a client are invalid
    #[error("invalid cache settings for client `{client}`")]
    InvalidCache {
        /// The client name
        client: String,
        /// The underlying error
        #[source]
        source: ConfigError,
    },
    /// The domain for a client is not usable
    #[error("invalid domain for client `{client}`")]
    InvalidDomain {
        /// The client name
        client: String,
        /// The underlying error
        #[source]
        source: InvalidDomain,
    },
    /// The settings could not be parsed
    #[error("unable to parse settings")]
    Parse(#[from] toml::de::Error),
    /// The settings file could not be read
    #[error("unable to read settings file")]
    Io(#[from] io::Error),
}

/// Settings for a single Auth0 client
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// The authority's domain, or its base URL
    pub domain: Option<String>,
    /// The client ID
    pub client_id: Option<ClientId>,
    /// The client secret
    pub secret: Option<ClientSecret>,
    /// The audience to request tokens for
    pub audience: Option<Audience>,
    /// Cache overrides for this client
    #[serde(flatten)]
    pub cache: CacheSettings,
}

impl ClientSettings {
    /// Builds a provider from these settings
    pub fn provider(
        &self,
        name: &str,
        client: reqwest::Client,
    ) -> Result<ClientCredentialsProvider, SettingsError> {
        let missing = |field| SettingsError::MissingCredential {
            client: name.to_owned(),
            field,
        };

        let domain = self
            .domain
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| missing("domain"))?;
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.as_str().trim().is_empty())
            .ok_or_else(|| missing("client_id"))?;
        let client_secret = self
            .secret
            .clone()
            .filter(|s| !s.as_str().trim().is_empty())
            .ok_or_else(|| missing("secret"))?;
        let audience = self
            .audience
            .clone()
            .filter(|a| !a.as_str().trim().is_empty())
            .ok_or_else(|| missing("audience"))?;

        let credentials = ClientCredentials {
            client_id,
            client_secret,
        };

        ClientCredentialsProvider::from_domain(client, domain, credentials, audience).map_err(
            |source| SettingsError::InvalidDomain {
                client: name.to_owned(),
                source,
            },
        )
    }

    /// Resolves the cache configuration, falling back to `defaults`
    pub fn cache_config(
        &self,
        name: &str,
        defaults: &CacheSettings,
    ) -> Result<CacheConfig, SettingsError> {
        CacheConfig::try_from(self.cache.clone().or(defaults)).map_err(|source| {
            SettingsError::InvalidCache {
                client: name.to_owned(),
                source,
            }
        })
    }

    /// Builds a token cache for the client named `name`
    pub fn build_cache(
        &self,
        name: &str,
        client: reqwest::Client,
        defaults: &CacheSettings,
    ) -> Result<TokenCache<ClientCredentialsProvider>, SettingsError> {
        if self
            .secret
            .as_ref()
            .map_or(true, |s| s.as_str().trim().is_empty())
        {
            tracing::warn!(client = name, "client secret is missing, please check your configuration");
        }

        let config = self.cache_config(name, defaults)?;
        let provider = self.provider(name, client)?;

        tracing::info!(
            client = name,
            domain = %provider.base_url(),
            client_id = %provider.client_id(),
            audience = %provider.audience(),
            must_refresh_threshold = config.must_refresh_threshold().0,
            should_refresh_threshold = config.should_refresh_threshold().0,
            min_throttle_time = config.min_throttle_time().0,
            max_throttle_time = config.max_throttle_time().0,
            "configured access token cache"
        );

        Ok(TokenCache::new(provider, config))
    }
}

/// Settings for a set of named Auth0 clients with shared cache defaults
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientsSettings {
    /// Cache defaults applied to every client that does not override them
    #[serde(flatten)]
    pub defaults: CacheSettings,
    /// Clients by name
    pub auth0: BTreeMap<String, ClientSettings>,
}

impl ClientsSettings {
    /// Parses settings from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Builds a registry holding one token cache per configured client
    ///
    /// Fails on the first client with invalid settings.
    pub fn build_registry(
        &self,
        client: reqwest::Client,
    ) -> Result<TokenCacheRegistry<ClientCredentialsProvider>, SettingsError> {
        self.auth0
            .iter()
            .map(|(name, settings)| {
                let cache = settings.build_cache(name, client.clone(), &self.defaults)?;
                Ok::<_, SettingsError>((name.clone(), cache))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tessera_clock::DurationSecs;

    use super::*;

    const TWO_CLIENTS: &str = r#"
        [auth0.one]
        domain = "one.eu.auth0.com"
        client_id = "xxx"
        secret = "yyy"
        audience = "https://one.example.com"
        must_refresh_threshold = 15
        should_refresh_threshold = 30
        min_throttle_time = 2
        max_throttle_time = 300

        [auth0.two]
        domain = "two.eu.auth0.com"
        client_id = "zzz"
        secret = "aaa"
        audience = "https://two.example.com"
        must_refresh_threshold = 60
        should_refresh_threshold = 120
        min_throttle_time = 3
        max_throttle_time = 450
    "#;

    const SHARED_DEFAULTS: &str = r#"
        must_refresh_threshold = 60
        should_refresh_threshold = 120
        min_throttle_time = 4
        max_throttle_time = 500

        [auth0.one]
        domain = "one.eu.auth0.com"
        client_id = "xxx"
        secret = "yyy"
        audience = "https://one.example.com"
        min_throttle_time = 2

        [auth0.two]
        domain = "two.eu.auth0.com"
        client_id = "zzz"
        secret = "aaa"
        audience = "https://two.example.com"
    "#;

    #[test]
    fn each_client_gets_its_own_cache_configuration() {
        let settings = ClientsSettings::from_toml_str(TWO_CLIENTS).unwrap();
        let registry = settings.build_registry(reqwest::Client::new()).unwrap();

        let one = registry.get("one").unwrap();
        assert_eq!(one.must_refresh_threshold(), DurationSecs(15));
        assert_eq!(one.should_refresh_threshold(), DurationSecs(30));
        assert_eq!(one.min_throttle_time(), DurationSecs(2));
        assert_eq!(one.max_throttle_time(), DurationSecs(300));
        assert_eq!(
            one.provider().base_url().as_str(),
            "https://one.eu.auth0.com/"
        );

        let two = registry.get("two").unwrap();
        assert_eq!(two.must_refresh_threshold(), DurationSecs(60));
        assert_eq!(two.should_refresh_threshold(), DurationSecs(120));
        assert_eq!(two.min_throttle_time(), DurationSecs(3));
        assert_eq!(two.max_throttle_time(), DurationSecs(450));
        assert_eq!(two.provider().client_id().as_str(), "zzz");
    }

    #[test]
    fn shared_defaults_fill_unset_client_values() {
        let settings = ClientsSettings::from_toml_str(SHARED_DEFAULTS).unwrap();
        let registry = settings.build_registry(reqwest::Client::new()).unwrap();

        let one = registry.get("one").unwrap();
        assert_eq!(one.must_refresh_threshold(), DurationSecs(60));
        assert_eq!(one.should_refresh_threshold(), DurationSecs(120));
        assert_eq!(one.min_throttle_time(), DurationSecs(2));
        assert_eq!(one.max_throttle_time(), DurationSecs(500));

        let two = registry.get("two").unwrap();
        assert_eq!(two.min_throttle_time(), DurationSecs(4));
        assert_eq!(two.max_throttle_time(), DurationSecs(500));
    }

    #[test]
    fn unset_thresholds_use_builtin_defaults() {
        let settings = ClientsSettings::from_toml_str(
            r#"
            [auth0.only]
            domain = "only.eu.auth0.com"
            client_id = "xxx"
            secret = "yyy"
            audience = "https://only.example.com"
            "#,
        )
        .unwrap();
        let registry = settings.build_registry(reqwest::Client::new()).unwrap();

        assert_eq!(registry.get("only").unwrap().config(), &CacheConfig::default());
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let settings = ClientsSettings::from_toml_str(
            r#"
            [auth0.one]
            domain = "one.eu.auth0.com"
            client_id = "xxx"
            audience = "https://one.example.com"
            "#,
        )
        .unwrap();

        let err = settings.build_registry(reqwest::Client::new()).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::MissingCredential { ref client, field: "secret" } if client == "one"
        ));
    }

    #[test]
    fn blank_client_id_is_a_configuration_error() {
        let settings = ClientSettings {
            domain: Some("one.eu.auth0.com".to_owned()),
            client_id: Some(ClientId::from_static("  ")),
            secret: Some(ClientSecret::from_static("yyy")),
            audience: Some(Audience::from_static("https://one.example.com")),
            cache: CacheSettings::default(),
        };

        let err = settings
            .build_cache("one", reqwest::Client::new(), &CacheSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::MissingCredential {
                field: "client_id",
                ..
            }
        ));
    }

    #[test]
    fn out_of_order_thresholds_are_rejected() {
        let settings = ClientsSettings::from_toml_str(
            r#"
            [auth0.one]
            domain = "one.eu.auth0.com"
            client_id = "xxx"
            secret = "yyy"
            audience = "https://one.example.com"
            must_refresh_threshold = 30
            should_refresh_threshold = 15
            "#,
        )
        .unwrap();

        let err = settings.build_registry(reqwest::Client::new()).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidCache {
                source: ConfigError::RefreshThresholdsOutOfOrder { .. },
                ..
            }
        ));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = ClientsSettings::from_toml_str("must_refresh_threshold = \"soon\"").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
