//! An OAuth2 token provider for [`tessera_tokens`]
//!
//! [`ClientCredentialsProvider`] obtains tokens from an Auth0-style
//! authority using the client credentials flow. Settings for one or many
//! named clients can be read from TOML with [`ClientsSettings`] and turned
//! into a [`TokenCacheRegistry`](tessera_tokens::TokenCacheRegistry).
//!
//! ```no_run
//! use tessera_oauth2::ClientsSettings;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ClientsSettings::load("clients.toml")?;
//! let registry = settings.build_registry(reqwest::Client::new())?;
//!
//! let token = registry.get_access_token("partner").await?;
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

pub mod dto;
mod provider;
pub mod settings;

pub use dto::{Audience, AudienceRef, ClientCredentials};
pub use provider::{
    ClientCredentialsProvider, FormBody, InvalidDomain, JsonBody, RequestType, TokenRequestError,
};
pub use settings::{ClientSettings, ClientsSettings, SettingsError};
