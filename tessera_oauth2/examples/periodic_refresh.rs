use std::time::Duration;

use clap::Parser;
use tessera_clock::DurationSecs;
use tessera_oauth2::{Audience, ClientCredentials, ClientCredentialsProvider, ClientsSettings};
use tessera_tokens::{CacheConfig, CacheStatus, ClientId, ClientSecret, TokenCache};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// A TOML file describing the clients to fetch tokens for
    #[clap(short = 'f', long, env)]
    settings_file: Option<std::path::PathBuf>,

    /// The issuing authority's domain
    #[clap(short, long, env, required_unless_present = "settings_file")]
    domain: Option<String>,

    /// The client ID of the client
    #[clap(short, long, env, required_unless_present = "settings_file")]
    client_id: Option<ClientId>,

    /// The client secret used to identify the client to the issuing authority
    #[clap(
        short = 's',
        long,
        env,
        hide_env_values = true,
        required_unless_present = "settings_file"
    )]
    client_secret: Option<ClientSecret>,

    /// The audience to request a token for
    #[clap(short, long, env, required_unless_present = "settings_file")]
    audience: Option<Audience>,

    /// Seconds before expiry at which reads wait for a new token
    #[clap(long, env, default_value_t = 60)]
    must_refresh_threshold: u64,

    /// Seconds before expiry at which a new token is fetched in the background
    #[clap(long, env, default_value_t = 120)]
    should_refresh_threshold: u64,

    /// Seconds between reads
    #[clap(long, default_value_t = 5)]
    interval: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = reqwest::Client::builder().https_only(true).build()?;

    if let Some(path) = &opts.settings_file {
        let registry = ClientsSettings::load(path)?.build_registry(client)?;
        let mut interval = time::interval(Duration::from_secs(opts.interval));
        loop {
            interval.tick().await;
            for (name, cache) in &registry {
                pull(name, cache).await;
            }
        }
    }

    let (Some(domain), Some(client_id), Some(client_secret), Some(audience)) = (
        opts.domain,
        opts.client_id,
        opts.client_secret,
        opts.audience,
    ) else {
        color_eyre::eyre::bail!("client credentials are required without a settings file");
    };

    let provider = ClientCredentialsProvider::from_domain(
        client,
        &domain,
        ClientCredentials {
            client_id,
            client_secret,
        },
        audience,
    )?;

    let config = CacheConfig::builder()
        .refresh_thresholds(
            DurationSecs(opts.must_refresh_threshold),
            DurationSecs(opts.should_refresh_threshold),
        )
        .build()?;

    let cache = TokenCache::new(provider, config);

    let token = cache.get_access_token().await?;
    tracing::info!(token = format_args!("{:#?}", token), "first access token");

    let mut interval = time::interval(Duration::from_secs(opts.interval));
    loop {
        interval.tick().await;
        pull(&domain, &cache).await;
    }
}

async fn pull(name: &str, cache: &TokenCache<ClientCredentialsProvider>) {
    let result = cache.get_access_token().await;
    let status = cache.status();
    let throttle = cache.current_throttle_time().0;

    match (status, result) {
        (CacheStatus::Fresh | CacheStatus::SoftDue, Ok(_)) => {
            tracing::debug!(client = name, ?status, "pulled token")
        }
        (_, Ok(_)) => {
            tracing::warn!(client = name, ?status, throttle, "pulled token")
        }
        (_, Err(error)) => {
            tracing::error!(client = name, ?status, throttle, %error, "no token available")
        }
    }
}
