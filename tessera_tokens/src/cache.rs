use std::{error, fmt, sync::Arc};

use parking_lot::Mutex;
use tessera_clock::{Clock, DurationSecs, System, UnixMillis};
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    backoff::{Throttle, WithBackoff},
    AccessToken, CacheConfig, CacheStatus, CachedToken, Token, TokenProvider, TokenSnapshot,
};

/// No usable access token is available right now
///
/// Either no token has been obtained yet, or the last reload failed and the
/// previous token is past its must-refresh point. Callers may try again later;
/// the cache retries the authority on its own backoff schedule.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("access token is unavailable")]
pub struct TokenUnavailable;

/// A single-slot cache that keeps an access token loaded and fresh
///
/// Reads are served from the slot while the token is fresh. Once the token
/// crosses its should-refresh point, the first read starts a reload in the
/// background and every read keeps getting the current token until the reload
/// lands. Once the token crosses its must-refresh point, reads wait for a reload.
///
/// At most one reload runs at a time. Every reader that has to wait shares
/// the outcome of that one reload.
///
/// Clones share the same slot.
pub struct TokenCache<P, C = System> {
    inner: Arc<Inner<P, C>>,
}

struct Inner<P, C> {
    provider: P,
    clock: C,
    config: CacheConfig,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    entry: Option<Entry>,
    last_good: Option<Arc<TokenSnapshot>>,
    throttle: Throttle,
    in_flight: Option<InFlight>,
    next_reload: u64,
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    outcome: watch::Receiver<Option<CachedToken>>,
}

#[derive(Clone, Debug)]
struct Entry {
    token: CachedToken,
    written: UnixMillis,
    refresh_after: DurationSecs,
    expire_after: DurationSecs,
    degraded: bool,
}

enum Due {
    Fresh,
    Soft,
    Hard,
}

impl Entry {
    fn due(&self, now: UnixMillis) -> Due {
        if now >= self.written + self.expire_after {
            Due::Hard
        } else if now >= self.written + self.refresh_after {
            Due::Soft
        } else {
            Due::Fresh
        }
    }
}

impl State {
    fn new(config: &CacheConfig) -> Self {
        Self {
            entry: None,
            last_good: None,
            throttle: Throttle::new(config.min_throttle_time(), config.max_throttle_time()),
            in_flight: None,
            next_reload: 0,
        }
    }

    fn record<E>(&mut self, result: Result<Token, E>, now: UnixMillis, config: &CacheConfig) -> Entry
    where
        E: error::Error + 'static,
    {
        match result.with_backoff(&mut self.throttle) {
            Ok(token) => self.loaded(token, now, config),
            Err((error, delay)) => self.failed(&error, delay, now),
        }
    }

    fn loaded(&mut self, token: Token, now: UnixMillis, config: &CacheConfig) -> Entry {
        let lifetime = token.expires_in();
        let refresh_after = lifetime.saturating_sub(config.should_refresh_threshold());
        let expire_after = lifetime.saturating_sub(config.must_refresh_threshold());

        if lifetime <= config.must_refresh_threshold() {
            tracing::warn!(
                lifetime = lifetime.0,
                must_refresh_threshold = config.must_refresh_threshold().0,
                "token lifetime does not exceed the must-refresh threshold, every read will reload"
            );
        }

        tracing::info!(
            lifetime = lifetime.0,
            refresh_in = refresh_after.0,
            must_refresh_in = expire_after.0,
            has_refresh_token = token.refresh_token().is_some(),
            "access token is valid for {} seconds",
            lifetime.0
        );

        let snapshot = Arc::new(TokenSnapshot::new(
            token,
            now,
            config.must_refresh_threshold(),
        ));
        self.last_good = Some(Arc::clone(&snapshot));

        Entry {
            token: CachedToken::Available(snapshot),
            written: now,
            refresh_after,
            expire_after,
            degraded: false,
        }
    }

    fn failed(
        &mut self,
        error: &(dyn error::Error + 'static),
        delay: DurationSecs,
        now: UnixMillis,
    ) -> Entry {
        let fallback = self.last_good.as_ref().and_then(|snapshot| {
            let remaining = u64::try_from(snapshot.seconds_until_must_refresh(now)).ok()?;
            (remaining > 0).then(|| (Arc::clone(snapshot), DurationSecs(remaining)))
        });

        match fallback {
            Some((snapshot, remaining)) => {
                let retry_in = delay.min(remaining);
                tracing::warn!(
                    error,
                    retry_in = retry_in.0,
                    must_refresh_in = remaining.0,
                    "access token could not be refreshed, serving previous token"
                );

                Entry {
                    token: CachedToken::Available(snapshot),
                    written: now,
                    refresh_after: retry_in,
                    expire_after: remaining,
                    degraded: true,
                }
            }
            None => {
                tracing::warn!(
                    error,
                    retry_in = delay.0,
                    "access token could not be fetched, none available"
                );

                Entry {
                    token: CachedToken::Unavailable,
                    written: now,
                    refresh_after: delay,
                    expire_after: delay,
                    degraded: true,
                }
            }
        }
    }
}

impl<P> TokenCache<P, System> {
    /// Constructs a cache over `provider` using the system clock
    ///
    /// Nothing is requested until the first read.
    pub fn new(provider: P, config: CacheConfig) -> Self {
        Self::with_clock(provider, config, System)
    }
}

impl<P, C> TokenCache<P, C> {
    /// Constructs a cache over `provider` using the given clock
    pub fn with_clock(provider: P, config: CacheConfig, clock: C) -> Self {
        let state = Mutex::new(State::new(&config));
        Self {
            inner: Arc::new(Inner {
                provider,
                clock,
                config,
                state,
            }),
        }
    }

    /// Gets the underlying provider
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Gets the cache's configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Seconds before expiry at which reads block on a reload
    pub fn must_refresh_threshold(&self) -> DurationSecs {
        self.inner.config.must_refresh_threshold()
    }

    /// Seconds before expiry at which a background reload starts
    pub fn should_refresh_threshold(&self) -> DurationSecs {
        self.inner.config.should_refresh_threshold()
    }

    /// Initial retry delay after a failed reload
    pub fn min_throttle_time(&self) -> DurationSecs {
        self.inner.config.min_throttle_time()
    }

    /// Upper bound on the retry delay
    pub fn max_throttle_time(&self) -> DurationSecs {
        self.inner.config.max_throttle_time()
    }

    /// The delay the next failed reload will be retried after
    pub fn current_throttle_time(&self) -> DurationSecs {
        self.inner.state.lock().throttle.current()
    }
}

impl<P, C: Clock> TokenCache<P, C> {
    /// Reports where the cached token sits in its lifecycle right now
    pub fn status(&self) -> CacheStatus {
        let state = self.inner.state.lock();
        match &state.entry {
            None => CacheStatus::Empty,
            Some(entry) if entry.degraded => CacheStatus::Degraded,
            Some(entry) => match entry.due(self.inner.clock.now()) {
                Due::Fresh => CacheStatus::Fresh,
                Due::Soft => CacheStatus::SoftDue,
                Due::Hard => CacheStatus::HardDue,
            },
        }
    }
}

impl<P, C> TokenCache<P, C>
where
    P: TokenProvider + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Gets an access token that can be sent as a bearer credential
    ///
    /// Waits when the token is past its must-refresh point or when nothing
    /// has been loaded yet. A token whose absolute expiry has passed is
    /// dropped and reloaded before answering.
    pub async fn get_access_token(&self) -> Result<AccessToken, TokenUnavailable> {
        let snapshot = self
            .lookup()
            .await
            .snapshot()
            .cloned()
            .ok_or(TokenUnavailable)?;

        let now = self.inner.clock.now().as_unix_time();
        if !snapshot.token().is_expired_at(now) {
            return Ok(snapshot.token().access_token().to_owned());
        }

        tracing::debug!("access token has expired and will be reloaded");
        self.invalidate(&snapshot);

        let reloaded = self
            .lookup()
            .await
            .snapshot()
            .cloned()
            .ok_or(TokenUnavailable)?;

        Ok(reloaded.token().access_token().to_owned())
    }

    async fn lookup(&self) -> CachedToken {
        let pending = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            let current = state
                .entry
                .as_ref()
                .map(|entry| (entry.due(now), entry.token.clone()));

            match current {
                Some((Due::Fresh, token)) => return token,
                Some((Due::Soft, token)) => {
                    if state.in_flight.is_none() {
                        tracing::debug!("access token should be refreshed, reloading in background");
                        self.claim_reload(&mut state);
                    }
                    return token;
                }
                Some((Due::Hard, _)) => {
                    tracing::debug!("access token must be refreshed, waiting for reload");
                    self.claim_reload(&mut state)
                }
                None => self.claim_reload(&mut state),
            }
        };

        wait_for_reload(pending).await
    }

    fn invalidate(&self, snapshot: &Arc<TokenSnapshot>) {
        let mut state = self.inner.state.lock();
        if state
            .entry
            .as_ref()
            .map_or(false, |entry| entry.token.holds(snapshot))
        {
            state.entry = None;
        }
    }

    /// Joins the reload in flight or starts a new one
    ///
    /// The reload runs on its own task so that it completes even if every
    /// waiter gives up on it.
    fn claim_reload(&self, state: &mut State) -> watch::Receiver<Option<CachedToken>> {
        if let Some(in_flight) = &state.in_flight {
            return in_flight.outcome.clone();
        }

        let id = state.next_reload;
        state.next_reload += 1;

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(InFlight {
            id,
            outcome: rx.clone(),
        });

        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(reload(Arc::clone(&inner), tx));

        tokio::spawn(async move {
            if let Err(err) = join.await {
                if err.is_panic() {
                    tracing::error!(reload = id, "token reload panicked!")
                } else if err.is_cancelled() {
                    tracing::info!(reload = id, "token reload was cancelled")
                }

                let mut state = inner.state.lock();
                if state.in_flight.as_ref().map_or(false, |f| f.id == id) {
                    state.in_flight = None;
                }
            }
        });

        rx
    }
}

async fn reload<P, C>(inner: Arc<Inner<P, C>>, tx: watch::Sender<Option<CachedToken>>)
where
    P: TokenProvider,
    C: Clock,
{
    tracing::debug!("requesting new access token");
    let result = inner.provider.request_access_token().await;

    let published = {
        let mut state = inner.state.lock();
        let entry = state.record(result, inner.clock.now(), &inner.config);
        let token = entry.token.clone();
        state.entry = Some(entry);
        state.in_flight = None;
        token
    };

    tx.send_replace(Some(published));
}

async fn wait_for_reload(mut pending: watch::Receiver<Option<CachedToken>>) -> CachedToken {
    match pending.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(CachedToken::Unavailable),
        Err(_) => {
            tracing::warn!("token reload ended without publishing an outcome");
            CachedToken::Unavailable
        }
    }
}

impl<P, C> Clone for TokenCache<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, C> fmt::Debug for TokenCache<P, C>
where
    P: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("provider", &self.inner.provider)
            .field("clock", &self.inner.clock)
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
