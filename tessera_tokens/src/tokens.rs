use std::sync::Arc;

use tessera_clock::{DurationSecs, UnixMillis, UnixTime};

use crate::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// A token as issued by the authority
///
/// Immutable once built.
#[derive(Clone, Debug)]
pub struct Token {
    access_token: AccessToken,
    expires_in: DurationSecs,
    expires_at: Option<UnixTime>,
    refresh_token: Option<RefreshToken>,
}

impl Token {
    /// Constructs a token that the authority reports as valid for `expires_in`
    pub fn new(access_token: AccessToken, expires_in: DurationSecs) -> Self {
        Self {
            access_token,
            expires_in,
            expires_at: None,
            refresh_token: None,
        }
    }

    /// Attaches the absolute expiry reported by the authority
    pub fn with_expires_at(mut self, expires_at: UnixTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attaches a refresh token
    pub fn with_refresh_token(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the lifetime reported by the authority at issuance
    #[inline]
    pub fn expires_in(&self) -> DurationSecs {
        self.expires_in
    }

    /// Gets the absolute expiry, if the authority reported one
    #[inline]
    pub fn expires_at(&self) -> Option<UnixTime> {
        self.expires_at
    }

    /// Gets the refresh token, if one was issued
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshTokenRef> {
        self.refresh_token.as_deref()
    }

    /// Whether the absolute expiry, if any, has been reached at `now`
    #[inline]
    pub fn is_expired_at(&self, now: UnixTime) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }
}

/// A loaded token together with the local bookkeeping needed to decide
/// how long it may still be served
#[derive(Debug)]
pub struct TokenSnapshot {
    token: Token,
    issued_at: UnixMillis,
    must_refresh_threshold: DurationSecs,
}

impl TokenSnapshot {
    pub(crate) fn new(token: Token, issued_at: UnixMillis, must_refresh_threshold: DurationSecs) -> Self {
        Self {
            token,
            issued_at,
            must_refresh_threshold,
        }
    }

    /// Gets the wrapped token
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Gets the local time at which the token was loaded
    #[inline]
    pub fn issued_at(&self) -> UnixMillis {
        self.issued_at
    }

    /// Gets the must-refresh threshold that was in effect when the token was loaded
    #[inline]
    pub fn must_refresh_threshold(&self) -> DurationSecs {
        self.must_refresh_threshold
    }

    /// Whole seconds since the token was loaded
    #[inline]
    pub fn age_secs(&self, now: UnixMillis) -> u64 {
        now.secs_since(self.issued_at)
    }

    /// Seconds left until the token must be refreshed
    ///
    /// Negative once the must-refresh point has passed.
    pub fn seconds_until_must_refresh(&self, now: UnixMillis) -> i64 {
        let expires_in = i64::try_from(self.token.expires_in.0).unwrap_or(i64::MAX);
        let threshold = i64::try_from(self.must_refresh_threshold.0).unwrap_or(i64::MAX);
        let age = i64::try_from(self.age_secs(now)).unwrap_or(i64::MAX);

        expires_in.saturating_sub(threshold).saturating_sub(age)
    }
}

/// The value held in the cache slot
#[derive(Clone, Debug)]
pub enum CachedToken {
    /// A token that may be served
    Available(Arc<TokenSnapshot>),
    /// No token can be served until a reload succeeds
    Unavailable,
}

impl CachedToken {
    /// Gets the snapshot, if one is available
    pub fn snapshot(&self) -> Option<&Arc<TokenSnapshot>> {
        match self {
            Self::Available(snapshot) => Some(snapshot),
            Self::Unavailable => None,
        }
    }

    /// Whether this holds the given snapshot
    pub(crate) fn holds(&self, snapshot: &Arc<TokenSnapshot>) -> bool {
        self.snapshot()
            .map_or(false, |current| Arc::ptr_eq(current, snapshot))
    }
}

/// Where the cached token currently sits in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing has been loaded yet
    Empty,
    /// The token is served as-is
    Fresh,
    /// The token is still served, but a background reload is due
    SoftDue,
    /// The next read blocks until a reload completes
    HardDue,
    /// The last reload failed; serving the previous token or nothing
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(expires_in: u64, threshold: u64) -> TokenSnapshot {
        TokenSnapshot::new(
            Token::new(AccessToken::from_static("first"), DurationSecs(expires_in)),
            UnixMillis(1_000_000),
            DurationSecs(threshold),
        )
    }

    #[test]
    fn must_refresh_countdown_uses_whole_seconds_of_age() {
        let snapshot = snapshot(300, 10);

        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_000_000)), 290);
        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_000_999)), 290);
        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_280_000)), 10);
        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_290_000)), 0);
        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_330_000)), -40);
    }

    #[test]
    fn threshold_longer_than_lifetime_is_already_due() {
        let snapshot = snapshot(30, 60);

        assert_eq!(snapshot.seconds_until_must_refresh(UnixMillis(1_000_000)), -30);
    }

    #[test]
    fn absolute_expiry_is_inclusive() {
        let token = Token::new(AccessToken::from_static("first"), DurationSecs(300))
            .with_expires_at(UnixTime(500));

        assert!(!token.is_expired_at(UnixTime(499)));
        assert!(token.is_expired_at(UnixTime(500)));
        assert!(token.is_expired_at(UnixTime(501)));
    }

    #[test]
    fn token_without_absolute_expiry_never_expires_at_read_time() {
        let token = Token::new(AccessToken::from_static("first"), DurationSecs(300));

        assert!(!token.is_expired_at(UnixTime(u64::MAX)));
        assert!(token.refresh_token().is_none());
    }

    #[test]
    fn unavailable_holds_nothing() {
        let snapshot = Arc::new(snapshot(300, 10));

        assert!(CachedToken::Available(snapshot.clone()).holds(&snapshot));
        assert!(!CachedToken::Unavailable.holds(&snapshot));
        assert!(!CachedToken::Available(Arc::new(self::snapshot(300, 10))).holds(&snapshot));
    }
}
