use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_clock::DurationSecs;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{AccessToken, RefreshTokenRef, Token, TokenProvider};

#[derive(Clone, Copy, Debug, Error)]
#[error("authorization server unreachable")]
pub(crate) struct Unreachable;

#[derive(Debug)]
enum Step {
    Issue(Token),
    Fail,
    Panic,
}

/// A provider that answers from a fixed script, failing once the script runs out
#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    requests: AtomicUsize,
    renewals: AtomicUsize,
    gate: Option<Semaphore>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every request waits for a permit released through [`release()`](Self::release)
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub(crate) fn then_token(self, access_token: &'static str, expires_in: u64) -> Self {
        self.then_issue(Token::new(
            AccessToken::from_static(access_token),
            DurationSecs(expires_in),
        ))
    }

    pub(crate) fn then_issue(self, token: Token) -> Self {
        self.script.lock().push_back(Step::Issue(token));
        self
    }

    pub(crate) fn then_fail(self) -> Self {
        self.script.lock().push_back(Step::Fail);
        self
    }

    pub(crate) fn then_panic(self) -> Self {
        self.script.lock().push_back(Step::Panic);
        self
    }

    pub(crate) fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for ScriptedProvider {
    type Error = Unreachable;

    async fn request_access_token(&self) -> Result<Token, Self::Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| Unreachable)?.forget();
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Issue(token)) => Ok(token),
            Some(Step::Fail) | None => Err(Unreachable),
            Some(Step::Panic) => panic!("scripted provider panic"),
        }
    }

    async fn renew_access_token(&self, _: &RefreshTokenRef) -> Result<Token, Self::Error> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Err(Unreachable)
    }

    async fn revoke_refresh_token(&self, _: &RefreshTokenRef) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Lets spawned reloads on a current-thread runtime run to completion
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
