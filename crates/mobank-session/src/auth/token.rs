/*
[INPUT]:  Secure store, token refresher, wall clock
[OUTPUT]: Currently valid access token, single-flight refresh, session events
[POS]:    Auth layer - token lifecycle management
[UPDATE]: When refresh semantics, persistence layout or event rules change
*/

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::jwt::TokenGrant;
use crate::clock::{Clock, SystemClock};
use crate::events::{ListenerId, ListenerRegistry};
use crate::http::{ApiError, Result};
use crate::store::{decode_json, keys, SecureStore};
use crate::types::{SessionEvent, TokenInfo, TokenPair};

/// Exchanges a refresh token for new credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync + Debug {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Option<String>>>>;

#[derive(Debug)]
enum CacheState {
    Unloaded,
    Loaded(Option<TokenPair>),
}

#[derive(Debug)]
struct TokenCache {
    state: CacheState,
    /// Bumped whenever the session is replaced or cleared from outside a refresh.
    epoch: u64,
}

struct Inner {
    store: Arc<dyn SecureStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    leeway: chrono::Duration,
    cache: RwLock<TokenCache>,
    in_flight: Mutex<Option<SharedRefresh>>,
    establishing: AtomicUsize,
    events: ListenerRegistry<SessionEvent>,
}

/// Single source of truth for the access/refresh token pair.
///
/// Clones share state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("refreshing", &self.is_refreshing())
            .field("establishing", &self.inner.establishing.load(Ordering::SeqCst))
            .field("listeners", &self.inner.events.len())
            .finish()
    }
}

/// Marks a login or registration in progress. Dropping it ends the mark.
#[must_use = "the session is only marked as pending while the guard is alive"]
pub struct EstablishingGuard {
    inner: Arc<Inner>,
}

impl Drop for EstablishingGuard {
    fn drop(&mut self) {
        self.inner.establishing.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Debug for EstablishingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EstablishingGuard")
    }
}

impl TokenManager {
    pub fn new(store: Arc<dyn SecureStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::with_clock(
            store,
            refresher,
            Arc::new(SystemClock),
            std::time::Duration::from_secs(30),
        )
    }

    /// `leeway` makes tokens count as expired that long before their stated expiry.
    pub fn with_clock(
        store: Arc<dyn SecureStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        leeway: std::time::Duration,
    ) -> Self {
        let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                clock,
                leeway,
                cache: RwLock::new(TokenCache {
                    state: CacheState::Unloaded,
                    epoch: 0,
                }),
                in_flight: Mutex::new(None),
                establishing: AtomicUsize::new(0),
                events: ListenerRegistry::new(),
            }),
        }
    }

    /// Subscribe to one session event kind.
    pub fn on<F>(&self, event: SessionEvent, handler: F) -> ListenerId
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.add(move |emitted: &SessionEvent| {
            if *emitted == event {
                handler(*emitted);
            }
        })
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.remove(id)
    }

    /// Return a usable access token, refreshing if the cached one is expired.
    ///
    /// `Ok(None)` means there is no session (never logged in, or the refresh
    /// token was rejected and the session cleared). Transient refresh failures
    /// are returned as errors and leave the stored tokens in place.
    pub async fn get_valid_access_token(&self) -> Result<Option<String>> {
        let Some(pair) = self.current_pair().await? else {
            return Ok(None);
        };

        if !pair.access.is_expired_at(self.inner.clock.now(), self.inner.leeway) {
            return Ok(Some(pair.access.token));
        }

        let (pending, started) = self.join_or_start_refresh();
        if started {
            debug!("access token expired; refresh started");
            self.inner.events.emit(&SessionEvent::TokenExpired);
        }
        pending.await
    }

    /// Force a refresh, joining one already in flight.
    pub async fn refresh(&self) -> Result<Option<String>> {
        let (pending, _) = self.join_or_start_refresh();
        pending.await
    }

    /// Persist a freshly issued pair (login, registration, refresh).
    pub async fn set_tokens(&self, pair: TokenPair) -> Result<()> {
        let entries = encode_pair(&pair)?;
        self.inner.store.multi_set(&entries).await?;

        let mut cache = self.inner.cache.write();
        cache.state = CacheState::Loaded(Some(pair));
        cache.epoch += 1;
        Ok(())
    }

    /// Remove tokens and CSRF material. Safe to call repeatedly.
    pub async fn clear_tokens(&self) -> Result<()> {
        {
            let mut cache = self.inner.cache.write();
            cache.state = CacheState::Loaded(None);
            cache.epoch += 1;
        }
        self.delete_session_keys().await
    }

    async fn delete_session_keys(&self) -> Result<()> {
        let mut first_error = None;
        for key in keys::SESSION_KEYS {
            if let Err(err) = self.inner.store.delete(key).await {
                warn!(key, error = %err, "failed to delete session key");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Drop the session after the server rejected the access token.
    pub async fn expire_session(&self) {
        info!("session rejected by server; clearing tokens");
        self.invalidate(&[SessionEvent::TokenExpired, SessionEvent::LoginRequired])
            .await;
    }

    /// Current pair from cache or store, without refreshing.
    pub async fn current_pair(&self) -> Result<Option<TokenPair>> {
        let epoch = {
            let cache = self.inner.cache.read();
            match &cache.state {
                CacheState::Loaded(pair) => return Ok(pair.clone()),
                CacheState::Unloaded => cache.epoch,
            }
        };

        let loaded = self.load_from_store().await?;

        let mut cache = self.inner.cache.write();
        match &cache.state {
            // someone wrote or cleared while we were reading; theirs wins
            CacheState::Loaded(pair) if cache.epoch != epoch => Ok(pair.clone()),
            _ => {
                cache.state = CacheState::Loaded(loaded.clone());
                Ok(loaded)
            }
        }
    }

    pub async fn has_session(&self) -> Result<bool> {
        Ok(self.current_pair().await?.is_some())
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Mark a login/registration as in progress.
    pub fn begin_establishing(&self) -> EstablishingGuard {
        self.inner.establishing.fetch_add(1, Ordering::SeqCst);
        EstablishingGuard {
            inner: self.inner.clone(),
        }
    }

    /// True while a refresh or a login/registration is in flight.
    pub fn is_session_pending(&self) -> bool {
        self.inner.establishing.load(Ordering::SeqCst) > 0 || self.is_refreshing()
    }

    fn join_or_start_refresh(&self) -> (SharedRefresh, bool) {
        let mut slot = self.inner.in_flight.lock();
        if let Some(existing) = slot.as_ref() {
            return (existing.clone(), false);
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = manager.run_refresh().await;
            manager.inner.in_flight.lock().take();
            outcome
        });

        // The spawned task finishes even if every caller stops waiting.
        let shared = async move {
            handle
                .await
                .unwrap_or_else(|err| Err(ApiError::Internal(format!("refresh task failed: {err}"))))
        }
        .boxed()
        .shared();

        *slot = Some(shared.clone());
        (shared, true)
    }

    async fn run_refresh(&self) -> Result<Option<String>> {
        let epoch = self.inner.cache.read().epoch;
        let Some(pair) = self.current_pair().await? else {
            info!("no refresh token available; login required");
            return Ok(self.invalidate_since(epoch, &[SessionEvent::LoginRequired]).await);
        };

        if pair.refresh.is_expired_at(self.inner.clock.now(), chrono::Duration::zero()) {
            info!("refresh token expired; login required");
            return Ok(self.invalidate_since(epoch, &[SessionEvent::LoginRequired]).await);
        }

        match self.inner.refresher.refresh(&pair.refresh.token).await {
            Ok(grant) => {
                let next = TokenPair::new(grant.access, grant.refresh.unwrap_or(pair.refresh));
                let token = next.access.token.clone();
                self.adopt_refreshed(next, epoch).await;
                Ok(Some(token))
            }
            Err(err) if err.is_terminal_auth() => {
                warn!(kind = %err.kind(), "refresh token rejected; clearing session");
                Ok(self.invalidate_since(epoch, &[SessionEvent::LoginRequired]).await)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; keeping session for retry");
                Err(err)
            }
        }
    }

    /// Cache first so callers see the new token even if persisting fails.
    async fn adopt_refreshed(&self, pair: TokenPair, epoch: u64) {
        {
            let mut cache = self.inner.cache.write();
            if cache.epoch != epoch {
                debug!("session replaced during refresh; discarding refreshed tokens");
                return;
            }
            cache.state = CacheState::Loaded(Some(pair.clone()));
        }

        let persisted = match encode_pair(&pair) {
            Ok(entries) => self.inner.store.multi_set(&entries).await.map_err(ApiError::from),
            Err(err) => Err(err),
        };
        match persisted {
            Ok(()) => info!("access token refreshed"),
            Err(err) => warn!(error = %err, "refreshed tokens could not be persisted"),
        }
    }

    /// Clear the session unless it was replaced after `epoch`.
    ///
    /// A replacement wins: its access token is returned and nothing is
    /// cleared or emitted.
    async fn invalidate_since(&self, epoch: u64, events: &[SessionEvent]) -> Option<String> {
        {
            let mut cache = self.inner.cache.write();
            if cache.epoch != epoch {
                debug!("session replaced during refresh; keeping it");
                return match &cache.state {
                    CacheState::Loaded(Some(pair)) => Some(pair.access.token.clone()),
                    _ => None,
                };
            }
            cache.state = CacheState::Loaded(None);
            cache.epoch += 1;
        }

        if let Err(err) = self.delete_session_keys().await {
            warn!(error = %err, "session cleared in memory but storage cleanup failed");
        }
        for event in events {
            self.inner.events.emit(event);
        }
        None
    }

    async fn invalidate(&self, events: &[SessionEvent]) {
        if let Err(err) = self.clear_tokens().await {
            warn!(error = %err, "session cleared in memory but storage cleanup failed");
        }
        for event in events {
            self.inner.events.emit(event);
        }
    }

    async fn load_from_store(&self) -> Result<Option<TokenPair>> {
        let values = self
            .inner
            .store
            .multi_get(&[keys::ACCESS_TOKEN, keys::REFRESH_TOKEN])
            .await?;
        let access: Option<TokenInfo> = decode_json(values.first().and_then(Option::as_ref))?;
        let refresh: Option<TokenInfo> = decode_json(values.get(1).and_then(Option::as_ref))?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair::new(access, refresh))),
            (None, None) => Ok(None),
            _ => {
                warn!("stored session is incomplete; ignoring it");
                Ok(None)
            }
        }
    }
}

fn encode_pair(pair: &TokenPair) -> Result<Vec<(&'static str, String)>> {
    Ok(vec![
        (keys::ACCESS_TOKEN, serde_json::to_string(&pair.access)?),
        (keys::REFRESH_TOKEN, serde_json::to_string(&pair.refresh)?),
    ])
}
