/*
[INPUT]:  PIN entries, biometric collaborator, secure store, clock, PIN policy
[OUTPUT]: Lock/unlock transitions, verification outcomes, persisted PIN config
[POS]:    Security layer - PIN/biometric lock state machine with lockout
[UPDATE]: When lockout policy, persisted layout or unlock rules change
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::PinPolicyConfig;
use crate::events::{ListenerId, ListenerRegistry};
use crate::security::{
    BiometricAuthenticator, PinHasher, PinInput, PinSetupFlow, SecurityError,
};
use crate::store::{decode_json, keys, SecureStore, StoreError};
use crate::types::{LockState, PinConfig, PinLength, PinStatus};

const BIOMETRIC_PROMPT: &str = "Unlock with biometrics";

/// Result of checking an entered PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinVerification {
    Valid,
    Invalid { remaining_attempts: u32 },
    /// Rejected without checking; retry after `remaining`.
    LockedOut { remaining: Duration },
    NotConfigured,
}

impl PinVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, PinVerification::Valid)
    }

    /// Message suitable for showing under the PIN pad.
    pub fn reason(&self) -> Option<String> {
        match self {
            PinVerification::Valid => None,
            PinVerification::Invalid { remaining_attempts } => Some(format!(
                "Incorrect PIN, {remaining_attempts} attempt{} left",
                if *remaining_attempts == 1 { "" } else { "s" }
            )),
            PinVerification::LockedOut { remaining } => {
                let secs = remaining.as_secs().max(1);
                Some(format!(
                    "Too many attempts, try again in {}:{:02}",
                    secs / 60,
                    secs % 60
                ))
            }
            PinVerification::NotConfigured => Some("No PIN has been set up".to_string()),
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    config: Option<PinConfig>,
    lock: LockState,
    inactivity_timeout: Duration,
}

struct Inner {
    store: Arc<dyn SecureStore>,
    policy: PinPolicyConfig,
    hasher: PinHasher,
    clock: Arc<dyn Clock>,
    state: Mutex<ControllerState>,
    /// Serializes operations that read, hash and write the config.
    op_lock: tokio::sync::Mutex<()>,
    listeners: ListenerRegistry<LockState>,
}

/// Guards app usage behind a local PIN with optional biometric bypass.
///
/// Never talks to the network. Lock state lives in memory only; a configured
/// PIN always starts `Locked`. Clones share state.
#[derive(Clone)]
pub struct PinSecurityController {
    inner: Arc<Inner>,
}

impl fmt::Debug for PinSecurityController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinSecurityController")
            .field("status", &self.status())
            .field("inactivity_timeout", &self.inactivity_timeout())
            .finish()
    }
}

impl PinSecurityController {
    /// Restore persisted PIN configuration.
    pub async fn load(store: Arc<dyn SecureStore>, policy: PinPolicyConfig) -> Result<Self, SecurityError> {
        Self::load_with_clock(store, policy, Arc::new(SystemClock)).await
    }

    pub async fn load_with_clock(
        store: Arc<dyn SecureStore>,
        policy: PinPolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SecurityError> {
        let values = store
            .multi_get(&[keys::PIN_CONFIG, keys::INACTIVITY_TIMEOUT])
            .await?;
        let config: Option<PinConfig> = decode_json(values.first().and_then(Option::as_ref))?;
        let stored_timeout = values
            .get(1)
            .and_then(Option::as_ref)
            .and_then(|raw| raw.parse::<u64>().ok());

        let inactivity_timeout = config
            .as_ref()
            .map(|config| config.inactivity_timeout_ms)
            .or(stored_timeout)
            .map(Duration::from_millis)
            .unwrap_or_else(|| policy.default_inactivity_timeout());
        let lock = if config.is_some() {
            LockState::Locked
        } else {
            LockState::Unlocked
        };

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                hasher: PinHasher::from(&policy),
                policy,
                clock,
                state: Mutex::new(ControllerState {
                    config,
                    lock,
                    inactivity_timeout,
                }),
                op_lock: tokio::sync::Mutex::new(()),
                listeners: ListenerRegistry::new(),
            }),
        })
    }

    pub fn status(&self) -> PinStatus {
        let state = self.inner.state.lock();
        match state.config {
            Some(_) => PinStatus::Configured(state.lock),
            None => PinStatus::NotConfigured,
        }
    }

    pub fn is_pin_set(&self) -> bool {
        self.inner.state.lock().config.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.status().is_locked()
    }

    pub fn is_biometric_enabled(&self) -> bool {
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .is_some_and(|config| config.biometric_enabled)
    }

    pub fn pin_length(&self) -> Option<PinLength> {
        self.inner.state.lock().config.as_ref().map(|config| config.length)
    }

    pub fn failed_attempts(&self) -> u32 {
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .map_or(0, |config| config.failed_attempts)
    }

    /// Time until verification is accepted again, for a countdown.
    pub fn lockout_remaining(&self) -> Option<Duration> {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .and_then(|config| config.lockout_remaining(now))
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inner.state.lock().inactivity_timeout
    }

    /// Be told about every lock/unlock transition.
    pub fn subscribe_lock_state<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(LockState) + Send + Sync + 'static,
    {
        self.inner.listeners.add(move |state: &LockState| listener(*state))
    }

    pub fn unsubscribe_lock_state(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Lock the app. Idempotent; does nothing when no PIN is set.
    pub fn lock(&self) {
        if self.transition(LockState::Locked) {
            info!("app locked");
        }
    }

    /// Hash and store the first PIN.
    ///
    /// Fails with `AlreadyConfigured` once a PIN exists; re-keying goes
    /// through `change_pin`. The app is unlocked once the write succeeds.
    pub async fn setup_pin(&self, pin: &str, enable_biometric: bool) -> Result<(), SecurityError> {
        self.install_pin(PinInput::new(pin), enable_biometric).await
    }

    /// Finish a confirmed setup flow.
    pub async fn complete_setup(
        &self,
        flow: PinSetupFlow,
        enable_biometric: bool,
    ) -> Result<(), SecurityError> {
        let pin = flow.into_confirmed()?;
        self.install_pin(pin, enable_biometric).await
    }

    /// Check a PIN and unlock on success.
    ///
    /// During a lockout the PIN is not checked and no attempt is consumed.
    pub async fn verify_pin(&self, pin: &str) -> Result<PinVerification, SecurityError> {
        let _op = self.inner.op_lock.lock().await;
        let outcome = self.check_pin(&PinInput::new(pin)).await?;
        if outcome.is_valid() && self.transition(LockState::Unlocked) {
            info!("app unlocked with PIN");
        }
        Ok(outcome)
    }

    /// Replace the PIN after verifying the current one.
    ///
    /// A wrong current PIN counts as a failed attempt. Biometric flag and
    /// inactivity timeout carry over.
    pub async fn change_pin(&self, current: &str, new_pin: &str) -> Result<PinVerification, SecurityError> {
        let new_pin = PinInput::new(new_pin);
        let length = new_pin.validate()?;

        let _op = self.inner.op_lock.lock().await;
        let outcome = self.check_pin(&PinInput::new(current)).await?;
        if !outcome.is_valid() {
            return Ok(outcome);
        }

        let hash = self.hash_blocking(new_pin).await?;
        let Some(mut config) = self.inner.state.lock().config.clone() else {
            return Err(SecurityError::NotConfigured);
        };
        config.length = length;
        config.hash = hash;
        self.persist(&config).await?;
        self.inner.state.lock().config = Some(config);
        info!("PIN changed");
        Ok(PinVerification::Valid)
    }

    pub async fn enable_biometric(&self) -> Result<(), SecurityError> {
        self.set_biometric(true).await
    }

    pub async fn disable_biometric(&self) -> Result<(), SecurityError> {
        self.set_biometric(false).await
    }

    /// Unlock through the platform biometric prompt.
    ///
    /// Returns false without prompting when biometric unlock is not possible
    /// (no PIN, flag off, no capability, lockout active).
    pub async fn unlock_with_biometric(
        &self,
        authenticator: &dyn BiometricAuthenticator,
    ) -> Result<bool, SecurityError> {
        {
            let state = self.inner.state.lock();
            let Some(config) = state.config.as_ref() else {
                return Err(SecurityError::NotConfigured);
            };
            if !config.biometric_enabled {
                return Ok(false);
            }
            if config.is_locked_out(self.inner.clock.now()) {
                warn!("biometric unlock refused during PIN lockout");
                return Ok(false);
            }
        }
        if !authenticator.capability().is_available() {
            return Ok(false);
        }

        if !authenticator.authenticate(BIOMETRIC_PROMPT).await {
            info!("biometric authentication failed");
            return Ok(false);
        }

        let _op = self.inner.op_lock.lock().await;
        // PIN removed while the prompt was showing
        let Some(mut config) = self.inner.state.lock().config.clone() else {
            return Err(SecurityError::NotConfigured);
        };
        if config.is_locked_out(self.inner.clock.now()) {
            warn!("PIN lockout started while the biometric prompt was showing");
            return Ok(false);
        }
        if config.failed_attempts > 0 || config.lockout_until.is_some() {
            config.failed_attempts = 0;
            config.lockout_until = None;
            // no unlock unless this write lands
            self.persist(&config).await?;
            self.inner.state.lock().config = Some(config);
        }
        if self.transition(LockState::Unlocked) {
            info!("app unlocked with biometrics");
        }
        Ok(true)
    }

    /// Forget the PIN entirely. Callers verify the PIN first.
    pub async fn remove_pin(&self) -> Result<(), SecurityError> {
        let _op = self.inner.op_lock.lock().await;
        // config blob last so a partial failure still restores a PIN
        for key in [keys::BIOMETRIC_ENABLED, keys::INACTIVITY_TIMEOUT, keys::PIN_CONFIG] {
            if let Err(err) = self.inner.store.delete(key).await {
                error!(key, error = %err, "failed to remove PIN configuration");
                return Err(err.into());
            }
        }

        let unlocked = {
            let mut state = self.inner.state.lock();
            state.config = None;
            state.inactivity_timeout = self.inner.policy.default_inactivity_timeout();
            let was_locked = state.lock == LockState::Locked;
            state.lock = LockState::Unlocked;
            was_locked
        };
        if unlocked {
            self.inner.listeners.emit(&LockState::Unlocked);
        }
        info!("PIN removed");
        Ok(())
    }

    /// Persist the idle threshold the activity monitor should use.
    pub async fn set_inactivity_timeout(&self, timeout: Duration) -> Result<(), SecurityError> {
        let _op = self.inner.op_lock.lock().await;
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let config = self.inner.state.lock().config.clone();

        match config {
            Some(mut config) => {
                config.inactivity_timeout_ms = millis;
                self.persist(&config).await?;
                let mut state = self.inner.state.lock();
                state.config = Some(config);
                state.inactivity_timeout = timeout;
            }
            None => {
                self.inner
                    .store
                    .set(keys::INACTIVITY_TIMEOUT, &millis.to_string())
                    .await?;
                self.inner.state.lock().inactivity_timeout = timeout;
            }
        }
        info!(timeout_ms = millis, "inactivity timeout updated");
        Ok(())
    }

    async fn install_pin(&self, pin: PinInput, enable_biometric: bool) -> Result<(), SecurityError> {
        let length = pin.validate()?;
        let _op = self.inner.op_lock.lock().await;
        if self.is_pin_set() {
            warn!("PIN setup refused; a PIN is already configured");
            return Err(SecurityError::AlreadyConfigured);
        }
        let hash = self.hash_blocking(pin).await?;

        let timeout = self.inactivity_timeout();
        let config = PinConfig {
            length,
            hash,
            biometric_enabled: enable_biometric,
            inactivity_timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            failed_attempts: 0,
            lockout_until: None,
        };
        self.persist(&config).await?;

        let changed = {
            let mut state = self.inner.state.lock();
            state.config = Some(config);
            let changed = state.lock != LockState::Unlocked;
            state.lock = LockState::Unlocked;
            changed
        };
        if changed {
            self.inner.listeners.emit(&LockState::Unlocked);
        }
        info!(digits = length.digits(), biometric = enable_biometric, "PIN configured");
        Ok(())
    }

    /// Compare a PIN and update the attempt counter. Caller holds `op_lock`.
    async fn check_pin(&self, pin: &PinInput) -> Result<PinVerification, SecurityError> {
        let Some(mut config) = self.inner.state.lock().config.clone() else {
            return Ok(PinVerification::NotConfigured);
        };

        let now = self.inner.clock.now();
        if let Some(remaining) = config.lockout_remaining(now) {
            warn!(remaining_secs = remaining.as_secs(), "PIN verification refused during lockout");
            return Ok(PinVerification::LockedOut { remaining });
        }
        if config.lockout_until.take().is_some() {
            config.failed_attempts = 0;
        }

        let matches = self.verify_blocking(pin.clone(), config.hash.clone()).await?;

        if matches {
            config.failed_attempts = 0;
            // no unlock unless this write lands
            self.persist(&config).await?;
            self.inner.state.lock().config = Some(config);
            return Ok(PinVerification::Valid);
        }

        config.failed_attempts = config.failed_attempts.saturating_add(1);
        let outcome = if config.failed_attempts >= self.inner.policy.max_attempts {
            let window = self.inner.policy.lockout_window();
            config.lockout_until = chrono::Duration::from_std(window).ok().map(|window| now + window);
            warn!(
                attempts = config.failed_attempts,
                window_secs = window.as_secs(),
                "too many failed PIN attempts; locking out"
            );
            PinVerification::LockedOut { remaining: window }
        } else {
            PinVerification::Invalid {
                remaining_attempts: self.inner.policy.max_attempts - config.failed_attempts,
            }
        };

        // the in-memory counter holds even if the write fails
        if let Err(err) = self.persist(&config).await {
            error!(error = %err, "failed to persist PIN attempt counter");
        }
        self.inner.state.lock().config = Some(config);
        Ok(outcome)
    }

    async fn set_biometric(&self, enabled: bool) -> Result<(), SecurityError> {
        let _op = self.inner.op_lock.lock().await;
        let Some(mut config) = self.inner.state.lock().config.clone() else {
            return Err(SecurityError::NotConfigured);
        };
        config.biometric_enabled = enabled;
        self.persist(&config).await?;
        self.inner.state.lock().config = Some(config);
        info!(enabled, "biometric unlock updated");
        Ok(())
    }

    /// Config blob plus the flag and timeout mirrors, in one write.
    async fn persist(&self, config: &PinConfig) -> Result<(), StoreError> {
        let blob = serde_json::to_string(config)?;
        self.inner
            .store
            .multi_set(&[
                (keys::PIN_CONFIG, blob),
                (keys::BIOMETRIC_ENABLED, config.biometric_enabled.to_string()),
                (keys::INACTIVITY_TIMEOUT, config.inactivity_timeout_ms.to_string()),
            ])
            .await
    }

    /// Returns true when the state changed and listeners were told.
    fn transition(&self, target: LockState) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.config.is_none() || state.lock == target {
                return false;
            }
            state.lock = target;
        }
        self.inner.listeners.emit(&target);
        true
    }

    async fn hash_blocking(&self, pin: PinInput) -> Result<String, SecurityError> {
        let hasher = self.inner.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&pin))
            .await
            .map_err(|err| SecurityError::Hashing(err.to_string()))?
    }

    async fn verify_blocking(&self, pin: PinInput, hash: String) -> Result<bool, SecurityError> {
        let hasher = self.inner.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&pin, &hash))
            .await
            .map_err(|err| SecurityError::Hashing(err.to_string()))?
    }
}
