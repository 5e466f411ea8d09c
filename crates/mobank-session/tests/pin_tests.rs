/*
[INPUT]:  PIN policy fixtures, in-memory and file-backed stores
[OUTPUT]: PIN lock state machine verification through the public API
[POS]:    Integration tests - PIN setup, verification, lockout, restore
[UPDATE]: When PIN policy or lock transitions change
*/

mod common;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use common::*;
use mobank_session::security::{PinInput, SetupProgress, SetupStage};
use mobank_session::{
    JsonFileStore, LockState, ManualClock, MemoryStore, MockBiometricAuthenticator,
    BiometricCapability, PinLength, PinSecurityController, PinSetupFlow, PinStatus,
    PinVerification, SecurityError,
};
use parking_lot::Mutex;
use rstest::rstest;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_setup_and_verify_round() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_eq!(controller.status(), PinStatus::NotConfigured);

    assert_ok!(controller.setup_pin("1234", false).await);
    assert_eq!(controller.status(), PinStatus::Configured(LockState::Unlocked));
    assert_eq!(controller.pin_length(), Some(PinLength::Four));

    controller.lock();
    assert!(controller.is_locked());
    assert_eq!(
        assert_ok!(controller.verify_pin("1234").await),
        PinVerification::Valid
    );
    assert!(!controller.is_locked());
}

#[tokio::test]
async fn test_lockout_after_max_attempts_rejects_correct_pin() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", false).await);
    controller.lock();

    for _ in 0..5 {
        let outcome = assert_ok!(controller.verify_pin("0000").await);
        assert!(!outcome.is_valid());
    }
    assert_eq!(controller.failed_attempts(), 5);
    assert!(controller.lockout_remaining().is_some());

    let outcome = assert_ok!(controller.verify_pin("1234").await);
    assert!(matches!(outcome, PinVerification::LockedOut { .. }));
    assert_eq!(controller.failed_attempts(), 5);
    assert!(controller.is_locked());
}

#[tokio::test]
async fn test_lockout_expires_with_time() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let policy = test_config("http://localhost").pin;
    let window = policy.lockout_window();
    let controller = assert_ok!(
        PinSecurityController::load_with_clock(store, policy, clock.clone()).await
    );
    assert_ok!(controller.setup_pin("654321", false).await);

    for _ in 0..5 {
        assert_ok!(controller.verify_pin("000000").await);
    }
    clock.advance(ChronoDuration::from_std(window).unwrap() + ChronoDuration::seconds(1));

    assert!(controller.lockout_remaining().is_none());
    assert_eq!(
        assert_ok!(controller.verify_pin("654321").await),
        PinVerification::Valid
    );
    assert_eq!(controller.failed_attempts(), 0);
}

#[tokio::test]
async fn test_lockout_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("secure.json");

    {
        let store = Arc::new(assert_ok!(JsonFileStore::open(&file).await));
        let controller = pin_controller(store).await;
        assert_ok!(controller.setup_pin("1234", true).await);
        for _ in 0..5 {
            assert_ok!(controller.verify_pin("9999").await);
        }
    }

    let store = Arc::new(assert_ok!(JsonFileStore::open(&file).await));
    let controller = pin_controller(store).await;
    assert_eq!(controller.status(), PinStatus::Configured(LockState::Locked));
    assert!(controller.is_biometric_enabled());
    assert_eq!(controller.failed_attempts(), 5);

    let outcome = assert_ok!(controller.verify_pin("1234").await);
    assert!(matches!(outcome, PinVerification::LockedOut { .. }));
}

#[tokio::test]
async fn test_setup_flow_mismatch_then_confirm() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;

    let mut flow = PinSetupFlow::new();
    assert_ok!(flow.begin());
    assert_eq!(
        assert_ok!(flow.enter(PinInput::new("1234"))),
        SetupProgress::AwaitingConfirmation
    );
    assert_eq!(
        assert_ok!(flow.enter(PinInput::new("4321"))),
        SetupProgress::Mismatch
    );
    assert_eq!(flow.stage(), SetupStage::Create);

    assert_ok!(flow.enter(PinInput::new("246810")));
    assert_eq!(
        assert_ok!(flow.enter(PinInput::new("246810"))),
        SetupProgress::Confirmed
    );

    assert_ok!(controller.complete_setup(flow, false).await);
    assert_eq!(controller.pin_length(), Some(PinLength::Six));
    controller.lock();
    assert!(assert_ok!(controller.verify_pin("246810").await).is_valid());
}

#[tokio::test]
async fn test_unconfirmed_flow_cannot_complete() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    let mut flow = PinSetupFlow::new();
    assert_ok!(flow.begin());
    assert_ok!(flow.enter(PinInput::new("1234")));

    let err = controller.complete_setup(flow, false).await.unwrap_err();
    assert!(matches!(err, SecurityError::Setup(_)));
    assert!(!controller.is_pin_set());
}

#[rstest]
#[case("123")]
#[case("12345")]
#[case("1234567")]
#[case("12a4")]
#[case("")]
#[tokio::test]
async fn test_malformed_pins_rejected(#[case] pin: &str) {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    let result = controller.setup_pin(pin, false).await;
    assert!(matches!(
        result.unwrap_err(),
        SecurityError::InvalidPinLength(_) | SecurityError::InvalidPinFormat
    ));
    assert!(!controller.is_pin_set());
}

#[tokio::test]
async fn test_biometric_unlock_flow() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", false).await);
    controller.lock();

    let face = MockBiometricAuthenticator::new(BiometricCapability::Face, true);
    // flag off: no prompt
    assert!(!assert_ok!(controller.unlock_with_biometric(&face).await));
    assert_eq!(face.prompts(), 0);

    assert_ok!(controller.enable_biometric().await);
    assert!(assert_ok!(controller.unlock_with_biometric(&face).await));
    assert_eq!(face.prompts(), 1);
    assert!(!controller.is_locked());

    controller.lock();
    let refused = MockBiometricAuthenticator::new(BiometricCapability::Fingerprint, false);
    assert!(!assert_ok!(controller.unlock_with_biometric(&refused).await));
    assert!(controller.is_locked());
}

#[tokio::test]
async fn test_lock_state_listener_sees_each_transition() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    controller.subscribe_lock_state(move |state| sink.lock().push(state));

    assert_ok!(controller.setup_pin("1234", false).await);
    controller.lock();
    controller.lock();
    assert_ok!(controller.verify_pin("1234").await);

    // repeated lock() is not a transition
    assert_eq!(*seen.lock(), vec![LockState::Locked, LockState::Unlocked]);
}

#[tokio::test]
async fn test_remove_pin_returns_to_unconfigured() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", true).await);
    assert_ok!(
        controller
            .set_inactivity_timeout(std::time::Duration::from_secs(60))
            .await
    );

    assert_ok!(controller.remove_pin().await);
    assert_eq!(controller.status(), PinStatus::NotConfigured);
    assert!(!controller.is_biometric_enabled());
    assert_eq!(
        controller.inactivity_timeout(),
        std::time::Duration::from_secs(300)
    );
    assert_eq!(
        assert_ok!(controller.verify_pin("1234").await),
        PinVerification::NotConfigured
    );
}

#[tokio::test]
async fn test_setup_cannot_bypass_lockout() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", false).await);
    controller.lock();
    for _ in 0..5 {
        assert_ok!(controller.verify_pin("0000").await);
    }
    assert!(controller.lockout_remaining().is_some());

    let err = controller.setup_pin("9999", false).await.unwrap_err();
    assert!(matches!(err, SecurityError::AlreadyConfigured));

    let mut flow = PinSetupFlow::new();
    assert_ok!(flow.begin());
    assert_ok!(flow.enter(PinInput::new("9999")));
    assert_ok!(flow.enter(PinInput::new("9999")));
    let err = controller.complete_setup(flow, false).await.unwrap_err();
    assert!(matches!(err, SecurityError::AlreadyConfigured));

    assert_eq!(controller.status(), PinStatus::Configured(LockState::Locked));
    assert_eq!(controller.failed_attempts(), 5);
    assert!(controller.lockout_remaining().is_some());
}

#[tokio::test]
async fn test_biometric_unlock_restores_full_attempt_budget() {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", true).await);
    controller.lock();
    for _ in 0..4 {
        assert_ok!(controller.verify_pin("0000").await);
    }

    let face = MockBiometricAuthenticator::new(BiometricCapability::Face, true);
    assert!(assert_ok!(controller.unlock_with_biometric(&face).await));
    assert_eq!(controller.failed_attempts(), 0);

    controller.lock();
    assert_eq!(
        assert_ok!(controller.verify_pin("0000").await),
        PinVerification::Invalid { remaining_attempts: 4 }
    );
}
