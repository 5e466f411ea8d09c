/*
[INPUT]:  Activity monitor, PIN controller and paused tokio time
[OUTPUT]: Auto-lock behaviour verification
[POS]:    Integration tests - inactivity and lifecycle driven locking
[UPDATE]: When idle detection or auto-lock triggers change
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use mobank_session::{
    ActivityKind, ActivityMonitor, AutoLock, BiometricCapability, MemoryStore,
    MockBiometricAuthenticator, PinSecurityController,
};
use serde_json::{Value, json};
use tokio_test::assert_ok;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const IDLE: Duration = Duration::from_secs(60);

/// Configured, unlocked controller with biometric unlock enabled.
///
/// Hashing runs on the blocking pool, so this runs before any timer exists.
async fn unlocked_controller() -> PinSecurityController {
    let controller = pin_controller(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.setup_pin("1234", true).await);
    controller
}

async fn unlock(controller: &PinSecurityController) {
    let face = MockBiometricAuthenticator::new(BiometricCapability::Face, true);
    assert!(assert_ok!(controller.unlock_with_biometric(&face).await));
}

#[tokio::test(start_paused = true)]
async fn test_idle_foreground_locks_once_per_period() {
    let controller = unlocked_controller().await;
    let monitor = ActivityMonitor::new(Duration::from_secs(300));
    let auto = AutoLock::attach(monitor.clone(), controller.clone(), true);
    assert_ok!(auto.set_inactivity_timeout(IDLE).await);
    monitor.start();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(!controller.is_locked());
    monitor.record_activity(ActivityKind::Touch);

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(!controller.is_locked());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(controller.is_locked());

    // no new activity, no new idle notification
    unlock(&controller).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(!controller.is_locked());

    monitor.record_activity(ActivityKind::Navigation);
    tokio::time::sleep(IDLE + Duration::from_secs(1)).await;
    assert!(controller.is_locked());
}

#[tokio::test(start_paused = true)]
async fn test_background_locks_immediately() {
    let controller = unlocked_controller().await;
    let monitor = ActivityMonitor::new(IDLE);
    let _auto = AutoLock::attach(monitor.clone(), controller.clone(), true);
    monitor.start();

    monitor.record_activity(ActivityKind::Background);
    assert!(controller.is_locked());

    // coming back does not unlock
    tokio::time::sleep(Duration::from_secs(5)).await;
    monitor.record_activity(ActivityKind::Foreground);
    assert!(controller.is_locked());
}

#[tokio::test(start_paused = true)]
async fn test_background_time_does_not_count_as_idle() {
    let controller = unlocked_controller().await;
    let monitor = ActivityMonitor::new(Duration::from_secs(300));
    let auto = AutoLock::attach(monitor.clone(), controller.clone(), false);
    assert_ok!(controller.set_inactivity_timeout(IDLE).await);
    auto.sync_timeout();
    assert_eq!(monitor.timeout(), IDLE);
    monitor.start();

    tokio::time::sleep(Duration::from_secs(30)).await;
    monitor.record_activity(ActivityKind::Background);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(!controller.is_locked());

    // foreground restarts the countdown from zero
    monitor.record_activity(ActivityKind::Foreground);
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(!controller.is_locked());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(controller.is_locked());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_monitor_never_locks() {
    let controller = unlocked_controller().await;
    let monitor = ActivityMonitor::new(IDLE);
    let _auto = AutoLock::attach(monitor.clone(), controller.clone(), true);
    monitor.start();
    monitor.stop();

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(!controller.is_locked());
}

#[tokio::test]
async fn test_api_calls_count_as_activity() {
    let server = setup_mock_server().await;
    let h = harness(&server);
    assert_ok!(h.session.tokens().set_tokens(valid_pair("access-1")).await);

    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let monitor = ActivityMonitor::new(IDLE);
    monitor.start();
    let client = h.session.client().clone().with_activity_monitor(monitor.clone());

    assert!(monitor.last_sample().is_none());
    let _: Value = assert_ok!(client.get("/accounts").await);
    assert_eq!(monitor.last_sample().unwrap().kind, ActivityKind::ApiCall);
    assert!(!monitor.is_inactive());
}
