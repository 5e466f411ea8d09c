/*
[INPUT]:  Activity monitor idle/lifecycle notifications, PIN controller
[OUTPUT]: Automatic lock on inactivity and on backgrounding
[POS]:    Activity layer - glue between inactivity detection and the app lock
[UPDATE]: When auto-lock triggers or timeout syncing change
*/

use std::time::Duration;

use tracing::info;

use crate::activity::{ActivityMonitor, Subscription};
use crate::security::{PinSecurityController, SecurityError};
use crate::types::ActivityKind;

/// Locks the controller when the monitor reports idleness (and, optionally,
/// when the app goes to the background). Detaches on drop.
#[derive(Debug)]
pub struct AutoLock {
    monitor: ActivityMonitor,
    controller: PinSecurityController,
    subscriptions: Vec<Subscription>,
}

impl AutoLock {
    pub fn attach(
        monitor: ActivityMonitor,
        controller: PinSecurityController,
        lock_on_background: bool,
    ) -> Self {
        monitor.set_timeout(controller.inactivity_timeout());

        let mut subscriptions = Vec::with_capacity(2);
        let idle_target = controller.clone();
        subscriptions.push(monitor.on_idle(move |idle| {
            info!(idle_secs = idle.as_secs(), "locking after inactivity");
            idle_target.lock();
        }));

        if lock_on_background {
            let background_target = controller.clone();
            subscriptions.push(monitor.subscribe(move |sample| {
                if sample.kind == ActivityKind::Background {
                    background_target.lock();
                }
            }));
        }

        Self {
            monitor,
            controller,
            subscriptions,
        }
    }

    /// Stop locking automatically.
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Re-read the controller's persisted timeout into the monitor.
    pub fn sync_timeout(&self) {
        self.monitor.set_timeout(self.controller.inactivity_timeout());
    }

    /// Persist a new timeout and apply it to the monitor.
    pub async fn set_inactivity_timeout(&self, timeout: Duration) -> Result<(), SecurityError> {
        self.controller.set_inactivity_timeout(timeout).await?;
        self.monitor.set_timeout(timeout);
        Ok(())
    }
}

impl Drop for AutoLock {
    fn drop(&mut self) {
        self.detach();
    }
}
