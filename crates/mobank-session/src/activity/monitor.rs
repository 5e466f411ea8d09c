/*
[INPUT]:  User/network activity samples, foreground/background transitions
[OUTPUT]: Time since last activity, sample notifications, one idle callback per idle period
[POS]:    Activity layer - inactivity detection feeding auto-lock
[UPDATE]: When idle timer semantics or lifecycle handling change
*/

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::events::{ListenerId, ListenerRegistry};
use crate::types::{ActivityKind, ActivitySample, AppState};

#[derive(Debug)]
struct MonitorState {
    running: bool,
    app_state: AppState,
    timeout: Duration,
    last_activity: Instant,
    last_sample: Option<ActivitySample>,
    timer: Option<AbortHandle>,
    /// Bumped on every (re)schedule; a waking timer with an older value is stale.
    generation: u64,
    idle_fired: bool,
}

struct Inner {
    state: Mutex<MonitorState>,
    clock: Arc<dyn Clock>,
    samples: ListenerRegistry<ActivitySample>,
    idle: ListenerRegistry<Duration>,
}

/// Tracks user and network activity and reports foreground inactivity.
///
/// One idle timer at most; each activity replaces it. The timer only runs
/// while started and in the foreground. Clones share state.
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Samples,
    Idle,
}

/// Handle for a registered listener.
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    monitor: Weak<Inner>,
    channel: Channel,
    id: ListenerId,
}

impl Subscription {
    /// Stop receiving notifications. Returns false if already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.monitor.upgrade() else {
            return false;
        };
        match self.channel {
            Channel::Samples => inner.samples.remove(self.id),
            Channel::Idle => inner.idle.remove(self.id),
        }
    }
}

impl fmt::Debug for ActivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ActivityMonitor")
            .field("running", &state.running)
            .field("app_state", &state.app_state)
            .field("timeout", &state.timeout)
            .field("idle_fired", &state.idle_fired)
            .finish()
    }
}

impl ActivityMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    /// `clock` only stamps samples; idle timing uses the tokio clock.
    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MonitorState {
                    running: false,
                    app_state: AppState::Foreground,
                    timeout,
                    last_activity: Instant::now(),
                    last_sample: None,
                    timer: None,
                    generation: 0,
                    idle_fired: false,
                }),
                clock,
                samples: ListenerRegistry::new(),
                idle: ListenerRegistry::new(),
            }),
        }
    }

    /// Begin watching. Counting starts from now.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }
        state.running = true;
        state.last_activity = Instant::now();
        state.idle_fired = false;
        if state.app_state == AppState::Foreground {
            self.schedule(&mut state);
        }
        info!(timeout_ms = state.timeout.as_millis() as u64, "activity monitor started");
    }

    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            return;
        }
        state.running = false;
        cancel_timer(&mut state);
        info!("activity monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Note activity of `kind`, restarting the idle countdown.
    ///
    /// Lifecycle kinds are routed to `set_app_state`.
    pub fn record_activity(&self, kind: ActivityKind) {
        match kind {
            ActivityKind::Background => return self.set_app_state(AppState::Background),
            ActivityKind::Foreground => return self.set_app_state(AppState::Foreground),
            _ => {}
        }

        let sample = ActivitySample {
            kind,
            at: self.inner.clock.now(),
        };
        {
            let mut state = self.inner.state.lock();
            state.last_activity = Instant::now();
            state.last_sample = Some(sample);
            state.idle_fired = false;
            if state.running && state.app_state == AppState::Foreground {
                self.schedule(&mut state);
            }
        }
        self.inner.samples.emit(&sample);
    }

    /// Handle an OS lifecycle transition.
    ///
    /// Background stops the idle timer. Foreground restarts counting from zero.
    pub fn set_app_state(&self, app_state: AppState) {
        let kind = match app_state {
            AppState::Background => ActivityKind::Background,
            AppState::Foreground => ActivityKind::Foreground,
        };
        let sample = ActivitySample {
            kind,
            at: self.inner.clock.now(),
        };

        {
            let mut state = self.inner.state.lock();
            if state.app_state == app_state {
                return;
            }
            state.app_state = app_state;
            state.last_activity = Instant::now();
            state.last_sample = Some(sample);
            match app_state {
                AppState::Background => cancel_timer(&mut state),
                AppState::Foreground => {
                    state.idle_fired = false;
                    if state.running {
                        self.schedule(&mut state);
                    }
                }
            }
        }
        debug!(?app_state, "app lifecycle transition");
        self.inner.samples.emit(&sample);
    }

    pub fn app_state(&self) -> AppState {
        self.inner.state.lock().app_state
    }

    /// Listen to every activity sample, lifecycle ones included.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ActivitySample) + Send + Sync + 'static,
    {
        let id = self.inner.samples.add(listener);
        Subscription {
            monitor: Arc::downgrade(&self.inner),
            channel: Channel::Samples,
            id,
        }
    }

    /// Called once per idle period with the idle time observed.
    pub fn on_idle<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        let id = self.inner.idle.add(move |idle: &Duration| listener(*idle));
        Subscription {
            monitor: Arc::downgrade(&self.inner),
            channel: Channel::Idle,
            id,
        }
    }

    pub fn is_inactive(&self) -> bool {
        let state = self.inner.state.lock();
        state.last_activity.elapsed() >= state.timeout
    }

    pub fn time_since_last_activity(&self) -> Duration {
        self.inner.state.lock().last_activity.elapsed()
    }

    pub fn last_sample(&self) -> Option<ActivitySample> {
        self.inner.state.lock().last_sample
    }

    pub fn timeout(&self) -> Duration {
        self.inner.state.lock().timeout
    }

    /// Change the idle threshold. A pending timer is rescheduled against the
    /// last activity, not restarted.
    pub fn set_timeout(&self, timeout: Duration) {
        let mut state = self.inner.state.lock();
        if state.timeout == timeout {
            return;
        }
        state.timeout = timeout;
        if state.running && state.app_state == AppState::Foreground && !state.idle_fired {
            self.schedule(&mut state);
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "idle timeout changed");
    }

    fn schedule(&self, state: &mut MonitorState) {
        cancel_timer(state);
        state.generation += 1;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("activity monitor used without a Tokio runtime; idle timer not started");
            return;
        };

        let generation = state.generation;
        let deadline = state.last_activity + state.timeout;
        let weak = Arc::downgrade(&self.inner);
        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                fire_idle(&inner, generation);
            }
        });
        state.timer = Some(task.abort_handle());
    }
}

fn cancel_timer(state: &mut MonitorState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

fn fire_idle(inner: &Inner, generation: u64) {
    let idle = {
        let mut state = inner.state.lock();
        let current = state.generation == generation
            && state.running
            && state.app_state == AppState::Foreground
            && !state.idle_fired;
        if !current {
            return;
        }
        state.idle_fired = true;
        state.timer = None;
        state.last_activity.elapsed()
    };
    info!(idle_ms = idle.as_millis() as u64, "inactivity threshold reached");
    inner.idle.emit(&idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn idle_counter(monitor: &ActivityMonitor) -> (Arc<AtomicU32>, Subscription) {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let subscription = monitor.on_idle(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (fired, subscription)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_activity_never_fires() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        let (fired, _sub) = idle_counter(&monitor);
        monitor.start();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            monitor.record_activity(ActivityKind::Touch);
        }
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_exactly_once_after_timeout() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        let (fired, _sub) = idle_counter(&monitor);
        monitor.start();
        monitor.record_activity(ActivityKind::Touch);

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(monitor.is_inactive());

        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_suspends_timer() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        let (fired, _sub) = idle_counter(&monitor);
        monitor.start();

        monitor.set_app_state(AppState::Background);
        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        monitor.set_app_state(AppState::Foreground);
        assert!(monitor.time_since_last_activity() < Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let monitor = ActivityMonitor::new(Duration::from_secs(10));
        let (fired, _sub) = idle_counter(&monitor);
        monitor.start();
        monitor.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_timeout_reschedules_from_last_activity() {
        let monitor = ActivityMonitor::new(Duration::from_secs(300));
        let (fired, _sub) = idle_counter(&monitor);
        monitor.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        monitor.set_timeout(Duration::from_secs(40));
        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listeners_in_order_and_isolated() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let _a = monitor.subscribe(move |sample| first.lock().push(("a", sample.kind)));
        let _b = monitor.subscribe(|_| panic!("listener failure"));
        let last = seen.clone();
        let c = monitor.subscribe(move |sample| last.lock().push(("c", sample.kind)));

        monitor.record_activity(ActivityKind::Navigation);
        assert_eq!(
            *seen.lock(),
            vec![("a", ActivityKind::Navigation), ("c", ActivityKind::Navigation)]
        );

        assert!(c.unsubscribe());
        monitor.record_activity(ActivityKind::Keyboard);
        assert_eq!(seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_lifecycle_samples_recorded() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        monitor.record_activity(ActivityKind::Background);
        assert_eq!(monitor.app_state(), AppState::Background);
        assert_eq!(
            monitor.last_sample().map(|sample| sample.kind),
            Some(ActivityKind::Background)
        );

        monitor.record_activity(ActivityKind::Foreground);
        assert_eq!(monitor.app_state(), AppState::Foreground);
    }
}
