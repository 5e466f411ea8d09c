/*
[INPUT]:  Line commands on stdin simulating user activity and app lifecycle
[OUTPUT]: Live auto-lock behaviour driven by the activity monitor
[POS]:    CLI interactive session loop
[UPDATE]: When watch commands or auto-lock wiring change
*/

use anyhow::Result;
use console::style;
use mobank_session::{ActivityKind, ActivityMonitor, AutoLock, LockState};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::App;

const HELP: &str =
    "commands: touch | nav | bg | fg | lock | unlock <pin> | get <path> | online | offline | status | help | quit";

/// Run the app loop until `quit`, EOF or shutdown.
pub async fn run(app: &App, shutdown: CancellationToken) -> Result<()> {
    let monitor = ActivityMonitor::new(app.controller.inactivity_timeout());
    let auto_lock = AutoLock::attach(
        monitor.clone(),
        app.controller.clone(),
        app.config.activity.lock_on_background,
    );
    let client = app.session.client().clone().with_activity_monitor(monitor.clone());

    let lock_listener = app.controller.subscribe_lock_state(|state| match state {
        LockState::Locked => println!("{}", style("🔒 locked").yellow()),
        LockState::Unlocked => println!("{}", style("🔓 unlocked").green()),
    });

    monitor.start();
    info!(
        timeout_secs = monitor.timeout().as_secs(),
        lock_on_background = app.config.activity.lock_on_background,
        "watching activity"
    );
    println!("{}", style(HELP).dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else { continue };

        match command {
            "touch" => monitor.record_activity(ActivityKind::Touch),
            "nav" => monitor.record_activity(ActivityKind::Navigation),
            "bg" => monitor.record_activity(ActivityKind::Background),
            "fg" => monitor.record_activity(ActivityKind::Foreground),
            "lock" => app.controller.lock(),
            "unlock" => {
                let Some(pin) = parts.next() else {
                    println!("usage: unlock <pin>");
                    continue;
                };
                monitor.record_activity(ActivityKind::Keyboard);
                match app.controller.verify_pin(pin).await {
                    Ok(outcome) => {
                        if let Some(reason) = outcome.reason() {
                            println!("{}", style(reason).red());
                        }
                    }
                    Err(err) => warn!(error = %err, "PIN verification failed"),
                }
            }
            "get" => {
                let Some(path) = parts.next() else {
                    println!("usage: get <path>");
                    continue;
                };
                if app.controller.is_locked() {
                    println!("{}", style("app is locked; unlock first").yellow());
                    continue;
                }
                match client.get::<Value>(path).await {
                    Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    Err(err) => println!("{} {err}", style(err.kind()).red()),
                }
            }
            "online" => app.connectivity.set_online(true),
            "offline" => app.connectivity.set_online(false),
            "status" => println!(
                "app={:?} pin={:?} idle={}s/{}s",
                monitor.app_state(),
                app.controller.status(),
                monitor.time_since_last_activity().as_secs(),
                monitor.timeout().as_secs()
            ),
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            other => println!("unknown command `{other}`; {HELP}"),
        }
    }

    monitor.stop();
    drop(auto_lock);
    app.controller.unsubscribe_lock_state(lock_listener);
    info!("watch loop finished");
    Ok(())
}
