/*
[INPUT]:  Parsed CLI settings and the resolved store path
[OUTPUT]: Wired session components shared by every subcommand
[POS]:    CLI composition root
[UPDATE]: When subcommands need new components
*/

pub mod pin;
pub mod request;
pub mod session;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use mobank_session::{
    JsonFileStore, PinSecurityController, SessionConfig, SessionEvent, SessionManager,
    SharedConnectivity,
};
use tracing::info;

/// Components built once per invocation.
pub struct App {
    pub config: SessionConfig,
    pub store_path: PathBuf,
    pub session: SessionManager,
    pub controller: PinSecurityController,
    pub connectivity: SharedConnectivity,
}

impl App {
    pub async fn build(config: SessionConfig, store_path: PathBuf, offline: bool) -> Result<Self> {
        let store = Arc::new(
            JsonFileStore::open(&store_path)
                .await
                .with_context(|| format!("open store {}", store_path.display()))?,
        );
        let connectivity = SharedConnectivity::new(!offline);

        let session = SessionManager::from_config(&config, store.clone(), Arc::new(connectivity.clone()))
            .context("build session manager")?;
        let controller = PinSecurityController::load(store, config.pin.clone())
            .await
            .context("load PIN configuration")?;

        for event in [SessionEvent::TokenExpired, SessionEvent::LoginRequired] {
            session.tokens().on(event, |event| match event {
                SessionEvent::TokenExpired => info!("access token expired"),
                SessionEvent::LoginRequired => {
                    eprintln!("{}", style("Session ended; run `mobank login`.").yellow());
                }
            });
        }

        info!(store = %store_path.display(), base_url = %config.api.base_url, "session core ready");
        Ok(Self {
            config,
            store_path,
            session,
            controller,
            connectivity,
        })
    }
}
