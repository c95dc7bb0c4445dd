use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use broadside_api::{ApiConfig, ApiServer, AppState, MemoryAudience};
use broadside_common::{Signal, internal, logging, tracing};
use broadside_dispatch::{
    Campaign, DispatchConfig,
    transport::{SmtpConfig, SmtpTransport},
};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Where recipients are loaded from at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AudienceConfig {
    pub path: PathBuf,
}

/// Top-level configuration, read from `broadside.config.ron`.
#[derive(Debug, Deserialize)]
pub struct Broadside {
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    smtp: SmtpConfig,
    audience: AudienceConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, finishing in-flight requests");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Broadside {
    pub const fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    /// Run the API server until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// This function will return an error if the dispatch settings are
    /// unusable, the relay or audience cannot be set up, or the server fails
    /// to bind.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let transport = SmtpTransport::new(&self.smtp)?;
        let campaign = Campaign::new(self.dispatch, Arc::new(transport))?;
        let audience = MemoryAudience::from_file(&self.audience.path)?;

        tracing::info!(
            smtp = %self.smtp.host,
            audience = %self.audience.path.display(),
            "Controller running"
        );

        let server = ApiServer::new(&self.api, AppState::new(campaign, Arc::new(audience))).await?;
        let mut serving = tokio::spawn(server.serve(SHUTDOWN_BROADCAST.subscribe()));

        tokio::select! {
            r = &mut serving => {
                r??;
                return Ok(());
            }
            r = shutdown() => r?,
        }

        serving.await??;

        let _ = SHUTDOWN_BROADCAST.send(Signal::Finalised);
        internal!(level = INFO, "Shutting down...");

        Ok(())
    }
}
