//! Signaling server binary
//!
//! Configuration comes from the environment: `AULA_PORT`,
//! `AULA_ANNOUNCED_IP`, `AULA_ALLOWED_ORIGINS`, `AULA_WORKERS`.
//!
//! An engine failure is fatal: the process logs it, waits the configured
//! grace delay so logs flush, and exits nonzero for the supervisor to
//! restart.

use tracing_subscriber::EnvFilter;

use aula::signaling::{ServerConfig, SignalingServer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };
    let fatal_grace = config.fatal_grace;

    let server = match SignalingServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            std::process::exit(1);
        }
    };

    let mut fatal = server.relay().fatal_watch();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
                std::process::exit(1);
            }
        }
        _ = fatal.changed() => {
            let reason = fatal.borrow().clone().unwrap_or_else(|| "unknown".into());
            tracing::error!(%reason, "Media engine failure, exiting");
            tokio::time::sleep(fatal_grace).await;
            std::process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            server.relay().shutdown();
        }
    }
}
