//! Command implementations for the GameHub CLI

use gamehub::logging::{self, LoggingConfig};
use gamehub::{api, AppState, Config, Result};

/// Run the HTTP server until ctrl-c or SIGTERM
pub async fn serve(config: Config, verbose: bool) -> Result<()> {
    logging::init(&LoggingConfig::from_app(&config.app, verbose))?;

    tracing::info!(
        environment = ?config.app.environment,
        database = %config.database.url,
        verifier = ?config.chain.verifier,
        "starting {}",
        config.app.name
    );

    let state = AppState::from_config(config)?;
    api::serve(state, shutdown_signal()).await
}

pub fn check_config(config: &Config) -> Result<()> {
    // load() already validated; report what was accepted
    println!(
        "configuration ok: environment={:?} listen={} database={}",
        config.app.environment, config.server.listen_address, config.database.url
    );
    Ok(())
}

pub fn print_config(config: &Config) -> Result<()> {
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
