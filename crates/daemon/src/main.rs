// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cludd`: the long-running control-plane process. Loads configuration,
//! installs logging, runs the startup sequence, serves the HTTP control
//! plane, and shuts down cleanly on SIGINT/SIGTERM (§4.7).

use clud_core::{Config, SystemClock};
use clud_daemon::lifecycle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    clud_daemon::logging::init(&config.config_dir)?;

    let (state, listener) = lifecycle::startup(config, SystemClock).await?;
    let state = std::sync::Arc::new(state);

    let background = CancellationToken::new();
    let tracker = lifecycle::spawn_background_tasks(&state, background.clone());

    let app = clud_daemon::http::router(state.clone());
    let serve = async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "http server exited with an error");
        }
    };

    let shutdown = async {
        lifecycle::wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
    };

    tokio::select! {
        _ = serve => {},
        _ = lifecycle::run_until_second_signal(shutdown) => {},
    }

    lifecycle::shutdown(&state, background, tracker).await;
    Ok(())
}
