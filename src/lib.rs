pub(crate) mod action_http;
pub mod app_logger;
pub mod bridge;
pub mod config;
pub(crate) mod error_classification;
pub mod message;
pub mod panel;
pub mod request;
pub mod settings;
pub mod state;
pub mod trigger;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub use message::{ActionOutcome, Envelope, TriggerPayload};
pub use panel::Panel;
pub use state::PluginState;

/// Route diagnostics to stderr; stdout carries the message channel.
fn init_tracing(fallback_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Backend entry point: read envelopes from stdin, write envelopes to stdout,
/// return once stdin closes and every accepted trigger has reported.
pub fn run() -> anyhow::Result<()> {
    let config = config::load_plugin_config();
    init_tracing(&config.log_level);

    let config_path = config::config_dir().join(config::CONFIG_FILE);
    if !config_path.exists() {
        match config::save_plugin_config(&config) {
            Ok(()) => tracing::info!(path = %config_path.display(), "Wrote default config"),
            Err(e) => tracing::warn!(error = %e, "Could not write default config"),
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        let (outbox, rx) = bridge::Outbox::channel();
        let writer = tokio::spawn(bridge::write_envelopes(rx, tokio::io::stdout()));

        let state = Arc::new(
            PluginState::new(config, outbox.clone()).map_err(anyhow::Error::msg)?,
        );
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "actionthing started");
        bridge::announce_settings(&outbox);

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        bridge::serve(Arc::clone(&state), stdin)
            .await
            .context("Failed to read from stdin")?;

        let metrics = state.metrics.snapshot();
        tracing::info!(
            accepted = metrics.accepted,
            rejected = metrics.rejected,
            responded = metrics.responded,
            failed = metrics.failed,
            "Input closed, shutting down"
        );

        // last senders gone: the writer drains and exits
        drop(state);
        drop(outbox);
        writer
            .await
            .context("Writer task panicked")?
            .context("Failed to write to stdout")
    })
}
