use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::bridge::Outbox;
use crate::config::PluginConfig;

/// Counters for trigger handling, reported at shutdown.
#[derive(Default)]
pub(crate) struct TriggerMetrics {
    pub(crate) accepted: AtomicUsize,
    pub(crate) rejected: AtomicUsize,
    pub(crate) responded: AtomicUsize,
    pub(crate) failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MetricsSnapshot {
    pub accepted: usize,
    pub rejected: usize,
    pub responded: usize,
    pub failed: usize,
}

impl TriggerMetrics {
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Backend state shared by every trigger task.
pub struct PluginState {
    pub(crate) config: RwLock<PluginConfig>,
    /// One pooled client for all calls; deadlines are applied per call.
    pub(crate) http_client: reqwest::Client,
    pub(crate) outbox: Outbox,
    pub(crate) metrics: TriggerMetrics,
}

impl PluginState {
    pub fn new(config: PluginConfig, outbox: Outbox) -> Result<Self, String> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("actionthing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            config: RwLock::new(config),
            http_client,
            outbox,
            metrics: TriggerMetrics::default(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_state(
    config: PluginConfig,
) -> (
    std::sync::Arc<PluginState>,
    tokio::sync::mpsc::UnboundedReceiver<crate::message::Envelope>,
) {
    let (outbox, rx) = Outbox::channel();
    let state = PluginState::new(config, outbox).expect("build test state");
    (std::sync::Arc::new(state), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_start_at_zero_and_count() {
        let metrics = TriggerMetrics::default();
        TriggerMetrics::bump(&metrics.accepted);
        TriggerMetrics::bump(&metrics.accepted);
        TriggerMetrics::bump(&metrics.failed);
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot { accepted: 2, rejected: 0, responded: 0, failed: 1 }
        );
    }

    #[test]
    fn state_keeps_the_given_config() {
        let cfg = PluginConfig { request_timeout_ms: 1234, ..PluginConfig::default() };
        let (state, _rx) = test_state(cfg.clone());
        assert_eq!(*state.config.read(), cfg);
    }
}
