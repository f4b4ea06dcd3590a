//! Host boundary: newline-delimited JSON envelopes.
//!
//! Inbound lines are decoded into [`Envelope`]s and dispatched; each trigger
//! runs as its own task. Outbound notifications go through an [`Outbox`],
//! an unbounded channel drained by a single writer so lines never interleave.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::message::{ActionOutcome, Envelope};
use crate::settings::ButtonSettings;
use crate::state::PluginState;
use crate::trigger;

/// Sending half of the outbound message channel.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, envelope: Envelope) {
        let kind = envelope.kind();
        if self.tx.send(envelope).is_err() {
            tracing::warn!(kind, "Outbound channel closed, dropping message");
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(Envelope::Log(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(Envelope::Error(message.into()));
    }

    pub fn action_response(&self, outcome: ActionOutcome) {
        self.send(Envelope::ActionResponse(outcome));
    }
}

/// Decode one inbound line.
pub fn parse_line(line: &str) -> Result<Envelope, String> {
    serde_json::from_str(line).map_err(|e| format!("Malformed message: {e}"))
}

/// Register the settings schema with the host (factory defaults).
pub fn announce_settings(outbox: &Outbox) {
    outbox.send(Envelope::InitSettings(ButtonSettings::default().schema()));
}

/// Route one inbound envelope. Triggers are spawned onto `tasks`; nothing
/// here waits on the network.
pub fn dispatch(state: &Arc<PluginState>, envelope: Envelope, tasks: &mut JoinSet<()>) {
    match envelope {
        Envelope::TriggerAction(payload) => {
            let state = Arc::clone(state);
            tasks.spawn(async move {
                trigger::handle_trigger(&state, payload).await;
            });
        }
        Envelope::Settings(snapshot) => {
            tracing::debug!(entries = snapshot.len(), "Settings snapshot received");
        }
        other => {
            tracing::debug!(kind = other.kind(), "Ignoring message not addressed to the backend");
        }
    }
}

/// Read envelopes until EOF, then wait for in-flight triggers so every
/// accepted trigger still gets its outcome out. A bad line is answered with
/// an `error` envelope and skipped; a read error still drains the triggers.
pub async fn serve<R>(state: Arc<PluginState>, mut reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut tasks = JoinSet::new();
    let mut buf = Vec::new();

    let read_result = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to read inbound message");
                break Err(e);
            }
        }

        match decode_line(&buf) {
            Ok(None) => continue,
            Ok(Some(envelope)) => dispatch(&state, envelope, &mut tasks),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected inbound line");
                state.outbox.error(e);
            }
        }
        // reap finished triggers so the set stays small
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "Trigger task panicked");
            }
        }
    };

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "Trigger task panicked");
        }
    }
    read_result
}

/// Decode one raw line (newline included). Blank lines yield `None`.
fn decode_line(raw: &[u8]) -> Result<Option<Envelope>, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("Malformed message: {e}"))?;
    let line = text.trim();
    if line.is_empty() {
        return Ok(None);
    }
    parse_line(line).map(Some)
}

/// Drain the outbox into `writer`, one JSON document per line.
pub async fn write_envelopes<W>(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    mut writer: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = match serde_json::to_string(&envelope) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(kind = envelope.kind(), error = %e, "Failed to encode outbound message");
                continue;
            }
        };
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
