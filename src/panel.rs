//! Client-side panel state: which buttons show, what a click sends, and how
//! returning outcomes are bound to buttons and the activity log.
//!
//! The panel is a plain state machine. A UI shell feeds it inbound envelopes
//! and the current time, and sends whatever [`Panel::trigger`] returns.

use std::time::{Duration, Instant};

use crate::app_logger::{LogLevel, LogRingBuffer, LOG_RING_CAPACITY};
use crate::message::{ActionOutcome, Envelope, SettingsSnapshot, TriggerPayload};
use crate::settings::{slot_index, ButtonConfig, ButtonId, ButtonSettings, SettingKey, SLOT_COUNT};

pub const RESULT_DISPLAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    /// How long an outcome colours its button.
    pub result_display: Duration,
    pub log_capacity: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            result_display: RESULT_DISPLAY,
            log_capacity: LOG_RING_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStatus {
    Idle,
    Success,
    Failure,
}

/// Everything a renderer needs for one button.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonView {
    pub id: ButtonId,
    pub label: String,
    pub background_color: String,
    pub text_color: String,
    pub status: ButtonStatus,
    /// The outcome currently shown, if still within the display window.
    pub outcome: Option<ActionOutcome>,
}

struct Displayed {
    outcome: ActionOutcome,
    shown_at: Instant,
}

pub struct Panel {
    config: PanelConfig,
    settings: ButtonSettings,
    /// Last sequence number handed out per slot.
    issued_seq: [u64; SLOT_COUNT],
    /// Newest sequence number accepted per slot.
    accepted_seq: [Option<u64>; SLOT_COUNT],
    displayed: [Option<Displayed>; SLOT_COUNT],
    log: LogRingBuffer,
}

impl Default for Panel {
    fn default() -> Self {
        Self::new(PanelConfig::default())
    }
}

impl Panel {
    pub fn new(config: PanelConfig) -> Self {
        let log = LogRingBuffer::new(config.log_capacity);
        Self {
            config,
            settings: ButtonSettings::default(),
            issued_seq: [0; SLOT_COUNT],
            accepted_seq: [None; SLOT_COUNT],
            displayed: std::array::from_fn(|_| None),
            log,
        }
    }

    pub fn settings(&self) -> &ButtonSettings {
        &self.settings
    }

    pub fn background_color(&self) -> &str {
        &self.settings.background_color
    }

    /// Replace the settings with a host snapshot. Keys the snapshot omits
    /// fall back to their defaults. Returns one warning per skipped entry.
    pub fn apply_snapshot(&mut self, snapshot: &SettingsSnapshot) -> Vec<String> {
        let mut settings = ButtonSettings::default();
        let warnings =
            settings.apply_entries(snapshot.iter().map(|(k, entry)| (k.as_str(), &entry.value)));
        for warning in &warnings {
            tracing::warn!("Ignoring setting: {warning}");
        }
        self.settings = settings;
        warnings
    }

    pub fn update_setting(&mut self, key: SettingKey, value: &serde_json::Value) -> Result<(), String> {
        self.settings.apply(key, value)
    }

    /// Restore a slot to factory defaults and forget its displayed outcome.
    pub fn reset_button(&mut self, id: ButtonId) -> Result<(), String> {
        self.settings.reset_slot(id)?;
        if let Some(idx) = slot_index(id) {
            self.displayed[idx] = None;
        }
        Ok(())
    }

    /// Assemble the trigger for a click on `id`. Disabled or unknown slots
    /// send nothing.
    pub fn trigger(&mut self, id: ButtonId) -> Option<Envelope> {
        let idx = slot_index(id)?;
        let button = self.settings.get(id)?;
        if !button.enabled {
            tracing::debug!(button_id = id, "Ignoring click on disabled button");
            return None;
        }
        self.issued_seq[idx] += 1;
        let payload = TriggerPayload::from_button(button, Some(self.issued_seq[idx]));
        Some(Envelope::TriggerAction(payload))
    }

    /// Feed one inbound envelope.
    pub fn handle(&mut self, envelope: Envelope, now: Instant) {
        match envelope {
            Envelope::ActionResponse(outcome) => self.accept_outcome(outcome, now),
            Envelope::Log(message) => {
                self.log.push(LogLevel::Info, message);
            }
            Envelope::Error(message) => {
                self.log.push(LogLevel::Error, message);
            }
            Envelope::Settings(snapshot) => {
                self.apply_snapshot(&snapshot);
            }
            other => tracing::debug!(kind = other.kind(), "Panel ignores message"),
        }
    }

    fn accept_outcome(&mut self, outcome: ActionOutcome, now: Instant) {
        let Some(idx) = slot_index(outcome.button_id) else {
            tracing::warn!(button_id = outcome.button_id, "Outcome for unknown button");
            return;
        };
        if let (Some(seq), Some(newest)) = (outcome.request_seq, self.accepted_seq[idx])
            && seq < newest
        {
            tracing::debug!(button_id = outcome.button_id, seq, newest, "Discarding stale outcome");
            return;
        }
        if let Some(seq) = outcome.request_seq {
            self.accepted_seq[idx] = Some(seq);
        }

        let label = self.settings.buttons()[idx].display_label();
        self.log.push(LogLevel::Info, outcome_line(&label, &outcome));
        self.displayed[idx] = Some(Displayed { outcome, shown_at: now });
    }

    pub fn button_view(&self, id: ButtonId, now: Instant) -> Option<ButtonView> {
        let idx = slot_index(id)?;
        Some(self.view_of(&self.settings.buttons()[idx], idx, now))
    }

    /// Views of the enabled buttons, in slot order.
    pub fn enabled_buttons(&self, now: Instant) -> Vec<ButtonView> {
        self.settings
            .buttons()
            .iter()
            .enumerate()
            .filter(|(_, b)| b.enabled)
            .map(|(idx, b)| self.view_of(b, idx, now))
            .collect()
    }

    fn view_of(&self, button: &ButtonConfig, idx: usize, now: Instant) -> ButtonView {
        let outcome = self.displayed[idx]
            .as_ref()
            .filter(|d| now.saturating_duration_since(d.shown_at) < self.config.result_display)
            .map(|d| d.outcome.clone());
        let status = match &outcome {
            None => ButtonStatus::Idle,
            Some(o) if o.success => ButtonStatus::Success,
            Some(_) => ButtonStatus::Failure,
        };
        ButtonView {
            id: button.id,
            label: button.display_label(),
            background_color: button.background_color.clone(),
            text_color: button.text_color.clone(),
            status,
            outcome,
        }
    }

    /// Formatted activity lines, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.log.lines()
    }

    pub fn clear_logs(&mut self) {
        self.log.clear();
    }
}

fn outcome_line(label: &str, outcome: &ActionOutcome) -> String {
    if outcome.status == 0 {
        format!("{label}: failed ({})", outcome.response_body)
    } else {
        format!("{label}: {} {}", outcome.status, outcome.status_text)
    }
}
