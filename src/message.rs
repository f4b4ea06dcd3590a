//! Typed message envelope exchanged across the host boundary.
//!
//! Every message is `{ "type": <kebab-case name>, "payload": <body> }`. The
//! shape is enforced when a line is decoded, so handlers receive concrete
//! payload types instead of probing for nested `payload` fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::settings::{redact, ButtonConfig, ButtonId, SettingDescriptor};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Envelope {
    /// UI -> backend: fire one button.
    TriggerAction(TriggerPayload),
    /// Backend -> UI: the single outcome of an accepted trigger.
    ActionResponse(ActionOutcome),
    Log(String),
    Error(String),
    /// Host -> UI: current settings snapshot.
    Settings(SettingsSnapshot),
    /// Backend -> host: settings schema registration.
    InitSettings(Vec<SettingDescriptor>),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::TriggerAction(_) => "trigger-action",
            Envelope::ActionResponse(_) => "action-response",
            Envelope::Log(_) => "log",
            Envelope::Error(_) => "error",
            Envelope::Settings(_) => "settings",
            Envelope::InitSettings(_) => "init-settings",
        }
    }
}

/// Host settings snapshot: host key -> stored entry.
pub type SettingsSnapshot = BTreeMap<String, SettingEntry>;

/// A stored host setting. Descriptor fields other than `value` are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub value: Value,
}

// ---------------------------------------------------------------------------
// Trigger payload
// ---------------------------------------------------------------------------

/// Inbound trigger. Every field except `buttonId` falls back to a default
/// when absent or empty.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_id: Option<ButtonId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<String>,
    /// Per-button sequence number, echoed back in the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_seq: Option<u64>,
}

impl TriggerPayload {
    /// Package a slot's current configuration for sending.
    pub fn from_button(button: &ButtonConfig, request_seq: Option<u64>) -> Self {
        Self {
            button_id: Some(button.id),
            url: Some(button.url.clone()),
            label: Some(button.display_label()),
            method: Some(button.method.as_str().to_string()),
            auth_type: Some(button.auth_type.as_str().to_string()),
            auth_token: Some(button.auth_token.clone()),
            auth_username: Some(button.auth_username.clone()),
            auth_password: Some(button.auth_password.clone()),
            custom_payload: Some(button.custom_payload.clone()),
            custom_headers: Some(button.custom_headers.clone()),
            request_seq,
        }
    }
}

impl fmt::Debug for TriggerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |s: &Option<String>| s.as_deref().map(redact);
        f.debug_struct("TriggerPayload")
            .field("button_id", &self.button_id)
            .field("url", &self.url)
            .field("label", &self.label)
            .field("method", &self.method)
            .field("auth_type", &self.auth_type)
            .field("auth_token", &secret(&self.auth_token))
            .field("auth_username", &self.auth_username)
            .field("auth_password", &secret(&self.auth_password))
            .field("custom_payload", &self.custom_payload)
            .field("custom_headers", &self.custom_headers)
            .field("request_seq", &self.request_seq)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Normalized result of one accepted trigger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub button_id: ButtonId,
    pub status: u16,
    pub status_text: String,
    #[serde(rename = "response", alias = "responseBody")]
    pub response_body: String,
    /// Decided once at the transport boundary; never recomputed downstream.
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_seq: Option<u64>,
}

impl ActionOutcome {
    /// Synthetic outcome for a call that never produced an HTTP response.
    pub fn failure(button_id: ButtonId, message: impl Into<String>, request_seq: Option<u64>) -> Self {
        Self {
            button_id,
            status: 0,
            status_text: "Error".to_string(),
            response_body: message.into(),
            success: false,
            request_seq,
        }
    }
}
