//! Button slot table and the host settings surface.
//!
//! The panel owns a fixed number of button slots ([`SLOT_COUNT`]), each holding
//! exactly one [`ButtonConfig`]. The host stores settings as flat primitive
//! entries keyed by strings such as `button3Method`; [`SettingKey`] maps those
//! keys onto a slot index and a field, so nothing past the boundary deals in
//! generated key strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Number of button slots. Fixed at initialization, never resized.
pub const SLOT_COUNT: usize = 6;

pub const DEFAULT_BACKGROUND_COLOR: &str = "#1f2937";
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";
pub const DEFAULT_URL: &str = "https://httpbin.org/post";
const DEFAULT_CUSTOM_HEADERS: &str = r#"{"Content-Type": "application/json"}"#;

/// Blue, green, orange, red, purple, cyan.
const BUTTON_COLORS: [&str; SLOT_COUNT] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#06b6d4",
];

/// Slot identifier, 1-based.
pub type ButtonId = u32;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Methods offered by the settings surface. HEAD is accepted on triggers only.
    pub const SELECTABLE: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET and HEAD never carry a body.
    pub fn allows_body(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!("Invalid HTTP method: {s}")),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    Basic,
}

impl AuthType {
    pub const ALL: [AuthType; 3] = [AuthType::None, AuthType::Bearer, AuthType::Basic];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::Basic => "basic",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            AuthType::None => "None",
            AuthType::Bearer => "Bearer Token",
            AuthType::Basic => "Basic Auth",
        }
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(AuthType::None),
            "bearer" => Ok(AuthType::Bearer),
            "basic" => Ok(AuthType::Basic),
            _ => Err(format!("Invalid auth type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ButtonConfig
// ---------------------------------------------------------------------------

/// Configuration of one button slot.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonConfig {
    pub id: ButtonId,
    pub enabled: bool,
    pub label: String,
    pub url: String,
    pub method: HttpMethod,
    pub auth_type: AuthType,
    pub auth_token: String,
    pub auth_username: String,
    pub auth_password: String,
    pub custom_payload: String,
    pub custom_headers: String,
    pub background_color: String,
    pub text_color: String,
}

impl ButtonConfig {
    /// Factory defaults for slot `id`.
    pub fn defaults_for(id: ButtonId) -> Self {
        let color = BUTTON_COLORS
            .get((id as usize).wrapping_sub(1))
            .copied()
            .unwrap_or(BUTTON_COLORS[0]);
        Self {
            id,
            enabled: false,
            label: default_label(id),
            url: DEFAULT_URL.to_string(),
            method: HttpMethod::Post,
            auth_type: AuthType::None,
            auth_token: String::new(),
            auth_username: String::new(),
            auth_password: String::new(),
            custom_payload: format!(r#"{{"message": "Action {id} triggered"}}"#),
            custom_headers: DEFAULT_CUSTOM_HEADERS.to_string(),
            background_color: color.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }

    /// Label shown on the button; falls back to `Action <id>` when blank.
    pub fn display_label(&self) -> String {
        if self.label.trim().is_empty() {
            default_label(self.id)
        } else {
            self.label.clone()
        }
    }
}

pub(crate) fn default_label(id: ButtonId) -> String {
    format!("Action {id}")
}

/// Masks a secret for diagnostics output.
pub(crate) fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}

impl fmt::Debug for ButtonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonConfig")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("label", &self.label)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("auth_type", &self.auth_type)
            .field("auth_token", &redact(&self.auth_token))
            .field("auth_username", &self.auth_username)
            .field("auth_password", &redact(&self.auth_password))
            .field("custom_payload", &self.custom_payload)
            .field("custom_headers", &self.custom_headers)
            .field("background_color", &self.background_color)
            .field("text_color", &self.text_color)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Setting keys
// ---------------------------------------------------------------------------

/// Per-slot field addressable through the settings store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonField {
    Enabled,
    Label,
    Url,
    Method,
    Auth,
    Token,
    Username,
    Password,
    Payload,
    Headers,
    Color,
    TextColor,
}

impl ButtonField {
    pub const ALL: [ButtonField; 12] = [
        ButtonField::Enabled,
        ButtonField::Label,
        ButtonField::Url,
        ButtonField::Color,
        ButtonField::TextColor,
        ButtonField::Method,
        ButtonField::Auth,
        ButtonField::Token,
        ButtonField::Username,
        ButtonField::Password,
        ButtonField::Payload,
        ButtonField::Headers,
    ];

    /// Suffix used in host keys (`button<N><Suffix>`).
    fn suffix(self) -> &'static str {
        match self {
            ButtonField::Enabled => "Enabled",
            ButtonField::Label => "Label",
            ButtonField::Url => "Url",
            ButtonField::Method => "Method",
            ButtonField::Auth => "Auth",
            ButtonField::Token => "Token",
            ButtonField::Username => "Username",
            ButtonField::Password => "Password",
            ButtonField::Payload => "Payload",
            ButtonField::Headers => "Headers",
            ButtonField::Color => "Color",
            ButtonField::TextColor => "TextColor",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.suffix() == suffix)
    }
}

/// Structured address of one host setting entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    BackgroundColor,
    Button { slot: ButtonId, field: ButtonField },
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "backgroundColor" {
            return Ok(SettingKey::BackgroundColor);
        }
        let rest = s
            .strip_prefix("button")
            .ok_or_else(|| format!("Unknown setting key: {s}"))?;
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(format!("Missing slot number in setting key: {s}"));
        }
        let slot = rest[..digits]
            .parse::<ButtonId>()
            .ok()
            .filter(|slot| slot_index(*slot).is_some())
            .ok_or_else(|| format!("Slot {} out of range in setting key: {s}", &rest[..digits]))?;
        let field = ButtonField::from_suffix(&rest[digits..])
            .ok_or_else(|| format!("Unknown setting field in key: {s}"))?;
        Ok(SettingKey::Button { slot, field })
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKey::BackgroundColor => f.write_str("backgroundColor"),
            SettingKey::Button { slot, field } => write!(f, "button{slot}{}", field.suffix()),
        }
    }
}

// ---------------------------------------------------------------------------
// Host schema
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    Boolean,
    String,
    Color,
    Select,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingOption {
    pub value: String,
    pub label: String,
}

/// One entry of the settings schema handed to the host at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SettingKind,
    pub label: String,
    pub description: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SettingOption>,
}

// ---------------------------------------------------------------------------
// ButtonSettings
// ---------------------------------------------------------------------------

/// The complete settings snapshot: global colour plus one config per slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonSettings {
    pub background_color: String,
    buttons: [ButtonConfig; SLOT_COUNT],
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            buttons: std::array::from_fn(|i| ButtonConfig::defaults_for(i as ButtonId + 1)),
        }
    }
}

impl ButtonSettings {
    pub fn get(&self, id: ButtonId) -> Option<&ButtonConfig> {
        slot_index(id).map(|i| &self.buttons[i])
    }

    pub fn buttons(&self) -> &[ButtonConfig] {
        &self.buttons
    }

    pub fn enabled_buttons(&self) -> impl Iterator<Item = &ButtonConfig> {
        self.buttons.iter().filter(|b| b.enabled)
    }

    /// Apply one user change. Values are type-checked against the field.
    pub fn apply(&mut self, key: SettingKey, value: &Value) -> Result<(), String> {
        let (slot, field) = match key {
            SettingKey::BackgroundColor => {
                self.background_color = expect_string(key, value)?;
                return Ok(());
            }
            SettingKey::Button { slot, field } => (slot, field),
        };
        let idx = slot_index(slot).ok_or_else(|| format!("Slot {slot} out of range"))?;
        let button = &mut self.buttons[idx];
        match field {
            ButtonField::Enabled => {
                button.enabled = value
                    .as_bool()
                    .ok_or_else(|| format!("Setting {key} expects a boolean"))?;
            }
            ButtonField::Method => {
                let method: HttpMethod = expect_string(key, value)?.parse()?;
                if !HttpMethod::SELECTABLE.contains(&method) {
                    return Err(format!("Setting {key} does not accept {method}"));
                }
                button.method = method;
            }
            ButtonField::Auth => button.auth_type = expect_string(key, value)?.parse()?,
            ButtonField::Label => button.label = expect_string(key, value)?,
            ButtonField::Url => button.url = expect_string(key, value)?,
            ButtonField::Token => button.auth_token = expect_string(key, value)?,
            ButtonField::Username => button.auth_username = expect_string(key, value)?,
            ButtonField::Password => button.auth_password = expect_string(key, value)?,
            ButtonField::Payload => button.custom_payload = expect_string(key, value)?,
            ButtonField::Headers => button.custom_headers = expect_string(key, value)?,
            ButtonField::Color => button.background_color = expect_string(key, value)?,
            ButtonField::TextColor => button.text_color = expect_string(key, value)?,
        }
        Ok(())
    }

    /// Apply a batch of host entries. Unknown keys and ill-typed values are
    /// skipped; one warning is returned per skipped entry.
    pub fn apply_entries<'a, I>(&mut self, entries: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut warnings = Vec::new();
        for (raw_key, value) in entries {
            let result = raw_key
                .parse::<SettingKey>()
                .and_then(|key| self.apply(key, value));
            if let Err(e) = result {
                warnings.push(e);
            }
        }
        warnings
    }

    /// Current value of one entry, as stored by the host.
    pub fn value_of(&self, key: SettingKey) -> Value {
        let (slot, field) = match key {
            SettingKey::BackgroundColor => return Value::from(self.background_color.clone()),
            SettingKey::Button { slot, field } => (slot, field),
        };
        let Some(b) = self.get(slot) else {
            return Value::Null;
        };
        match field {
            ButtonField::Enabled => Value::from(b.enabled),
            ButtonField::Label => Value::from(b.label.clone()),
            ButtonField::Url => Value::from(b.url.clone()),
            ButtonField::Method => Value::from(b.method.as_str()),
            ButtonField::Auth => Value::from(b.auth_type.as_str()),
            ButtonField::Token => Value::from(b.auth_token.clone()),
            ButtonField::Username => Value::from(b.auth_username.clone()),
            ButtonField::Password => Value::from(b.auth_password.clone()),
            ButtonField::Payload => Value::from(b.custom_payload.clone()),
            ButtonField::Headers => Value::from(b.custom_headers.clone()),
            ButtonField::Color => Value::from(b.background_color.clone()),
            ButtonField::TextColor => Value::from(b.text_color.clone()),
        }
    }

    /// Restore one slot to its factory defaults. The slot itself is never removed.
    pub fn reset_slot(&mut self, id: ButtonId) -> Result<(), String> {
        let idx = slot_index(id).ok_or_else(|| format!("Slot {id} out of range"))?;
        self.buttons[idx] = ButtonConfig::defaults_for(id);
        Ok(())
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Settings schema for the host, populated with the current values.
    pub fn schema(&self) -> Vec<SettingDescriptor> {
        let mut out = Vec::with_capacity(1 + SLOT_COUNT * ButtonField::ALL.len());
        out.push(SettingDescriptor {
            id: SettingKey::BackgroundColor.to_string(),
            kind: SettingKind::Color,
            label: "Background Color".to_string(),
            description: "Background color for the ActionThing interface".to_string(),
            value: self.value_of(SettingKey::BackgroundColor),
            options: Vec::new(),
        });
        for slot in 1..=SLOT_COUNT as ButtonId {
            for field in ButtonField::ALL {
                out.push(self.describe(slot, field));
            }
        }
        out
    }

    fn describe(&self, slot: ButtonId, field: ButtonField) -> SettingDescriptor {
        let key = SettingKey::Button { slot, field };
        let (kind, label, description) = match field {
            ButtonField::Enabled => (
                SettingKind::Boolean,
                format!("Enable Button {slot}"),
                format!("Enable or disable action button {slot}"),
            ),
            ButtonField::Label => (
                SettingKind::String,
                format!("Button {slot} Label"),
                format!("Text displayed on button {slot}"),
            ),
            ButtonField::Url => (
                SettingKind::String,
                format!("Button {slot} URL"),
                format!("Target webhook/API endpoint for button {slot}"),
            ),
            ButtonField::Color => (
                SettingKind::Color,
                format!("Button {slot} Color"),
                format!("Background color for button {slot}"),
            ),
            ButtonField::TextColor => (
                SettingKind::Color,
                format!("Button {slot} Text Color"),
                format!("Label color for button {slot}"),
            ),
            ButtonField::Method => (
                SettingKind::Select,
                format!("Button {slot} HTTP Method"),
                format!("HTTP method for button {slot} request"),
            ),
            ButtonField::Auth => (
                SettingKind::Select,
                format!("Button {slot} Authentication"),
                format!("Authentication type for button {slot}"),
            ),
            ButtonField::Token => (
                SettingKind::String,
                format!("Button {slot} Auth Token/Password"),
                format!("Authentication token or password for button {slot}"),
            ),
            ButtonField::Username => (
                SettingKind::String,
                format!("Button {slot} Auth Username"),
                format!("Basic auth username for button {slot} (leave empty to send the token alone)"),
            ),
            ButtonField::Password => (
                SettingKind::String,
                format!("Button {slot} Auth Password"),
                format!("Basic auth password for button {slot} (falls back to the token)"),
            ),
            ButtonField::Payload => (
                SettingKind::String,
                format!("Button {slot} Custom Payload"),
                format!("Custom JSON payload for button {slot} (leave empty for default)"),
            ),
            ButtonField::Headers => (
                SettingKind::String,
                format!("Button {slot} Custom Headers"),
                format!("Custom JSON headers for button {slot} (leave empty for default)"),
            ),
        };
        let options = match field {
            ButtonField::Method => HttpMethod::SELECTABLE
                .iter()
                .map(|m| SettingOption {
                    value: m.as_str().to_string(),
                    label: m.as_str().to_string(),
                })
                .collect(),
            ButtonField::Auth => AuthType::ALL
                .iter()
                .map(|a| SettingOption {
                    value: a.as_str().to_string(),
                    label: a.display_name().to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        SettingDescriptor {
            id: key.to_string(),
            kind,
            label,
            description,
            value: self.value_of(key),
            options,
        }
    }
}

/// Zero-based index of a 1-based slot id.
pub(crate) fn slot_index(id: ButtonId) -> Option<usize> {
    let idx = (id as usize).checked_sub(1)?;
    (idx < SLOT_COUNT).then_some(idx)
}

fn expect_string(key: SettingKey, value: &Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("Setting {key} expects a string"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
