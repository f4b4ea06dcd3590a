//! Request builder: turns one button's configuration into a fully specified
//! HTTP request. Pure and infallible; malformed input is dropped with a
//! recorded warning instead of failing the build.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::config::BasicAuthEncoding;
use crate::settings::{AuthType, ButtonConfig, HttpMethod};

const CONTENT_TYPE: &str = "Content-Type";
const AUTHORIZATION: &str = "Authorization";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Everything needed to issue the call except the target URL.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltRequest {
    pub descriptor: RequestDescriptor,
    /// Non-fatal problems found while building (bad custom headers, …).
    pub warnings: Vec<String>,
}

/// Build the request for `button`. `now` stamps the synthesized default body.
pub fn build_request(
    button: &ButtonConfig,
    basic_auth: BasicAuthEncoding,
    now: DateTime<Utc>,
) -> BuiltRequest {
    let mut headers = BTreeMap::new();
    let mut warnings = Vec::new();

    if !button.custom_headers.is_empty() {
        match parse_custom_headers(&button.custom_headers) {
            Ok(entries) => {
                for (name, value) in entries {
                    match value {
                        Some(v) => set_header(&mut headers, &mut warnings, &name, v),
                        None => warnings.push(format!(
                            "Ignoring custom header {name}: value must be a string, number or boolean"
                        )),
                    }
                }
            }
            Err(e) => {
                warnings.push(format!("Invalid custom headers JSON, using defaults: {e}"));
            }
        }
    }

    if !headers.keys().any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE)) {
        headers.insert(CONTENT_TYPE.to_string(), DEFAULT_CONTENT_TYPE.to_string());
    }

    if let Some(value) = authorization_value(button, basic_auth) {
        set_header(&mut headers, &mut warnings, AUTHORIZATION, value);
    }

    let body = if !button.method.allows_body() {
        None
    } else if !button.custom_payload.trim().is_empty() {
        Some(button.custom_payload.clone())
    } else {
        Some(default_body(button, now))
    };

    BuiltRequest {
        descriptor: RequestDescriptor {
            method: button.method,
            headers,
            body,
        },
        warnings,
    }
}

/// Parse `customHeaders` as a flat JSON object. Entries whose value is not a
/// scalar come back as `None` so the caller can report them.
fn parse_custom_headers(raw: &str) -> Result<Vec<(String, Option<String>)>, String> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let Value::Object(map) = parsed else {
        return Err("expected a JSON object".to_string());
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            (k, value)
        })
        .collect())
}

/// Insert a header, replacing any existing key that differs only in case.
/// Names or values the transport would refuse are dropped with a warning.
fn set_header(
    headers: &mut BTreeMap<String, String>,
    warnings: &mut Vec<String>,
    name: &str,
    value: String,
) {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        warnings.push(format!("Dropping header with invalid name: {name:?}"));
        return;
    }
    if HeaderValue::from_str(&value).is_err() {
        // never echo the value, it may be a credential
        warnings.push(format!("Dropping header {name}: invalid value"));
        return;
    }
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

fn authorization_value(button: &ButtonConfig, encoding: BasicAuthEncoding) -> Option<String> {
    match button.auth_type {
        AuthType::None => None,
        AuthType::Bearer => {
            (!button.auth_token.is_empty()).then(|| format!("Bearer {}", button.auth_token))
        }
        AuthType::Basic => basic_credential(button, encoding)
            .map(|cred| format!("Basic {}", general_purpose::STANDARD.encode(cred))),
    }
}

fn basic_credential(button: &ButtonConfig, encoding: BasicAuthEncoding) -> Option<String> {
    let token = (!button.auth_token.is_empty()).then(|| button.auth_token.clone());
    match encoding {
        BasicAuthEncoding::Token => token,
        BasicAuthEncoding::Credentials if button.auth_username.is_empty() => token,
        BasicAuthEncoding::Credentials => {
            let password = if button.auth_password.is_empty() {
                &button.auth_token
            } else {
                &button.auth_password
            };
            Some(format!("{}:{}", button.auth_username, password))
        }
    }
}

fn default_body(button: &ButtonConfig, now: DateTime<Utc>) -> String {
    json!({
        "message": format!("{} triggered", button.display_label()),
        "buttonId": button.id,
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
    .to_string()
}
