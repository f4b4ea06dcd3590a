use std::str::FromStr;

use chrono::Utc;
use tracing::Instrument;

use crate::action_http::{self, TransportFailure};
use crate::error_classification::FailureKind;
use crate::message::{ActionOutcome, TriggerPayload};
use crate::request::build_request;
use crate::settings::{default_label, AuthType, ButtonConfig, ButtonId, HttpMethod};
use crate::state::{PluginState, TriggerMetrics};

/// What became of one inbound trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    /// Never reached the network; only an `error` envelope was sent.
    Rejected(String),
    /// Exactly one `action-response` was sent carrying this outcome.
    Completed(ActionOutcome),
}

/// Run one trigger end to end. Every accepted trigger produces exactly one
/// outcome; failures never propagate to the caller.
pub async fn handle_trigger(state: &PluginState, payload: TriggerPayload) -> TriggerResult {
    let Some(button_id) = payload.button_id.filter(|id| *id != 0) else {
        let message = "Missing buttonId in trigger action data".to_string();
        tracing::warn!("{message}");
        TriggerMetrics::bump(&state.metrics.rejected);
        state.outbox.error(message.clone());
        return TriggerResult::Rejected(message);
    };

    let span = tracing::info_span!(
        "trigger",
        button_id,
        trace_id = %uuid::Uuid::new_v4(),
    );
    let outcome = run_accepted(state, button_id, payload).instrument(span).await;
    TriggerResult::Completed(outcome)
}

async fn run_accepted(state: &PluginState, button_id: ButtonId, payload: TriggerPayload) -> ActionOutcome {
    TriggerMetrics::bump(&state.metrics.accepted);
    let request_seq = payload.request_seq;
    let label = payload
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_label(button_id));

    state.outbox.log(format!("Triggering: {label}"));

    let (encoding, limits, default_url) = {
        let config = state.config.read();
        (config.basic_auth_encoding, config.dispatch_limits(), config.default_url.clone())
    };

    let result = match resolve_button(button_id, &label, payload, &default_url) {
        Ok(button) => {
            tracing::debug!(?button, "Resolved trigger");
            let built = build_request(&button, encoding, Utc::now());
            for warning in &built.warnings {
                tracing::warn!("{warning}");
            }
            action_http::dispatch(&state.http_client, &button.url, &built.descriptor, &limits).await
        }
        Err(failure) => Err(failure),
    };

    match result {
        Ok(reply) => {
            if reply.truncated {
                tracing::info!(cap = limits.max_response_bytes, "Response body truncated");
            }
            tracing::info!(status = reply.status, success = reply.success, "Action completed");
            TriggerMetrics::bump(&state.metrics.responded);
            let status = reply.status;
            let outcome = ActionOutcome {
                button_id,
                status: reply.status,
                status_text: reply.status_text,
                response_body: reply.body,
                success: reply.success,
                request_seq,
            };
            state.outbox.action_response(outcome.clone());
            state.outbox.log(format!("{label} completed - {status}"));
            outcome
        }
        Err(failure) => {
            tracing::warn!(kind = failure.kind.as_str(), error = %failure.message, "Action failed");
            TriggerMetrics::bump(&state.metrics.failed);
            state
                .outbox
                .error(format!("Failed to execute action: {}", failure.message));
            let outcome = ActionOutcome::failure(button_id, failure.message, request_seq);
            state.outbox.action_response(outcome.clone());
            outcome
        }
    }
}

/// Turn the loose trigger payload into a full button configuration, applying
/// defaults for absent fields.
fn resolve_button(
    button_id: ButtonId,
    label: &str,
    payload: TriggerPayload,
    default_url: &str,
) -> Result<ButtonConfig, TransportFailure> {
    let method = match payload.method.as_deref().map(str::trim) {
        None | Some("") => HttpMethod::Post,
        Some(raw) => HttpMethod::from_str(raw)
            .map_err(|e| TransportFailure::new(FailureKind::InvalidMethod, e))?,
    };

    let auth_type = match payload.auth_type.as_deref() {
        None => AuthType::None,
        Some(raw) => AuthType::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!("{e}, sending without authentication");
            AuthType::None
        }),
    };

    let url = payload
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default_url.to_string());

    Ok(ButtonConfig {
        enabled: true,
        label: label.to_string(),
        url,
        method,
        auth_type,
        auth_token: payload.auth_token.unwrap_or_default(),
        auth_username: payload.auth_username.unwrap_or_default(),
        auth_password: payload.auth_password.unwrap_or_default(),
        custom_payload: payload.custom_payload.unwrap_or_default(),
        custom_headers: payload.custom_headers.unwrap_or_default(),
        ..ButtonConfig::defaults_for(button_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::message::Envelope;
    use crate::state::test_state;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    fn responses(sent: &[Envelope]) -> Vec<&ActionOutcome> {
        sent.iter()
            .filter_map(|e| match e {
                Envelope::ActionResponse(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    fn payload(id: ButtonId, url: String) -> TriggerPayload {
        TriggerPayload {
            button_id: Some(id),
            url: Some(url),
            label: Some("Deploy".into()),
            ..TriggerPayload::default()
        }
    }

    #[tokio::test]
    async fn ok_response_emits_log_outcome_log() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body("done")
            .create_async()
            .await;
        let (state, mut rx) = test_state(PluginConfig::default());

        let result = handle_trigger(&state, payload(1, format!("{}/hook", server.url()))).await;
        mock.assert_async().await;

        let expected = ActionOutcome {
            button_id: 1,
            status: 200,
            status_text: "OK".into(),
            response_body: "done".into(),
            success: true,
            request_seq: None,
        };
        assert_eq!(result, TriggerResult::Completed(expected.clone()));
        assert_eq!(
            drain(&mut rx),
            vec![
                Envelope::Log("Triggering: Deploy".into()),
                Envelope::ActionResponse(expected),
                Envelope::Log("Deploy completed - 200".into()),
            ]
        );
        assert_eq!(state.metrics.snapshot().responded, 1);
    }

    #[tokio::test]
    async fn non_2xx_is_a_completed_unsuccessful_outcome() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;
        let (state, mut rx) = test_state(PluginConfig::default());

        handle_trigger(&state, payload(2, format!("{}/missing", server.url()))).await;

        let sent = drain(&mut rx);
        let outs = responses(&sent);
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].status, 404);
        assert!(!outs[0].success);
        assert!(!sent.iter().any(|e| matches!(e, Envelope::Error(_))));
        assert_eq!(sent.last(), Some(&Envelope::Log("Deploy completed - 404".into())));
    }

    #[tokio::test]
    async fn unreachable_host_emits_error_and_synthetic_outcome() {
        let (state, mut rx) = test_state(PluginConfig::default());

        let result = handle_trigger(&state, payload(3, "http://127.0.0.1:1/".into())).await;

        let TriggerResult::Completed(outcome) = result else {
            panic!("expected a completed trigger");
        };
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.status_text, "Error");
        assert!(!outcome.success);
        assert!(!outcome.response_body.is_empty());

        let sent = drain(&mut rx);
        assert_eq!(responses(&sent).len(), 1);
        assert!(sent.iter().any(|e| matches!(e, Envelope::Error(m) if m.starts_with("Failed to execute action: "))));
        assert_eq!(state.metrics.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn slow_server_times_out_with_one_outcome() {
        use axum::{routing::post, Router};

        let app = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let cfg = PluginConfig { request_timeout_ms: 200, ..PluginConfig::default() };
        let (state, mut rx) = test_state(cfg);
        let started = std::time::Instant::now();

        handle_trigger(&state, payload(4, format!("http://{addr}/slow"))).await;

        assert!(started.elapsed() < Duration::from_millis(1500));
        let sent = drain(&mut rx);
        let outs = responses(&sent);
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].status, 0);
        assert!(outs[0].response_body.contains("timed out after 200ms"));
    }

    #[tokio::test]
    async fn missing_button_id_is_rejected_without_outcome() {
        let (state, mut rx) = test_state(PluginConfig::default());

        for id in [None, Some(0)] {
            let p = TriggerPayload { button_id: id, ..TriggerPayload::default() };
            let result = handle_trigger(&state, p).await;
            assert!(matches!(result, TriggerResult::Rejected(_)));
        }

        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![
                Envelope::Error("Missing buttonId in trigger action data".into()),
                Envelope::Error("Missing buttonId in trigger action data".into()),
            ]
        );
        assert_eq!(state.metrics.snapshot().rejected, 2);
        assert_eq!(state.metrics.snapshot().accepted, 0);
    }

    #[tokio::test]
    async fn unknown_method_fails_after_acceptance() {
        let (state, mut rx) = test_state(PluginConfig::default());
        let p = TriggerPayload {
            method: Some("TELEPORT".into()),
            ..payload(5, "http://127.0.0.1:1/".into())
        };

        let result = handle_trigger(&state, p).await;

        let TriggerResult::Completed(outcome) = result else {
            panic!("expected a completed trigger");
        };
        assert_eq!(outcome.status, 0);
        assert!(outcome.response_body.contains("TELEPORT"));
        assert_eq!(responses(&drain(&mut rx)).len(), 1);
    }

    #[tokio::test]
    async fn malformed_headers_still_send_with_defaults() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .with_status(201)
            .create_async()
            .await;
        let (state, mut rx) = test_state(PluginConfig::default());
        let p = TriggerPayload {
            custom_headers: Some("{not json".into()),
            ..payload(6, format!("{}/hook", server.url()))
        };

        handle_trigger(&state, p).await;
        mock.assert_async().await;

        let sent = drain(&mut rx);
        let outs = responses(&sent);
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].status, 201);
        assert!(outs[0].success);
    }

    #[tokio::test]
    async fn bearer_token_and_request_seq_flow_through() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/hook")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .create_async()
            .await;
        let (state, mut rx) = test_state(PluginConfig::default());
        let p = TriggerPayload {
            method: Some("put".into()),
            auth_type: Some("bearer".into()),
            auth_token: Some("s3cret".into()),
            request_seq: Some(7),
            ..payload(1, format!("{}/hook", server.url()))
        };

        handle_trigger(&state, p).await;
        mock.assert_async().await;

        let sent = drain(&mut rx);
        assert_eq!(responses(&sent)[0].request_seq, Some(7));
    }

    #[test]
    fn resolve_applies_defaults() {
        let p = TriggerPayload { button_id: Some(2), ..TriggerPayload::default() };
        let button = resolve_button(2, "Action 2", p, "https://example.test/in").unwrap();
        assert_eq!(button.method, HttpMethod::Post);
        assert_eq!(button.auth_type, AuthType::None);
        assert_eq!(button.url, "https://example.test/in");
        assert!(button.custom_payload.is_empty());
        assert!(button.custom_headers.is_empty());
    }

    #[test]
    fn resolve_ignores_unknown_auth_type() {
        let p = TriggerPayload {
            auth_type: Some("kerberos".into()),
            auth_token: Some("t".into()),
            ..TriggerPayload::default()
        };
        let button = resolve_button(1, "x", p, "https://example.test").unwrap();
        assert_eq!(button.auth_type, AuthType::None);
    }
}
