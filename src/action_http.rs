//! Outbound HTTP dispatch for button actions.
//!
//! Issues exactly one request per call under a hard deadline, captures the
//! response body as text up to a byte cap, and normalizes every failure into
//! a [`TransportFailure`]. Only http/https targets are allowed, optionally
//! narrowed by the configured `allowedUrls` patterns.

use std::fmt;
use std::time::Duration;

use crate::error_classification::{classify_reqwest_error, describe_reqwest_error, FailureKind};
use crate::request::RequestDescriptor;
use crate::settings::HttpMethod;

/// Per-call limits derived from the plugin config.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DispatchLimits {
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub allowed_urls: Vec<String>,
}

/// A response that arrived before the deadline, whatever its status.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: String,
    /// 2xx, decided here and nowhere else.
    pub success: bool,
    pub truncated: bool,
}

/// A call that produced no response.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        Self::new(classify_reqwest_error(err), describe_reqwest_error(err))
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate that a URL may be called.
/// - Must parse and be http:// or https://
/// - If `allowed_urls` is non-empty, must match one pattern, and localhost
///   targets need a pattern that names localhost explicitly
pub(crate) fn validate_url(url: &str, allowed_urls: &[String]) -> Result<(), TransportFailure> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TransportFailure::new(FailureKind::InvalidUrl, format!("Invalid URL \"{url}\": {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(TransportFailure::new(
                FailureKind::InvalidUrl,
                format!("Scheme \"{scheme}\" is not allowed; use http or https"),
            ));
        }
    }

    if allowed_urls.is_empty() {
        return Ok(());
    }

    if let Some(host) = parsed.host_str() {
        let is_localhost = matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]" | "0.0.0.0");
        let localhost_allowed = allowed_urls.iter().any(|pattern| {
            ["localhost", "127.0.0.1", "::1", "0.0.0.0"]
                .iter()
                .any(|h| pattern.contains(h))
        });
        if is_localhost && !localhost_allowed {
            return Err(TransportFailure::new(
                FailureKind::BlockedUrl,
                "Localhost URLs require an explicit allowedUrls entry",
            ));
        }
    }

    if allowed_urls.iter().any(|pattern| url_matches_pattern(url, pattern)) {
        return Ok(());
    }

    Err(TransportFailure::new(
        FailureKind::BlockedUrl,
        format!("URL \"{url}\" does not match any allowed URL pattern"),
    ))
}

/// Prefix match with an optional trailing `*`; exact match otherwise.
fn url_matches_pattern(url: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        url.starts_with(prefix)
    } else {
        url == pattern
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Perform one call. The deadline covers connect, headers and body; when it
/// fires the in-flight future is dropped, which aborts the connection.
pub(crate) async fn dispatch(
    client: &reqwest::Client,
    url: &str,
    request: &RequestDescriptor,
    limits: &DispatchLimits,
) -> Result<HttpReply, TransportFailure> {
    validate_url(url, &limits.allowed_urls)?;

    let mut builder = client.request(request.method.into(), url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let call = async {
        let response = builder.send().await?;
        read_reply(response, limits.max_response_bytes).await
    };

    match tokio::time::timeout(limits.timeout, call).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(e)) => Err(TransportFailure::from_reqwest(&e)),
        Err(_) => Err(TransportFailure::new(
            FailureKind::Timeout,
            format!("Request timed out after {}ms", limits.timeout.as_millis()),
        )),
    }
}

/// The reason phrase the server sent, else the standard one for the code.
/// hyper only records the phrase when it differs from the standard one.
fn status_text(response: &reqwest::Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Read the body chunk by chunk, stopping at `cap` bytes.
async fn read_reply(mut response: reqwest::Response, cap: usize) -> Result<HttpReply, reqwest::Error> {
    let status = response.status();
    let status_text = status_text(&response);

    let mut bytes: Vec<u8> = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = response.chunk().await? {
        let room = cap.saturating_sub(bytes.len());
        if chunk.len() > room {
            bytes.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }

    if truncated {
        // don't let the cut land inside a multi-byte character
        let partial_char_at = std::str::from_utf8(&bytes)
            .err()
            .filter(|e| e.error_len().is_none())
            .map(|e| e.valid_up_to());
        if let Some(valid) = partial_char_at {
            bytes.truncate(valid);
        }
    }

    let mut body = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        body.push_str(&format!("\n[truncated at {cap} bytes]"));
    }

    Ok(HttpReply {
        status: status.as_u16(),
        status_text,
        body,
        success: status.is_success(),
        truncated,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn limits() -> DispatchLimits {
        DispatchLimits {
            timeout: Duration::from_millis(2000),
            max_response_bytes: 64 * 1024,
            allowed_urls: Vec::new(),
        }
    }

    fn post(body: &str) -> RequestDescriptor {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        RequestDescriptor {
            method: HttpMethod::Post,
            headers,
            body: Some(body.to_string()),
        }
    }

    // -- URL validation --

    #[test]
    fn validate_allows_http_and_https() {
        assert!(validate_url("https://api.example.com/hook", &[]).is_ok());
        assert!(validate_url("http://api.example.com/hook", &[]).is_ok());
    }

    #[test]
    fn validate_blocks_other_schemes() {
        for url in ["file:///etc/passwd", "ftp://example.com/x", "data:text/plain,hi"] {
            let err = validate_url(url, &[]).unwrap_err();
            assert_eq!(err.kind, FailureKind::InvalidUrl);
            assert!(err.message.contains("not allowed"));
        }
    }

    #[test]
    fn validate_rejects_unparseable_url() {
        let err = validate_url("not a url", &[]).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidUrl);
        assert!(err.message.contains("Invalid URL"));
    }

    #[test]
    fn validate_allows_localhost_when_unrestricted() {
        assert!(validate_url("http://localhost:8080/api", &[]).is_ok());
    }

    #[test]
    fn validate_enforces_allow_list() {
        let allowed = vec![
            "https://hooks.example.com/*".to_string(),
            "https://api.example.com/v1".to_string(),
        ];
        assert!(validate_url("https://hooks.example.com/lights/on", &allowed).is_ok());
        assert!(validate_url("https://api.example.com/v1", &allowed).is_ok());
        let err = validate_url("https://api.example.com/v2", &allowed).unwrap_err();
        assert_eq!(err.kind, FailureKind::BlockedUrl);
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn validate_blocks_localhost_without_declaration() {
        let allowed = vec!["https://hooks.example.com/*".to_string()];
        let err = validate_url("http://127.0.0.1:8123/api", &allowed).unwrap_err();
        assert_eq!(err.kind, FailureKind::BlockedUrl);
        assert!(err.message.contains("Localhost"));
        let allowed = vec!["http://127.0.0.1:8123/*".to_string()];
        assert!(validate_url("http://127.0.0.1:8123/api", &allowed).is_ok());
    }

    #[test]
    fn pattern_matching() {
        assert!(url_matches_pattern("https://a.example/x/y", "https://a.example/*"));
        assert!(!url_matches_pattern("https://b.example/x", "https://a.example/*"));
        assert!(url_matches_pattern("https://a.example/x", "https://a.example/x"));
        assert!(!url_matches_pattern("https://a.example/xy", "https://a.example/x"));
    }

    // -- Dispatch --

    #[tokio::test]
    async fn success_reply_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_body(r#"{"a":1}"#)
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let url = format!("{}/hook", server.url());
        let reply = dispatch(&reqwest::Client::new(), &url, &post(r#"{"a":1}"#), &limits())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.status_text, "OK");
        assert_eq!(reply.body, "ok");
        assert!(reply.success);
        assert!(!reply.truncated);
    }

    #[tokio::test]
    async fn non_2xx_is_a_normal_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/thing")
            .with_status(404)
            .with_body("missing")
            .create_async()
            .await;

        let request = RequestDescriptor {
            method: HttpMethod::Delete,
            headers: BTreeMap::new(),
            body: None,
        };
        let url = format!("{}/thing", server.url());
        let reply = dispatch(&reqwest::Client::new(), &url, &request, &limits())
            .await
            .unwrap();
        assert_eq!(reply.status, 404);
        assert_eq!(reply.status_text, "Not Found");
        assert_eq!(reply.body, "missing");
        assert!(!reply.success);
    }

    /// One-shot server that answers the first request with `raw` verbatim.
    async fn raw_http_server(raw: &'static str) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(raw.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        addr
    }

    fn get() -> RequestDescriptor {
        RequestDescriptor {
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn custom_reason_phrase_is_kept() {
        let addr = raw_http_server(
            "HTTP/1.1 200 Lights Switched\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        )
        .await;
        let reply = dispatch(&reqwest::Client::new(), &format!("http://{addr}/"), &get(), &limits())
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.status_text, "Lights Switched");
        assert_eq!(reply.body, "ok");
    }

    #[tokio::test]
    async fn nonstandard_status_keeps_server_reason() {
        let addr = raw_http_server(
            "HTTP/1.1 599 Network Connect Timeout\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let reply = dispatch(&reqwest::Client::new(), &format!("http://{addr}/"), &get(), &limits())
            .await
            .unwrap();
        assert_eq!(reply.status, 599);
        assert_eq!(reply.status_text, "Network Connect Timeout");
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn not_modified_is_not_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/moved")
            .with_status(304)
            .create_async()
            .await;
        let url = format!("{}/moved", server.url());
        let reply = dispatch(&reqwest::Client::new(), &url, &post("{}"), &limits())
            .await
            .unwrap();
        assert_eq!(reply.status, 304);
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn body_is_capped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .with_status(200)
            .with_body("x".repeat(5000))
            .create_async()
            .await;

        let request = RequestDescriptor {
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        };
        let capped = DispatchLimits { max_response_bytes: 100, ..limits() };
        let url = format!("{}/big", server.url());
        let reply = dispatch(&reqwest::Client::new(), &url, &request, &capped)
            .await
            .unwrap();
        assert!(reply.truncated);
        assert!(reply.body.starts_with(&"x".repeat(100)));
        assert!(reply.body.ends_with("[truncated at 100 bytes]"));
        assert!(reply.success);
    }

    #[tokio::test]
    async fn truncation_respects_char_boundaries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/utf8")
            .with_status(200)
            .with_body("ééééé")
            .create_async()
            .await;

        let request = RequestDescriptor {
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        };
        let capped = DispatchLimits { max_response_bytes: 3, ..limits() };
        let url = format!("{}/utf8", server.url());
        let reply = dispatch(&reqwest::Client::new(), &url, &request, &capped)
            .await
            .unwrap();
        assert!(reply.body.starts_with("é\n"));
        assert!(!reply.body.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_failure() {
        let err = dispatch(&reqwest::Client::new(), "http://127.0.0.1:1/hook", &post("{}"), &limits())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Connect);
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn blocked_url_never_reaches_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/hook").expect(0).create_async().await;
        let restricted = DispatchLimits {
            allowed_urls: vec!["https://only.example.com/*".to_string()],
            ..limits()
        };
        let url = format!("{}/hook", server.url());
        let err = dispatch(&reqwest::Client::new(), &url, &post("{}"), &restricted)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::BlockedUrl);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn slow_server_hits_the_deadline() {
        use axum::{routing::post as post_route, Router};

        let app = Router::new().route(
            "/slow",
            post_route(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let short = DispatchLimits { timeout: Duration::from_millis(300), ..limits() };
        let started = std::time::Instant::now();
        let err = dispatch(&reqwest::Client::new(), &format!("http://{addr}/slow"), &post("{}"), &short)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(err.message, "Request timed out after 300ms");
        assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    }
}
