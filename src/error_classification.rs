//! Classification of transport failures.
//!
//! Every failed call is tagged with one [`FailureKind`] for log fields, and
//! [`describe_reqwest_error`] flattens the error source chain into the
//! human-readable text carried in the outcome.

use std::error::Error as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Timeout,
    Connect,
    Dns,
    InvalidUrl,
    BlockedUrl,
    InvalidMethod,
    Body,
    Request,
    Unknown,
}

impl FailureKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Dns => "dns",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::BlockedUrl => "blocked_url",
            FailureKind::InvalidMethod => "invalid_method",
            FailureKind::Body => "body",
            FailureKind::Request => "request",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Classify a `reqwest` error by its flags, refining connect errors into DNS
/// failures by inspecting the source chain.
pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return FailureKind::Timeout;
    }
    if err.is_connect() {
        return if looks_like_dns_failure(&describe_reqwest_error(err)) {
            FailureKind::Dns
        } else {
            FailureKind::Connect
        };
    }
    if err.is_builder() {
        return FailureKind::InvalidUrl;
    }
    if err.is_body() || err.is_decode() {
        return FailureKind::Body;
    }
    if err.is_request() || err.is_redirect() {
        return FailureKind::Request;
    }
    FailureKind::Unknown
}

/// `reqwest`'s Display stops at the outermost layer ("error sending request
/// for url …"); append each source so the cause reaches the user.
pub(crate) fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Resolver failures across platforms (glibc, macOS, Windows, hickory).
pub(crate) fn looks_like_dns_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
        || lower.contains("no such host")
        || lower.contains("temporary failure in name resolution")
}
