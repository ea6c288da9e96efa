//! Outbound HTTP client construction shared by every integration.

use std::time::Duration;

/// Build a `reqwest` client with the given request timeout.
///
/// reqwest is compiled with `rustls-no-provider`, so the `ring` provider is
/// installed first (a no-op when something already installed one).
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("myproposal/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Read a non-success response body for error reporting.
pub async fn error_body(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    (status, body)
}
