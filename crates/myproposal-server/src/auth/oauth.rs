//! Google OAuth 2.0 authorization-code client.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub const PROVIDER_GOOGLE: &str = "google";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Google account email is not verified")]
    UnverifiedEmail,

    #[error("Invalid OAuth URL: {0}")]
    Url(String),
}

/// Identity returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with Google.
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    config: GoogleOAuthConfig,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig, timeout: Duration) -> Result<Self, OAuthError> {
        let http = crate::http::build_client(timeout)?;

        Ok(Self {
            http,
            config,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }

    /// Point every Google endpoint at another host.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.auth_url = format!("{base}/o/oauth2/v2/auth");
        self.token_url = format!("{base}/token");
        self.userinfo_url = format!("{base}/v1/userinfo");
        self
    }

    /// URL the browser is sent to, carrying `state` for CSRF protection.
    pub fn authorization_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = reqwest::Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| OAuthError::Url(e.to_string()))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for the caller's verified profile.
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let token: TokenResponse = Self::check_status(resp).await?.json().await?;

        let resp = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let profile: GoogleProfile = Self::check_status(resp).await?.json().await?;

        if !profile.email_verified {
            return Err(OAuthError::UnverifiedEmail);
        }
        debug!(sub = %profile.sub, "Google profile fetched");
        Ok(profile)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, OAuthError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let (status, body) = crate::http::error_body(resp).await;
        Err(OAuthError::Api { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            GoogleOAuthConfig {
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                redirect_uri: "https://myproposal.love/api/auth/oauth/google/callback".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(base)
    }

    #[test]
    fn authorization_url_carries_state() {
        let url = client("https://accounts.example").authorization_url("st-1").unwrap();
        assert!(url.starts_with("https://accounts.example/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=st-1"));
        assert!(url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn exchange_code_returns_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "ya29", "token_type": "Bearer", "expires_in": 3600
                })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .and(header("authorization", "Bearer ya29"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "g-123", "email": "alice@example.com",
                "email_verified": true, "name": "Alice"
            })))
            .mount(&server)
            .await;

        let profile = client(&server.uri()).exchange_code("abc").await.unwrap();
        assert_eq!(profile.sub, "g-123");
        assert_eq!(profile.email, "alice@example.com");
        assert_eq!(profile.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn unverified_email_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "t"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "g-1", "email": "x@example.com", "email_verified": false
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).exchange_code("abc").await.unwrap_err();
        assert!(matches!(err, OAuthError::UnverifiedEmail));
    }

    #[tokio::test]
    async fn token_endpoint_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).exchange_code("bad").await.unwrap_err();
        match err {
            OAuthError::Api { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
