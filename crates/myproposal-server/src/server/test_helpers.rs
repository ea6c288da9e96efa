//! Shared setup for the HTTP handler test modules.
//!
//! Builds an [`AppState`] over an in-memory database with scripted AI and
//! delivery backends, and drives the router with `oneshot`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use myproposal_core::Config;
use myproposal_core::config::CreditPolicy;
use serde_json::Value;
use tower::ServiceExt;

use super::{AppState, build_router};
use crate::auth::JwtManager;
use crate::generation::{GenerationError, Prompt, Provider, ProposalGenerator, TextModel};
use crate::messaging::{ChannelSender, Dispatcher, MessagingError, OutboundMessage};
use crate::storage::{AppDatabase, Channel, NewUser, Role, User};

pub const JWT_SECRET: &[u8] = b"test-secret";
pub const CRON_SECRET: &str = "cron-secret";

/// Text model that returns a fixed reply, or fails when `reply` is `None`.
pub struct ScriptedModel {
    pub provider: Provider,
    pub reply: Option<&'static str>,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn ok(provider: Provider, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            provider,
            reply: Some(reply),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .map(String::from)
            .ok_or(GenerationError::Api {
                provider: self.provider,
                status: 500,
                body: "boom".into(),
            })
    }
}

/// Channel sender that records what it was asked to deliver.
pub struct RecordingSender {
    pub channel: Channel,
    pub fail: bool,
    pub sent: std::sync::Mutex<Vec<OutboundMessage>>,
}

impl RecordingSender {
    pub fn new(channel: Channel, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail,
            sent: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, MessagingError> {
        if self.fail {
            return Err(MessagingError::Api {
                provider: "test",
                status: 503,
                body: "unavailable".into(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("msg_{}", sent.len()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub model: Arc<ScriptedModel>,
    pub email: Arc<RecordingSender>,
}

pub async fn test_app() -> TestApp {
    test_app_with(CreditPolicy::default(), false).await
}

pub async fn test_app_with(policy: CreditPolicy, failing_backends: bool) -> TestApp {
    let db = AppDatabase::open_in_memory().await.unwrap();
    let config = Config {
        credits: policy,
        ..Config::default()
    };
    let jwt = JwtManager::new(JWT_SECRET, 3600, 86_400);

    let model = if failing_backends {
        ScriptedModel::failing(Provider::OpenAi)
    } else {
        ScriptedModel::ok(Provider::OpenAi, "Will you marry me?")
    };
    let email = RecordingSender::new(Channel::Email, failing_backends);

    let state = AppState::new(db, config, jwt, "https://myproposal.love")
        .with_generator(ProposalGenerator::new(Provider::OpenAi).with_model(model.clone()))
        .with_dispatcher(Dispatcher::new("https://myproposal.love").with_sender(email.clone()))
        .with_cron_secret(CRON_SECRET);

    TestApp {
        router: build_router(state.clone()),
        state,
        model,
        email,
    }
}

impl TestApp {
    /// Create a user directly in the database and return it with an access
    /// token.
    pub async fn user(&self, id: &str, role: Role, credits: i64) -> (User, String) {
        self.state
            .db
            .create_user(&NewUser {
                id,
                email: &format!("{id}@example.com"),
                name: Some("Alex"),
                initial_credits: credits,
                ..NewUser::default()
            })
            .await
            .unwrap();
        if role == Role::Admin {
            self.state.db.set_role(id, Role::Admin).await.unwrap();
        }
        let user = self.state.db.get_user(id).await.unwrap();
        let (token, _) = self.state.jwt.issue_access_token(&user).unwrap();
        (user, token)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }
}
