//! myproposal server
//!
//! HTTP API behind myproposal.love.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use myproposal_core::config::load_config;
use myproposal_core::db::unix_timestamp;
use myproposal_core::tracing_init::{LogFormat, init_tracing};
use tracing::{info, warn};

use myproposal_server::auth::{GoogleOAuthClient, GoogleOAuthConfig, JwtManager};
use myproposal_server::billing::{PriceCatalog, StripeClient};
use myproposal_server::generation::{GeminiClient, OpenAiCompatClient, ProposalGenerator};
use myproposal_server::messaging::{Dispatcher, ResendClient, TwilioClient};
use myproposal_server::server::{AppState, build_router, cron_svc};
use myproposal_server::storage::AppDatabase;

#[derive(Parser, Debug)]
#[command(name = "myproposal-server")]
#[command(version, about = "myproposal.love API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "MYPROPOSAL_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Policy file (JSON) layered over the global settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JWT secret key.
    #[arg(long, env = "JWT_SECRET", default_value = "dev-secret-change-me")]
    jwt_secret: String,

    /// Access token TTL in seconds.
    #[arg(long, default_value_t = 3600)]
    access_ttl: i64,

    /// Refresh token TTL in seconds.
    #[arg(long, default_value_t = 2_592_000)]
    refresh_ttl: i64,

    /// Public URL of the web app (proposal links, CORS, Stripe redirects).
    #[arg(long, env = "APP_URL", default_value = "http://localhost:3000")]
    app_url: String,

    /// Bearer secret expected on the cron endpoint.
    #[arg(long, env = "CRON_SECRET")]
    cron_secret: Option<String>,

    /// Run the credit reset and proposal expiry in-process every N seconds.
    #[arg(long)]
    reset_interval_secs: Option<u64>,

    /// Timeout for calls to third-party APIs, in seconds.
    #[arg(long, default_value_t = 15)]
    request_timeout: u64,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    deepseek_api_key: Option<String>,

    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    resend_api_key: Option<String>,

    /// Sender address for proposal emails.
    #[arg(long, env = "EMAIL_FROM", default_value = "myproposal <hello@myproposal.love>")]
    email_from: String,

    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    twilio_auth_token: Option<String>,

    #[arg(long, env = "TWILIO_PHONE_NUMBER")]
    twilio_phone_number: Option<String>,

    #[arg(long, env = "TWILIO_WHATSAPP_NUMBER")]
    twilio_whatsapp_number: Option<String>,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    stripe_webhook_secret: Option<String>,

    #[arg(long, env = "STRIPE_PREMIUM_PRICE_ID")]
    stripe_premium_price_id: Option<String>,

    #[arg(long, env = "STRIPE_YEARLY_PRICE_ID")]
    stripe_yearly_price_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    google_client_secret: Option<String>,

    /// OTLP collector endpoint for metrics (needs the `metrics` feature).
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(
        "myproposal_server=info,tower_http=info",
        LogFormat::from_json_flag(args.log_json),
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting myproposal-server"
    );

    #[cfg(feature = "metrics")]
    let metrics = match &args.otlp_endpoint {
        Some(endpoint) => Some(myproposal_core::metrics::init_metrics(endpoint)?),
        None => None,
    };
    #[cfg(not(feature = "metrics"))]
    if args.otlp_endpoint.is_some() {
        warn!("OTEL_EXPORTER_OTLP_ENDPOINT set but metrics support is not compiled in");
    }

    let config = load_config(args.config.as_deref())?;

    let db_path = match &args.db_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(path = %db_path.display(), "Opening database");
    let db = AppDatabase::open(&db_path).await?;

    let jwt = JwtManager::new(args.jwt_secret.as_bytes(), args.access_ttl, args.refresh_ttl);
    if args.jwt_secret == "dev-secret-change-me" {
        warn!("JWT_SECRET is not set, using the development secret");
    }

    let timeout = Duration::from_secs(args.request_timeout);
    let generator = build_generator(&args, &config)?;
    let dispatcher = build_dispatcher(&args, timeout)?;
    let prices = PriceCatalog {
        premium_price_id: args.stripe_premium_price_id.clone(),
        yearly_price_id: args.stripe_yearly_price_id.clone(),
    };

    let mut state = AppState::new(db, config, jwt, &args.app_url)
        .with_generator(generator)
        .with_dispatcher(dispatcher)
        .with_prices(prices);

    if let Some(key) = &args.stripe_secret_key {
        state = state.with_stripe(StripeClient::new(key, timeout)?);
    } else {
        warn!("STRIPE_SECRET_KEY not set, checkout disabled");
    }
    if let Some(secret) = &args.stripe_webhook_secret {
        state = state.with_webhook_secret(secret);
    } else {
        warn!("STRIPE_WEBHOOK_SECRET not set, webhook endpoint disabled");
    }
    if let (Some(client_id), Some(client_secret)) =
        (&args.google_client_id, &args.google_client_secret)
    {
        let redirect_uri = format!(
            "{}/api/auth/oauth/google/callback",
            args.app_url.trim_end_matches('/')
        );
        let oauth = GoogleOAuthClient::new(
            GoogleOAuthConfig {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri,
            },
            timeout,
        )?;
        state = state.with_oauth(oauth);
    }
    if let Some(secret) = &args.cron_secret {
        state = state.with_cron_secret(secret);
    } else {
        warn!("CRON_SECRET not set, cron endpoint disabled");
    }

    if let Some(secs) = args.reset_interval_secs {
        spawn_maintenance(state.clone(), Duration::from_secs(secs.max(60)));
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "metrics")]
    if let Some(guard) = metrics {
        guard.shutdown()?;
    }

    info!("Server stopped");
    Ok(())
}

fn build_generator(
    args: &Args,
    config: &myproposal_core::Config,
) -> anyhow::Result<ProposalGenerator> {
    let default_provider = config.generation.default_provider.parse()?;
    let mut generator = ProposalGenerator::new(default_provider);

    if let Some(key) = &args.openai_api_key {
        generator = generator.with_model(std::sync::Arc::new(OpenAiCompatClient::openai(
            key,
            &config.generation,
        )?));
    }
    if let Some(key) = &args.gemini_api_key {
        generator = generator.with_model(std::sync::Arc::new(GeminiClient::new(
            key,
            &config.generation,
        )?));
    }
    if let Some(key) = &args.deepseek_api_key {
        generator = generator.with_model(std::sync::Arc::new(OpenAiCompatClient::deepseek(
            key,
            &config.generation,
        )?));
    }

    if !generator.is_available(default_provider) {
        warn!(provider = %default_provider, "Default AI provider has no API key");
    }
    Ok(generator)
}

fn build_dispatcher(args: &Args, timeout: Duration) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(&args.app_url);

    if let Some(key) = &args.resend_api_key {
        dispatcher = dispatcher.with_sender(std::sync::Arc::new(ResendClient::new(
            key,
            &args.email_from,
            timeout,
        )?));
    } else {
        warn!("RESEND_API_KEY not set, email delivery disabled");
    }

    if let (Some(sid), Some(token)) = (&args.twilio_account_sid, &args.twilio_auth_token) {
        if let Some(from) = &args.twilio_phone_number {
            dispatcher = dispatcher
                .with_sender(std::sync::Arc::new(TwilioClient::sms(sid, token, from, timeout)?));
        }
        if let Some(from) = &args.twilio_whatsapp_number {
            dispatcher = dispatcher.with_sender(std::sync::Arc::new(TwilioClient::whatsapp(
                sid, token, from, timeout,
            )?));
        }
    } else {
        warn!("Twilio credentials not set, SMS and WhatsApp delivery disabled");
    }

    Ok(dispatcher)
}

/// Run the same maintenance as the cron endpoint on a fixed interval.
fn spawn_maintenance(state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            if let Err(e) = cron_svc::run_maintenance(&state, unix_timestamp()).await {
                warn!(error = %e, "Background maintenance failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Received shutdown signal");
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".myproposal").join("myproposal.db"))
}
