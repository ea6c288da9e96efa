//! Shared application state handed to every handler.

use std::sync::Arc;

use myproposal_core::Config;

use crate::auth::{GoogleOAuthClient, JwtManager};
use crate::billing::{PriceCatalog, StripeClient, WebhookProcessor};
use crate::credits::CreditLedger;
use crate::generation::ProposalGenerator;
use crate::messaging::Dispatcher;
use crate::storage::AppDatabase;

/// Services and settings behind the router.
///
/// Integrations that are not configured stay `None`; their routes answer
/// 503 instead of failing at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: AppDatabase,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtManager>,
    pub ledger: CreditLedger,
    pub generator: Arc<ProposalGenerator>,
    pub dispatcher: Arc<Dispatcher>,
    pub prices: PriceCatalog,
    pub stripe: Option<Arc<StripeClient>>,
    pub webhooks: Option<Arc<WebhookProcessor>>,
    pub oauth: Option<Arc<GoogleOAuthClient>>,
    /// Public base URL of the web app, without a trailing slash.
    pub app_url: String,
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(db: AppDatabase, config: Config, jwt: JwtManager, app_url: &str) -> Self {
        let ledger = CreditLedger::new(db.clone(), config.credits.clone());
        let app_url = app_url.trim_end_matches('/').to_string();
        let default_provider = config
            .generation
            .default_provider
            .parse()
            .unwrap_or(crate::generation::Provider::OpenAi);

        Self {
            db,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            ledger,
            generator: Arc::new(ProposalGenerator::new(default_provider)),
            dispatcher: Arc::new(Dispatcher::new(&app_url)),
            prices: PriceCatalog::default(),
            stripe: None,
            webhooks: None,
            oauth: None,
            app_url,
            cron_secret: None,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: ProposalGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    #[must_use]
    pub fn with_prices(mut self, prices: PriceCatalog) -> Self {
        self.prices = prices;
        self
    }

    #[must_use]
    pub fn with_stripe(mut self, client: StripeClient) -> Self {
        self.stripe = Some(Arc::new(client));
        self
    }

    /// Enable the Stripe webhook endpoint. Uses the current price catalog,
    /// so call after [`Self::with_prices`].
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhooks = Some(Arc::new(WebhookProcessor::new(
            self.db.clone(),
            self.ledger.clone(),
            self.prices.clone(),
            secret,
        )));
        self
    }

    #[must_use]
    pub fn with_oauth(mut self, client: GoogleOAuthClient) -> Self {
        self.oauth = Some(Arc::new(client));
        self
    }

    #[must_use]
    pub fn with_cron_secret(mut self, secret: &str) -> Self {
        self.cron_secret = Some(secret.to_string());
        self
    }
}
