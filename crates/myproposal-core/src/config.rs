//! Configuration resolution for myproposal.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/myproposal/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`MYPROPOSAL_*`)
//!
//! Secrets (API keys, signing secrets) are not part of this file; the server
//! binary takes them from its command line / environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tier::SubscriptionTier;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Complete myproposal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub credits: CreditPolicy,
    #[serde(default)]
    pub proposals: ProposalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Credit allotments, reset cadence and per-action costs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CreditPolicy {
    pub free_credits: i64,
    pub premium_credits: i64,
    pub yearly_credits: i64,
    /// Batch reset interval for FREE users (days since last reset).
    pub free_reset_days: i64,
    pub premium_reset_days: i64,
    pub yearly_reset_days: i64,
    pub generation_cost: i64,
    pub send_cost: i64,
    /// When set, consumption is an unconditional decrement and the counter
    /// may go negative. Otherwise consumption never crosses zero.
    pub allow_overdraft: bool,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            free_credits: 1,
            premium_credits: 7,
            yearly_credits: 10,
            free_reset_days: 7,
            premium_reset_days: 30,
            yearly_reset_days: 30,
            generation_cost: 1,
            send_cost: 1,
            allow_overdraft: false,
        }
    }
}

impl CreditPolicy {
    /// Credits a user of `tier` is refilled to on reset.
    pub const fn allotment(&self, tier: SubscriptionTier) -> i64 {
        match tier {
            SubscriptionTier::Free => self.free_credits,
            SubscriptionTier::Premium => self.premium_credits,
            SubscriptionTier::Yearly => self.yearly_credits,
        }
    }

    /// Seconds between scheduled batch resets for `tier`.
    pub const fn reset_interval_secs(&self, tier: SubscriptionTier) -> i64 {
        let days = match tier {
            SubscriptionTier::Free => self.free_reset_days,
            SubscriptionTier::Premium => self.premium_reset_days,
            SubscriptionTier::Yearly => self.yearly_reset_days,
        };
        days * SECS_PER_DAY
    }
}

/// Proposal lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProposalConfig {
    /// Days a proposal stays answerable after creation.
    pub ttl_days: i64,
    /// Upper bound on the stored message text, in characters.
    pub max_message_chars: usize,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            max_message_chars: 5_000,
        }
    }
}

impl ProposalConfig {
    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_days * SECS_PER_DAY
    }
}

/// Generative-AI provider settings (keys live in the environment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// `openai`, `gemini` or `deepseek`.
    pub default_provider: String,
    pub openai_model: String,
    pub gemini_model: String,
    pub deepseek_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            deepseek_model: "deepseek-chat".to_string(),
            temperature: 0.8,
            max_tokens: 600,
            request_timeout_secs: 30,
        }
    }
}

/// Load configuration with hierarchical resolution from the process
/// environment.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    load_config_with(explicit, global_config_path().as_deref(), |key| {
        std::env::var(key).ok()
    })
}

/// Load configuration from the given files and environment lookup.
///
/// `explicit` must exist when given; `global` is skipped when missing.
pub fn load_config_with<F>(explicit: Option<&Path>, global: Option<&Path>, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();

    if let Some(global_path) = global {
        if global_path.exists() {
            let overlay = load_config_file(global_path)?;
            merge_config(&mut config, overlay);
        }
    }

    if let Some(path) = explicit {
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, env);
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".myproposal").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/myproposal/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("myproposal").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Sections present in a file replace the defaults wholesale; fields missing
/// inside a section fall back to their defaults via `#[serde(default)]`.
fn merge_config(base: &mut Config, overlay: Config) {
    base.credits = overlay.credits;
    base.proposals = overlay.proposals;
    base.generation = overlay.generation;
}

fn apply_env_overrides<F>(config: &mut Config, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let parse_i64 = |key: &str| env(key).and_then(|v| v.parse::<i64>().ok());

    if let Some(n) = parse_i64("MYPROPOSAL_FREE_CREDITS") {
        config.credits.free_credits = n;
    }
    if let Some(n) = parse_i64("MYPROPOSAL_PREMIUM_CREDITS") {
        config.credits.premium_credits = n;
    }
    if let Some(n) = parse_i64("MYPROPOSAL_YEARLY_CREDITS") {
        config.credits.yearly_credits = n;
    }
    if let Some(val) = env("MYPROPOSAL_ALLOW_OVERDRAFT") {
        config.credits.allow_overdraft = matches!(val.as_str(), "1" | "true" | "yes");
    }
    if let Some(n) = parse_i64("MYPROPOSAL_PROPOSAL_TTL_DAYS") {
        config.proposals.ttl_days = n;
    }
    if let Some(val) = env("MYPROPOSAL_DEFAULT_PROVIDER") {
        config.generation.default_provider = val.to_ascii_lowercase();
    }
}

fn validate(config: &Config) -> Result<()> {
    let c = &config.credits;
    if c.free_credits < 0 || c.premium_credits < 0 || c.yearly_credits < 0 {
        return Err(Error::Config("credit allotments must not be negative".into()));
    }
    if c.generation_cost <= 0 || c.send_cost <= 0 {
        return Err(Error::Config("credit costs must be positive".into()));
    }
    if c.free_reset_days <= 0 || c.premium_reset_days <= 0 || c.yearly_reset_days <= 0 {
        return Err(Error::Config("reset intervals must be positive".into()));
    }
    if config.proposals.ttl_days <= 0 {
        return Err(Error::Config("proposal ttl_days must be positive".into()));
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        return Err(Error::Config("generation temperature must be within 0..=2".into()));
    }
    Ok(())
}
