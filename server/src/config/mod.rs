use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::payment::stripe::DEFAULT_API_BASE;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_HOLD_TTL_MINUTES: u32 = 45;
// Stripe refuses a session expiry under 30 minutes or over 24 hours from creation.
const HOLD_TTL_MINUTES: RangeInclusive<u32> = 31..=1440;
const DEFAULT_MAX_TICKETS_PER_ORDER: u32 = 50;
const MAX_TICKETS_PER_ORDER: RangeInclusive<u32> = 1..=10_000;
const DEFAULT_HOLD_SWEEP_SECS: u64 = 60;
const DEFAULT_HOLD_GRACE_SECS: u32 = 300;
pub(crate) const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub enum PaymentConfig {
    Stripe { secret_key: String, api_base: String },
    Mock,
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentConfig::Stripe { api_base, .. } => f
                .debug_struct("Stripe")
                .field("secret_key", &"<redacted>")
                .field("api_base", api_base)
                .finish(),
            PaymentConfig::Mock => f.write_str("Mock"),
        }
    }
}

/// Process configuration, read once at startup and handed to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub website_url: String,
    pub currency: String,
    pub payment: PaymentConfig,
    pub cors_allowed_origins: Vec<String>,
    /// Enables HSTS.
    pub production: bool,
    /// How long a checkout hold and its payment session stay open.
    pub hold_ttl_minutes: u32,
    pub max_tickets_per_order: u32,
    pub hold_sweep_interval_secs: u64,
    /// Extra time past a hold's expiry before the sweeper releases it.
    pub hold_release_grace_secs: u32,
}

fn parse_var<T>(
    name: &'static str,
    value: Option<String>,
    default: T,
    range: Option<RangeInclusive<T>>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
    T::Err: fmt::Display,
{
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match range {
        Some(range) if !range.contains(&parsed) => Err(ConfigError::Invalid {
            name,
            reason: format!(
                "{parsed} is outside {}..={}",
                range.start(),
                range.end()
            ),
        }),
        _ => Ok(parsed),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let website_url = var("WEBSITE_URL")
            .ok_or(ConfigError::Missing("WEBSITE_URL"))?
            .trim_end_matches('/')
            .to_string();

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let max_connections = parse_var(
            "DATABASE_MAX_CONNECTIONS",
            var("DATABASE_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
            None,
        )?;

        let payment = match var("PAYMENT_PROCESSOR").as_deref() {
            None | Some("stripe") => PaymentConfig::Stripe {
                secret_key: var("STRIPE_SECRET_KEY")
                    .ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?,
                api_base: var("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            },
            Some("mock") => PaymentConfig::Mock,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PAYMENT_PROCESSOR",
                    reason: format!("expected `stripe` or `mock`, got `{other}`"),
                })
            }
        };

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        let production = var("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        Ok(Self {
            database_url: var("DATABASE_URL"),
            max_connections,
            bind_addr,
            website_url,
            currency: var("CURRENCY")
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
                .to_lowercase(),
            payment,
            cors_allowed_origins,
            production,
            hold_ttl_minutes: parse_var(
                "HOLD_TTL_MINUTES",
                var("HOLD_TTL_MINUTES"),
                DEFAULT_HOLD_TTL_MINUTES,
                Some(HOLD_TTL_MINUTES),
            )?,
            max_tickets_per_order: parse_var(
                "MAX_TICKETS_PER_ORDER",
                var("MAX_TICKETS_PER_ORDER"),
                DEFAULT_MAX_TICKETS_PER_ORDER,
                Some(MAX_TICKETS_PER_ORDER),
            )?,
            hold_sweep_interval_secs: parse_var(
                "HOLD_SWEEP_INTERVAL_SECS",
                var("HOLD_SWEEP_INTERVAL_SECS"),
                DEFAULT_HOLD_SWEEP_SECS,
                Some(1..=3600),
            )?,
            hold_release_grace_secs: parse_var(
                "HOLD_RELEASE_GRACE_SECS",
                var("HOLD_RELEASE_GRACE_SECS"),
                DEFAULT_HOLD_GRACE_SECS,
                Some(0..=86_400),
            )?,
        })
    }
}
