use std::env;

use fest_common::{parse_boolean_flag, Secret};
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const DEFAULT_FRS_HOST: &str = "127.0.0.1";
const DEFAULT_FRS_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/fest.db";
const DEFAULT_RAZORPAY_API_URL: &str = "https://api.razorpay.com/v1";
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If true, a refund gives the registration's slot back to the sport.
    pub release_slot_on_refund: bool,
    /// PENDING registrations that have not changed for this long are cancelled and their slots released. `None`
    /// disables the sweep.
    pub pending_registration_timeout: Option<std::time::Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FRS_HOST.to_string(),
            port: DEFAULT_FRS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            auth: AuthConfig::default(),
            gateway: GatewayConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            release_slot_on_refund: false,
            pending_registration_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FRS_HOST").ok().unwrap_or_else(|| DEFAULT_FRS_HOST.into());
        let port = env::var("FRS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for FRS_PORT. {e} Using the default, {DEFAULT_FRS_PORT}, instead."
                    );
                    DEFAULT_FRS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_FRS_PORT);
        let database_url = env::var("FRS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!(
                "🪛️ FRS_DATABASE_URL is not set. Please set it to the URL for the registration database. Using \
                 {DEFAULT_DATABASE_URL} for now."
            );
            DEFAULT_DATABASE_URL.to_string()
        });
        let auth = AuthConfig::from_env_or_default();
        let gateway = GatewayConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("FRS_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("FRS_USE_FORWARDED").ok(), false);
        let release_slot_on_refund = parse_boolean_flag(env::var("FRS_RELEASE_SLOT_ON_REFUND").ok(), false);
        if release_slot_on_refund {
            info!("🪛️ Refunded registrations will give their slot back to the sport.");
        } else {
            warn!(
                "🪛️ Refunded registrations keep their slot. Set FRS_RELEASE_SLOT_ON_REFUND=true if refunded places \
                 should be offered to other participants."
            );
        }
        let pending_registration_timeout = configure_pending_timeout();
        Self {
            host,
            port,
            database_url,
            auth,
            gateway,
            use_x_forwarded_for,
            use_forwarded,
            release_slot_on_refund,
            pending_registration_timeout,
        }
    }
}

fn configure_pending_timeout() -> Option<std::time::Duration> {
    let Ok(hours) = env::var("FRS_PENDING_REGISTRATION_TIMEOUT") else {
        info!(
            "🪛️ FRS_PENDING_REGISTRATION_TIMEOUT is not set. Unpaid registrations will hold their slots until an \
             administrator cancels them."
        );
        return None;
    };
    match hours.parse::<u64>() {
        Ok(0) => {
            info!("🪛️ FRS_PENDING_REGISTRATION_TIMEOUT is 0. The stale registration sweep is disabled.");
            None
        },
        Ok(h) => {
            info!("🪛️ Unpaid registrations will be released after {h} hrs without activity.");
            Some(std::time::Duration::from_secs(h * 3600))
        },
        Err(e) => {
            warn!("🪛️ Invalid configuration value for FRS_PENDING_REGISTRATION_TIMEOUT. {e}. The sweep is disabled.");
            None
        },
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret used to sign and verify bearer tokens.
    pub jwt_secret: Secret<String>,
    /// The lifetime of the tokens issued by [`crate::auth::TokenIssuer`].
    pub token_lifetime: chrono::Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate on \
             production like this since every token will be invalidated when the server restarts. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(64).map(char::from).collect::<String>();
        Self::new(secret)
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        let token_lifetime = chrono::Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS);
        Self { jwt_secret: Secret::new(secret.into()), token_lifetime }
    }

    pub fn from_env_or_default() -> Self {
        match env::var("FRS_JWT_SECRET") {
            Ok(s) if !s.trim().is_empty() => Self::new(s),
            _ => Self::default(),
        }
    }
}

//-------------------------------------------------  GatewayConfig  ----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    pub api_url: String,
    pub key_id: String,
    /// Authenticates calls to the gateway's order API and signs checkout callbacks.
    pub key_secret: Secret<String>,
    /// Signs webhook deliveries.
    pub webhook_secret: Secret<String>,
    /// If false, webhook deliveries are accepted without checking their signature. **DANGER**
    pub hmac_checks: bool,
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = env::var("FRS_RAZORPAY_API_URL").ok().unwrap_or_else(|| DEFAULT_RAZORPAY_API_URL.into());
        let key_id = env::var("FRS_RAZORPAY_KEY_ID").ok().unwrap_or_else(|| {
            warn!(
                "🪛️ FRS_RAZORPAY_KEY_ID is not set. Gateway orders cannot be created, so every registration will be \
                 given a 'pay later' order."
            );
            String::default()
        });
        let key_secret = env::var("FRS_RAZORPAY_KEY_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ FRS_RAZORPAY_KEY_SECRET is not set. Please set it to the key secret for your gateway account. \
                 Checkout verification will fail until you do."
            );
            String::default()
        });
        let webhook_secret = env::var("FRS_RAZORPAY_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ FRS_RAZORPAY_WEBHOOK_SECRET is not set. Please set it to the webhook secret for your account.");
            String::default()
        });
        let hmac_checks = parse_boolean_flag(env::var("FRS_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!(
                "🚨️🚨️🚨️ Webhook signature checks are DISABLED. Anyone can confirm a registration by posting to the \
                 webhook endpoint. Never run production like this. 🚨️🚨️🚨️"
            );
        }
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret: Secret::new(key_secret),
            webhook_secret: Secret::new(webhook_secret),
            hmac_checks,
        }
    }

    /// True when the order API can be called.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.reveal().is_empty()
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
