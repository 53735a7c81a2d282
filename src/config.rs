//! Carrier credentials and client settings.
//!
//! Credential bundles can be deserialized from any serde source or loaded
//! from environment variables. Secrets are redacted from `Debug` output.

use std::fmt;
use std::time::Duration;
use serde::Deserialize;
use crate::error::ConfigError;

/// Selects the carrier endpoint set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Carrier test/certification servers. Labels are not billed.
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn is_sandbox(&self) -> bool {
        *self == Environment::Sandbox
    }
}

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "sandbox" | "test" | "debug" => Ok(Environment::Sandbox),
            "production" | "prod" | "live" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue { name: "SHIPKIT_ENV", value }),
        }
    }
}

/// Options shared by every carrier client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub environment: Environment,
    /// Replaces the carrier's base URL, e.g. to point at a stub server.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    /// Retries for idempotent calls after a transport failure. Labels are never retried.
    pub max_retries: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            endpoint: None,
            timeout_secs: 30,
            max_retries: 0,
        }
    }
}

impl ClientSettings {
    pub fn sandbox() -> Self {
        Self::default()
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            ..Default::default()
        }
    }

    /// Load from `SHIPKIT_ENV`, `SHIPKIT_TIMEOUT_SECS` and `SHIPKIT_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(env) = optional(&var, "SHIPKIT_ENV") {
            settings.environment = Environment::try_from(env)?;
        }
        if let Some(timeout) = optional(&var, "SHIPKIT_TIMEOUT_SECS") {
            settings.timeout_secs = parse_env("SHIPKIT_TIMEOUT_SECS", timeout)?;
        }
        if let Some(retries) = optional(&var, "SHIPKIT_MAX_RETRIES") {
            settings.max_retries = parse_env("SHIPKIT_MAX_RETRIES", retries)?;
        }
        Ok(settings)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL to use: the override when set, else the one for the environment.
    pub(crate) fn base_url(&self, sandbox: &str, production: &str) -> Result<String, ConfigError> {
        let base = match (&self.endpoint, self.environment) {
            (Some(endpoint), _) => endpoint.as_str(),
            (None, Environment::Sandbox) => sandbox,
            (None, Environment::Production) => production,
        };
        reqwest::Url::parse(base).map_err(|_| ConfigError::InvalidEndpoint(base.to_string()))?;
        Ok(base.trim_end_matches('/').to_string())
    }
}

#[derive(Clone, Deserialize)]
pub struct UpsCredentials {
    pub username: String,
    pub password: String,
    pub access_license: String,
    pub shipper_number: String,
}

impl UpsCredentials {
    /// `UPS_USERNAME`, `UPS_PASSWORD`, `UPS_ACCESS_LICENSE`, `UPS_SHIPPER_NUMBER`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            username: required(&var, "UPS_USERNAME")?,
            password: required(&var, "UPS_PASSWORD")?,
            access_license: required(&var, "UPS_ACCESS_LICENSE")?,
            shipper_number: required(&var, "UPS_SHIPPER_NUMBER")?,
        })
    }
}

impl fmt::Debug for UpsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpsCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("access_license", &"[REDACTED]")
            .field("shipper_number", &self.shipper_number)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UspsCredentials {
    pub user_id: String,
}

impl UspsCredentials {
    /// `USPS_USER_ID`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            user_id: required(&var, "USPS_USER_ID")?,
        })
    }
}

#[derive(Clone, Deserialize)]
pub struct FedexCredentials {
    pub key: String,
    pub password: String,
    pub account_number: String,
    pub meter_number: String,
}

impl FedexCredentials {
    /// `FEDEX_KEY`, `FEDEX_PASSWORD`, `FEDEX_ACCOUNT_NUMBER`, `FEDEX_METER_NUMBER`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            key: required(&var, "FEDEX_KEY")?,
            password: required(&var, "FEDEX_PASSWORD")?,
            account_number: required(&var, "FEDEX_ACCOUNT_NUMBER")?,
            meter_number: required(&var, "FEDEX_METER_NUMBER")?,
        })
    }
}

impl fmt::Debug for FedexCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FedexCredentials")
            .field("key", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("account_number", &self.account_number)
            .field("meter_number", &self.meter_number)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct EndiciaCredentials {
    pub partner_id: String,
    pub account_id: String,
    pub passphrase: String,
}

impl EndiciaCredentials {
    /// `ENDICIA_PARTNER_ID`, `ENDICIA_ACCOUNT_ID`, `ENDICIA_PASSPHRASE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            partner_id: required(&var, "ENDICIA_PARTNER_ID")?,
            account_id: required(&var, "ENDICIA_ACCOUNT_ID")?,
            passphrase: required(&var, "ENDICIA_PASSPHRASE")?,
        })
    }
}

impl fmt::Debug for EndiciaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndiciaCredentials")
            .field("partner_id", &self.partner_id)
            .field("account_id", &self.account_id)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn required(var: impl Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    optional(var, name).ok_or(ConfigError::MissingEnv(name))
}

/// Empty values count as unset.
fn optional(var: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    var(name).filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue { name, value })
}
