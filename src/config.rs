use crate::error::{CheckoutError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Merchant-side settings applied to every payment request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub country_code: String,
    pub merchant_capabilities: Vec<String>,
    pub supported_networks: Vec<String>,
    /// Upper bound on one attempt, from click to terminal outcome.
    /// `None` leaves the lifetime entirely to the platform.
    pub attempt_deadline_secs: Option<u64>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            country_code: "JP".to_string(),
            merchant_capabilities: vec!["supports3DS".to_string()],
            supported_networks: ["visa", "masterCard", "amex", "discover"]
                .into_iter()
                .map(String::from)
                .collect(),
            attempt_deadline_secs: Some(300),
        }
    }
}

impl CheckoutConfig {
    /// Loads a JSON config file. Missing keys fall back to defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.country_code.len() != 2 {
            return Err(CheckoutError::ValidationError(format!(
                "Invalid country code: {:?}",
                self.country_code
            )));
        }
        if self.supported_networks.is_empty() {
            return Err(CheckoutError::ValidationError(
                "At least one supported network is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn attempt_deadline(&self) -> Option<Duration> {
        self.attempt_deadline_secs.map(Duration::from_secs)
    }
}

/// Where the backend lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Permits `http://` base URLs. Only meant for local test servers.
    #[serde(default)]
    pub allow_plaintext: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            allow_plaintext: false,
        }
    }
}
