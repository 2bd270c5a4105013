//! Backend gateway reached over HTTPS.
//!
//! Talks to the payments backend:
//!
//! - `POST {base}/validate-merchant/` with `{"validation_url": ...}`
//! - `POST {base}/onetime/process/` with `{token, amount, currency}`
//! - `POST {base}/recurring/setup/` with `{token, amount, currency, billing_cycle}`
//!
//! The backend reports refusals in the JSON body (`status`, `error`) with a
//! 4xx/5xx code, so bodies are decoded regardless of the HTTP status.

use crate::config::GatewayConfig;
use crate::domain::gateway::{
    MerchantValidation, PaymentReceipt, PaymentSubmission, SubmissionKind,
};
use crate::domain::ports::GatewayClient;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const VALIDATE_MERCHANT_PATH: &str = "validate-merchant/";
const ONE_TIME_PATH: &str = "onetime/process/";
const RECURRING_PATH: &str = "recurring/setup/";

#[derive(Serialize)]
struct ValidateMerchantBody<'a> {
    validation_url: &'a str,
}

pub struct HttpGateway {
    base_url: Url,
    client: Client,
}

impl HttpGateway {
    /// Builds a client for the configured backend.
    ///
    /// The wallet platform refuses plaintext origins, so `http://` backends
    /// are rejected unless `allow_plaintext` is set.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            CheckoutError::ValidationError(format!(
                "Invalid gateway URL {:?}: {e}",
                config.base_url
            ))
        })?;
        match base_url.scheme() {
            "https" => {}
            "http" if config.allow_plaintext => {}
            scheme => {
                return Err(CheckoutError::ValidationError(format!(
                    "Gateway URL must use https, got {scheme}://"
                )));
            }
        }
        // Relative joins drop the last segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("wallet-checkout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CheckoutError::ValidationError(format!("Invalid endpoint {path}: {e}")))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "gateway request");
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%status, "gateway response");

        serde_json::from_str(&text).map_err(|_| {
            if status.is_success() {
                CheckoutError::GatewayError("Malformed response from payment backend".to_string())
            } else {
                CheckoutError::GatewayError(format!("Payment backend returned HTTP {status}"))
            }
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGateway {
    async fn validate_merchant_session(&self, validation_url: &str) -> Result<MerchantValidation> {
        self.post(VALIDATE_MERCHANT_PATH, &ValidateMerchantBody { validation_url })
            .await
    }

    async fn submit_payment(&self, submission: PaymentSubmission) -> Result<PaymentReceipt> {
        let path = match submission.kind() {
            SubmissionKind::OneTime => ONE_TIME_PATH,
            SubmissionKind::Recurring => RECURRING_PATH,
        };
        self.post(path, &submission).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_rejected_by_default() {
        let result = HttpGateway::new(&GatewayConfig::new("http://localhost:8000/api/payments"));
        assert!(matches!(result, Err(CheckoutError::ValidationError(_))));
    }

    #[test]
    fn test_plaintext_allowed_when_opted_in() {
        let mut config = GatewayConfig::new("http://localhost:8000/api/payments");
        config.allow_plaintext = true;
        assert!(HttpGateway::new(&config).is_ok());
    }

    #[test]
    fn test_endpoints_are_joined_under_base() {
        let gateway =
            HttpGateway::new(&GatewayConfig::new("https://pay.example.com/api/payments")).unwrap();
        assert_eq!(
            gateway.endpoint(ONE_TIME_PATH).unwrap().as_str(),
            "https://pay.example.com/api/payments/onetime/process/"
        );
        assert_eq!(
            gateway.endpoint(VALIDATE_MERCHANT_PATH).unwrap().as_str(),
            "https://pay.example.com/api/payments/validate-merchant/"
        );
    }

    #[test]
    fn test_garbage_url_rejected() {
        assert!(HttpGateway::new(&GatewayConfig::new("not a url")).is_err());
    }
}
