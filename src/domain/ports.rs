use super::gateway::{MerchantValidation, PaymentReceipt, PaymentSubmission};
use super::request::PaymentRequest;
use super::session::{CompletionStatus, MerchantSessionToken, SessionEvents};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reports whether wallet payments can be made in this environment.
pub trait CapabilityProbe: Send + Sync {
    fn can_make_payments(&self) -> Result<bool>;
}

/// A live handle into the platform's native payment sheet.
pub trait PaymentSession: Send + Sync {
    fn start(&self) -> Result<()>;
    fn complete_merchant_validation(&self, token: &MerchantSessionToken) -> Result<()>;
    fn complete_payment(&self, status: CompletionStatus) -> Result<()>;
    fn abort(&self) -> Result<()>;
}

/// Creates platform sessions.
///
/// `create_session` receives the event handlers up front; the adapter raises
/// validation, authorization and cancellation through them.
pub trait PaymentPlatform: CapabilityProbe {
    fn create_session(
        &self,
        version: u32,
        request: PaymentRequest,
        events: SessionEvents,
    ) -> Result<Arc<dyn PaymentSession>>;
}

/// Backend that proves merchant identity and settles payments.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn validate_merchant_session(&self, validation_url: &str) -> Result<MerchantValidation>;
    async fn submit_payment(&self, submission: PaymentSubmission) -> Result<PaymentReceipt>;
}

/// The invoking UI. Exactly one of the two callbacks fires per attempt.
pub trait ResultReporter: Send + Sync {
    fn on_success(&self, receipt: &PaymentReceipt);
    fn on_error(&self, message: &str);
}

pub type PlatformRef = Arc<dyn PaymentPlatform>;
pub type GatewayRef = Arc<dyn GatewayClient>;
pub type ReporterRef = Arc<dyn ResultReporter>;
