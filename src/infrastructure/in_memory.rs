//! In-process stand-ins for the platform, the backend and the UI.
//!
//! The demo binary runs against these, and so do the tests.

use crate::domain::gateway::{
    MerchantValidation, PaymentReceipt, PaymentSubmission, SubmissionKind,
};
use crate::domain::ports::{
    CapabilityProbe, GatewayClient, PaymentPlatform, PaymentSession, ResultReporter,
};
use crate::domain::request::PaymentRequest;
use crate::domain::session::{
    CompletionStatus, MerchantSessionToken, PaymentCredential, SessionEvents,
};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

pub const SIMULATED_VALIDATION_URL: &str =
    "https://apple-pay-gateway.apple.com/paymentservices/startSession";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a simulated session behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Validation, then authorization as soon as the merchant is validated.
    Approve,
    /// Validation, then the user closes the sheet.
    CancelAfterValidation,
    /// The validation event arrives without a URL.
    MissingValidationUrl,
    /// `start()` fails.
    FailToStart,
    /// `complete_merchant_validation()` fails.
    RejectMerchantSession,
    /// Validation, then nothing: the user never authorizes.
    Stall,
    /// The platform releases the session without raising any event.
    Vanish,
    /// Nothing is raised automatically; the test raises events itself.
    Manual,
}

/// A session that records every call the orchestrator makes on it.
pub struct SimulatedSession {
    version: u32,
    request: PaymentRequest,
    script: Script,
    serial: u64,
    events: Mutex<Option<SessionEvents>>,
    started: AtomicBool,
    aborted: AtomicBool,
    merchant_token: Mutex<Option<MerchantSessionToken>>,
    completions: Mutex<Vec<CompletionStatus>>,
}

impl SimulatedSession {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn request(&self) -> &PaymentRequest {
        &self.request
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn merchant_token(&self) -> Option<MerchantSessionToken> {
        lock(&self.merchant_token).clone()
    }

    pub fn completions(&self) -> Vec<CompletionStatus> {
        lock(&self.completions).clone()
    }

    /// The registered handlers, for tests that raise events by hand.
    pub fn events(&self) -> Option<SessionEvents> {
        lock(&self.events).clone()
    }

    fn credential(&self) -> PaymentCredential {
        PaymentCredential(json!({
            "paymentData": {
                "version": "EC_v1",
                "data": "c2ltdWxhdGVk",
                "header": { "transactionId": format!("{:064x}", self.serial) }
            },
            "paymentMethod": { "displayName": "Visa 0492", "network": "Visa", "type": "debit" },
            "transactionIdentifier": format!("SIM-{}", self.serial)
        }))
    }
}

impl PaymentSession for SimulatedSession {
    fn start(&self) -> Result<()> {
        if self.script == Script::FailToStart {
            return Err(CheckoutError::PlatformError(
                "Session refused to start".to_string(),
            ));
        }
        self.started.store(true, Ordering::SeqCst);

        let mut events = lock(&self.events);
        match self.script {
            Script::Manual => {}
            Script::Vanish => {
                events.take();
            }
            Script::MissingValidationUrl => {
                if let Some(events) = events.as_ref() {
                    events.validate_merchant(None);
                }
            }
            _ => {
                if let Some(events) = events.as_ref() {
                    events.validate_merchant(Some(SIMULATED_VALIDATION_URL.to_string()));
                }
            }
        }
        Ok(())
    }

    fn complete_merchant_validation(&self, token: &MerchantSessionToken) -> Result<()> {
        if self.script == Script::RejectMerchantSession {
            return Err(CheckoutError::PlatformError(
                "Merchant session signature is invalid".to_string(),
            ));
        }
        *lock(&self.merchant_token) = Some(token.clone());

        let events = lock(&self.events);
        if let Some(events) = events.as_ref() {
            match self.script {
                Script::Approve => events.payment_authorized(self.credential()),
                Script::CancelAfterValidation => events.cancel(),
                _ => {}
            }
        }
        Ok(())
    }

    fn complete_payment(&self, status: CompletionStatus) -> Result<()> {
        lock(&self.completions).push(status);
        Ok(())
    }

    fn abort(&self) -> Result<()> {
        self.aborted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A wallet platform whose sessions follow a fixed [`Script`].
pub struct SimulatedPlatform {
    available: AtomicBool,
    script: Script,
    sessions: Mutex<Vec<Arc<SimulatedSession>>>,
}

impl SimulatedPlatform {
    pub fn new(script: Script) -> Self {
        Self {
            available: AtomicBool::new(true),
            script,
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        let platform = Self::new(Script::Approve);
        platform.set_available(false);
        platform
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn last_session(&self) -> Option<Arc<SimulatedSession>> {
        lock(&self.sessions).last().cloned()
    }
}

impl CapabilityProbe for SimulatedPlatform {
    fn can_make_payments(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

impl PaymentPlatform for SimulatedPlatform {
    fn create_session(
        &self,
        version: u32,
        request: PaymentRequest,
        events: SessionEvents,
    ) -> Result<Arc<dyn PaymentSession>> {
        let mut sessions = lock(&self.sessions);
        let session = Arc::new(SimulatedSession {
            version,
            request,
            script: self.script,
            serial: sessions.len() as u64 + 1,
            events: Mutex::new(Some(events)),
            started: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            merchant_token: Mutex::new(None),
            completions: Mutex::new(Vec::new()),
        });
        sessions.push(session.clone());
        Ok(session)
    }
}

/// A canned backend reply.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    /// Behave like a healthy backend.
    Auto,
    Fixed(T),
    /// The call itself fails.
    Reject(String),
    /// The call never settles.
    Stall,
}

/// A scripted backend that records every call it receives.
pub struct InMemoryGateway {
    validation: Reply<MerchantValidation>,
    submission: Reply<PaymentReceipt>,
    validation_urls: RwLock<Vec<String>>,
    submissions: RwLock<Vec<PaymentSubmission>>,
    next_id: AtomicU64,
}

impl InMemoryGateway {
    pub fn new(validation: Reply<MerchantValidation>, submission: Reply<PaymentReceipt>) -> Self {
        Self {
            validation,
            submission,
            validation_urls: RwLock::new(Vec::new()),
            submissions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn approving() -> Self {
        Self::new(Reply::Auto, Reply::Auto)
    }

    /// Validates the merchant, then declines every payment with `reason`.
    pub fn declining(reason: impl Into<String>) -> Self {
        Self::new(
            Reply::Auto,
            Reply::Fixed(PaymentReceipt {
                status: "failed".to_string(),
                error: Some(reason.into()),
                ..Default::default()
            }),
        )
    }

    pub async fn validation_urls(&self) -> Vec<String> {
        self.validation_urls.read().await.clone()
    }

    pub async fn submissions(&self) -> Vec<PaymentSubmission> {
        self.submissions.read().await.clone()
    }

    fn mock_merchant_session(&self) -> MerchantValidation {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        MerchantValidation::granted(MerchantSessionToken(json!({
            "merchantSessionIdentifier": format!("mock-session-{}", now_ms / 1000),
            "displayName": "Wallet Checkout Demo",
            "domainName": "localhost",
            "epochTimestamp": now_ms,
            "expiresAt": now_ms + 3_600_000,
            "merchantIdentifier": "merchant.com.example.checkout",
            "nonce": format!("nonce-{}", now_ms / 1000),
            "signature": format!("signature-{}", now_ms / 1000),
        })))
    }

    fn settle(&self, submission: &PaymentSubmission) -> PaymentReceipt {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut metadata = Map::new();
        match submission.kind() {
            SubmissionKind::OneTime => {
                let id = format!("txn-{n}");
                metadata.insert("gmo_order_id".to_string(), Value::String(format!("ORDER_{id}")));
                PaymentReceipt {
                    status: SubmissionKind::OneTime.success_status().to_string(),
                    transaction_id: Some(Value::String(id)),
                    amount: Some(Value::String(submission.amount.to_string())),
                    currency: Some(Value::String(submission.currency.to_string())),
                    metadata,
                    ..Default::default()
                }
            }
            SubmissionKind::Recurring => {
                if let Some(cycle) = submission.billing_cycle {
                    metadata.insert(
                        "billing_cycle".to_string(),
                        Value::String(cycle.to_string()),
                    );
                }
                PaymentReceipt {
                    status: SubmissionKind::Recurring.success_status().to_string(),
                    subscription_id: Some(Value::String(format!("sub-{n}"))),
                    amount: Some(Value::String(submission.amount.to_string())),
                    currency: Some(Value::String(submission.currency.to_string())),
                    metadata,
                    ..Default::default()
                }
            }
        }
    }
}

#[async_trait]
impl GatewayClient for InMemoryGateway {
    async fn validate_merchant_session(&self, validation_url: &str) -> Result<MerchantValidation> {
        self.validation_urls
            .write()
            .await
            .push(validation_url.to_string());
        match &self.validation {
            Reply::Auto => Ok(self.mock_merchant_session()),
            Reply::Fixed(validation) => Ok(validation.clone()),
            Reply::Reject(reason) => Err(CheckoutError::GatewayError(reason.clone())),
            Reply::Stall => std::future::pending().await,
        }
    }

    async fn submit_payment(&self, submission: PaymentSubmission) -> Result<PaymentReceipt> {
        self.submissions.write().await.push(submission.clone());
        match &self.submission {
            Reply::Auto => Ok(self.settle(&submission)),
            Reply::Fixed(receipt) => Ok(receipt.clone()),
            Reply::Reject(reason) => Err(CheckoutError::GatewayError(reason.clone())),
            Reply::Stall => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Success(PaymentReceipt),
    Error(String),
}

/// Collects reporter callbacks in the order they fired.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        lock(&self.reports).clone()
    }

    pub fn successes(&self) -> Vec<PaymentReceipt> {
        self.reports()
            .into_iter()
            .filter_map(|r| match r {
                Report::Success(receipt) => Some(receipt),
                Report::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.reports()
            .into_iter()
            .filter_map(|r| match r {
                Report::Error(message) => Some(message),
                Report::Success(_) => None,
            })
            .collect()
    }
}

impl ResultReporter for RecordingReporter {
    fn on_success(&self, receipt: &PaymentReceipt) {
        lock(&self.reports).push(Report::Success(receipt.clone()));
    }

    fn on_error(&self, message: &str) {
        lock(&self.reports).push(Report::Error(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckoutConfig;
    use crate::domain::request::{BillingCycle, PaymentOrder, ValidatedOrder};
    use crate::domain::session::SessionEvent;
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        let order = ValidatedOrder::try_from(&PaymentOrder::one_time(dec!(1000), "JPY")).unwrap();
        PaymentRequest::build(&order, &CheckoutConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_approve_script_raises_events_in_order() {
        let platform = SimulatedPlatform::new(Script::Approve);
        let (events, mut rx) = SessionEvents::channel();
        let session = platform.create_session(3, request(), events).unwrap();

        session.start().unwrap();
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::ValidateMerchant {
                validation_url: Some(SIMULATED_VALIDATION_URL.to_string())
            })
        );

        session
            .complete_merchant_validation(&MerchantSessionToken(json!("tok")))
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(SessionEvent::PaymentAuthorized { .. })
        ));
        assert_eq!(platform.session_count(), 1);
    }

    #[tokio::test]
    async fn test_vanish_script_closes_channel() {
        let platform = SimulatedPlatform::new(Script::Vanish);
        let (events, mut rx) = SessionEvents::channel();
        let session = platform.create_session(3, request(), events).unwrap();

        session.start().unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_gateway_auto_settles_by_kind() {
        let gateway = InMemoryGateway::approving();
        let one_time = PaymentSubmission {
            token: "{}".to_string(),
            amount: dec!(1000).try_into().unwrap(),
            currency: "JPY".parse().unwrap(),
            billing_cycle: None,
        };
        let recurring = PaymentSubmission {
            billing_cycle: Some(BillingCycle::Monthly),
            ..one_time.clone()
        };

        let receipt = gateway.submit_payment(one_time).await.unwrap();
        assert_eq!(receipt.status, "completed");
        assert_eq!(receipt.transaction_id, Some(json!("txn-1")));

        let receipt = gateway.submit_payment(recurring).await.unwrap();
        assert_eq!(receipt.status, "active");
        assert_eq!(receipt.subscription_id, Some(json!("sub-2")));
        assert_eq!(receipt.metadata["billing_cycle"], json!("monthly"));

        assert_eq!(gateway.submissions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_mock_merchant_session_is_usable() {
        let gateway = InMemoryGateway::approving();
        let validation = gateway
            .validate_merchant_session(SIMULATED_VALIDATION_URL)
            .await
            .unwrap();
        assert!(validation.usable_token().is_some());
        assert_eq!(gateway.validation_urls().await, vec![SIMULATED_VALIDATION_URL]);
    }
}
