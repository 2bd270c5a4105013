use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Protocol version requested when a platform session is created.
pub const PROTOCOL_VERSION: u32 = 3;

/// Where a single attempt currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Constructing,
    AwaitingMerchantValidation,
    AwaitingAuthorization,
    /// The credential has been handed to the gateway and settlement is pending.
    Authorizing,
    Terminal,
}

impl SessionState {
    /// True once the platform holds an authorized credential for this attempt.
    ///
    /// From that point the session can only be completed, never aborted.
    pub fn is_authorized(&self) -> bool {
        matches!(self, SessionState::Authorizing)
    }
}

/// Status passed back to the platform when the payment sheet is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// Opaque merchant session blob returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantSessionToken(pub Value);

impl MerchantSessionToken {
    /// A token is usable when it carries an object or a non-empty string.
    pub fn is_usable(&self) -> bool {
        match &self.0 {
            Value::Null | Value::Bool(_) | Value::Number(_) => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
        }
    }
}

/// Opaque credential produced by the platform once the user authorizes.
///
/// Forwarded verbatim; the orchestrator only ever serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentCredential(pub Value);

impl PaymentCredential {
    pub fn serialize_token(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

/// Events the platform raises against a started session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ValidateMerchant { validation_url: Option<String> },
    PaymentAuthorized { credential: PaymentCredential },
    Cancel,
}

/// The handlers registered on a session at creation time.
///
/// Platform adapters keep this handle and raise events through it; the
/// orchestrator consumes them in order from the paired receiver.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn validate_merchant(&self, validation_url: Option<String>) {
        self.emit(SessionEvent::ValidateMerchant { validation_url });
    }

    pub fn payment_authorized(&self, credential: PaymentCredential) {
        self.emit(SessionEvent::PaymentAuthorized { credential });
    }

    pub fn cancel(&self) {
        self.emit(SessionEvent::Cancel);
    }

    fn emit(&self, event: SessionEvent) {
        // The attempt may already be terminal; late events are dropped.
        let _ = self.sender.send(event);
    }
}
