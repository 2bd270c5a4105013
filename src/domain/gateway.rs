use super::money::{Amount, CurrencyCode};
use super::request::BillingCycle;
use super::session::MerchantSessionToken;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Backend answer to a merchant validation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_session: Option<MerchantSessionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MerchantValidation {
    pub fn granted(token: MerchantSessionToken) -> Self {
        Self {
            merchant_session: Some(token),
            error: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            merchant_session: None,
            error: Some(reason.into()),
        }
    }

    /// Returns the token only when it can unblock the validation event.
    pub fn usable_token(&self) -> Option<&MerchantSessionToken> {
        self.merchant_session.as_ref().filter(|t| t.is_usable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    OneTime,
    Recurring,
}

impl SubmissionKind {
    /// Status the backend reports when settlement went through.
    pub fn success_status(&self) -> &'static str {
        match self {
            SubmissionKind::OneTime => "completed",
            SubmissionKind::Recurring => "active",
        }
    }
}

/// Payload forwarded to the backend once the user authorized the payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSubmission {
    pub token: String,
    pub amount: Amount,
    pub currency: CurrencyCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<BillingCycle>,
}

impl PaymentSubmission {
    pub fn kind(&self) -> SubmissionKind {
        if self.billing_cycle.is_some() {
            SubmissionKind::Recurring
        } else {
            SubmissionKind::OneTime
        }
    }
}

/// Result payload returned by the backend for a submission.
///
/// Only `status` and `error` are interpreted. Result fields keep whatever
/// JSON shape the backend used, and anything unknown lands in `metadata`,
/// so the payload reaches the reporter untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentReceipt {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Value>,
    #[serde(
        default,
        deserialize_with = "text_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Keeps `error` only when it is a string; any other shape reads as absent.
fn text_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

impl PaymentReceipt {
    pub fn is_settled(&self, kind: SubmissionKind) -> bool {
        self.status == kind.success_status()
    }
}
