use super::money::{Amount, CurrencyCode};
use crate::config::CheckoutConfig;
use crate::error::CheckoutError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing cadence selected by the invoking UI for a recurring attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    Weekly,
    Daily,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Weekly => "weekly",
            BillingCycle::Daily => "daily",
        }
    }

    /// Maps the cycle onto the unit the payment sheet understands.
    ///
    /// Only monthly and yearly billing have a platform unit. Weekly and daily
    /// cycles are refused here instead of collapsing onto `year`.
    pub fn interval_unit(&self) -> Result<IntervalUnit, CheckoutError> {
        match self {
            BillingCycle::Monthly => Ok(IntervalUnit::Month),
            BillingCycle::Yearly => Ok(IntervalUnit::Year),
            other => Err(CheckoutError::ValidationError(format!(
                "Unsupported billing cycle for wallet payments: {other}"
            ))),
        }
    }
}

impl FromStr for BillingCycle {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            "weekly" => Ok(BillingCycle::Weekly),
            "daily" => Ok(BillingCycle::Daily),
            _ => Err(CheckoutError::ValidationError(format!(
                "Unknown billing cycle: {s:?}"
            ))),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Month,
    Year,
}

/// What the invoking UI hands to the orchestrator on each click.
///
/// The amount is kept raw so the entry guard can reject non-positive values
/// without ever constructing a request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrder {
    pub amount: Decimal,
    pub currency: String,
    pub label: String,
    pub recurring: bool,
    pub billing_cycle: String,
}

impl PaymentOrder {
    pub fn one_time(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            label: "Pay".to_string(),
            recurring: false,
            billing_cycle: BillingCycle::Monthly.as_str().to_string(),
        }
    }

    pub fn recurring(
        amount: Decimal,
        currency: impl Into<String>,
        billing_cycle: impl Into<String>,
    ) -> Self {
        Self {
            recurring: true,
            billing_cycle: billing_cycle.into(),
            ..Self::one_time(amount, currency)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// An order whose amount, currency and cadence have passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub label: String,
    pub billing: Option<BillingCycle>,
}

impl TryFrom<&PaymentOrder> for ValidatedOrder {
    type Error = CheckoutError;

    fn try_from(order: &PaymentOrder) -> Result<Self, Self::Error> {
        let amount = Amount::new(order.amount)?;
        let currency = order.currency.parse()?;
        let billing = if order.recurring {
            let cycle: BillingCycle = order.billing_cycle.parse()?;
            cycle.interval_unit()?;
            Some(cycle)
        } else {
            None
        };
        Ok(Self {
            amount,
            currency,
            label: order.label.clone(),
            billing,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub label: String,
    pub amount: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularBilling {
    pub amount: String,
    pub label: String,
    pub interval_unit: IntervalUnit,
    pub interval_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringInfo {
    #[serde(rename = "paymentDescription")]
    pub description: String,
    pub regular_billing: RegularBilling,
}

/// The request handed to the platform when a session is created.
///
/// Built fresh for every attempt and never mutated after session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub country_code: String,
    pub currency_code: String,
    pub merchant_capabilities: Vec<String>,
    pub supported_networks: Vec<String>,
    pub total: LineItem,
    #[serde(
        rename = "recurringPaymentRequestItem",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub recurring_info: Option<RecurringInfo>,
}

impl PaymentRequest {
    pub fn build(order: &ValidatedOrder, config: &CheckoutConfig) -> Result<Self, CheckoutError> {
        let amount = order.amount.to_string();
        let recurring_info = match order.billing {
            Some(cycle) => Some(RecurringInfo {
                description: format!("Recurring {}", order.label),
                regular_billing: RegularBilling {
                    amount: amount.clone(),
                    label: order.label.clone(),
                    interval_unit: cycle.interval_unit()?,
                    interval_count: 1,
                },
            }),
            None => None,
        };

        Ok(Self {
            country_code: config.country_code.clone(),
            currency_code: order.currency.to_string(),
            merchant_capabilities: config.merchant_capabilities.clone(),
            supported_networks: config.supported_networks.clone(),
            total: LineItem {
                label: order.label.clone(),
                amount,
                kind: "final".to_string(),
            },
            recurring_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn build(order: &PaymentOrder) -> Result<PaymentRequest, CheckoutError> {
        let validated = ValidatedOrder::try_from(order)?;
        PaymentRequest::build(&validated, &CheckoutConfig::default())
    }

    #[test]
    fn test_one_time_request_has_no_recurring_info() {
        let request = build(&PaymentOrder::one_time(dec!(1000), "JPY")).unwrap();

        assert_eq!(request.country_code, "JP");
        assert_eq!(request.currency_code, "JPY");
        assert_eq!(request.total.amount, "1000");
        assert_eq!(request.total.kind, "final");
        assert!(request.recurring_info.is_none());
    }

    #[test]
    fn test_recurring_monthly_maps_to_month() {
        let order = PaymentOrder::recurring(dec!(980), "JPY", "monthly").with_label("Premium");
        let info = build(&order).unwrap().recurring_info.unwrap();

        assert_eq!(info.description, "Recurring Premium");
        assert_eq!(info.regular_billing.interval_unit, IntervalUnit::Month);
        assert_eq!(info.regular_billing.interval_count, 1);
        assert_eq!(info.regular_billing.amount, "980");
    }

    #[test]
    fn test_recurring_yearly_maps_to_year() {
        let order = PaymentOrder::recurring(dec!(9800), "JPY", "Yearly");
        let info = build(&order).unwrap().recurring_info.unwrap();
        assert_eq!(info.regular_billing.interval_unit, IntervalUnit::Year);
        assert_eq!(info.regular_billing.interval_count, 1);
    }

    #[test]
    fn test_unsupported_cycles_are_rejected() {
        for cycle in ["weekly", "daily", "fortnightly"] {
            let order = PaymentOrder::recurring(dec!(100), "JPY", cycle);
            assert!(matches!(
                build(&order),
                Err(CheckoutError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_cycle_ignored_for_one_time() {
        let mut order = PaymentOrder::one_time(dec!(100), "JPY");
        order.billing_cycle = "weekly".to_string();
        assert!(build(&order).is_ok());
    }

    #[test]
    fn test_request_wire_shape() {
        let order = PaymentOrder::recurring(dec!(1000), "JPY", "monthly");
        let json = serde_json::to_value(build(&order).unwrap()).unwrap();

        assert_eq!(json["countryCode"], "JP");
        assert_eq!(json["merchantCapabilities"][0], "supports3DS");
        assert_eq!(json["total"]["type"], "final");
        let item = &json["recurringPaymentRequestItem"];
        assert_eq!(item["paymentDescription"], "Recurring Pay");
        assert_eq!(item["regularBilling"]["intervalUnit"], "month");
        assert_eq!(item["regularBilling"]["intervalCount"], 1);
    }
}
