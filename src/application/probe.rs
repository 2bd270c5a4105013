use crate::domain::ports::CapabilityProbe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether the payment trigger should be offered at all.
///
/// An absent capability object, or a check that errors, reads as
/// "unavailable" and never surfaces as an error.
#[derive(Clone, Default)]
pub struct AvailabilityProbe {
    capability: Option<Arc<dyn CapabilityProbe>>,
}

impl AvailabilityProbe {
    pub fn new(capability: Option<Arc<dyn CapabilityProbe>>) -> Self {
        Self { capability }
    }

    pub fn is_available(&self) -> bool {
        let Some(capability) = &self.capability else {
            debug!("no wallet capability object present");
            return false;
        };
        match capability.can_make_payments() {
            Ok(available) => available,
            Err(e) => {
                warn!(error = %e, "wallet capability check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CheckoutError, Result};

    struct Fixed(Result<bool>);

    impl CapabilityProbe for Fixed {
        fn can_make_payments(&self) -> Result<bool> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(_) => Err(CheckoutError::PlatformError("probe exploded".to_string())),
            }
        }
    }

    #[test]
    fn test_missing_capability_is_unavailable() {
        assert!(!AvailabilityProbe::default().is_available());
    }

    #[test]
    fn test_capability_answer_is_forwarded() {
        assert!(AvailabilityProbe::new(Some(Arc::new(Fixed(Ok(true))))).is_available());
        assert!(!AvailabilityProbe::new(Some(Arc::new(Fixed(Ok(false))))).is_available());
    }

    #[test]
    fn test_failing_check_is_unavailable() {
        let probe = AvailabilityProbe::new(Some(Arc::new(Fixed(Err(
            CheckoutError::Unavailable,
        )))));
        assert!(!probe.is_available());
    }
}
