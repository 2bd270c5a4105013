#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use wallet_checkout::application::orchestrator::SessionOrchestrator;
use wallet_checkout::application::probe::AvailabilityProbe;
use wallet_checkout::config::CheckoutConfig;
use wallet_checkout::domain::gateway::{MerchantValidation, PaymentReceipt};
use wallet_checkout::domain::ports::CapabilityProbe;
use wallet_checkout::domain::session::MerchantSessionToken;
use wallet_checkout::infrastructure::in_memory::{
    InMemoryGateway, RecordingReporter, Reply, Script, SimulatedPlatform,
};

pub struct Harness {
    pub platform: Arc<SimulatedPlatform>,
    pub gateway: Arc<InMemoryGateway>,
    pub reporter: Arc<RecordingReporter>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

pub fn harness(script: Script, gateway: InMemoryGateway) -> Harness {
    harness_with_config(script, gateway, CheckoutConfig::default())
}

pub fn harness_with_config(
    script: Script,
    gateway: InMemoryGateway,
    config: CheckoutConfig,
) -> Harness {
    let platform = Arc::new(SimulatedPlatform::new(script));
    let gateway = Arc::new(gateway);
    let reporter = Arc::new(RecordingReporter::default());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        config,
        AvailabilityProbe::new(Some(platform.clone() as Arc<dyn CapabilityProbe>)),
        platform.clone(),
        gateway.clone(),
        reporter.clone(),
    ));
    Harness {
        platform,
        gateway,
        reporter,
        orchestrator,
    }
}

pub fn granted_tok() -> Reply<MerchantValidation> {
    Reply::Fixed(MerchantValidation::granted(MerchantSessionToken(json!("tok"))))
}

pub fn receipt(value: serde_json::Value) -> Reply<PaymentReceipt> {
    Reply::Fixed(serde_json::from_value(value).expect("valid receipt fixture"))
}
