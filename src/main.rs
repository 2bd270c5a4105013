use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wallet_checkout::application::orchestrator::SessionOrchestrator;
use wallet_checkout::application::probe::AvailabilityProbe;
use wallet_checkout::config::{CheckoutConfig, GatewayConfig};
use wallet_checkout::domain::outcome::AttemptOutcome;
use wallet_checkout::domain::ports::{CapabilityProbe, GatewayRef};
use wallet_checkout::domain::request::PaymentOrder;
use wallet_checkout::infrastructure::http_gateway::HttpGateway;
use wallet_checkout::infrastructure::in_memory::{InMemoryGateway, Script, SimulatedPlatform};
use wallet_checkout::interfaces::console::ConsoleReporter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// The user authorizes and the backend settles.
    Approve,
    /// The user authorizes and the backend declines the card.
    Decline,
    /// The user closes the payment sheet after merchant validation.
    Cancel,
    /// The platform raises merchant validation without a URL.
    InvalidMerchant,
}

#[derive(Parser)]
#[command(author, version, about = "Run a simulated wallet payment attempt", long_about = None)]
struct Cli {
    /// Amount to charge, e.g. 1000
    #[arg(long)]
    amount: Decimal,

    /// ISO 4217 currency code
    #[arg(long, default_value = "JPY")]
    currency: String,

    /// Label shown on the payment sheet
    #[arg(long, default_value = "Pay")]
    label: String,

    /// Set up a subscription instead of a one-time payment
    #[arg(long)]
    recurring: bool,

    /// Billing cycle for recurring payments (monthly or yearly)
    #[arg(long, default_value = "monthly")]
    billing_cycle: String,

    /// Payments backend base URL. Without it a built-in backend is used.
    #[arg(long)]
    gateway_url: Option<String>,

    /// Allow a plain http:// backend URL (local testing only)
    #[arg(long)]
    allow_plaintext: bool,

    /// How the simulated wallet and built-in backend behave
    #[arg(long, value_enum, default_value_t = Scenario::Approve)]
    scenario: Scenario,

    /// JSON file with merchant checkout settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Merchant country code (ISO 3166 alpha-2)
    #[arg(long)]
    country_code: Option<String>,

    /// Card network to accept; repeat for several
    #[arg(long = "network", value_name = "NETWORK")]
    networks: Vec<String>,

    /// Merchant capability, e.g. supports3DS; repeat for several
    #[arg(long = "capability", value_name = "CAPABILITY")]
    capabilities: Vec<String>,

    /// Abort the attempt after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wallet_checkout=debug"
    } else {
        "wallet_checkout=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => CheckoutConfig::from_path(path).into_diagnostic()?,
        None => CheckoutConfig::default(),
    };
    // Flags win over the config file.
    if let Some(country_code) = cli.country_code {
        config.country_code = country_code;
    }
    if !cli.networks.is_empty() {
        config.supported_networks = cli.networks;
    }
    if !cli.capabilities.is_empty() {
        config.merchant_capabilities = cli.capabilities;
    }
    if let Some(secs) = cli.deadline_secs {
        config.attempt_deadline_secs = Some(secs);
    }
    config.validate().into_diagnostic()?;

    let script = match cli.scenario {
        Scenario::Approve | Scenario::Decline => Script::Approve,
        Scenario::Cancel => Script::CancelAfterValidation,
        Scenario::InvalidMerchant => Script::MissingValidationUrl,
    };
    let platform = Arc::new(SimulatedPlatform::new(script));

    let gateway: GatewayRef = if let Some(url) = &cli.gateway_url {
        let mut gateway_config = GatewayConfig::new(url.clone());
        gateway_config.allow_plaintext = cli.allow_plaintext;
        Arc::new(HttpGateway::new(&gateway_config).into_diagnostic()?)
    } else {
        match cli.scenario {
            Scenario::Decline => Arc::new(InMemoryGateway::declining("Card declined")),
            _ => Arc::new(InMemoryGateway::approving()),
        }
    };

    let orchestrator = SessionOrchestrator::new(
        config,
        AvailabilityProbe::new(Some(platform.clone() as Arc<dyn CapabilityProbe>)),
        platform,
        gateway,
        Arc::new(ConsoleReporter::new(io::stdout(), io::stderr())),
    );

    let order = PaymentOrder {
        amount: cli.amount,
        currency: cli.currency,
        label: cli.label,
        recurring: cli.recurring,
        billing_cycle: cli.billing_cycle,
    };

    let attempt = orchestrator.begin(&order).into_diagnostic()?;
    match orchestrator.drive(attempt).await {
        AttemptOutcome::Success(_) => Ok(()),
        AttemptOutcome::Failure { kind, .. } => Err(miette!("payment attempt ended: {kind}")),
    }
}
