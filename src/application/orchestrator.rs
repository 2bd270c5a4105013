use super::probe::AvailabilityProbe;
use crate::config::CheckoutConfig;
use crate::domain::gateway::PaymentSubmission;
use crate::domain::outcome::{AttemptOutcome, FailureKind};
use crate::domain::ports::{GatewayRef, PaymentSession, PlatformRef, ReporterRef, ResultReporter};
use crate::domain::request::{PaymentOrder, PaymentRequest, ValidatedOrder};
use crate::domain::session::{
    CompletionStatus, PROTOCOL_VERSION, PaymentCredential, SessionEvent, SessionEvents,
    SessionState,
};
use crate::error::{CheckoutError, Result};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const UNAVAILABLE_MESSAGE: &str = "Wallet payments are not available";
pub const CANCELLED_MESSAGE: &str = "Payment cancelled";
pub const INVALID_VALIDATION_MESSAGE: &str = "Invalid merchant validation request";
pub const CLOSED_MESSAGE: &str = "Payment session closed unexpectedly";
pub const TIMED_OUT_MESSAGE: &str = "Payment timed out";
pub const ABANDONED_MESSAGE: &str = "Payment attempt was abandoned";

/// A session that has been created and started, waiting to be driven.
///
/// Returned by [`SessionOrchestrator::begin`]; hand it to
/// [`SessionOrchestrator::drive`] to run the attempt to completion.
///
/// Dropping it before it resolves (never driven, or `drive` cancelled)
/// terminates the session, clears the processing flag and reports an
/// `Unexpected` failure.
pub struct PendingAttempt {
    id: u64,
    order: ValidatedOrder,
    session: Arc<dyn PaymentSession>,
    events: UnboundedReceiver<SessionEvent>,
    state: Arc<Mutex<ButtonState>>,
    reporter: ReporterRef,
    resolved: bool,
}

impl PendingAttempt {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn resolve(&mut self, outcome: AttemptOutcome) {
        self.resolved = true;
        settle(&self.state, self.reporter.as_ref(), self.id, outcome);
    }
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        warn!(attempt = self.id, "payment attempt dropped before it resolved");
        terminate_safely(self);
        self.resolve(AttemptOutcome::failure(
            FailureKind::Unexpected,
            ABANDONED_MESSAGE,
        ));
    }
}

/// Per-button state. `processing` is true exactly while one session is live.
#[derive(Default)]
struct ButtonState {
    processing: bool,
    attempt: Option<u64>,
    stage: Option<SessionState>,
    session: Option<Arc<dyn PaymentSession>>,
}

enum Step {
    Continue,
    Done(AttemptOutcome),
}

/// Owns the lifecycle of one payment attempt at a time for a single button.
///
/// The lifecycle is `Idle -> Constructing -> AwaitingMerchantValidation ->
/// AwaitingAuthorization -> Terminal`. Every attempt that gets past the entry
/// guard ends with exactly one reporter callback and the processing flag
/// cleared, whatever path it takes.
pub struct SessionOrchestrator {
    config: CheckoutConfig,
    probe: AvailabilityProbe,
    platform: PlatformRef,
    gateway: GatewayRef,
    reporter: ReporterRef,
    available: AtomicBool,
    next_attempt: AtomicU64,
    state: Arc<Mutex<ButtonState>>,
}

impl SessionOrchestrator {
    /// Mounts the orchestrator. Availability is probed once here.
    pub fn new(
        config: CheckoutConfig,
        probe: AvailabilityProbe,
        platform: PlatformRef,
        gateway: GatewayRef,
        reporter: ReporterRef,
    ) -> Self {
        let available = probe.is_available();
        debug!(available, "wallet availability probed at mount");
        Self {
            config,
            probe,
            platform,
            gateway,
            reporter,
            available: AtomicBool::new(available),
            next_attempt: AtomicU64::new(1),
            state: Arc::new(Mutex::new(ButtonState::default())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Re-runs the availability probe on demand.
    pub fn refresh_availability(&self) -> bool {
        let available = self.probe.is_available();
        self.available.store(available, Ordering::SeqCst);
        available
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    /// True while the orchestrator holds a reference to a started session.
    pub fn has_live_session(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Stage of the live attempt, or `Idle` when nothing is in flight.
    pub fn current_state(&self) -> SessionState {
        self.lock().stage.unwrap_or(SessionState::Idle)
    }

    /// Handles the user gesture: builds the request, creates the platform
    /// session and starts it.
    ///
    /// This is deliberately a plain function. The platform only opens the
    /// payment sheet for a session created in the same call stack as the
    /// gesture, so nothing here may suspend before `start()` returns.
    ///
    /// Guard rejections (already processing, non-positive amount, invalid
    /// currency or billing cycle) return `Err` without touching the reporter.
    /// An unavailable wallet is also reported through `on_error`.
    pub fn begin(&self, order: &PaymentOrder) -> Result<PendingAttempt> {
        let (id, validated) = {
            let mut state = self.lock();
            if state.processing {
                debug!("payment already in progress, ignoring trigger");
                return Err(CheckoutError::AlreadyProcessing);
            }
            if order.amount <= Decimal::ZERO {
                debug!(amount = %order.amount, "non-positive amount, ignoring trigger");
                return Err(CheckoutError::ValidationError(
                    "Amount must be positive".to_string(),
                ));
            }
            if !self.is_available() {
                drop(state);
                warn!("wallet payments unavailable");
                self.reporter.on_error(UNAVAILABLE_MESSAGE);
                return Err(CheckoutError::Unavailable);
            }
            let validated = ValidatedOrder::try_from(order)?;

            let id = self.next_attempt.fetch_add(1, Ordering::SeqCst);
            state.processing = true;
            state.attempt = Some(id);
            state.stage = Some(SessionState::Constructing);
            state.session = None;
            (id, validated)
        };

        match self.open_session(&validated) {
            Ok((session, events)) => {
                let mut state = self.lock();
                state.stage = Some(SessionState::AwaitingMerchantValidation);
                state.session = Some(session.clone());
                drop(state);

                info!(
                    attempt = id,
                    amount = %validated.amount,
                    currency = %validated.currency,
                    recurring = validated.billing.is_some(),
                    "payment session started"
                );
                Ok(PendingAttempt {
                    id,
                    order: validated,
                    session,
                    events,
                    state: Arc::clone(&self.state),
                    reporter: Arc::clone(&self.reporter),
                    resolved: false,
                })
            }
            Err(e) => {
                error!(attempt = id, error = %e, "failed to start payment session");
                settle(
                    &self.state,
                    self.reporter.as_ref(),
                    id,
                    AttemptOutcome::failure(
                        FailureKind::Unexpected,
                        reason_of(&e, "Failed to initialize wallet payment"),
                    ),
                );
                Err(e)
            }
        }
    }

    fn open_session(
        &self,
        order: &ValidatedOrder,
    ) -> Result<(Arc<dyn PaymentSession>, UnboundedReceiver<SessionEvent>)> {
        let request = PaymentRequest::build(order, &self.config)?;
        let (events, receiver) = SessionEvents::channel();
        let session = self
            .platform
            .create_session(PROTOCOL_VERSION, request, events)?;
        // A session that fails to start was never live; it is not aborted.
        session.start()?;
        Ok((session, receiver))
    }

    /// Consumes platform events until the attempt reaches a terminal
    /// disposition, reports it, and returns it.
    pub async fn drive(&self, mut attempt: PendingAttempt) -> AttemptOutcome {
        let outcome = match self.config.attempt_deadline() {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run_events(&mut attempt)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(attempt = attempt.id, ?limit, "payment attempt deadline elapsed");
                        terminate_safely(&attempt);
                        AttemptOutcome::failure(FailureKind::TimedOut, TIMED_OUT_MESSAGE)
                    }
                }
            }
            None => self.run_events(&mut attempt).await,
        };
        attempt.resolve(outcome.clone());
        outcome
    }

    /// `begin` followed by a spawned `drive`, for callers on a tokio runtime.
    pub fn trigger(self: &Arc<Self>, order: &PaymentOrder) -> Result<JoinHandle<AttemptOutcome>> {
        let attempt = self.begin(order)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.drive(attempt).await }))
    }

    async fn run_events(&self, attempt: &mut PendingAttempt) -> AttemptOutcome {
        loop {
            let Some(event) = attempt.events.recv().await else {
                warn!(attempt = attempt.id, "platform dropped the session");
                terminate_safely(attempt);
                return AttemptOutcome::failure(FailureKind::Unexpected, CLOSED_MESSAGE);
            };

            let stage = self.current_state();
            let step = match (event, stage) {
                (
                    SessionEvent::ValidateMerchant { validation_url },
                    SessionState::AwaitingMerchantValidation,
                ) => self.on_validate_merchant(attempt, validation_url).await,
                (
                    SessionEvent::PaymentAuthorized { credential },
                    SessionState::AwaitingAuthorization,
                ) => Step::Done(self.on_payment_authorized(attempt, credential).await),
                (SessionEvent::Cancel, _) => {
                    info!(attempt = attempt.id, "payment cancelled by user");
                    Step::Done(AttemptOutcome::failure(
                        FailureKind::Cancelled,
                        CANCELLED_MESSAGE,
                    ))
                }
                (event, stage) => {
                    error!(attempt = attempt.id, ?event, ?stage, "out-of-order session event");
                    terminate_safely(attempt);
                    Step::Done(AttemptOutcome::failure(
                        FailureKind::Unexpected,
                        "Unexpected payment session event",
                    ))
                }
            };

            if let Step::Done(outcome) = step {
                return outcome;
            }
        }
    }

    async fn on_validate_merchant(
        &self,
        attempt: &PendingAttempt,
        validation_url: Option<String>,
    ) -> Step {
        let Some(url) = validation_url.filter(|u| !u.trim().is_empty()) else {
            error!(attempt = attempt.id, "validation event carried no URL");
            abort_quietly(attempt);
            return Step::Done(AttemptOutcome::failure(
                FailureKind::Validation,
                INVALID_VALIDATION_MESSAGE,
            ));
        };

        debug!(attempt = attempt.id, %url, "validating merchant");
        let validation = match self.gateway.validate_merchant_session(&url).await {
            Ok(validation) => validation,
            Err(e) => {
                error!(attempt = attempt.id, error = %e, "merchant validation request failed");
                abort_quietly(attempt);
                return Step::Done(AttemptOutcome::failure(
                    FailureKind::Validation,
                    reason_of(&e, "Merchant validation error"),
                ));
            }
        };

        let Some(token) = validation.usable_token() else {
            warn!(attempt = attempt.id, error = ?validation.error, "merchant validation refused");
            abort_quietly(attempt);
            return Step::Done(AttemptOutcome::failure(
                FailureKind::Validation,
                non_empty(validation.error, "Merchant validation failed"),
            ));
        };

        if let Err(e) = attempt.session.complete_merchant_validation(token) {
            error!(attempt = attempt.id, error = %e, "platform rejected merchant session");
            abort_quietly(attempt);
            return Step::Done(AttemptOutcome::failure(
                FailureKind::Validation,
                reason_of(&e, "Merchant validation error"),
            ));
        }

        self.advance(attempt.id, SessionState::AwaitingAuthorization);
        debug!(attempt = attempt.id, "merchant validated");
        Step::Continue
    }

    async fn on_payment_authorized(
        &self,
        attempt: &PendingAttempt,
        credential: PaymentCredential,
    ) -> AttemptOutcome {
        self.advance(attempt.id, SessionState::Authorizing);

        let token = match credential.serialize_token() {
            Ok(token) => token,
            Err(e) => {
                error!(attempt = attempt.id, error = %e, "could not serialize credential");
                fail_quietly(attempt);
                return AttemptOutcome::failure(
                    FailureKind::Unexpected,
                    "Payment processing error",
                );
            }
        };

        let submission = PaymentSubmission {
            token,
            amount: attempt.order.amount,
            currency: attempt.order.currency.clone(),
            billing_cycle: attempt.order.billing,
        };
        let kind = submission.kind();
        debug!(attempt = attempt.id, ?kind, "submitting payment");

        let receipt = match self.gateway.submit_payment(submission).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(attempt = attempt.id, error = %e, "payment submission failed");
                fail_quietly(attempt);
                return AttemptOutcome::failure(
                    FailureKind::Authorization,
                    reason_of(&e, "Payment processing error"),
                );
            }
        };

        if !receipt.is_settled(kind) {
            warn!(attempt = attempt.id, status = %receipt.status, "payment not settled");
            fail_quietly(attempt);
            return AttemptOutcome::failure(
                FailureKind::Authorization,
                non_empty(receipt.error, "Payment failed"),
            );
        }

        if let Err(e) = attempt.session.complete_payment(CompletionStatus::Success) {
            error!(attempt = attempt.id, error = %e, "platform rejected success completion");
            fail_quietly(attempt);
            return AttemptOutcome::failure(
                FailureKind::Unexpected,
                reason_of(&e, "Payment processing error"),
            );
        }

        AttemptOutcome::Success(receipt)
    }

    fn advance(&self, id: u64, stage: SessionState) {
        let mut state = self.lock();
        if state.attempt == Some(id) {
            state.stage = Some(stage);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ButtonState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<ButtonState>) -> MutexGuard<'_, ButtonState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the button state for `id` and fires the single reporter callback.
/// The reporter runs after the lock is released.
fn settle(
    state: &Mutex<ButtonState>,
    reporter: &dyn ResultReporter,
    id: u64,
    outcome: AttemptOutcome,
) {
    {
        let mut state = lock(state);
        if state.attempt == Some(id) {
            *state = ButtonState::default();
        }
    }

    match outcome {
        AttemptOutcome::Success(receipt) => {
            info!(
                attempt = id,
                transaction_id = ?receipt.transaction_id,
                subscription_id = ?receipt.subscription_id,
                "payment succeeded"
            );
            reporter.on_success(&receipt);
        }
        AttemptOutcome::Failure { kind, reason } => {
            info!(attempt = id, %kind, %reason, "payment failed");
            reporter.on_error(&reason);
        }
    }
}

/// Abort before authorization, fail-complete after it.
fn terminate_safely(attempt: &PendingAttempt) {
    let authorized = {
        let state = lock(&attempt.state);
        state.attempt == Some(attempt.id) && state.stage.is_some_and(|s| s.is_authorized())
    };
    if authorized {
        fail_quietly(attempt);
    } else {
        abort_quietly(attempt);
    }
}

fn abort_quietly(attempt: &PendingAttempt) {
    if let Err(e) = attempt.session.abort() {
        warn!(attempt = attempt.id, error = %e, "session abort failed");
    }
}

fn fail_quietly(attempt: &PendingAttempt) {
    if let Err(e) = attempt.session.complete_payment(CompletionStatus::Failure) {
        warn!(attempt = attempt.id, error = %e, "failure completion failed");
    }
}

fn non_empty(reason: Option<String>, fallback: &str) -> String {
    reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Human-readable message for the reporter: the collaborator's own text when
/// it supplied one, the fallback otherwise.
fn reason_of(e: &CheckoutError, fallback: &str) -> String {
    match e {
        CheckoutError::GatewayError(msg)
        | CheckoutError::PlatformError(msg)
        | CheckoutError::ValidationError(msg) => non_empty(Some(msg.clone()), fallback),
        CheckoutError::Unavailable | CheckoutError::AlreadyProcessing => e.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CapabilityProbe;
    use crate::infrastructure::in_memory::{
        InMemoryGateway, RecordingReporter, Script, SimulatedPlatform,
    };
    use rust_decimal_macros::dec;

    fn orchestrator(
        platform: Arc<SimulatedPlatform>,
        gateway: Arc<InMemoryGateway>,
        reporter: Arc<RecordingReporter>,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(
            CheckoutConfig::default(),
            AvailabilityProbe::new(Some(platform.clone() as Arc<dyn CapabilityProbe>)),
            platform,
            gateway,
            reporter,
        )
    }

    #[test]
    fn test_begin_is_synchronous_and_starts_session() {
        let platform = Arc::new(SimulatedPlatform::new(Script::Approve));
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            Arc::new(RecordingReporter::default()),
        );

        // No runtime here: session creation must not need one.
        let attempt = orchestrator
            .begin(&PaymentOrder::one_time(dec!(1000), "JPY"))
            .unwrap();

        assert_eq!(attempt.id(), 1);
        assert!(orchestrator.is_processing());
        assert_eq!(
            orchestrator.current_state(),
            SessionState::AwaitingMerchantValidation
        );
        let session = platform.last_session().unwrap();
        assert_eq!(session.version(), 3);
        assert!(session.started());
    }

    #[test]
    fn test_start_failure_resets_flag_without_abort() {
        let platform = Arc::new(SimulatedPlatform::new(Script::FailToStart));
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            reporter.clone(),
        );

        let result = orchestrator.begin(&PaymentOrder::one_time(dec!(1000), "JPY"));

        assert!(matches!(result, Err(CheckoutError::PlatformError(_))));
        assert!(!orchestrator.is_processing());
        assert_eq!(orchestrator.current_state(), SessionState::Idle);
        assert_eq!(reporter.errors(), vec!["Session refused to start".to_string()]);
        assert!(!platform.last_session().unwrap().aborted());
    }

    #[test]
    fn test_unavailable_wallet_reports_error() {
        let platform = Arc::new(SimulatedPlatform::unavailable());
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            reporter.clone(),
        );

        assert!(!orchestrator.is_available());
        let result = orchestrator.begin(&PaymentOrder::one_time(dec!(1000), "JPY"));

        assert!(matches!(result, Err(CheckoutError::Unavailable)));
        assert_eq!(reporter.errors(), vec![UNAVAILABLE_MESSAGE.to_string()]);
        assert_eq!(platform.session_count(), 0);
        assert!(!orchestrator.is_processing());
    }

    #[test]
    fn test_unsupported_cycle_never_creates_session() {
        let platform = Arc::new(SimulatedPlatform::new(Script::Approve));
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            reporter.clone(),
        );

        let result = orchestrator.begin(&PaymentOrder::recurring(dec!(1000), "JPY", "weekly"));

        assert!(matches!(result, Err(CheckoutError::ValidationError(_))));
        assert_eq!(platform.session_count(), 0);
        assert!(!orchestrator.is_processing());
        assert!(reporter.errors().is_empty());
    }

    #[tokio::test]
    async fn test_platform_rejecting_merchant_session_aborts() {
        let platform = Arc::new(SimulatedPlatform::new(Script::RejectMerchantSession));
        let reporter = Arc::new(RecordingReporter::default());
        let gateway = Arc::new(InMemoryGateway::approving());
        let orchestrator = orchestrator(platform.clone(), gateway.clone(), reporter.clone());

        let attempt = orchestrator
            .begin(&PaymentOrder::one_time(dec!(1000), "JPY"))
            .unwrap();
        let outcome = orchestrator.drive(attempt).await;

        assert!(matches!(
            outcome,
            AttemptOutcome::Failure { kind: FailureKind::Validation, .. }
        ));
        assert!(platform.last_session().unwrap().aborted());
        assert!(gateway.submissions().await.is_empty());
        assert!(!orchestrator.is_processing());
    }

    #[test]
    fn test_dropped_attempt_releases_button() {
        let platform = Arc::new(SimulatedPlatform::new(Script::Manual));
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            reporter.clone(),
        );
        let order = PaymentOrder::one_time(dec!(1000), "JPY");

        let attempt = orchestrator.begin(&order).unwrap();
        drop(attempt);

        assert!(!orchestrator.is_processing());
        assert!(!orchestrator.has_live_session());
        let first = platform.last_session().unwrap();
        assert!(first.aborted());
        assert!(first.completions().is_empty());
        assert_eq!(reporter.errors(), vec![ABANDONED_MESSAGE.to_string()]);

        let second = orchestrator.begin(&order).unwrap();
        assert_eq!(second.id(), 2);
        assert_eq!(platform.session_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_availability() {
        let platform = Arc::new(SimulatedPlatform::unavailable());
        let orchestrator = orchestrator(
            platform.clone(),
            Arc::new(InMemoryGateway::approving()),
            Arc::new(RecordingReporter::default()),
        );
        assert!(!orchestrator.is_available());

        platform.set_available(true);
        assert!(orchestrator.refresh_availability());
        assert!(orchestrator.is_available());
    }

    #[test]
    fn test_reason_prefers_collaborator_text() {
        assert_eq!(
            reason_of(&CheckoutError::GatewayError("card declined".into()), "x"),
            "card declined"
        );
        assert_eq!(reason_of(&CheckoutError::GatewayError(" ".into()), "x"), "x");
        let io = CheckoutError::IoError(std::io::Error::other("boom"));
        assert_eq!(reason_of(&io, "fallback"), "fallback");
    }
}
