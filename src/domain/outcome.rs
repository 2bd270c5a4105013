use super::gateway::PaymentReceipt;
use std::fmt;

/// Which stage of the attempt produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Merchant validation could not be completed; the session was aborted.
    Validation,
    /// The backend refused the authorized credential; the session was
    /// completed with a failure status.
    Authorization,
    /// The user closed the payment sheet.
    Cancelled,
    /// The platform or a collaborator misbehaved.
    Unexpected,
    /// The attempt outlived its deadline.
    TimedOut,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Validation => "validation",
            FailureKind::Authorization => "authorization",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Unexpected => "unexpected",
            FailureKind::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Terminal result of one attempt, reported exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(PaymentReceipt),
    Failure { kind: FailureKind, reason: String },
}

impl AttemptOutcome {
    pub fn failure(kind: FailureKind, reason: impl Into<String>) -> Self {
        AttemptOutcome::Failure {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}
