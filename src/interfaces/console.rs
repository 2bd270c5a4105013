use crate::domain::gateway::PaymentReceipt;
use crate::domain::ports::ResultReporter;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Reports outcomes on a pair of text streams.
///
/// Receipts go to `out` as pretty JSON; errors go to `err` as a single
/// `Payment failed: <reason>` line.
pub struct ConsoleReporter<O: Write + Send, E: Write + Send> {
    out: Mutex<O>,
    err: Mutex<E>,
}

impl<O: Write + Send, E: Write + Send> ConsoleReporter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    pub fn into_inner(self) -> (O, E) {
        (
            self.out.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.err.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl<O: Write + Send, E: Write + Send> ResultReporter for ConsoleReporter<O, E> {
    fn on_success(&self, receipt: &PaymentReceipt) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer_pretty(&mut *out, receipt)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "failed to write receipt");
        }
    }

    fn on_error(&self, message: &str) {
        let mut err = self.err.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(err, "Payment failed: {message}") {
            warn!(error = %e, "failed to write error");
        }
    }
}
