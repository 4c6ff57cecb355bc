use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::domain::events::SessionEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub completed_sessions: u64,
    pub expired_sessions: u64,
    /// Estimated provider cost in USD.
    pub total_cost: f64,
}

/// Running totals of what the provider will bill for closed sessions.
#[derive(Default)]
pub struct BillingLedger {
    summary: Mutex<LedgerSummary>,
}

impl BillingLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> LedgerSummary {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: &SessionEvent) {
        let total = {
            let mut summary = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                SessionEvent::Created { session_id } => {
                    debug!(session = %session_id, "Session opened");
                    return;
                }
                SessionEvent::Completed(bundle) => {
                    summary.completed_sessions += 1;
                    summary.total_cost += bundle.cost;
                    info!(
                        event = "session_billed",
                        outcome = "completed",
                        session = %bundle.session_id,
                        place_id = %bundle.details_call.place_id,
                        autocomplete_calls = bundle.autocomplete_calls.len(),
                        cost = bundle.cost,
                        "Billing record"
                    );
                }
                SessionEvent::Expired(record) => {
                    summary.expired_sessions += 1;
                    summary.total_cost += record.cost;
                    info!(
                        event = "session_billed",
                        outcome = "expired",
                        session = %record.session_id,
                        autocomplete_calls = record.autocomplete_calls,
                        duration_seconds = record.duration_seconds,
                        cost = record.cost,
                        "Billing record"
                    );
                }
            }
            summary.total_cost
        };

        metrics::gauge!("places_estimated_cost_usd").set(total);
    }

    pub fn start_listener(self: Arc<Self>, mut rx: broadcast::Receiver<SessionEvent>) {
        let ledger = self;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => ledger.record(&event),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!(count, "Billing listener lagged, totals are incomplete");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Billing listener event bus closed");
                        break;
                    }
                }
            }
        });
    }
}
