//! Billing sessions for the places provider.
//!
//! A session groups the autocomplete calls a user makes while typing with the
//! single details call that ends the interaction. The provider bills a
//! completed session as one details call; a session that times out without
//! one is billed per autocomplete call.
//!
//! Sessions leave the active table exactly once, either through
//! [`SessionTokenManager::complete_session`] or through
//! [`SessionTokenManager::sweep_expired`]. Both paths take the record out with
//! a single `remove` under the table lock, so whichever runs first wins and the
//! other sees nothing.

use chrono::{DateTime, TimeDelta, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clients::places::{AutocompleteParams, DetailsParams};
use crate::clock::{Clock, to_delta};
use crate::config::{PricingConfig, SessionConfig};
use crate::domain::events::SessionEvent;
use crate::domain::{PlaceId, SessionId};

#[derive(Debug, Error)]
pub enum SessionError {
    /// No unpredictable bytes could be obtained. There is no safe fallback:
    /// a guessable session token would let others bill against ours.
    #[error("Random source unavailable: {0}")]
    RandomSource(String),
}

/// Source of fresh session ids.
pub trait TokenSource: Send + Sync {
    fn next_id(&self) -> Result<SessionId, SessionError>;
}

/// Session ids from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn next_id(&self) -> Result<SessionId, SessionError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionError::RandomSource(e.to_string()))?;
        Ok(SessionId::from_random_bytes(bytes))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AutocompleteCall {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub parameters: AutocompleteParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailsCall {
    pub place_id: PlaceId,
    pub timestamp: DateTime<Utc>,
    pub parameters: DetailsParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub autocomplete_calls: Vec<AutocompleteCall>,
    pub details_call: Option<DetailsCall>,
    pub completed: bool,
}

impl SessionToken {
    fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at: now,
            last_activity_at: now,
            autocomplete_calls: Vec::new(),
            details_call: None,
            completed: false,
        }
    }

    #[must_use]
    pub fn is_alive(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        now - self.last_activity_at < timeout
    }
}

/// Snapshot of a session closed by a details call.
#[derive(Debug, Clone, Serialize)]
pub struct BundledRequest {
    pub session_id: SessionId,
    pub autocomplete_calls: Vec<AutocompleteCall>,
    pub details_call: DetailsCall,
    pub cost: f64,
}

/// Billing record of a session that timed out without a details call.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiredSession {
    pub session_id: SessionId,
    pub autocomplete_calls: usize,
    pub duration_seconds: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub average_age_seconds: f64,
}

/// Estimated provider cost of a session.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn session_cost(pricing: &PricingConfig, autocomplete_calls: usize, completed: bool) -> f64 {
    if completed {
        pricing.details_per_call
    } else {
        autocomplete_calls as f64 * pricing.autocomplete_per_call
    }
}

/// Resets the sweep flag when a sweep ends, including by panic.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionTokenManager {
    sessions: Mutex<HashMap<SessionId, SessionToken>>,
    sweeping: AtomicBool,
    timeout: TimeDelta,
    pricing: PricingConfig,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionTokenManager {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        pricing: PricingConfig,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenSource>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            sweeping: AtomicBool::new(false),
            timeout: to_delta(config.timeout()),
            pricing,
            clock,
            tokens,
            events,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, SessionToken>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RandomSource`] if the token source cannot
    /// produce unpredictable bytes.
    pub fn create_session_token(&self) -> Result<SessionId, SessionError> {
        let id = self.tokens.next_id()?;
        let now = self.clock.now();

        self.table().insert(id, SessionToken::new(id, now));
        debug!(session = %id, "Created session token");
        let _ = self.events.send(SessionEvent::Created { session_id: id });

        Ok(id)
    }

    /// Records an autocomplete call against a live session.
    ///
    /// Returns `false` without side effects when `id` is unknown or idle past
    /// the timeout.
    pub fn add_autocomplete_request(
        &self,
        id: &SessionId,
        query: &str,
        parameters: AutocompleteParams,
    ) -> bool {
        let now = self.clock.now();
        let mut sessions = self.table();

        let Some(session) = sessions.get_mut(id) else {
            warn!(session = %id, "Session not found for autocomplete request");
            return false;
        };

        if !session.is_alive(now, self.timeout) {
            debug!(session = %id, "Session idle past timeout, not recording request");
            return false;
        }

        session.last_activity_at = now;
        session.autocomplete_calls.push(AutocompleteCall {
            query: query.to_string(),
            timestamp: now,
            parameters,
        });

        debug!(session = %id, query, calls = session.autocomplete_calls.len(), "Added autocomplete request");
        true
    }

    /// Closes a session with its details call and returns the billing bundle.
    ///
    /// Returns `None` when `id` is unknown, including when it was already
    /// completed or swept. A session is never billed twice.
    pub fn complete_session(
        &self,
        id: &SessionId,
        place_id: PlaceId,
        parameters: DetailsParams,
    ) -> Option<BundledRequest> {
        let now = self.clock.now();

        let Some(mut session) = self.table().remove(id) else {
            warn!(session = %id, "Session not found for completion");
            return None;
        };

        session.last_activity_at = now;
        session.completed = true;
        let details_call = DetailsCall {
            place_id,
            timestamp: now,
            parameters,
        };
        session.details_call = Some(details_call.clone());

        let bundle = BundledRequest {
            session_id: session.id,
            cost: self.cost(&session, true),
            autocomplete_calls: session.autocomplete_calls,
            details_call,
        };

        info!(
            session = %id,
            place_id = %bundle.details_call.place_id,
            autocomplete_calls = bundle.autocomplete_calls.len(),
            cost = bundle.cost,
            "Completed session"
        );
        metrics::counter!("places_sessions_total", "outcome" => "completed").increment(1);
        let _ = self.events.send(SessionEvent::Completed(bundle.clone()));

        Some(bundle)
    }

    #[must_use]
    pub fn get_session(&self, id: &SessionId) -> Option<SessionToken> {
        self.table().get(id).cloned()
    }

    #[must_use]
    pub fn is_session_valid(&self, id: &SessionId) -> bool {
        let now = self.clock.now();
        self.table()
            .get(id)
            .is_some_and(|s| s.is_alive(now, self.timeout))
    }

    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionToken> {
        self.table().values().cloned().collect()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> SessionStats {
        let now = self.clock.now();
        let sessions = self.table();

        if sessions.is_empty() {
            return SessionStats::default();
        }

        let total_ms: i64 = sessions
            .values()
            .map(|s| (now - s.started_at).num_milliseconds())
            .sum();

        SessionStats {
            active_sessions: sessions.len(),
            average_age_seconds: total_ms as f64 / sessions.len() as f64 / 1000.0,
        }
    }

    #[must_use]
    pub fn cost(&self, session: &SessionToken, completed: bool) -> f64 {
        session_cost(&self.pricing, session.autocomplete_calls.len(), completed)
    }

    /// Removes every session idle past the timeout and reports its cost.
    ///
    /// Only one sweep runs at a time; a call made while another is in progress
    /// returns an empty list.
    pub fn sweep_expired(&self) -> Vec<ExpiredSession> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Session sweep already in progress");
            return Vec::new();
        }
        let _guard = SweepGuard(&self.sweeping);

        let now = self.clock.now();
        let candidates: Vec<SessionId> = self
            .table()
            .values()
            .filter(|s| !s.is_alive(now, self.timeout))
            .map(|s| s.id)
            .collect();

        let mut expired = Vec::new();

        for id in candidates {
            // Re-check under the lock: the session may have been completed or
            // touched since the scan.
            let taken = {
                let mut sessions = self.table();
                match sessions.get(&id) {
                    Some(s) if !s.is_alive(now, self.timeout) => sessions.remove(&id),
                    _ => None,
                }
            };

            let Some(session) = taken else {
                continue;
            };

            let record = ExpiredSession {
                session_id: session.id,
                autocomplete_calls: session.autocomplete_calls.len(),
                duration_seconds: (now - session.started_at).num_seconds(),
                cost: self.cost(&session, false),
            };

            info!(
                session = %record.session_id,
                duration_seconds = record.duration_seconds,
                autocomplete_calls = record.autocomplete_calls,
                cost = record.cost,
                "Session expired"
            );
            metrics::counter!("places_sessions_total", "outcome" => "expired").increment(1);
            let _ = self.events.send(SessionEvent::Expired(record.clone()));

            expired.push(record);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Cleaned up expired sessions");
        }

        expired
    }
}
