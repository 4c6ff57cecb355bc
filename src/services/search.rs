//! Search orchestration for one search box.
//!
//! [`SearchBox`] owns the keystroke-to-results pipeline: debounce, throttle,
//! cache lookup, session bookkeeping, cancellation of superseded requests and
//! the final details lookup. It is the error boundary of the places layer;
//! none of its public methods fail. Every failure degrades to "no results".

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::places::{
    AutocompleteParams, DetailsParams, LocationBias, PlacesApi, PlacesStatus,
};
use crate::clock::{Clock, to_delta};
use crate::config::Config;
use crate::domain::SessionId;
use crate::models::{GeoPoint, ResolvedLocation, Suggestion};
use crate::services::places_cache::QueryCache;
use crate::services::session_tokens::SessionTokenManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SearchPhase {
    #[default]
    Idle,
    Debouncing,
    Throttled,
    Fetching,
    Cached,
    Fetched,
    Cancelled,
    Failed,
    /// Session ids cannot be generated; the box no longer searches.
    Disabled,
}

/// What a single [`SearchBox::search`] call ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Dropped by the throttle gate.
    Throttled,
    Cached(Vec<Suggestion>),
    Fetched(Vec<Suggestion>),
    /// Superseded by a newer request; nothing was published.
    Cancelled,
    Failed,
}

impl SearchOutcome {
    #[must_use]
    pub fn results(&self) -> &[Suggestion] {
        match self {
            Self::Cached(results) | Self::Fetched(results) => results,
            Self::Throttled | Self::Cancelled | Self::Failed => &[],
        }
    }
}

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchView {
    pub query: String,
    pub results: Vec<Suggestion>,
    pub is_loading: bool,
    pub phase: SearchPhase,
}

/// Tuning shared by every search box.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub min_query_len: usize,
    pub debounce: Duration,
    pub throttle: TimeDelta,
    pub language: String,
    pub result_type: Option<String>,
    pub search_radius_km: f64,
    pub strict_bounds: bool,
}

impl SearchSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_query_len: config.search.min_query_len,
            debounce: config.search.debounce(),
            throttle: to_delta(config.search.throttle()),
            language: config.places.language.clone(),
            result_type: config.places.result_type.clone(),
            search_radius_km: config.places.search_radius_km,
            strict_bounds: config.places.strict_bounds,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Per-box inputs that narrow the search.
#[derive(Debug, Clone, Default)]
pub struct SearchBoxOptions {
    pub reference_location: Option<GeoPoint>,
    pub country: Option<String>,
}

#[derive(Default)]
struct BoxState {
    session: Option<SessionId>,
    session_had_results: bool,
    last_dispatch: Option<DateTime<Utc>>,
    in_flight: Option<CancellationToken>,
    generation: u64,
    pending_debounce: Option<CancellationToken>,
    disabled: bool,
}

impl BoxState {
    /// Cancels the request in flight and invalidates its generation, so a
    /// response still on the way can no longer publish or be cached.
    fn supersede_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel();
        }
        self.generation += 1;
    }

    fn cancel_debounce(&mut self) {
        if let Some(pending) = self.pending_debounce.take() {
            pending.cancel();
        }
    }
}

pub struct SearchBox {
    api: Arc<dyn PlacesApi>,
    cache: Arc<QueryCache>,
    sessions: Arc<SessionTokenManager>,
    clock: Arc<dyn Clock>,
    settings: SearchSettings,
    options: SearchBoxOptions,
    state: Mutex<BoxState>,
    view: watch::Sender<SearchView>,
}

impl SearchBox {
    #[must_use]
    pub fn new(
        api: Arc<dyn PlacesApi>,
        cache: Arc<QueryCache>,
        sessions: Arc<SessionTokenManager>,
        clock: Arc<dyn Clock>,
        settings: SearchSettings,
        options: SearchBoxOptions,
    ) -> Self {
        let (view, _) = watch::channel(SearchView::default());

        Self {
            api,
            cache,
            sessions,
            clock,
            settings,
            options,
            state: Mutex::new(BoxState::default()),
            view,
        }
    }

    fn state(&self) -> MutexGuard<'_, BoxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.subscribe()
    }

    /// Session currently bundling this box's requests, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.state().session
    }

    /// Feeds the latest input text. Short input clears the list right away;
    /// anything else schedules a search once typing pauses.
    pub fn on_text_change(self: &Arc<Self>, text: &str) {
        let mut state = self.state();
        state.cancel_debounce();

        if text.trim().chars().count() < self.settings.min_query_len {
            state.supersede_in_flight();
            drop(state);
            self.view.send_modify(|v| {
                v.query = text.to_string();
                v.results.clear();
                v.is_loading = false;
                v.phase = SearchPhase::Idle;
            });
            return;
        }

        let timer = CancellationToken::new();
        state.pending_debounce = Some(timer.clone());
        drop(state);

        self.view.send_modify(|v| {
            v.query = text.to_string();
            v.phase = SearchPhase::Debouncing;
        });

        let this = Arc::clone(self);
        let query = text.to_string();
        let delay = self.settings.debounce;
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if this.take_debounce(&timer) {
                        this.search(&query).await;
                    }
                }
            }
        });
    }

    /// Claims the debounce slot for a timer that just fired. Replacing a timer
    /// always cancels it first, so an uncancelled timer is still the current one.
    fn take_debounce(&self, timer: &CancellationToken) -> bool {
        let mut state = self.state();
        if timer.is_cancelled() {
            return false;
        }
        state.pending_debounce = None;
        true
    }

    /// Runs one search for `query`.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let now = self.clock.now();

        let (token, generation, params) = {
            let mut state = self.state();

            if state.disabled {
                return SearchOutcome::Failed;
            }

            if let Some(last) = state.last_dispatch
                && now - last < self.settings.throttle
            {
                debug!(query, "Search throttled");
                drop(state);
                self.set_phase(SearchPhase::Throttled);
                return SearchOutcome::Throttled;
            }
            state.last_dispatch = Some(now);

            let held = state.session;
            let session = match held {
                Some(id) if self.sessions.is_session_valid(&id) => id,
                _ => match self.sessions.create_session_token() {
                    Ok(id) => {
                        state.session = Some(id);
                        state.session_had_results = false;
                        id
                    }
                    Err(e) => {
                        error!(error = %e, "Cannot create session token, disabling search");
                        state.disabled = true;
                        state.session = None;
                        drop(state);
                        self.view.send_modify(|v| {
                            v.results.clear();
                            v.is_loading = false;
                            v.phase = SearchPhase::Disabled;
                        });
                        return SearchOutcome::Failed;
                    }
                },
            };

            if let Some(cached) = self.cache.get(query) {
                let results: Vec<Suggestion> = cached.into_iter().map(Suggestion::from).collect();
                state.supersede_in_flight();
                state.session_had_results = true;
                drop(state);
                debug!(query, count = results.len(), "Serving cached suggestions");
                self.view.send_modify(|v| {
                    v.results.clone_from(&results);
                    v.is_loading = false;
                    v.phase = SearchPhase::Cached;
                });
                return SearchOutcome::Cached(results);
            }

            state.supersede_in_flight();
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());

            (token, state.generation, self.autocomplete_params(query, session))
        };

        if let Some(session) = params.session_token {
            self.sessions
                .add_autocomplete_request(&session, query, params.clone());
        }

        self.view.send_modify(|v| {
            v.is_loading = true;
            v.phase = SearchPhase::Fetching;
        });
        metrics::counter!("places_requests_total", "kind" => "autocomplete").increment(1);

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(query, "Autocomplete request superseded");
                return SearchOutcome::Cancelled;
            }
            response = self.api.autocomplete(&params) => response,
        };
        metrics::histogram!("places_request_duration_seconds", "kind" => "autocomplete")
            .record(started.elapsed().as_secs_f64());

        if token.is_cancelled() {
            debug!(query, "Discarding late autocomplete response");
            return SearchOutcome::Cancelled;
        }

        match response {
            Ok(response) if response.status.is_ok() && !response.predictions.is_empty() => {
                let results: Vec<Suggestion> =
                    response.predictions.into_iter().map(Suggestion::from).collect();

                if !self.is_current(generation) {
                    return SearchOutcome::Cancelled;
                }
                self.cache.set(query, results.clone());

                if self.publish(generation, results.clone(), SearchPhase::Fetched) {
                    SearchOutcome::Fetched(results)
                } else {
                    SearchOutcome::Cancelled
                }
            }
            Ok(response) => {
                let phase = match &response.status {
                    PlacesStatus::Ok | PlacesStatus::ZeroResults => SearchPhase::Fetched,
                    status if status.needs_operator() => {
                        warn!(
                            status = %status,
                            error_message = response.error_message.as_deref().unwrap_or(""),
                            "Places provider refused autocomplete request"
                        );
                        SearchPhase::Failed
                    }
                    status => {
                        debug!(status = %status, query, "Autocomplete returned non-OK status");
                        SearchPhase::Failed
                    }
                };

                if !self.publish(generation, Vec::new(), phase) {
                    SearchOutcome::Cancelled
                } else if phase == SearchPhase::Fetched {
                    SearchOutcome::Fetched(Vec::new())
                } else {
                    SearchOutcome::Failed
                }
            }
            Err(e) => {
                warn!(error = %e, query, "Places autocomplete failed");
                if self.publish(generation, Vec::new(), SearchPhase::Failed) {
                    SearchOutcome::Failed
                } else {
                    SearchOutcome::Cancelled
                }
            }
        }
    }

    /// Resolves a chosen suggestion to coordinates and closes the session.
    pub async fn select_place(&self, place: &Suggestion) -> Option<ResolvedLocation> {
        let session = {
            let mut state = self.state();
            state.cancel_debounce();
            state.supersede_in_flight();
            state.session_had_results = false;
            state.session.take()
        };

        let params = DetailsParams::new(place.place_id.clone(), session);

        if let Some(id) = session {
            match self
                .sessions
                .complete_session(&id, place.place_id.clone(), params.clone())
            {
                Some(bundle) => debug!(session = %id, cost = bundle.cost, "Session bundled"),
                None => debug!(session = %id, "Session already closed, nothing to bundle"),
            }
        }

        metrics::counter!("places_requests_total", "kind" => "details").increment(1);
        let started = Instant::now();
        let response = self.api.details(&params).await;
        metrics::histogram!("places_request_duration_seconds", "kind" => "details")
            .record(started.elapsed().as_secs_f64());

        match response {
            Ok(details) if details.status.is_ok() => {
                let Some(location) = details.location() else {
                    warn!(place_id = %place.place_id, "Place details carried no geometry");
                    return None;
                };

                info!(place_id = %place.place_id, "Resolved place");
                Some(ResolvedLocation {
                    latitude: location.latitude,
                    longitude: location.longitude,
                    address: place.description.clone(),
                })
            }
            Ok(details) => {
                if details.status.needs_operator() {
                    warn!(status = %details.status, "Places provider refused details request");
                } else {
                    debug!(status = %details.status, place_id = %place.place_id, "Details returned non-OK status");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, place_id = %place.place_id, "Place details failed");
                None
            }
        }
    }

    /// Empties the list and the query text.
    ///
    /// A held session that never produced results is treated as abandoned:
    /// the box forgets it and the sweeper bills it once it times out.
    pub fn clear_results(&self) {
        {
            let mut state = self.state();
            state.cancel_debounce();
            state.supersede_in_flight();

            if let Some(id) = state.session
                && !state.session_had_results
            {
                debug!(session = %id, "Abandoning session without results");
                state.session = None;
            }
        }

        self.view.send_modify(|v| {
            v.query.clear();
            v.results.clear();
            v.is_loading = false;
            v.phase = SearchPhase::Idle;
        });
    }

    /// Empties the list but keeps the query text.
    pub fn clear_results_only(&self) {
        self.view.send_modify(|v| v.results.clear());
    }

    /// Stops pending timers and requests. The box can still be used afterwards.
    pub fn dispose(&self) {
        let mut state = self.state();
        state.cancel_debounce();
        state.supersede_in_flight();
    }

    fn autocomplete_params(&self, query: &str, session: SessionId) -> AutocompleteParams {
        AutocompleteParams {
            input: query.to_string(),
            language: self.settings.language.clone(),
            types: self.settings.result_type.clone(),
            location_bias: self.options.reference_location.map(|center| {
                LocationBias::around(
                    center,
                    self.settings.search_radius_km,
                    self.settings.strict_bounds,
                )
            }),
            country: self.options.country.clone(),
            session_token: Some(session),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    /// Publishes results if `generation` is still the newest request.
    fn publish(&self, generation: u64, results: Vec<Suggestion>, phase: SearchPhase) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }
        state.in_flight = None;
        if !results.is_empty() {
            state.session_had_results = true;
        }

        self.view.send_modify(|v| {
            v.results = results;
            v.is_loading = false;
            v.phase = phase;
        });
        true
    }

    fn set_phase(&self, phase: SearchPhase) {
        self.view.send_modify(|v| v.phase = phase);
    }
}
