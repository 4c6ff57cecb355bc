//! Search box behaviour against an in-process places provider.

use async_trait::async_trait;
use bazaar_places::clients::places::{
    AutocompleteParams, AutocompleteResponse, DetailsParams, DetailsResponse, PlacesApi,
    PlacesError, PlacesStatus, Prediction,
};
use bazaar_places::clock::ManualClock;
use bazaar_places::config::Config;
use bazaar_places::domain::SessionId;
use bazaar_places::domain::events::SessionEvent;
use bazaar_places::models::{GeoPoint, Suggestion};
use bazaar_places::services::search::{SearchBoxOptions, SearchOutcome, SearchPhase};
use bazaar_places::services::session_tokens::{OsTokenSource, SessionError, TokenSource};
use bazaar_places::state::PlacesState;
use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct FakePlaces {
    autocomplete_calls: Mutex<Vec<AutocompleteParams>>,
    details_calls: Mutex<Vec<DetailsParams>>,
    responses: Mutex<HashMap<String, AutocompleteResponse>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    fail: AtomicBool,
}

impl FakePlaces {
    fn respond(&self, input: &str, response: AutocompleteResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(input.to_string(), response);
    }

    fn gate(&self, input: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(input.to_string(), Arc::clone(&gate));
        gate
    }

    fn inputs(&self) -> Vec<String> {
        self.autocomplete_calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.input.clone())
            .collect()
    }
}

#[async_trait]
impl PlacesApi for FakePlaces {
    async fn autocomplete(
        &self,
        params: &AutocompleteParams,
    ) -> Result<AutocompleteResponse, PlacesError> {
        self.autocomplete_calls.lock().unwrap().push(params.clone());

        let gate = self.gates.lock().unwrap().get(&params.input).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(PlacesError::Decode("connection reset".to_string()));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&params.input)
            .cloned()
            .unwrap_or_else(|| AutocompleteResponse::with_status(PlacesStatus::ZeroResults)))
    }

    async fn details(&self, params: &DetailsParams) -> Result<DetailsResponse, PlacesError> {
        self.details_calls.lock().unwrap().push(params.clone());
        Ok(DetailsResponse::ok(
            GeoPoint::new(52.3676, 4.9041),
            "Amsterdam, Netherlands",
        ))
    }
}

struct BrokenSource;

impl TokenSource for BrokenSource {
    fn next_id(&self) -> Result<SessionId, SessionError> {
        Err(SessionError::RandomSource("no entropy".to_string()))
    }
}

struct Harness {
    state: PlacesState,
    api: Arc<FakePlaces>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    harness_with(Arc::new(OsTokenSource))
}

fn harness_with(tokens: Arc<dyn TokenSource>) -> Harness {
    let api = Arc::new(FakePlaces::default());
    let clock = Arc::new(ManualClock::default());
    let state = PlacesState::with_parts(Config::default(), api.clone(), clock.clone(), tokens);
    Harness { state, api, clock }
}

fn amsterdam() -> AutocompleteResponse {
    AutocompleteResponse::ok(vec![
        Prediction::new("Amsterdam, Netherlands", "ams-nl"),
        Prediction::new("Amstelveen, Netherlands", "amstelveen-nl"),
    ])
}

fn place_ids(results: &[Suggestion]) -> Vec<String> {
    results.iter().map(|s| s.place_id.to_string()).collect()
}

#[tokio::test]
async fn second_search_inside_throttle_window_is_dropped() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    assert!(matches!(search_box.search("amst").await, SearchOutcome::Fetched(_)));
    h.clock.advance(TimeDelta::milliseconds(200));
    assert_eq!(search_box.search("amste").await, SearchOutcome::Throttled);

    assert_eq!(h.api.inputs(), vec!["amst"]);
    assert_eq!(search_box.view().phase, SearchPhase::Throttled);
    assert_eq!(place_ids(&search_box.view().results), vec!["ams-nl", "amstelveen-nl"]);
}

#[tokio::test]
async fn search_after_throttle_window_dispatches() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("amst").await;
    h.clock.advance(TimeDelta::milliseconds(1000));
    search_box.search("amste").await;

    assert_eq!(h.api.inputs(), vec!["amst", "amste"]);
}

#[tokio::test]
async fn newer_request_cancels_the_one_in_flight() {
    let h = harness();
    h.api.respond("a", AutocompleteResponse::ok(vec![Prediction::new("A, X", "a")]));
    h.api.respond("ab", AutocompleteResponse::ok(vec![Prediction::new("Ab, X", "ab")]));
    let gate = h.api.gate("a");
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let first = {
        let search_box = Arc::clone(&search_box);
        tokio::spawn(async move { search_box.search("a").await })
    };
    while h.api.inputs().is_empty() {
        tokio::task::yield_now().await;
    }

    h.clock.advance(TimeDelta::seconds(2));
    let second = search_box.search("ab").await;
    gate.notify_one();

    assert_eq!(first.await.unwrap(), SearchOutcome::Cancelled);
    assert_eq!(place_ids(second.results()), vec!["ab"]);
    assert_eq!(place_ids(&search_box.view().results), vec!["ab"]);
    assert!(!search_box.view().is_loading);
    assert!(!h.state.cache.has("a"));

    // Cancellation does not roll back the recorded call.
    let session = search_box.current_session().unwrap();
    assert_eq!(
        h.state.sessions.get_session(&session).unwrap().autocomplete_calls.len(),
        2
    );
}

#[tokio::test]
async fn clearing_discards_a_late_response() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let gate = h.api.gate("amst");
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let pending = {
        let search_box = Arc::clone(&search_box);
        tokio::spawn(async move { search_box.search("amst").await })
    };
    while h.api.inputs().is_empty() {
        tokio::task::yield_now().await;
    }

    search_box.clear_results();
    gate.notify_one();

    assert_eq!(pending.await.unwrap(), SearchOutcome::Cancelled);
    assert!(search_box.view().results.is_empty());
    assert_eq!(search_box.view().phase, SearchPhase::Idle);
}

#[tokio::test]
async fn cache_hit_discards_a_late_response() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let gate = h.api.gate("amst");
    h.state
        .cache
        .set("paris", vec![Suggestion::new("Paris, France", "paris")]);
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let pending = {
        let search_box = Arc::clone(&search_box);
        tokio::spawn(async move { search_box.search("amst").await })
    };
    while h.api.inputs().is_empty() {
        tokio::task::yield_now().await;
    }

    h.clock.advance(TimeDelta::seconds(2));
    let cached = search_box.search("paris").await;
    gate.notify_one();

    assert_eq!(place_ids(cached.results()), vec!["paris"]);
    assert_eq!(pending.await.unwrap(), SearchOutcome::Cancelled);
    assert_eq!(place_ids(&search_box.view().results), vec!["paris"]);
    assert_eq!(search_box.view().phase, SearchPhase::Cached);
    assert!(!search_box.view().is_loading);
    assert!(!h.state.cache.has("amst"));
}

#[tokio::test]
async fn short_input_discards_a_late_response() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let gate = h.api.gate("amst");
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let pending = {
        let search_box = Arc::clone(&search_box);
        tokio::spawn(async move { search_box.search("amst").await })
    };
    while h.api.inputs().is_empty() {
        tokio::task::yield_now().await;
    }

    search_box.on_text_change("am");
    gate.notify_one();

    assert_eq!(pending.await.unwrap(), SearchOutcome::Cancelled);
    let view = search_box.view();
    assert_eq!(view.query, "am");
    assert!(view.results.is_empty());
    assert!(!view.is_loading);
    assert_eq!(view.phase, SearchPhase::Idle);
    assert!(!h.state.cache.has("amst"));
}

#[tokio::test]
async fn selecting_discards_a_late_response() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let gate = h.api.gate("amst");
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let pending = {
        let search_box = Arc::clone(&search_box);
        tokio::spawn(async move { search_box.search("amst").await })
    };
    while h.api.inputs().is_empty() {
        tokio::task::yield_now().await;
    }

    let location = search_box
        .select_place(&Suggestion::new("Amsterdam, Netherlands", "ams-nl"))
        .await
        .unwrap();
    gate.notify_one();

    assert_eq!(location.address, "Amsterdam, Netherlands");
    assert_eq!(pending.await.unwrap(), SearchOutcome::Cancelled);
    assert!(search_box.view().results.is_empty());
    assert_eq!(search_box.current_session(), None);
    assert!(!h.state.cache.has("amst"));
}

#[tokio::test(start_paused = true)]
async fn typing_selecting_and_billing_one_session() {
    let h = harness();
    h.api.respond("Amst", amsterdam());
    let mut events = h.state.sessions.subscribe();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.on_text_change("Am");
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(h.api.inputs().is_empty());
    assert_eq!(search_box.view().phase, SearchPhase::Idle);

    search_box.on_text_change("Ams");
    tokio::time::sleep(Duration::from_millis(300)).await;
    search_box.on_text_change("Amst");
    tokio::time::sleep(Duration::from_millis(900)).await;

    assert_eq!(h.api.inputs(), vec!["Amst"]);
    let view = search_box.view();
    assert_eq!(view.query, "Amst");
    assert_eq!(view.phase, SearchPhase::Fetched);
    assert_eq!(place_ids(&view.results), vec!["ams-nl", "amstelveen-nl"]);
    assert!(h.state.cache.has("amst"));

    // Same text again, after the throttle window: served from cache.
    h.clock.advance(TimeDelta::seconds(2));
    search_box.on_text_change("amst ");
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(h.api.inputs().len(), 1);
    assert_eq!(search_box.view().phase, SearchPhase::Cached);

    let session = search_box.current_session().unwrap();
    let location = search_box
        .select_place(&search_box.view().results[0])
        .await
        .unwrap();
    assert_eq!(location.address, "Amsterdam, Netherlands");
    assert!((location.latitude - 52.3676).abs() < 1e-9);
    assert!((location.longitude - 4.9041).abs() < 1e-9);

    let details = h.api.details_calls.lock().unwrap().clone();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].session_token, Some(session));
    assert_eq!(
        h.api.autocomplete_calls.lock().unwrap()[0].session_token,
        Some(session)
    );

    assert!(search_box.current_session().is_none());
    assert!(h.state.sessions.get_session(&session).is_none());

    let mut bundle = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Completed(b) = event {
            bundle = Some(b);
        }
    }
    let bundle = bundle.unwrap();
    assert_eq!(bundle.session_id, session);
    assert_eq!(bundle.autocomplete_calls.len(), 1);
    assert!((bundle.cost - 0.017).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn short_input_clears_results() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("amst").await;
    assert_eq!(search_box.view().results.len(), 2);

    search_box.on_text_change("am");
    let view = search_box.view();
    assert!(view.results.is_empty());
    assert_eq!(view.phase, SearchPhase::Idle);
}

#[tokio::test]
async fn broken_random_source_disables_the_box() {
    let h = harness_with(Arc::new(BrokenSource));
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    assert_eq!(search_box.search("amst").await, SearchOutcome::Failed);
    assert_eq!(search_box.view().phase, SearchPhase::Disabled);

    h.clock.advance(TimeDelta::seconds(5));
    assert_eq!(search_box.search("amst").await, SearchOutcome::Failed);
    assert!(h.api.inputs().is_empty());
}

#[tokio::test]
async fn zero_results_are_not_cached() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    assert_eq!(
        search_box.search("zzzz").await,
        SearchOutcome::Fetched(Vec::new())
    );
    assert!(!h.state.cache.has("zzzz"));

    h.clock.advance(TimeDelta::seconds(2));
    search_box.search("zzzz").await;
    assert_eq!(h.api.inputs().len(), 2);
}

#[tokio::test]
async fn transport_failure_degrades_to_no_results() {
    let h = harness();
    h.api.fail.store(true, Ordering::SeqCst);
    let search_box = h.state.search_box(SearchBoxOptions::default());

    assert_eq!(search_box.search("amst").await, SearchOutcome::Failed);
    let view = search_box.view();
    assert!(view.results.is_empty());
    assert!(!view.is_loading);
    assert_eq!(view.phase, SearchPhase::Failed);
}

#[tokio::test]
async fn refused_request_degrades_to_no_results() {
    let h = harness();
    h.api.respond(
        "amst",
        AutocompleteResponse::with_status(PlacesStatus::RequestDenied),
    );
    let search_box = h.state.search_box(SearchBoxOptions::default());

    assert_eq!(search_box.search("amst").await, SearchOutcome::Failed);
    assert!(!h.state.cache.has("amst"));
}

#[tokio::test]
async fn searches_in_one_box_share_a_session() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("amst").await;
    let session = search_box.current_session().unwrap();
    h.clock.advance(TimeDelta::seconds(2));
    search_box.search("amste").await;

    assert_eq!(search_box.current_session(), Some(session));
    let record = h.state.sessions.get_session(&session).unwrap();
    let queries: Vec<&str> = record
        .autocomplete_calls
        .iter()
        .map(|c| c.query.as_str())
        .collect();
    assert_eq!(queries, vec!["amst", "amste"]);
}

#[tokio::test]
async fn idle_session_is_replaced_and_swept() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("amst").await;
    let stale = search_box.current_session().unwrap();

    h.clock.advance(TimeDelta::minutes(6));
    search_box.search("amste").await;
    let fresh = search_box.current_session().unwrap();
    assert_ne!(stale, fresh);

    let expired = h.state.sweeper().run_once();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].session_id, stale);
    assert!((expired[0].cost - 0.00283).abs() < 1e-12);
}

#[tokio::test]
async fn clearing_without_results_abandons_the_session() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("zzzz").await;
    let session = search_box.current_session().unwrap();
    search_box.clear_results();

    assert!(search_box.current_session().is_none());
    assert!(h.state.sessions.get_session(&session).is_some());
}

#[tokio::test]
async fn clearing_after_results_keeps_the_session() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.search("amst").await;
    let session = search_box.current_session();
    search_box.clear_results();

    assert_eq!(search_box.current_session(), session);
    assert!(search_box.view().query.is_empty());
}

#[tokio::test]
async fn clear_results_only_keeps_the_query() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    search_box.on_text_change("amst");
    search_box.search("amst").await;
    search_box.clear_results_only();

    let view = search_box.view();
    assert!(view.results.is_empty());
    assert_eq!(view.query, "amst");
}

#[tokio::test]
async fn selecting_without_a_session_still_resolves() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let location = search_box
        .select_place(&Suggestion::new("Amsterdam, Netherlands", "ams-nl"))
        .await
        .unwrap();

    assert_eq!(location.address, "Amsterdam, Netherlands");
    assert_eq!(h.api.details_calls.lock().unwrap()[0].session_token, None);
}

#[tokio::test]
async fn selecting_after_sweep_does_not_bill_twice() {
    let h = harness();
    h.api.respond("amst", amsterdam());
    let search_box = h.state.search_box(SearchBoxOptions::default());

    let results = search_box.search("amst").await.results().to_vec();
    h.clock.advance(TimeDelta::minutes(6));
    assert_eq!(h.state.sweeper().run_once().len(), 1);

    let mut events = h.state.sessions.subscribe();
    assert!(search_box.select_place(&results[0]).await.is_some());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn reference_location_and_country_narrow_the_request() {
    let h = harness();
    let search_box = h.state.search_box(SearchBoxOptions {
        reference_location: Some(GeoPoint::new(52.37, 4.89)),
        country: Some("nl".to_string()),
    });

    search_box.search("dam").await;

    let params = h.api.autocomplete_calls.lock().unwrap()[0].clone();
    let bias = params.location_bias.unwrap();
    assert_eq!(bias.radius_m, 50_000);
    assert!(bias.strict_bounds);
    assert!(bias.bounds.contains(GeoPoint::new(52.37, 4.89)));
    assert_eq!(params.country.as_deref(), Some("nl"));
    assert_eq!(params.types.as_deref(), Some("address"));
    assert_eq!(params.language, "en");
}
