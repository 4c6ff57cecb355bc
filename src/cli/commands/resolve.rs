use anyhow::bail;

use crate::config::Config;
use crate::services::search::{SearchBoxOptions, SearchOutcome};
use crate::state::PlacesState;

pub async fn cmd_resolve(
    config: Config,
    options: SearchBoxOptions,
    query: &str,
    pick: usize,
) -> anyhow::Result<()> {
    let state = PlacesState::new(config)?;
    let mut events = state.sessions.subscribe();
    let search_box = state.search_box(options);

    let results = match search_box.search(query).await {
        SearchOutcome::Fetched(results) | SearchOutcome::Cached(results) => results,
        SearchOutcome::Failed => bail!("Search for '{query}' failed"),
        SearchOutcome::Throttled | SearchOutcome::Cancelled => bail!("Search for '{query}' did not run"),
    };

    if results.is_empty() {
        println!("No places found matching '{query}'");
        return Ok(());
    }

    super::print_suggestions(&results);

    let Some(choice) = pick.checked_sub(1).and_then(|i| results.get(i)) else {
        bail!("--pick {pick} is out of range (1-{})", results.len());
    };

    println!();
    println!("Resolving: {}", choice.description);

    match search_box.select_place(choice).await {
        Some(location) => {
            println!("  Address:   {}", location.address);
            println!("  Latitude:  {:.6}", location.latitude);
            println!("  Longitude: {:.6}", location.longitude);
        }
        None => println!("  Could not resolve this place"),
    }

    while let Ok(event) = events.try_recv() {
        state.ledger.record(&event);
    }
    let bill = state.ledger.summary();
    println!();
    println!(
        "Billed sessions: {} completed, estimated cost ${:.5}",
        bill.completed_sessions, bill.total_cost
    );

    Ok(())
}
