use crate::config::Config;
use crate::services::search::{SearchBoxOptions, SearchOutcome};
use crate::state::PlacesState;

pub async fn cmd_search(config: Config, options: SearchBoxOptions, query: &str) -> anyhow::Result<()> {
    println!("Searching for: {query}");

    let state = PlacesState::new(config)?;
    let search_box = state.search_box(options);

    match search_box.search(query).await {
        SearchOutcome::Fetched(results) | SearchOutcome::Cached(results) => {
            super::print_suggestions(&results);
        }
        SearchOutcome::Failed => {
            println!("Search failed, see the log for details");
            return Ok(());
        }
        SearchOutcome::Throttled | SearchOutcome::Cancelled => return Ok(()),
    }

    if let Some(session) = search_box
        .current_session()
        .and_then(|id| state.sessions.get_session(&id))
    {
        println!();
        println!(
            "Session {} left open: {} autocomplete call(s), ~${:.5} if abandoned",
            session.id,
            session.autocomplete_calls.len(),
            state.sessions.cost(&session, false)
        );
    }

    Ok(())
}
