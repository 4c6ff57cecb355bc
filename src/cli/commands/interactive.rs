use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::config::Config;
use crate::services::search::{SearchBox, SearchBoxOptions, SearchPhase, SearchView};
use crate::state::PlacesState;

pub async fn cmd_interactive(
    config: Config,
    options: SearchBoxOptions,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    let state = PlacesState::new(config)?;
    state.start_ledger();

    let sweeper = Arc::new(state.sweeper());
    let sweeper_task = {
        let sweeper = Arc::clone(&sweeper);
        tokio::spawn(async move {
            if let Err(e) = sweeper.start().await {
                error!(error = %e, "Session sweeper stopped");
            }
        })
    };

    let search_box = state.search_box(options);
    let renderer = spawn_renderer(search_box.subscribe());

    println!("Type to search. :N picks a result, :clear, :stats, :metrics, :q to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();

        match line.strip_prefix(':').map(str::trim) {
            Some("q" | "quit") => break,
            Some("clear") => search_box.clear_results(),
            Some("stats") => print_stats(&state),
            Some("metrics") => match &metrics {
                Some(handle) => println!("{}", handle.render()),
                None => println!("Metrics are disabled (observability.metrics_enabled)"),
            },
            Some(cmd) => match cmd.parse::<usize>() {
                Ok(n) => select(&search_box, n).await,
                Err(_) => println!("Unknown command :{cmd}"),
            },
            None => search_box.on_text_change(line),
        }
    }

    search_box.dispose();
    renderer.abort();
    sweeper.stop().await;
    sweeper_task.abort();

    print_stats(&state);
    Ok(())
}

fn spawn_renderer(mut rx: watch::Receiver<SearchView>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_phase = SearchPhase::Idle;

        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            let entered = view.phase != last_phase;
            last_phase = view.phase;

            match view.phase {
                SearchPhase::Cached | SearchPhase::Fetched if entered => {
                    println!("Results for '{}':", view.query.trim());
                    super::print_suggestions(&view.results);
                }
                SearchPhase::Failed if entered => println!("  Search failed, no results"),
                SearchPhase::Disabled if entered => {
                    println!("  Search disabled: secure random source unavailable");
                }
                _ => {}
            }
        }
    })
}

async fn select(search_box: &Arc<SearchBox>, n: usize) {
    let view = search_box.view();
    let Some(choice) = n.checked_sub(1).and_then(|i| view.results.get(i)) else {
        println!("No result #{n}");
        return;
    };

    match search_box.select_place(choice).await {
        Some(location) => println!(
            "  {} -> {:.6}, {:.6}",
            location.address, location.latitude, location.longitude
        ),
        None => println!("  Could not resolve '{}'", choice.description),
    }
    search_box.clear_results();
}

fn print_stats(state: &PlacesState) {
    let cache = state.cache.stats();
    let sessions = state.sessions.stats();
    let bill = state.ledger.summary();

    println!("Cache:    {} entries", cache.size);
    println!(
        "Sessions: {} active, average age {:.0}s",
        sessions.active_sessions, sessions.average_age_seconds
    );
    println!(
        "Billed:   {} completed, {} expired, ~${:.5}",
        bill.completed_sessions, bill.expired_sessions, bill.total_cost
    );
}
