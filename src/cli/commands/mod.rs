mod init;
mod interactive;
mod resolve;
mod search;

pub use init::cmd_init;
pub use interactive::cmd_interactive;
pub use resolve::cmd_resolve;
pub use search::cmd_search;

use crate::constants::limits::MAX_DISPLAYED_RESULTS;
use crate::models::Suggestion;

fn print_suggestions(results: &[Suggestion]) {
    if results.is_empty() {
        println!("  No places found");
        return;
    }

    for (i, suggestion) in results.iter().take(MAX_DISPLAYED_RESULTS).enumerate() {
        if suggestion.secondary_text.is_empty() {
            println!("  {:>2}. {}", i + 1, suggestion.main_text);
        } else {
            println!(
                "  {:>2}. {} ({})",
                i + 1,
                suggestion.main_text,
                suggestion.secondary_text
            );
        }
    }
}
