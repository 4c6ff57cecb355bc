//! CLI module - command-line front end for the places search layer.

mod commands;

use clap::{Args, Parser, Subcommand};

use crate::models::GeoPoint;
use crate::services::search::SearchBoxOptions;

/// Bazaar Places - cached, session-bundled place search
#[derive(Parser)]
#[command(name = "bazaar-places")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub bias: BiasArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where and in which country to look.
#[derive(Args, Debug, Clone, Default)]
pub struct BiasArgs {
    /// Latitude of the reference location
    #[arg(long, global = true, allow_negative_numbers = true, requires = "lng")]
    pub lat: Option<f64>,

    /// Longitude of the reference location
    #[arg(long, global = true, allow_negative_numbers = true, requires = "lat")]
    pub lng: Option<f64>,

    /// Two-letter country code to restrict results to
    #[arg(long, global = true)]
    pub country: Option<String>,
}

impl BiasArgs {
    #[must_use]
    pub fn search_options(&self) -> SearchBoxOptions {
        let reference_location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };

        SearchBoxOptions {
            reference_location,
            country: self.country.as_ref().map(|c| c.to_lowercase()),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Look up suggestions for a query
    #[command(alias = "s")]
    Search {
        /// Search text
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Search, then resolve one suggestion to coordinates
    #[command(alias = "r")]
    Resolve {
        /// Search text
        #[arg(required = true)]
        query: Vec<String>,

        /// Which suggestion to resolve (1-based)
        #[arg(long, default_value_t = 1)]
        pick: usize,
    },

    /// Line-driven search box on stdin
    #[command(alias = "i")]
    Interactive,

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
