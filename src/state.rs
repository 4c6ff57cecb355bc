use std::sync::Arc;
use tokio::sync::broadcast;

use crate::clients::{PlacesApi, PlacesClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::services::billing::BillingLedger;
use crate::services::places_cache::QueryCache;
use crate::services::scheduler::SessionSweeper;
use crate::services::search::{SearchBox, SearchBoxOptions, SearchSettings};
use crate::services::session_tokens::{OsTokenSource, SessionTokenManager, TokenSource};

/// Everything one process shares between its search boxes.
#[derive(Clone)]
pub struct PlacesState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub api: Arc<dyn PlacesApi>,
    pub cache: Arc<QueryCache>,
    pub sessions: Arc<SessionTokenManager>,
    pub ledger: Arc<BillingLedger>,
}

impl PlacesState {
    /// Production wiring: reqwest client, system clock, OS randomness.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let api = Arc::new(PlacesClient::new(&config.places)?);
        Ok(Self::with_parts(
            config,
            api,
            Arc::new(SystemClock),
            Arc::new(OsTokenSource),
        ))
    }

    #[must_use]
    pub fn with_parts(
        config: Config,
        api: Arc<dyn PlacesApi>,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size.max(1));

        let cache = Arc::new(QueryCache::new(&config.cache, Arc::clone(&clock)));
        let sessions = Arc::new(SessionTokenManager::new(
            &config.session,
            config.pricing,
            Arc::clone(&clock),
            tokens,
            event_bus,
        ));

        Self {
            config,
            clock,
            api,
            cache,
            sessions,
            ledger: Arc::new(BillingLedger::new()),
        }
    }

    /// Feeds session events into the ledger from now on.
    pub fn start_ledger(&self) {
        Arc::clone(&self.ledger).start_listener(self.sessions.subscribe());
    }

    #[must_use]
    pub fn sweeper(&self) -> SessionSweeper {
        SessionSweeper::new(Arc::clone(&self.sessions), self.config.session.clone())
    }

    #[must_use]
    pub fn search_box(&self, options: SearchBoxOptions) -> Arc<SearchBox> {
        Arc::new(SearchBox::new(
            Arc::clone(&self.api),
            Arc::clone(&self.cache),
            Arc::clone(&self.sessions),
            Arc::clone(&self.clock),
            SearchSettings::from_config(&self.config),
            options,
        ))
    }
}
