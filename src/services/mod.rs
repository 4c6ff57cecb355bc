pub mod billing;
pub use billing::{BillingLedger, LedgerSummary};

pub mod places_cache;
pub use places_cache::{CacheStats, QueryCache};

pub mod scheduler;
pub use scheduler::SessionSweeper;

pub mod search;
pub use search::{SearchBox, SearchBoxOptions, SearchOutcome, SearchPhase, SearchView};

pub mod session_tokens;
pub use session_tokens::{
    BundledRequest, ExpiredSession, OsTokenSource, SessionError, SessionTokenManager, TokenSource,
};
