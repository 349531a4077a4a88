// Application state shared by every handler

use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineResult;
use crate::ledger::Ledger;
use crate::odds::OddsCatalog;
use crate::promotions::{PromotionBook, PromotionSource};
use crate::settlement::SettlementEngine;
use crate::slips::{AcceptanceEngine, SlipBook, SlipBuilder};
use crate::store::Store;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub ledger: Ledger,
    pub catalog: OddsCatalog,
    /// Local mirror of the promotions feed; also the source the builder reads
    pub promotions: PromotionBook,
    pub slips: SlipBook,
    pub acceptance: AcceptanceEngine,
    pub settlement: SettlementEngine,
}

impl AppState {
    /// Wire every component over one store. Components share the store's
    /// trees; none of them holds in-memory state of its own.
    pub fn new(config: Config, store: Store) -> Self {
        let timeout = config.txn_timeout;
        let ledger = Ledger::new(store.clone(), timeout);
        let catalog = OddsCatalog::new(store.clone(), timeout);
        let promotions = PromotionBook::new(store.clone());
        let source: Arc<dyn PromotionSource> = Arc::new(promotions.clone());
        let builder = SlipBuilder::new(catalog.clone(), source, &config);

        Self {
            acceptance: AcceptanceEngine::new(store.clone(), builder, timeout),
            settlement: SettlementEngine::new(store.clone(), catalog.clone(), timeout),
            slips: SlipBook::new(store.clone()),
            ledger,
            catalog,
            promotions,
            store,
            config,
        }
    }

    /// Open the database at `config.db_path`.
    pub fn open(config: Config) -> EngineResult<Self> {
        let store = Store::open(&config.db_path, config.txn_max_attempts)?;
        tracing::info!(path = %config.db_path, "database opened");
        Ok(Self::new(config, store))
    }

    /// Throwaway database; used by tests and local experiments.
    pub fn temporary(config: Config) -> EngineResult<Self> {
        Ok(Self::new(config, Store::temporary()?))
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
