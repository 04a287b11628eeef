pub mod store;
pub use store::{LedgerStore, SharedLedger};
pub mod ledger_repo;
pub use ledger_repo::LedgerRepository;
