//! Anti-replay bookkeeping for single-use security artifacts.

pub mod ledger;

pub use ledger::{ReplayLedger, ReplayScope};
