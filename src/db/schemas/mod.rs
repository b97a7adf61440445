//! Document schemas for Granary collections

pub mod cycle_log;
pub mod ledger;
pub mod metadata;
pub mod poll;
pub mod project;
pub mod silo;
pub mod vote;
pub mod wallet;

pub use cycle_log::{
    CompostLogDoc, CycleDoc, RedistributionLogDoc, RunSource, COMPOST_LOG_COLLECTION,
    CYCLE_COLLECTION, REDISTRIBUTION_LOG_COLLECTION,
};
pub use ledger::{EntryKind, LedgerEntryDoc, LEDGER_COLLECTION};
pub use metadata::Metadata;
pub use poll::{PollDoc, PollOption, POLL_COLLECTION};
pub use project::{ProjectDoc, PROJECT_COLLECTION};
pub use silo::{SiloDoc, SILO_COLLECTION, SILO_SINGLETON_KEY};
pub use vote::{Allocation, VoteDoc, VOTE_COLLECTION};
pub use wallet::{WalletDoc, WALLET_COLLECTION};

/// Epoch placeholder for `Default` impls of documents whose timestamps are
/// always overwritten before insertion
pub(crate) fn epoch() -> bson::DateTime {
    bson::DateTime::from_millis(0)
}
