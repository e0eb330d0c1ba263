pub mod aggregation;
pub mod clock;
pub mod ledger;
pub mod memory_store;
pub mod pricing;
pub mod reward_store;
pub mod rewards;
pub mod sqlite_store;

pub use aggregation::AggregationService;
pub use clock::{fixed_clock, system_clock, Clock};
pub use ledger::{build_ledger_entries, is_balanced};
pub use memory_store::MemoryRewardStore;
pub use pricing::{PriceSource, SimulatedPriceSource};
pub use reward_store::RewardStore;
pub use rewards::RewardService;
pub use sqlite_store::SqliteRewardStore;
