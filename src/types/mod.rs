pub mod ledger;
pub mod portfolio;
pub mod price;
pub mod reward;

pub use ledger::*;
pub use portfolio::*;
pub use price::*;
pub use reward::*;
