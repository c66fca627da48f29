pub mod inventory;
pub mod loyalty;
pub mod reviews;
pub mod rewards;
pub mod sweeper;
pub mod transactions;

pub use reviews::ReviewService;
pub use rewards::RewardsService;
pub use sweeper::Sweeper;
pub use transactions::TransactionService;
