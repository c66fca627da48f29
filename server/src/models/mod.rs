pub mod event;
pub mod notification;
pub mod prize;
pub mod review;
pub mod transaction;
pub mod user;
pub mod voucher;

pub use event::Event;
pub use notification::Notification;
pub use prize::Prize;
pub use review::{NewReview, Review};
pub use transaction::{NewTransaction, Transaction, TransactionStatus};
pub use user::{NewUser, User};
pub use voucher::{NewVoucher, Voucher};
