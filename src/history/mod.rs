//! Read-mostly screens backed by the payments API: transaction history, the
//! dashboard's recent activity and recurring subscriptions.

pub mod subscriptions;
pub mod transactions;

pub use subscriptions::{Subscriptions, SubscriptionsState};
pub use transactions::{recent_transactions, HistoryState, TransactionHistory, RECENT_LIMIT};
