//! Wire and domain types for the bill-payment service.
//!
//! The server is the source of truth for every type here; the client only
//! mirrors what it returns.

mod bills;
mod payment;
mod subscription;
mod user;

pub use bills::{BillPackage, Biller, Category, CustomerDetails, VerifiedCustomer};
pub use payment::{PaymentGateway, PaymentIntent, Transaction, TransactionPage, TransactionStatus};
pub use subscription::{Subscription, SubscriptionPlan, SubscriptionStatus};
pub use user::{Credentials, Profile, SessionUser};

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-side identifier, numeric or textual depending on the endpoint.
///
/// The original JSON form is preserved so it round-trips unchanged into
/// request bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{}", n),
            Id::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

/// Accepts `1500`, `1500.5`, `"1500.00"` or `null` for money fields
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}
