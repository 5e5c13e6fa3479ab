use serde::{Deserialize, Deserializer, Serialize};

use super::{lenient_amount, Id};

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Pending,
    Cancelled,
    Expired,
    Unknown,
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "pending" => SubscriptionStatus::Pending,
            "cancelled" | "canceled" => SubscriptionStatus::Cancelled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(SubscriptionStatus::parse)
            .unwrap_or(SubscriptionStatus::Unknown))
    }
}

/// A user's recurring subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Id,
    #[serde(default = "unknown_status")]
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub next_payment_date: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

fn unknown_status() -> SubscriptionStatus {
    SubscriptionStatus::Unknown
}

/// A plan a bill item can be subscribed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub billing_cycle: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_case_insensitive() {
        assert_eq!(SubscriptionStatus::parse("ACTIVE"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::parse("paused"), SubscriptionStatus::Unknown);
    }

    #[test]
    fn test_subscription_deserialize() {
        let sub: Subscription = serde_json::from_value(json!({
            "id": 12,
            "status": "Active",
            "service_name": "DStv",
            "amount": 4500
        }))
        .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.amount, Some(4500.0));
        assert_eq!(sub.next_payment_date, None);
    }
}
