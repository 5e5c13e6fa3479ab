use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{lenient_amount, Id};

/// A payment gateway the server can route a payment through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub id: Id,
    #[serde(default)]
    pub name: String,
}

/// Outcome of create-payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub reference: String,
    /// Hosted checkout page; when present the user must complete payment there
    #[serde(default)]
    pub payment_url: Option<String>,
}

/// Lifecycle status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Unknown,
}

impl TransactionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => TransactionStatus::Pending,
            "completed" | "successful" | "success" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            "cancelled" | "canceled" => TransactionStatus::Cancelled,
            "expired" => TransactionStatus::Expired,
            _ => TransactionStatus::Unknown,
        }
    }

    /// Value sent as `status_filter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Unknown => "unknown",
        }
    }
}

impl<'de> Deserialize<'de> for TransactionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(TransactionStatus::parse)
            .unwrap_or(TransactionStatus::Unknown))
    }
}

/// A transaction as listed in history. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    /// Biller display name; the server sends either a string or an object
    #[serde(default, deserialize_with = "biller_name")]
    pub biller: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default = "unknown_status")]
    pub status: TransactionStatus,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

fn unknown_status() -> TransactionStatus {
    TransactionStatus::Unknown
}

fn biller_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(map)) => map.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

impl Transaction {
    /// Parse `created_at` (RFC 3339, or a naive timestamp taken as UTC)
    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        })
    }
}

/// One page of transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default = "one")]
    pub total_pages: u32,
}

fn one() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse() {
        assert_eq!(TransactionStatus::parse("Successful"), TransactionStatus::Completed);
        assert_eq!(TransactionStatus::parse("COMPLETED"), TransactionStatus::Completed);
        assert_eq!(TransactionStatus::parse("pending"), TransactionStatus::Pending);
        assert_eq!(TransactionStatus::parse("reversed"), TransactionStatus::Unknown);
    }

    #[test]
    fn test_transaction_lenient_fields() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": 10,
            "biller": {"name": "Ikeja Electric"},
            "amount": "2500.00",
            "status": null,
            "reference": "UPN-10",
            "created_at": "2024-05-01T09:30:00Z"
        }))
        .unwrap();
        assert_eq!(tx.biller.as_deref(), Some("Ikeja Electric"));
        assert_eq!(tx.amount, Some(2500.0));
        assert_eq!(tx.status, TransactionStatus::Unknown);
        assert!(tx.created().is_some());
    }

    #[test]
    fn test_naive_created_at() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": "t1",
            "created_at": "2024-05-01T09:30:00.123456"
        }))
        .unwrap();
        assert_eq!(tx.created().unwrap().timestamp(), 1_714_555_800);
    }

    #[test]
    fn test_page_defaults() {
        let page: TransactionPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.transactions.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_payment_intent_optional_url() {
        let intent: PaymentIntent = serde_json::from_value(json!({"reference": "R1"})).unwrap();
        assert_eq!(intent.payment_url, None);
    }
}
