use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient_amount, Id};

/// A bill category (electricity, cable TV, airtime, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

/// A biller within a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biller {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub biller_code: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Biller {
    /// Path segment used to list this biller's packages
    pub fn package_key(&self) -> String {
        self.biller_code
            .clone()
            .or_else(|| self.slug.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A purchasable bill item / service package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillPackage {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
}

impl BillPackage {
    /// Price fixed by the package; zero counts as "no fixed price"
    pub fn fixed_amount(&self) -> Option<f64> {
        self.amount.filter(|a| *a != 0.0)
    }
}

/// Account metadata returned by customer validation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a successful verification step
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCustomer {
    pub account_number: String,
    /// Resolved amount: the package price when fixed, else the entered amount
    pub amount: f64,
    pub details: CustomerDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_biller_package_key_prefers_code() {
        let biller: Biller = serde_json::from_value(json!({
            "id": 4, "name": "Ikeja Electric", "biller_code": "IKEDC", "slug": "ikeja"
        }))
        .unwrap();
        assert_eq!(biller.package_key(), "IKEDC");

        let biller: Biller =
            serde_json::from_value(json!({"id": 4, "name": "Ikeja", "slug": "ikeja"})).unwrap();
        assert_eq!(biller.package_key(), "ikeja");

        let biller: Biller = serde_json::from_value(json!({"id": 4, "name": "Ikeja"})).unwrap();
        assert_eq!(biller.package_key(), "4");
    }

    #[test]
    fn test_package_fixed_amount() {
        let pkg: BillPackage =
            serde_json::from_value(json!({"id": 1, "name": "Prepaid", "amount": 0})).unwrap();
        assert_eq!(pkg.fixed_amount(), None);

        let pkg: BillPackage =
            serde_json::from_value(json!({"id": 1, "name": "DStv Compact", "amount": "1500"}))
                .unwrap();
        assert_eq!(pkg.fixed_amount(), Some(1500.0));
    }

    #[test]
    fn test_customer_details_keeps_extra_fields() {
        let details: CustomerDetails = serde_json::from_value(json!({
            "customer_name": "ADA LOVELACE",
            "meter_type": "prepaid"
        }))
        .unwrap();
        assert_eq!(details.customer_name.as_deref(), Some("ADA LOVELACE"));
        assert_eq!(details.extra.get("meter_type"), Some(&json!("prepaid")));
    }
}
