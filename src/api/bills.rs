//! Bill catalogue and customer validation endpoints.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::envelope::{from_payload, list_from_payload};
use super::error::ApiError;
use super::request::ApiRequest;
use crate::session::Session;
use crate::types::{BillPackage, Biller, Category, CustomerDetails, Id};

/// Authorized client for `/bills/*`
#[derive(Clone)]
pub struct BillsApi {
    session: Arc<Session>,
}

impl BillsApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// `GET /bills/bill-categories`
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let payload = self
            .session
            .execute(&ApiRequest::get("bills/bill-categories"))
            .await?;
        list_from_payload(payload)
    }

    /// `GET /bills/billers?category=<slug>`
    pub async fn billers(&self, category_slug: &str) -> Result<Vec<Biller>, ApiError> {
        let request = ApiRequest::get("bills/billers").query("category", category_slug);
        let payload = self.session.execute(&request).await?;
        list_from_payload(payload)
    }

    /// `GET /bills/bill-items/<biller>`
    pub async fn packages(&self, biller_key: &str) -> Result<Vec<BillPackage>, ApiError> {
        let request = ApiRequest::get(format!("bills/bill-items/{}", biller_key));
        let payload = self.session.execute(&request).await?;
        list_from_payload(payload)
    }

    /// `POST /bills/validate-customer`
    pub async fn validate_customer(
        &self,
        biller_id: &Id,
        item_id: &Id,
        customer_id: &str,
    ) -> Result<CustomerDetails, ApiError> {
        debug!(%biller_id, %item_id, "validating customer");
        let request = ApiRequest::post("bills/validate-customer").json(&json!({
            "biller_id": biller_id,
            "item_id": item_id,
            "customer_id": customer_id,
        }))?;
        let payload = self.session.execute(&request).await?;
        if payload.is_null() {
            return Ok(CustomerDetails::default());
        }
        from_payload(payload)
    }
}
