//! Payment, transaction history and subscription endpoints.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::envelope::{from_payload, list_from_payload};
use super::error::ApiError;
use super::request::ApiRequest;
use crate::session::Session;
use crate::types::{
    Id, PaymentGateway, PaymentIntent, Subscription, SubscriptionPlan, TransactionPage,
    TransactionStatus,
};

/// Body of `POST /payments/create-payment`
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrder {
    pub item_id: Id,
    pub payment_gateway_id: Id,
    pub customer_id: String,
    pub amount: f64,
}

/// Query for `GET /payments/transaction-history`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub page: u32,
    pub page_size: u32,
    pub status: Option<TransactionStatus>,
    pub search: Option<String>,
}

impl HistoryQuery {
    pub fn first_page(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            status: None,
            search: None,
        }
    }
}

/// Authorized client for `/payments/*`
#[derive(Clone)]
pub struct PaymentsApi {
    session: Arc<Session>,
}

impl PaymentsApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// `GET /payments/payment-gateways`
    pub async fn gateways(&self) -> Result<Vec<PaymentGateway>, ApiError> {
        let payload = self
            .session
            .execute(&ApiRequest::get("payments/payment-gateways"))
            .await?;
        list_from_payload(payload)
    }

    /// `POST /payments/create-payment`
    pub async fn create_payment(&self, order: &PaymentOrder) -> Result<PaymentIntent, ApiError> {
        debug!(item_id = %order.item_id, gateway = %order.payment_gateway_id, "creating payment");
        let request = ApiRequest::post("payments/create-payment").json(&json!({
            "item_id": order.item_id,
            "payment_gateway_id": order.payment_gateway_id,
            "customer_id": order.customer_id,
            "amount": order.amount,
        }))?;
        let payload = self.session.execute(&request).await?;
        from_payload(payload)
    }

    /// `GET /payments/transaction-history`
    pub async fn transaction_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<TransactionPage, ApiError> {
        let mut request = ApiRequest::get("payments/transaction-history")
            .query("page", query.page)
            .query("page_size", query.page_size);
        if let Some(status) = query.status {
            request = request.query("status_filter", status.as_filter());
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            request = request.query("search", search);
        }

        let payload = self.session.execute(&request).await?;
        if payload.is_null() {
            return Ok(TransactionPage {
                transactions: Vec::new(),
                total_pages: 1,
            });
        }
        from_payload(payload)
    }

    /// `GET /payments/user-subscriptions`
    pub async fn subscriptions(&self) -> Result<Vec<Subscription>, ApiError> {
        let payload = self
            .session
            .execute(&ApiRequest::get("payments/user-subscriptions"))
            .await?;
        list_from_payload(payload)
    }

    /// `GET /payments/subscription-plans`
    pub async fn subscription_plans(&self) -> Result<Vec<SubscriptionPlan>, ApiError> {
        let payload = self
            .session
            .execute(&ApiRequest::get("payments/subscription-plans"))
            .await?;
        list_from_payload(payload)
    }

    /// `POST /payments/create-subscription`
    pub async fn create_subscription(
        &self,
        bill_item_id: &Id,
        plan_id: &Id,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::post("payments/create-subscription").json(&json!({
            "bill_item_id": bill_item_id,
            "plan_id": plan_id,
        }))?;
        self.session.execute(&request).await
    }

    /// `POST /payments/cancel-subscription/<id>`
    pub async fn cancel_subscription(&self, id: &Id) -> Result<Value, ApiError> {
        let request = ApiRequest::post(format!("payments/cancel-subscription/{}", id));
        self.session.execute(&request).await
    }

    /// `POST /payments/reactivate-subscription/<id>`
    pub async fn reactivate_subscription(&self, id: &Id) -> Result<Value, ApiError> {
        let request = ApiRequest::post(format!("payments/reactivate-subscription/{}", id));
        self.session.execute(&request).await
    }
}
