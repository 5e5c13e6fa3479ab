//! Recurring subscriptions: list, plans, create, cancel, reactivate.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::payments::PaymentsApi;
use crate::session::Session;
use crate::types::{Id, Subscription, SubscriptionPlan, SubscriptionStatus};

const LOAD_FAILED: &str = "Failed to load subscriptions. Please try again.";
const PLANS_FAILED: &str = "Failed to load subscription plans. Please try again.";
const CREATE_FAILED: &str = "Failed to create subscription. Please try again.";
const CANCEL_FAILED: &str = "Failed to cancel subscription. Please try again.";
const REACTIVATE_FAILED: &str = "Failed to reactivate subscription. Please try again.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionsState {
    pub subscriptions: Vec<Subscription>,
    pub plans: Vec<SubscriptionPlan>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SubscriptionsState {
    pub fn find(&self, id: &Id) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| &s.id == id)
    }
}

/// Controller behind the subscriptions screen
pub struct Subscriptions {
    payments: PaymentsApi,
    state: watch::Sender<SubscriptionsState>,
}

impl Subscriptions {
    pub fn new(session: Arc<Session>) -> Self {
        let (state, _) = watch::channel(SubscriptionsState::default());
        Self {
            payments: PaymentsApi::new(session),
            state,
        }
    }

    pub fn state(&self) -> SubscriptionsState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubscriptionsState> {
        self.state.subscribe()
    }

    fn start(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn fail(&self, err: &ApiError, fallback: &str) {
        warn!(error = %err, "{}", fallback);
        let message = err.user_message(fallback);
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    /// Load the user's subscriptions. A failure empties the list.
    pub async fn load(&self) -> Result<(), ApiError> {
        self.start();
        match self.payments.subscriptions().await {
            Ok(list) => {
                self.state.send_modify(|s| {
                    s.subscriptions = list;
                    s.loading = false;
                });
                Ok(())
            }
            Err(err) => {
                self.fail(&err, LOAD_FAILED);
                self.state.send_modify(|s| s.subscriptions.clear());
                Err(err)
            }
        }
    }

    pub async fn load_plans(&self) -> Result<(), ApiError> {
        self.start();
        match self.payments.subscription_plans().await {
            Ok(plans) => {
                self.state.send_modify(|s| {
                    s.plans = plans;
                    s.loading = false;
                });
                Ok(())
            }
            Err(err) => {
                self.fail(&err, PLANS_FAILED);
                Err(err)
            }
        }
    }

    /// Subscribe to `plan_id` for a bill item, then reload the list
    pub async fn create(&self, bill_item_id: &Id, plan_id: &Id) -> Result<(), ApiError> {
        self.start();
        if let Err(err) = self.payments.create_subscription(bill_item_id, plan_id).await {
            self.fail(&err, CREATE_FAILED);
            return Err(err);
        }
        info!(%bill_item_id, %plan_id, "subscription created");
        self.load().await
    }

    /// Cancel an active subscription.
    ///
    /// The local copy is marked cancelled as soon as the server accepts the
    /// request; there is no follow-up read to confirm it.
    pub async fn cancel(&self, id: &Id) -> Result<(), ApiError> {
        let status = self.state.borrow().find(id).map(|s| s.status);
        match status {
            Some(SubscriptionStatus::Active) => {}
            Some(_) => {
                let err = ApiError::validation(
                    "subscription",
                    "Only active subscriptions can be cancelled",
                );
                self.state
                    .send_modify(|s| s.error = Some(err.user_message(CANCEL_FAILED)));
                return Err(err);
            }
            None => {
                let err = ApiError::validation("subscription", "Subscription not found");
                self.state
                    .send_modify(|s| s.error = Some(err.user_message(CANCEL_FAILED)));
                return Err(err);
            }
        }

        self.start();
        if let Err(err) = self.payments.cancel_subscription(id).await {
            self.fail(&err, CANCEL_FAILED);
            return Err(err);
        }
        self.state.send_modify(|s| {
            if let Some(sub) = s.subscriptions.iter_mut().find(|sub| &sub.id == id) {
                sub.status = SubscriptionStatus::Cancelled;
            }
            s.loading = false;
        });
        info!(%id, "subscription cancelled");
        Ok(())
    }

    /// Reactivate a cancelled subscription, then reload the list
    pub async fn reactivate(&self, id: &Id) -> Result<(), ApiError> {
        self.start();
        if let Err(err) = self.payments.reactivate_subscription(id).await {
            self.fail(&err, REACTIVATE_FAILED);
            return Err(err);
        }
        info!(%id, "subscription reactivated");
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::request::Method;
    use crate::session::store::{MemorySecureStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use serde_json::json;

    fn controller(mock: &MockTransport) -> Subscriptions {
        let store = MemorySecureStore::new();
        store
            .seed(ACCESS_TOKEN_KEY, "acc-1")
            .seed(REFRESH_TOKEN_KEY, "ref-1");
        let session = Arc::new(Session::new(Arc::new(mock.clone()), Arc::new(store)));
        session.restore();
        Subscriptions::new(session)
    }

    fn listing() -> serde_json::Value {
        json!({"status": "success", "data": [
            {"id": 1, "status": "active", "service_name": "DStv", "amount": "4500"},
            {"id": 2, "status": "cancelled", "service_name": "GOtv", "amount": 2500}
        ]})
    }

    #[tokio::test]
    async fn test_cancel_marks_local_copy() {
        let mock = MockTransport::new();
        mock.enqueue_json(Method::Get, "payments/user-subscriptions", 200, listing());
        mock.enqueue_json(
            Method::Post,
            "payments/cancel-subscription/1",
            200,
            json!({"status": "success"}),
        );
        let subs = controller(&mock);
        subs.load().await.unwrap();

        subs.cancel(&Id::Num(1)).await.unwrap();
        let state = subs.state();
        assert_eq!(
            state.find(&Id::Num(1)).unwrap().status,
            SubscriptionStatus::Cancelled
        );
        // No re-fetch after cancel
        assert_eq!(mock.call_count("payments/user-subscriptions"), 1);
    }

    #[tokio::test]
    async fn test_cancel_requires_active() {
        let mock = MockTransport::new();
        mock.enqueue_json(Method::Get, "payments/user-subscriptions", 200, listing());
        let subs = controller(&mock);
        subs.load().await.unwrap();

        let err = subs.cancel(&Id::Num(2)).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(mock.call_count("payments/cancel-subscription/2"), 0);
    }

    #[tokio::test]
    async fn test_cancel_failure_keeps_status() {
        let mock = MockTransport::new();
        mock.enqueue_json(Method::Get, "payments/user-subscriptions", 200, listing());
        mock.enqueue_json(
            Method::Post,
            "payments/cancel-subscription/1",
            400,
            json!({"status": "fail", "message": "Already processing"}),
        );
        let subs = controller(&mock);
        subs.load().await.unwrap();

        assert!(subs.cancel(&Id::Num(1)).await.is_err());
        let state = subs.state();
        assert_eq!(
            state.find(&Id::Num(1)).unwrap().status,
            SubscriptionStatus::Active
        );
        assert_eq!(state.error.as_deref(), Some("Already processing"));
    }

    #[tokio::test]
    async fn test_load_failure_empties_list() {
        let mock = MockTransport::new();
        mock.enqueue_json(Method::Get, "payments/user-subscriptions", 200, listing());
        mock.enqueue_transport_error(Method::Get, "payments/user-subscriptions", "offline");
        let subs = controller(&mock);
        subs.load().await.unwrap();

        assert!(subs.load().await.is_err());
        let state = subs.state();
        assert!(state.subscriptions.is_empty());
        assert_eq!(state.error.as_deref(), Some(LOAD_FAILED));
    }

    #[tokio::test]
    async fn test_create_reloads() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "payments/create-subscription",
            200,
            json!({"status": "success", "data": {"id": 3}}),
        );
        mock.enqueue_json(Method::Get, "payments/user-subscriptions", 200, listing());
        let subs = controller(&mock);

        subs.create(&Id::Num(17), &Id::Num(2)).await.unwrap();
        assert_eq!(subs.state().subscriptions.len(), 2);
        assert_eq!(
            mock.calls_to("payments/create-subscription")[0].body,
            Some(json!({"bill_item_id": 17, "plan_id": 2}))
        );
    }
}
