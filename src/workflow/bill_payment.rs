//! The bill-payment workflow controller.
//!
//! State lives in a `watch` channel and is only mutated through
//! `send_modify`, never across an await. Every fetch takes a generation number
//! when it starts; a result whose generation is no longer current belongs to a
//! superseded selection (or an abandoned step) and is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::redirect::{BrowserDecision, CallbackMatcher};
use super::state::{Fetch, WorkflowState, WorkflowStep};
use crate::api::bills::BillsApi;
use crate::api::error::ApiError;
use crate::api::payments::{PaymentOrder, PaymentsApi};
use crate::config::WorkflowConfig;
use crate::session::{Navigation, Session};
use crate::types::{BillPackage, Biller, Category, Id, PaymentGateway, VerifiedCustomer};
use crate::validation;

const CATEGORIES_FAILED: &str = "Failed to load bill categories. Please try again.";
const GATEWAYS_FAILED: &str = "Failed to load payment gateways. Please try again.";
const BILLERS_FAILED: &str = "Failed to load billers. Please try again.";
const PACKAGES_FAILED: &str = "Failed to load service packages. Please try again.";
const VERIFY_FAILED: &str = "Failed to verify customer details. Please check and try again.";
const PAYMENT_FAILED: &str = "Payment failed. Please try again later.";

/// Drives category -> biller -> package -> verification -> payment
pub struct BillPaymentWorkflow {
    session: Arc<Session>,
    bills: BillsApi,
    payments: PaymentsApi,
    matcher: CallbackMatcher,
    settle: Duration,
    default_gateway_id: i64,
    state: watch::Sender<WorkflowState>,
    generations: [AtomicU64; 6],
}

impl BillPaymentWorkflow {
    pub fn new(session: Arc<Session>, config: &WorkflowConfig) -> Self {
        let (state, _) = watch::channel(WorkflowState::default());
        Self {
            bills: BillsApi::new(Arc::clone(&session)),
            payments: PaymentsApi::new(Arc::clone(&session)),
            session,
            matcher: CallbackMatcher::from_config(config),
            settle: config.redirect_settle(),
            default_gateway_id: config.default_gateway_id,
            state,
            generations: Default::default(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn step(&self) -> WorkflowStep {
        self.state.borrow().step
    }

    fn update(&self, f: impl FnOnce(&mut WorkflowState)) {
        self.state.send_modify(f);
    }

    // ─── Fetch bookkeeping ────────────────────────────────────────────────

    fn begin(&self, fetch: Fetch) -> u64 {
        let generation = self.generations[fetch.index()].fetch_add(1, Ordering::SeqCst) + 1;
        self.update(|s| {
            s.loading.set(fetch, true);
            s.error = None;
        });
        generation
    }

    /// Like `begin`, but refuses while the same fetch is still in flight.
    /// The flag is tested and set in one `send_modify`.
    fn begin_exclusive(&self, fetch: Fetch) -> Option<u64> {
        let mut generation = None;
        self.update(|s| {
            if s.loading.is(fetch) {
                return;
            }
            let next = self.generations[fetch.index()].fetch_add(1, Ordering::SeqCst) + 1;
            generation = Some(next);
            s.loading.set(fetch, true);
            s.error = None;
        });
        if generation.is_none() {
            debug!(?fetch, "already in flight, ignoring duplicate submit");
        }
        generation
    }

    fn abandon(&self, fetch: Fetch) {
        self.generations[fetch.index()].fetch_add(1, Ordering::SeqCst);
        self.update(|s| s.loading.set(fetch, false));
    }

    fn is_current(&self, fetch: Fetch, generation: u64) -> bool {
        let current = self.generations[fetch.index()].load(Ordering::SeqCst) == generation;
        if !current {
            debug!(?fetch, "discarding stale result");
        }
        current
    }

    /// Apply a fetch result: on success `apply` updates the state, on failure
    /// the error message is recorded and existing data is left alone.
    fn finish<T>(
        &self,
        fetch: Fetch,
        result: Result<T, ApiError>,
        fallback: &str,
        apply: impl FnOnce(&mut WorkflowState, T),
    ) -> Result<(), ApiError> {
        match result {
            Ok(value) => {
                self.update(|s| {
                    s.loading.set(fetch, false);
                    apply(s, value);
                });
                Ok(())
            }
            Err(err) => {
                warn!(?fetch, error = %err, "workflow request failed");
                let message = err.user_message(fallback);
                self.update(|s| {
                    s.loading.set(fetch, false);
                    s.error = Some(message);
                });
                Err(err)
            }
        }
    }

    /// Record a local failure without touching anything else
    fn reject(&self, err: ApiError) -> Result<(), ApiError> {
        let message = err.user_message(&err.to_string());
        self.update(|s| s.error = Some(message));
        Err(err)
    }

    fn ensure_step(&self, expected: WorkflowStep) -> Result<(), ApiError> {
        let step = self.step();
        if step != expected {
            return self.reject(ApiError::validation(
                "step",
                format!(
                    "Not available at step {} (expected step {})",
                    step.number(),
                    expected.number()
                ),
            ));
        }
        Ok(())
    }

    // ─── Step 1: selection ────────────────────────────────────────────────

    /// Load categories and gateways on entry, skipping lists already loaded
    pub async fn enter(&self) -> Result<(), ApiError> {
        let (need_categories, need_gateways) = {
            let s = self.state.borrow();
            (
                s.categories.is_empty() && !s.loading.categories,
                s.gateways.is_empty() && !s.loading.gateways,
            )
        };

        let (categories, gateways) = tokio::join!(
            async {
                match need_categories {
                    true => self.load_categories().await,
                    false => Ok(()),
                }
            },
            async {
                match need_gateways {
                    true => self.load_gateways().await,
                    false => Ok(()),
                }
            }
        );
        categories.and(gateways)
    }

    pub async fn load_categories(&self) -> Result<(), ApiError> {
        let generation = self.begin(Fetch::Categories);
        let result = self.bills.categories().await;
        if !self.is_current(Fetch::Categories, generation) {
            return Ok(());
        }
        self.finish(Fetch::Categories, result, CATEGORIES_FAILED, |s, list| {
            s.categories = list
        })
    }

    pub async fn load_gateways(&self) -> Result<(), ApiError> {
        let generation = self.begin(Fetch::Gateways);
        let result = self.payments.gateways().await;
        if !self.is_current(Fetch::Gateways, generation) {
            return Ok(());
        }
        self.finish(Fetch::Gateways, result, GATEWAYS_FAILED, |s, list| {
            s.gateways = list
        })
    }

    /// Choose a category and load its billers.
    ///
    /// A different category clears the biller and package lists and every
    /// downstream selection. Re-choosing the current one keeps them.
    pub async fn select_category(&self, category: Category) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Selection)?;

        let mut changed = false;
        self.update(|s| {
            changed = s.selection.set_category(category.clone());
            if changed {
                s.billers.clear();
                s.packages.clear();
            }
        });

        if changed {
            // Package results for the old biller are now meaningless
            self.abandon(Fetch::Packages);
        } else {
            let s = self.state.borrow();
            if !s.billers.is_empty() || s.loading.billers {
                return Ok(());
            }
        }

        let slug = if category.slug.is_empty() {
            category.id.to_string()
        } else {
            category.slug.clone()
        };
        info!(category = %category.name, "category selected");

        let generation = self.begin(Fetch::Billers);
        let result = self.bills.billers(&slug).await;
        if !self.is_current(Fetch::Billers, generation) {
            return Ok(());
        }
        self.finish(Fetch::Billers, result, BILLERS_FAILED, |s, list| {
            s.billers = list
        })
    }

    /// Choose a biller and load its packages
    pub async fn select_biller(&self, biller: Biller) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Selection)?;

        let mut outcome = None;
        self.update(|s| {
            outcome = s.selection.set_biller(biller.clone());
            if outcome == Some(true) {
                s.packages.clear();
            }
        });

        match outcome {
            None => {
                return self.reject(ApiError::validation(
                    "category",
                    "Please select a category first",
                ))
            }
            Some(false) => {
                let s = self.state.borrow();
                if !s.packages.is_empty() || s.loading.packages {
                    return Ok(());
                }
            }
            Some(true) => {}
        }
        info!(biller = %biller.name, "biller selected");

        let generation = self.begin(Fetch::Packages);
        let result = self.bills.packages(&biller.package_key()).await;
        if !self.is_current(Fetch::Packages, generation) {
            return Ok(());
        }
        self.finish(Fetch::Packages, result, PACKAGES_FAILED, |s, list| {
            s.packages = list
        })
    }

    pub fn select_package(&self, package: BillPackage) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Selection)?;

        let mut outcome = None;
        self.update(|s| outcome = s.selection.set_package(package));
        match outcome {
            Some(_) => Ok(()),
            None => self.reject(ApiError::validation("biller", "Please select a biller first")),
        }
    }

    /// Move from selection to verification; needs a package
    pub fn proceed_to_verification(&self) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Selection)?;
        if self.state.borrow().selection.package().is_none() {
            return self.reject(ApiError::validation("package", "Please select a package"));
        }
        self.update(|s| {
            s.step = WorkflowStep::Verification;
            s.error = None;
        });
        Ok(())
    }

    // ─── Step 2: verification ─────────────────────────────────────────────

    pub fn set_account_number(&self, account_number: impl Into<String>) {
        let account_number = account_number.into();
        self.update(|s| s.account_number = account_number);
    }

    pub fn set_manual_amount(&self, amount: impl Into<String>) {
        let amount = amount.into();
        self.update(|s| s.manual_amount = amount);
    }

    /// Verify the customer account and move to review.
    ///
    /// Field checks run first and make no network call. On failure the
    /// workflow stays at verification with nothing but the error changed.
    pub async fn verify_customer(&self) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Verification)?;

        let (biller, package, account_number, manual_raw) = {
            let s = self.state.borrow();
            (
                s.selection.biller().cloned(),
                s.selection.package().cloned(),
                s.account_number.trim().to_string(),
                s.manual_amount.clone(),
            )
        };
        let (Some(biller), Some(package)) = (biller, package) else {
            return self.reject(ApiError::validation("package", "Please select a package"));
        };

        if let Err(e) = validation::validate_account_number(&account_number) {
            return self.reject(e);
        }
        let fixed = package.fixed_amount();
        let amount = match fixed {
            Some(fixed) => {
                if let Ok(manual) = manual_raw.trim().parse::<f64>() {
                    if manual != fixed {
                        warn!(fixed, manual, "package price overrides entered amount");
                    }
                }
                fixed
            }
            None => match validation::parse_manual_amount(&manual_raw) {
                Ok(amount) => amount,
                Err(e) => return self.reject(e),
            },
        };

        let Some(generation) = self.begin_exclusive(Fetch::Verify) else {
            return Err(ApiError::validation(
                "customer",
                "Verification is already in progress",
            ));
        };
        let result = self
            .bills
            .validate_customer(&biller.id, &package.id, &account_number)
            .await;
        if !self.is_current(Fetch::Verify, generation) {
            return Ok(());
        }

        let preferred = self.preferred_gateway();
        self.finish(Fetch::Verify, result, VERIFY_FAILED, |s, details| {
            let customer = VerifiedCustomer {
                account_number,
                amount,
                details,
            };
            if s.selection.set_customer(customer).is_none() {
                warn!("package cleared during verification");
                return;
            }
            let gateway = s.gateways.first().cloned().unwrap_or(preferred);
            s.selection.set_gateway(gateway);
            s.step = WorkflowStep::Review;
        })?;
        info!(amount, "customer verified");
        Ok(())
    }

    /// Stand-in gateway for when the server lists none
    fn preferred_gateway(&self) -> PaymentGateway {
        PaymentGateway {
            id: Id::Num(self.default_gateway_id),
            name: "Default gateway".to_string(),
        }
    }

    // ─── Step 3: review ───────────────────────────────────────────────────

    pub fn select_gateway(&self, gateway: PaymentGateway) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Review)?;
        let mut outcome = None;
        self.update(|s| outcome = s.selection.set_gateway(gateway));
        match outcome {
            Some(()) => Ok(()),
            None => self.reject(ApiError::validation(
                "customer",
                "Please verify the customer first",
            )),
        }
    }

    /// Create the payment.
    ///
    /// With a payment URL the workflow moves to the external redirect step;
    /// without one the payment is already complete. A second call while one
    /// is in flight fails without a request and leaves the state alone.
    pub async fn confirm_payment(&self) -> Result<(), ApiError> {
        self.ensure_step(WorkflowStep::Review)?;

        let order = {
            let s = self.state.borrow();
            match (s.selection.package(), s.selection.customer()) {
                (Some(package), Some(customer)) => Some(PaymentOrder {
                    item_id: package.id.clone(),
                    payment_gateway_id: s
                        .selection
                        .gateway()
                        .map(|g| g.id.clone())
                        .unwrap_or(Id::Num(self.default_gateway_id)),
                    customer_id: customer.account_number.clone(),
                    amount: customer.amount,
                }),
                _ => None,
            }
        };
        let Some(order) = order else {
            return self.reject(ApiError::validation(
                "customer",
                "Please verify the customer first",
            ));
        };

        let Some(generation) = self.begin_exclusive(Fetch::Pay) else {
            return Err(ApiError::validation(
                "payment",
                "Payment is already being processed",
            ));
        };
        let result = self
            .payments
            .create_payment(&order)
            .await
            .and_then(|intent| match intent.reference.trim().is_empty() {
                true => Err(ApiError::transport("Payment response has no reference")),
                false => Ok(intent),
            });
        if !self.is_current(Fetch::Pay, generation) {
            return Ok(());
        }

        self.finish(Fetch::Pay, result, PAYMENT_FAILED, |s, intent| {
            info!(reference = %intent.reference, redirect = intent.payment_url.is_some(), "payment created");
            s.transaction_reference = Some(intent.reference);
            match intent.payment_url.filter(|url| !url.trim().is_empty()) {
                Some(url) => {
                    s.payment_url = Some(url);
                    s.step = WorkflowStep::ExternalRedirect;
                }
                None => s.step = WorkflowStep::Success,
            }
        })
    }

    // ─── Step 4: external redirect ────────────────────────────────────────

    /// Feed every URL the embedded browser reports, from either hook.
    ///
    /// Returns whether the browser should load it. The success callback
    /// completes the payment and schedules navigation to the transaction list.
    pub fn handle_browser_url(&self, url: &str) -> BrowserDecision {
        let decision = self.matcher.decide(url);
        if decision == BrowserDecision::Intercept {
            self.complete_redirect();
        }
        decision
    }

    fn complete_redirect(&self) {
        let mut completed = false;
        self.update(|s| {
            if s.step == WorkflowStep::ExternalRedirect {
                s.payment_url = None;
                s.step = WorkflowStep::Success;
                completed = true;
            }
        });
        if !completed {
            return;
        }
        info!("payment callback reached");

        let session = Arc::clone(&self.session);
        let settle = self.settle;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(settle).await;
                    session.navigate(Navigation::TransactionList);
                });
            }
            Err(_) => session.navigate(Navigation::TransactionList),
        }
    }

    /// User closed the browser without reaching the callback. The payment
    /// may or may not have gone through, so this goes back to review.
    pub fn close_browser(&self) {
        self.update(|s| {
            if s.step == WorkflowStep::ExternalRedirect {
                s.payment_url = None;
                s.step = WorkflowStep::Review;
            }
        });
    }

    // ─── Navigation ───────────────────────────────────────────────────────

    /// Step back one stage, keeping every selection.
    ///
    /// In-flight submissions from the abandoned step are ignored when they
    /// land.
    pub fn go_back(&self) -> WorkflowStep {
        let step = self.step();
        let Some(previous) = step.previous() else {
            return step;
        };
        match step {
            WorkflowStep::Verification => self.abandon(Fetch::Verify),
            WorkflowStep::Review => self.abandon(Fetch::Pay),
            _ => {}
        }
        self.update(|s| {
            if s.step == WorkflowStep::ExternalRedirect {
                s.payment_url = None;
            }
            s.step = previous;
            s.error = None;
        });
        previous
    }

    /// Start over: back to selection with every slot, form value and error
    /// cleared. Loaded categories and gateways are kept.
    pub fn reset_form(&self) {
        for fetch in [Fetch::Billers, Fetch::Packages, Fetch::Verify, Fetch::Pay] {
            self.generations[fetch.index()].fetch_add(1, Ordering::SeqCst);
        }
        self.update(|s| {
            let categories = std::mem::take(&mut s.categories);
            let gateways = std::mem::take(&mut s.gateways);
            let mut loading = s.loading;
            for fetch in [Fetch::Billers, Fetch::Packages, Fetch::Verify, Fetch::Pay] {
                loading.set(fetch, false);
            }
            *s = WorkflowState {
                categories,
                gateways,
                loading,
                ..WorkflowState::default()
            };
        });
        debug!("workflow reset");
    }
}
