//! Paged transaction history with a status filter and a search box.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::payments::{HistoryQuery, PaymentsApi};
use crate::config::HistoryConfig;
use crate::session::Session;
use crate::types::{Transaction, TransactionStatus};

const LOAD_FAILED: &str = "Failed to load transactions. Please try again.";

/// Entries shown on the dashboard
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    pub transactions: Vec<Transaction>,
    /// 1-based
    pub page: u32,
    pub total_pages: u32,
    pub status_filter: Option<TransactionStatus>,
    pub search: String,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            transactions: Vec::new(),
            page: 1,
            total_pages: 1,
            status_filter: None,
            search: String::new(),
            loading: false,
            error: None,
        }
    }
}

impl HistoryState {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Controller behind the transaction list screen
pub struct TransactionHistory {
    payments: PaymentsApi,
    page_size: u32,
    state: watch::Sender<HistoryState>,
    generation: AtomicU64,
}

impl TransactionHistory {
    pub fn new(session: Arc<Session>, config: &HistoryConfig) -> Self {
        let (state, _) = watch::channel(HistoryState::default());
        Self {
            payments: PaymentsApi::new(session),
            page_size: config.page_size.max(1),
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HistoryState> {
        self.state.subscribe()
    }

    /// Fetch the current page with the current filter and search
    pub async fn load(&self) -> Result<(), ApiError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = {
            let s = self.state.borrow();
            HistoryQuery {
                page: s.page,
                page_size: self.page_size,
                status: s.status_filter,
                search: Some(s.search.trim().to_string()).filter(|q| !q.is_empty()),
            }
        };
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = self.payments.transaction_history(&query).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(page = query.page, "discarding superseded history page");
            return Ok(());
        }

        match result {
            Ok(page) => {
                self.state.send_modify(|s| {
                    s.transactions = page.transactions;
                    s.total_pages = page.total_pages.max(1);
                    s.loading = false;
                });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to load transaction history");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.user_message(LOAD_FAILED));
                });
                Err(err)
            }
        }
    }

    /// Reload without changing page, filter or search
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.load().await
    }

    /// Select a status filter; selecting the active one clears it.
    /// Always goes back to page 1.
    pub async fn toggle_status_filter(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<(), ApiError> {
        self.state.send_modify(|s| {
            s.status_filter = match (s.status_filter, status) {
                (current, Some(next)) if current == Some(next) => None,
                (_, next) => next,
            };
            s.page = 1;
        });
        self.load().await
    }

    /// Run a search. Always goes back to page 1.
    pub async fn search(&self, query: &str) -> Result<(), ApiError> {
        let query = query.trim().to_string();
        self.state.send_modify(|s| {
            s.search = query;
            s.page = 1;
        });
        self.load().await
    }

    /// Jump to `page`, clamped to `[1, total_pages]`. Returns false when
    /// already there.
    pub async fn go_to_page(&self, page: u32) -> Result<bool, ApiError> {
        let mut moved = false;
        self.state.send_modify(|s| {
            let target = page.clamp(1, s.total_pages.max(1));
            moved = target != s.page;
            s.page = target;
        });
        if moved {
            self.load().await?;
        }
        Ok(moved)
    }

    pub async fn next_page(&self) -> Result<bool, ApiError> {
        let page = self.state.borrow().page.saturating_add(1);
        self.go_to_page(page).await
    }

    pub async fn previous_page(&self) -> Result<bool, ApiError> {
        let page = self.state.borrow().page.saturating_sub(1);
        self.go_to_page(page).await
    }
}

/// The dashboard's recent activity: the head of history page 1
pub async fn recent_transactions(
    payments: &PaymentsApi,
    config: &HistoryConfig,
) -> Result<Vec<Transaction>, ApiError> {
    let page = payments
        .transaction_history(&HistoryQuery::first_page(config.page_size.max(1)))
        .await?;
    Ok(page.transactions.into_iter().take(RECENT_LIMIT).collect())
}
