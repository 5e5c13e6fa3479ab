//! billpay - client core for a bill-payment and subscription service
//!
//! The library owns the session (credentials, user, authorized request
//! execution with token refresh), the five-step bill-payment workflow and the
//! history screens' controllers. A presentation layer drives these and renders
//! the state they publish over `tokio::sync::watch` channels.

pub mod api;
pub mod config;
pub mod history;
pub mod logging;
pub mod session;
pub mod types;
pub mod validation;
pub mod workflow;

use std::sync::Arc;

use api::error::ApiError;
use api::transport::ReqwestTransport;
use config::Config;
use session::{FileSecureStore, Session};

/// Build a session backed by the real HTTP transport and the on-disk
/// secure store, and restore any saved credentials.
pub fn connect(config: &Config) -> Result<Arc<Session>, ApiError> {
    let transport = ReqwestTransport::from_config(&config.api)?;
    let store = FileSecureStore::new(config.secure_store_path());
    let session = Arc::new(Session::new(Arc::new(transport), Arc::new(store)));
    session.restore();
    Ok(session)
}
