//! HTTP client layer for the bill-payment service
//!
//! This module provides:
//! - A structured request descriptor the session can replay after a refresh
//! - Envelope decoding (`{status, data, message}`)
//! - The transport seam (reqwest in production, scripted mock in tests)
//! - One client struct per endpoint group

pub mod auth;
pub mod bills;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod payments;
pub mod request;
pub mod transport;
pub mod user;

pub use auth::AuthApi;
pub use bills::BillsApi;
pub use error::ApiError;
pub use mock::MockTransport;
pub use payments::{HistoryQuery, PaymentOrder, PaymentsApi};
pub use request::{ApiRequest, Method};
pub use transport::{HttpTransport, ReqwestTransport};
pub use user::UserApi;
