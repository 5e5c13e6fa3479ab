//! Session management: the credential pair, the signed-in user, and the
//! authorized request executor with transparent token refresh.

mod manager;
pub mod store;

pub use manager::Session;
pub use store::{FileSecureStore, MemorySecureStore, SecureStore, StoreError};

/// Lifecycle of a session.
///
/// `Uninitialized -> Loading -> {Authenticated, Anonymous}`, then
/// `Authenticated <-> Anonymous` on sign-in / sign-out / refresh failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

impl SessionStatus {
    /// True while routing decisions must wait
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Uninitialized | SessionStatus::Loading)
    }
}

/// What a guarded screen should do for the current session status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session still restoring; show a spinner, decide later
    Wait,
    /// Signed in; render the guarded content
    Proceed,
    /// Signed out; go to the login screen
    RedirectToLogin,
}

/// One-shot navigation requests for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Session ended; show the login screen
    Login,
    /// Payment finished; show the transaction list
    TransactionList,
}

impl From<SessionStatus> for RouteDecision {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Uninitialized | SessionStatus::Loading => RouteDecision::Wait,
            SessionStatus::Authenticated => RouteDecision::Proceed,
            SessionStatus::Anonymous => RouteDecision::RedirectToLogin,
        }
    }
}
