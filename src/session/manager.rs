//! Session manager and authorized request executor.
//!
//! The session owns the credential pair and the signed-in user. Other
//! components never touch tokens directly; they hand an [`ApiRequest`] to
//! [`Session::execute`], which attaches the access token and, on a 401,
//! refreshes once and replays the request once.
//!
//! Refreshes are single-flight: concurrent 401s queue on `refresh_lock`, and
//! whoever gets it second sees the token already rotated and replays with it.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::store::{SecureStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_KEY};
use super::{Navigation, RouteDecision, SessionStatus};
use crate::api::auth::{AuthApi, AuthGrant, RegisterRequest};
use crate::api::envelope::decode;
use crate::api::error::{ApiError, GENERIC_FAILURE};
use crate::api::request::ApiRequest;
use crate::api::transport::HttpTransport;
use crate::types::{Credentials, SessionUser};
use crate::validation::{self, SignupForm};

const NOT_SIGNED_IN: &str = "You are not signed in";
const NAVIGATION_CAPACITY: usize = 16;
const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
const NOT_RESTORED: &str = "Session is still loading. Please try again.";

#[derive(Default)]
struct SessionData {
    credentials: Option<Credentials>,
    user: Option<SessionUser>,
}

/// The process-wide session, shared by reference (`Arc<Session>`)
pub struct Session {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn SecureStore>,
    auth: AuthApi,
    data: RwLock<SessionData>,
    refresh_lock: Mutex<()>,
    status: watch::Sender<SessionStatus>,
    navigation: broadcast::Sender<Navigation>,
}

impl Session {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn SecureStore>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Uninitialized);
        let (navigation, _) = broadcast::channel(NAVIGATION_CAPACITY);
        Self {
            auth: AuthApi::new(Arc::clone(&transport)),
            transport,
            store,
            data: RwLock::new(SessionData::default()),
            refresh_lock: Mutex::new(()),
            status,
            navigation,
        }
    }

    // ─── Observation ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Listen for navigation requests
    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.navigation.subscribe()
    }

    /// Ask the presentation layer to navigate. Dropped if nobody listens.
    pub fn navigate(&self, to: Navigation) {
        if self.navigation.send(to).is_err() {
            debug!(?to, "no navigation listener");
        }
    }

    pub fn route_decision(&self) -> RouteDecision {
        self.status().into()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.read(|d| d.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(|d| d.credentials.as_ref().map(|c| c.access_token.clone()))
    }

    fn credentials(&self) -> Option<Credentials> {
        self.read(|d| d.credentials.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&SessionData) -> T) -> T {
        match self.data.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut SessionData) -> T) -> T {
        match self.data.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set_status(&self, next: SessionStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "session status changed");
        }
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Restore the session from secure storage at process start.
    ///
    /// Never fails: read errors leave the session anonymous, and a corrupt
    /// user record is discarded while the tokens are still used.
    pub fn restore(&self) -> SessionStatus {
        if self.status() != SessionStatus::Uninitialized {
            warn!(status = ?self.status(), "restore called on an initialized session");
            return self.status();
        }
        self.set_status(SessionStatus::Loading);

        let access = self.read_key(ACCESS_TOKEN_KEY);
        let refresh = self.read_key(REFRESH_TOKEN_KEY);

        let credentials = match (access, refresh) {
            (Some(access), Some(refresh)) => Some(Credentials::new(access, refresh)),
            (None, None) => None,
            _ => {
                warn!("stored credential pair is incomplete, discarding it");
                if let Err(e) = self.store.delete_many(&SESSION_KEYS) {
                    error!(error = %e, "failed to clear incomplete credentials");
                }
                None
            }
        };

        let user = match &credentials {
            Some(_) => self.restore_user(),
            None => None,
        };

        let next = if credentials.is_some() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        };
        self.write(|d| {
            d.credentials = credentials;
            d.user = user;
        });
        self.set_status(next);
        next
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                error!(key, error = %e, "failed to read secure store");
                None
            }
        }
    }

    fn restore_user(&self) -> Option<SessionUser> {
        let raw = self.read_key(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "stored user record is corrupt, discarding it");
                if let Err(e) = self.store.delete(USER_KEY) {
                    error!(error = %e, "failed to delete corrupt user record");
                }
                None
            }
        }
    }

    /// Sign-in is only meaningful once `restore` has settled the status
    fn ensure_restored(&self) -> Result<(), ApiError> {
        if self.status().is_pending() {
            warn!(status = ?self.status(), "sign-in attempted before restore");
            return Err(ApiError::authentication(NOT_RESTORED));
        }
        Ok(())
    }

    /// Sign in with username and password
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionUser, ApiError> {
        self.ensure_restored()?;
        validation::validate_login(username, password)?;
        let grant = self.auth.login(username.trim(), password).await?;
        self.establish(grant)
    }

    /// Sign in with a Google ID token
    pub async fn google_login(&self, id_token: &str) -> Result<SessionUser, ApiError> {
        self.ensure_restored()?;
        if id_token.trim().is_empty() {
            return Err(ApiError::validation("token", "Google ID token is required"));
        }
        let grant = self.auth.google_login(id_token).await?;
        self.establish(grant)
    }

    /// Register a new account. Does not sign in.
    pub async fn signup(&self, form: &SignupForm) -> Result<Value, ApiError> {
        validation::validate_signup(form)?;
        let body = RegisterRequest {
            email: form.email.trim(),
            name: form.name.trim(),
            password: &form.password,
            phone: form.phone.trim(),
        };
        let result = self.auth.register(&body).await?;
        info!("account registered");
        Ok(result)
    }

    /// Request a password-reset email. Does not sign in.
    pub async fn reset_password(&self, email: &str) -> Result<Value, ApiError> {
        validation::validate_email(email)?;
        let result = self.auth.reset_password(email.trim()).await?;
        info!("password reset requested");
        Ok(result)
    }

    /// Persist a sign-in grant and become authenticated.
    ///
    /// The triple is written before memory is updated, so a store failure
    /// leaves the session exactly as it was.
    fn establish(&self, grant: AuthGrant) -> Result<SessionUser, ApiError> {
        let AuthGrant { credentials, user } = grant;
        let user_json = serde_json::to_string(&user)
            .map_err(|e| ApiError::storage(format!("Failed to encode user: {}", e)))?;

        self.write(|d| {
            self.store.set_many(&[
                (ACCESS_TOKEN_KEY, &credentials.access_token),
                (REFRESH_TOKEN_KEY, &credentials.refresh_token),
                (USER_KEY, &user_json),
            ])?;
            d.credentials = Some(credentials);
            d.user = Some(user.clone());
            Ok::<(), ApiError>(())
        })?;
        self.set_status(SessionStatus::Authenticated);
        Ok(user)
    }

    /// Sign out. Memory is cleared first so observers see the signed-out
    /// state even if clearing storage fails.
    pub fn logout(&self) {
        self.clear_in_memory();
        if let Err(e) = self.store.delete_many(&SESSION_KEYS) {
            error!(error = %e, "failed to clear stored credentials on logout");
        }
        info!("signed out");
    }

    fn clear_in_memory(&self) {
        self.write(|d| {
            d.credentials = None;
            d.user = None;
        });
        self.set_status(SessionStatus::Anonymous);
    }

    /// Replace the cached user after a profile fetch or update
    pub fn update_user(&self, user: SessionUser) {
        if !self.is_authenticated() {
            debug!("ignoring user update on a signed-out session");
            return;
        }
        match serde_json::to_string(&user) {
            Ok(json) => {
                if let Err(e) = self.store.set(USER_KEY, &json) {
                    warn!(error = %e, "failed to persist updated user");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode updated user"),
        }
        self.write(|d| d.user = Some(user));
    }

    // ─── Request executor ─────────────────────────────────────────────────

    /// Execute `request` and decode the response envelope.
    ///
    /// Authorized requests carry the current access token. A 401 triggers one
    /// refresh (shared with any concurrent callers) and one replay; a second
    /// failure is returned as-is.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        if !request.needs_auth {
            let response = self.transport.send(request, None).await?;
            return decode(&response, GENERIC_FAILURE);
        }

        let token = self
            .access_token()
            .ok_or_else(|| ApiError::authentication(NOT_SIGNED_IN))?;

        let response = self.transport.send(request, Some(&token)).await?;
        if !response.is_unauthorized() {
            return decode(&response, GENERIC_FAILURE);
        }

        debug!(path = %request.path, "access token rejected, refreshing");
        let fresh = self.refresh_after_unauthorized(&token).await?;

        let replay = self.transport.send(request, Some(&fresh)).await?;
        decode(&replay, GENERIC_FAILURE)
    }

    /// Obtain a token newer than `stale`, refreshing at most once across all
    /// concurrent callers.
    async fn refresh_after_unauthorized(&self, stale: &str) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed, or failed to, while we waited
        let credentials = match self.credentials() {
            None => return Err(ApiError::authentication(SESSION_EXPIRED)),
            Some(c) if c.access_token != stale => {
                debug!("token already refreshed by a concurrent request");
                return Ok(c.access_token);
            }
            Some(c) => c,
        };

        if credentials.refresh_token.is_empty() {
            error!("no refresh token available");
            self.expire();
            return Err(ApiError::authentication(SESSION_EXPIRED));
        }

        match self.auth.refresh(&credentials.refresh_token).await {
            Ok(fresh) => {
                // Install only into the session that was refreshed. Persisting
                // under the write lock orders it against logout's clear.
                let access = fresh.access_token.clone();
                let installed = self.write(|d| {
                    let same_session = d
                        .credentials
                        .as_ref()
                        .is_some_and(|c| c.refresh_token == credentials.refresh_token);
                    if !same_session {
                        return false;
                    }
                    if let Err(e) = self.store.set_many(&[
                        (ACCESS_TOKEN_KEY, &fresh.access_token),
                        (REFRESH_TOKEN_KEY, &fresh.refresh_token),
                    ]) {
                        warn!(error = %e, "failed to persist refreshed tokens");
                    }
                    d.credentials = Some(fresh);
                    true
                });
                if !installed {
                    warn!("session changed during token refresh, discarding new tokens");
                    return Err(ApiError::authentication(SESSION_EXPIRED));
                }
                info!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                error!(error = %e, "token refresh failed, ending session");
                self.expire();
                Err(e)
            }
        }
    }

    /// Irrecoverable auth failure: drop everything and become anonymous
    fn expire(&self) {
        self.clear_in_memory();
        if let Err(e) = self.store.delete_many(&SESSION_KEYS) {
            error!(error = %e, "failed to clear stored credentials after refresh failure");
        }
        self.navigate(Navigation::Login);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::request::Method;
    use crate::session::store::MemorySecureStore;
    use serde_json::json;

    fn session_with(mock: &MockTransport, store: &MemorySecureStore) -> Session {
        Session::new(Arc::new(mock.clone()), Arc::new(store.clone()))
    }

    fn seed_tokens(store: &MemorySecureStore) {
        store
            .seed(ACCESS_TOKEN_KEY, "acc-1")
            .seed(REFRESH_TOKEN_KEY, "ref-1")
            .seed(USER_KEY, r#"{"id":1,"name":"Ada","email":"ada@x.io"}"#);
    }

    #[test]
    fn test_restore_authenticated() {
        let mock = MockTransport::new();
        let store = MemorySecureStore::new();
        seed_tokens(&store);
        let session = session_with(&mock, &store);

        assert_eq!(session.status(), SessionStatus::Uninitialized);
        assert_eq!(session.restore(), SessionStatus::Authenticated);
        assert_eq!(session.user().unwrap().name, "Ada");
        assert_eq!(session.access_token().as_deref(), Some("acc-1"));
    }

    #[test]
    fn test_restore_empty_store_is_anonymous() {
        let session = session_with(&MockTransport::new(), &MemorySecureStore::new());
        assert_eq!(session.restore(), SessionStatus::Anonymous);
        assert_eq!(session.route_decision(), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn test_restore_corrupt_user_keeps_token() {
        let store = MemorySecureStore::new();
        store
            .seed(ACCESS_TOKEN_KEY, "acc-1")
            .seed(REFRESH_TOKEN_KEY, "ref-1")
            .seed(USER_KEY, "{not json");
        let session = session_with(&MockTransport::new(), &store);

        assert_eq!(session.restore(), SessionStatus::Authenticated);
        assert!(session.user().is_none());
        assert_eq!(store.peek(USER_KEY), None);
        assert_eq!(store.peek(ACCESS_TOKEN_KEY).as_deref(), Some("acc-1"));
    }

    #[test]
    fn test_restore_read_failure_is_anonymous() {
        let store = MemorySecureStore::new();
        seed_tokens(&store);
        store.set_fail_reads(true);
        let session = session_with(&MockTransport::new(), &store);
        assert_eq!(session.restore(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_restore_incomplete_pair_is_discarded() {
        let store = MemorySecureStore::new();
        store.seed(REFRESH_TOKEN_KEY, "ref-orphan");
        let session = session_with(&MockTransport::new(), &store);
        assert_eq!(session.restore(), SessionStatus::Anonymous);
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_only_once() {
        let store = MemorySecureStore::new();
        let session = session_with(&MockTransport::new(), &store);
        assert_eq!(session.restore(), SessionStatus::Anonymous);
        seed_tokens(&store);
        assert_eq!(session.restore(), SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_execute_without_token_skips_network() {
        let mock = MockTransport::new();
        let session = session_with(&mock, &MemorySecureStore::new());
        session.restore();

        let err = session
            .execute(&ApiRequest::get("bills/bill-categories"))
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_validation_skips_network() {
        let mock = MockTransport::new();
        let session = session_with(&mock, &MemorySecureStore::new());
        session.restore();

        let err = session.login("ab", "secret").await.unwrap_err();
        assert!(err.is_validation());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_store_failure_leaves_session_anonymous() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/authenticate",
            200,
            json!({"status": "success", "data": {
                "access": "acc-1", "refresh": "ref-1",
                "user": {"id": 1, "name": "Ada", "email": "ada@x.io"}
            }}),
        );
        let store = MemorySecureStore::new();
        store.set_fail_writes(true);
        let session = session_with(&mock, &store);
        session.restore();

        let err = session.login("ada", "secret").await.unwrap_err();
        assert!(matches!(err, ApiError::Storage { .. }));
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(session.access_token().is_none());
    }

    #[test]
    fn test_logout_clears_memory_even_if_store_fails() {
        let store = MemorySecureStore::new();
        seed_tokens(&store);
        let session = session_with(&MockTransport::new(), &store);
        session.restore();

        store.set_fail_deletes(true);
        session.logout();
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(session.access_token().is_none());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn test_status_watch_sees_login() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/google-auth",
            200,
            json!({"status": "success", "data": {
                "access": "g-acc", "refresh": "g-ref",
                "user": {"id": "u-7", "name": "Grace", "email": "grace@x.io"}
            }}),
        );
        let store = MemorySecureStore::new();
        let session = session_with(&mock, &store);
        let mut rx = session.subscribe();
        session.restore();

        session.google_login("google-id-token").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionStatus::Authenticated);
        assert_eq!(store.peek(ACCESS_TOKEN_KEY).as_deref(), Some("g-acc"));
        assert_eq!(store.peek(REFRESH_TOKEN_KEY).as_deref(), Some("g-ref"));
        assert!(store.peek(USER_KEY).unwrap().contains("Grace"));
    }

    #[tokio::test]
    async fn test_sign_in_before_restore_is_rejected() {
        let mock = MockTransport::new();
        let store = MemorySecureStore::new();
        seed_tokens(&store);
        let session = session_with(&mock, &store);

        let err = session.login("ada", "secret").await.unwrap_err();
        assert_eq!(err, ApiError::authentication(NOT_RESTORED));
        let err = session.google_login("google-id-token").await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(mock.calls().is_empty());
        assert_eq!(session.status(), SessionStatus::Uninitialized);

        // Restore still runs afterwards
        assert_eq!(session.restore(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_update_user_persists() {
        let store = MemorySecureStore::new();
        seed_tokens(&store);
        let session = session_with(&MockTransport::new(), &store);
        session.restore();

        let mut user = session.user().unwrap();
        user.phone = Some("08012345678".to_string());
        session.update_user(user);
        assert!(store.peek(USER_KEY).unwrap().contains("08012345678"));
        assert_eq!(
            session.user().unwrap().phone.as_deref(),
            Some("08012345678")
        );
    }
}
