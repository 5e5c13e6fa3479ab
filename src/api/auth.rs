//! Unauthenticated user endpoints: sign-in, registration, refresh, reset.
//!
//! Every failure here (failure envelope, HTTP error, network error, malformed
//! body) becomes [`ApiError::Authentication`] with the server message when
//! there is one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::envelope::{decode_strict, from_payload};
use super::error::{ApiError, AUTH_FAILED};
use super::request::ApiRequest;
use super::transport::HttpTransport;
use crate::types::{Credentials, SessionUser};

const GOOGLE_AUTH_FAILED: &str = "Google authentication failed";
const REFRESH_FAILED: &str = "Token refresh failed";
const REGISTRATION_FAILED: &str = "Could not create account. Please try again.";
const RESET_FAILED: &str = "Could not send reset email. Please try again.";

/// Tokens and user returned by a successful sign-in
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthGrant {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub user: SessionUser,
}

/// Body of `POST /user/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password: &'a str,
    pub phone: &'a str,
}

/// Client for the unauthenticated `/user/*` endpoints
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn HttpTransport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    async fn call(&self, request: ApiRequest, fallback: &str) -> Result<Value, ApiError> {
        debug!(path = %request.path, "auth request");
        let response = self
            .transport
            .send(&request, None)
            .await
            .map_err(|e| as_auth_error(&e, fallback))?;
        decode_strict(&response, fallback).map_err(|e| as_auth_error(&e, fallback))
    }

    /// `POST /user/authenticate`
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let request = ApiRequest::post("user/authenticate")
            .anonymous()
            .json(&json!({ "username": username, "password": password }))?;
        let payload = self.call(request, AUTH_FAILED).await?;
        from_payload(payload).map_err(|e| as_auth_error(&e, AUTH_FAILED))
    }

    /// `POST /user/google-auth`
    pub async fn google_login(&self, id_token: &str) -> Result<AuthGrant, ApiError> {
        let request = ApiRequest::post("user/google-auth")
            .anonymous()
            .json(&json!({ "token": id_token }))?;
        let payload = self.call(request, GOOGLE_AUTH_FAILED).await?;
        from_payload(payload).map_err(|e| as_auth_error(&e, GOOGLE_AUTH_FAILED))
    }

    /// `POST /user/register`; does not sign the user in
    pub async fn register(&self, body: &RegisterRequest<'_>) -> Result<Value, ApiError> {
        let request = ApiRequest::post("user/register").anonymous().json(body)?;
        self.call(request, REGISTRATION_FAILED).await
    }

    /// `POST /user/refresh-token`: exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        let request = ApiRequest::post("user/refresh-token")
            .anonymous()
            .json(&json!({ "refresh": refresh_token }))?;
        let payload = self.call(request, REFRESH_FAILED).await?;
        from_payload(payload).map_err(|e| as_auth_error(&e, REFRESH_FAILED))
    }

    /// `POST /user/reset-password`
    pub async fn reset_password(&self, email: &str) -> Result<Value, ApiError> {
        let request = ApiRequest::post("user/reset-password")
            .anonymous()
            .json(&json!({ "email": email }))?;
        self.call(request, RESET_FAILED).await
    }
}

fn as_auth_error(err: &ApiError, fallback: &str) -> ApiError {
    match err {
        ApiError::Authentication { .. } => err.clone(),
        other => ApiError::authentication(other.user_message(fallback)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::request::Method;
    use crate::types::Id;

    fn api(mock: &MockTransport) -> AuthApi {
        AuthApi::new(Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/authenticate",
            200,
            json!({
                "status": "success",
                "data": {
                    "access": "acc-1",
                    "refresh": "ref-1",
                    "user": {"id": 9, "name": "Ada", "email": "ada@x.io"}
                }
            }),
        );

        let grant = api(&mock).login("ada", "secret").await.unwrap();
        assert_eq!(grant.credentials, Credentials::new("acc-1", "ref-1"));
        assert_eq!(grant.user.id, Id::Num(9));

        let call = &mock.calls()[0];
        assert_eq!(call.bearer, None);
        assert_eq!(
            call.body,
            Some(json!({"username": "ada", "password": "secret"}))
        );
    }

    #[tokio::test]
    async fn test_login_failure_carries_server_message() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/authenticate",
            200,
            json!({"status": "fail", "message": "Invalid credentials"}),
        );

        let err = api(&mock).login("ada", "wrong!").await.unwrap_err();
        assert_eq!(err, ApiError::authentication("Invalid credentials"));
    }

    #[tokio::test]
    async fn test_network_error_is_generic_auth_error() {
        let mock = MockTransport::new();
        mock.enqueue_transport_error(Method::Post, "user/google-auth", "dns failure");

        let err = api(&mock).google_login("id-token").await.unwrap_err();
        assert_eq!(err, ApiError::authentication(GOOGLE_AUTH_FAILED));
    }

    #[tokio::test]
    async fn test_malformed_grant_is_auth_error() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/authenticate",
            200,
            json!({"status": "success", "data": {"access": "only-access"}}),
        );

        let err = api(&mock).login("ada", "secret").await.unwrap_err();
        assert_eq!(err, ApiError::authentication(AUTH_FAILED));
    }

    #[tokio::test]
    async fn test_refresh() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/refresh-token",
            200,
            json!({"status": "success", "data": {"access": "acc-2", "refresh": "ref-2"}}),
        );

        let creds = api(&mock).refresh("ref-1").await.unwrap();
        assert_eq!(creds, Credentials::new("acc-2", "ref-2"));
        assert_eq!(mock.calls()[0].body, Some(json!({"refresh": "ref-1"})));
    }

    #[tokio::test]
    async fn test_register_http_error() {
        let mock = MockTransport::new();
        mock.enqueue_json(
            Method::Post,
            "user/register",
            400,
            json!({"status": "fail", "message": "Email already registered"}),
        );

        let body = RegisterRequest {
            email: "ada@x.io",
            name: "Ada",
            password: "secret1",
            phone: "08012345678",
        };
        let err = api(&mock).register(&body).await.unwrap_err();
        assert_eq!(err, ApiError::authentication("Email already registered"));
    }
}
