//! Signed-in user endpoints: profile and password.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::envelope::from_payload;
use super::error::ApiError;
use super::request::ApiRequest;
use crate::session::Session;
use crate::types::Profile;
use crate::validation::{self, PasswordChangeForm, ProfileForm};

/// Body of `PUT /user/update`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub firstname: String,
    pub lastname: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
}

impl From<&ProfileForm> for ProfileUpdate {
    fn from(form: &ProfileForm) -> Self {
        let name = form.name.trim();
        let (first, last) = name.split_once(' ').unwrap_or((name, ""));
        Self {
            firstname: first.to_string(),
            lastname: last.to_string(),
            phone: form.phone.clone(),
            date_of_birth: form.date_of_birth.clone(),
            address: form.address.clone(),
        }
    }
}

/// Authorized client for the profile endpoints.
///
/// Successful reads and writes refresh the session's cached user.
#[derive(Clone)]
pub struct UserApi {
    session: Arc<Session>,
}

impl UserApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// `GET /user/profile`
    pub async fn profile(&self) -> Result<Profile, ApiError> {
        let payload = self
            .session
            .execute(&ApiRequest::get("user/profile"))
            .await?;
        let profile: Profile = from_payload(payload)?;
        self.session.update_user(profile.to_session_user());
        Ok(profile)
    }

    /// `PUT /user/update`, then re-read the profile
    pub async fn update_profile(&self, form: &ProfileForm) -> Result<Profile, ApiError> {
        validation::validate_profile(form)?;
        let request = ApiRequest::put("user/update").json(&ProfileUpdate::from(form))?;
        self.session.execute(&request).await?;
        self.profile().await
    }

    /// `POST /user/change-password`
    pub async fn change_password(&self, form: &PasswordChangeForm) -> Result<Value, ApiError> {
        validation::validate_password_change(form)?;
        let request = ApiRequest::post("user/change-password").json(&json!({
            "current_password": form.current_password,
            "new_password": form.new_password,
        }))?;
        self.session.execute(&request).await
    }
}
