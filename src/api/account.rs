use axum::{
    Form, Json,
    extract::{Path, Request, State},
    response::Redirect,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{CurrentUser, LOGIN_PATH};
use super::flash::{self, FlashLevel};
use super::validation::validate_user_id;
use super::{ApiError, ApiResponse, AppState, PageContextDto, ResetCodeStatusDto};
use crate::services::{AccountError, Registration};

const REGISTER_PATH: &str = "/account/register";
const FORGOT_PASSWORD_PATH: &str = "/account/forgot-password";

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

#[derive(Deserialize)]
pub struct EmailForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct NewPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

/// GET /account/messages
///
/// Current user, pending flash messages and preserved input. Reading consumes
/// the messages and input.
pub async fn messages(
    session: Session,
    request: Request,
) -> Result<Json<ApiResponse<PageContextDto>>, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.clone().into());

    Ok(Json(ApiResponse::success(PageContextDto {
        user,
        messages: flash::take(&session).await?,
        old_input: flash::take_input(&session).await?,
    })))
}

/// POST /account/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, ApiError> {
    let registration = Registration {
        email: form.email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        password: form.password,
        password_confirmation: form.password_confirmation,
    };

    match state.accounts().register(registration).await {
        Ok(_) => {
            flash::redirect_with(
                &session,
                LOGIN_PATH,
                FlashLevel::Success,
                "Your account has been created. Check your email for the activation link.",
            )
            .await
        }
        Err(e) => {
            flash::keep_input(
                &session,
                &[
                    ("email", form.email.as_str()),
                    ("first_name", form.first_name.as_str()),
                    ("last_name", form.last_name.as_str()),
                ],
            )
            .await?;
            flash::fail_to(&session, REGISTER_PATH, e).await
        }
    }
}

/// GET /account/activate/{user_id}/{code}
pub async fn activate(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((user_id, code)): Path<(i32, String)>,
) -> Result<Redirect, ApiError> {
    let user_id = validate_user_id(user_id)?;

    match state.accounts().activate(user_id, &code).await {
        Ok(_) => {
            flash::redirect_with(
                &session,
                LOGIN_PATH,
                FlashLevel::Success,
                "Your account has been activated. You may now log in.",
            )
            .await
        }
        Err(AccountError::CodeMismatch) => {
            flash::fail_to(
                &session,
                LOGIN_PATH,
                ApiError::validation(
                    "The activation code is invalid. You can request a new activation link.",
                ),
            )
            .await
        }
        Err(e) => flash::fail_to(&session, LOGIN_PATH, e).await,
    }
}

/// POST /account/activate/resend
pub async fn resend_activation(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<EmailForm>,
) -> Result<Redirect, ApiError> {
    match state.accounts().resend_activation(&form.email).await {
        Ok(()) => {
            flash::redirect_with(
                &session,
                LOGIN_PATH,
                FlashLevel::Success,
                "A new activation link has been sent to your email address",
            )
            .await
        }
        Err(e) => {
            flash::keep_input(&session, &[("email", form.email.as_str())]).await?;
            flash::fail_to(&session, LOGIN_PATH, e).await
        }
    }
}

/// POST /account/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<EmailForm>,
) -> Result<Redirect, ApiError> {
    match state.accounts().request_password_reset(&form.email).await {
        Ok(_) => {
            flash::redirect_with(
                &session,
                LOGIN_PATH,
                FlashLevel::Success,
                "Check your email for the password reset link",
            )
            .await
        }
        Err(e) => {
            flash::keep_input(&session, &[("email", form.email.as_str())]).await?;
            flash::fail_to(&session, FORGOT_PASSWORD_PATH, e).await
        }
    }
}

/// GET /account/forgot-password/{user_id}/{code}
pub async fn check_reset_code(
    State(state): State<Arc<AppState>>,
    Path((user_id, code)): Path<(i32, String)>,
) -> Result<Json<ApiResponse<ResetCodeStatusDto>>, ApiError> {
    let user_id = validate_user_id(user_id)?;
    state.accounts().check_reset_code(user_id, &code).await?;

    Ok(Json(ApiResponse::success(ResetCodeStatusDto {
        user_id: user_id.value(),
        valid: true,
    })))
}

/// POST /account/forgot-password/{user_id}/{code}
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((user_id, code)): Path<(i32, String)>,
    Form(form): Form<NewPasswordForm>,
) -> Result<Redirect, ApiError> {
    let user_id = validate_user_id(user_id)?;

    let result = state
        .accounts()
        .confirm_password_reset(user_id, &code, &form.password, &form.password_confirmation)
        .await;

    match result {
        Ok(()) => {
            flash::redirect_with(
                &session,
                LOGIN_PATH,
                FlashLevel::Success,
                "Your password has been reset. You may now log in.",
            )
            .await
        }
        // Retrying the form only makes sense while the code is still good.
        Err(e @ (AccountError::Validation(_) | AccountError::WeakPassword(_)))
            if code.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            flash::fail_to(
                &session,
                &format!("{FORGOT_PASSWORD_PATH}/{user_id}/{code}"),
                e,
            )
            .await
        }
        Err(e) => flash::fail_to(&session, FORGOT_PASSWORD_PATH, e).await,
    }
}
