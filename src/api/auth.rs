use axum::{
    Extension, Form, Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::{Expiry, Session};

use super::flash::{self, FlashLevel};
use super::observability::RequestSpan;
use super::validation::parse_checkbox;
use super::{AccountDto, ApiError, ApiResponse, AppState};
use crate::constants::permissions::ADMIN;
use crate::constants::session_keys::{LOGIN_REDIRECT, LOGIN_TOKEN};
use crate::db::User;

pub const LOGIN_PATH: &str = "/account/login";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "remember-me")]
    pub remember: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

/// The user behind the request's login token, resolved once per request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the login token in the cookie session to a user.
///
/// Stale tokens (expired, logged out elsewhere, banned or deleted user) are
/// dropped from the cookie session.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = session.get::<String>(LOGIN_TOKEN).await? {
        match state.auth().check(&token).await? {
            Some(user) => {
                if let Some(RequestSpan(span)) = request.extensions().get::<RequestSpan>() {
                    span.record("user_id", user.id.value());
                }
                request.extensions_mut().insert(CurrentUser(user));
            }
            None => {
                session.remove::<String>(LOGIN_TOKEN).await?;
            }
        }
    }

    Ok(next.run(request).await)
}

/// Sends anonymous visitors to the login form, remembering where they were
/// going.
pub async fn require_login(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.extensions().get::<CurrentUser>().is_some() {
        return Ok(next.run(request).await);
    }

    let target = requested_path(&request);
    Ok(login_redirect(&session, target).await?.into_response())
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let target = requested_path(&request);
    let Some(CurrentUser(user)) = request.extensions().get::<CurrentUser>().cloned() else {
        return Ok(login_redirect(&session, target).await?.into_response());
    };

    if !state.access().authorize(&user, ADMIN).await? {
        tracing::warn!(user_id = %user.id, path = %target, "Admin access denied");
        return Err(ApiError::forbidden(
            "You do not have permission to access that page",
        ));
    }

    Ok(next.run(request).await)
}

/// Path and query of the request, taken before any await since `Request`
/// is not `Sync`.
fn requested_path(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string()
}

async fn login_redirect(session: &Session, target: String) -> Result<Redirect, ApiError> {
    session.insert(LOGIN_REDIRECT, target).await?;

    flash::redirect_with(
        session,
        LOGIN_PATH,
        FlashLevel::Error,
        "You must be logged in to view that page",
    )
    .await
}

/// Only same-site absolute paths are followed after login.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /account/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        flash::keep_input(&session, &[("email", form.email.as_str())]).await?;
        return flash::fail_to(
            &session,
            LOGIN_PATH,
            ApiError::validation("The email and password fields are required"),
        )
        .await;
    }

    let remember = parse_checkbox(form.remember.as_deref());

    let login = match state
        .auth()
        .authenticate(&form.email, &form.password, remember)
        .await
    {
        Ok(login) => login,
        Err(e) => {
            flash::keep_input(&session, &[("email", form.email.as_str())]).await?;
            return flash::fail_to(&session, LOGIN_PATH, e).await;
        }
    };

    // New cookie id on privilege change.
    session.cycle_id().await?;
    session.insert(LOGIN_TOKEN, &login.token).await?;
    if remember
        && let Ok(expires) = time::OffsetDateTime::from_unix_timestamp(login.expires_at.timestamp())
    {
        session.set_expiry(Some(Expiry::AtDateTime(expires)));
    }

    let target = session
        .remove::<String>(LOGIN_REDIRECT)
        .await?
        .filter(|path| is_local_path(path))
        .unwrap_or_else(|| "/account".to_string());

    flash::redirect_with(
        &session,
        &target,
        FlashLevel::Success,
        "You have logged in successfully",
    )
    .await
}

/// GET /account/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Redirect, ApiError> {
    if let Some(token) = session.remove::<String>(LOGIN_TOKEN).await? {
        state.auth().logout(&token).await?;
    }
    session.cycle_id().await?;

    flash::redirect_with(&session, LOGIN_PATH, FlashLevel::Info, "You have logged out").await
}

/// GET /account
pub async fn account(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let effective_permissions = state.access().effective_permissions(&user).await?;

    Ok(Json(ApiResponse::success(AccountDto {
        user: user.into(),
        effective_permissions,
    })))
}

/// POST /account/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Redirect, ApiError> {
    let result = state
        .auth()
        .change_password(
            user.id,
            &form.current_password,
            &form.password,
            &form.password_confirmation,
        )
        .await;

    match result {
        Ok(()) => {
            flash::redirect_with(
                &session,
                "/account",
                FlashLevel::Success,
                "Your password has been changed",
            )
            .await
        }
        Err(e) => flash::fail_to(&session, "/account", e).await,
    }
}
