use axum::{
    Extension, Form, Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::CurrentUser;
use super::flash::{self, FlashLevel};
use super::validation::{
    parse_checkbox, parse_group_ids, parse_permission_overrides, validate_user_id,
};
use super::{ApiError, ApiResponse, AppState, UserDetailDto, UserPageDto};
use crate::services::UserForm;

const USERS_PATH: &str = "/admin/users";

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

#[derive(Deserialize)]
pub struct UserFormInput {
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
    pub activated: Option<String>,
    pub groups: Option<String>,
    pub permissions: Option<String>,
}

impl UserFormInput {
    fn to_form(&self) -> Result<UserForm, ApiError> {
        Ok(UserForm {
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            password: self.password.clone(),
            password_confirmation: self.password_confirmation.clone(),
            activated: parse_checkbox(self.activated.as_deref()),
            groups: parse_group_ids(self.groups.as_deref())?,
            permissions: parse_permission_overrides(self.permissions.as_deref())?,
        })
    }

    async fn keep(&self, session: &Session) -> Result<(), ApiError> {
        flash::keep_input(
            session,
            &[
                ("email", self.email.as_str()),
                ("first_name", self.first_name.as_str()),
                ("last_name", self.last_name.as_str()),
                ("activated", self.activated.as_deref().unwrap_or_default()),
                ("groups", self.groups.as_deref().unwrap_or_default()),
                ("permissions", self.permissions.as_deref().unwrap_or_default()),
            ],
        )
        .await
    }
}

fn user_path(id: impl std::fmt::Display) -> String {
    format!("{USERS_PATH}/{id}")
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<UserPageDto>>, ApiError> {
    let page = state
        .directory()
        .list_users(query.page.unwrap_or(1))
        .await?;
    Ok(Json(ApiResponse::success(page.into())))
}

/// GET /admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDetailDto>>, ApiError> {
    let id = validate_user_id(id)?;
    let detail = state.directory().get_user(id).await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

/// POST /admin/users/create
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Form(input): Form<UserFormInput>,
) -> Result<Redirect, ApiError> {
    let result = match input.to_form() {
        Ok(form) => state
            .directory()
            .create_user(actor.id, form)
            .await
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(user) => {
            flash::redirect_with(
                &session,
                &user_path(user.id),
                FlashLevel::Success,
                "User created",
            )
            .await
        }
        Err(e) => {
            input.keep(&session).await?;
            flash::fail_to(&session, USERS_PATH, e).await
        }
    }
}

/// POST /admin/users/{id}/edit
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Form(input): Form<UserFormInput>,
) -> Result<Redirect, ApiError> {
    let id = validate_user_id(id)?;

    let result = match input.to_form() {
        Ok(form) => state
            .directory()
            .update_user(actor.id, id, form)
            .await
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => {
            flash::redirect_with(&session, &user_path(id), FlashLevel::Success, "User updated")
                .await
        }
        Err(ApiError::NotFound(message)) => {
            flash::redirect_with(&session, USERS_PATH, FlashLevel::Error, message).await
        }
        Err(e) => {
            input.keep(&session).await?;
            flash::fail_to(&session, &user_path(id), e).await
        }
    }
}

/// POST /admin/users/{id}/delete
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, ApiError> {
    let id = validate_user_id(id)?;

    match state.directory().delete_user(actor.id, id).await {
        Ok(()) => {
            flash::redirect_with(&session, USERS_PATH, FlashLevel::Success, "User deleted").await
        }
        Err(e) => flash::fail_to(&session, USERS_PATH, e).await,
    }
}

/// POST /admin/users/{id}/suspend
pub async fn suspend_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, ApiError> {
    let id = validate_user_id(id)?;

    match state.directory().suspend_user(actor.id, id).await {
        Ok(_) => {
            flash::redirect_with(&session, &user_path(id), FlashLevel::Success, "User suspended")
                .await
        }
        Err(e) => flash::fail_to(&session, USERS_PATH, e).await,
    }
}

/// POST /admin/users/{id}/unsuspend
pub async fn unsuspend_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect, ApiError> {
    let id = validate_user_id(id)?;

    match state.directory().unsuspend_user(id).await {
        Ok(_) => {
            flash::redirect_with(
                &session,
                &user_path(id),
                FlashLevel::Success,
                "User unsuspended",
            )
            .await
        }
        Err(e) => flash::fail_to(&session, USERS_PATH, e).await,
    }
}

/// POST /admin/users/{id}/ban
pub async fn ban_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, ApiError> {
    let id = validate_user_id(id)?;

    match state.directory().ban_user(actor.id, id).await {
        Ok(_) => {
            flash::redirect_with(&session, &user_path(id), FlashLevel::Success, "User banned")
                .await
        }
        Err(e) => flash::fail_to(&session, USERS_PATH, e).await,
    }
}
