use axum::{
    Form, Json,
    extract::{Path, State},
    response::Redirect,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::flash::{self, FlashLevel};
use super::validation::{parse_permission_keys, validate_group_id, validate_user_id};
use super::{ApiError, ApiResponse, AppState, GroupDetailDto, GroupDto};

const GROUPS_PATH: &str = "/admin/groups";

#[derive(Deserialize)]
pub struct GroupFormInput {
    #[serde(default)]
    pub name: String,
    pub permissions: Option<String>,
}

#[derive(Deserialize)]
pub struct MemberForm {
    pub user_id: i32,
}

fn group_path(id: impl std::fmt::Display) -> String {
    format!("{GROUPS_PATH}/{id}")
}

/// GET /admin/groups
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<GroupDto>>>, ApiError> {
    let groups = state.directory().list_groups().await?;
    Ok(Json(ApiResponse::success(
        groups.into_iter().map(GroupDto::from).collect(),
    )))
}

/// GET /admin/groups/{id}
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<GroupDetailDto>>, ApiError> {
    let id = validate_group_id(id)?;
    let detail = state.directory().get_group(id).await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

/// POST /admin/groups/create
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(input): Form<GroupFormInput>,
) -> Result<Redirect, ApiError> {
    let permissions = parse_permission_keys(input.permissions.as_deref());

    match state.directory().create_group(&input.name, permissions).await {
        Ok(group) => {
            flash::redirect_with(
                &session,
                &group_path(group.id),
                FlashLevel::Success,
                "Group created",
            )
            .await
        }
        Err(e) => {
            flash::keep_input(
                &session,
                &[
                    ("name", input.name.as_str()),
                    ("permissions", input.permissions.as_deref().unwrap_or_default()),
                ],
            )
            .await?;
            flash::fail_to(&session, GROUPS_PATH, e).await
        }
    }
}

/// POST /admin/groups/{id}/edit
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
    Form(input): Form<GroupFormInput>,
) -> Result<Redirect, ApiError> {
    let id = validate_group_id(id)?;
    let permissions = parse_permission_keys(input.permissions.as_deref());

    match state
        .directory()
        .update_group(id, &input.name, permissions)
        .await
    {
        Ok(_) => {
            flash::redirect_with(&session, &group_path(id), FlashLevel::Success, "Group updated")
                .await
        }
        Err(e) => {
            flash::keep_input(
                &session,
                &[
                    ("name", input.name.as_str()),
                    ("permissions", input.permissions.as_deref().unwrap_or_default()),
                ],
            )
            .await?;
            flash::fail_to(&session, &group_path(id), e).await
        }
    }
}

/// POST /admin/groups/{id}/delete
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect, ApiError> {
    let id = validate_group_id(id)?;

    match state.directory().delete_group(id).await {
        Ok(()) => {
            flash::redirect_with(&session, GROUPS_PATH, FlashLevel::Success, "Group deleted")
                .await
        }
        Err(e) => flash::fail_to(&session, GROUPS_PATH, e).await,
    }
}

/// POST /admin/groups/{id}/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<MemberForm>,
) -> Result<Redirect, ApiError> {
    let group_id = validate_group_id(id)?;
    let user_id = validate_user_id(form.user_id)?;

    match state.directory().add_member(group_id, user_id).await {
        Ok(()) => {
            flash::redirect_with(
                &session,
                &group_path(group_id),
                FlashLevel::Success,
                "Member added",
            )
            .await
        }
        Err(e) => flash::fail_to(&session, &group_path(group_id), e).await,
    }
}

/// POST /admin/groups/{id}/members/{user_id}/delete
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((id, user_id)): Path<(i32, i32)>,
) -> Result<Redirect, ApiError> {
    let group_id = validate_group_id(id)?;
    let user_id = validate_user_id(user_id)?;

    match state.directory().remove_member(group_id, user_id).await {
        Ok(()) => {
            flash::redirect_with(
                &session,
                &group_path(group_id),
                FlashLevel::Success,
                "Member removed",
            )
            .await
        }
        Err(e) => flash::fail_to(&session, GROUPS_PATH, e).await,
    }
}
