use serde::Serialize;
use std::collections::BTreeMap;

use super::flash::FlashMessage;
use crate::db::{Group, User};
use crate::domain::permissions::PermissionMap;
use crate::domain::status::LockoutStatus;
use crate::services::{GroupDetail, UserDetail, UserPage};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub activated: bool,
    pub status: LockoutStatus,
    pub permissions: PermissionMap,
    pub activated_at: Option<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        let status = user.throttle.status(chrono::Utc::now());
        Self {
            id: user.id.value(),
            activated: user.is_activated(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            status,
            permissions: user.permissions,
            activated_at: user.activated_at.map(|t| t.to_rfc3339()),
            last_login_at: user.last_login_at.map(|t| t.to_rfc3339()),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupDto {
    pub id: i32,
    pub name: String,
    pub permissions: Vec<String>,
    pub created_at: String,
}

impl From<Group> for GroupDto {
    fn from(group: Group) -> Self {
        Self {
            id: group.id.value(),
            name: group.name,
            permissions: group.permissions.into_iter().collect(),
            created_at: group.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPageDto {
    pub users: Vec<UserDto>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl From<UserPage> for UserPageDto {
    fn from(page: UserPage) -> Self {
        Self {
            total_pages: page.total.div_ceil(page.per_page.max(1)),
            users: page.users.into_iter().map(UserDto::from).collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDetailDto {
    pub user: UserDto,
    pub groups: Vec<GroupDto>,
    pub effective_permissions: PermissionMap,
}

impl From<UserDetail> for UserDetailDto {
    fn from(detail: UserDetail) -> Self {
        Self {
            user: detail.user.into(),
            groups: detail.groups.into_iter().map(GroupDto::from).collect(),
            effective_permissions: detail.effective_permissions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupDetailDto {
    pub group: GroupDto,
    pub members: Vec<UserDto>,
}

impl From<GroupDetail> for GroupDetailDto {
    fn from(detail: GroupDetail) -> Self {
        Self {
            group: detail.group.into(),
            members: detail.members.into_iter().map(UserDto::from).collect(),
        }
    }
}

/// Everything a server-rendered page needs from the cookie session.
#[derive(Debug, Serialize)]
pub struct PageContextDto {
    pub user: Option<UserDto>,
    pub messages: Vec<FlashMessage>,
    pub old_input: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub user: UserDto,
    pub effective_permissions: PermissionMap,
}

#[derive(Debug, Serialize)]
pub struct ResetCodeStatusDto {
    pub user_id: i32,
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub database: bool,
    pub uptime_seconds: u64,
}
