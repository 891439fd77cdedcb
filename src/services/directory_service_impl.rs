//! `SeaORM` implementation of the `DirectoryService` trait.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::limits::{ADMIN_NAME_MIN_LENGTH, USERS_PER_PAGE};
use crate::db::repositories::user::{
    apply_throttle_state, generate_code, hash_password_async, throttle_state,
};
use crate::db::{Group, Mutation, NewUserRecord, Store, User, is_unique_violation};
use crate::domain::events::IdentityEvent;
use crate::domain::permissions::{PermissionMap, PermissionSet, encode_overrides};
use crate::domain::status::LockoutStatus;
use crate::domain::{GroupId, UserId, clock, validation};
use crate::services::access::{AccessController, AccessError};
use crate::services::directory_service::{
    DirectoryError, DirectoryService, GroupDetail, UserDetail, UserForm, UserPage,
};

impl From<AccessError> for DirectoryError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Database(e) => Self::Database(e),
            AccessError::Internal(e) => Self::Internal(e),
        }
    }
}

/// Validated form fields.
struct CleanUserForm {
    email: String,
    first_name: String,
    last_name: String,
    password: Option<String>,
    activated: bool,
    groups: Vec<i32>,
    permissions: PermissionMap,
}

pub struct SeaOrmDirectoryService {
    store: Store,
    config: Arc<Config>,
    access: AccessController,
    event_bus: broadcast::Sender<IdentityEvent>,
}

impl SeaOrmDirectoryService {
    #[must_use]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        event_bus: broadcast::Sender<IdentityEvent>,
    ) -> Self {
        let access = AccessController::new(store.clone());
        Self {
            store,
            config,
            access,
            event_bus,
        }
    }

    fn publish(&self, event: IdentityEvent) {
        let _ = self.event_bus.send(event);
    }

    fn clean_user_form(
        &self,
        form: UserForm,
        password_required: bool,
    ) -> Result<CleanUserForm, DirectoryError> {
        let email = validation::email(&form.email).map_err(DirectoryError::Validation)?;
        let first_name = validation::name("first name", &form.first_name, ADMIN_NAME_MIN_LENGTH)
            .map_err(DirectoryError::Validation)?;
        let last_name = validation::name("last name", &form.last_name, ADMIN_NAME_MIN_LENGTH)
            .map_err(DirectoryError::Validation)?;

        let password = if form.password.is_empty() && !password_required {
            None
        } else {
            validation::password_confirmation(&form.password, &form.password_confirmation)
                .map_err(DirectoryError::Validation)?;
            validation::password_strength(&form.password, &self.config.security)
                .map_err(DirectoryError::WeakPassword)?;
            Some(form.password)
        };

        let permissions = form
            .permissions
            .into_iter()
            .map(|(key, granted)| validation::permission_key(&key).map(|k| (k, granted)))
            .collect::<Result<PermissionMap, _>>()
            .map_err(DirectoryError::Validation)?;

        let mut groups: Vec<i32> = form.groups.iter().map(GroupId::value).collect();
        groups.sort_unstable();
        groups.dedup();

        Ok(CleanUserForm {
            email,
            first_name,
            last_name,
            password,
            activated: form.activated,
            groups,
            permissions,
        })
    }

    fn clean_group_permissions(permissions: PermissionSet) -> Result<PermissionSet, DirectoryError> {
        permissions
            .iter()
            .map(|key| validation::permission_key(key))
            .collect::<Result<PermissionSet, _>>()
            .map_err(DirectoryError::Validation)
    }

    async fn ensure_groups_exist(&self, ids: &[i32]) -> Result<(), DirectoryError> {
        let groups = self.store.group_repo();
        for id in ids {
            if groups.find_by_id(*id).await?.is_none() {
                return Err(DirectoryError::Validation(format!("Unknown group id {id}")));
            }
        }
        Ok(())
    }

    async fn load_user(&self, id: UserId) -> Result<User, DirectoryError> {
        let model = self
            .store
            .user_repo()
            .find_by_id(id.value())
            .await?
            .ok_or_else(|| DirectoryError::user_not_found(id))?;
        Ok(User::try_from(model)?)
    }

    async fn load_group(&self, id: GroupId) -> Result<Group, DirectoryError> {
        self.store
            .group_repo()
            .find_by_id(id.value())
            .await?
            .ok_or_else(|| DirectoryError::group_not_found(id))
    }

    fn announce_membership(&self, user_id: i32, added: &[i32], removed: &[i32]) {
        let user_id = UserId::new(user_id);
        for (ids, member) in [(added, true), (removed, false)] {
            for group_id in ids {
                self.publish(IdentityEvent::MembershipChanged {
                    user_id,
                    group_id: GroupId::new(*group_id),
                    member,
                });
            }
        }
    }

    fn map_email_conflict(err: anyhow::Error) -> DirectoryError {
        if is_unique_violation(&err) {
            DirectoryError::DuplicateEmail
        } else {
            DirectoryError::from(err)
        }
    }

    fn map_name_conflict(err: anyhow::Error, name: &str) -> DirectoryError {
        if is_unique_violation(&err) {
            DirectoryError::DuplicateName(name.to_string())
        } else {
            DirectoryError::from(err)
        }
    }
}

#[async_trait]
impl DirectoryService for SeaOrmDirectoryService {
    async fn list_users(&self, page: u64) -> Result<UserPage, DirectoryError> {
        let page = page.max(1);
        let (models, total) = self
            .store
            .user_repo()
            .list(page - 1, USERS_PER_PAGE)
            .await?;

        let users = models
            .into_iter()
            .map(User::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(UserPage {
            users,
            page,
            per_page: USERS_PER_PAGE,
            total,
        })
    }

    async fn get_user(&self, id: UserId) -> Result<UserDetail, DirectoryError> {
        let user = self.load_user(id).await?;
        let groups = self.store.group_repo().groups_for_user(id.value()).await?;
        let effective_permissions = self.access.effective_permissions(&user).await?;

        Ok(UserDetail {
            user,
            groups,
            effective_permissions,
        })
    }

    async fn create_user(&self, actor: UserId, form: UserForm) -> Result<User, DirectoryError> {
        let form = self.clean_user_form(form, true)?;
        self.ensure_groups_exist(&form.groups).await?;

        let users = self.store.user_repo();
        if users.email_taken(&form.email, None).await? {
            return Err(DirectoryError::DuplicateEmail);
        }

        let password = form.password.as_deref().unwrap_or_default();
        let password_hash = hash_password_async(password, &self.config.security).await?;

        let model = users
            .create(NewUserRecord {
                email: form.email,
                first_name: form.first_name,
                last_name: form.last_name,
                password_hash,
                activated: form.activated,
                activation_code: (!form.activated).then(generate_code),
                permissions: form.permissions,
            })
            .await
            .map_err(Self::map_email_conflict)?;

        let diff = self
            .store
            .group_repo()
            .set_user_groups(model.id, &form.groups)
            .await?;

        info!(user_id = model.id, by = %actor, "User created by administrator");
        self.publish(IdentityEvent::UserCreated {
            user_id: UserId::new(model.id),
            by: Some(actor),
        });
        self.announce_membership(model.id, &diff.added, &diff.removed);

        Ok(User::try_from(model)?)
    }

    async fn update_user(
        &self,
        actor: UserId,
        id: UserId,
        form: UserForm,
    ) -> Result<User, DirectoryError> {
        let form = self.clean_user_form(form, false)?;
        self.load_user(id).await?;
        self.ensure_groups_exist(&form.groups).await?;

        let users = self.store.user_repo();
        if users.email_taken(&form.email, Some(id.value())).await? {
            return Err(DirectoryError::DuplicateEmail);
        }

        let new_hash = match form.password.as_deref() {
            Some(password) => Some(hash_password_async(password, &self.config.security).await?),
            None => None,
        };
        let permissions = encode_overrides(&form.permissions);

        let updated = users
            .modify(id.value(), |row| {
                row.email.clone_from(&form.email);
                row.first_name.clone_from(&form.first_name);
                row.last_name.clone_from(&form.last_name);
                row.permissions.clone_from(&permissions);
                if form.activated && !row.activated {
                    row.activated = true;
                    row.activation_code = None;
                    row.activation_attempts = 0;
                    row.activated_at = Some(Utc::now());
                }
                if let Some(hash) = &new_hash {
                    row.password_hash.clone_from(hash);
                    row.reset_code = None;
                    row.reset_code_issued_at = None;
                }
                Mutation::Commit(())
            })
            .await
            .map_err(Self::map_email_conflict)?;
        if updated.is_none() {
            return Err(DirectoryError::user_not_found(id));
        }

        let diff = self
            .store
            .group_repo()
            .set_user_groups(id.value(), &form.groups)
            .await?;

        info!(user_id = %id, by = %actor, "User updated by administrator");
        self.publish(IdentityEvent::UserUpdated { user_id: id, by: actor });
        self.announce_membership(id.value(), &diff.added, &diff.removed);

        self.load_user(id).await
    }

    async fn delete_user(&self, actor: UserId, id: UserId) -> Result<(), DirectoryError> {
        if actor == id {
            return Err(DirectoryError::SelfDeletionForbidden);
        }

        if !self.store.user_repo().delete(id.value()).await? {
            return Err(DirectoryError::user_not_found(id));
        }

        info!(user_id = %id, by = %actor, "User deleted");
        self.publish(IdentityEvent::UserDeleted { user_id: id, by: actor });
        Ok(())
    }

    async fn suspend_user(&self, actor: UserId, id: UserId) -> Result<User, DirectoryError> {
        if actor == id {
            return Err(DirectoryError::SelfLockoutForbidden);
        }

        let lockout = clock::seconds(self.config.security.auth_throttle.lockout_seconds);

        let status = self
            .store
            .user_repo()
            .modify(id.value(), |row| {
                let now = Utc::now();
                let mut state = throttle_state(row);
                if state.banned_at.is_some() {
                    return Mutation::Abort(LockoutStatus::Banned);
                }
                let until = clock::deadline(now, lockout);
                state.suspended_until = Some(until);
                apply_throttle_state(row, &state);
                Mutation::Commit(LockoutStatus::TemporarilySuspended { until })
            })
            .await?
            .ok_or_else(|| DirectoryError::user_not_found(id))?;

        if let LockoutStatus::TemporarilySuspended { until } = status {
            warn!(user_id = %id, by = %actor, %until, "User suspended by administrator");
            self.publish(IdentityEvent::UserSuspended {
                user_id: id,
                until: until.to_rfc3339(),
            });
        }

        self.load_user(id).await
    }

    async fn unsuspend_user(&self, id: UserId) -> Result<User, DirectoryError> {
        self.store
            .user_repo()
            .modify(id.value(), |row| {
                let mut state = throttle_state(row);
                state.unsuspend();
                apply_throttle_state(row, &state);
                Mutation::Commit(())
            })
            .await?
            .ok_or_else(|| DirectoryError::user_not_found(id))?;

        info!(user_id = %id, "User unsuspended");
        self.publish(IdentityEvent::UserUnsuspended { user_id: id });
        self.load_user(id).await
    }

    async fn ban_user(&self, actor: UserId, id: UserId) -> Result<User, DirectoryError> {
        if actor == id {
            return Err(DirectoryError::SelfLockoutForbidden);
        }

        self.store
            .user_repo()
            .modify(id.value(), |row| {
                let mut state = throttle_state(row);
                state.ban(Utc::now());
                apply_throttle_state(row, &state);
                Mutation::Commit(())
            })
            .await?
            .ok_or_else(|| DirectoryError::user_not_found(id))?;

        let ended = self.store.session_repo().delete_for_user(id.value()).await?;
        warn!(user_id = %id, by = %actor, sessions = ended, "User banned");
        self.publish(IdentityEvent::UserBanned { user_id: id });

        self.load_user(id).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DirectoryError> {
        Ok(self.store.group_repo().list().await?)
    }

    async fn get_group(&self, id: GroupId) -> Result<GroupDetail, DirectoryError> {
        let group = self.load_group(id).await?;
        let member_ids = self.store.group_repo().member_ids(id.value()).await?;

        let users = self.store.user_repo();
        let mut members = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            if let Some(model) = users.find_by_id(user_id).await? {
                members.push(User::try_from(model)?);
            }
        }

        Ok(GroupDetail { group, members })
    }

    async fn create_group(
        &self,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Group, DirectoryError> {
        let name = validation::group_name(name).map_err(DirectoryError::Validation)?;
        let permissions = Self::clean_group_permissions(permissions)?;

        let groups = self.store.group_repo();
        if groups.find_by_name(&name).await?.is_some() {
            return Err(DirectoryError::DuplicateName(name));
        }

        let group = groups
            .create(&name, &permissions)
            .await
            .map_err(|e| Self::map_name_conflict(e, &name))?;

        info!(group_id = %group.id, name = %group.name, "Group created");
        self.publish(IdentityEvent::GroupCreated {
            group_id: group.id,
            name: group.name.clone(),
        });
        Ok(group)
    }

    async fn update_group(
        &self,
        id: GroupId,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Group, DirectoryError> {
        let name = validation::group_name(name).map_err(DirectoryError::Validation)?;
        let permissions = Self::clean_group_permissions(permissions)?;

        let groups = self.store.group_repo();
        let taken = groups
            .find_by_name(&name)
            .await?
            .is_some_and(|existing| existing.id != id);
        if taken {
            return Err(DirectoryError::DuplicateName(name));
        }

        let group = groups
            .update(id.value(), &name, &permissions)
            .await
            .map_err(|e| Self::map_name_conflict(e, &name))?
            .ok_or_else(|| DirectoryError::group_not_found(id))?;

        info!(group_id = %id, "Group updated");
        self.publish(IdentityEvent::GroupUpdated { group_id: id });
        Ok(group)
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), DirectoryError> {
        if !self.store.group_repo().delete(id.value()).await? {
            return Err(DirectoryError::group_not_found(id));
        }

        info!(group_id = %id, "Group deleted");
        self.publish(IdentityEvent::GroupDeleted { group_id: id });
        Ok(())
    }

    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), DirectoryError> {
        self.load_group(group_id).await?;
        self.load_user(user_id).await?;

        if self
            .store
            .group_repo()
            .add_member(user_id.value(), group_id.value())
            .await?
        {
            self.publish(IdentityEvent::MembershipChanged {
                user_id,
                group_id,
                member: true,
            });
        }
        Ok(())
    }

    async fn remove_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), DirectoryError> {
        self.load_group(group_id).await?;

        if self
            .store
            .group_repo()
            .remove_member(user_id.value(), group_id.value())
            .await?
        {
            self.publish(IdentityEvent::MembershipChanged {
                user_id,
                group_id,
                member: false,
            });
        }
        Ok(())
    }
}
