//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::repositories::user::{
    apply_throttle_state, generate_code, hash_password_async, needs_rehash, throttle_state,
    verify_password,
};
use crate::db::{Mutation, NewUserRecord, Store, User, is_unique_violation};
use crate::domain::events::IdentityEvent;
use crate::domain::permissions::PermissionMap;
use crate::domain::status::{LockoutStatus, ThrottlePolicy};
use crate::domain::{UserId, clock, normalize_email, validation};
use crate::services::auth_service::{
    AuthError, AuthService, Session, SocialFailure, SocialProfile,
};

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<Config>,
    policy: ThrottlePolicy,
    event_bus: broadcast::Sender<IdentityEvent>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        event_bus: broadcast::Sender<IdentityEvent>,
    ) -> Self {
        let policy = ThrottlePolicy::from(&config.security.auth_throttle);
        Self {
            store,
            config,
            policy,
            event_bus,
        }
    }

    fn publish(&self, event: IdentityEvent) {
        let _ = self.event_bus.send(event);
    }

    fn record_login(outcome: &'static str) {
        metrics::counter!("warden_logins_total", "outcome" => outcome).increment(1);
    }

    fn session_lifetime(&self, remember: bool) -> Duration {
        let sessions = &self.config.sessions;
        if remember {
            clock::days(sessions.remember_days)
        } else {
            clock::minutes(sessions.lifetime_minutes)
        }
    }

    /// Counts a failed password check against the account and returns the
    /// resulting lockout status with the number of failures in the window.
    async fn register_failure(&self, user_id: i32) -> Result<(LockoutStatus, u32), AuthError> {
        let policy = &self.policy;
        let outcome = self
            .store
            .user_repo()
            .modify(user_id, |row| {
                let mut state = throttle_state(row);
                let status = policy.record_failure(&mut state, Utc::now());
                apply_throttle_state(row, &state);
                Mutation::Commit((status, u32::try_from(state.failed_attempts).unwrap_or(0)))
            })
            .await?;

        let Some((status, failures)) = outcome else {
            return Ok((LockoutStatus::Normal, 0));
        };

        match status {
            LockoutStatus::TemporarilySuspended { until } => {
                warn!(user_id, %until, "Account suspended after repeated failed logins");
                self.publish(IdentityEvent::UserSuspended {
                    user_id: UserId::new(user_id),
                    until: until.to_rfc3339(),
                });
            }
            LockoutStatus::Banned => {
                warn!(user_id, "Account banned after repeated suspensions");
                self.store.session_repo().delete_for_user(user_id).await?;
                self.publish(IdentityEvent::UserBanned {
                    user_id: UserId::new(user_id),
                });
            }
            LockoutStatus::Normal => {}
        }

        Ok((status, failures))
    }

    /// Re-checks status, clears the throttle counters and opens a session.
    ///
    /// `expected_hash` guards against a password change that landed between
    /// verification and this write.
    async fn complete_login(
        &self,
        user_id: i32,
        expected_hash: Option<&str>,
        new_hash: Option<String>,
        remember: bool,
    ) -> Result<Session, AuthError> {
        let policy = &self.policy;
        let outcome = self
            .store
            .user_repo()
            .modify(user_id, |row| {
                let now = Utc::now();
                let mut state = throttle_state(row);

                match state.status(now) {
                    LockoutStatus::Banned => return Mutation::Abort(Err(AuthError::Banned)),
                    LockoutStatus::TemporarilySuspended { until } => {
                        return Mutation::Abort(Err(AuthError::Suspended { until }));
                    }
                    LockoutStatus::Normal => {}
                }
                if !row.activated {
                    return Mutation::Abort(Err(AuthError::NotActivated));
                }
                if expected_hash.is_some_and(|hash| hash != row.password_hash) {
                    return Mutation::Abort(Err(AuthError::InvalidCredentials));
                }

                policy.record_success(&mut state);
                apply_throttle_state(row, &state);
                row.last_login_at = Some(now);
                if let Some(hash) = &new_hash {
                    row.password_hash.clone_from(hash);
                }
                Mutation::Commit(Ok(()))
            })
            .await?;

        outcome.ok_or(AuthError::InvalidCredentials)??;

        if new_hash.is_some() {
            info!(user_id, "Password hash migrated to current parameters");
        }

        let sessions = self.store.session_repo();
        let purged = sessions.purge_expired_for_user(user_id, Utc::now()).await?;
        if purged > 0 {
            debug!(user_id, purged, "Purged expired sessions");
        }

        let session = sessions
            .create(user_id, remember, self.session_lifetime(remember))
            .await?;

        Self::record_login("success");
        self.publish(IdentityEvent::LoginSucceeded {
            user_id: UserId::new(user_id),
            remember,
        });

        Ok(Session::from(session))
    }

    fn check_status(model: &crate::entities::users::Model) -> Result<(), AuthError> {
        match throttle_state(model).status(Utc::now()) {
            LockoutStatus::Banned => Err(AuthError::Banned),
            LockoutStatus::TemporarilySuspended { until } => Err(AuthError::Suspended { until }),
            LockoutStatus::Normal => Ok(()),
        }
    }

    /// Finds or creates the local user for a provider identity.
    async fn resolve_social_user(&self, profile: &SocialProfile) -> Result<i32, AuthError> {
        let social = self.store.social_repo();
        if let Some(user_id) = social
            .find_user_id(&profile.provider, &profile.provider_user_id)
            .await?
        {
            return Ok(user_id);
        }

        let email = profile
            .email
            .as_deref()
            .map(validation::email)
            .transpose()
            .map_err(AuthError::Validation)?
            .ok_or_else(|| {
                AuthError::Validation("The provider did not supply an email address".to_string())
            })?;

        let users = self.store.user_repo();
        let user_id = match users.find_by_email(&email).await? {
            Some(existing) => existing.id,
            None => self.create_social_user(&email, profile).await?,
        };

        match social
            .link(&profile.provider, &profile.provider_user_id, user_id)
            .await
        {
            Ok(()) => {
                self.publish(IdentityEvent::SocialIdentityLinked {
                    user_id: UserId::new(user_id),
                    provider: profile.provider.clone(),
                });
                Ok(user_id)
            }
            Err(e) if is_unique_violation(&e) => social
                .find_user_id(&profile.provider, &profile.provider_user_id)
                .await?
                .ok_or_else(|| AuthError::Internal("Social identity vanished".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_social_user(
        &self,
        email: &str,
        profile: &SocialProfile,
    ) -> Result<i32, AuthError> {
        let (first_name, last_name) = split_display_name(profile.display_name.as_deref(), email);

        // Nobody knows this password; the account is reachable through the
        // provider or a password reset.
        let password_hash = hash_password_async(&generate_code(), &self.config.security).await?;

        let users = self.store.user_repo();
        let created = users
            .create(NewUserRecord {
                email: email.to_string(),
                first_name,
                last_name,
                password_hash,
                activated: true,
                activation_code: None,
                permissions: PermissionMap::new(),
            })
            .await;

        match created {
            Ok(model) => {
                info!(user_id = model.id, provider = %profile.provider, "Created user from social profile");
                self.publish(IdentityEvent::UserCreated {
                    user_id: UserId::new(model.id),
                    by: None,
                });
                Ok(model.id)
            }
            Err(e) if is_unique_violation(&e) => users
                .find_by_email(email)
                .await?
                .map(|m| m.id)
                .ok_or_else(|| AuthError::Internal("User vanished during social sign-in".to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn split_display_name(display_name: Option<&str>, email: &str) -> (String, String) {
    let fallback = email.split('@').next().unwrap_or(email);
    let name = display_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback);

    match name.split_once(char::is_whitespace) {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email);

        let Some(model) = self.store.user_repo().find_by_email(&email).await? else {
            Self::record_login("invalid_credentials");
            self.publish(IdentityEvent::LoginFailed {
                user_id: None,
                reason: "unknown_email".to_string(),
            });
            tokio::time::sleep(self.policy.login_delay(1)).await;
            return Err(AuthError::InvalidCredentials);
        };

        if !model.activated {
            Self::record_login("not_activated");
            return Err(AuthError::NotActivated);
        }

        if let Err(e) = Self::check_status(&model) {
            Self::record_login(if matches!(e, AuthError::Banned) {
                "banned"
            } else {
                "suspended"
            });
            return Err(e);
        }

        if !verify_password(&model.password_hash, password).await? {
            let (_, failures) = self.register_failure(model.id).await?;
            Self::record_login("invalid_credentials");
            self.publish(IdentityEvent::LoginFailed {
                user_id: Some(UserId::new(model.id)),
                reason: "wrong_password".to_string(),
            });
            tokio::time::sleep(self.policy.login_delay(failures.max(1))).await;
            return Err(AuthError::InvalidCredentials);
        }

        let security = &self.config.security;
        let new_hash = if security.auto_migrate_password_hashes
            && needs_rehash(&model.password_hash, security)
        {
            Some(hash_password_async(password, security).await?)
        } else {
            None
        };

        self.complete_login(model.id, Some(&model.password_hash), new_hash, remember)
            .await
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let sessions = self.store.session_repo();
        let now = Utc::now();
        let owner = sessions.find_live(token, now).await?.map(|s| s.user_id);

        let deleted = sessions.delete(token).await?;

        let purged = sessions.purge_expired(now).await?;
        if purged > 0 {
            debug!(purged, "Removed expired sessions");
        }

        if let (true, Some(user_id)) = (deleted, owner) {
            self.publish(IdentityEvent::LoggedOut {
                user_id: UserId::new(user_id),
            });
        }
        Ok(())
    }

    async fn check(&self, token: &str) -> Result<Option<User>, AuthError> {
        let Some(session) = self
            .store
            .session_repo()
            .find_live(token, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        let Some(model) = self.store.user_repo().find_by_id(session.user_id).await? else {
            return Ok(None);
        };

        if model.banned_at.is_some() {
            return Ok(None);
        }

        Ok(Some(User::try_from(model)?))
    }

    async fn login_with_social(
        &self,
        result: Result<SocialProfile, SocialFailure>,
        remember: bool,
    ) -> Result<Session, AuthError> {
        let profile = result.map_err(|failure| match failure {
            SocialFailure::Provider(message) => AuthError::ProviderError(message),
            SocialFailure::UserDenied => AuthError::UserDenied,
        })?;

        if profile.provider.trim().is_empty() || profile.provider_user_id.trim().is_empty() {
            return Err(AuthError::ProviderError(
                "Incomplete profile from provider".to_string(),
            ));
        }

        let user_id = self.resolve_social_user(&profile).await?;
        self.complete_login(user_id, None, None, remember).await
    }

    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        validation::password_confirmation(new_password, confirmation)
            .map_err(AuthError::Validation)?;
        validation::password_strength(new_password, &self.config.security)
            .map_err(AuthError::WeakPassword)?;
        if current_password == new_password {
            return Err(AuthError::Validation(
                "The new password must be different from the current password".to_string(),
            ));
        }

        let users = self.store.user_repo();
        let model = users
            .find_by_id(user_id.value())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        Self::check_status(&model)?;

        if !verify_password(&model.password_hash, current_password).await? {
            let (_, failures) = self.register_failure(model.id).await?;
            tokio::time::sleep(self.policy.password_delay(failures.max(1))).await;
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = hash_password_async(new_password, &self.config.security).await?;
        let old_hash = model.password_hash;

        let outcome = users
            .modify(user_id.value(), |row| {
                if row.password_hash != old_hash {
                    return Mutation::Abort(false);
                }
                row.password_hash.clone_from(&new_hash);
                row.reset_code = None;
                row.reset_code_issued_at = None;
                Mutation::Commit(true)
            })
            .await?;

        match outcome {
            Some(true) => {
                info!(user_id = %user_id, "Password changed");
                self.publish(IdentityEvent::PasswordChanged { user_id });
                Ok(())
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_splits_into_first_and_last() {
        assert_eq!(
            split_display_name(Some("Ada King Lovelace"), "ada@x.com"),
            ("Ada".to_string(), "King Lovelace".to_string())
        );
        assert_eq!(
            split_display_name(Some("Cher"), "cher@x.com"),
            ("Cher".to_string(), String::new())
        );
        assert_eq!(
            split_display_name(None, "grace@x.com"),
            ("grace".to_string(), String::new())
        );
    }
}
