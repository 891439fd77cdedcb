//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::repositories::user::{codes_match, generate_code, hash_password_async};
use crate::db::{Mutation, NewUserRecord, Store, User, is_unique_violation};
use crate::domain::events::IdentityEvent;
use crate::domain::permissions::PermissionMap;
use crate::domain::{UserId, clock, validation};
use crate::entities::users;
use crate::services::account_service::{AccountError, AccountService, Registration};
use crate::services::mailer::{MailRequest, MailTemplate, Mailer};

enum ActivationOutcome {
    Activated,
    AlreadyActivated,
    Mismatch { burnt: bool },
}

pub struct SeaOrmAccountService {
    store: Store,
    config: Arc<Config>,
    mailer: Arc<dyn Mailer>,
    event_bus: broadcast::Sender<IdentityEvent>,
}

impl SeaOrmAccountService {
    #[must_use]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        mailer: Arc<dyn Mailer>,
        event_bus: broadcast::Sender<IdentityEvent>,
    ) -> Self {
        Self {
            store,
            config,
            mailer,
            event_bus,
        }
    }

    fn publish(&self, event: IdentityEvent) {
        let _ = self.event_bus.send(event);
    }

    fn link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.server.public_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn send_activation(&self, user: &users::Model, code: &str) {
        self.mailer.deliver(MailRequest {
            to: user.email.clone(),
            template: MailTemplate::Welcome,
            user_id: UserId::new(user.id),
            first_name: user.first_name.clone(),
            code: code.to_string(),
            link: self.link(&format!("account/activate/{}/{code}", user.id)),
        });
    }

    fn reset_ttl(&self) -> Duration {
        clock::minutes(self.config.accounts.reset_code_ttl_minutes)
    }

    async fn find_by_email(&self, email: &str) -> Result<users::Model, AccountError> {
        let email = validation::email(email).map_err(AccountError::Validation)?;
        self.store
            .user_repo()
            .find_by_email(&email)
            .await?
            .ok_or(AccountError::NotFound)
    }

    fn validate_new_password(&self, password: &str, confirmation: &str) -> Result<(), AccountError> {
        validation::password_confirmation(password, confirmation)
            .map_err(AccountError::Validation)?;
        validation::password_strength(password, &self.config.security)
            .map_err(AccountError::WeakPassword)
    }
}

fn reset_code_valid(
    row: &users::Model,
    code: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> bool {
    let (Some(stored), Some(issued_at)) = (&row.reset_code, row.reset_code_issued_at) else {
        return false;
    };
    codes_match(stored, code) && now < clock::deadline(issued_at, ttl)
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn register(&self, registration: Registration) -> Result<User, AccountError> {
        let email = validation::email(&registration.email).map_err(AccountError::Validation)?;
        let first_name = validation::name("first name", &registration.first_name, 1)
            .map_err(AccountError::Validation)?;
        let last_name = validation::name("last name", &registration.last_name, 1)
            .map_err(AccountError::Validation)?;
        self.validate_new_password(&registration.password, &registration.password_confirmation)?;

        let users = self.store.user_repo();
        if users.email_taken(&email, None).await? {
            return Err(AccountError::DuplicateEmail);
        }

        let password_hash =
            hash_password_async(&registration.password, &self.config.security).await?;
        let code = generate_code();

        let model = users
            .create(NewUserRecord {
                email,
                first_name,
                last_name,
                password_hash,
                activated: false,
                activation_code: Some(code.clone()),
                permissions: PermissionMap::new(),
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AccountError::DuplicateEmail
                } else {
                    AccountError::from(e)
                }
            })?;

        info!(user_id = model.id, "User registered");
        self.send_activation(&model, &code);
        self.publish(IdentityEvent::UserRegistered {
            user_id: UserId::new(model.id),
            email: model.email.clone(),
        });

        Ok(User::try_from(model)?)
    }

    async fn activate(&self, user_id: UserId, code: &str) -> Result<User, AccountError> {
        let max_attempts =
            i32::try_from(self.config.accounts.activation_max_attempts.max(1)).unwrap_or(i32::MAX);

        let outcome = self
            .store
            .user_repo()
            .modify(user_id.value(), |row| {
                if row.activated {
                    return Mutation::Abort(ActivationOutcome::AlreadyActivated);
                }
                let Some(stored) = row.activation_code.as_deref() else {
                    return Mutation::Abort(ActivationOutcome::Mismatch { burnt: true });
                };

                if codes_match(stored, code) {
                    row.activated = true;
                    row.activation_code = None;
                    row.activation_attempts = 0;
                    row.activated_at = Some(Utc::now());
                    return Mutation::Commit(ActivationOutcome::Activated);
                }

                row.activation_attempts += 1;
                let burnt = row.activation_attempts >= max_attempts;
                if burnt {
                    row.activation_code = None;
                }
                Mutation::Commit(ActivationOutcome::Mismatch { burnt })
            })
            .await?
            .ok_or(AccountError::NotFound)?;

        match outcome {
            ActivationOutcome::Activated => {
                info!(user_id = %user_id, "User activated");
                self.publish(IdentityEvent::UserActivated { user_id });
                let model = self
                    .store
                    .user_repo()
                    .find_by_id(user_id.value())
                    .await?
                    .ok_or(AccountError::NotFound)?;
                Ok(User::try_from(model)?)
            }
            ActivationOutcome::AlreadyActivated => Err(AccountError::AlreadyActivated),
            ActivationOutcome::Mismatch { burnt } => {
                if burnt {
                    warn!(user_id = %user_id, "Activation code invalidated after repeated mismatches");
                }
                self.publish(IdentityEvent::ActivationFailed {
                    user_id,
                    code_burnt: burnt,
                });
                Err(AccountError::CodeMismatch)
            }
        }
    }

    async fn resend_activation(&self, email: &str) -> Result<(), AccountError> {
        let model = self.find_by_email(email).await?;
        if model.activated {
            return Err(AccountError::AlreadyActivated);
        }

        let code = generate_code();
        let updated = self
            .store
            .user_repo()
            .modify(model.id, |row| {
                if row.activated {
                    return Mutation::Abort(None);
                }
                row.activation_code = Some(code.clone());
                row.activation_attempts = 0;
                Mutation::Commit(Some(row.clone()))
            })
            .await?
            .ok_or(AccountError::NotFound)?
            .ok_or(AccountError::AlreadyActivated)?;

        self.send_activation(&updated, &code);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<String, AccountError> {
        let model = self.find_by_email(email).await?;
        let code = generate_code();

        self.store
            .user_repo()
            .modify(model.id, |row| {
                row.reset_code = Some(code.clone());
                row.reset_code_issued_at = Some(Utc::now());
                Mutation::Commit(())
            })
            .await?
            .ok_or(AccountError::NotFound)?;

        self.mailer.deliver(MailRequest {
            to: model.email.clone(),
            template: MailTemplate::ForgotPassword,
            user_id: UserId::new(model.id),
            first_name: model.first_name.clone(),
            code: code.clone(),
            link: self.link(&format!("account/forgot-password/{}/{code}", model.id)),
        });
        self.publish(IdentityEvent::PasswordResetRequested {
            user_id: UserId::new(model.id),
        });

        Ok(code)
    }

    async fn check_reset_code(&self, user_id: UserId, code: &str) -> Result<(), AccountError> {
        let model = self
            .store
            .user_repo()
            .find_by_id(user_id.value())
            .await?
            .ok_or(AccountError::NotFound)?;

        if reset_code_valid(&model, code, self.reset_ttl(), Utc::now()) {
            Ok(())
        } else {
            Err(AccountError::CodeInvalidOrExpired)
        }
    }

    async fn confirm_password_reset(
        &self,
        user_id: UserId,
        code: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AccountError> {
        self.validate_new_password(new_password, confirmation)?;

        // Fail fast before paying for a hash.
        self.check_reset_code(user_id, code).await?;

        let new_hash = hash_password_async(new_password, &self.config.security).await?;
        let ttl = self.reset_ttl();

        let consumed = self
            .store
            .user_repo()
            .modify(user_id.value(), |row| {
                if !reset_code_valid(row, code, ttl, Utc::now()) {
                    return Mutation::Abort(false);
                }
                row.password_hash.clone_from(&new_hash);
                row.reset_code = None;
                row.reset_code_issued_at = None;
                Mutation::Commit(true)
            })
            .await?
            .ok_or(AccountError::NotFound)?;

        if !consumed {
            return Err(AccountError::CodeInvalidOrExpired);
        }

        info!(user_id = %user_id, "Password reset completed");
        self.publish(IdentityEvent::PasswordReset { user_id });
        Ok(())
    }
}
