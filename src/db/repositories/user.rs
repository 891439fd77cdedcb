use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{Set, Unchanged},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;
use tracing::debug;

use crate::config::SecurityConfig;
use crate::constants::limits::VERSION_CONFLICT_RETRIES;
use crate::domain::permissions::{PermissionMap, decode_overrides, encode_overrides};
use crate::domain::status::{ActivationState, ThrottleState};
use crate::domain::{UserId, normalize_email};
use crate::entities::{prelude::*, sessions, social_identities, user_groups, users};

/// User data returned from repository (without password hash or codes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub activation: ActivationState,
    pub permissions: PermissionMap,
    pub throttle: ThrottleState,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activation == ActivationState::Activated
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl TryFrom<users::Model> for User {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self> {
        let permissions = decode_overrides(&model.permissions)
            .with_context(|| format!("Corrupt permission overrides on user {}", model.id))?;
        let throttle = throttle_state(&model);

        Ok(Self {
            id: UserId::new(model.id),
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            activation: if model.activated {
                ActivationState::Activated
            } else {
                ActivationState::Unactivated
            },
            permissions,
            throttle,
            activated_at: model.activated_at,
            last_login_at: model.last_login_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Reads the throttle columns of a row.
#[must_use]
pub fn throttle_state(model: &users::Model) -> ThrottleState {
    ThrottleState {
        failed_attempts: model.failed_attempts,
        last_failed_at: model.last_failed_at,
        suspended_until: model.suspended_until,
        suspension_count: model.suspension_count,
        banned_at: model.banned_at,
    }
}

/// Writes throttle columns back onto a row.
pub fn apply_throttle_state(model: &mut users::Model, state: &ThrottleState) {
    model.failed_attempts = state.failed_attempts;
    model.last_failed_at = state.last_failed_at;
    model.suspended_until = state.suspended_until;
    model.suspension_count = state.suspension_count;
    model.banned_at = state.banned_at;
}

/// Insert payload. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub activated: bool,
    pub activation_code: Option<String>,
    pub permissions: PermissionMap,
}

/// Outcome of a mutation closure passed to [`UserRepository::modify`].
pub enum Mutation<T> {
    /// Persist the modified row and return the value.
    Commit(T),
    /// Discard any change and return the value.
    Abort(T),
}

pub struct UserRepository {
    conn: DatabaseConnection,
    writes: Arc<Mutex<()>>,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, writes: Arc<Mutex<()>>) -> Self {
        Self { conn, writes }
    }

    pub async fn create(&self, record: NewUserRecord) -> Result<users::Model> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();

        let active = users::ActiveModel {
            email: Set(normalize_email(&record.email)),
            first_name: Set(record.first_name),
            last_name: Set(record.last_name),
            password_hash: Set(record.password_hash),
            permissions: Set(encode_overrides(&record.permissions)),
            activated: Set(record.activated),
            activation_code: Set(record.activation_code),
            activation_attempts: Set(0),
            activated_at: Set(record.activated.then_some(now)),
            reset_code: Set(None),
            reset_code_issued_at: Set(None),
            failed_attempts: Set(0),
            last_failed_at: Set(None),
            suspended_until: Set(None),
            suspension_count: Set(0),
            banned_at: Set(None),
            last_login_at: Set(None),
            version: Set(0),
            created_at: Set(stamp.clone()),
            updated_at: Set(stamp),
            ..Default::default()
        };

        // Unique violations must stay downcastable to `DbErr`, so no context here.
        let inserted = Users::insert(active).exec(&self.conn).await?;

        Users::find_by_id(inserted.last_insert_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created user"))
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    /// Case-insensitive lookup.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn email_taken(&self, email: &str, except: Option<i32>) -> Result<bool> {
        let mut query = Users::find().filter(users::Column::Email.eq(normalize_email(email)));
        if let Some(id) = except {
            query = query.filter(users::Column::Id.ne(id));
        }
        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check email uniqueness")?;
        Ok(count > 0)
    }

    /// Returns one page (zero-based) of users ordered by id, and the total count.
    pub async fn list(&self, page: u64, per_page: u64) -> Result<(Vec<users::Model>, u64)> {
        let paginator = Users::find()
            .order_by_asc(users::Column::Id)
            .paginate(&self.conn, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page).await?;

        Ok((items, total))
    }

    /// Read-modify-write of a single user row.
    ///
    /// Cycles from the same process run one at a time behind the store's
    /// write gate, so no update is lost between them. The `version` check
    /// still guards against writers in other processes (the CLI): the closure
    /// is re-applied to a fresh read whenever one of those got in between.
    /// Returns `None` if the user does not exist.
    pub async fn modify<T, F>(&self, id: i32, mut mutate: F) -> Result<Option<T>>
    where
        F: FnMut(&mut users::Model) -> Mutation<T> + Send,
        T: Send,
    {
        let _gate = self.writes.lock().await;

        for attempt in 0..VERSION_CONFLICT_RETRIES {
            let Some(current) = self.find_by_id(id).await? else {
                return Ok(None);
            };

            let mut next = current.clone();
            let out = match mutate(&mut next) {
                Mutation::Abort(out) => return Ok(Some(out)),
                Mutation::Commit(out) => out,
            };

            next.id = current.id;
            next.version = current.version + 1;
            next.updated_at = Utc::now().to_rfc3339();

            let result = Users::update(into_update(next))
                .filter(users::Column::Version.eq(current.version))
                .exec(&self.conn)
                .await;

            match result {
                Ok(_) => return Ok(Some(out)),
                Err(DbErr::RecordNotUpdated) => {
                    debug!(user_id = id, attempt, "User version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!("User {id} kept changing concurrently; giving up after retries")
    }

    /// Hard-deletes a user together with memberships, sessions and linked
    /// social identities.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(user) = Users::find_by_id(id).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(false);
        };

        UserGroups::delete_many()
            .filter(user_groups::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        Sessions::delete_many()
            .filter(sessions::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        SocialIdentities::delete_many()
            .filter(social_identities::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user.delete(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}

fn into_update(model: users::Model) -> users::ActiveModel {
    users::ActiveModel {
        id: Unchanged(model.id),
        email: Set(model.email),
        first_name: Set(model.first_name),
        last_name: Set(model.last_name),
        password_hash: Set(model.password_hash),
        permissions: Set(model.permissions),
        activated: Set(model.activated),
        activation_code: Set(model.activation_code),
        activation_attempts: Set(model.activation_attempts),
        activated_at: Set(model.activated_at),
        reset_code: Set(model.reset_code),
        reset_code_issued_at: Set(model.reset_code_issued_at),
        failed_attempts: Set(model.failed_attempts),
        last_failed_at: Set(model.last_failed_at),
        suspended_until: Set(model.suspended_until),
        suspension_count: Set(model.suspension_count),
        banned_at: Set(model.banned_at),
        last_login_at: Set(model.last_login_at),
        version: Set(model.version),
        created_at: Unchanged(model.created_at),
        updated_at: Set(model.updated_at),
    }
}

fn argon2_for(config: &SecurityConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2_for(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Hashes on the blocking pool; Argon2 is CPU-intensive and would stall the
/// async runtime.
pub async fn hash_password_async(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();
    task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .context("Password hashing task panicked")?
}

/// Verifies a password against a stored PHC hash. The comparison inside
/// `argon2` is constant-time.
pub async fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let password_hash = password_hash.to_string();
    let password = password.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// True when a stored hash was produced with other Argon2 params than the
/// configured ones.
#[must_use]
pub fn needs_rehash(password_hash: &str, config: &SecurityConfig) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return true;
    };
    let Ok(params) = Params::try_from(&parsed) else {
        return true;
    };

    parsed.algorithm != Algorithm::Argon2id.ident()
        || params.m_cost() != config.argon2_memory_cost_kib
        || params.t_cost() != config.argon2_time_cost
        || params.p_cost() != config.argon2_parallelism
}

/// Generate a random single-use code (64 character hex string)
#[must_use]
pub fn generate_code() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Compares a submitted code with the stored one without short-circuiting on
/// the first differing byte.
#[must_use]
pub fn codes_match(stored: &str, submitted: &str) -> bool {
    let (a, b) = (stored.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
