//! Bootstrap an administrator account

use anyhow::Context;

use crate::config::Config;
use crate::constants::permissions::ADMINISTRATORS_GROUP;
use crate::db::repositories::user::hash_password_async;
use crate::db::{NewUserRecord, Store};
use crate::domain::permissions::PermissionMap;
use crate::domain::validation;

pub async fn cmd_create_admin(
    config: &Config,
    email: &str,
    first_name: &str,
    last_name: &str,
    password: &str,
) -> anyhow::Result<()> {
    let email = validation::email(email).map_err(anyhow::Error::msg)?;
    let first_name = validation::name("first name", first_name, 1).map_err(anyhow::Error::msg)?;
    let last_name = validation::name("last name", last_name, 1).map_err(anyhow::Error::msg)?;
    validation::password_strength(password, &config.security).map_err(anyhow::Error::msg)?;

    let store = Store::new(&config.general.database_path).await?;
    let users = store.user_repo();

    if users.email_taken(&email, None).await? {
        anyhow::bail!("A user with the email {email} already exists");
    }

    let group = store
        .group_repo()
        .find_by_name(ADMINISTRATORS_GROUP)
        .await?
        .with_context(|| format!("The {ADMINISTRATORS_GROUP} group is missing"))?;

    let password_hash = hash_password_async(password, &config.security).await?;
    let user = users
        .create(NewUserRecord {
            email: email.clone(),
            first_name,
            last_name,
            password_hash,
            activated: true,
            activation_code: None,
            permissions: PermissionMap::new(),
        })
        .await?;

    store.group_repo().add_member(user.id, group.id.value()).await?;

    println!("✓ Administrator {email} created (ID {})", user.id);
    Ok(())
}
