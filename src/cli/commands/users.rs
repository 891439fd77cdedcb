//! User listing and lockout commands

use chrono::Utc;

use crate::config::Config;
use crate::domain::status::LockoutStatus;
use crate::state::SharedState;

pub async fn cmd_list_users(config: &Config, page: u64) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let page = state.directory_service.list_users(page).await?;

    if page.users.is_empty() {
        println!("No users on this page.");
        return Ok(());
    }

    println!("Users (page {}, {} total)", page.page, page.total);
    println!("{:-<90}", "");

    let now = Utc::now();
    for user in &page.users {
        let status = match user.throttle.status(now) {
            LockoutStatus::Normal if user.is_activated() => "active".to_string(),
            LockoutStatus::Normal => "not activated".to_string(),
            LockoutStatus::TemporarilySuspended { until } => {
                format!("suspended until {}", until.format("%Y-%m-%d %H:%M UTC"))
            }
            LockoutStatus::Banned => "banned".to_string(),
        };
        println!(
            "{:>5}  {:<32} {:<24} {}",
            user.id,
            user.email,
            user.full_name(),
            status
        );
    }

    Ok(())
}

pub async fn cmd_unsuspend(config: &Config, email: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let Some(row) = state.store.user_repo().find_by_email(email).await? else {
        anyhow::bail!("No user with the email {email}");
    };

    let user = state
        .directory_service
        .unsuspend_user(crate::domain::UserId::new(row.id))
        .await?;

    match user.throttle.status(Utc::now()) {
        LockoutStatus::Banned => println!("⚠ {email} is banned; bans cannot be lifted"),
        _ => println!("✓ {email} can log in again"),
    }
    Ok(())
}
