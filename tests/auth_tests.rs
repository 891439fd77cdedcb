mod common;

use chrono::{Duration, Utc};
use common::{PASSWORD, TestContext};
use warden::db::Mutation;
use warden::db::repositories::user::hash_password;
use warden::services::{
    AuthError, AuthService, DirectoryService, SocialFailure, SocialProfile,
};

async fn fail_login(ctx: &TestContext, email: &str) -> AuthError {
    ctx.state
        .auth_service
        .authenticate(email, "wrong password", false)
        .await
        .expect_err("Login with a wrong password must fail")
}

/// Moves any running suspension into the past.
async fn expire_suspension(ctx: &TestContext, user_id: i32) {
    ctx.state
        .store
        .user_repo()
        .modify(user_id, |row| {
            if row.suspended_until.is_some() {
                row.suspended_until = Some(Utc::now() - Duration::seconds(1));
            }
            Mutation::Commit(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unactivated_user_cannot_login() {
    let mut ctx = TestContext::new().await;
    ctx.register("pending@x.com").await;

    let result = ctx
        .state
        .auth_service
        .authenticate("pending@x.com", PASSWORD, false)
        .await;
    assert!(matches!(result, Err(AuthError::NotActivated)));
}

#[tokio::test]
async fn test_unknown_email_is_invalid_credentials() {
    let ctx = TestContext::new().await;
    let err = fail_login(&ctx, "nobody@x.com").await;
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_email_lookup_ignores_case() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("case@x.com").await;

    let session = ctx
        .state
        .auth_service
        .authenticate("  CASE@x.com ", PASSWORD, false)
        .await
        .unwrap();
    assert_eq!(session.user_id, user.id);
}

#[tokio::test]
async fn test_repeated_failures_suspend_account() {
    let mut ctx = TestContext::with_config(|c| {
        c.security.auth_throttle.max_attempts = 3;
        c.security.auth_throttle.suspensions_before_ban = 0;
    })
    .await;
    let user = ctx.register_activated("throttle@x.com").await;

    for _ in 0..3 {
        assert!(matches!(
            fail_login(&ctx, "throttle@x.com").await,
            AuthError::InvalidCredentials
        ));
    }

    // The correct password does not help while suspended.
    let result = ctx
        .state
        .auth_service
        .authenticate("throttle@x.com", PASSWORD, false)
        .await;
    match result {
        Err(AuthError::Suspended { until }) => assert!(until > Utc::now()),
        other => panic!("Expected Suspended, got {other:?}"),
    }

    expire_suspension(&ctx, user.id.value()).await;
    ctx.state
        .auth_service
        .authenticate("throttle@x.com", PASSWORD, false)
        .await
        .unwrap();

    let reloaded = ctx.reload(user.id).await;
    assert_eq!(reloaded.throttle.failed_attempts, 0);
    assert_eq!(reloaded.throttle.suspension_count, 0);
}

#[tokio::test]
async fn test_repeated_suspensions_escalate_to_ban() {
    let mut ctx = TestContext::with_config(|c| {
        c.security.auth_throttle.max_attempts = 2;
        c.security.auth_throttle.suspensions_before_ban = 2;
    })
    .await;
    let user = ctx.register_activated("escalate@x.com").await;

    for _ in 0..2 {
        fail_login(&ctx, "escalate@x.com").await;
    }
    assert!(matches!(
        fail_login(&ctx, "escalate@x.com").await,
        AuthError::Suspended { .. }
    ));

    expire_suspension(&ctx, user.id.value()).await;
    for _ in 0..2 {
        fail_login(&ctx, "escalate@x.com").await;
    }

    let result = ctx
        .state
        .auth_service
        .authenticate("escalate@x.com", PASSWORD, false)
        .await;
    assert!(matches!(result, Err(AuthError::Banned)));

    // Bans never expire on their own.
    expire_suspension(&ctx, user.id.value()).await;
    let result = ctx
        .state
        .auth_service
        .authenticate("escalate@x.com", PASSWORD, false)
        .await;
    assert!(matches!(result, Err(AuthError::Banned)));
}

#[tokio::test]
async fn test_banned_user_never_authenticates() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("admin@x.com").await;
    let user = ctx.register_activated("victim@x.com").await;

    let session = ctx
        .state
        .auth_service
        .authenticate("victim@x.com", PASSWORD, true)
        .await
        .unwrap();

    ctx.state
        .directory_service
        .ban_user(admin.id, user.id)
        .await
        .unwrap();

    let result = ctx
        .state
        .auth_service
        .authenticate("victim@x.com", PASSWORD, false)
        .await;
    assert!(matches!(result, Err(AuthError::Banned)));

    // Existing sessions die with the ban.
    assert!(ctx.state.auth_service.check(&session.token).await.unwrap().is_none());
    assert_eq!(
        ctx.state
            .store
            .session_repo()
            .count_for_user(user.id.value())
            .await
            .unwrap(),
        0
    );

    // Lifting a suspension does not lift a ban.
    let after = ctx
        .state
        .directory_service
        .unsuspend_user(user.id)
        .await
        .unwrap();
    assert!(after.throttle.banned_at.is_some());
}

#[tokio::test]
async fn test_admin_suspend_and_unsuspend() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("admin@x.com").await;
    let user = ctx.register_activated("paused@x.com").await;
    let directory = ctx.state.directory_service.clone();

    directory.suspend_user(admin.id, user.id).await.unwrap();
    let result = ctx
        .state
        .auth_service
        .authenticate("paused@x.com", PASSWORD, false)
        .await;
    assert!(matches!(result, Err(AuthError::Suspended { .. })));

    directory.unsuspend_user(user.id).await.unwrap();
    ctx.state
        .auth_service
        .authenticate("paused@x.com", PASSWORD, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_logout_ends_session() {
    let mut ctx = TestContext::new().await;
    ctx.register_activated("bye@x.com").await;
    let auth = ctx.state.auth_service.clone();

    let session = auth.authenticate("bye@x.com", PASSWORD, false).await.unwrap();
    assert!(auth.check(&session.token).await.unwrap().is_some());

    auth.logout(&session.token).await.unwrap();
    assert!(auth.check(&session.token).await.unwrap().is_none());

    // Idempotent.
    auth.logout(&session.token).await.unwrap();
    assert!(auth.check("not-a-token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remember_me_extends_session() {
    let mut ctx = TestContext::new().await;
    ctx.register_activated("keep@x.com").await;
    let auth = ctx.state.auth_service.clone();

    let short = auth.authenticate("keep@x.com", PASSWORD, false).await.unwrap();
    let long = auth.authenticate("keep@x.com", PASSWORD, true).await.unwrap();

    assert!(!short.remember);
    assert!(long.remember);
    assert!(long.expires_at - short.expires_at > Duration::days(1));
    assert_ne!(short.token, long.token);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("old@x.com").await;

    let session = ctx
        .state
        .store
        .session_repo()
        .create(user.id.value(), false, Duration::seconds(-5))
        .await
        .unwrap();

    assert!(ctx.state.auth_service.check(&session.token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_sweeps_expired_sessions_of_others() {
    let mut ctx = TestContext::new().await;
    let idle = ctx.register_activated("idle@x.com").await;
    ctx.register_activated("busy@x.com").await;
    let sessions = ctx.state.store.session_repo();

    sessions
        .create(idle.id.value(), false, Duration::seconds(-5))
        .await
        .unwrap();
    assert_eq!(sessions.count_for_user(idle.id.value()).await.unwrap(), 1);

    let auth = ctx.state.auth_service.clone();
    let session = auth.authenticate("busy@x.com", PASSWORD, false).await.unwrap();
    auth.logout(&session.token).await.unwrap();

    assert_eq!(sessions.count_for_user(idle.id.value()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_outdated_hash_is_migrated_on_login() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("legacy@x.com").await;

    let mut legacy = ctx.state.config.security.clone();
    legacy.argon2_time_cost = 2;
    let legacy_hash = hash_password(PASSWORD, &legacy).unwrap();
    ctx.state
        .store
        .user_repo()
        .modify(user.id.value(), |row| {
            row.password_hash.clone_from(&legacy_hash);
            Mutation::Commit(())
        })
        .await
        .unwrap();

    ctx.state
        .auth_service
        .authenticate("legacy@x.com", PASSWORD, false)
        .await
        .unwrap();

    let row = ctx
        .state
        .store
        .user_repo()
        .find_by_id(user.id.value())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(row.password_hash, legacy_hash);
    assert!(row.password_hash.contains("t=1"));
}

#[tokio::test]
async fn test_change_password() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("change@x.com").await;
    let auth = ctx.state.auth_service.clone();

    let result = auth
        .change_password(user.id, "wrong password", "new password 1", "new password 1")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    let result = auth
        .change_password(user.id, PASSWORD, PASSWORD, PASSWORD)
        .await;
    assert!(matches!(result, Err(AuthError::Validation(_))));

    let result = auth
        .change_password(user.id, PASSWORD, "new password 1", "new password 2")
        .await;
    assert!(matches!(result, Err(AuthError::Validation(_))));

    let result = auth.change_password(user.id, PASSWORD, "tiny", "tiny").await;
    assert!(matches!(result, Err(AuthError::WeakPassword(_))));

    auth.change_password(user.id, PASSWORD, "new password 1", "new password 1")
        .await
        .unwrap();

    assert!(matches!(
        auth.authenticate("change@x.com", PASSWORD, false).await,
        Err(AuthError::InvalidCredentials)
    ));
    auth.authenticate("change@x.com", "new password 1", false)
        .await
        .unwrap();
}

fn github_profile(uid: &str, email: Option<&str>) -> SocialProfile {
    SocialProfile {
        provider: "github".to_string(),
        provider_user_id: uid.to_string(),
        email: email.map(str::to_string),
        display_name: Some("Linus Torvalds".to_string()),
    }
}

#[tokio::test]
async fn test_social_login_creates_and_reuses_user() {
    let ctx = TestContext::new().await;
    let auth = ctx.state.auth_service.clone();

    let first = auth
        .login_with_social(Ok(github_profile("42", Some("linus@x.com"))), false)
        .await
        .unwrap();
    let user = auth.check(&first.token).await.unwrap().unwrap();
    assert!(user.is_activated());
    assert_eq!(user.email, "linus@x.com");
    assert_eq!(user.first_name, "Linus");
    assert_eq!(user.last_name, "Torvalds");

    // Keyed by provider identity, not by the email the provider reports now.
    let second = auth
        .login_with_social(Ok(github_profile("42", Some("changed@x.com"))), false)
        .await
        .unwrap();
    assert_eq!(second.user_id, first.user_id);
}

#[tokio::test]
async fn test_social_login_links_existing_account() {
    let mut ctx = TestContext::new().await;
    let existing = ctx.register_activated("member@x.com").await;

    let session = ctx
        .state
        .auth_service
        .login_with_social(Ok(github_profile("7", Some("Member@X.com"))), false)
        .await
        .unwrap();
    assert_eq!(session.user_id, existing.id);

    // Password login keeps working alongside the provider.
    ctx.state
        .auth_service
        .authenticate("member@x.com", PASSWORD, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_social_login_failures() {
    let ctx = TestContext::new().await;
    let auth = ctx.state.auth_service.clone();

    let result = auth
        .login_with_social(Err(SocialFailure::UserDenied), false)
        .await;
    assert!(matches!(result, Err(AuthError::UserDenied)));

    let result = auth
        .login_with_social(Err(SocialFailure::Provider("timeout".to_string())), false)
        .await;
    assert!(matches!(result, Err(AuthError::ProviderError(_))));

    let result = auth
        .login_with_social(Ok(github_profile("99", None)), false)
        .await;
    assert!(matches!(result, Err(AuthError::Validation(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_are_all_counted() {
    let mut ctx = TestContext::with_config(|c| {
        c.security.auth_throttle.max_attempts = 1000;
    })
    .await;
    let user = ctx.register_activated("race@x.com").await;

    let attempts: Vec<_> = (0..24)
        .map(|_| {
            let auth = ctx.state.auth_service.clone();
            tokio::spawn(async move {
                auth.authenticate("race@x.com", "wrong password", false)
                    .await
            })
        })
        .collect();

    for attempt in attempts {
        let result = attempt.await.unwrap();
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let reloaded = ctx.reload(user.id).await;
    assert_eq!(reloaded.throttle.failed_attempts, 24);
}
