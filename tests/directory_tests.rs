mod common;

use common::{PASSWORD, TestContext};
use warden::domain::permissions::{PermissionMap, PermissionSet};
use warden::domain::{GroupId, UserId};
use warden::services::{AuthService, DirectoryError, DirectoryService, UserForm};

fn perms(keys: &[&str]) -> PermissionSet {
    keys.iter().map(|k| (*k).to_string()).collect()
}

fn user_form(email: &str) -> UserForm {
    UserForm {
        email: email.to_string(),
        first_name: "Margaret".to_string(),
        last_name: "Hamilton".to_string(),
        password: PASSWORD.to_string(),
        password_confirmation: PASSWORD.to_string(),
        activated: true,
        groups: Vec::new(),
        permissions: PermissionMap::new(),
    }
}

#[tokio::test]
async fn test_administrators_group_is_seeded() {
    let ctx = TestContext::new().await;
    let groups = ctx.state.directory_service.list_groups().await.unwrap();

    let admins = groups
        .iter()
        .find(|g| g.name == "Administrators")
        .expect("Seeded group");
    assert!(admins.permissions.contains("admin"));
    assert!(admins.permissions.contains("superuser"));
}

#[tokio::test]
async fn test_group_crud_and_duplicate_names() {
    let ctx = TestContext::new().await;
    let directory = ctx.state.directory_service.clone();

    let editors = directory
        .create_group("Editors", perms(&["content.edit", "Content.Publish"]))
        .await
        .unwrap();
    assert!(editors.permissions.contains("content.publish"));

    let dup = directory.create_group("Editors", PermissionSet::new()).await;
    assert!(matches!(dup, Err(DirectoryError::DuplicateName(_))));

    let bad_key = directory
        .create_group("Broken", perms(&["has space"]))
        .await;
    assert!(matches!(bad_key, Err(DirectoryError::Validation(_))));

    let reviewers = directory
        .create_group("Reviewers", PermissionSet::new())
        .await
        .unwrap();
    let rename = directory
        .update_group(reviewers.id, "Editors", PermissionSet::new())
        .await;
    assert!(matches!(rename, Err(DirectoryError::DuplicateName(_))));

    let renamed = directory
        .update_group(editors.id, "Writers", perms(&["content.edit"]))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Writers");
    assert_eq!(renamed.permissions.len(), 1);

    directory.delete_group(editors.id).await.unwrap();
    assert!(matches!(
        directory.get_group(editors.id).await,
        Err(DirectoryError::NotFound(_))
    ));
    assert!(matches!(
        directory.delete_group(editors.id).await,
        Err(DirectoryError::NotFound(_))
    ));
    assert!(matches!(
        directory
            .update_group(GroupId::new(999), "Ghosts", PermissionSet::new())
            .await,
        Err(DirectoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_membership_is_idempotent() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("member@x.com").await;
    let directory = ctx.state.directory_service.clone();

    let group = directory
        .create_group("Staff", perms(&["staff"]))
        .await
        .unwrap();

    directory.add_member(group.id, user.id).await.unwrap();
    directory.add_member(group.id, user.id).await.unwrap();

    let detail = directory.get_group(group.id).await.unwrap();
    assert_eq!(detail.members.len(), 1);
    assert_eq!(detail.members[0].id, user.id);

    directory.remove_member(group.id, user.id).await.unwrap();
    directory.remove_member(group.id, user.id).await.unwrap();
    assert!(directory.get_group(group.id).await.unwrap().members.is_empty());

    assert!(matches!(
        directory.add_member(group.id, UserId::new(999)).await,
        Err(DirectoryError::NotFound(_))
    ));
    assert!(matches!(
        directory.add_member(GroupId::new(999), user.id).await,
        Err(DirectoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_explicit_deny_beats_group_grant() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;
    let user = ctx.create_admin("demoted@x.com").await;
    let directory = ctx.state.directory_service.clone();
    let access = ctx.state.access.clone();

    let current = ctx.reload(user.id).await;
    assert!(access.authorize(&current, "admin").await.unwrap());

    let detail = directory.get_user(user.id).await.unwrap();
    let mut form = user_form("demoted@x.com");
    form.password = String::new();
    form.password_confirmation = String::new();
    form.groups = detail.groups.iter().map(|g| g.id).collect();
    form.permissions = PermissionMap::from([("admin".to_string(), false)]);
    directory.update_user(admin.id, user.id, form).await.unwrap();

    let current = ctx.reload(user.id).await;
    assert!(!access.authorize(&current, "admin").await.unwrap());
    assert!(access.authorize(&current, "superuser").await.unwrap());
    assert!(!access.authorize(&current, "unheard.of").await.unwrap());

    let detail = directory.get_user(user.id).await.unwrap();
    assert_eq!(detail.effective_permissions.get("admin"), Some(&false));
    assert_eq!(detail.effective_permissions.get("superuser"), Some(&true));
}

#[tokio::test]
async fn test_explicit_grant_without_group() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;
    let directory = ctx.state.directory_service.clone();

    let mut form = user_form("reporter@x.com");
    form.permissions = PermissionMap::from([("reports.view".to_string(), true)]);
    let user = directory.create_user(admin.id, form).await.unwrap();

    assert!(
        ctx.state
            .access
            .authorize(&user, "reports.view")
            .await
            .unwrap()
    );
    assert!(!ctx.state.access.authorize(&user, "admin").await.unwrap());
}

#[tokio::test]
async fn test_admin_create_user_validation() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;
    let directory = ctx.state.directory_service.clone();

    let mut short_name = user_form("short@x.com");
    short_name.first_name = "Al".to_string();
    assert!(matches!(
        directory.create_user(admin.id, short_name).await,
        Err(DirectoryError::Validation(_))
    ));

    let mut no_password = user_form("nopw@x.com");
    no_password.password = String::new();
    no_password.password_confirmation = String::new();
    assert!(matches!(
        directory.create_user(admin.id, no_password).await,
        Err(DirectoryError::WeakPassword(_))
    ));

    let mut unknown_group = user_form("lost@x.com");
    unknown_group.groups = vec![GroupId::new(999)];
    assert!(matches!(
        directory.create_user(admin.id, unknown_group).await,
        Err(DirectoryError::Validation(_))
    ));

    assert!(matches!(
        directory.create_user(admin.id, user_form("ROOT@x.com")).await,
        Err(DirectoryError::DuplicateEmail)
    ));
}

#[tokio::test]
async fn test_admin_update_user() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;
    let directory = ctx.state.directory_service.clone();

    let staff = directory.create_group("Staff", perms(&["staff"])).await.unwrap();
    let ops = directory.create_group("Ops", perms(&["ops"])).await.unwrap();

    let mut form = user_form("worker@x.com");
    form.activated = false;
    form.groups = vec![staff.id];
    let user = directory.create_user(admin.id, form).await.unwrap();
    assert!(!user.is_activated());

    let taken = directory
        .update_user(admin.id, user.id, user_form("root@x.com"))
        .await;
    assert!(matches!(taken, Err(DirectoryError::DuplicateEmail)));

    let mut form = user_form("worker@x.com");
    form.first_name = "Katherine".to_string();
    form.password = "a fresh password".to_string();
    form.password_confirmation = "a fresh password".to_string();
    form.groups = vec![ops.id];
    let updated = directory.update_user(admin.id, user.id, form).await.unwrap();
    assert_eq!(updated.first_name, "Katherine");
    assert!(updated.is_activated());

    let detail = directory.get_user(user.id).await.unwrap();
    let group_ids: Vec<GroupId> = detail.groups.iter().map(|g| g.id).collect();
    assert_eq!(group_ids, vec![ops.id]);

    ctx.state
        .auth_service
        .authenticate("worker@x.com", "a fresh password", false)
        .await
        .unwrap();

    // An empty password keeps the current one; activation is never revoked.
    let mut form = user_form("worker@x.com");
    form.password = String::new();
    form.password_confirmation = String::new();
    form.activated = false;
    let kept = directory.update_user(admin.id, user.id, form).await.unwrap();
    assert!(kept.is_activated());
    ctx.state
        .auth_service
        .authenticate("worker@x.com", "a fresh password", false)
        .await
        .unwrap();

    assert!(matches!(
        directory
            .update_user(admin.id, UserId::new(999), user_form("ghost@x.com"))
            .await,
        Err(DirectoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_self_deletion_is_forbidden() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;

    let result = ctx
        .state
        .directory_service
        .delete_user(admin.id, admin.id)
        .await;
    assert!(matches!(result, Err(DirectoryError::SelfDeletionForbidden)));

    let result = ctx.state.directory_service.ban_user(admin.id, admin.id).await;
    assert!(matches!(result, Err(DirectoryError::SelfLockoutForbidden)));

    // Still there.
    ctx.reload(admin.id).await;
}

#[tokio::test]
async fn test_deleting_user_detaches_memberships() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("root@x.com").await;
    let user = ctx.register_activated("leaving@x.com").await;
    let directory = ctx.state.directory_service.clone();

    let group = directory.create_group("Staff", perms(&["staff"])).await.unwrap();
    directory.add_member(group.id, user.id).await.unwrap();
    let session = ctx
        .state
        .auth_service
        .authenticate("leaving@x.com", PASSWORD, false)
        .await
        .unwrap();

    directory.delete_user(admin.id, user.id).await.unwrap();

    assert!(matches!(
        directory.get_user(user.id).await,
        Err(DirectoryError::NotFound(_))
    ));
    assert!(directory.get_group(group.id).await.unwrap().members.is_empty());
    assert!(
        ctx.state
            .store
            .group_repo()
            .groups_for_user(user.id.value())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(ctx.state.auth_service.check(&session.token).await.unwrap().is_none());

    assert!(matches!(
        directory.delete_user(admin.id, user.id).await,
        Err(DirectoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_users_paginates() {
    let mut ctx = TestContext::new().await;
    for i in 0..12 {
        ctx.register(&format!("user{i}@x.com")).await;
    }
    let directory = ctx.state.directory_service.clone();

    let first = directory.list_users(1).await.unwrap();
    assert_eq!(first.total, 12);
    assert_eq!(first.per_page, 10);
    assert_eq!(first.users.len(), 10);

    let second = directory.list_users(2).await.unwrap();
    assert_eq!(second.users.len(), 2);

    // Page zero is treated as the first page.
    assert_eq!(directory.list_users(0).await.unwrap().page, 1);
}
