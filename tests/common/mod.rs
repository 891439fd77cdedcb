#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use warden::config::Config;
use warden::db::User;
use warden::domain::UserId;
use warden::services::{
    AccountService, ChannelMailer, DirectoryService, MailRequest, MailTemplate, Registration,
};
use warden::state::SharedState;

pub const PASSWORD: &str = "correct horse battery";

/// Cheap hashing and no failure delays, against a throwaway sqlite file.
pub fn test_config(db_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.auth_throttle.login_base_delay_ms = 0;
    config.security.auth_throttle.password_base_delay_ms = 0;
    config.server.secure_cookies = false;
    config.observability.metrics_enabled = false;
    config
}

pub struct TestContext {
    pub state: Arc<SharedState>,
    pub mail: UnboundedReceiver<MailRequest>,
    db_path: PathBuf,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let db_path =
            std::env::temp_dir().join(format!("warden-test-{}.db", uuid::Uuid::new_v4()));
        let mut config = test_config(&db_path);
        customize(&mut config);

        let (mailer, mail) = ChannelMailer::new();
        let state = SharedState::with_mailer(config, Arc::new(mailer))
            .await
            .expect("Failed to create shared state");

        Self {
            state: Arc::new(state),
            mail,
            db_path,
        }
    }

    pub async fn next_mail(&mut self) -> MailRequest {
        tokio::time::timeout(Duration::from_secs(5), self.mail.recv())
            .await
            .expect("Timed out waiting for mail")
            .expect("Mail channel closed")
    }

    /// Registers and returns the user with the activation code from the welcome mail.
    pub async fn register(&mut self, email: &str) -> (User, String) {
        let user = self
            .state
            .account_service
            .register(Registration {
                email: email.to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                password: PASSWORD.to_string(),
                password_confirmation: PASSWORD.to_string(),
            })
            .await
            .expect("Registration failed");

        let mail = self.next_mail().await;
        assert_eq!(mail.template, MailTemplate::Welcome);
        assert_eq!(mail.user_id, user.id);
        (user, mail.code)
    }

    pub async fn register_activated(&mut self, email: &str) -> User {
        let (user, code) = self.register(email).await;
        self.state
            .account_service
            .activate(user.id, &code)
            .await
            .expect("Activation failed")
    }

    /// Registers an activated user and puts them in the seeded Administrators group.
    pub async fn create_admin(&mut self, email: &str) -> User {
        let user = self.register_activated(email).await;
        let group = self
            .state
            .store
            .group_repo()
            .find_by_name("Administrators")
            .await
            .unwrap()
            .expect("Administrators group is seeded");
        self.state
            .directory_service
            .add_member(group.id, user.id)
            .await
            .unwrap();
        user
    }

    pub async fn reload(&self, id: UserId) -> User {
        self.state
            .directory_service
            .get_user(id)
            .await
            .expect("User should exist")
            .user
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}
