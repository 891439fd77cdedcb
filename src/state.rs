use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::constants::limits::EVENT_BUS_CAPACITY;
use crate::db::Store;
use crate::domain::events::IdentityEvent;
use crate::services::mailer::spawn_log_transport;
use crate::services::{
    AccessController, AccountService, AuditService, AuthService, ChannelMailer,
    DirectoryService, Mailer, SeaOrmAccountService, SeaOrmAuthService, SeaOrmDirectoryService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub event_bus: broadcast::Sender<IdentityEvent>,

    pub mailer: Arc<dyn Mailer>,

    pub auth_service: Arc<dyn AuthService>,

    pub account_service: Arc<dyn AccountService>,

    pub directory_service: Arc<dyn DirectoryService>,

    pub access: AccessController,
}

impl SharedState {
    /// Builds the state with the logging mail transport.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (mailer, rx) = ChannelMailer::new();
        spawn_log_transport(rx, config.mail.clone());
        Self::with_mailer(config, Arc::new(mailer)).await
    }

    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let purged = store.session_repo().purge_expired(Utc::now()).await?;
        if purged > 0 {
            info!(purged, "Removed expired sessions");
        }

        let (event_bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let audit = Arc::new(AuditService::new(event_bus.clone()));
        audit.start_listener();

        let config = Arc::new(config);

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.clone(),
            event_bus.clone(),
        )) as Arc<dyn AuthService>;

        let account_service = Arc::new(SeaOrmAccountService::new(
            store.clone(),
            config.clone(),
            mailer.clone(),
            event_bus.clone(),
        )) as Arc<dyn AccountService>;

        let directory_service = Arc::new(SeaOrmDirectoryService::new(
            store.clone(),
            config.clone(),
            event_bus.clone(),
        )) as Arc<dyn DirectoryService>;

        let access = AccessController::new(store.clone());

        Ok(Self {
            config,
            store,
            event_bus,
            mailer,
            auth_service,
            account_service,
            directory_service,
            access,
        })
    }
}
