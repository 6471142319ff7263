use std::sync::Arc;

use sqlx::PgPool;

use crate::accounts::{AccountService, PgProfileStore};
use crate::auth::PgIdentityProvider;
use crate::config::AppConfig;
use crate::notify::LogNotifier;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let storage = Arc::new(Storage::new(&config.storage).await?);
        let identity = Arc::new(PgIdentityProvider::new(db.clone()));

        let accounts = AccountService::new(
            config.accounts.clone(),
            Arc::new(PgProfileStore::new(db.clone())),
            storage,
            identity.clone(),
        )
        .with_identity_admin(identity)
        .with_notifier(Arc::new(LogNotifier));

        Ok(Self {
            db,
            config,
            accounts: Arc::new(accounts),
        })
    }
}
