use crate::config::AppConfig;
use crate::db;
use crate::storage::{LocalStorage, StorageClient};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let db = db::connect(&config.database_url).await?;
        let storage =
            Arc::new(LocalStorage::new(config.upload_dir.clone()).await?) as Arc<dyn StorageClient>;

        Ok(Self {
            db,
            config,
            storage,
        })
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>, storage: Arc<dyn StorageClient>) -> Self {
        Self {
            db,
            config,
            storage,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{GenerationConfig, JwtConfig, OverloadPolicy, PasswordConfig};
    use std::path::Path;

    pub(crate) fn test_config(upload_dir: &Path, overload: OverloadPolicy) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            upload_dir: upload_dir.to_path_buf(),
            host: "127.0.0.1".into(),
            port: 0,
            base_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
            },
            generation: GenerationConfig {
                simulate_delay: false,
                overload,
                ..GenerationConfig::default()
            },
        }
    }

    /// State over an in-memory database and a caller-owned upload dir.
    pub(crate) async fn state_with(config: AppConfig) -> AppState {
        let db = db::connect_in_memory().await.expect("in-memory db");
        let storage = LocalStorage::new(config.upload_dir.clone())
            .await
            .expect("upload dir");
        AppState::from_parts(db, Arc::new(config), Arc::new(storage))
    }

    pub(crate) async fn fake(upload_dir: &Path) -> AppState {
        state_with(test_config(upload_dir, OverloadPolicy::Never)).await
    }
}
