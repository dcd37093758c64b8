use crate::config::AppConfig;
use crate::storage::{MemoryStorage, Storage, StorageClient};
use crate::store::{MemoryStore, PgStore, Store};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres store");
                Arc::new(PgStore::new(db)) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; data is kept in memory only");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let storage = match &config.minio {
            Some(minio) => {
                info!(endpoint = %minio.endpoint, bucket = %minio.bucket, "using s3 image storage");
                Arc::new(Storage::new(minio, "us-east-1").await?) as Arc<dyn StorageClient>
            }
            None => {
                warn!("MINIO_* not set; images are kept in memory only");
                Arc::new(MemoryStorage::new()) as Arc<dyn StorageClient>
            }
        };

        Ok(Self::from_parts(store, config, storage))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            store,
            config,
            storage,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            minio: None,
            image_url_ttl_secs: 600,
            max_upload_bytes: 1024 * 1024,
        });
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            config,
            Arc::new(MemoryStorage::new()),
        )
    }
}
