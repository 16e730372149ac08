use crate::auth::{
    jwt::JwtKeys,
    memory::MemoryUserStore,
    repo::{PgUserStore, UserStore},
    services,
};
use crate::blood::{
    memory::MemoryBloodStore,
    repo::{BloodStore, PgBloodStore},
};
use crate::config::{AppConfig, StoreBackend};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub blood: Arc<dyn BloodStore>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, blood) = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
                let db = crate::db::connect(url).await?;
                (
                    Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>,
                    Arc::new(PgBloodStore::new(db)) as Arc<dyn BloodStore>,
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory stores; users and requests are lost on restart");
                (
                    Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>,
                    Arc::new(MemoryBloodStore::new()) as Arc<dyn BloodStore>,
                )
            }
        };

        if tokio::task::spawn_blocking(services::warm_up).await? {
            tracing::debug!("login dummy hash ready");
        } else {
            tracing::warn!("no dummy hash; unknown-user logins are not timing-equalised");
        }

        Ok(Self::from_parts(config, store, blood))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn UserStore>,
        blood: Arc<dyn BloodStore>,
    ) -> Self {
        let keys = JwtKeys::new(&config.jwt);
        Self {
            config,
            store,
            blood,
            keys,
        }
    }

    /// State over empty in-memory stores with a fixed test secret.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test-secret-test-secret-test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            cookie_secure: false,
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryBloodStore::new()),
        )
    }
}
