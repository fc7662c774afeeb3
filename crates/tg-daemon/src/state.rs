//! Shared runtime state for tg-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The store and the
//! authenticator are chosen once at startup and never change.

use std::sync::Arc;

use anyhow::Result;
use tg_config::{ResolvedSecrets, ServiceConfig, StoreBackend};
use tg_db::{MemTradeStore, PgTradeStore, TradeStore};
use tracing::info;

use crate::auth::Authenticator;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "tg-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub store: Arc<dyn TradeStore>,
    pub auth: Authenticator,
    /// Request body cap for uploads, in bytes.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn TradeStore>, auth: Authenticator) -> Self {
        Self {
            build: BuildInfo::default(),
            store,
            auth,
            max_upload_bytes: ServiceConfig::default().server.max_upload_bytes,
        }
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// In-memory store with the given authenticator (tests, local demos).
    pub fn in_memory(auth: Authenticator) -> Self {
        Self::new(Arc::new(MemTradeStore::new()), auth)
    }

    /// Build state from validated config and resolved secrets. Connects to
    /// (and migrates) Postgres when that backend is selected.
    pub async fn from_config(cfg: &ServiceConfig, secrets: &ResolvedSecrets) -> Result<Self> {
        let auth = Authenticator::from_config(&cfg.auth, secrets)?;

        let store: Arc<dyn TradeStore> = match cfg.store.backend {
            StoreBackend::Memory => Arc::new(MemTradeStore::new()),
            StoreBackend::Postgres => {
                let Some(url) = secrets.database_url.as_deref() else {
                    anyhow::bail!("SECRETS_MISSING backend=postgres: no database url resolved");
                };
                let pool = tg_db::connect(url, cfg.store.max_connections).await?;
                tg_db::migrate(&pool).await?;
                Arc::new(PgTradeStore::new(pool))
            }
        };

        info!(
            backend = store.backend(),
            auth = auth.mode(),
            "daemon state ready"
        );
        Ok(Self::new(store, auth).with_max_upload_bytes(cfg.server.max_upload_bytes))
    }
}
