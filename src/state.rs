//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::IdentityProvider;
use crate::billing::BillingProvider;
use crate::config::Config;
use crate::download::DownloadService;
use crate::requests::AccessRequestService;
use crate::security::Security;
use crate::storage::ObjectStore;
use crate::upload::{AssemblyEngine, UploadService};

/// Shared application state
///
/// Every collaborator is constructed here and injected into the services
/// that need it; nothing reaches for process-wide globals.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    security: Security,
    identity: Arc<dyn IdentityProvider>,
    uploads: UploadService,
    assembly: AssemblyEngine,
    requests: AccessRequestService,
    downloads: DownloadService,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: Config,
        db: SqlitePool,
        store: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityProvider>,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        let security = Security::new(config.security.ip_hash_salt.clone());

        let uploads = UploadService::new(
            db.clone(),
            store.clone(),
            security.clone(),
            billing,
            config.upload.clone(),
        );
        let assembly = AssemblyEngine::new(db.clone(), store.clone(), security.clone());
        let requests = AccessRequestService::new(db.clone(), security.clone());
        let downloads = DownloadService::new(db.clone(), store.clone(), security.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                store,
                security,
                identity,
                uploads,
                assembly,
                requests,
                downloads,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the object store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    /// Get the security helper
    pub fn security(&self) -> &Security {
        &self.inner.security
    }

    /// Get the identity collaborator
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.identity
    }

    /// Get the upload session manager
    pub fn uploads(&self) -> &UploadService {
        &self.inner.uploads
    }

    /// Get the assembly engine
    pub fn assembly(&self) -> &AssemblyEngine {
        &self.inner.assembly
    }

    /// Get the access request service
    pub fn requests(&self) -> &AccessRequestService {
        &self.inner.requests
    }

    /// Get the download gate
    pub fn downloads(&self) -> &DownloadService {
        &self.inner.downloads
    }
}
