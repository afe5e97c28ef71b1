//! Database facade: frozen schema plus storage handle, forking sessions.

use std::sync::Arc;

use crate::config::DbConfig;
use crate::error::DbError;
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::storage::StorageEngine;

/// Handle tying a frozen schema registry to a storage collaborator.
///
/// Built once at startup; sessions forked from it are cheap and
/// independent, sharing only the registry and the storage handle.
pub struct Database {
    registry: Arc<SchemaRegistry>,
    storage: Arc<dyn StorageEngine>,
    config: DbConfig,
}

impl Database {
    /// Freezes the registry, applies the schema to storage, and returns
    /// the handle.
    ///
    /// # Arguments
    /// * `registry` - Registry with all entities registered
    /// * `storage` - Storage collaborator
    /// * `config` - Shared configuration
    ///
    /// # Returns
    /// `Result<Database, DbError>` failing if cross-entity schema
    /// validation or DDL application fails.
    pub fn open(
        registry: SchemaRegistry,
        storage: Arc<dyn StorageEngine>,
        config: DbConfig,
    ) -> Result<Self, DbError> {
        registry.freeze()?;
        let registry = Arc::new(registry);
        storage.ensure_schema(&registry.definitions())?;
        tracing::debug!(entities = registry.entity_count(), "Database opened");
        Ok(Self {
            registry,
            storage,
            config,
        })
    }

    /// Forks a fresh session with its own identity map and pending lists.
    pub fn fork(&self) -> Session {
        Session::new(
            self.registry.clone(),
            self.storage.clone(),
            self.config.clone(),
        )
    }

    /// Returns the frozen schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Returns the storage collaborator.
    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }
}
