//! The worker's process-local schema cache (schema §4.7): a
//! `(schema_id, version) -> schema` map, backed by a read-through to the
//! coordinator's `SchemaStore`. Never negatively cached — a miss just
//! re-attempts the read-through on the next call.

use std::sync::Arc;

use bus::SchemaVersion;
use coordinator::SchemaStore;
use dashmap::DashMap;
use schema::ParsingSchema;
use uuid::Uuid;

use crate::error::{Error, Result};

pub struct SchemaCache {
    store: Arc<dyn SchemaStore>,
    cache: DashMap<(Uuid, u32), Arc<ParsingSchema>>,
}

impl SchemaCache {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store, cache: DashMap::new() }
    }

    /// Resolves a schema for a task, consulting the cache first and falling
    /// back to the store on a miss (schema §4.5 step 2).
    pub async fn resolve(&self, schema_id: Uuid, version: &SchemaVersion) -> Result<Arc<ParsingSchema>> {
        let pinned = match version {
            SchemaVersion::Pinned(v) => Some(*v),
            SchemaVersion::Latest(_) => None,
        };

        if let Some(v) = pinned {
            if let Some(hit) = self.cache.get(&(schema_id, v)) {
                return Ok(hit.clone());
            }
        }

        let fetched = self
            .store
            .get(schema_id, pinned)
            .await
            .map_err(Error::Coordinator)?
            .ok_or(Error::SchemaNotFound { schema_id, version: pinned })?;

        let arc = Arc::new(fetched);
        self.cache.insert((schema_id, arc.version), arc.clone());
        Ok(arc)
    }
}
