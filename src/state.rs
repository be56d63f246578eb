//! Shared state handed to every handler.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{catalog_service::ProductCatalogService, file_store::DiskFileStore};

#[derive(Clone)]
pub struct AppState {
    pub catalog: ProductCatalogService,

    /// Pool behind the product store, used directly by the readiness probe.
    pub db: Arc<SqlitePool>,

    /// Same disk store the catalog writes photos to, used to stream them back.
    pub files: Arc<DiskFileStore>,
}
