//! Persistencia Diesel para los contratos de `docstore`.
//! Expone el esquema, el pool con migraciones embebidas y los stores
//! `DieselDocumentStore` / `DieselContentStore`. La implementación detallada
//! está en `document_store.rs` y `content_store.rs`.

mod content_store;
mod document_store;
mod pool;
mod rows;
pub mod schema;

pub use content_store::DieselContentStore;
pub use document_store::DieselDocumentStore;
pub use pool::{build_pool, database_url_from_env, DbConn, DbPool, MIGRATIONS};

use doc_domain::DomainError;
use docstore::Result;
use std::sync::Arc;

/// Crea ambos stores sobre un único pool a partir de `DOCFLOW_DB_URL`
/// (o `DATABASE_URL`).
pub fn new_from_env() -> Result<(DieselDocumentStore, DieselContentStore)> {
  let url = database_url_from_env().ok_or_else(|| {
                                     DomainError::Validation("DOCFLOW_DB_URL o DATABASE_URL no definida".to_string())
                                   })?;
  new_from_url(&url)
}

pub fn new_from_url(database_url: &str) -> Result<(DieselDocumentStore, DieselContentStore)> {
  let pool = Arc::new(build_pool(database_url, 8)?);
  Ok((DieselDocumentStore::from_pool(pool.clone()), DieselContentStore::from_pool(pool)))
}

/// Stores sobre un fichero SQLite temporal nuevo, con migraciones aplicadas.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test() -> Result<(DieselDocumentStore, DieselContentStore)> {
  let path = std::env::temp_dir().join(format!("docflow_test_{}.db", uuid::Uuid::new_v4()));
  new_from_url(&path.to_string_lossy())
}
