use crate::config::EngineConfig;
use crate::roles::RoleDirectory;
use crate::service::DocumentService;
use docstore::{ContentStore, DocumentStore, InMemoryContentStore, InMemoryDocumentStore, Result};
use std::sync::Arc;

/// Fábrica del `DocumentService`.
///
/// `in_memory` usa los stores de `docstore` y sirve para pruebas y
/// demostraciones; `from_env` y `from_url` montan los stores Diesel de
/// `doc-persistence` sobre un único pool.
pub struct DocflowFactory;

impl DocflowFactory {
  pub fn in_memory(roles: Arc<dyn RoleDirectory>, config: EngineConfig) -> DocumentService {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let contents: Arc<dyn ContentStore> = Arc::new(InMemoryContentStore::new());
    DocumentService::new(store, contents, roles, config)
  }

  /// Lee la URL (`DOCFLOW_DB_URL` / `DATABASE_URL`) y la configuración del
  /// motor del entorno.
  pub fn from_env(roles: Arc<dyn RoleDirectory>) -> Result<DocumentService> {
    let config = EngineConfig::from_env()?;
    let (docs, contents) = doc_persistence::new_from_env()?;
    Ok(Self::assemble(docs, contents, roles, config))
  }

  pub fn from_url(database_url: &str, roles: Arc<dyn RoleDirectory>, config: EngineConfig) -> Result<DocumentService> {
    config.validate()?;
    let (docs, contents) = doc_persistence::new_from_url(database_url)?;
    Ok(Self::assemble(docs, contents, roles, config))
  }

  fn assemble<D, C>(docs: D, contents: C, roles: Arc<dyn RoleDirectory>, config: EngineConfig) -> DocumentService
    where D: DocumentStore + 'static,
          C: ContentStore + 'static
  {
    log::info!("docflow sobre Diesel (reintentos: {})", config.retry.max_retries);
    DocumentService::new(Arc::new(docs), Arc::new(contents), roles, config)
  }
}
