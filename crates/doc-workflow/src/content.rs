// Servicio de contenido: envuelve un `ContentStore` con la política de
// reintentos.
use docstore::{ContentReceipt, ContentStore, Result, RetryPolicy};
use std::sync::Arc;

#[derive(Clone)]
pub struct ContentService {
  store: Arc<dyn ContentStore>,
  retry: RetryPolicy,
}

impl ContentService {
  pub fn new(store: Arc<dyn ContentStore>, retry: RetryPolicy) -> Self {
    Self { store, retry }
  }

  pub fn put(&self, bytes: &[u8]) -> Result<ContentReceipt> {
    let receipt = self.retry.run("content.put", || self.store.put(bytes))?;
    log::debug!("contenido {} ({} bytes)", receipt.content_ref, receipt.size_bytes);
    Ok(receipt)
  }

  pub fn get(&self, content_ref: &str, expected_checksum: Option<&str>) -> Result<Vec<u8>> {
    self.retry.run("content.get", || self.store.get(content_ref, expected_checksum))
  }

  pub fn audit_get(&self, content_ref: &str) -> Result<Vec<u8>> {
    self.retry.run("content.audit_get", || self.store.audit_get(content_ref))
  }

  pub fn tombstone(&self, content_ref: &str) -> Result<()> {
    self.retry.run("content.tombstone", || self.store.tombstone(content_ref))?;
    log::info!("contenido {} marcado como borrado", content_ref);
    Ok(())
  }

  pub fn exists(&self, content_ref: &str) -> Result<bool> {
    self.retry.run("content.exists", || self.store.exists(content_ref))
  }
}
