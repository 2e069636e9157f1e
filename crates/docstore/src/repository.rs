// Archivo: repository.rs
// Propósito: definir los contratos de almacenamiento. `DocumentStore` abre
// transacciones; todas las lecturas y escrituras de documentos, versiones,
// plantillas, instancias y ledger pasan por `StoreTx` dentro de una de ellas.
// `ContentStore` guarda blobs direccionados por checksum.
use crate::domain::{ContentReceipt, PersistResult, StoredContent};
use crate::errors::Result;
use doc_domain::{content_checksum, Approval, Document, DocumentVersion, DomainError, WorkflowInstance, WorkflowTemplate};
use uuid::Uuid;

/// Operaciones disponibles dentro de una transacción.
///
/// Si el cierre que recibe `DocumentStore::transaction` devuelve `Err`, todo
/// lo escrito a través de `StoreTx` se descarta.
pub trait StoreTx {
    fn get_document(&mut self, id: &Uuid) -> Result<Option<Document>>;

    fn list_documents(&mut self) -> Result<Vec<Document>>;

    fn insert_document(&mut self, doc: &Document) -> Result<()>;

    /// Escribe el documento si su revisión almacenada es `expected_revision`.
    /// La revisión resultante es `expected_revision + 1`.
    fn update_document(&mut self, doc: &Document, expected_revision: i64) -> Result<PersistResult>;

    fn get_version(&mut self, id: &Uuid) -> Result<Option<DocumentVersion>>;

    /// Versiones de un documento ordenadas por `sequence`.
    fn list_versions(&mut self, document_id: &Uuid) -> Result<Vec<DocumentVersion>>;

    fn list_all_versions(&mut self) -> Result<Vec<DocumentVersion>>;

    fn insert_version(&mut self, version: &DocumentVersion) -> Result<()>;

    fn update_version(&mut self, version: &DocumentVersion) -> Result<()>;

    fn get_template(&mut self, id: &Uuid) -> Result<Option<WorkflowTemplate>>;

    fn list_templates(&mut self) -> Result<Vec<WorkflowTemplate>>;

    fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<()>;

    fn update_template(&mut self, template: &WorkflowTemplate) -> Result<()>;

    fn get_instance(&mut self, id: &Uuid) -> Result<Option<WorkflowInstance>>;

    fn list_instances(&mut self) -> Result<Vec<WorkflowInstance>>;

    fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<()>;

    fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<()>;

    /// Añade una entrada al ledger. Falla con `DuplicateDecision` si ya
    /// existe una entrada para `(workflow_instance_id, step_index)`.
    fn append_approval(&mut self, approval: &Approval) -> Result<()>;

    /// Entradas del ledger de una instancia ordenadas por `sequence`.
    fn list_approvals(&mut self, instance_id: &Uuid) -> Result<Vec<Approval>>;

    fn count_approvals(&mut self) -> Result<usize>;
}

/// Store transaccional de documentos y workflows.
pub trait DocumentStore: Send + Sync {
    /// Ejecuta `work` dentro de una transacción. Confirma si devuelve `Ok`,
    /// revierte en caso contrario y propaga el error.
    fn transaction(&self, work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<()>) -> Result<()>;
}

/// Ejecuta `f` en una transacción de `store` y devuelve su resultado.
pub fn in_transaction<S, T, F>(store: &S, mut f: F) -> Result<T>
    where S: DocumentStore + ?Sized,
          F: FnMut(&mut dyn StoreTx) -> Result<T>
{
    let mut out = None;
    store.transaction(&mut |tx: &mut dyn StoreTx| {
             out = Some(f(tx)?);
             Ok(())
         })?;
    out.ok_or_else(|| DomainError::Storage("la transacción terminó sin resultado".to_string()))
}

/// Store de contenido direccionado por checksum. Nunca muta un blob; el
/// borrado es un tombstone.
pub trait ContentStore: Send + Sync {
    /// Guarda el blob. Idempotente: bytes idénticos producen la misma
    /// referencia; si estaba marcado como borrado se revive.
    fn put(&self, bytes: &[u8]) -> Result<ContentReceipt>;

    /// Recupera un blob vivo, verificando su integridad.
    fn get(&self, content_ref: &str, expected_checksum: Option<&str>) -> Result<Vec<u8>>;

    /// Recupera el blob aunque esté marcado como borrado (auditoría).
    fn audit_get(&self, content_ref: &str) -> Result<Vec<u8>>;

    /// Marca el blob como borrado.
    fn tombstone(&self, content_ref: &str) -> Result<()>;

    /// Indica si existe un blob vivo con esa referencia.
    fn exists(&self, content_ref: &str) -> Result<bool>;
}

/// Comprueba un blob almacenado contra el checksum esperado y contra el hash
/// recalculado de sus bytes.
pub fn verify_content(stored: &StoredContent, expected_checksum: Option<&str>) -> Result<Vec<u8>> {
    if let Some(expected) = expected_checksum {
        if expected != stored.checksum {
            return Err(DomainError::ChecksumMismatch { expected: expected.to_string(),
                                                       actual: stored.checksum.clone() });
        }
    }
    let actual = content_checksum(&stored.bytes);
    if actual != stored.checksum {
        return Err(DomainError::ChecksumMismatch { expected: stored.checksum.clone(), actual });
    }
    Ok(stored.bytes.clone())
}
