// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// `InMemoryDocumentStore` serializa las transacciones detrás de un único
// mutex y trabaja sobre una copia de las tablas que sólo reemplaza al estado
// si la transacción termina bien. Ambos stores permiten inyectar fallos
// transitorios para probar los reintentos. No son durables.
use crate::domain::{ContentReceipt, PersistResult, StoredContent};
use crate::errors::{DomainError, Result};
use crate::repository::{verify_content, ContentStore, DocumentStore, StoreTx};
use chrono::Utc;
use doc_domain::{content_checksum, Approval, Document, DocumentVersion, WorkflowInstance, WorkflowTemplate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, DocumentVersion>,
    templates: HashMap<Uuid, WorkflowTemplate>,
    instances: HashMap<Uuid, WorkflowInstance>,
    /// Ledger en orden de inserción.
    approvals: Vec<Approval>,
}

/// Consume un fallo inyectado si queda alguno.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
           .is_ok()
}

/// Helper para mapear `Mutex::lock()` en un `Result` con
/// `DomainError::Storage`.
fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|e| DomainError::Storage(format!("mutex poisoned: {:?}", e)))
}

// Store transaccional en memoria (no durable)
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    tables: Mutex<Tables>,
    fail_next: AtomicUsize,
}

impl InMemoryDocumentStore {
    /// Crea un store vacío.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace que las próximas `n` transacciones fallen con
    /// `DomainError::Storage` antes de ejecutar su trabajo.
    pub fn fail_next_transactions(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn transaction(&self, work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<()>) -> Result<()> {
        if take_failure(&self.fail_next) {
            return Err(DomainError::Storage("fallo transitorio inyectado".to_string()));
        }
        let mut guard = lock(&self.tables)?;
        let mut copy = guard.clone();
        let mut tx = MemTx { tables: &mut copy };
        work(&mut tx)?;
        *guard = copy;
        Ok(())
    }
}

struct MemTx<'a> {
    tables: &'a mut Tables,
}

impl StoreTx for MemTx<'_> {
    fn get_document(&mut self, id: &Uuid) -> Result<Option<Document>> {
        Ok(self.tables.documents.get(id).cloned())
    }

    fn list_documents(&mut self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.tables.documents.values().cloned().collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.code.cmp(&b.code)));
        Ok(docs)
    }

    fn insert_document(&mut self, doc: &Document) -> Result<()> {
        if self.tables.documents.contains_key(&doc.id) {
            return Err(DomainError::Validation(format!("documento duplicado {}", doc.id)));
        }
        if self.tables.documents.values().any(|d| d.code == doc.code) {
            return Err(DomainError::Validation(format!("código de documento ya usado: {}", doc.code)));
        }
        self.tables.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    fn update_document(&mut self, doc: &Document, expected_revision: i64) -> Result<PersistResult> {
        let stored = self.tables
                         .documents
                         .get_mut(&doc.id)
                         .ok_or(DomainError::DocumentNotFound(doc.id))?;
        if stored.revision != expected_revision {
            return Ok(PersistResult::Conflict { expected: expected_revision,
                                                actual: stored.revision });
        }
        let mut next = doc.clone();
        next.revision = expected_revision + 1;
        *stored = next;
        Ok(PersistResult::Ok { new_revision: expected_revision + 1 })
    }

    fn get_version(&mut self, id: &Uuid) -> Result<Option<DocumentVersion>> {
        Ok(self.tables.versions.get(id).cloned())
    }

    fn list_versions(&mut self, document_id: &Uuid) -> Result<Vec<DocumentVersion>> {
        let mut out: Vec<DocumentVersion> = self.tables
                                                .versions
                                                .values()
                                                .filter(|v| &v.document_id == document_id)
                                                .cloned()
                                                .collect();
        out.sort_by_key(|v| v.sequence);
        Ok(out)
    }

    fn list_all_versions(&mut self) -> Result<Vec<DocumentVersion>> {
        let mut out: Vec<DocumentVersion> = self.tables.versions.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        Ok(out)
    }

    fn insert_version(&mut self, version: &DocumentVersion) -> Result<()> {
        if self.tables.versions.contains_key(&version.id) {
            return Err(DomainError::Validation(format!("versión duplicada {}", version.id)));
        }
        self.tables.versions.insert(version.id, version.clone());
        Ok(())
    }

    fn update_version(&mut self, version: &DocumentVersion) -> Result<()> {
        match self.tables.versions.get_mut(&version.id) {
            Some(v) => {
                *v = version.clone();
                Ok(())
            }
            None => Err(DomainError::VersionNotFound(version.id)),
        }
    }

    fn get_template(&mut self, id: &Uuid) -> Result<Option<WorkflowTemplate>> {
        Ok(self.tables.templates.get(id).cloned())
    }

    fn list_templates(&mut self) -> Result<Vec<WorkflowTemplate>> {
        let mut out: Vec<WorkflowTemplate> = self.tables.templates.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<()> {
        self.tables.templates.insert(template.id, template.clone());
        Ok(())
    }

    fn update_template(&mut self, template: &WorkflowTemplate) -> Result<()> {
        match self.tables.templates.get_mut(&template.id) {
            Some(t) => {
                *t = template.clone();
                Ok(())
            }
            None => Err(DomainError::TemplateNotFound(template.id)),
        }
    }

    fn get_instance(&mut self, id: &Uuid) -> Result<Option<WorkflowInstance>> {
        Ok(self.tables.instances.get(id).cloned())
    }

    fn list_instances(&mut self) -> Result<Vec<WorkflowInstance>> {
        let mut out: Vec<WorkflowInstance> = self.tables.instances.values().cloned().collect();
        out.sort_by_key(|i| i.started_at);
        Ok(out)
    }

    fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<()> {
        self.tables.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<()> {
        match self.tables.instances.get_mut(&instance.id) {
            Some(i) => {
                *i = instance.clone();
                Ok(())
            }
            None => Err(DomainError::InstanceNotFound(instance.id)),
        }
    }

    fn append_approval(&mut self, approval: &Approval) -> Result<()> {
        // Equivalente al índice único (instance, step) de la versión SQL.
        let duplicate = self.tables
                            .approvals
                            .iter()
                            .any(|a| a.workflow_instance_id == approval.workflow_instance_id && a.step_index == approval.step_index);
        if duplicate {
            return Err(DomainError::DuplicateDecision { instance_id: approval.workflow_instance_id,
                                                        step_index: approval.step_index });
        }
        self.tables.approvals.push(approval.clone());
        Ok(())
    }

    fn list_approvals(&mut self, instance_id: &Uuid) -> Result<Vec<Approval>> {
        let mut out: Vec<Approval> = self.tables
                                         .approvals
                                         .iter()
                                         .filter(|a| &a.workflow_instance_id == instance_id)
                                         .cloned()
                                         .collect();
        out.sort_by_key(|a| a.sequence);
        Ok(out)
    }

    fn count_approvals(&mut self) -> Result<usize> {
        Ok(self.tables.approvals.len())
    }
}

/// Content store en memoria direccionado por checksum.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    blobs: Mutex<HashMap<String, StoredContent>>,
    fail_next: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace que las próximas `n` operaciones fallen con
    /// `DomainError::Storage`.
    pub fn fail_next_operations(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Sobrescribe los bytes de un blob sin tocar su checksum. Sólo para
    /// simular corrupción en pruebas.
    pub fn corrupt(&self, content_ref: &str, bytes: &[u8]) -> Result<()> {
        let mut blobs = lock(&self.blobs)?;
        let entry = blobs.get_mut(content_ref)
                         .ok_or_else(|| DomainError::ContentNotFound(content_ref.to_string()))?;
        entry.bytes = bytes.to_vec();
        Ok(())
    }

    fn check_fault(&self) -> Result<()> {
        if take_failure(&self.fail_next) {
            return Err(DomainError::Storage("fallo transitorio inyectado".to_string()));
        }
        Ok(())
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(&self, bytes: &[u8]) -> Result<ContentReceipt> {
        self.check_fault()?;
        let checksum = content_checksum(bytes);
        let mut blobs = lock(&self.blobs)?;
        let entry = blobs.entry(checksum.clone()).or_insert_with(|| StoredContent { content_ref: checksum.clone(),
                                                                                     checksum: checksum.clone(),
                                                                                     size_bytes: bytes.len() as u64,
                                                                                     bytes: bytes.to_vec(),
                                                                                     tombstoned: false,
                                                                                     created_at: Utc::now() });
        entry.tombstoned = false;
        Ok(ContentReceipt { content_ref: entry.content_ref.clone(),
                            checksum: entry.checksum.clone(),
                            size_bytes: entry.size_bytes })
    }

    fn get(&self, content_ref: &str, expected_checksum: Option<&str>) -> Result<Vec<u8>> {
        self.check_fault()?;
        let blobs = lock(&self.blobs)?;
        match blobs.get(content_ref) {
            Some(c) if !c.tombstoned => verify_content(c, expected_checksum),
            _ => Err(DomainError::ContentNotFound(content_ref.to_string())),
        }
    }

    fn audit_get(&self, content_ref: &str) -> Result<Vec<u8>> {
        self.check_fault()?;
        let blobs = lock(&self.blobs)?;
        blobs.get(content_ref)
             .map(|c| c.bytes.clone())
             .ok_or_else(|| DomainError::ContentNotFound(content_ref.to_string()))
    }

    fn tombstone(&self, content_ref: &str) -> Result<()> {
        self.check_fault()?;
        let mut blobs = lock(&self.blobs)?;
        match blobs.get_mut(content_ref) {
            Some(c) => {
                c.tombstoned = true;
                Ok(())
            }
            None => Err(DomainError::ContentNotFound(content_ref.to_string())),
        }
    }

    fn exists(&self, content_ref: &str) -> Result<bool> {
        self.check_fault()?;
        let blobs = lock(&self.blobs)?;
        Ok(blobs.get(content_ref).map(|c| !c.tombstoned).unwrap_or(false))
    }
}
