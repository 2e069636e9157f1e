// Archivo: service.rs
// Propósito: `DocumentService`, la fachada con la superficie pública del
// motor. Orquesta el Version Manager, el Workflow Engine y el servicio de
// contenido sobre un mismo store; no añade reglas propias salvo la
// resolución de la instancia activa en approve/reject.
use crate::config::EngineConfig;
use crate::content::ContentService;
use crate::engine::WorkflowEngine;
use crate::events::{WorkflowEvent, WorkflowEventBus};
use crate::ledger::ChainVerification;
use crate::roles::RoleDirectory;
use crate::statistics::{VersioningStatistics, WorkflowStatistics};
use crate::versions::{NewVersion, SignatureVerification, VersionManager};
use chrono::{DateTime, Utc};
use doc_domain::{Approval, Decision, Document, DocumentVersion, DomainError, VersionNumber, VersionType, WorkflowInstance,
                 WorkflowTemplate};
use docstore::{in_transaction, ContentStore, DocumentStore, Result, StoreTx};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use uuid::Uuid;

/// Servicio de alto nivel del motor documental.
///
/// Todas las operaciones son request/response; el único estado en proceso son
/// los canales de eventos por instancia.
#[derive(Clone)]
pub struct DocumentService {
  store: Arc<dyn DocumentStore>,
  versions: VersionManager,
  engine: WorkflowEngine,
  content: ContentService,
  config: EngineConfig,
}

impl DocumentService {
  pub fn new(store: Arc<dyn DocumentStore>,
             contents: Arc<dyn ContentStore>,
             roles: Arc<dyn RoleDirectory>,
             config: EngineConfig)
             -> Self {
    let content = ContentService::new(contents, config.retry.clone());
    let versions = VersionManager::new(store.clone(), content.clone(), config.clone());
    let engine = WorkflowEngine::new(store.clone(), roles, Arc::new(WorkflowEventBus::new()), config.clone());
    Self { store,
           versions,
           engine,
           content,
           config }
  }

  pub fn versions(&self) -> &VersionManager {
    &self.versions
  }

  pub fn engine(&self) -> &WorkflowEngine {
    &self.engine
  }

  pub fn content(&self) -> &ContentService {
    &self.content
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  // Documentos

  pub fn create_document(&self, document: Document) -> Result<Document> {
    document.validate()?;
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.insert_document(&document))?;
    log::info!("documento {} creado ({})", document.code, document.document_type);
    Ok(document)
  }

  pub fn get_document(&self, document_id: Uuid) -> Result<Document> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      tx.get_document(&document_id)?.ok_or(DomainError::DocumentNotFound(document_id))
    })
  }

  pub fn find_document_by_code(&self, code: &str) -> Result<Option<Document>> {
    Ok(self.list_documents()?.into_iter().find(|d| d.code.eq_ignore_ascii_case(code)))
  }

  pub fn list_documents(&self) -> Result<Vec<Document>> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.list_documents())
  }

  pub fn archive_document(&self, document_id: Uuid) -> Result<Document> {
    self.versions.archive_document(document_id)
  }

  pub fn restore_document(&self, document_id: Uuid) -> Result<Document> {
    self.versions.restore_document(document_id)
  }

  pub fn delete_document(&self, document_id: Uuid) -> Result<Document> {
    self.versions.delete_document(document_id)
  }

  // Versiones

  pub fn create_version(&self, request: NewVersion) -> Result<DocumentVersion> {
    self.versions.create_version(request)
  }

  pub fn create_major_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.versions.create_major_version(document_id, content, created_by)
  }

  pub fn create_minor_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.versions.create_minor_version(document_id, content, created_by)
  }

  pub fn create_patch_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.versions.create_patch_version(document_id, content, created_by)
  }

  pub fn create_draft_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.versions.create_draft_version(document_id, content, created_by)
  }

  pub fn create_branch(&self,
                       document_id: Uuid,
                       branch_name: &str,
                       from_version_id: Uuid,
                       content: &[u8],
                       created_by: &str)
                       -> Result<DocumentVersion> {
    self.versions.create_branch(document_id, branch_name, from_version_id, content, created_by)
  }

  pub fn merge_branch(&self,
                      source_version_id: Uuid,
                      target_document_id: Uuid,
                      content: &[u8],
                      version_type: Option<VersionType>,
                      created_by: &str)
                      -> Result<DocumentVersion> {
    self.versions.merge_branch(source_version_id, target_document_id, content, version_type, created_by)
  }

  pub fn archive_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    self.versions.archive_version(version_id)
  }

  pub fn restore_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    self.versions.restore_version(version_id)
  }

  pub fn delete_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    self.versions.delete_version(version_id)
  }

  pub fn sign_version(&self,
                      version_id: Uuid,
                      signature: &str,
                      algorithm: &str,
                      certificate_chain: Option<&str>,
                      signed_by: &str)
                      -> Result<DocumentVersion> {
    self.versions.sign(version_id, signature, algorithm, certificate_chain, signed_by)
  }

  pub fn verify_signature(&self, version_id: Uuid) -> Result<SignatureVerification> {
    self.versions.verify_signature(version_id)
  }

  pub fn apply_watermark(&self, version_id: Uuid, text: &str) -> Result<DocumentVersion> {
    self.versions.apply_watermark(version_id, text)
  }

  pub fn remove_watermark(&self, version_id: Uuid) -> Result<DocumentVersion> {
    self.versions.remove_watermark(version_id)
  }

  pub fn compress_version(&self, version_id: Uuid, algorithm: &str) -> Result<DocumentVersion> {
    self.versions.compress(version_id, algorithm)
  }

  pub fn read_content(&self, version_id: Uuid) -> Result<Vec<u8>> {
    self.versions.read_content(version_id)
  }

  pub fn download_content(&self, version_id: Uuid) -> Result<Vec<u8>> {
    self.versions.download_content(version_id)
  }

  pub fn expire_versions(&self, now: DateTime<Utc>) -> Result<usize> {
    self.versions.expire_versions(now)
  }

  pub fn get_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    self.versions.get_version(version_id)
  }

  pub fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>> {
    self.versions.list_versions(document_id)
  }

  pub fn current_version(&self, document_id: Uuid) -> Result<Option<DocumentVersion>> {
    self.versions.current_version(document_id)
  }

  /// Versión por número dentro de la rama principal.
  pub fn get_version_by_number(&self, document_id: Uuid, number: VersionNumber) -> Result<Option<DocumentVersion>> {
    self.versions.find_version(document_id, number, None)
  }

  pub fn most_accessed_versions(&self, limit: usize) -> Result<Vec<DocumentVersion>> {
    self.versions.most_accessed(limit)
  }

  pub fn most_downloaded_versions(&self, limit: usize) -> Result<Vec<DocumentVersion>> {
    self.versions.most_downloaded(limit)
  }

  pub fn get_versioning_statistics(&self, document_id: Uuid) -> Result<VersioningStatistics> {
    self.versions.versioning_statistics(document_id)
  }

  // Workflow

  pub fn register_template(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate> {
    self.engine.register_template(template)
  }

  pub fn update_template(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate> {
    self.engine.update_template(template)
  }

  pub fn deactivate_template(&self, template_id: Uuid) -> Result<WorkflowTemplate> {
    self.engine.deactivate_template(template_id)
  }

  pub fn list_templates(&self) -> Result<Vec<WorkflowTemplate>> {
    self.engine.list_templates()
  }

  pub fn instantiate_workflow(&self,
                              template_id: Uuid,
                              document_id: Uuid,
                              version_id: Uuid,
                              started_by: &str)
                              -> Result<WorkflowInstance> {
    self.engine.instantiate(template_id, document_id, version_id, started_by)
  }

  pub fn advance_step(&self,
                      instance_id: Uuid,
                      step_index: usize,
                      decision: Decision,
                      approver_id: &str,
                      comments: Option<&str>)
                      -> Result<WorkflowInstance> {
    self.engine.advance(instance_id, step_index, decision, approver_id, comments)
  }

  fn decide_current(&self,
                    version_id: Uuid,
                    decision: Decision,
                    approver_id: &str,
                    comments: Option<&str>)
                    -> Result<WorkflowInstance> {
    let instance = self.engine
                       .active_instance_for_version(version_id)?
                       .ok_or_else(|| {
                         DomainError::InvalidTransition(format!("la versión {} no tiene un workflow activo", version_id))
                       })?;
    self.engine.advance(instance.id, instance.current_step_index, decision, approver_id, comments)
  }

  /// Aprueba el paso actual del workflow activo de la versión.
  pub fn approve_version(&self, version_id: Uuid, approver_id: &str, comments: Option<&str>) -> Result<WorkflowInstance> {
    self.decide_current(version_id, Decision::Approve, approver_id, comments)
  }

  pub fn reject_version(&self, version_id: Uuid, approver_id: &str, comments: Option<&str>) -> Result<WorkflowInstance> {
    self.decide_current(version_id, Decision::Reject, approver_id, comments)
  }

  pub fn cancel_workflow(&self, version_id: Uuid, requested_by: &str, comments: Option<&str>) -> Result<WorkflowInstance> {
    self.decide_current(version_id, Decision::Cancel, requested_by, comments)
  }

  pub fn get_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance> {
    self.engine.get_instance(instance_id)
  }

  pub fn ledger(&self, instance_id: Uuid) -> Result<Vec<Approval>> {
    self.engine.ledger(instance_id)
  }

  pub fn verify_chain(&self, instance_id: Uuid) -> Result<ChainVerification> {
    self.engine.verify_chain(instance_id)
  }

  pub fn get_workflow_statistics(&self) -> Result<WorkflowStatistics> {
    self.engine.statistics()
  }

  pub fn subscribe(&self, instance_id: Uuid) -> Receiver<WorkflowEvent> {
    self.engine.subscribe(instance_id)
  }
}
