// Version Manager: numeración, ramas, merges, promoción, metadatos y
// consultas sobre versiones. Toda escritura del linaje actualiza la fila del
// documento con su revisión esperada.
use crate::config::EngineConfig;
use crate::content::ContentService;
use crate::statistics::VersioningStatistics;
use chrono::{DateTime, Duration, Utc};
use doc_domain::{CompressionInfo, Document, DocumentVersion, DomainError, SignatureInfo, VersionNumber, VersionStatus,
                 VersionType, WatermarkInfo, MAIN_BRANCH};
use docstore::{in_transaction, DocumentStore, PersistResult, Result, StoreTx};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Petición de creación de versión.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub document_id: Uuid,
  pub version_type: VersionType,
  pub content: Vec<u8>,
  pub branch: Option<String>,
  pub parent_version_id: Option<Uuid>,
  /// Revisión del documento que el llamador leyó; si no coincide la
  /// creación falla con `VersionConflict`.
  pub expected_revision: Option<i64>,
  pub created_by: String,
  pub change_summary: Option<String>,
}

impl NewVersion {
  pub fn new(document_id: Uuid, version_type: VersionType, content: impl Into<Vec<u8>>, created_by: &str) -> Self {
    Self { document_id,
           version_type,
           content: content.into(),
           branch: None,
           parent_version_id: None,
           expected_revision: None,
           created_by: created_by.to_string(),
           change_summary: None }
  }

  pub fn on_branch(mut self, branch: &str) -> Self {
    self.branch = Some(branch.to_string());
    self
  }

  pub fn with_parent(mut self, parent_version_id: Uuid) -> Self {
    self.parent_version_id = Some(parent_version_id);
    self
  }

  pub fn expecting_revision(mut self, revision: i64) -> Self {
    self.expected_revision = Some(revision);
    self
  }

  pub fn with_summary(mut self, summary: &str) -> Self {
    self.change_summary = Some(summary.to_string());
    self
  }
}

/// Resultado de `verify_signature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureVerification {
  pub has_signature: bool,
  /// El checksum firmado coincide con el de la versión.
  pub checksum_matches: bool,
  /// El contenido almacenado sigue teniendo ese checksum.
  pub content_intact: bool,
}

impl SignatureVerification {
  pub fn is_valid(&self) -> bool {
    self.has_signature && self.checksum_matches && self.content_intact
  }
}

pub(crate) fn load_document(tx: &mut dyn StoreTx, id: &Uuid) -> Result<Document> {
  tx.get_document(id)?.ok_or(DomainError::DocumentNotFound(*id))
}

pub(crate) fn load_version(tx: &mut dyn StoreTx, id: &Uuid) -> Result<DocumentVersion> {
  tx.get_version(id)?.ok_or(DomainError::VersionNotFound(*id))
}

/// Guarda el documento contra su propia `revision`.
pub(crate) fn save_document(tx: &mut dyn StoreTx, doc: &Document) -> Result<i64> {
  match tx.update_document(doc, doc.revision)? {
    PersistResult::Ok { new_revision } => Ok(new_revision),
    PersistResult::Conflict { expected, actual } => {
      Err(DomainError::VersionConflict(format!("documento {}: revisión esperada {}, actual {}", doc.id, expected, actual)))
    }
  }
}

fn current_of(tx: &mut dyn StoreTx, doc: &Document) -> Result<Option<DocumentVersion>> {
  match doc.current_version_id {
    Some(id) => tx.get_version(&id),
    None => Ok(None),
  }
}

/// Recalcula el estado del documento y lo guarda.
pub(crate) fn refresh_document(tx: &mut dyn StoreTx, document_id: &Uuid) -> Result<Document> {
  let mut doc = load_document(tx, document_id)?;
  let current = current_of(tx, &doc)?;
  doc.refresh_status(current.as_ref());
  let rev = save_document(tx, &doc)?;
  doc.revision = rev;
  Ok(doc)
}

/// Cabeza de una rama: la versión no borrada más reciente.
fn branch_head<'a>(versions: &'a [DocumentVersion], branch: &str) -> Option<&'a DocumentVersion> {
  versions.iter()
          .filter(|v| v.branch_name == branch && !v.is_deleted)
          .max_by_key(|v| v.sequence)
}

/// Mayor número publicado en la rama. Las versiones borradas cuentan: un
/// número nunca se reutiliza.
fn highest_release(versions: &[DocumentVersion], branch: &str) -> Option<VersionNumber> {
  versions.iter()
          .filter(|v| v.branch_name == branch && !v.version_number.is_draft())
          .map(|v| v.version_number)
          .max()
}

fn next_sequence(versions: &[DocumentVersion]) -> i64 {
  versions.iter().map(|v| v.sequence).max().unwrap_or(0) + 1
}

fn ensure_mutable(v: &DocumentVersion) -> Result<()> {
  if v.is_deleted {
    return Err(DomainError::InvalidTransition(format!("la versión {} está borrada", v.id)));
  }
  if v.is_archived {
    return Err(DomainError::InvalidTransition(format!("la versión {} está archivada", v.id)));
  }
  Ok(())
}

/// Documentos borrados o archivados no admiten versiones ni workflows nuevos.
pub(crate) fn ensure_document_writable(doc: &Document) -> Result<()> {
  if doc.is_deleted {
    return Err(DomainError::InvalidTransition(format!("el documento {} está borrado", doc.code)));
  }
  if doc.is_archived {
    return Err(DomainError::InvalidTransition(format!("el documento {} está archivado", doc.code)));
  }
  Ok(())
}

fn ensure_no_pending(tx: &mut dyn StoreTx, doc: &Document) -> Result<()> {
  if let Some(v) = tx.list_versions(&doc.id)?
                     .into_iter()
                     .find(|v| v.status == VersionStatus::PendingApproval)
  {
    return Err(DomainError::InvalidTransition(format!("el documento {} tiene la versión {} en workflow",
                                                      doc.code, v.version_number)));
  }
  Ok(())
}

/// Archiva los borradores de la rama que no están en workflow ni aprobados.
fn supersede_drafts(tx: &mut dyn StoreTx, versions: &[DocumentVersion], branch: &str, by: Uuid) -> Result<usize> {
  let mut n = 0;
  for v in versions.iter()
                   .filter(|v| v.branch_name == branch && v.version_type == VersionType::Draft)
                   .filter(|v| v.status == VersionStatus::Draft && v.is_live())
  {
    let mut d = v.clone();
    d.archived_from = Some(d.status);
    d.status = VersionStatus::Archived;
    d.is_archived = true;
    d.superseded_by = Some(by);
    tx.update_version(&d)?;
    n += 1;
  }
  Ok(n)
}

/// Aprueba la versión y, si es de la rama principal, la convierte en la
/// vigente del documento. Se ejecuta dentro de la transacción que completa el
/// workflow.
pub(crate) fn promote(tx: &mut dyn StoreTx, version_id: &Uuid, approved_by: &str, at: DateTime<Utc>) -> Result<DocumentVersion> {
  let mut v = load_version(tx, version_id)?;
  let mut doc = load_document(tx, &v.document_id)?;
  v.status = VersionStatus::Approved;
  v.approved_by = Some(approved_by.to_string());
  v.approved_at = Some(at);
  if v.is_main() {
    for other in tx.list_versions(&doc.id)? {
      if other.is_current_version && other.id != v.id {
        let mut o = other.clone();
        o.is_current_version = false;
        tx.update_version(&o)?;
      }
    }
    v.is_current_version = true;
    doc.current_version_id = Some(v.id);
  }
  tx.update_version(&v)?;
  let current = if v.is_current_version { Some(v.clone()) } else { current_of(tx, &doc)? };
  doc.refresh_status(current.as_ref());
  save_document(tx, &doc)?;
  log::info!("versión {} {} aprobada (vigente: {})", doc.code, v.version_number, v.is_current_version);
  Ok(v)
}

pub(crate) fn set_status(tx: &mut dyn StoreTx, version_id: &Uuid, status: VersionStatus) -> Result<DocumentVersion> {
  let mut v = load_version(tx, version_id)?;
  v.status = status;
  tx.update_version(&v)?;
  if v.is_current_version {
    refresh_document(tx, &v.document_id)?;
  }
  Ok(v)
}

pub(crate) fn watermark(tx: &mut dyn StoreTx, version_id: &Uuid, text: &str) -> Result<DocumentVersion> {
  if text.trim().is_empty() {
    return Err(DomainError::Validation("el texto de la marca de agua no puede estar vacío".to_string()));
  }
  let mut v = load_version(tx, version_id)?;
  ensure_mutable(&v)?;
  v.watermark = Some(WatermarkInfo { text: text.to_string(), applied_at: Utc::now() });
  tx.update_version(&v)?;
  Ok(v)
}

#[derive(Clone)]
pub struct VersionManager {
  store: Arc<dyn DocumentStore>,
  content: ContentService,
  config: EngineConfig,
  /// Las escrituras de versiones toman el guard de lectura desde el `put` del
  /// contenido hasta el commit; el tombstone de `delete_version` toma el de
  /// escritura. Así ningún blob recién subido se marca como borrado antes de
  /// que su versión sea visible.
  content_gate: Arc<RwLock<()>>,
}

impl VersionManager {
  pub fn new(store: Arc<dyn DocumentStore>, content: ContentService, config: EngineConfig) -> Self {
    Self { store,
           content,
           config,
           content_gate: Arc::new(RwLock::new(())) }
  }

  pub fn create_version(&self, req: NewVersion) -> Result<DocumentVersion> {
    let _gate = self.content_gate.read().unwrap_or_else(|e| e.into_inner());
    let receipt = self.content.put(&req.content)?;
    let branch = req.branch.clone().unwrap_or_else(|| MAIN_BRANCH.to_string());
    let v = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
              let mut doc = load_document(tx, &req.document_id)?;
              ensure_document_writable(&doc)?;
              if let Some(expected) = req.expected_revision {
                if expected != doc.revision {
                  return Err(DomainError::VersionConflict(format!("documento {}: revisión esperada {}, actual {}",
                                                                  doc.code, expected, doc.revision)));
                }
              }
              let versions = tx.list_versions(&doc.id)?;
              if branch != MAIN_BRANCH && !versions.iter().any(|v| v.branch_name == branch) {
                return Err(DomainError::Validation(format!("la rama '{}' no existe; créela con create_branch", branch)));
              }
              let head = branch_head(&versions, &branch).map(|h| h.id);
              let parent = match req.parent_version_id {
                Some(pid) => {
                  if !versions.iter().any(|v| v.id == pid) {
                    return match tx.get_version(&pid)? {
                      Some(_) => Err(DomainError::VersionConflict(format!("la versión padre {} pertenece a otro documento", pid))),
                      None => Err(DomainError::VersionNotFound(pid)),
                    };
                  }
                  if head != Some(pid) {
                    return Err(DomainError::VersionConflict(format!("la versión padre {} no es la cabeza de la rama '{}'", pid, branch)));
                  }
                  Some(pid)
                }
                None => head,
              };
              let number = VersionNumber::next(highest_release(&versions, &branch), req.version_type);
              let mut v = DocumentVersion::new(doc.id,
                                               number,
                                               req.version_type,
                                               &branch,
                                               parent,
                                               receipt.content_ref.clone(),
                                               receipt.checksum.clone(),
                                               receipt.size_bytes,
                                               &req.created_by);
              v.sequence = next_sequence(&versions);
              v.change_summary = req.change_summary.clone();
              v.retention_until = doc.retention_until(v.created_at)?;
              tx.insert_version(&v)?;
              if req.version_type != VersionType::Draft {
                supersede_drafts(tx, &versions, &branch, v.id)?;
              }
              doc.updated_at = Utc::now();
              save_document(tx, &doc)?;
              Ok(v)
            })?;
    log::info!("versión {} ({}) creada en '{}' para el documento {}",
               v.version_number,
               v.version_type,
               v.branch_name,
               v.document_id);
    Ok(v)
  }

  pub fn create_major_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.create_version(NewVersion::new(document_id, VersionType::Major, content, created_by))
  }

  pub fn create_minor_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.create_version(NewVersion::new(document_id, VersionType::Minor, content, created_by))
  }

  pub fn create_patch_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.create_version(NewVersion::new(document_id, VersionType::Patch, content, created_by))
  }

  pub fn create_draft_version(&self, document_id: Uuid, content: &[u8], created_by: &str) -> Result<DocumentVersion> {
    self.create_version(NewVersion::new(document_id, VersionType::Draft, content, created_by))
  }

  /// Abre una rama nueva. La primera versión de la rama es un PATCH sobre el
  /// número de la versión origen (1.5.0 -> 1.5.1).
  pub fn create_branch(&self,
                       document_id: Uuid,
                       branch_name: &str,
                       from_version_id: Uuid,
                       content: &[u8],
                       created_by: &str)
                       -> Result<DocumentVersion> {
    let name = branch_name.trim().to_string();
    if name.is_empty() {
      return Err(DomainError::Validation("el nombre de la rama no puede estar vacío".to_string()));
    }
    if name == MAIN_BRANCH {
      return Err(DomainError::Validation(format!("'{}' es la rama principal", MAIN_BRANCH)));
    }
    let _gate = self.content_gate.read().unwrap_or_else(|e| e.into_inner());
    let receipt = self.content.put(content)?;
    let v = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
              let mut doc = load_document(tx, &document_id)?;
              ensure_document_writable(&doc)?;
              let versions = tx.list_versions(&doc.id)?;
              if versions.iter().any(|v| v.branch_name == name) {
                return Err(DomainError::Validation(format!("la rama '{}' ya existe en {}", name, doc.code)));
              }
              let from = match versions.iter().find(|v| v.id == from_version_id) {
                Some(f) => f.clone(),
                None => {
                  return match tx.get_version(&from_version_id)? {
                    Some(_) => Err(DomainError::Validation(format!("la versión {} pertenece a otro documento", from_version_id))),
                    None => Err(DomainError::VersionNotFound(from_version_id)),
                  }
                }
              };
              if from.is_deleted {
                return Err(DomainError::InvalidTransition(format!("la versión {} está borrada", from.id)));
              }
              if from.version_number.is_draft() {
                return Err(DomainError::Validation("no se puede abrir una rama desde un borrador".to_string()));
              }
              let number = VersionNumber::next(Some(from.version_number), VersionType::Patch);
              let mut v = DocumentVersion::new(doc.id,
                                               number,
                                               VersionType::Patch,
                                               &name,
                                               Some(from.id),
                                               receipt.content_ref.clone(),
                                               receipt.checksum.clone(),
                                               receipt.size_bytes,
                                               created_by);
              v.sequence = next_sequence(&versions);
              v.change_summary = Some(format!("rama '{}' desde {}", name, from.version_number));
              v.retention_until = doc.retention_until(v.created_at)?;
              tx.insert_version(&v)?;
              doc.updated_at = Utc::now();
              save_document(tx, &doc)?;
              Ok(v)
            })?;
    log::info!("rama '{}' creada en {} con {}", v.branch_name, v.document_id, v.version_number);
    Ok(v)
  }

  /// Lleva una versión de rama a la rama principal como versión nueva. El
  /// número parte del mayor entre la cabeza principal y la versión origen.
  pub fn merge_branch(&self,
                      source_version_id: Uuid,
                      target_document_id: Uuid,
                      content: &[u8],
                      version_type: Option<VersionType>,
                      created_by: &str)
                      -> Result<DocumentVersion> {
    let vt = version_type.unwrap_or(self.config.merge_version_type);
    if vt == VersionType::Draft {
      return Err(DomainError::Validation("un merge no puede producir un borrador".to_string()));
    }
    let _gate = self.content_gate.read().unwrap_or_else(|e| e.into_inner());
    let receipt = self.content.put(content)?;
    let v = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
              let mut doc = load_document(tx, &target_document_id)?;
              ensure_document_writable(&doc)?;
              let source = load_version(tx, &source_version_id)?;
              if source.document_id != doc.id {
                return Err(DomainError::Validation(format!("la versión {} no pertenece al documento {}", source.id, doc.code)));
              }
              if source.is_main() {
                return Err(DomainError::Validation("la versión origen del merge debe estar en una rama".to_string()));
              }
              if source.is_deleted {
                return Err(DomainError::InvalidTransition(format!("la versión {} está borrada", source.id)));
              }
              let versions = tx.list_versions(&doc.id)?;
              let source_number = Some(source.version_number).filter(|n| !n.is_draft());
              let base = highest_release(&versions, MAIN_BRANCH).max(source_number);
              let number = VersionNumber::next(base, vt);
              let mut v = DocumentVersion::new(doc.id,
                                               number,
                                               vt,
                                               MAIN_BRANCH,
                                               Some(source.id),
                                               receipt.content_ref.clone(),
                                               receipt.checksum.clone(),
                                               receipt.size_bytes,
                                               created_by);
              v.sequence = next_sequence(&versions);
              v.merge_source_version_id = Some(source.id);
              v.change_summary = Some(format!("merge de '{}' {}", source.branch_name, source.version_number));
              v.retention_until = doc.retention_until(v.created_at)?;
              tx.insert_version(&v)?;
              supersede_drafts(tx, &versions, MAIN_BRANCH, v.id)?;
              doc.updated_at = Utc::now();
              save_document(tx, &doc)?;
              Ok(v)
            })?;
    log::info!("merge en {}: nueva versión {} desde {}", v.document_id, v.version_number, source_version_id);
    Ok(v)
  }

  pub fn sign(&self,
              version_id: Uuid,
              signature: &str,
              algorithm: &str,
              certificate_chain: Option<&str>,
              signed_by: &str)
              -> Result<DocumentVersion> {
    if signature.trim().is_empty() || algorithm.trim().is_empty() {
      return Err(DomainError::Validation("firma y algoritmo son obligatorios".to_string()));
    }
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      ensure_mutable(&v)?;
      v.signature = Some(SignatureInfo { signature: signature.to_string(),
                                         algorithm: algorithm.to_string(),
                                         certificate_chain: certificate_chain.map(|c| c.to_string()),
                                         signed_by: signed_by.to_string(),
                                         signed_at: Utc::now(),
                                         signed_checksum: v.checksum.clone() });
      tx.update_version(&v)?;
      Ok(v)
    })
  }

  pub fn verify_signature(&self, version_id: Uuid) -> Result<SignatureVerification> {
    let v = self.get_version(version_id)?;
    let Some(sig) = v.signature.as_ref() else {
      return Ok(SignatureVerification { has_signature: false,
                                        checksum_matches: false,
                                        content_intact: false });
    };
    let checksum_matches = sig.signed_checksum == v.checksum;
    let content_intact = match self.content.get(&v.content_ref, Some(&v.checksum)) {
      Ok(_) => true,
      Err(DomainError::ChecksumMismatch { .. }) | Err(DomainError::ContentNotFound(_)) => false,
      Err(e) => return Err(e),
    };
    Ok(SignatureVerification { has_signature: true,
                               checksum_matches,
                               content_intact })
  }

  pub fn apply_watermark(&self, version_id: Uuid, text: &str) -> Result<DocumentVersion> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| watermark(tx, &version_id, text))
  }

  pub fn remove_watermark(&self, version_id: Uuid) -> Result<DocumentVersion> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      ensure_mutable(&v)?;
      v.watermark = None;
      tx.update_version(&v)?;
      Ok(v)
    })
  }

  /// Registra la compresión del contenido. Sólo metadatos: el blob
  /// almacenado no cambia.
  pub fn compress(&self, version_id: Uuid, algorithm: &str) -> Result<DocumentVersion> {
    if algorithm.trim().is_empty() {
      return Err(DomainError::Validation("algoritmo de compresión vacío".to_string()));
    }
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      ensure_mutable(&v)?;
      v.compression = Some(CompressionInfo { algorithm: algorithm.to_string(),
                                             applied_at: Utc::now() });
      tx.update_version(&v)?;
      Ok(v)
    })
  }

  pub fn archive_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      ensure_mutable(&v)?;
      if v.is_current_version {
        return Err(DomainError::InvalidTransition(format!("la versión {} es la vigente", v.id)));
      }
      if v.status == VersionStatus::PendingApproval {
        return Err(DomainError::InvalidTransition(format!("la versión {} está en workflow", v.id)));
      }
      v.archived_from = Some(v.status);
      v.status = VersionStatus::Archived;
      v.is_archived = true;
      tx.update_version(&v)?;
      Ok(v)
    })
  }

  pub fn restore_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      if v.is_deleted || !v.is_archived {
        return Err(DomainError::InvalidTransition(format!("la versión {} no está archivada", v.id)));
      }
      v.status = v.archived_from.take().unwrap_or(VersionStatus::Draft);
      v.is_archived = false;
      tx.update_version(&v)?;
      Ok(v)
    })
  }

  /// Borrado lógico. El contenido se marca como borrado sólo si ninguna otra
  /// versión viva lo referencia. El tombstone ocurre después del commit: si
  /// falla, el borrado sigue confirmado y el blob queda vivo.
  pub fn delete_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    let v = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
              let mut v = load_version(tx, &version_id)?;
              if v.is_deleted {
                return Err(DomainError::InvalidTransition(format!("la versión {} ya está borrada", v.id)));
              }
              if v.is_current_version {
                return Err(DomainError::InvalidTransition(format!("la versión {} es la vigente", v.id)));
              }
              if v.status == VersionStatus::PendingApproval {
                return Err(DomainError::InvalidTransition(format!("la versión {} está en workflow", v.id)));
              }
              v.is_deleted = true;
              tx.update_version(&v)?;
              Ok(v)
            })?;
    log::info!("versión {} del documento {} borrada", v.version_number, v.document_id);
    if let Err(e) = self.release_content(&v.content_ref) {
      log::warn!("contenido {} de la versión {} no se pudo marcar como borrado: {}", v.content_ref, v.id, e);
    }
    Ok(v)
  }

  /// Marca el blob como borrado si ninguna versión viva lo referencia. Las
  /// referencias se leen con el guard de escritura tomado.
  fn release_content(&self, content_ref: &str) -> Result<bool> {
    let _gate = self.content_gate.write().unwrap_or_else(|e| e.into_inner());
    let referenced = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                       Ok(tx.list_all_versions()?
                            .iter()
                            .any(|o| !o.is_deleted && o.content_ref == content_ref))
                     })?;
    if referenced {
      return Ok(false);
    }
    match self.content.tombstone(content_ref) {
      Ok(()) | Err(DomainError::ContentNotFound(_)) => Ok(true),
      Err(e) => Err(e),
    }
  }

  // Ciclo de vida del documento

  /// Archiva el documento completo. Sus versiones quedan legibles pero no se
  /// pueden crear versiones ni iniciar workflows hasta restaurarlo.
  pub fn archive_document(&self, document_id: Uuid) -> Result<Document> {
    let doc = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                let mut doc = load_document(tx, &document_id)?;
                ensure_document_writable(&doc)?;
                ensure_no_pending(tx, &doc)?;
                doc.is_archived = true;
                let current = current_of(tx, &doc)?;
                doc.refresh_status(current.as_ref());
                doc.revision = save_document(tx, &doc)?;
                Ok(doc)
              })?;
    log::info!("documento {} archivado", doc.code);
    Ok(doc)
  }

  pub fn restore_document(&self, document_id: Uuid) -> Result<Document> {
    let doc = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                let mut doc = load_document(tx, &document_id)?;
                if doc.is_deleted || !doc.is_archived {
                  return Err(DomainError::InvalidTransition(format!("el documento {} no está archivado", doc.code)));
                }
                doc.is_archived = false;
                let current = current_of(tx, &doc)?;
                doc.refresh_status(current.as_ref());
                doc.revision = save_document(tx, &doc)?;
                Ok(doc)
              })?;
    log::info!("documento {} restaurado", doc.code);
    Ok(doc)
  }

  /// Borrado lógico del documento. Las versiones y su contenido se conservan
  /// para auditoría; el documento deja de admitir escrituras.
  pub fn delete_document(&self, document_id: Uuid) -> Result<Document> {
    let doc = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                let mut doc = load_document(tx, &document_id)?;
                if doc.is_deleted {
                  return Err(DomainError::InvalidTransition(format!("el documento {} ya está borrado", doc.code)));
                }
                ensure_no_pending(tx, &doc)?;
                doc.is_deleted = true;
                let current = current_of(tx, &doc)?;
                doc.refresh_status(current.as_ref());
                doc.revision = save_document(tx, &doc)?;
                Ok(doc)
              })?;
    log::info!("documento {} borrado", doc.code);
    Ok(doc)
  }

  /// Devuelve el contenido verificado y anota el acceso.
  pub fn read_content(&self, version_id: Uuid) -> Result<Vec<u8>> {
    self.fetch_content(version_id, false)
  }

  /// Igual que `read_content`, pero además cuenta una descarga.
  pub fn download_content(&self, version_id: Uuid) -> Result<Vec<u8>> {
    self.fetch_content(version_id, true)
  }

  fn fetch_content(&self, version_id: Uuid, download: bool) -> Result<Vec<u8>> {
    let v = self.get_version(version_id)?;
    if v.is_deleted {
      return Err(DomainError::ContentNotFound(v.content_ref));
    }
    let bytes = self.content.get(&v.content_ref, Some(&v.checksum))?;
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut v = load_version(tx, &version_id)?;
      let now = Utc::now();
      v.access_count += 1;
      v.last_accessed_at = Some(now);
      if download {
        v.download_count += 1;
        v.last_downloaded_at = Some(now);
      }
      tx.update_version(&v)
    })?;
    Ok(bytes)
  }

  /// Marca como EXPIRED las versiones cuya retención venció. Devuelve cuántas
  /// cambiaron.
  pub fn expire_versions(&self, now: DateTime<Utc>) -> Result<usize> {
    let n = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
              let mut touched = BTreeSet::new();
              let mut n = 0;
              for mut v in tx.list_all_versions()? {
                if !v.is_live() || !v.is_expired_at(now) {
                  continue;
                }
                if matches!(v.status, VersionStatus::Expired | VersionStatus::PendingApproval) {
                  continue;
                }
                v.status = VersionStatus::Expired;
                tx.update_version(&v)?;
                if v.is_current_version {
                  touched.insert(v.document_id);
                }
                n += 1;
              }
              for doc_id in touched {
                refresh_document(tx, &doc_id)?;
              }
              Ok(n)
            })?;
    if n > 0 {
      log::info!("{} versiones expiradas", n);
    }
    Ok(n)
  }

  // Consultas

  pub fn get_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| load_version(tx, &version_id))
  }

  /// Versiones no borradas del documento, en orden de creación.
  pub fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>> {
    let all = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                load_document(tx, &document_id)?;
                tx.list_versions(&document_id)
              })?;
    Ok(all.into_iter().filter(|v| !v.is_deleted).collect())
  }

  /// Versión no borrada con ese número en la rama (principal si no se
  /// indica). Entre borradores gana el más reciente.
  pub fn find_version(&self,
                      document_id: Uuid,
                      number: VersionNumber,
                      branch: Option<&str>)
                      -> Result<Option<DocumentVersion>> {
    let branch = branch.unwrap_or(MAIN_BRANCH);
    Ok(self.list_versions(document_id)?
           .into_iter()
           .filter(|v| v.branch_name == branch && v.version_number == number)
           .max_by_key(|v| v.sequence))
  }

  pub fn current_version(&self, document_id: Uuid) -> Result<Option<DocumentVersion>> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let doc = load_document(tx, &document_id)?;
      current_of(tx, &doc)
    })
  }

  pub fn latest_version(&self, document_id: Uuid) -> Result<Option<DocumentVersion>> {
    Ok(self.list_versions(document_id)?.into_iter().max_by_key(|v| v.sequence))
  }

  pub fn versions_by_type(&self, document_id: Uuid, version_type: VersionType) -> Result<Vec<DocumentVersion>> {
    Ok(self.list_versions(document_id)?
           .into_iter()
           .filter(|v| v.version_type == version_type)
           .collect())
  }

  pub fn versions_by_branch(&self, document_id: Uuid, branch: &str) -> Result<Vec<DocumentVersion>> {
    Ok(self.list_versions(document_id)?
           .into_iter()
           .filter(|v| v.branch_name == branch)
           .collect())
  }

  pub fn branches(&self, document_id: Uuid) -> Result<Vec<String>> {
    let names: BTreeSet<String> = self.list_versions(document_id)?.into_iter().map(|v| v.branch_name).collect();
    Ok(names.into_iter().collect())
  }

  fn all_live_versions(&self) -> Result<Vec<DocumentVersion>> {
    let all = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.list_all_versions())?;
    Ok(all.into_iter().filter(|v| !v.is_deleted).collect())
  }

  pub fn pending_approval_versions(&self) -> Result<Vec<DocumentVersion>> {
    Ok(self.all_live_versions()?
           .into_iter()
           .filter(|v| v.status == VersionStatus::PendingApproval)
           .collect())
  }

  pub fn approved_versions(&self) -> Result<Vec<DocumentVersion>> {
    Ok(self.all_live_versions()?
           .into_iter()
           .filter(|v| v.status == VersionStatus::Approved)
           .collect())
  }

  pub fn archived_versions(&self) -> Result<Vec<DocumentVersion>> {
    Ok(self.all_live_versions()?.into_iter().filter(|v| v.is_archived).collect())
  }

  pub fn expired_versions(&self) -> Result<Vec<DocumentVersion>> {
    Ok(self.all_live_versions()?
           .into_iter()
           .filter(|v| v.status == VersionStatus::Expired)
           .collect())
  }

  /// Versiones vivas cuya retención vence dentro de la ventana configurada.
  pub fn expiring_soon(&self, now: DateTime<Utc>) -> Result<Vec<DocumentVersion>> {
    let limit = Duration::try_days(self.config.expiring_soon_days).and_then(|d| now.checked_add_signed(d))
                                                                  .ok_or_else(|| {
                                                                    DomainError::Validation(format!("ventana de {} días fuera de rango",
                                                                                                    self.config.expiring_soon_days))
                                                                  })?;
    let mut out: Vec<DocumentVersion> = self.all_live_versions()?
                                            .into_iter()
                                            .filter(|v| v.is_live() && v.status != VersionStatus::Expired)
                                            .filter(|v| v.retention_until.map(|r| r > now && r <= limit).unwrap_or(false))
                                            .collect();
    out.sort_by_key(|v| v.retention_until);
    Ok(out)
  }

  pub fn most_accessed(&self, limit: usize) -> Result<Vec<DocumentVersion>> {
    let mut all = self.all_live_versions()?;
    all.sort_by(|a, b| b.access_count.cmp(&a.access_count).then(a.sequence.cmp(&b.sequence)));
    all.truncate(limit);
    Ok(all)
  }

  pub fn most_downloaded(&self, limit: usize) -> Result<Vec<DocumentVersion>> {
    let mut all: Vec<DocumentVersion> = self.all_live_versions()?.into_iter().filter(|v| v.download_count > 0).collect();
    all.sort_by(|a, b| b.download_count.cmp(&a.download_count).then(a.sequence.cmp(&b.sequence)));
    all.truncate(limit);
    Ok(all)
  }

  pub fn versioning_statistics(&self, document_id: Uuid) -> Result<VersioningStatistics> {
    let (doc, versions) = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                            let doc = load_document(tx, &document_id)?;
                            let versions = tx.list_versions(&document_id)?;
                            Ok((doc, versions))
                          })?;
    Ok(VersioningStatistics::compute(&doc, &versions))
  }
}
