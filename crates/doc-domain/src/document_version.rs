// document_version.rs
use crate::{VersionNumber, VersionStatus, VersionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Rama principal de todo documento.
pub const MAIN_BRANCH: &str = "main";

/// Checksum de contenido en formato `sha256:<hex>`. También es la clave de
/// direccionamiento del Content Store.
pub fn content_checksum(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  format!("sha256:{:x}", hasher.finalize())
}

/// Metadatos de firma. Sólo se guardan; la verificación compara
/// `signed_checksum` con el checksum de la versión.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
  pub signature: String,
  pub algorithm: String,
  pub certificate_chain: Option<String>,
  pub signed_by: String,
  pub signed_at: DateTime<Utc>,
  pub signed_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkInfo {
  pub text: String,
  pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionInfo {
  pub algorithm: String,
  pub applied_at: DateTime<Utc>,
}

/// Versión inmutable de un documento. El contenido vive en el Content Store;
/// aquí sólo se guarda la referencia y el checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
  pub id: Uuid,
  pub document_id: Uuid,
  /// Orden de creación dentro del documento (1-based).
  pub sequence: i64,
  pub version_number: VersionNumber,
  pub version_type: VersionType,
  pub branch_name: String,
  pub parent_version_id: Option<Uuid>,
  pub merge_source_version_id: Option<Uuid>,
  pub superseded_by: Option<Uuid>,
  pub content_ref: String,
  pub checksum: String,
  pub size_bytes: u64,
  pub change_summary: Option<String>,
  pub status: VersionStatus,
  pub is_current_version: bool,
  pub is_archived: bool,
  /// Estado previo al archivado, para poder restaurarlo.
  pub archived_from: Option<VersionStatus>,
  pub is_deleted: bool,
  pub signature: Option<SignatureInfo>,
  pub watermark: Option<WatermarkInfo>,
  pub compression: Option<CompressionInfo>,
  pub approved_by: Option<String>,
  pub approved_at: Option<DateTime<Utc>>,
  pub retention_until: Option<DateTime<Utc>>,
  pub access_count: i64,
  pub last_accessed_at: Option<DateTime<Utc>>,
  /// Descargas explícitas; cada descarga también cuenta como acceso.
  pub download_count: i64,
  pub last_downloaded_at: Option<DateTime<Utc>>,
  pub created_by: String,
  pub created_at: DateTime<Utc>,
}

impl DocumentVersion {
  #[allow(clippy::too_many_arguments)]
  pub fn new(document_id: Uuid,
             version_number: VersionNumber,
             version_type: VersionType,
             branch_name: &str,
             parent_version_id: Option<Uuid>,
             content_ref: String,
             checksum: String,
             size_bytes: u64,
             created_by: &str)
             -> Self {
    Self { id: Uuid::new_v4(),
           document_id,
           sequence: 0,
           version_number,
           version_type,
           branch_name: branch_name.to_string(),
           parent_version_id,
           merge_source_version_id: None,
           superseded_by: None,
           content_ref,
           checksum,
           size_bytes,
           change_summary: None,
           status: VersionStatus::Draft,
           is_current_version: false,
           is_archived: false,
           archived_from: None,
           is_deleted: false,
           signature: None,
           watermark: None,
           compression: None,
           approved_by: None,
           approved_at: None,
           retention_until: None,
           access_count: 0,
           last_accessed_at: None,
           download_count: 0,
           last_downloaded_at: None,
           created_by: created_by.to_string(),
           created_at: Utc::now() }
  }

  /// Versión visible: ni borrada lógicamente ni archivada.
  pub fn is_live(&self) -> bool {
    !self.is_deleted && !self.is_archived
  }

  pub fn is_main(&self) -> bool {
    self.branch_name == MAIN_BRANCH
  }

  pub fn has_watermark(&self) -> bool {
    self.watermark.is_some()
  }

  pub fn is_compressed(&self) -> bool {
    self.compression.is_some()
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.retention_until.map(|r| r <= now).unwrap_or(false)
  }
}
