// document.rs
use crate::{DocumentStatus, DocumentType, DocumentVersion, DomainError, SecurityLevel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Límite de `retention_years`. Mantiene cualquier fecha de retención dentro
/// del rango de `chrono` y de las columnas enteras.
pub const MAX_RETENTION_YEARS: u32 = 1_000;

/// Documento lógico. Agrupa todas sus versiones y apunta a la versión
/// vigente mediante `current_version_id`.
///
/// `revision` es el contador optimista: cada escritura sobre el linaje
/// (crear versión, rama, merge, promoción) lo incrementa y se valida contra
/// el valor leído al inicio de la operación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id: Uuid,
  pub code: String,
  pub title: String,
  pub description: Option<String>,
  pub current_version_id: Option<Uuid>,
  pub status: DocumentStatus,
  pub security_level: SecurityLevel,
  pub document_type: DocumentType,
  pub tags: Vec<String>,
  pub retention_years: Option<u32>,
  pub owner_id: String,
  pub is_archived: bool,
  pub is_deleted: bool,
  pub revision: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Document {
  pub fn new(code: &str,
             title: &str,
             document_type: DocumentType,
             security_level: SecurityLevel,
             owner_id: &str)
             -> Result<Self, DomainError> {
    if code.trim().is_empty() {
      return Err(DomainError::Validation("El código del documento no puede estar vacío".to_string()));
    }
    if title.trim().is_empty() {
      return Err(DomainError::Validation("El título del documento no puede estar vacío".to_string()));
    }
    if owner_id.trim().is_empty() {
      return Err(DomainError::Validation("El propietario del documento es obligatorio".to_string()));
    }
    let now = Utc::now();
    Ok(Self { id: Uuid::new_v4(),
              code: code.trim().to_string(),
              title: title.trim().to_string(),
              description: None,
              current_version_id: None,
              status: DocumentStatus::Draft,
              security_level,
              document_type,
              tags: Vec::new(),
              retention_years: None,
              owner_id: owner_id.to_string(),
              is_archived: false,
              is_deleted: false,
              revision: 0,
              created_at: now,
              updated_at: now })
  }

  pub fn with_description(mut self, description: &str) -> Self {
    self.description = Some(description.to_string());
    self
  }

  /// Las etiquetas se normalizan (trim) y se descartan duplicados y vacías.
  pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where I: IntoIterator<Item = S>,
          S: AsRef<str>
  {
    for t in tags {
      let t = t.as_ref().trim();
      if !t.is_empty() && !self.tags.iter().any(|x| x == t) {
        self.tags.push(t.to_string());
      }
    }
    self
  }

  pub fn with_retention_years(mut self, years: u32) -> Self {
    self.retention_years = Some(years);
    self
  }

  /// Comprobaciones previas a persistir un documento construido a mano o con
  /// los `with_*`.
  pub fn validate(&self) -> Result<(), DomainError> {
    if self.code.trim().is_empty() || self.title.trim().is_empty() || self.owner_id.trim().is_empty() {
      return Err(DomainError::Validation("Código, título y propietario son obligatorios".to_string()));
    }
    if let Some(years) = self.retention_years {
      if years > MAX_RETENTION_YEARS {
        return Err(DomainError::Validation(format!("Retención de {} años fuera de rango (máximo {})",
                                                   years, MAX_RETENTION_YEARS)));
      }
    }
    Ok(())
  }

  /// Fin de la retención para una versión creada en `from`, o `None` si el
  /// documento no tiene retención.
  pub fn retention_until(&self, from: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, DomainError> {
    let Some(years) = self.retention_years else {
      return Ok(None);
    };
    Duration::try_days(365 * i64::from(years)).and_then(|d| from.checked_add_signed(d))
                                              .map(Some)
                                              .ok_or_else(|| {
                                                DomainError::Validation(format!("Retención de {} años fuera de rango", years))
                                              })
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
  }

  /// Estado derivado: borrado y archivado tienen prioridad; sin versión
  /// vigente el documento es DRAFT; si no, refleja el estado de la versión
  /// vigente.
  pub fn derive_status(&self, current: Option<&DocumentVersion>) -> DocumentStatus {
    if self.is_deleted {
      return DocumentStatus::Deleted;
    }
    if self.is_archived {
      return DocumentStatus::Archived;
    }
    match current {
      Some(v) => v.status.into(),
      None => DocumentStatus::Draft,
    }
  }

  /// Recalcula `status` y marca la fila como modificada.
  pub fn refresh_status(&mut self, current: Option<&DocumentVersion>) {
    self.status = self.derive_status(current);
    self.updated_at = Utc::now();
  }
}

impl fmt::Display for Document {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Document({} - {}, {}, {})", self.code, self.title, self.document_type, self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{VersionNumber, VersionStatus, VersionType};

  #[test]
  fn new_document_validates_required_fields() {
    assert!(Document::new("", "t", DocumentType::Policy, SecurityLevel::Internal, "u").is_err());
    assert!(Document::new("POL-1", " ", DocumentType::Policy, SecurityLevel::Internal, "u").is_err());
    let d = Document::new("POL-1", "Política", DocumentType::Policy, SecurityLevel::Internal, "u").unwrap();
    assert_eq!(d.status, DocumentStatus::Draft);
    assert_eq!(d.revision, 0);
  }

  #[test]
  fn status_is_derived_from_current_version_and_flags() {
    let mut d = Document::new("C-1", "Contrato", DocumentType::Contract, SecurityLevel::Confidential, "u").unwrap();
    let mut v = DocumentVersion::new(d.id,
                                     VersionNumber::release(1, 0, 0),
                                     VersionType::Major,
                                     "main",
                                     None,
                                     "sha256:00".to_string(),
                                     "sha256:00".to_string(),
                                     0,
                                     "u");
    v.status = VersionStatus::Approved;
    assert_eq!(d.derive_status(None), DocumentStatus::Draft);
    assert_eq!(d.derive_status(Some(&v)), DocumentStatus::Approved);
    d.is_archived = true;
    assert_eq!(d.derive_status(Some(&v)), DocumentStatus::Archived);
    d.is_deleted = true;
    assert_eq!(d.derive_status(Some(&v)), DocumentStatus::Deleted);
  }

  #[test]
  fn tags_are_deduplicated() {
    let d = Document::new("R-1", "Reporte", DocumentType::Report, SecurityLevel::Public, "u").unwrap();
    let d = d.with_tags(["legal", " legal", "", "q3"]);
    assert_eq!(d.tags, vec!["legal".to_string(), "q3".to_string()]);
    assert!(d.has_tag("LEGAL"));
  }

  #[test]
  fn retention_is_bounded() {
    let d = Document::new("R-2", "Reporte", DocumentType::Report, SecurityLevel::Public, "u").unwrap();
    let now = Utc::now();
    assert_eq!(d.retention_until(now).unwrap(), None);
    let d = d.with_retention_years(2);
    assert!(d.validate().is_ok());
    assert_eq!(d.retention_until(now).unwrap(), Some(now + Duration::days(730)));
    let huge = d.clone().with_retention_years(1_000_000);
    assert!(matches!(huge.validate(), Err(DomainError::Validation(_))));
    assert!(matches!(huge.retention_until(now), Err(DomainError::Validation(_))));
    let max = d.with_retention_years(MAX_RETENTION_YEARS);
    assert!(max.validate().is_ok());
    assert!(max.retention_until(now).unwrap().is_some());
  }
}
