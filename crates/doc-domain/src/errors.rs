// errors.rs
use crate::DocumentType;
use thiserror::Error;
use uuid::Uuid;

/// Taxonomía de errores del motor de versiones y aprobaciones.
///
/// Todos los errores, salvo `Storage`, son de validación: se devuelven al
/// llamador sin reintentos y la transacción que los produjo se descarta.
/// `Storage` representa un fallo transitorio (I/O, conexión perdida) y es el
/// único que se reintenta; al agotar los reintentos se convierte en
/// `StorageUnavailable`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
  #[error("Error de validación: {0}")]
  Validation(String),
  #[error("Contenido no encontrado: {0}")]
  ContentNotFound(String),
  #[error("Checksum no coincide: esperado {expected}, obtenido {actual}")]
  ChecksumMismatch { expected: String, actual: String },
  #[error("Conflicto de versión: {0}")]
  VersionConflict(String),
  #[error("La plantilla {template_id} no aplica al tipo de documento {document_type}")]
  WorkflowTemplateMismatch { template_id: Uuid, document_type: DocumentType },
  #[error("Transición inválida: {0}")]
  InvalidTransition(String),
  #[error("Decisión duplicada para la instancia {instance_id}, paso {step_index}")]
  DuplicateDecision { instance_id: Uuid, step_index: usize },
  #[error("El aprobador {approver_id} no tiene el rol requerido {required_role}")]
  UnauthorizedApprover { approver_id: String, required_role: String },
  #[error("Documento no encontrado: {0}")]
  DocumentNotFound(Uuid),
  #[error("Versión no encontrada: {0}")]
  VersionNotFound(Uuid),
  #[error("Instancia de workflow no encontrada: {0}")]
  InstanceNotFound(Uuid),
  #[error("Plantilla de workflow no encontrada: {0}")]
  TemplateNotFound(Uuid),
  /// Fallo transitorio de almacenamiento; candidato a reintento.
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Reintentos agotados.
  #[error("Almacenamiento no disponible: {0}")]
  StorageUnavailable(String),
  #[error("Error de serialización: {0}")]
  Serialization(String),
}

impl DomainError {
  /// Indica si el error puede resolverse reintentando la operación.
  pub fn is_transient(&self) -> bool {
    matches!(self, DomainError::Storage(_))
  }
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}
