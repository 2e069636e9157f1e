// Archivo: errors.rs
// Propósito: alias `Result<T>` usado por los contratos de almacenamiento.
// Los stores comparten la taxonomía de `doc_domain::DomainError`; los fallos
// de infraestructura se reportan como `DomainError::Storage` (transitorios).
pub use doc_domain::DomainError;

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Construye un error de almacenamiento con contexto.
pub fn storage_err(context: &str, e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("{}: {}", context, e))
}
