// Archivo: domain.rs
// Propósito: tipos auxiliares compartidos por los stores (resultado de
// escrituras optimistas y registros del Content Store).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resultado de una escritura con control de concurrencia optimista.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistResult {
    /// Escritura aplicada; `new_revision` es la revisión resultante.
    Ok { new_revision: i64 },
    /// La revisión almacenada no coincide con la esperada.
    Conflict { expected: i64, actual: i64 },
}

/// Respuesta de `ContentStore::put`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReceipt {
    pub content_ref: String,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Registro almacenado de un blob de contenido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub content_ref: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub bytes: Vec<u8>,
    pub tombstoned: bool,
    pub created_at: DateTime<Utc>,
}
