//! Crate `docstore` — contratos de almacenamiento del motor documental
//!
//! Define el store transaccional (`DocumentStore` / `StoreTx`) sobre el que
//! se guardan documentos, versiones, plantillas, instancias y el ledger de
//! aprobaciones, el store de contenido direccionado por checksum
//! (`ContentStore`), implementaciones en memoria para pruebas y la política de
//! reintentos (`RetryPolicy`).
//!
//! Diseño resumido:
//! - Una única transacción por operación: lo que se escribe dentro de
//!   `DocumentStore::transaction` se confirma entero o se descarta entero.
//! - Locking optimista: `update_document` recibe la revisión esperada y
//!   devuelve `PersistResult::Conflict` si otra escritura se adelantó.
//! - Ledger append-only con unicidad `(instancia, paso)`.
//!
//! Ejemplo rápido:
//! ```rust
//! use docstore::{in_transaction, InMemoryDocumentStore, StoreTx};
//! let store = InMemoryDocumentStore::new();
//! let docs = in_transaction(&store, |tx: &mut dyn StoreTx| tx.list_documents()).unwrap();
//! assert!(docs.is_empty());
//! ```
pub mod domain;
pub mod errors;
pub mod repository;
pub mod retry;
pub mod stubs;

pub use domain::*;
pub use errors::*;
pub use repository::*;
pub use retry::*;
pub use stubs::*;
