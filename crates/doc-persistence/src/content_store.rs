use crate::pool::{build_pool, get_conn, DbPool};
use crate::rows::{from_ts, ts, ContentRow};
use crate::schema::contents;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use doc_domain::{content_checksum, DomainError};
use docstore::{verify_content, ContentReceipt, ContentStore, Result, StoredContent};
use std::sync::Arc;

/// Content store sobre la tabla `contents`. Los bytes se guardan en base64.
#[derive(Clone)]
pub struct DieselContentStore {
  pool: Arc<DbPool>,
}

fn db_err(e: DieselError) -> DomainError {
  DomainError::Storage(format!("db: {}", e))
}

impl DieselContentStore {
  pub fn new(database_url: &str) -> Result<Self> {
    Ok(Self::from_pool(Arc::new(build_pool(database_url, 4)?)))
  }

  pub fn from_pool(pool: Arc<DbPool>) -> Self {
    Self { pool }
  }

  fn load(&self, content_ref: &str) -> Result<Option<StoredContent>> {
    let mut conn = get_conn(&self.pool)?;
    let row = contents::table.find(content_ref)
                             .first::<ContentRow>(&mut conn)
                             .optional()
                             .map_err(db_err)?;
    match row {
      Some(r) => {
        let bytes = STANDARD.decode(r.data.as_bytes())
                            .map_err(|e| DomainError::Serialization(format!("base64 en {}: {}", r.content_ref, e)))?;
        Ok(Some(StoredContent { content_ref: r.content_ref,
                                checksum: r.checksum,
                                size_bytes: r.size_bytes.max(0) as u64,
                                bytes,
                                tombstoned: r.tombstoned,
                                created_at: from_ts(r.created_at_ts)? }))
      }
      None => Ok(None),
    }
  }

  fn set_tombstone(&self, content_ref: &str, value: bool) -> Result<usize> {
    let mut conn = get_conn(&self.pool)?;
    diesel::update(contents::table.find(content_ref)).set(contents::tombstoned.eq(value))
                                                     .execute(&mut conn)
                                                     .map_err(db_err)
  }
}

impl ContentStore for DieselContentStore {
  fn put(&self, bytes: &[u8]) -> Result<ContentReceipt> {
    let checksum = content_checksum(bytes);
    let receipt = ContentReceipt { content_ref: checksum.clone(),
                                   checksum: checksum.clone(),
                                   size_bytes: bytes.len() as u64 };
    if self.set_tombstone(&checksum, false)? == 1 {
      log::debug!("contenido {} ya existente", checksum);
      return Ok(receipt);
    }
    let row = ContentRow { content_ref: checksum.clone(),
                           checksum: checksum.clone(),
                           size_bytes: bytes.len() as i64,
                           data: STANDARD.encode(bytes),
                           tombstoned: false,
                           created_at_ts: ts(&Utc::now()) };
    let mut conn = get_conn(&self.pool)?;
    match diesel::insert_into(contents::table).values(&row).execute(&mut conn) {
      Ok(_) => {
        log::debug!("contenido {} guardado ({} bytes)", checksum, bytes.len());
        Ok(receipt)
      }
      // Otro escritor insertó los mismos bytes en paralelo.
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(receipt),
      Err(e) => Err(db_err(e)),
    }
  }

  fn get(&self, content_ref: &str, expected_checksum: Option<&str>) -> Result<Vec<u8>> {
    match self.load(content_ref)? {
      Some(c) if !c.tombstoned => verify_content(&c, expected_checksum),
      _ => Err(DomainError::ContentNotFound(content_ref.to_string())),
    }
  }

  fn audit_get(&self, content_ref: &str) -> Result<Vec<u8>> {
    self.load(content_ref)?
        .map(|c| c.bytes)
        .ok_or_else(|| DomainError::ContentNotFound(content_ref.to_string()))
  }

  fn tombstone(&self, content_ref: &str) -> Result<()> {
    if self.set_tombstone(content_ref, true)? == 0 {
      return Err(DomainError::ContentNotFound(content_ref.to_string()));
    }
    Ok(())
  }

  fn exists(&self, content_ref: &str) -> Result<bool> {
    Ok(self.load(content_ref)?.map(|c| !c.tombstoned).unwrap_or(false))
  }
}
