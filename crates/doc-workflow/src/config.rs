// Configuración del motor. Se lee del entorno (con `.env` si existe) y cae a
// valores por defecto para todo lo que no esté definido.
use doc_domain::{DomainError, VersionType};
use docstore::RetryPolicy;
use serde::{Deserialize, Serialize};

const MAX_EXPIRING_SOON_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Reintentos para el Content Store y para `advance`.
  pub retry: RetryPolicy,
  /// Tipo de versión que crea `merge_branch` si el llamador no indica uno.
  pub merge_version_type: VersionType,
  /// Ventana (días) de la consulta de versiones próximas a expirar.
  pub expiring_soon_days: i64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self { retry: RetryPolicy::default(),
           merge_version_type: VersionType::Major,
           expiring_soon_days: 30 }
  }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, DomainError> {
  match std::env::var(key) {
    Ok(raw) if !raw.trim().is_empty() => raw.trim()
                                            .parse::<T>()
                                            .map(Some)
                                            .map_err(|_| DomainError::Validation(format!("{} inválida: {}", key, raw))),
    _ => Ok(None),
  }
}

impl EngineConfig {
  /// Lee `DOCFLOW_RETRY_MAX`, `DOCFLOW_RETRY_INITIAL_MS`,
  /// `DOCFLOW_RETRY_MAX_MS`, `DOCFLOW_MERGE_VERSION_TYPE` y
  /// `DOCFLOW_EXPIRING_SOON_DAYS`.
  pub fn from_env() -> Result<Self, DomainError> {
    dotenvy::dotenv().ok();
    let mut cfg = EngineConfig::default();
    if let Some(v) = env_parse::<u32>("DOCFLOW_RETRY_MAX")? {
      cfg.retry.max_retries = v;
    }
    if let Some(v) = env_parse::<u64>("DOCFLOW_RETRY_INITIAL_MS")? {
      cfg.retry.initial_delay_ms = v;
    }
    if let Some(v) = env_parse::<u64>("DOCFLOW_RETRY_MAX_MS")? {
      cfg.retry.max_delay_ms = v;
    }
    if let Some(raw) = env_parse::<String>("DOCFLOW_MERGE_VERSION_TYPE")? {
      cfg.merge_version_type = raw.parse()?;
    }
    if let Some(v) = env_parse::<i64>("DOCFLOW_EXPIRING_SOON_DAYS")? {
      cfg.expiring_soon_days = v;
    }
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<(), DomainError> {
    if self.merge_version_type == VersionType::Draft {
      return Err(DomainError::Validation("un merge no puede producir una versión DRAFT".to_string()));
    }
    if !(0..=MAX_EXPIRING_SOON_DAYS).contains(&self.expiring_soon_days) {
      return Err(DomainError::Validation(format!("DOCFLOW_EXPIRING_SOON_DAYS debe estar entre 0 y {}",
                                                 MAX_EXPIRING_SOON_DAYS)));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_merge_as_major() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.merge_version_type, VersionType::Major);
    assert!(cfg.validate().is_ok());
  }

  #[test]
  fn draft_merges_are_rejected() {
    let cfg = EngineConfig { merge_version_type: VersionType::Draft, ..EngineConfig::default() };
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn expiring_window_is_bounded() {
    let cfg = EngineConfig { expiring_soon_days: i64::MAX, ..EngineConfig::default() };
    assert!(cfg.validate().is_err());
    let cfg = EngineConfig { expiring_soon_days: -1, ..EngineConfig::default() };
    assert!(cfg.validate().is_err());
  }
}
