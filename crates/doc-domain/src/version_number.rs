// version_number.rs
use crate::{DomainError, VersionType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Número de versión: triple `major.minor.patch` o marcador de borrador.
///
/// El orden derivado coloca `Draft` por debajo de cualquier release, de modo
/// que los borradores nunca cuentan como cabeza numerada de un linaje.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionNumber {
  Draft,
  Release { major: u32, minor: u32, patch: u32 },
}

impl VersionNumber {
  pub fn release(major: u32, minor: u32, patch: u32) -> Self {
    VersionNumber::Release { major, minor, patch }
  }

  pub fn is_draft(&self) -> bool {
    matches!(self, VersionNumber::Draft)
  }

  /// Calcula el siguiente número a partir del último release conocido.
  ///
  /// - MAJOR incrementa `major` y reinicia `minor`/`patch`.
  /// - MINOR incrementa `minor` y reinicia `patch`.
  /// - PATCH incrementa sólo `patch`.
  /// - DRAFT no se numera.
  ///
  /// Sin release previo se parte de `0.0.0` (MAJOR produce `1.0.0`).
  pub fn next(base: Option<VersionNumber>, kind: VersionType) -> VersionNumber {
    let (major, minor, patch) = match base {
      Some(VersionNumber::Release { major, minor, patch }) => (major, minor, patch),
      _ => (0, 0, 0),
    };
    match kind {
      VersionType::Major => VersionNumber::release(major + 1, 0, 0),
      VersionType::Minor => VersionNumber::release(major, minor + 1, 0),
      VersionType::Patch => VersionNumber::release(major, minor, patch + 1),
      VersionType::Draft => VersionNumber::Draft,
    }
  }
}

impl fmt::Display for VersionNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VersionNumber::Draft => write!(f, "DRAFT"),
      VersionNumber::Release { major, minor, patch } => write!(f, "{}.{}.{}", major, minor, patch),
    }
  }
}

impl FromStr for VersionNumber {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("draft") {
      return Ok(VersionNumber::Draft);
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 {
      return Err(DomainError::Validation(format!("Número de versión inválido: {}", s)));
    }
    let mut nums = [0u32; 3];
    for (i, p) in parts.iter().enumerate() {
      nums[i] = p.parse::<u32>()
                 .map_err(|_| DomainError::Validation(format!("Componente de versión inválido: {}", s)))?;
    }
    Ok(VersionNumber::release(nums[0], nums[1], nums[2]))
  }
}

impl TryFrom<String> for VersionNumber {
  type Error = DomainError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<VersionNumber> for String {
  fn from(v: VersionNumber) -> Self {
    v.to_string()
  }
}
