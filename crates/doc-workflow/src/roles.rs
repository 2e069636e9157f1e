// Frontera con el directorio de roles externo. El motor sólo pregunta si un
// aprobador tiene un rol; la gestión de usuarios queda fuera.
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

pub trait RoleDirectory: Send + Sync {
  fn has_role(&self, approver_id: &str, role: &str) -> bool;
}

/// Directorio en proceso con asignaciones fijas (usuario -> roles).
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
  grants: RwLock<HashMap<String, HashSet<String>>>,
}

impl StaticRoleDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn grant(&self, approver_id: &str, role: &str) {
    let mut g = self.grants.write().unwrap_or_else(|e| e.into_inner());
    g.entry(approver_id.to_string()).or_default().insert(role.to_string());
  }

  pub fn revoke(&self, approver_id: &str, role: &str) {
    let mut g = self.grants.write().unwrap_or_else(|e| e.into_inner());
    if let Some(roles) = g.get_mut(approver_id) {
      roles.remove(role);
    }
  }

  pub fn with_grant(self, approver_id: &str, role: &str) -> Self {
    self.grant(approver_id, role);
    self
  }
}

impl RoleDirectory for StaticRoleDirectory {
  fn has_role(&self, approver_id: &str, role: &str) -> bool {
    let g = self.grants.read().unwrap_or_else(|e| e.into_inner());
    g.get(approver_id).map(|r| r.contains(role)).unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grants_and_revokes() {
    let dir = StaticRoleDirectory::new().with_grant("ana", "manager");
    assert!(dir.has_role("ana", "manager"));
    assert!(!dir.has_role("ana", "director"));
    dir.revoke("ana", "manager");
    assert!(!dir.has_role("ana", "manager"));
  }
}
