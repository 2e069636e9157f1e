// Archivo: retry.rs
// Propósito: reintentos con backoff exponencial acotado para fallos
// transitorios de almacenamiento.
//
// Sólo `DomainError::Storage` se reintenta. Cualquier otro error se devuelve
// en el primer intento. Al agotar los reintentos el último fallo se convierte
// en `DomainError::StorageUnavailable`.
use crate::errors::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Política de reintentos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Número de reintentos tras el primer intento.
    pub max_retries: u32,
    /// Espera antes del primer reintento.
    pub initial_delay_ms: u64,
    /// Tope de la espera.
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3,
               initial_delay_ms: 50,
               max_delay_ms: 2_000,
               multiplier: 2.0 }
    }
}

impl RetryPolicy {
    /// Política sin esperas, útil en pruebas.
    pub fn immediate(max_retries: u32) -> Self {
        Self { max_retries,
               initial_delay_ms: 0,
               max_delay_ms: 0,
               multiplier: 1.0 }
    }

    /// Espera antes del reintento `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let ms = (self.initial_delay_ms as f64 * self.multiplier.powi(exp)) as u64;
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Ejecuta `op` reintentando mientras falle con un error transitorio.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
        where F: FnMut() -> Result<T>
    {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => {
                    if attempt >= self.max_retries {
                        log::error!("{}: reintentos agotados tras {} intentos: {}", operation, attempt + 1, e);
                        return Err(DomainError::StorageUnavailable(format!("{}: {}", operation, e)));
                    }
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    log::warn!("{}: fallo transitorio ({}), reintento {}/{} en {:?}",
                               operation,
                               e,
                               attempt,
                               self.max_retries,
                               delay);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::immediate(3);
        let out = policy.run("op", || {
                            calls.set(calls.get() + 1);
                            if calls.get() < 3 {
                                Err(DomainError::Storage("io".into()))
                            } else {
                                Ok(7)
                            }
                        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_yields_storage_unavailable() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::immediate(2);
        let out: Result<()> = policy.run("op", || {
                                        calls.set(calls.get() + 1);
                                        Err(DomainError::Storage("io".into()))
                                    });
        assert!(matches!(out, Err(DomainError::StorageUnavailable(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn validation_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<()> = RetryPolicy::immediate(5).run("op", || {
                                                           calls.set(calls.get() + 1);
                                                           Err(DomainError::Validation("x".into()))
                                                       });
        assert!(matches!(out, Err(DomainError::Validation(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy { max_retries: 10,
                              initial_delay_ms: 100,
                              max_delay_ms: 500,
                              multiplier: 2.0 };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(6), Duration::from_millis(500));
    }
}
