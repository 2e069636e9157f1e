// Pool de conexiones y migraciones embebidas. El backend se elige en
// compilación: SQLite por defecto, Postgres con la feature `pg`.
use diesel::r2d2::ConnectionManager;
use r2d2::{Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use doc_domain::DomainError;
use docstore::{storage_err, Result};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[cfg(feature = "pg")]
pub type DbConn = diesel::pg::PgConnection;
#[cfg(not(feature = "pg"))]
pub type DbConn = diesel::sqlite::SqliteConnection;

pub type DbPool = Pool<ConnectionManager<DbConn>>;
pub(crate) type PooledConn = PooledConnection<ConnectionManager<DbConn>>;

/// Ajustes por conexión para SQLite: espera en bloqueos y WAL.
#[cfg(not(feature = "pg"))]
#[derive(Debug)]
struct SqlitePragmas;

#[cfg(not(feature = "pg"))]
impl r2d2::CustomizeConnection<DbConn, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut DbConn) -> std::result::Result<(), diesel::r2d2::Error> {
    use diesel::connection::SimpleConnection;
    conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Admite rutas SQLite con o sin prefijo `sqlite://`.
fn normalize_url(database_url: &str) -> String {
  #[cfg(not(feature = "pg"))]
  {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
      return path.to_string();
    }
  }
  database_url.to_string()
}

/// Crea el pool y aplica las migraciones pendientes.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
  let manager = ConnectionManager::<DbConn>::new(normalize_url(database_url));
  let builder = Pool::builder().max_size(max_size);
  #[cfg(not(feature = "pg"))]
  let builder = builder.connection_customizer(Box::new(SqlitePragmas));
  let pool = builder.build(manager).map_err(|e| storage_err("pool", e))?;
  let mut conn = pool.get().map_err(|e| storage_err("pool", e))?;
  let c: &mut DbConn = &mut conn;
  c.run_pending_migrations(MIGRATIONS)
   .map_err(|e| DomainError::Storage(format!("migraciones: {}", e)))?;
  log::info!("pool de base de datos listo (max_size={})", max_size);
  Ok(pool)
}

pub(crate) fn get_conn(pool: &DbPool) -> Result<PooledConn> {
  pool.get().map_err(|e| storage_err("pool", e))
}

/// URL desde el entorno (`DOCFLOW_DB_URL`, luego `DATABASE_URL`), cargando
/// `.env` si existe.
pub fn database_url_from_env() -> Option<String> {
  dotenvy::dotenv().ok();
  std::env::var("DOCFLOW_DB_URL").ok()
                                 .or_else(|| std::env::var("DATABASE_URL").ok())
                                 .filter(|s| !s.trim().is_empty())
}
