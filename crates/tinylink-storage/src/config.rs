use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Connection settings for the Postgres backend.
#[derive(Clone, TypedBuilder)]
pub struct PostgresConfig {
    #[builder(setter(into))]
    pub dsn: String,
    /// Upper bound of pooled connections shared by the whole process.
    #[builder(default = 20)]
    pub max_connections: u32,
    /// How long a caller waits for a pooled connection before failing with a timeout.
    #[builder(default = Duration::from_secs(5))]
    pub acquire_timeout: Duration,
    /// Drop and recreate the table on startup. Destroys every stored link.
    #[builder(default)]
    pub reset: bool,
}

impl std::fmt::Debug for PostgresConfig {
    // The DSN may embed credentials.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("dsn", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("reset", &self.reset)
            .finish()
    }
}

/// The primary backend. Exactly one is active per process.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Memory,
    Postgres(PostgresConfig),
}

impl Display for BackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Memory => write!(f, "in-memory"),
            BackendConfig::Postgres(_) => write!(f, "postgres"),
        }
    }
}

/// Configuration of the storage facade.
///
/// # Example
///
/// ```rust
/// use tinylink_storage::{BackendConfig, StorageConfig};
///
/// let config = StorageConfig::builder()
///     .backend(BackendConfig::Memory)
///     .file_path("/tmp/short-url-storage.json")
///     .build();
/// assert!(config.restore);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    pub backend: BackendConfig,
    /// Append-only snapshot file. Disabled when `None`.
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
    /// Replay the snapshot file into the primary backend on startup.
    #[builder(default = true)]
    pub restore: bool,
}
