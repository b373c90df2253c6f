use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tinylink_storage::{BackendConfig, PostgresConfig, StorageConfig};
use tinylink_telemetry::LogFormat;

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const DB_POOL_WORKERS_ENV: &str = "DB_POOL_WORKERS";
pub const STORAGE_BACKEND_ENV: &str = "TINYLINK_STORAGE_BACKEND";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DB_POOL_WORKERS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tinylink", about = "Shorten, resolve and manage short links")]
pub struct CLI {
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Append-only snapshot file. With the in-memory backend this is what
    /// makes links survive between invocations.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = DB_POOL_WORKERS_ENV, default_value_t = DEFAULT_DB_POOL_WORKERS)]
    pub db_pool_workers: u32,

    /// Drop and recreate the Postgres table before running the command.
    #[arg(long)]
    pub reset_database: bool,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a single URL.
    Shorten {
        url: String,
        #[arg(long, default_value = "anonymous")]
        owner: String,
        /// Stop resolving the link after this many seconds.
        #[arg(long)]
        expire_in: Option<u64>,
    },
    /// Shorten several URLs at once; either all are stored or none.
    ShortenBatch {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, default_value = "anonymous")]
        owner: String,
    },
    /// Print the original URL behind an alias.
    Resolve { alias: String },
    /// List the live links of an owner.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Delete aliases owned by `owner`. Aliases owned by others are skipped.
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        aliases: Vec<String>,
    },
    /// Print the number of live URLs and owners.
    Stats,
    /// Check that the primary backend is reachable.
    Ping,
}

impl CLI {
    pub fn storage_config(&self) -> anyhow::Result<StorageConfig> {
        let backend = match self.storage {
            StorageBackendArg::InMemory => BackendConfig::Memory,
            StorageBackendArg::Postgres => {
                let dsn = self
                    .database_dsn
                    .clone()
                    .context("database dsn is required when storage backend is postgres")?;
                BackendConfig::Postgres(
                    PostgresConfig::builder()
                        .dsn(dsn)
                        .max_connections(self.db_pool_workers)
                        .reset(self.reset_database)
                        .build(),
                )
            }
        };

        let config = match &self.file_storage_path {
            Some(path) => StorageConfig::builder()
                .backend(backend)
                .file_path(path.clone())
                .build(),
            None => StorageConfig::builder().backend(backend).build(),
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_requires_dsn() {
        let parsed = CLI::try_parse_from(["tinylink", "--storage", "postgres", "stats"]);

        assert!(parsed.is_err());
    }

    #[test]
    fn builds_storage_config() {
        let cli = CLI::try_parse_from([
            "tinylink",
            "--storage",
            "postgres",
            "--database-dsn",
            "postgres://localhost/tinylink",
            "--db-pool-workers",
            "4",
            "--file-storage-path",
            "/tmp/links.json",
            "stats",
        ])
        .unwrap();

        let config = cli.storage_config().unwrap();
        match config.backend {
            BackendConfig::Postgres(postgres) => assert_eq!(postgres.max_connections, 4),
            BackendConfig::Memory => panic!("expected postgres backend"),
        }
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/links.json")));
    }

    #[test]
    fn parses_delete() {
        let cli =
            CLI::try_parse_from(["tinylink", "delete", "--owner", "u1", "abc", "def"]).unwrap();

        match cli.command {
            Command::Delete { owner, aliases } => {
                assert_eq!(owner, "u1");
                assert_eq!(aliases, vec!["abc".to_string(), "def".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
