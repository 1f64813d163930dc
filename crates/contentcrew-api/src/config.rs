use anyhow::{Context, Result, bail};
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub storage: StorageBackend,
    pub status_interval: Duration,
    pub job_retention: Duration,
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    InMemory,
    Postgres { url: String, max_connections: u32 },
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8000";
    const DEFAULT_STATUS_INTERVAL_MS: u64 = 1_000;
    const DEFAULT_DB_CONNECTIONS: u32 = 5;
    const DEFAULT_JOB_RETENTION_SECS: u64 = 600;

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("CONTENTCREW_LISTEN_ADDR")
            .unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = env::var("CONTENTCREW_MAX_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let status_interval = env::var("CONTENTCREW_STATUS_INTERVAL_MS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| "CONTENTCREW_STATUS_INTERVAL_MS must be a number of milliseconds")
            })
            .transpose()?
            .filter(|value| *value > 0)
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(Self::DEFAULT_STATUS_INTERVAL_MS));

        let job_retention = env::var("CONTENTCREW_JOB_RETENTION_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(Self::DEFAULT_JOB_RETENTION_SECS));

        Ok(Self {
            listen_addr,
            max_concurrency,
            storage: resolve_storage_backend()?,
            status_interval,
            job_retention,
        })
    }
}

fn resolve_storage_backend() -> Result<StorageBackend> {
    let backend = env::var("CONTENTCREW_STORAGE")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match backend.as_str() {
        "" | "memory" => Ok(StorageBackend::InMemory),
        "postgres" => {
            let url = env::var("DATABASE_URL")
                .context("DATABASE_URL must be set when CONTENTCREW_STORAGE=postgres")?;
            let max_connections = env::var("CONTENTCREW_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(AppConfig::DEFAULT_DB_CONNECTIONS);
            Ok(StorageBackend::Postgres {
                url,
                max_connections,
            })
        }
        other => bail!("unsupported CONTENTCREW_STORAGE value `{other}` (expected memory or postgres)"),
    }
}
