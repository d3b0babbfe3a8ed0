//! Configuration module
//!
//! Server, database, storage, ingestion and download settings, read from the
//! environment (after loading a `.env` file when present).

use std::env;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Settings shared by every meshdepot binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub service_name: String,
}

/// Asset ingestion and serving configuration
#[derive(Clone, Debug)]
pub struct MeshdepotConfig {
    pub base: BaseConfig,
    /// `postgresql://...`, or `memory://` for the in-process store
    pub database_url: String,
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Ingestion
    pub max_upload_size_bytes: usize,
    pub upload_queue_max_workers: usize,
    pub upload_queue_capacity: usize,
    pub id_generator_id: u16,
    // Hosts (and their subdomains) the browser may fetch download resources from.
    // Example: "archive.org,cdn.example.com"
    pub download_cors_allowlist: Vec<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<MeshdepotConfig>);

impl Config {
    fn inner(&self) -> &MeshdepotConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = MeshdepotConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn service_name(&self) -> &str {
        &self.inner().base.service_name
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    /// True when `DATABASE_URL` selects the in-process store instead of Postgres
    pub fn uses_memory_store(&self) -> bool {
        self.inner().database_url.starts_with("memory://")
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.inner().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.inner().max_upload_size_bytes
    }

    pub fn upload_queue_max_workers(&self) -> usize {
        self.inner().upload_queue_max_workers
    }

    pub fn upload_queue_capacity(&self) -> usize {
        self.inner().upload_queue_capacity
    }

    pub fn id_generator_id(&self) -> u16 {
        self.inner().id_generator_id
    }

    pub fn download_cors_allowlist(&self) -> &[String] {
        &self.inner().download_cors_allowlist
    }
}

impl MeshdepotConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_UPLOAD_SIZE_MB: usize = 500;
        const UPLOAD_QUEUE_MAX_WORKERS: usize = 4;
        const UPLOAD_QUEUE_CAPACITY: usize = 256;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "meshdepot-api".to_string()),
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?;

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let id_generator_id = env::var("ID_GENERATOR_ID")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("ID_GENERATOR_ID must be a number between 0 and 1023"))?;

        let config = MeshdepotConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            upload_queue_max_workers: env::var("UPLOAD_QUEUE_MAX_WORKERS")
                .unwrap_or_else(|_| UPLOAD_QUEUE_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(UPLOAD_QUEUE_MAX_WORKERS),
            upload_queue_capacity: env::var("UPLOAD_QUEUE_CAPACITY")
                .unwrap_or_else(|_| UPLOAD_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(UPLOAD_QUEUE_CAPACITY),
            id_generator_id,
            download_cors_allowlist: parse_host_list(
                &env::var("DOWNLOAD_CORS_ALLOWLIST").unwrap_or_default(),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("memory://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a PostgreSQL connection string or memory://"
            ));
        }

        if self.id_generator_id > 1023 {
            return Err(anyhow::anyhow!(
                "ID_GENERATOR_ID must be a number between 0 and 1023"
            ));
        }

        if self.upload_queue_max_workers == 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_QUEUE_MAX_WORKERS must be at least 1"
            ));
        }

        for host in &self.download_cors_allowlist {
            if !is_bare_host(host) {
                return Err(anyhow::anyhow!(
                    "DOWNLOAD_CORS_ALLOWLIST entry '{}' must be a bare host name",
                    host
                ));
            }
        }

        // Validate storage backend configuration
        let backend = self.storage_backend.unwrap_or(StorageBackend::Local);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Split a comma-separated host list, lowercasing and dropping blanks.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A bare host has no scheme, path, port separator or whitespace.
pub fn is_bare_host(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('.')
        && !host.ends_with('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MeshdepotConfig {
        MeshdepotConfig {
            base: BaseConfig {
                server_port: 4000,
                cors_origins: vec!["*".to_string()],
                db_max_connections: MAX_CONNECTIONS,
                db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
                environment: "development".to_string(),
                service_name: "meshdepot-api".to_string(),
            },
            database_url: "memory://".to_string(),
            storage_backend: Some(StorageBackend::Local),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: Some("/tmp/meshdepot".to_string()),
            local_storage_base_url: Some("http://localhost:4000/files".to_string()),
            max_upload_size_bytes: 1024,
            upload_queue_max_workers: 2,
            upload_queue_capacity: 16,
            id_generator_id: 1,
            download_cors_allowlist: vec!["archive.org".to_string()],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_allowlist_with_scheme_is_rejected() {
        let mut config = sample();
        config.download_cors_allowlist = vec!["https://archive.org".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DOWNLOAD_CORS_ALLOWLIST"));
    }

    #[test]
    fn test_generator_id_out_of_range_is_rejected() {
        let mut config = sample();
        config.id_generator_id = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let mut config = sample();
        config.storage_backend = Some(StorageBackend::S3);
        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_err());
        config.s3_bucket = Some("models".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_host_list_trims_and_lowercases() {
        assert_eq!(
            parse_host_list(" Archive.org, ,cdn.example.com "),
            vec!["archive.org".to_string(), "cdn.example.com".to_string()]
        );
        assert!(parse_host_list("").is_empty());
    }

    #[test]
    fn test_is_bare_host() {
        assert!(is_bare_host("archive.org"));
        assert!(is_bare_host("poly-cdn.example.com"));
        assert!(!is_bare_host("archive.org/path"));
        assert!(!is_bare_host("archive.org:443"));
        assert!(!is_bare_host("two words"));
        assert!(!is_bare_host(".archive.org"));
    }
}
