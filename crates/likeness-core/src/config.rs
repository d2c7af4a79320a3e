//! Configuration module
//!
//! Service configuration loaded from the environment: HTTP server, database, object storage,
//! and the credentials of the third-party APIs the pipeline orchestrates.

use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 4000;
const PROGRESS_POLL_INTERVAL_MS: u64 = 2500;
const REQUEST_TIMEOUT_SECS: u64 = 900;
const HTTP_CONCURRENCY_LIMIT: usize = 256;
const MAX_UPLOAD_SIZE_MB: usize = 100;

pub const DEFAULT_GEMINI_MODEL_ID: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_GEMINI_CLASSIFIER_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_WAVESPEED_BASE_URL: &str = "https://api.wavespeed.ai";
pub const DEFAULT_ENSEMBLE_BASE_URL: &str = "https://api.ensembledata.com/instagram";

/// Base configuration for the HTTP server
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub request_timeout_secs: u64,
    pub http_concurrency_limit: usize,
    pub max_upload_size_bytes: usize,
}

/// Full service configuration
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub storage_public_url: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Third-party APIs
    pub gemini_api_key: Option<String>,
    pub gemini_model_id: String,
    pub gemini_classifier_model: String,
    pub gemini_base_url: String,
    pub wavespeed_api_key: Option<String>,
    pub wavespeed_base_url: String,
    pub ensemble_data_token: Option<String>,
    pub ensemble_base_url: String,
    /// Externally reachable base of this service, used for proxy-routed reference fetches.
    pub public_base_url: String,
    pub progress_poll_interval_ms: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ServiceConfig>);

impl Config {
    fn as_service(&self) -> &ServiceConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_name(&self.as_service().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_service().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_service().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_service().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_service().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_service().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_service().base.db_timeout_seconds
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.as_service().base.request_timeout_secs
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.as_service().base.http_concurrency_limit
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.as_service().base.max_upload_size_bytes
    }

    pub fn database_url(&self) -> &str {
        &self.as_service().database_url
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_service().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_service().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> &str {
        &self.as_service().s3_region
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_service().s3_endpoint.as_deref()
    }

    pub fn s3_access_key_id(&self) -> Option<&str> {
        self.as_service().s3_access_key_id.as_deref()
    }

    pub fn s3_secret_access_key(&self) -> Option<&str> {
        self.as_service().s3_secret_access_key.as_deref()
    }

    pub fn storage_public_url(&self) -> Option<&str> {
        self.as_service().storage_public_url.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_service().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_service().local_storage_base_url.as_deref()
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        self.as_service().gemini_api_key.as_deref()
    }

    pub fn gemini_model_id(&self) -> &str {
        &self.as_service().gemini_model_id
    }

    pub fn gemini_classifier_model(&self) -> &str {
        &self.as_service().gemini_classifier_model
    }

    pub fn gemini_base_url(&self) -> &str {
        &self.as_service().gemini_base_url
    }

    pub fn wavespeed_api_key(&self) -> Option<&str> {
        self.as_service().wavespeed_api_key.as_deref()
    }

    pub fn wavespeed_base_url(&self) -> &str {
        &self.as_service().wavespeed_base_url
    }

    pub fn ensemble_data_token(&self) -> Option<&str> {
        self.as_service().ensemble_data_token.as_deref()
    }

    pub fn ensemble_base_url(&self) -> &str {
        &self.as_service().ensemble_base_url
    }

    pub fn public_base_url(&self) -> &str {
        &self.as_service().public_base_url
    }

    pub fn progress_poll_interval_ms(&self) -> u64 {
        self.as_service().progress_poll_interval_ms
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

/// Reads the first non-empty variable among `keys`.
fn first_var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_name(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
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
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| REQUEST_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(REQUEST_TIMEOUT_SECS),
            http_concurrency_limit: env::var("HTTP_CONCURRENCY_LIMIT")
                .unwrap_or_else(|_| HTTP_CONCURRENCY_LIMIT.to_string())
                .parse()
                .unwrap_or(HTTP_CONCURRENCY_LIMIT),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
        };

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::S3,
        };

        let r2_account_id = first_var(&["CLOUDFLARE_R2_ACCOUNT_ID"]);
        let s3_endpoint = first_var(&["S3_ENDPOINT"]).or_else(|| {
            r2_account_id
                .as_ref()
                .map(|account| format!("https://{}.r2.cloudflarestorage.com", account))
        });

        let config = ServiceConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: first_var(&["S3_BUCKET", "CLOUDFLARE_R2_BUCKET_NAME"]),
            s3_region: first_var(&["S3_REGION"]).unwrap_or_else(|| "auto".to_string()),
            s3_endpoint,
            s3_access_key_id: first_var(&["S3_ACCESS_KEY_ID", "CLOUDFLARE_R2_ACCESS_KEY_ID"]),
            s3_secret_access_key: first_var(&[
                "S3_SECRET_ACCESS_KEY",
                "CLOUDFLARE_R2_SECRET_ACCESS_KEY",
            ]),
            storage_public_url: first_var(&["STORAGE_PUBLIC_URL", "CLOUDFLARE_R2_PUBLIC_URL"])
                .map(|url| url.trim_end_matches('/').to_string()),
            local_storage_path: first_var(&["LOCAL_STORAGE_PATH"]),
            local_storage_base_url: first_var(&["LOCAL_STORAGE_BASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string()),
            gemini_api_key: first_var(&["GEMINI_API_KEY", "NANO_BANANA_API_KEY"]),
            gemini_model_id: first_var(&["GEMINI_MODEL_ID"])
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL_ID.to_string()),
            gemini_classifier_model: first_var(&["GEMINI_CLASSIFIER_MODEL"])
                .unwrap_or_else(|| DEFAULT_GEMINI_CLASSIFIER_MODEL.to_string()),
            gemini_base_url: first_var(&["GEMINI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            wavespeed_api_key: first_var(&["WAVESPEED_API_KEY"]),
            wavespeed_base_url: first_var(&["WAVESPEED_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_WAVESPEED_BASE_URL.to_string()),
            ensemble_data_token: first_var(&["ENSEMBLE_DATA_TOKEN"]),
            ensemble_base_url: first_var(&["ENSEMBLE_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_ENSEMBLE_BASE_URL.to_string()),
            public_base_url: first_var(&["PUBLIC_BASE_URL", "NEXT_PUBLIC_BASE_URL"])
                .unwrap_or_else(|| format!("http://localhost:{}", DEFAULT_PORT))
                .trim_end_matches('/')
                .to_string(),
            progress_poll_interval_ms: env::var("PROGRESS_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| PROGRESS_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(PROGRESS_POLL_INTERVAL_MS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.progress_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "PROGRESS_POLL_INTERVAL_MS must be greater than zero"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET or CLOUDFLARE_R2_BUCKET_NAME must be set when using S3 storage backend"
                    ));
                }
                if self.storage_public_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "STORAGE_PUBLIC_URL or CLOUDFLARE_R2_PUBLIC_URL must be set when using S3 storage backend"
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
