//! Configuration management for Sealdrop Server

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub security: SecurityConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes.
    pub max_file_size: i64,
    /// Chunk size used when the client does not request one.
    pub default_chunk_size: i64,
    /// Upload sessions expire this many hours after creation, independent
    /// of the file's own expiry window.
    pub session_expire_hours: i64,
    /// Lifetime of presigned chunk-upload URLs.
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Salt mixed into requester IP hashes.
    pub ip_hash_salt: String,
    /// Static API tokens, `token:user_id:email` separated by commas.
    pub api_tokens: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "sealdrop".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
            },
            database: DatabaseConfig {
                url: "sqlite:./sealdrop.db".to_string(),
            },
            upload: UploadConfig {
                max_file_size: 500 * 1024 * 1024,
                default_chunk_size: 5 * 1024 * 1024,
                session_expire_hours: 24,
                presign_ttl_secs: 3600,
            },
            security: SecurityConfig {
                ip_hash_salt: "dev-salt".to_string(),
                api_tokens: "dev-token:dev-user:dev@example.com".to_string(),
            },
            sweeper: SweeperConfig { interval_secs: 300 },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            storage: StorageConfig {
                provider: match env::var("S3_PROVIDER").unwrap_or_else(|_| "minio".to_string()).as_str() {
                    "r2" => StorageProvider::R2,
                    "s3" => StorageProvider::S3,
                    "b2" => StorageProvider::B2,
                    _ => StorageProvider::Minio,
                },
                endpoint: env::var("S3_ENDPOINT")?,
                bucket: env::var("S3_BUCKET")?,
                access_key: env::var("S3_ACCESS_KEY")?,
                secret_key: env::var("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./sealdrop.db".to_string()),
            },
            upload: UploadConfig {
                max_file_size: env_i64("MAX_FILE_SIZE", 500 * 1024 * 1024),
                default_chunk_size: env_i64("DEFAULT_CHUNK_SIZE", 5 * 1024 * 1024),
                session_expire_hours: env_i64("UPLOAD_SESSION_EXPIRE_HOURS", 24),
                presign_ttl_secs: env_i64("PRESIGN_TTL_SECS", 3600) as u64,
            },
            security: SecurityConfig {
                ip_hash_salt: env::var("IP_HASH_SALT")?,
                api_tokens: env::var("API_TOKENS").unwrap_or_default(),
            },
            sweeper: SweeperConfig {
                interval_secs: env_i64("SWEEPER_INTERVAL_SECS", 300) as u64,
            },
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_upload_limits() {
        let config = Config::default();
        assert_eq!(config.upload.max_file_size, 500 * 1024 * 1024);
        assert_eq!(config.upload.default_chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.upload.session_expire_hours, 24);
    }
}
