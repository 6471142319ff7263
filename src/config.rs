use std::collections::BTreeSet;

use serde::Deserialize;

pub const DEFAULT_MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_AVATAR_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// S3-compatible bucket holding avatar images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base used to build public object URLs, e.g. `https://cdn.example.com/storage/v1/object/public`.
    pub public_url: String,
}

/// Immutable limits handed to the account service at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub max_file_size_bytes: usize,
    pub allowed_mime_types: BTreeSet<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_AVATAR_BYTES,
            allowed_mime_types: DEFAULT_AVATAR_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub accounts: AccountConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "dishhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "dishhub-users".into()),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("STORAGE_ENDPOINT")?,
            bucket: std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "avatars".into()),
            access_key: std::env::var("STORAGE_ACCESS_KEY")?,
            secret_key: std::env::var("STORAGE_SECRET_KEY")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("STORAGE_PUBLIC_URL")?,
        };
        let accounts = AccountConfig {
            max_file_size_bytes: std::env::var("AVATAR_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_MAX_AVATAR_BYTES),
            ..AccountConfig::default()
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            accounts,
        })
    }
}
