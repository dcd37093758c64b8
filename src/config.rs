use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible object storage for recipe images.
#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// `None` keeps uploaded images in process memory.
    pub minio: Option<MinioConfig>,
    pub image_url_ttl_secs: u64,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "recipebox".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "recipebox-users".into()),
            ttl_minutes: parse_var("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: parse_var("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            jwt,
            minio: minio_from_env()?,
            image_url_ttl_secs: parse_var("IMAGE_URL_TTL_SECS").unwrap_or(30 * 60),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(20 * 1024 * 1024),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

fn minio_from_env() -> anyhow::Result<Option<MinioConfig>> {
    let vars = [
        std::env::var("MINIO_ENDPOINT").ok(),
        std::env::var("MINIO_BUCKET").ok(),
        std::env::var("MINIO_ACCESS_KEY").ok(),
        std::env::var("MINIO_SECRET_KEY").ok(),
    ];
    match vars {
        [Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)] => Ok(Some(MinioConfig {
            endpoint,
            bucket,
            access_key,
            secret_key,
        })),
        [None, None, None, None] => Ok(None),
        _ => anyhow::bail!(
            "MINIO_ENDPOINT, MINIO_BUCKET, MINIO_ACCESS_KEY and MINIO_SECRET_KEY \
             must be set together"
        ),
    }
}
