//! Server configuration.
//!
//! Loaded from the environment (a `.env` file is read first when present).
//! See [`Config::from_env`] for the variables and their defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Lifetime of an upload URL.
pub const DEFAULT_UPLOAD_URL_TTL_SECS: u64 = 300;

/// Lifetime of a review read link.
pub const DEFAULT_READ_URL_TTL_SECS: u64 = 3600;

/// Maximum number of records returned by the review listing.
pub const DEFAULT_REVIEW_LIST_LIMIT: usize = 100;

/// Default Google Sheets append range.
pub const DEFAULT_SHEETS_RANGE: &str = "Respuestas!A:Z";

/// Which storage backend holds media and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Local,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" | "fs" => Ok(Self::Local),
            other => Err(format!("unknown storage backend '{}' (expected s3 or local)", other)),
        }
    }
}

/// Google Sheets append target.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub access_token: String,
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageKind,

    // S3
    pub s3_bucket: Option<String>,
    pub aws_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_base_url: Option<String>,

    // Local proxy
    pub local_storage_dir: PathBuf,
    pub public_base_url: String,
    pub signing_secret: String,

    pub upload_url_ttl: Duration,
    pub read_url_ttl: Duration,
    pub review_list_limit: usize,

    // Forwarding
    pub webhook_url: Option<String>,
    pub sheets: Option<SheetsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            storage: StorageKind::Local,
            s3_bucket: None,
            aws_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_public_base_url: None,
            local_storage_dir: PathBuf::from("./data"),
            public_base_url: format!("http://localhost:{}", DEFAULT_PORT),
            signing_secret: String::new(),
            upload_url_ttl: Duration::from_secs(DEFAULT_UPLOAD_URL_TTL_SECS),
            read_url_ttl: Duration::from_secs(DEFAULT_READ_URL_TTL_SECS),
            review_list_limit: DEFAULT_REVIEW_LIST_LIMIT,
            webhook_url: None,
            sheets: None,
        }
    }
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PORT` | 3000 |
    /// | `STORAGE_BACKEND` | `local` |
    /// | `S3_BUCKET` (or `BUCKET`) | required for `s3` |
    /// | `AWS_REGION` | `us-east-1` |
    /// | `S3_ENDPOINT`, `S3_PUBLIC_BASE_URL` | unset |
    /// | `LOCAL_STORAGE_DIR` | `./data` |
    /// | `PUBLIC_BASE_URL` | `http://localhost:{PORT}` |
    /// | `UPLOAD_SIGNING_SECRET` | random per process |
    /// | `UPLOAD_URL_TTL_SECS` / `READ_URL_TTL_SECS` | 300 / 3600 |
    /// | `REVIEW_LIST_LIMIT` | 100 |
    /// | `WEBHOOK_URL` | unset |
    /// | `SHEETS_ID`, `SHEETS_ACCESS_TOKEN`, `SHEETS_RANGE` | unset, unset, `Respuestas!A:Z` |
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| format!("PORT is not a port number: {}", v))?,
            None => defaults.port,
        };

        let storage = match get("STORAGE_BACKEND") {
            Some(v) => v.parse()?,
            None => defaults.storage,
        };

        let signing_secret = match get("UPLOAD_SIGNING_SECRET") {
            Some(secret) => secret,
            None => {
                if storage == StorageKind::Local {
                    tracing::warn!(
                        "UPLOAD_SIGNING_SECRET not set, upload URLs will not survive a restart"
                    );
                }
                uuid::Uuid::new_v4().simple().to_string()
            }
        };

        let sheets = match (get("SHEETS_ID"), get("SHEETS_ACCESS_TOKEN")) {
            (Some(spreadsheet_id), Some(access_token)) => Some(SheetsConfig {
                spreadsheet_id,
                access_token,
                range: get("SHEETS_RANGE").unwrap_or_else(|| DEFAULT_SHEETS_RANGE.to_string()),
            }),
            (Some(_), None) => return Err("SHEETS_ID is set but SHEETS_ACCESS_TOKEN is not".into()),
            _ => None,
        };

        Ok(Self {
            port,
            storage,
            s3_bucket: get("S3_BUCKET").or_else(|| get("BUCKET")),
            aws_region: get("AWS_REGION").unwrap_or(defaults.aws_region),
            s3_endpoint: get("S3_ENDPOINT"),
            s3_public_base_url: get("S3_PUBLIC_BASE_URL"),
            local_storage_dir: get("LOCAL_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_storage_dir),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            signing_secret,
            upload_url_ttl: parse_secs(get("UPLOAD_URL_TTL_SECS"), "UPLOAD_URL_TTL_SECS")?
                .unwrap_or(defaults.upload_url_ttl),
            read_url_ttl: parse_secs(get("READ_URL_TTL_SECS"), "READ_URL_TTL_SECS")?
                .unwrap_or(defaults.read_url_ttl),
            review_list_limit: match get("REVIEW_LIST_LIMIT") {
                Some(v) => v
                    .parse()
                    .map_err(|_| format!("REVIEW_LIST_LIMIT is not a number: {}", v))?,
                None => defaults.review_list_limit,
            },
            webhook_url: get("WEBHOOK_URL"),
            sheets,
        })
    }

    /// Override the port, keeping a derived public URL in sync.
    pub fn with_port(mut self, port: u16) -> Self {
        if self.public_base_url == format!("http://localhost:{}", self.port) {
            self.public_base_url = format!("http://localhost:{}", port);
        }
        self.port = port;
        self
    }
}

fn parse_secs(value: Option<String>, name: &str) -> Result<Option<Duration>, String> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| format!("{} is not a number of seconds: {}", name, v))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.storage, StorageKind::Local);
        assert_eq!(config.public_base_url, "http://localhost:3000");
        assert_eq!(config.upload_url_ttl, Duration::from_secs(300));
        assert_eq!(config.review_list_limit, 100);
        assert!(!config.signing_secret.is_empty());
        assert!(config.webhook_url.is_none());
        assert!(config.sheets.is_none());
    }

    #[test]
    fn test_s3_settings() {
        let config = Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "S3"),
            ("BUCKET", "inspections"),
            ("AWS_REGION", "sa-east-1"),
            ("PORT", "8080"),
            ("UPLOAD_URL_TTL_SECS", "600"),
        ]))
        .unwrap();
        assert_eq!(config.storage, StorageKind::S3);
        assert_eq!(config.s3_bucket.as_deref(), Some("inspections"));
        assert_eq!(config.aws_region, "sa-east-1");
        assert_eq!(config.public_base_url, "http://localhost:8080");
        assert_eq!(config.upload_url_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_sheets_requires_token() {
        assert!(Config::from_lookup(lookup(&[("SHEETS_ID", "abc")])).is_err());

        let config = Config::from_lookup(lookup(&[
            ("SHEETS_ID", "abc"),
            ("SHEETS_ACCESS_TOKEN", "token"),
        ]))
        .unwrap();
        assert_eq!(config.sheets.unwrap().range, DEFAULT_SHEETS_RANGE);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STORAGE_BACKEND", "gcs")])).is_err());
        assert!(Config::from_lookup(lookup(&[("READ_URL_TTL_SECS", "soon")])).is_err());
    }

    #[test]
    fn test_with_port_updates_derived_url() {
        let config = Config::default().with_port(4000);
        assert_eq!(config.public_base_url, "http://localhost:4000");
    }
}
