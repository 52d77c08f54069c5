//! Line-based key/value configuration shared by the crawler and the server.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default Postgres port when `db_port` is absent or malformed.
const DEFAULT_DB_PORT: u16 = 5432;
/// Default maximum crawl depth (the seed page is depth 0).
const DEFAULT_CRAWL_DEPTH: u32 = 2;
/// Default query server port.
const DEFAULT_SERVER_PORT: u16 = 8080;
/// Default crawl worker count.
const DEFAULT_CRAWL_THREADS: usize = 4;
/// Default HTTP timeout in whole seconds.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Default User-Agent presented to crawled sites.
const DEFAULT_USER_AGENT: &str = "SearchEngine-Spider/1.0";

/// Errors raised while loading or validating the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read at all.
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A required key is absent.
    MissingKey {
        /// The key that must be present.
        key: &'static str,
        /// Path of the file that lacks it.
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config file {}: {source}", path.display())
            }
            Self::MissingKey { key, path } => {
                write!(f, "missing required key '{key}' in {}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::MissingKey { .. } => None,
        }
    }
}

/// Parsed configuration map with typed accessors.
///
/// The format is deliberately small: `#` and `;` start comment lines, every
/// other non-empty line is `key = value` with both sides trimmed. Later
/// occurrences of a key overwrite earlier ones.
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, String>,
    path: PathBuf,
}

impl Config {
    /// Reads and parses the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let mut values = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(Self { values, path })
    }

    /// Path the configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            key,
            path: self.path.clone(),
        })
    }

    /// Catalog host. Required.
    pub fn db_host(&self) -> Result<&str, ConfigError> {
        self.require("db_host")
    }

    /// Catalog port, defaulting to the standard Postgres port.
    pub fn db_port(&self) -> u16 {
        self.get("db_port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DB_PORT)
    }

    /// Catalog database name. Required.
    pub fn db_name(&self) -> Result<&str, ConfigError> {
        self.require("db_name")
    }

    /// Catalog user. Required.
    pub fn db_user(&self) -> Result<&str, ConfigError> {
        self.require("db_user")
    }

    /// Catalog password. Required.
    pub fn db_password(&self) -> Result<&str, ConfigError> {
        self.require("db_password")
    }

    /// Seed URL for the crawl. Required by the crawler binary only.
    pub fn start_url(&self) -> Result<&str, ConfigError> {
        self.require("start_url")
    }

    /// Maximum crawl depth; the seed is depth 0.
    pub fn crawl_depth(&self) -> u32 {
        self.get("crawl_depth")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CRAWL_DEPTH)
    }

    /// TCP port the query server listens on.
    pub fn server_port(&self) -> u16 {
        self.get("server_port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Number of crawl worker tasks.
    pub fn crawl_threads(&self) -> usize {
        self.get("crawl_threads")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CRAWL_THREADS)
    }

    /// User-Agent header sent with every fetch.
    pub fn user_agent(&self) -> &str {
        self.get("user_agent").unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Per-request HTTP timeout in seconds.
    pub fn http_timeout(&self) -> u64 {
        self.get("http_timeout")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
    }

    /// Whether TLS certificates are verified during fetches. Defaults to on.
    pub fn tls_verify(&self) -> bool {
        self.get("tls_verify")
            .and_then(|v| v.parse().ok())
            .unwrap_or(true)
    }

    #[cfg(test)]
    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            path: PathBuf::from("test.ini"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "webindex-config-{}-{}.ini",
            std::process::id(),
            contents.len()
        ));
        let mut file = fs::File::create(&path).expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        path
    }

    #[test]
    fn parses_keys_and_skips_comments() {
        let path = write_temp(
            "# leading comment\n\
             ; alternative comment\n\
             db_host = localhost\n\
             \n\
             db_port=5433\n\
             start_url =  http://example.com  \n",
        );
        let config = Config::load(&path).expect("load");
        assert_eq!(config.db_host().unwrap(), "localhost");
        assert_eq!(config.db_port(), 5433);
        assert_eq!(config.start_url().unwrap(), "http://example.com");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn later_keys_overwrite_earlier_ones() {
        let path = write_temp("crawl_depth = 1\ncrawl_depth = 3\n");
        let config = Config::load(&path).expect("load");
        assert_eq!(config.crawl_depth(), 3);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load("/definitely/not/here.ini").expect_err("must fail");
        assert!(err.to_string().contains("/definitely/not/here.ini"));
    }

    #[test]
    fn missing_required_key_names_key_and_path() {
        let config = Config::from_pairs(&[("db_host", "h")]);
        let err = config.db_name().expect_err("db_name absent");
        assert!(err.to_string().contains("db_name"));
        assert!(err.to_string().contains("test.ini"));
    }

    #[test]
    fn defaults_apply_when_absent_or_malformed() {
        let config = Config::from_pairs(&[("db_port", "not-a-number")]);
        assert_eq!(config.db_port(), 5432);
        assert_eq!(config.crawl_depth(), 2);
        assert_eq!(config.server_port(), 8080);
        assert_eq!(config.crawl_threads(), 4);
        assert_eq!(config.http_timeout(), 30);
        assert_eq!(config.user_agent(), "SearchEngine-Spider/1.0");
        assert!(config.tls_verify());
    }

    #[test]
    fn tls_verify_can_be_disabled() {
        let config = Config::from_pairs(&[("tls_verify", "false")]);
        assert!(!config.tls_verify());
    }
}
