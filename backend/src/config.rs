use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;
use url::Url;

const DEFAULT_PROPERTIES_PATH: &str = "/app/config/app.properties";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("DATABASE_URL is not a valid URL: {0}")]
    DatabaseUrl(#[from] url::ParseError),
}

/// Settings read once at startup from the environment and the optional
/// mounted properties file.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub environment: String,
    pub log_level: String,
    pub log_format: String,
    pub timezone: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub database: DatabaseConfig,
    pub features: Features,
    pub properties_path: PathBuf,
    pub app_properties: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    /// When `url_override` is set, host/port/name/user/password are the
    /// values parsed out of it.
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub url_override: Option<String>,
    pub pool_size: u32,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub seed_sample_data: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Features {
    pub comments: bool,
    pub user_registration: bool,
    pub require_author: bool,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        if let Some(url) = &self.url_override {
            return url.clone();
        }
        format!(
            "mysql://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.name
        )
    }

    /// `host:port/name`, safe to log.
    pub fn location(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }

    /// Replaces the connection parts with the ones in `raw`, using what the
    /// MySQL client assumes for anything the URL leaves out.
    fn apply_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        let url = Url::parse(raw)?;
        let decode = |part: &str| {
            urlencoding::decode(part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| part.to_string())
        };
        self.host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost")
            .to_string();
        self.port = url.port().unwrap_or(3306);
        self.name = decode(url.path().trim_start_matches('/'));
        self.user = decode(url.username());
        self.password = decode(url.password().unwrap_or_default());
        Ok(())
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("url_override", &self.url_override.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("connect_timeout", &self.connect_timeout)
            .field("seed_sample_data", &self.seed_sample_data)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Merges in the mounted properties file, if any.
    pub fn with_app_properties(mut self) -> Self {
        self.app_properties = load_properties(&self.properties_path);
        self
    }

    /// Builds the config from an arbitrary variable source. Does not touch
    /// the properties file.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host: IpAddr = parse_or(&var, "API_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = match var("API_PORT") {
            Some(_) => parse_or(&var, "API_PORT", 3000)?,
            None => parse_or(&var, "PORT", 3000)?,
        };

        let cors_allow = var("CORS_ORIGIN")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let timeout_ms: u64 = parse_or(&var, "REQUEST_TIMEOUT_MS", 30_000)?;
        let max_retries: u32 = parse_or(&var, "DB_CONNECT_MAX_RETRIES", 0)?;
        let retry_delay_secs: u64 = parse_or(&var, "DB_CONNECT_RETRY_DELAY_SECS", 5)?;
        let connect_timeout_secs: u64 = parse_or(&var, "DB_CONNECT_TIMEOUT_SECS", 5)?;

        let mut database = DatabaseConfig {
            host: var("DB_HOST").unwrap_or_else(|| "localhost".into()),
            port: parse_or(&var, "DB_PORT", 3306)?,
            name: var("DB_NAME").unwrap_or_else(|| "simple_blog".into()),
            user: var("DB_USERNAME")
                .or_else(|| var("DB_USER"))
                .unwrap_or_else(|| "root".into()),
            password: lookup("DB_PASSWORD").unwrap_or_else(|| "secret".into()),
            url_override: var("DATABASE_URL"),
            pool_size: parse_or(&var, "DB_POOL_SIZE", 5)?,
            max_retries: (max_retries > 0).then_some(max_retries),
            retry_delay: Duration::from_secs(retry_delay_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            seed_sample_data: var("DB_SEED_SAMPLE_DATA").map_or(true, |v| is_truthy(&v)),
        };
        if let Some(raw) = database.url_override.clone() {
            database.apply_url(&raw)?;
        }

        let features = Features {
            comments: var("FEATURE_COMMENTS").is_some_and(|v| is_truthy(&v)),
            user_registration: var("FEATURE_USER_REGISTRATION").is_some_and(|v| is_truthy(&v)),
            require_author: var("FEATURE_REQUIRE_AUTHOR").is_some_and(|v| is_truthy(&v)),
        };

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "text".into()),
            timezone: var("TIMEZONE").unwrap_or_else(|| "UTC".into()),
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            database,
            features,
            properties_path: var("APP_PROPERTIES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROPERTIES_PATH)),
            app_properties: BTreeMap::new(),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    ["true", "1", "yes"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
}

/// Reads the mounted properties file. Missing file means no properties.
pub fn load_properties(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let properties = parse_properties(&content);
            tracing::info!(path = %path.display(), entries = properties.len(), "Loaded app properties");
            properties
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read app properties file");
            BTreeMap::new()
        }
    }
}

pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
