use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr};

const ENV_PREFIX: &str = "OBJECT_GATEWAY_";
const MAX_LIST_PAGE_SIZE: usize = 1000;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL that signed blob links point at.
    pub public_url: String,
    pub link_ttl_secs: i64,
    /// `None` means a random secret is generated at startup.
    pub signing_secret: Option<String>,
    pub list_page_size: usize,
    pub max_upload_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field("link_ttl_secs", &self.link_ttl_secs)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("list_page_size", &self.list_page_size)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Object storage gateway over a blob store and metadata index")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides OBJECT_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for signed links (overrides OBJECT_GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Default signed link lifetime in seconds (overrides OBJECT_GATEWAY_LINK_TTL_SECS)
    #[arg(long)]
    pub link_ttl_secs: Option<i64>,

    /// HMAC secret for signed links (overrides OBJECT_GATEWAY_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Keys per store listing page, 1..=1000 (overrides OBJECT_GATEWAY_LIST_PAGE_SIZE)
    #[arg(long)]
    pub list_page_size: Option<usize>,

    /// Upload body limit in bytes (overrides OBJECT_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Parse `OBJECT_GATEWAY_{name}` if set. Malformed values are errors.
fn parse_env<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    lookup(&key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values from `lookup`, then over defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let port = match args.port {
            Some(port) => port,
            None => parse_env(&lookup, "PORT")?.unwrap_or(3000),
        };
        let link_ttl_secs = match args.link_ttl_secs {
            Some(ttl) => ttl,
            None => parse_env(&lookup, "LINK_TTL_SECS")?.unwrap_or(3600),
        };
        if link_ttl_secs <= 0 {
            anyhow::bail!("link ttl must be positive, got {}", link_ttl_secs);
        }
        let list_page_size = match args.list_page_size {
            Some(size) => size,
            None => parse_env(&lookup, "LIST_PAGE_SIZE")?.unwrap_or(MAX_LIST_PAGE_SIZE),
        }
        .clamp(1, MAX_LIST_PAGE_SIZE);
        let max_upload_bytes = match args.max_upload_bytes {
            Some(limit) => limit,
            None => parse_env(&lookup, "MAX_UPLOAD_BYTES")?.unwrap_or(64 * 1024 * 1024),
        };

        let public_url = args
            .public_url
            .or_else(|| text("PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        Ok(Self {
            host: args
                .host
                .or_else(|| text("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage_dir: args
                .storage_dir
                .or_else(|| text("STORAGE_DIR"))
                .unwrap_or_else(|| "./data/blobs".into()),
            database_url: args
                .database_url
                .or_else(|| text("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/object_gateway.db".into()),
            public_url,
            link_ttl_secs,
            signing_secret: args
                .signing_secret
                .or_else(|| text("SIGNING_SECRET"))
                .filter(|secret| !secret.is_empty()),
            list_page_size,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
