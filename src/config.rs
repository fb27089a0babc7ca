use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub public_dir: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Guestbook media upload service")]
pub struct Args {
    /// Host to bind to (overrides GUESTBOOK_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GUESTBOOK_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory the object store roots its buckets under
    /// (overrides GUESTBOOK_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides GUESTBOOK_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name holding uploaded media (overrides GUESTBOOK_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory holding the static admin page
    /// (overrides GUESTBOOK_PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("GUESTBOOK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("GUESTBOOK_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing GUESTBOOK_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading GUESTBOOK_PORT"),
        };
        let env_storage =
            env::var("GUESTBOOK_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("GUESTBOOK_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/guestbook.db".into());
        let env_bucket = env::var("GUESTBOOK_BUCKET").unwrap_or_else(|_| "guestbook".into());
        let env_public = env::var("GUESTBOOK_PUBLIC_DIR").unwrap_or_else(|_| "./public".into());

        // Credentials come from the environment only; they never appear on
        // a command line or in logs.
        let admin_user = env::var("GUESTBOOK_ADMIN_USER").unwrap_or_else(|_| "admin".into());
        let admin_pass = env::var("GUESTBOOK_ADMIN_PASS").unwrap_or_else(|_| "password".into());

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            admin_user,
            admin_pass,
            public_dir: args.public_dir.unwrap_or(env_public),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("bucket", &self.bucket)
            .field("admin_user", &self.admin_user)
            .field("admin_pass", &"<redacted>")
            .field("public_dir", &self.public_dir)
            .finish()
    }
}
