use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

/// Centralized application configuration.
/// Combines environment variables, CLI arguments, and an optional JSON
/// config file describing the backend set.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backends: Vec<BackendConfig>,
    pub primary: String,
}

/// One configured storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name used for primary selection, logs, and fan-out errors.
    pub name: String,
    pub kind: BackendKind,
    /// Root directory; required for `fs` backends.
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Fs,
    Memory,
}

/// On-disk shape of the JSON config file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    backends: Vec<BackendConfig>,
    primary: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Mirrored hierarchical file store over flat object backends")]
pub struct Args {
    /// Host to bind to (overrides MIRRORFS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MIRRORFS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to a JSON file listing backends (overrides MIRRORFS_CONFIG)
    #[arg(long)]
    pub config: Option<String>,

    /// Root directory for the default single-disk setup when no config
    /// file is given (overrides MIRRORFS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::build(args)
    }

    fn build(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("MIRRORFS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("MIRRORFS_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing MIRRORFS_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading MIRRORFS_PORT"),
        };
        let config_path = args.config.or_else(|| env::var("MIRRORFS_CONFIG").ok());
        let storage_dir = args
            .storage_dir
            .or_else(|| env::var("MIRRORFS_STORAGE_DIR").ok())
            .unwrap_or_else(|| "./data/objects".into());

        let (backends, primary) = match config_path {
            Some(path) => Self::load_backends(Path::new(&path))?,
            None => (
                vec![BackendConfig {
                    name: "disk".into(),
                    kind: BackendKind::Fs,
                    root: Some(storage_dir),
                }],
                "disk".to_string(),
            ),
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backends,
            primary,
        })
    }

    fn load_backends(path: &Path) -> Result<(Vec<BackendConfig>, String)> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if file.backends.is_empty() {
            anyhow::bail!("config file {} lists no backends", path.display());
        }
        let primary = match file.primary {
            Some(name) => name,
            None => file.backends[0].name.clone(),
        };
        Ok((file.backends, primary))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
