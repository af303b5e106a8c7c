//! Configuration loading and root folder resolution
//!
//! Every setting resolves with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MPBI_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is not fatal: a warning is logged and
//! the remaining tiers apply.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const ENV_CONFIG_FILE: &str = "MPBI_CONFIG";
pub const ENV_ROOT_FOLDER: &str = "MPBI_ROOT_FOLDER";
pub const ENV_DATABASE: &str = "MPBI_DATABASE";
pub const ENV_OUTPUT_DIR: &str = "MPBI_OUTPUT_DIR";
pub const ENV_BIND: &str = "MPBI_BIND";
pub const ENV_BATCH_SIZE: &str = "MPBI_BATCH_SIZE";
pub const ENV_TABLE_PREFIX: &str = "MPBI_TABLE_PREFIX";
pub const ENV_LOG_LEVEL: &str = "MPBI_LOG_LEVEL";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "mpbi.db";
/// Output folder name inside the root folder (mirrors `uploads/mepr/mpdf`)
pub const OUTPUT_DIR_NAME: &str = "mpdf";

// ========================================
// TOML file schema
// ========================================

/// Raw TOML configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub server: ServerSection,
    pub storage: StorageSection,
    pub generation: GenerationSection,
    pub renderer: RendererSection,
    pub auth: AuthSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Prefix of the MemberPress tables (`wp_` on a stock install)
    pub table_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub batch_size: Option<usize>,
    pub staleness_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RendererSection {
    pub kind: Option<RendererKind>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub max_past_ms: Option<i64>,
    pub max_future_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which invoice renderer the service wires in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Built-in one-page text PDF writer
    #[default]
    Builtin,
    /// Delegate to an external program
    Command,
}

impl FromStr for RendererKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "builtin" => Ok(RendererKind::Builtin),
            "command" => Ok(RendererKind::Command),
            other => Err(Error::Config(format!("Unknown renderer kind: {}", other))),
        }
    }
}

// ========================================
// Resolved configuration
// ========================================

/// Renderer settings after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    pub kind: RendererKind,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

/// Authenticity token window after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthWindow {
    pub max_past_ms: i64,
    pub max_future_ms: i64,
}

impl Default for AuthWindow {
    fn default() -> Self {
        Self {
            max_past_ms: 30_000,
            max_future_ms: 1_000,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub bind_addr: String,
    pub table_prefix: String,
    pub batch_size: usize,
    pub staleness_secs: u64,
    pub cleanup_interval_secs: u64,
    pub renderer: RendererConfig,
    pub auth: AuthWindow,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Configuration rooted at `root` with every other value at its default.
    ///
    /// Used by tests and embedders that bypass file/env resolution.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root_folder = root.into();
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            database_path: root_folder.join(DATABASE_FILE_NAME),
            output_dir: root_folder.join(OUTPUT_DIR_NAME),
            root_folder,
            bind_addr: defaults.bind_addr,
            table_prefix: defaults.table_prefix,
            batch_size: defaults.batch_size,
            staleness_secs: defaults.staleness_secs,
            cleanup_interval_secs: defaults.cleanup_interval_secs,
            renderer: RendererConfig {
                kind: RendererKind::Builtin,
                command: None,
                args: Vec::new(),
                timeout_secs: defaults.renderer_timeout_secs,
            },
            auth: AuthWindow::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Platform defaults used when nothing else supplies a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_addr: String,
    pub table_prefix: String,
    pub batch_size: usize,
    pub staleness_secs: u64,
    pub cleanup_interval_secs: u64,
    pub renderer_timeout_secs: u64,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_addr: "127.0.0.1:5740".to_string(),
            table_prefix: "wp_".to_string(),
            batch_size: 10,
            staleness_secs: 3600,
            cleanup_interval_secs: 3600,
            renderer_timeout_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line (all optional)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub batch_size: Option<usize>,
    pub log_level: Option<String>,
}

/// Resolves a [`ServiceConfig`] from CLI, environment, TOML and defaults
pub struct ConfigResolver {
    cli: CliOverrides,
    defaults: CompiledDefaults,
}

impl ConfigResolver {
    pub fn new(cli: CliOverrides) -> Self {
        Self {
            cli,
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    /// Resolve the configuration.
    ///
    /// Fails only on values that are present but unusable (e.g. a batch
    /// size of zero or an unparsable environment variable).
    pub fn resolve(&self) -> Result<ServiceConfig> {
        let toml = self.load_toml().unwrap_or_default();
        let cli = &self.cli;

        let root_folder = pick_path(
            cli.root_folder.clone(),
            ENV_ROOT_FOLDER,
            toml.root_folder.clone(),
            self.defaults.root_folder.clone(),
        );
        let database_path = pick_path(
            cli.database.clone(),
            ENV_DATABASE,
            toml.storage.database.clone(),
            root_folder.join(DATABASE_FILE_NAME),
        );
        let output_dir = pick_path(
            cli.output_dir.clone(),
            ENV_OUTPUT_DIR,
            toml.storage.output_dir.clone(),
            root_folder.join(OUTPUT_DIR_NAME),
        );
        let bind_addr = pick(
            cli.bind.clone(),
            ENV_BIND,
            toml.server.bind.clone(),
            self.defaults.bind_addr.clone(),
        )?;
        let table_prefix = pick(
            None,
            ENV_TABLE_PREFIX,
            toml.storage.table_prefix.clone(),
            self.defaults.table_prefix.clone(),
        )?;
        let batch_size = pick(
            cli.batch_size,
            ENV_BATCH_SIZE,
            toml.generation.batch_size,
            self.defaults.batch_size,
        )?;
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        let log_level = pick(
            cli.log_level.clone(),
            ENV_LOG_LEVEL,
            Some(toml.logging.level.clone()),
            self.defaults.log_level.clone(),
        )?;

        let renderer = RendererConfig {
            kind: toml.renderer.kind.unwrap_or_default(),
            command: toml.renderer.command.clone(),
            args: toml.renderer.args.clone().unwrap_or_default(),
            timeout_secs: toml
                .renderer
                .timeout_secs
                .unwrap_or(self.defaults.renderer_timeout_secs),
        };
        if renderer.kind == RendererKind::Command && renderer.command.is_none() {
            return Err(Error::Config(
                "renderer.kind = \"command\" requires renderer.command".to_string(),
            ));
        }

        let default_window = AuthWindow::default();
        Ok(ServiceConfig {
            root_folder,
            database_path,
            output_dir,
            bind_addr,
            table_prefix,
            batch_size,
            staleness_secs: toml
                .generation
                .staleness_secs
                .unwrap_or(self.defaults.staleness_secs),
            cleanup_interval_secs: toml
                .generation
                .cleanup_interval_secs
                .unwrap_or(self.defaults.cleanup_interval_secs),
            renderer,
            auth: AuthWindow {
                max_past_ms: toml.auth.max_past_ms.unwrap_or(default_window.max_past_ms),
                max_future_ms: toml
                    .auth
                    .max_future_ms
                    .unwrap_or(default_window.max_future_ms),
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    fn load_toml(&self) -> Option<TomlConfig> {
        let path = self
            .cli
            .config_file
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from))
            .or_else(find_config_file)?;

        match load_toml_file(&path) {
            Ok(config) => {
                debug!("Loaded configuration from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Parse a TOML configuration file
pub fn load_toml_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
}

fn pick<T>(cli: Option<T>, env_var: &str, toml: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    if let Ok(raw) = std::env::var(env_var) {
        return raw
            .parse::<T>()
            .map_err(|e| Error::Config(format!("{}={}: {}", env_var, raw, e)));
    }
    Ok(toml.unwrap_or(default))
}

fn pick_path(cli: Option<PathBuf>, env_var: &str, toml: Option<PathBuf>, default: PathBuf) -> PathBuf {
    cli.or_else(|| std::env::var(env_var).ok().map(PathBuf::from))
        .or(toml)
        .unwrap_or(default)
}

/// Locate the default configuration file for the platform
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mpbi").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/mpbi/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mpbi"))
        .unwrap_or_else(|| PathBuf::from("./mpbi_data"))
}

/// Creates the service folders on first run
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder (and parents) if missing. Idempotent.
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
