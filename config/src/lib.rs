//! Basis Configuration
//!
//! Shared configuration crate for the tracker and its tooling.
//!
//! Handles loading configuration from:
//! 1. BASIS_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.basis/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<BasisConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".basis";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./basis-db";
const DEFAULT_ANCHOR_INTERVAL_SECS: u64 = 600;
const DEFAULT_CHAIN_DIR: &str = "./chain";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MAX_BLOCKS_PER_SYNC: u64 = 100;
const DEFAULT_EMERGENCY_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;
const DEFAULT_MIN_TOP_UP: u64 = 1;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasisConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub verifier: VerifierSection,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Tracker identity and anchoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// File holding the tracker secret key as hex. Generated if missing.
    #[serde(default)]
    pub keypair_path: Option<String>,
    /// Tracker identity marker (hex, 32 bytes). Derived from the key if unset.
    #[serde(default)]
    pub tracker_id: Option<String>,
    #[serde(default = "default_anchor_interval")]
    pub anchor_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            keypair_path: None,
            tracker_id: None,
            anchor_interval_secs: DEFAULT_ANCHOR_INTERVAL_SECS,
        }
    }
}

fn default_anchor_interval() -> u64 {
    DEFAULT_ANCHOR_INTERVAL_SECS
}

/// Settlement-layer ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Directory of `<height>.json` settled blocks
    #[serde(default = "default_chain_dir")]
    pub chain_dir: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_blocks")]
    pub max_blocks_per_sync: u64,
    /// First height to ingest on an empty database
    #[serde(default)]
    pub start_height: u64,
    /// Script hash identifying reserve records (hex)
    #[serde(default)]
    pub reserve_script_hash: String,
    /// Token id identifying debt-note records (hex)
    #[serde(default)]
    pub note_token_id: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            chain_dir: DEFAULT_CHAIN_DIR.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_blocks_per_sync: DEFAULT_MAX_BLOCKS_PER_SYNC,
            start_height: 0,
            reserve_script_hash: String::new(),
            note_token_id: String::new(),
        }
    }
}

fn default_chain_dir() -> String {
    DEFAULT_CHAIN_DIR.into()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_blocks() -> u64 {
    DEFAULT_MAX_BLOCKS_PER_SYNC
}

/// Redemption rule parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierSection {
    #[serde(default = "default_emergency_window")]
    pub emergency_window_ms: u64,
    #[serde(default = "default_min_top_up")]
    pub min_top_up: u64,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            emergency_window_ms: DEFAULT_EMERGENCY_WINDOW_MS,
            min_top_up: DEFAULT_MIN_TOP_UP,
        }
    }
}

fn default_emergency_window() -> u64 {
    DEFAULT_EMERGENCY_WINDOW_MS
}

fn default_min_top_up() -> u64 {
    DEFAULT_MIN_TOP_UP
}

// ============================================================================
// Env Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl BasisConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check BASIS_CONFIG env var
        if let Ok(path) = env::var("BASIS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("BASIS_CONFIG points to missing file: {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.basis/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Database
        env_string("BASIS_DB_PATH", &mut self.database.path);

        // Tracker
        env_option_string("BASIS_TRACKER_KEYPAIR", &mut self.tracker.keypair_path);
        env_option_string("BASIS_TRACKER_ID", &mut self.tracker.tracker_id);
        env_parse(
            "BASIS_ANCHOR_INTERVAL_SECS",
            &mut self.tracker.anchor_interval_secs,
        );

        // Reconciler
        env_string("BASIS_CHAIN_DIR", &mut self.reconciler.chain_dir);
        env_parse("BASIS_POLL_INTERVAL_MS", &mut self.reconciler.poll_interval_ms);
        env_parse("BASIS_START_HEIGHT", &mut self.reconciler.start_height);
        env_string(
            "BASIS_RESERVE_SCRIPT_HASH",
            &mut self.reconciler.reserve_script_hash,
        );
        env_string("BASIS_NOTE_TOKEN_ID", &mut self.reconciler.note_token_id);

        // Verifier
        env_parse(
            "BASIS_EMERGENCY_WINDOW_MS",
            &mut self.verifier.emergency_window_ms,
        );
        env_parse("BASIS_MIN_TOP_UP", &mut self.verifier.min_top_up);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.tracker.keypair_path = Some("./tracker.key".into());
        sample.reconciler.reserve_script_hash = "00".repeat(32);
        sample.reconciler.note_token_id = "00".repeat(32);
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static BasisConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
