use crate::global;
use crate::transcription::Profile;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcriber: TranscriberConfig,
    pub cleanup: CleanupConfig,
    pub durable: DurableConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a single uploaded file, in bytes.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that relative paths below resolve against.
    /// Defaults to the platform data directory.
    pub base_dir: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub processing_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Transcription executable, either a bare name looked up on PATH or a path.
    pub executable: String,
    /// Profiles run for every job, in order. Empty means one default profile.
    pub profiles: Vec<Profile>,
    /// Write an excerpt summary next to the transcripts.
    pub summarize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub execute_at_hour: u32,
    pub execute_at_minute: u32,
    pub retention_days: u32,
    pub run_on_startup: bool,
    /// Wait after a failed sweep iteration before scheduling again.
    pub error_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    /// Redis connection URL. Empty keeps job records in memory only.
    pub url: String,
    pub key_prefix: String,
    /// Record lifetime; falls back to `cleanup.retention_days`.
    pub expiration_days: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3838,
            max_upload_bytes: 200_000_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            upload_dir: PathBuf::from("uploads"),
            processing_dir: PathBuf::from("processing"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            executable: "buzz".to_string(),
            profiles: Vec::new(),
            summarize: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            execute_at_hour: 12,
            execute_at_minute: 0,
            retention_days: 14,
            run_on_startup: false,
            error_backoff_secs: 3600,
        }
    }
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key_prefix: "transcription:".to_string(),
            expiration_days: None,
        }
    }
}

impl DurableConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// The three pipeline directories, resolved to absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDirs {
    pub upload: PathBuf,
    pub processing: PathBuf,
    pub output: PathBuf,
}

impl ManagedDirs {
    pub fn all(&self) -> [&Path; 3] {
        [&self.upload, &self.processing, &self.output]
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in self.all() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn resolve(&self) -> Result<ManagedDirs> {
        let base = match &self.base_dir {
            Some(dir) => global::absolute(dir)?,
            None => global::data_dir()?,
        };
        Ok(self.resolve_against(&base))
    }

    pub fn resolve_against(&self, base: &Path) -> ManagedDirs {
        let join = |dir: &PathBuf| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                base.join(dir)
            }
        };
        ManagedDirs {
            upload: join(&self.upload_dir),
            processing: join(&self.processing_dir),
            output: join(&self.output_dir),
        }
    }
}

impl Config {
    /// Loads the config from `path`, or the default location when `None`.
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => global::config_file()?,
        };

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save(&config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cleanup.execute_at_hour > 23 {
            bail!(
                "cleanup.execute_at_hour must be 0-23, got {}",
                self.cleanup.execute_at_hour
            );
        }
        if self.cleanup.execute_at_minute > 59 {
            bail!(
                "cleanup.execute_at_minute must be 0-59, got {}",
                self.cleanup.execute_at_minute
            );
        }
        if self.cleanup.retention_days == 0 {
            bail!("cleanup.retention_days must be at least 1");
        }
        if self.transcriber.executable.trim().is_empty() {
            bail!("transcriber.executable must not be empty");
        }

        let mut seen = HashSet::new();
        for profile in &self.transcriber.profiles {
            let id = profile.identifier();
            if !seen.insert(id.clone()) {
                bail!(
                    "Duplicate transcriber profile '{}': outputs would overwrite each other",
                    id
                );
            }
        }

        Ok(())
    }

    pub fn durable_expiration_days(&self) -> u32 {
        self.durable
            .expiration_days
            .unwrap_or(self.cleanup.retention_days)
    }
}
