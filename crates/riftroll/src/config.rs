use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories_next::ProjectDirs;
use settings::RiftrollConfig;

pub const ENV_CONFIG_FILE: &str = "RIFTROLL_CONFIG";
pub const ENV_CONFIG_DIR: &str = "RIFTROLL_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Riftroll";
const APPLICATION: &str = "riftroll";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config PATH`.
    Flag(PathBuf),
    /// `$RIFTROLL_CONFIG`.
    Env(PathBuf),
    /// The per-user config directory; the file may not exist.
    UserDir(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Flag(path) | Self::Env(path) | Self::UserDir(path) => path,
        }
    }

    fn required(&self) -> bool {
        !matches!(self, Self::UserDir(_))
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RiftrollConfig,
    pub source: ConfigSource,
    /// False when defaults were used because the user file is absent.
    pub from_file: bool,
}

pub fn discover(explicit: Option<&Path>) -> Result<ConfigSource> {
    if let Some(path) = explicit {
        return Ok(ConfigSource::Flag(path.to_path_buf()));
    }
    if let Some(path) = env_override(ENV_CONFIG_FILE) {
        return Ok(ConfigSource::Env(path));
    }

    let config_dir = match env_override(ENV_CONFIG_DIR) {
        Some(dir) => dir,
        None => ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?
            .config_dir()
            .to_path_buf(),
    };
    Ok(ConfigSource::UserDir(config_dir.join(CONFIG_FILE_NAME)))
}

pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let source = discover(explicit)?;
    let path = source.path();

    if !path.exists() {
        if source.required() {
            bail!("configuration file {} does not exist", path.display());
        }
        tracing::debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(LoadedConfig {
            config: RiftrollConfig::default(),
            source,
            from_file: false,
        });
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    let config = RiftrollConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load configuration at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(LoadedConfig {
        config,
        source,
        from_file: true,
    })
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
