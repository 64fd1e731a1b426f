//! Panel configuration
//!
//! Stored as YAML, resolved once at startup.
//! Default location: ~/.config/rackpad/config.yaml
//!
//! ```yaml
//! listen_port: 6100
//! poll_divisor: 1
//! poll_sleep_us: 1000
//! menu_timeout_ms: 2000
//! encoder_map: [0, 2, 3, 1]
//! ```

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN_PORT: u16 = 6100;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// UDP port for remote commands
    pub listen_port: u16,
    /// Poll the active mode and the device every N ticks
    pub poll_divisor: u32,
    /// Sleep after each tick, 0 to run flat out
    pub poll_sleep_us: u64,
    /// Menus fall back to the parameter view after this much inactivity
    pub menu_timeout_ms: u64,
    /// Physical encoder id → parameter slot on the page
    pub encoder_map: Vec<usize>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            poll_divisor: 1,
            poll_sleep_us: 1000,
            menu_timeout_ms: 2000,
            // Encoders are laid out top-left, bottom-left, top-right,
            // bottom-right while the parameter grid is row-major
            encoder_map: vec![0, 2, 3, 1],
        }
    }
}

impl PanelConfig {
    pub fn poll_sleep(&self) -> Duration {
        Duration::from_micros(self.poll_sleep_us)
    }

    pub fn menu_timeout(&self) -> Duration {
        Duration::from_millis(self.menu_timeout_ms)
    }

    /// Parameter slot for a physical encoder, `None` if unmapped
    pub fn map_encoder(&self, encoder: usize) -> Option<usize> {
        self.encoder_map.get(encoder).copied()
    }

    /// Check the config against a device with `num_encoders` encoders
    pub fn validate(&self, num_encoders: usize) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.poll_divisor == 0 {
            errors.push(ConfigError::ZeroPollDivisor);
        }

        if self.encoder_map.len() != num_encoders {
            errors.push(ConfigError::EncoderMapLength {
                expected: num_encoders,
                actual: self.encoder_map.len(),
            });
        }
        let mut seen = vec![false; num_encoders];
        for &entry in &self.encoder_map {
            match seen.get_mut(entry) {
                None => errors.push(ConfigError::EncoderMapOutOfRange {
                    entry,
                    max: num_encoders.saturating_sub(1),
                }),
                Some(true) => errors.push(ConfigError::EncoderMapDuplicate(entry)),
                Some(slot) => *slot = true,
            }
        }
        errors
    }

    /// Validated copy with every problem logged and replaced by a safe value
    ///
    /// A zero divisor becomes 1; an invalid encoder map becomes the identity.
    pub fn validated(mut self, num_encoders: usize) -> Self {
        let errors = self.validate(num_encoders);
        for e in &errors {
            log::warn!("PanelConfig: {}", e);
        }
        if errors.contains(&ConfigError::ZeroPollDivisor) {
            self.poll_divisor = 1;
        }
        if errors.iter().any(|e| *e != ConfigError::ZeroPollDivisor) {
            log::warn!("PanelConfig: using identity encoder map");
            self.encoder_map = (0..num_encoders).collect();
        }
        self
    }
}

/// Where the host looks for the panel config when `--config` is not given
///
/// `<config_dir>/rackpad/config.yaml`, falling back to the home directory
/// and then the working directory on systems without a config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rackpad")
        .join("config.yaml")
}

/// Read panel preferences from YAML
///
/// Preferences never stop the panel from starting: a missing file, an
/// unreadable one or one that fails to parse each yields `T::default()`.
/// Fields absent from the file take their defaults through
/// `#[serde(default)]`.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[Config] No preferences at {:?}, using defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("[Config] Cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("[Config] Preferences loaded from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[Config] Invalid preferences in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write panel preferences as YAML, creating the directory if needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create preferences directory {:?}", dir))?;
    }
    let yaml = serde_yaml::to_string(config).context("Cannot encode panel preferences")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Cannot write panel preferences to {:?}", path))?;
    log::debug!("[Config] Preferences saved to {:?}", path);
    Ok(())
}
