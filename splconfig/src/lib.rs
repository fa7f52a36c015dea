//! # SpectroLink Configuration Module
//!
//! This module provides configuration management for SpectroLink:
//! - Loading configuration from YAML files
//! - Built-in defaults for every field (the reference protocol constants)
//! - Environment variable overrides
//!
//! The configuration carries everything the core consumes: listen
//! address/port, block length N, sample rate R, the synthetic source's
//! frequency and amplitude, and an optional WAV file for looped playback.
//!
//! ## Usage
//!
//! ```no_run
//! use splconfig::Config;
//!
//! let config = Config::load_default()?;
//! println!("listening on {}:{}", config.listen.address, config.listen.port);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Variable d'environnement pointant vers le fichier de configuration.
const ENV_CONFIG_FILE: &str = "SPECTROLINK_CONFIG";
/// Préfixe des surcharges par variable d'environnement.
const ENV_PREFIX: &str = "SPECTROLINK__";

const DEFAULT_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 65432;
const DEFAULT_BLOCK_LEN: usize = 2048;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;
const DEFAULT_SINE_FREQUENCY: f64 = 440.0;
const DEFAULT_SINE_AMPLITUDE: f64 = 15_000.0;

/// Point d'écoute du générateur.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

/// Paramètres de l'oscillateur sinusoïdal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SineConfig {
    /// Fréquence en Hz.
    #[serde(default = "default_sine_frequency")]
    pub frequency: f64,
    /// Amplitude crête, en unités d'échantillon i16.
    #[serde(default = "default_sine_amplitude")]
    pub amplitude: f64,
}

impl Default for SineConfig {
    fn default() -> Self {
        Self {
            frequency: default_sine_frequency(),
            amplitude: default_sine_amplitude(),
        }
    }
}

/// SpectroLink configuration.
///
/// Every field has a default matching the reference constants, so an absent
/// or empty file yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    /// Nombre d'échantillons par bloc (N), constant pour toute connexion.
    #[serde(default = "default_block_len")]
    pub block_len: usize,
    /// Taux d'échantillonnage de la source synthétique, en Hz. Un fichier
    /// WAV chargé impose le sien.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub sine: SineConfig,
    /// Fichier WAV à jouer en boucle à la place de l'oscillateur.
    #[serde(default)]
    pub wav_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            block_len: default_block_len(),
            sample_rate: default_sample_rate(),
            sine: SineConfig::default(),
            wav_path: None,
        }
    }
}

impl Config {
    /// Loads a YAML configuration file, then applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {:?}", path))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid configuration in {:?}", path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        info!("configuration loaded from {:?}", path);
        Ok(config)
    }

    /// Loads the file named by `SPECTROLINK_CONFIG`, or falls back to the
    /// built-in defaults when the variable is unset.
    pub fn load_default() -> Result<Self> {
        match env::var(ENV_CONFIG_FILE) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => {
                let mut config = Config::default();
                config.apply_env_overrides()?;
                config.validate()?;
                info!("no configuration file, using built-in defaults");
                Ok(config)
            }
        }
    }

    /// Adresse d'écoute complète.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen.address, self.listen.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid listen address {}:{}",
                    self.listen.address, self.listen.port
                )
            })
    }

    /// Rejette les valeurs avec lesquelles le cœur ne peut pas fonctionner.
    fn validate(&self) -> Result<()> {
        ensure!(self.block_len > 0, "block_len must be greater than zero");
        ensure!(
            self.sample_rate > 0,
            "sample_rate must be greater than zero"
        );
        Ok(())
    }

    /// Surcharges `SPECTROLINK__ADDRESS`, `SPECTROLINK__PORT` et
    /// `SPECTROLINK__BLOCK_LEN`.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(address) = env::var(format!("{ENV_PREFIX}ADDRESS")) {
            self.listen.address = address;
        }
        if let Ok(port) = env::var(format!("{ENV_PREFIX}PORT")) {
            self.listen.port = port
                .parse()
                .with_context(|| format!("invalid {}PORT value: {}", ENV_PREFIX, port))?;
        }
        if let Ok(block_len) = env::var(format!("{ENV_PREFIX}BLOCK_LEN")) {
            self.block_len = block_len
                .parse()
                .with_context(|| format!("invalid {}BLOCK_LEN value: {}", ENV_PREFIX, block_len))?;
        }
        Ok(())
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_block_len() -> usize {
    DEFAULT_BLOCK_LEN
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_sine_frequency() -> f64 {
    DEFAULT_SINE_FREQUENCY
}

fn default_sine_amplitude() -> f64 {
    DEFAULT_SINE_AMPLITUDE
}
