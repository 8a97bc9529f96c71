// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TOML configuration, loaded from the first of: `./dsp-server.toml`,
//! `$XDG_CONFIG_HOME/dsp-rs/dsp-server.toml`, `/etc/dsp-rs/dsp-server.toml`.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    let table: toml::Table =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };
    let section_toml =
        toml::to_string(section).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

/// Mirrors `trx_app::config::ConfigFile`: search CWD -> XDG config dir ->
/// `/etc`, optionally pulling a named section out of a combined file.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn config_filename() -> &'static str;

    fn combined_key() -> Option<&'static str> {
        None
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if let Some(key) = Self::combined_key() {
            if let Ok(Some(cfg)) = load_section_from_file::<Self>(path, key) {
                return Ok(cfg);
            }
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::config_filename())];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("dsp-rs").join(Self::config_filename()));
        }
        paths.push(PathBuf::from("/etc/dsp-rs").join(Self::config_filename()));
        paths
    }

    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::default_search_paths() {
            if path.exists() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSection {
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            listen: IpAddr::from([127, 0, 0, 1]),
            port: 8073,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DspSection {
    /// Sample rate produced by the SDR source, in Hz.
    pub source_sample_rate: u32,
    /// Default audio output rate, in Hz.
    pub output_rate: u32,
    /// Default HD audio output rate, for demodulators with `HdAudio`.
    pub hd_output_rate: u32,
    /// Demodulator built for a client that hasn't picked a mode yet.
    pub default_mode: String,
    pub fft_size: usize,
    pub fft_overlap: f32,
    pub fft_fps: f32,
}

impl Default for DspSection {
    fn default() -> Self {
        Self {
            source_sample_rate: 2_400_000,
            output_rate: 12_000,
            hd_output_rate: 48_000,
            default_mode: "nfm".to_string(),
            fft_size: 2048,
            fft_overlap: 0.3,
            fft_fps: 9.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralSection,
    pub listen: ListenSection,
    pub dsp: DspSection,
}

impl ServerConfig {
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.dsp.source_sample_rate == 0 {
            return Err("dsp.source_sample_rate must be nonzero".to_string());
        }
        if self.dsp.output_rate == 0 {
            return Err("dsp.output_rate must be nonzero".to_string());
        }
        if self.dsp.hd_output_rate < self.dsp.output_rate {
            return Err("dsp.hd_output_rate must be >= dsp.output_rate".to_string());
        }
        Ok(())
    }
}

impl ConfigFile for ServerConfig {
    fn config_filename() -> &'static str {
        "dsp-server.toml"
    }

    fn combined_key() -> Option<&'static str> {
        Some("dsp-server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn hd_output_rate_below_output_rate_rejected() {
        let mut cfg = ServerConfig::default();
        cfg.dsp.hd_output_rate = cfg.dsp.output_rate - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_toml_round_trips() {
        let text = ServerConfig::example_toml();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.dsp.output_rate, ServerConfig::default().dsp.output_rate);
    }
}
