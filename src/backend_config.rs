use log::{debug, error, info, warn};
use std::fs;
use std::io::ErrorKind;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    frame_loop::EmptyListSendMode,
    systems::{assembly::PayloadEncoding, smoothing::SmoothSettings},
    tracking::DEFAULT_DEPTH_CLAMP,
};

/// Which positions the orientation chain is computed from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OrientationSource {
    #[default]
    Raw,
    Filtered,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    // -------- SMOOTHING SETTINGS
    /// Weight of the historical trend over fresh samples, in [0,1]; 0 disables
    /// the filter so raw positions are published unchanged
    pub smoothing: f32,

    /// How aggressively the trend follows the filtered position
    pub correction: f32,

    /// Frames of trend to extrapolate, to counteract lag
    pub prediction: f32,

    /// Raw movement (m) below this radius is treated as noise
    pub jitter_radius: f32,

    /// Raw jumps (m) beyond this radius snap straight to the raw sample
    pub max_deviation_radius: f32,

    // -------- FRAME SETTINGS
    /// Depth (m) substituted for any joint reported behind the sensor
    pub depth_clamp: f32,

    pub orientation_source: OrientationSource,

    /// How skeleton messages are encoded on the wire
    pub payload_encoding: PayloadEncoding,

    /// How to treat frames with no tracked bodies - either send an empty
    /// frame "once", "never" or "always"
    pub empty_frame_send_mode: EmptyListSendMode,

    /// Whether frame processing starts enabled; off by default, so that a
    /// `setEnabled` message (or the CLI) has to switch it on
    pub enable_on_start: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let smooth = SmoothSettings::default();
        BackendConfig {
            smoothing: smooth.smoothing,
            correction: smooth.correction,
            prediction: smooth.prediction,
            jitter_radius: smooth.jitter_radius,
            max_deviation_radius: smooth.max_deviation_radius,
            depth_clamp: DEFAULT_DEPTH_CLAMP,
            orientation_source: OrientationSource::Raw,
            payload_encoding: PayloadEncoding::Json,
            empty_frame_send_mode: EmptyListSendMode::Once,
            enable_on_start: false,
        }
    }
}

impl BackendConfig {
    pub fn smooth_settings(&self) -> SmoothSettings {
        SmoothSettings {
            smoothing: self.smoothing,
            correction: self.correction,
            prediction: self.prediction,
            jitter_radius: self.jitter_radius,
            max_deviation_radius: self.max_deviation_radius,
        }
        .sanitised()
    }

    /// Apply one scalar to smoothing, correction and prediction alike.
    pub fn set_uniform_smoothing(&mut self, value: f32) {
        self.smoothing = value;
        self.correction = value;
        self.prediction = value;
    }

    pub fn parse_remote_config(&mut self, payload: &[u8]) -> Result<()> {
        match rmp_serde::from_slice::<BackendConfig>(payload) {
            Ok(config) => {
                *self = config;
                Ok(())
            }
            Err(e) => Err(anyhow!("Failed to parse Config from message: {}", e)),
        }
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        debug!("Current state of config: {:?}", self);
        let text = serde_json::to_string_pretty(self)?;
        match fs::write(config_file_path, text) {
            Ok(()) => {
                info!("Wrote config to file: {:?}", config_file_path);
                Ok(())
            }
            Err(e) => {
                error!("Error writing config to file: {:?}", e);
                Err(anyhow!("Failed to write config to {}: {}", config_file_path, e))
            }
        }
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<BackendConfig> {
    match std::fs::read_to_string(config_file_path) {
        Err(e) => {
            if e.kind() == ErrorKind::NotFound {
                warn!(
                    "Skeleton Config file not found, will use defaults (saved to {} on first change)",
                    &config_file_path
                );
                Ok(BackendConfig::default())
            } else {
                Err(anyhow!(
                    "Failed to load Skeleton Config from disk; error: {:?}",
                    e
                ))
            }
        }
        Ok(s) => {
            info!("Loaded Skeleton config OK from \"{}\"", config_file_path);
            match serde_json::from_str::<BackendConfig>(&s) {
                Ok(loaded_config) => {
                    debug!("Config parsed data from file: {:?}", &loaded_config);
                    Ok(loaded_config)
                }
                Err(e) => Err(anyhow!("Failed to parse config data: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("skeleton-config-{}-{}.json", name, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config_from_file(&temp_path("missing")).unwrap();
        assert_eq!(config, BackendConfig::default());
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("roundtrip");
        let mut config = BackendConfig::default();
        config.set_uniform_smoothing(0.25);
        config.payload_encoding = PayloadEncoding::MessagePack;
        config.write_config_to_file(&path).unwrap();

        let loaded = load_config_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = temp_path("partial");
        fs::write(&path, r#"{ "smoothing": 0.0, "payloadEncoding": "messagePack" }"#).unwrap();
        let loaded = load_config_from_file(&path).unwrap();
        assert_eq!(loaded.smoothing, 0.);
        assert_eq!(loaded.payload_encoding, PayloadEncoding::MessagePack);
        assert_eq!(loaded.jitter_radius, BackendConfig::default().jitter_radius);
        assert!(loaded.smooth_settings().is_passthrough());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn remote_config_replaces_current() {
        let mut remote = BackendConfig::default();
        remote.set_uniform_smoothing(0.7);
        remote.enable_on_start = true;
        let payload = rmp_serde::to_vec_named(&remote).unwrap();

        let mut config = BackendConfig::default();
        config.parse_remote_config(&payload).unwrap();
        assert_eq!(config, remote);
        assert!(config.parse_remote_config(&[0xc1]).is_err());
    }
}
