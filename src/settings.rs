use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Lighting path the default pipeline and lighting-stage injection follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Forward,
    Deferred,
}

impl Default for RenderMode {
    fn default() -> Self {
        RenderMode::Forward
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default)]
    pub shadow_mapping: bool,
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            mode: RenderMode::default(),
            shadow_mapping: false,
            shadow_map_size: Self::default_shadow_map_size(),
            sample_count: Self::default_sample_count(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.sample_count == 0 {
            warn!("Sample count must be greater than zero. Using 1 instead.");
            self.sample_count = 1;
        }

        if !matches!(self.sample_count, 1 | 2 | 4 | 8) {
            warn!(
                "Sample count {} is not a power of two up to 8. Using 4 instead.",
                self.sample_count
            );
            self.sample_count = 4;
        }

        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self
    }

    pub fn is_deferred(&self) -> bool {
        self.mode == RenderMode::Deferred
    }

    const fn default_sample_count() -> u32 {
        4
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = RenderSettings {
            sample_count: 0,
            shadow_map_size: 0,
            resolution: Resolution {
                width: 0,
                height: 600,
            },
            ..RenderSettings::default()
        }
        .validate();

        assert_eq!(validated.sample_count, 1);
        assert_eq!(
            validated.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
        assert_eq!(validated.resolution, Resolution::default());
    }

    #[test]
    fn validate_rounds_unsupported_sample_counts() {
        let validated = RenderSettings {
            sample_count: 3,
            ..RenderSettings::default()
        }
        .validate();
        assert_eq!(validated.sample_count, 4);
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "mode": "deferred", "shadow_mapping": true }"#)
                .expect("settings json");
        assert!(settings.is_deferred());
        assert!(settings.shadow_mapping);
        assert_eq!(settings.resolution, Resolution::default());
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("definitely/not/here/settings.json");
        assert_eq!(settings.mode, RenderMode::Forward);
        assert!(!settings.shadow_mapping);
    }
}
