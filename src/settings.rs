use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::math::hashing::combine_hash;
use crate::scene::MaterialQuality;

/// Serializable mirror of [`MaterialQuality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialQualitySetting {
    Low,
    Medium,
    #[default]
    High,
}

impl MaterialQualitySetting {
    pub fn to_quality(self) -> MaterialQuality {
        match self {
            MaterialQualitySetting::Low => MaterialQuality::Low,
            MaterialQualitySetting::Medium => MaterialQuality::Medium,
            MaterialQualitySetting::High => MaterialQuality::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawableProcessorSettings {
    #[serde(default)]
    pub material_quality: MaterialQualitySetting,
    #[serde(default = "DrawableProcessorSettings::default_max_vertex_lights")]
    pub max_vertex_lights: u32,
    #[serde(default = "DrawableProcessorSettings::default_max_pixel_lights")]
    pub max_pixel_lights: u32,
}

impl Default for DrawableProcessorSettings {
    fn default() -> Self {
        Self {
            material_quality: MaterialQualitySetting::default(),
            max_vertex_lights: Self::default_max_vertex_lights(),
            max_pixel_lights: Self::default_max_pixel_lights(),
        }
    }
}

impl DrawableProcessorSettings {
    pub fn pipeline_state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.material_quality as u32);
        combine_hash(&mut hash, self.max_vertex_lights);
        combine_hash(&mut hash, self.max_pixel_lights);
        hash
    }

    const fn default_max_vertex_lights() -> u32 {
        4
    }

    const fn default_max_pixel_lights() -> u32 {
        4
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowMapSettings {
    #[serde(default = "ShadowMapSettings::default_enable_shadows")]
    pub enable_shadows: bool,
    /// Size of one shadow atlas page, in texels.
    #[serde(default = "ShadowMapSettings::default_page_size")]
    pub page_size: u32,
    /// Size of one shadow split; point lights use half of it per cube face.
    #[serde(default = "ShadowMapSettings::default_split_size")]
    pub split_size: u32,
    /// Use 16-bit depth for shadow maps.
    #[serde(default)]
    pub low_precision: bool,
}

impl Default for ShadowMapSettings {
    fn default() -> Self {
        Self {
            enable_shadows: Self::default_enable_shadows(),
            page_size: Self::default_page_size(),
            split_size: Self::default_split_size(),
            low_precision: false,
        }
    }
}

impl ShadowMapSettings {
    pub fn format(&self) -> wgpu::TextureFormat {
        if self.low_precision {
            wgpu::TextureFormat::Depth16Unorm
        } else {
            wgpu::TextureFormat::Depth32Float
        }
    }

    pub fn split_size_for_point_light(&self) -> u32 {
        (self.split_size / 2).max(1)
    }

    pub fn pipeline_state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.enable_shadows as u32);
        combine_hash(&mut hash, self.low_precision as u32);
        hash
    }

    const fn default_enable_shadows() -> bool {
        true
    }

    const fn default_page_size() -> u32 {
        2048
    }

    const fn default_split_size() -> u32 {
        512
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneProcessorSettings {
    #[serde(default)]
    pub drawable: DrawableProcessorSettings,
    #[serde(default)]
    pub shadow: ShadowMapSettings,
    #[serde(default = "SceneProcessorSettings::default_sample_count")]
    pub sample_count: u32,
}

impl Default for SceneProcessorSettings {
    fn default() -> Self {
        Self {
            drawable: DrawableProcessorSettings::default(),
            shadow: ShadowMapSettings::default(),
            sample_count: Self::default_sample_count(),
        }
    }
}

impl SceneProcessorSettings {
    const fn default_sample_count() -> u32 {
        1
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SceneProcessorSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded scene processor settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default settings.",
                        path, err
                    );
                    SceneProcessorSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Settings file {:?} not found. Using default settings.", path);
                SceneProcessorSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default settings.",
                    path, err
                );
                SceneProcessorSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.sample_count == 0 {
            warn!("Sample count must be greater than zero. Using 1 instead.");
            self.sample_count = Self::default_sample_count();
        }

        if self.shadow.page_size == 0 {
            warn!("Shadow page size must be greater than zero. Using default value.");
            self.shadow.page_size = ShadowMapSettings::default_page_size();
        }

        if self.shadow.split_size == 0 {
            warn!("Shadow split size must be greater than zero. Using default value.");
            self.shadow.split_size = ShadowMapSettings::default_split_size();
        }

        if self.shadow.split_size > self.shadow.page_size {
            warn!(
                "Shadow split size {} exceeds page size {}. Clamping.",
                self.shadow.split_size, self.shadow.page_size
            );
            self.shadow.split_size = self.shadow.page_size;
        }

        if self.drawable.max_pixel_lights == 0 {
            warn!("At least one pixel light is required. Using 1 instead.");
            self.drawable.max_pixel_lights = 1;
        }

        self
    }

    /// Fingerprint of every setting that affects cached pipeline states.
    /// A change invalidates all batch state caches.
    pub fn pipeline_state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.drawable.pipeline_state_hash());
        combine_hash(&mut hash, self.shadow.pipeline_state_hash());
        combine_hash(&mut hash, self.sample_count);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> SceneProcessorSettings {
        SceneProcessorSettings {
            drawable: DrawableProcessorSettings {
                max_pixel_lights: 0,
                ..DrawableProcessorSettings::default()
            },
            shadow: ShadowMapSettings {
                page_size: 0,
                split_size: 0,
                ..ShadowMapSettings::default()
            },
            sample_count: 0,
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();

        assert_eq!(validated.sample_count, 1);
        assert_eq!(validated.shadow.page_size, 2048);
        assert_eq!(validated.shadow.split_size, 512);
        assert_eq!(validated.drawable.max_pixel_lights, 1);
    }

    #[test]
    fn validate_clamps_split_size_to_page_size() {
        let settings = SceneProcessorSettings {
            shadow: ShadowMapSettings {
                page_size: 256,
                split_size: 1024,
                ..ShadowMapSettings::default()
            },
            ..SceneProcessorSettings::default()
        };

        assert_eq!(settings.validate().shadow.split_size, 256);
    }

    #[test]
    fn pipeline_state_hash_tracks_relevant_settings() {
        let base = SceneProcessorSettings::default();
        let mut changed = base.clone();
        changed.shadow.low_precision = true;
        assert_ne!(base.pipeline_state_hash(), changed.pipeline_state_hash());

        // Page size does not affect pipeline states, only atlas layout.
        let mut resized = base.clone();
        resized.shadow.page_size = 4096;
        assert_eq!(base.pipeline_state_hash(), resized.pipeline_state_hash());
    }

    #[test]
    fn settings_round_trip_through_json() {
        let json = r#"{ "shadow": { "split_size": 256 }, "sample_count": 4 }"#;
        let settings: SceneProcessorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.shadow.split_size, 256);
        assert_eq!(settings.sample_count, 4);
        assert_eq!(settings.drawable.max_pixel_lights, 4);
    }
}
