use std::path::PathBuf;

use serde::Deserialize;

/// Extraction settings. Every field has a default, so an empty TOML document
/// is a valid configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractConfig {
    /// Base-game archives mounted beneath the level archives.
    pub official_archives: Vec<PathBuf>,
    pub material_prefixes: Vec<String>,
    pub colormap_prefix: String,
    pub model_prefix: String,
    pub level_prefix: String,
    pub fallback_material: String,
    pub fallback_color: [u8; 4],
    pub light_range_scale: f32,
    pub render: RenderSettings,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            official_archives: vec![
                PathBuf::from("Res1hi.gob"),
                PathBuf::from("Res2.gob"),
                PathBuf::from("JKMRES.GOO"),
            ],
            material_prefixes: vec!["mat".to_string(), "3do/mat".to_string()],
            colormap_prefix: "misc/cmp".to_string(),
            model_prefix: "3do".to_string(),
            level_prefix: "jkl".to_string(),
            fallback_material: "dflt.mat".to_string(),
            fallback_color: [255, 0, 255, 255],
            light_range_scale: 2.5,
            render: RenderSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fov_deg: 70.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ExtractConfig {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    /// `<prefix>/<name>` for each prefix, in order.
    pub fn material_paths(&self, name: &str) -> Vec<String> {
        self.material_prefixes
            .iter()
            .map(|prefix| join_prefix(prefix, name))
            .collect()
    }

    pub fn colormap_path(&self, name: &str) -> String {
        join_prefix(&self.colormap_prefix, name)
    }

    pub fn model_path(&self, name: &str) -> String {
        join_prefix(&self.model_prefix, name)
    }

    pub fn level_path(&self, name: &str) -> String {
        join_prefix(&self.level_prefix, name)
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();
        if self.material_prefixes.is_empty() {
            validation
                .errors
                .push("material_prefixes must not be empty".to_string());
        }
        if self.fallback_material.trim().is_empty() {
            validation
                .warnings
                .push("fallback_material is empty; missing materials use fallback_color".to_string());
        }
        if self.official_archives.is_empty() {
            validation
                .warnings
                .push("no official archives configured".to_string());
        }
        if !self.light_range_scale.is_finite() || self.light_range_scale <= 0.0 {
            validation
                .errors
                .push("light_range_scale must be finite and > 0".to_string());
        }

        let render = &self.render;
        if render.width == 0 || render.height == 0 {
            validation
                .errors
                .push("render width and height must be > 0".to_string());
        }
        if !render.fov_deg.is_finite() || render.fov_deg <= 0.0 || render.fov_deg >= 180.0 {
            validation
                .errors
                .push("render fov_deg must be in (0, 180)".to_string());
        }
        if !render.near.is_finite() || render.near <= 0.0 {
            validation
                .errors
                .push("render near must be finite and > 0".to_string());
        }
        if !render.far.is_finite() || render.far <= render.near {
            validation
                .errors
                .push("render far must be finite and > near".to_string());
        }
        validation
    }
}

fn join_prefix(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
