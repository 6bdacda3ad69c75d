use std::collections::HashMap;

use compat_jk::cmp::{parse_colormap, ColorMap};
use compat_jk::gob::normalize_name;
use compat_jk::mat::{parse_mat, MatTexture};
use engine_core::logging;
use engine_core::{ExtractConfig, Vfs};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialSource {
    /// Decoded from the archive entry the material was asked for.
    Archive,
    /// The configured fallback material stood in.
    FallbackMaterial,
    /// Nothing decodable was found; a 1x1 of the fallback color.
    FallbackColor,
}

/// A decoded material, RGBA8 frames top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Vec<u8>>,
    /// Mean RGB of the first frame's non-transparent pixels.
    pub average_color: [u8; 3],
    pub source: MaterialSource,
}

impl Material {
    pub fn from_texture(name: &str, texture: MatTexture, source: MaterialSource) -> Self {
        let width = texture.width();
        let height = texture.height();
        let frames: Vec<Vec<u8>> = texture
            .frames
            .into_iter()
            .filter(|frame| frame.width == width && frame.height == height)
            .map(|frame| frame.rgba)
            .collect();
        let average_color = average_color(&frames[0]);
        Self {
            name: name.to_string(),
            width,
            height,
            frames,
            average_color,
            source,
        }
    }

    pub fn flat(name: &str, color: [u8; 4]) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            frames: vec![color.to_vec()],
            average_color: [color[0], color[1], color[2]],
            source: MaterialSource::FallbackColor,
        }
    }

    pub fn rgba(&self) -> &[u8] {
        &self.frames[0]
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let pixel = &self.frames[0][index..index + 4];
        [pixel[0], pixel[1], pixel[2], pixel[3]]
    }
}

fn average_color(rgba: &[u8]) -> [u8; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for pixel in rgba.chunks_exact(4).filter(|pixel| pixel[3] != 0) {
        for channel in 0..3 {
            sum[channel] += u64::from(pixel[channel]);
        }
        count += 1;
    }
    if count == 0 {
        return [0, 0, 0];
    }
    sum.map(|total| ((total + count / 2) / count) as u8)
}

/// The colormap every material decode of one build goes through. Its name
/// is part of the cache key.
#[derive(Clone, Debug, Default)]
pub struct ColormapBinding {
    pub name: Option<String>,
    pub colormap: Option<ColorMap>,
}

impl ColormapBinding {
    pub fn none() -> Self {
        Self::default()
    }

    /// Loads `<colormap_prefix>/<name>`; a missing or malformed colormap
    /// leaves the binding without a palette so indexed textures decode gray.
    pub fn load(vfs: &Vfs, config: &ExtractConfig, name: &str) -> Self {
        let path = config.colormap_path(name);
        let colormap = match vfs.read(&path) {
            Ok(data) => match parse_colormap(&data) {
                Ok(colormap) => Some(colormap),
                Err(err) => {
                    logging::warn(format!("colormap {} unreadable: {}", path, err));
                    None
                }
            },
            Err(err) => {
                logging::warn(format!("colormap {} unavailable: {}", path, err));
                None
            }
        };
        Self {
            name: Some(normalize_name(name)),
            colormap,
        }
    }
}

/// One slot per (material name, colormap) pair, in first-request order.
#[derive(Debug, Default)]
pub struct MaterialCache {
    slots: HashMap<(String, Option<String>), usize>,
    materials: Vec<Material>,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn into_materials(self) -> Vec<Material> {
        self.materials
    }

    /// Slot index for `name` decoded through `binding`, decoding on first
    /// request. Missing or broken materials resolve to the fallback.
    pub fn resolve(
        &mut self,
        name: &str,
        binding: &ColormapBinding,
        vfs: &Vfs,
        config: &ExtractConfig,
    ) -> usize {
        let key = (normalize_name(name), binding.name.clone());
        if let Some(&slot) = self.slots.get(&key) {
            return slot;
        }

        let material = match decode_material(name, binding, vfs, config) {
            Some(texture) => Material::from_texture(name, texture, MaterialSource::Archive),
            None => fallback_material(name, binding, vfs, config),
        };
        let slot = self.materials.len();
        self.materials.push(material);
        self.slots.insert(key, slot);
        slot
    }
}

fn decode_material(
    name: &str,
    binding: &ColormapBinding,
    vfs: &Vfs,
    config: &ExtractConfig,
) -> Option<MatTexture> {
    for path in config.material_paths(name) {
        let Ok(data) = vfs.read(&path) else {
            continue;
        };
        match parse_mat(&data, binding.colormap.as_ref()) {
            Ok(texture) => return Some(texture),
            Err(err) => {
                logging::warn(format!("material {} unreadable: {}", path, err));
                return None;
            }
        }
    }
    None
}

fn fallback_material(
    name: &str,
    binding: &ColormapBinding,
    vfs: &Vfs,
    config: &ExtractConfig,
) -> Material {
    let fallback = config.fallback_material.as_str();
    if !fallback.is_empty() && !fallback.eq_ignore_ascii_case(name) {
        if let Some(texture) = decode_material(fallback, binding, vfs, config) {
            logging::debug(format!("material {} missing; using {}", name, fallback));
            return Material::from_texture(name, texture, MaterialSource::FallbackMaterial);
        }
    }
    logging::debug(format!("material {} missing; using fallback color", name));
    Material::flat(name, config.fallback_color)
}
