use std::collections::HashMap;
use std::fmt;

use compat_jk::gob::normalize_name;
use compat_jk::jkl::{parse_level, Level, SpawnPoint};
use compat_jk::text::TextError;
use compat_jk::threedo::{parse_model, Model};
use engine_core::logging;
use engine_core::{ExtractConfig, Vfs, VfsError};
use glam::{Mat4, Vec3};

use crate::lighting::LightingContext;
use crate::materials::{ColormapBinding, Material, MaterialCache};
use crate::transform::{node_frames, placement_matrix};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
    pub normal: [f32; 3],
}

/// A world-space polygon; `material` indexes `Scene::materials`.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSurface {
    pub material: usize,
    pub vertices: Vec<RenderVertex>,
    pub translucent: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub opaque: Vec<RenderSurface>,
    pub models: Vec<RenderSurface>,
    pub sky: Vec<RenderSurface>,
    pub materials: Vec<Material>,
    pub spawn_points: Vec<SpawnPoint>,
}

impl Scene {
    pub fn surface_count(&self) -> usize {
        self.opaque.len() + self.models.len() + self.sky.len()
    }

    /// Every surface list, drawing order.
    pub fn surfaces(&self) -> impl Iterator<Item = &RenderSurface> {
        self.sky.iter().chain(&self.opaque).chain(&self.models)
    }

    /// Turns texel UVs into per-texture coordinates by dividing by each
    /// surface's material size.
    pub fn normalize_uvs(&mut self) {
        let materials = &self.materials;
        for surface in self
            .opaque
            .iter_mut()
            .chain(self.models.iter_mut())
            .chain(self.sky.iter_mut())
        {
            normalize_surface_uvs(surface, materials);
        }
    }
}

pub fn normalize_surface_uvs(surface: &mut RenderSurface, materials: &[Material]) {
    let Some(material) = materials.get(surface.material) else {
        return;
    };
    let (width, height) = (material.width.max(1) as f32, material.height.max(1) as f32);
    for vertex in &mut surface.vertices {
        vertex.uv = [vertex.uv[0] / width, vertex.uv[1] / height];
    }
}

#[derive(Debug)]
pub enum SceneError {
    Vfs(VfsError),
    Decode { name: String, error: TextError },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Vfs(err) => write!(f, "{}", err),
            SceneError::Decode { name, error } => write!(f, "{}: {}", name, error),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SceneError::Vfs(err) => Some(err),
            SceneError::Decode { error, .. } => Some(error),
        }
    }
}

impl From<VfsError> for SceneError {
    fn from(err: VfsError) -> Self {
        SceneError::Vfs(err)
    }
}

/// Reads and decodes a level file, then builds its scene.
pub fn load_level(vfs: &Vfs, config: &ExtractConfig, path: &str) -> Result<Scene, SceneError> {
    let text = vfs.read_to_string(path)?;
    let level = parse_level(&text).map_err(|error| SceneError::Decode {
        name: path.to_string(),
        error,
    })?;
    Ok(build_scene(&level, vfs, config))
}

pub(crate) fn load_model(vfs: &Vfs, config: &ExtractConfig, name: &str) -> Option<Model> {
    let path = config.model_path(name);
    let text = match vfs.read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            logging::warn(format!("model {} skipped: {}", path, err));
            return None;
        }
    };
    match parse_model(&text) {
        Ok(model) => Some(model),
        Err(err) => {
            logging::warn(format!("model {} skipped: {}", path, err));
            None
        }
    }
}

/// Builds world-space surfaces for a decoded level. Missing materials fall
/// back; models that cannot be read are skipped.
pub fn build_scene(level: &Level, vfs: &Vfs, config: &ExtractConfig) -> Scene {
    let binding = match level.colormaps.get(&0) {
        Some(name) => ColormapBinding::load(vfs, config, name),
        None => {
            logging::warn("level has no colormap; textures decode gray");
            ColormapBinding::none()
        }
    };
    let mut cache = MaterialCache::new();
    let mut scene = Scene {
        spawn_points: level.spawn_points.clone(),
        ..Scene::default()
    };

    for sector in level.sectors.values() {
        for (_, surface) in level.sector_surfaces(sector) {
            if !surface.is_renderable() {
                continue;
            }
            let name = surface
                .material
                .and_then(|material| level.materials.get(&material))
                .map(String::as_str)
                .unwrap_or(config.fallback_material.as_str());
            let material = cache.resolve(name, &binding, vfs, config);
            let normal = surface.normal.unwrap_or([0.0; 3]);
            let vertices = surface
                .vertices
                .iter()
                .map(|vertex| RenderVertex {
                    position: vertex.position,
                    uv: vertex.uv,
                    color: vertex
                        .color
                        .map(|channel| (channel + sector.extra_light).min(1.0)),
                    normal,
                })
                .collect();
            let render = RenderSurface {
                material,
                vertices,
                translucent: surface.is_translucent(),
            };
            if surface.is_sky() {
                scene.sky.push(render);
            } else {
                scene.opaque.push(render);
            }
        }
    }

    let mut models: HashMap<String, Option<Model>> = HashMap::new();
    for placement in &level.models {
        let model = models
            .entry(normalize_name(&placement.model))
            .or_insert_with(|| load_model(vfs, config, &placement.model));
        let Some(model) = model else {
            continue;
        };
        let sector = placement
            .sector
            .and_then(|sector| level.sectors.get(&sector));
        let lighting = LightingContext {
            ambient: sector.map_or(0.0, |sector| sector.ambient_light),
            extra: sector.map_or(0.0, |sector| sector.extra_light),
            lights: &level.lights,
            range_scale: config.light_range_scale,
        };
        let base = placement_matrix(placement.position, placement.rotation);
        emit_model(
            model,
            base,
            Some(&lighting),
            &mut cache,
            &binding,
            vfs,
            config,
            &mut scene.models,
        );
    }

    scene.materials = cache.into_materials();
    logging::info(format!(
        "scene built: {} opaque, {} model, {} sky surfaces, {} materials",
        scene.opaque.len(),
        scene.models.len(),
        scene.sky.len(),
        scene.materials.len()
    ));
    scene
}

/// Places every face of `model` under `base`. Without a lighting context the
/// file's vertex colors are kept.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_model(
    model: &Model,
    base: Mat4,
    lighting: Option<&LightingContext<'_>>,
    cache: &mut MaterialCache,
    binding: &ColormapBinding,
    vfs: &Vfs,
    config: &ExtractConfig,
    out: &mut Vec<RenderSurface>,
) {
    for frame in node_frames(model, base) {
        let Some(mesh) = model.mesh_of(model.node(frame.node)) else {
            continue;
        };
        for face in &mesh.faces {
            let name = face
                .material
                .and_then(|material| model.materials.get(&material))
                .map(String::as_str)
                .unwrap_or(config.fallback_material.as_str());
            let material = cache.resolve(name, binding, vfs, config);
            let vertices = face
                .vertices
                .iter()
                .map(|vertex| {
                    let position = frame
                        .mesh_transform
                        .transform_point3(Vec3::from(vertex.position));
                    let normal = frame
                        .mesh_transform
                        .transform_vector3(Vec3::from(vertex.normal));
                    let color = match lighting {
                        Some(lighting) => lighting.light_vertex(position, normal),
                        None => vertex.color,
                    };
                    RenderVertex {
                        position: position.to_array(),
                        uv: vertex.uv,
                        color,
                        normal: normal.to_array(),
                    }
                })
                .collect();
            out.push(RenderSurface {
                material,
                vertices,
                translucent: face.is_translucent(),
            });
        }
    }
}
