//! Software preview renderer: clips, projects and rasterizes scene surfaces
//! with mip-mapped texture sampling.

#![forbid(unsafe_code)]

pub mod camera;
pub mod clip;
mod depth_buffer;
pub mod mip;
pub mod preview;
pub mod raster;

pub use camera::{projection_matrix, Camera};
pub use depth_buffer::DepthBuffer;
pub use mip::{MipChain, MipLevel};
pub use preview::PreviewImage;
pub use raster::{render, Rasterizer, RenderError};

use engine_core::RenderSettings;
use level_cook::Scene;

/// Draws a whole scene (sky, then level surfaces, then models) from its
/// first spawn point, or the origin when it has none.
pub fn render_scene(scene: &Scene, settings: &RenderSettings) -> Result<PreviewImage, RenderError> {
    let camera = scene
        .spawn_points
        .first()
        .map(Camera::from_spawn)
        .unwrap_or_else(|| Camera::new([0.0; 3], [0.0; 3]));
    render(scene.surfaces(), &scene.materials, &camera, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compat_jk::jkl::SpawnPoint;
    use level_cook::{Material, MaterialSource, RenderSurface, RenderVertex};

    fn checker() -> Material {
        let mut rgba = Vec::new();
        for texel in 0..16u8 {
            let value = if texel % 2 == 0 { 240 } else { 40 };
            rgba.extend_from_slice(&[value, value, value, 255]);
        }
        Material {
            name: "checker.mat".to_string(),
            width: 4,
            height: 4,
            frames: vec![rgba],
            average_color: [140; 3],
            source: MaterialSource::Archive,
        }
    }

    #[test]
    fn scene_renders_from_its_spawn_point() {
        let corner = |x: f32, z: f32| RenderVertex {
            position: [x, 10.0, z],
            uv: [x * 4.0, z * 4.0],
            color: [1.0; 3],
            normal: [0.0, -1.0, 0.0],
        };
        let mut scene = Scene {
            opaque: vec![RenderSurface {
                material: 0,
                vertices: vec![corner(-2.0, -2.0), corner(2.0, -2.0), corner(2.0, 2.0), corner(-2.0, 2.0)],
                translucent: false,
            }],
            materials: vec![checker()],
            spawn_points: vec![SpawnPoint {
                position: [0.0, 0.0, 0.0],
                rotation: [0.0, 0.0, 0.0],
            }],
            ..Scene::default()
        };
        scene.normalize_uvs();
        let settings = RenderSettings {
            width: 80,
            height: 60,
            ..RenderSettings::default()
        };
        let image = render_scene(&scene, &settings).expect("render");
        assert_eq!((image.width, image.height), (80, 60));
        let lit = image.rgb.chunks_exact(3).filter(|p| p[0] != 0).count();
        assert!(lit > 0);
        assert_eq!(image.pixel(0, 0), [0, 0, 0]);
        assert!(image.encode_png().is_ok());

        // turned around, nothing is in view
        scene.spawn_points[0].rotation[1] = 180.0;
        let image = render_scene(&scene, &settings).expect("render");
        assert!(image.rgb.iter().all(|&v| v == 0));
    }
}
