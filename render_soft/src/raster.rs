use std::collections::HashMap;
use std::fmt;

use engine_core::RenderSettings;
use glam::{Mat4, Vec2, Vec4};
use level_cook::{Material, RenderSurface};

use crate::camera::{projection_matrix, Camera};
use crate::clip::{clip_polygon, fan_triangles, is_back_facing, ClipVertex, ProjectedVertex};
use crate::depth_buffer::DepthBuffer;
use crate::mip::MipChain;
use crate::preview::PreviewImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A surface names a material slot the list does not have.
    MissingMaterial { index: usize, materials: usize },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingMaterial { index, materials } => write!(
                f,
                "surface references material {} of {}",
                index, materials
            ),
        }
    }
}

impl std::error::Error for RenderError {}

/// Screen-space corner: pixel position, NDC depth, 1/w and UV/w.
#[derive(Clone, Copy, Debug)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
    uv_over_w: Vec2,
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Depth-tested, textured triangle renderer writing into an RGB framebuffer.
pub struct Rasterizer {
    width: usize,
    height: usize,
    view_projection: Mat4,
    color: Vec<u8>,
    depth_buffer: DepthBuffer,
    mip_chains: HashMap<usize, MipChain>,
}

impl Rasterizer {
    pub fn new(settings: &RenderSettings, camera: &Camera) -> Self {
        let width = settings.width.max(1) as usize;
        let height = settings.height.max(1) as usize;
        Self {
            width,
            height,
            view_projection: projection_matrix(settings) * camera.view_matrix(),
            color: vec![0; width * height * 3],
            depth_buffer: DepthBuffer::new(width, height),
            mip_chains: HashMap::new(),
        }
    }

    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    /// Draws each surface as a fan of triangles. UVs are expected in
    /// per-texture units (see `Scene::normalize_uvs`).
    pub fn draw_surface(
        &mut self,
        surface: &RenderSurface,
        materials: &[Material],
    ) -> Result<(), RenderError> {
        let material = materials
            .get(surface.material)
            .ok_or(RenderError::MissingMaterial {
                index: surface.material,
                materials: materials.len(),
            })?;
        let chain = self
            .mip_chains
            .remove(&surface.material)
            .unwrap_or_else(|| MipChain::new(material));

        let transformed: Vec<ClipVertex> = surface
            .vertices
            .iter()
            .map(|vertex| ClipVertex {
                position: self.view_projection
                    * Vec4::new(vertex.position[0], vertex.position[1], vertex.position[2], 1.0),
                uv: Vec2::from(vertex.uv),
            })
            .collect();

        for [a, b, c] in fan_triangles(transformed.len()) {
            self.draw_triangle(&[transformed[a], transformed[b], transformed[c]], &chain);
        }
        self.mip_chains.insert(surface.material, chain);
        Ok(())
    }

    fn draw_triangle(&mut self, triangle: &[ClipVertex; 3], chain: &MipChain) {
        let clipped = clip_polygon(triangle);
        if clipped.len() < 3 {
            return;
        }
        let projected: Vec<ProjectedVertex> = clipped.iter().map(ProjectedVertex::from_clip).collect();
        if is_back_facing(&projected) {
            return;
        }
        for i in 2..projected.len() {
            let a = self.to_screen(&projected[0]);
            let b = self.to_screen(&projected[i - 1]);
            let c = self.to_screen(&projected[i]);
            self.fill_triangle(&a, &b, &c, chain);
        }
    }

    fn to_screen(&self, vertex: &ProjectedVertex) -> ScreenVertex {
        let half_width = self.width as f32 * 0.5;
        let half_height = self.height as f32 * 0.5;
        ScreenVertex {
            x: vertex.ndc.x * half_width + half_width,
            y: -vertex.ndc.y * half_height + half_height,
            z: vertex.ndc.z,
            inv_w: vertex.inv_w,
            uv_over_w: vertex.uv_over_w,
        }
    }

    /// Walks the bounding box in 2x2 blocks so each pixel has neighbors to
    /// take UV derivatives from.
    fn fill_triangle(
        &mut self,
        a: &ScreenVertex,
        b: &ScreenVertex,
        c: &ScreenVertex,
        chain: &MipChain,
    ) {
        let area = edge(a, b, c.x, c.y);
        if area.is_nan() || area <= 0.0 {
            return;
        }
        let inv_area = 1.0 / area;

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as i64;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as i64;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(self.width as i64);
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(self.height as i64);

        let mut py = min_y;
        while py < max_y {
            let mut px = min_x;
            while px < max_x {
                self.fill_block(px, py, a, b, c, inv_area, chain);
                px += 2;
            }
            py += 2;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_block(
        &mut self,
        px: i64,
        py: i64,
        a: &ScreenVertex,
        b: &ScreenVertex,
        c: &ScreenVertex,
        inv_area: f32,
        chain: &MipChain,
    ) {
        let pixels = [(px, py), (px + 1, py), (px, py + 1), (px + 1, py + 1)];
        let mut bary = [[0.0f32; 3]; 4];
        let mut depth = [0.0f32; 4];
        let mut visible = [false; 4];
        for (i, &(x, y)) in pixels.iter().enumerate() {
            let (fx, fy) = (x as f32, y as f32);
            let weights = [
                edge(b, c, fx, fy) * inv_area,
                edge(c, a, fx, fy) * inv_area,
                edge(a, b, fx, fy) * inv_area,
            ];
            bary[i] = weights;
            depth[i] = a.z * weights[0] + b.z * weights[1] + c.z * weights[2];
            let inside = weights.iter().all(|&weight| weight >= 0.0);
            let on_image = x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height;
            visible[i] = inside
                && on_image
                && self.depth_buffer.passes(x as usize, y as usize, depth[i]);
        }
        if !visible.iter().any(|&v| v) {
            return;
        }

        let uv = bary.map(|weights| {
            let inv_w = a.inv_w * weights[0] + b.inv_w * weights[1] + c.inv_w * weights[2];
            let uv_over_w =
                a.uv_over_w * weights[0] + b.uv_over_w * weights[1] + c.uv_over_w * weights[2];
            uv_over_w / inv_w
        });
        let dx = uv[1] - uv[0];
        let dy = uv[2] - uv[0];

        for (i, &(x, y)) in pixels.iter().enumerate() {
            if !visible[i] {
                continue;
            }
            let (x, y) = (x as usize, y as usize);
            self.depth_buffer.set(x, y, depth[i]);
            let rgb = chain.sample(uv[i], dx, dy);
            let index = (y * self.width + x) * 3;
            self.color[index..index + 3].copy_from_slice(&rgb);
        }
    }

    pub fn into_image(self) -> PreviewImage {
        PreviewImage {
            width: self.width as u32,
            height: self.height as u32,
            rgb: self.color,
        }
    }
}

/// Renders `surfaces` in order from `camera` into a fresh image.
pub fn render<'a>(
    surfaces: impl IntoIterator<Item = &'a RenderSurface>,
    materials: &[Material],
    camera: &Camera,
    settings: &RenderSettings,
) -> Result<PreviewImage, RenderError> {
    let mut rasterizer = Rasterizer::new(settings, camera);
    for surface in surfaces {
        rasterizer.draw_surface(surface, materials)?;
    }
    Ok(rasterizer.into_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use level_cook::{MaterialSource, RenderVertex};

    fn settings() -> RenderSettings {
        RenderSettings {
            width: 64,
            height: 48,
            ..RenderSettings::default()
        }
    }

    fn material(color: [u8; 4]) -> Material {
        Material {
            name: "flat.mat".to_string(),
            width: 2,
            height: 2,
            frames: vec![color.repeat(4)],
            average_color: [color[0], color[1], color[2]],
            source: MaterialSource::Archive,
        }
    }

    fn vertex(x: f32, y: f32, z: f32) -> RenderVertex {
        RenderVertex {
            position: [x, y, z],
            uv: [x, z],
            color: [1.0; 3],
            normal: [0.0, -1.0, 0.0],
        }
    }

    /// A wall `distance` ahead of a yaw-0 camera at the origin, wound to face
    /// the camera.
    fn wall(distance: f32, material: usize) -> RenderSurface {
        RenderSurface {
            material,
            vertices: vec![
                vertex(-1.0, distance, -1.0),
                vertex(1.0, distance, -1.0),
                vertex(1.0, distance, 1.0),
                vertex(-1.0, distance, 1.0),
            ],
            translucent: false,
        }
    }

    /// A pixel inside both test walls and off their diagonal.
    fn center(image: &PreviewImage) -> [u8; 3] {
        image.pixel(30, 22)
    }

    #[test]
    fn wall_in_front_fills_the_center() {
        let camera = Camera::new([0.0; 3], [0.0; 3]);
        let image = render(&[wall(2.0, 0)], &[material([200, 10, 10, 255])], &camera, &settings())
            .expect("render");
        assert_eq!(center(&image), [200, 10, 10]);
        assert_eq!(image.pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn reversed_winding_is_culled() {
        let camera = Camera::new([0.0; 3], [0.0; 3]);
        let mut surface = wall(2.0, 0);
        surface.vertices.reverse();
        let image = render(&[surface], &[material([200, 10, 10, 255])], &camera, &settings())
            .expect("render");
        assert!(image.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn nearer_surface_wins_regardless_of_order() {
        let camera = Camera::new([0.0; 3], [0.0; 3]);
        let materials = [material([200, 0, 0, 255]), material([0, 0, 200, 255])];
        let near_last = [wall(4.0, 0), wall(2.0, 1)];
        let near_first = [wall(2.0, 1), wall(4.0, 0)];
        for surfaces in [&near_last, &near_first] {
            let image = render(surfaces.iter(), &materials, &camera, &settings()).expect("render");
            assert_eq!(center(&image), [0, 0, 200]);
        }
    }

    #[test]
    fn surfaces_behind_the_camera_are_clipped() {
        let camera = Camera::new([0.0; 3], [0.0, 180.0, 0.0]);
        let image = render(&[wall(2.0, 0)], &[material([200, 10, 10, 255])], &camera, &settings())
            .expect("render");
        assert!(image.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn depth_buffer_records_nearest_fragment() {
        let camera = Camera::new([0.0; 3], [0.0; 3]);
        let materials = [material([1, 2, 3, 255])];
        let mut rasterizer = Rasterizer::new(&settings(), &camera);
        rasterizer.draw_surface(&wall(2.0, 0), &materials).expect("draw");
        let depth = rasterizer.depth_buffer().get(30, 22);
        assert!(depth > 0.0 && depth < 1.0);
        assert_eq!(rasterizer.depth_buffer().get(0, 0), 1.0);
    }

    #[test]
    fn unknown_material_is_an_error() {
        let camera = Camera::new([0.0; 3], [0.0; 3]);
        let err = render(&[wall(2.0, 3)], &[material([0; 4])], &camera, &settings())
            .expect_err("bad index");
        assert_eq!(err, RenderError::MissingMaterial { index: 3, materials: 1 });
    }
}
