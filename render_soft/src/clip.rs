use glam::{Vec2, Vec3, Vec4};

/// Homogeneous half-spaces `plane · position >= 0`: left, right, top,
/// bottom, near (z >= 0), far (z <= w).
pub const CLIP_PLANES: [Vec4; 6] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(-1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, -1.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 1.0),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipVertex {
    pub position: Vec4,
    pub uv: Vec2,
}

impl ClipVertex {
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }
}

/// After the perspective divide. `ndc.z` is depth, attributes are
/// pre-multiplied by `inv_w`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedVertex {
    pub ndc: Vec3,
    pub inv_w: f32,
    pub uv_over_w: Vec2,
}

impl ProjectedVertex {
    pub fn from_clip(vertex: &ClipVertex) -> Self {
        let inv_w = 1.0 / vertex.position.w;
        Self {
            ndc: vertex.position.truncate() * inv_w,
            inv_w,
            uv_over_w: vertex.uv * inv_w,
        }
    }
}

/// One Sutherland-Hodgman pass. Crossing vertices interpolate from the
/// inside end by `d_in / (d_in - d_out)`.
pub fn clip_to_plane(plane: Vec4, input: &[ClipVertex], output: &mut Vec<ClipVertex>) {
    output.clear();
    for (i, current) in input.iter().enumerate() {
        let next = &input[(i + 1) % input.len()];
        let d_current = plane.dot(current.position);
        let d_next = plane.dot(next.position);
        if d_current >= 0.0 {
            output.push(*current);
            if d_next < 0.0 {
                output.push(current.lerp(*next, d_current / (d_current - d_next)));
            }
        } else if d_next >= 0.0 {
            output.push(next.lerp(*current, d_next / (d_next - d_current)));
        }
    }
}

/// Clips against every plane in turn; empty once fewer than three vertices
/// survive a pass.
pub fn clip_polygon(vertices: &[ClipVertex]) -> Vec<ClipVertex> {
    let mut current = vertices.to_vec();
    let mut scratch = Vec::with_capacity(vertices.len() + CLIP_PLANES.len());
    for plane in CLIP_PLANES {
        clip_to_plane(plane, &current, &mut scratch);
        std::mem::swap(&mut current, &mut scratch);
        if current.len() < 3 {
            return Vec::new();
        }
    }
    current
}

/// Signed area of the first three vertices in NDC; non-negative means the
/// polygon faces away.
pub fn is_back_facing(vertices: &[ProjectedVertex]) -> bool {
    let [a, b, c] = [vertices[0].ndc, vertices[1].ndc, vertices[2].ndc];
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) >= 0.0
}

/// Triangles `(0, i, i - 1)` covering an `count`-gon.
pub fn fan_triangles(count: usize) -> impl Iterator<Item = [usize; 3]> {
    (2..count.max(2)).map(|i| [0, i, i - 1])
}
