use compat_jk::jkl::SpawnPoint;
use engine_core::RenderSettings;
use glam::{Mat3, Mat4, Vec3};

/// Preview camera. Only yaw (`rotation[1]`, degrees) steers the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub rotation: [f32; 3],
}

impl Camera {
    pub fn new(position: [f32; 3], rotation: [f32; 3]) -> Self {
        Self {
            position: Vec3::from(position),
            rotation,
        }
    }

    pub fn from_spawn(spawn: &SpawnPoint) -> Self {
        Self::new(spawn.position, spawn.rotation)
    }

    /// Yaw 0 looks down +Y with +Z up; view space is x right, y up, z forward.
    pub fn forward(&self) -> Vec3 {
        let angle = (-self.rotation[1]).to_radians();
        Vec3::new(angle.sin(), angle.cos(), 0.0)
    }

    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.forward();
        let up = Vec3::Z;
        let right = forward.cross(up);
        let basis = Mat3::from_cols(right, up, forward).transpose();
        Mat4::from_mat3(basis) * Mat4::from_translation(-self.position)
    }
}

/// Left-handed perspective with depth mapped to [0, 1].
pub fn projection_matrix(settings: &RenderSettings) -> Mat4 {
    let aspect = settings.width as f32 / settings.height as f32;
    Mat4::perspective_lh(
        settings.fov_deg.to_radians(),
        aspect,
        settings.near,
        settings.far,
    )
}
