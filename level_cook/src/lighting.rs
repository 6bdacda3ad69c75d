use compat_jk::jkl::PointLight;
use glam::Vec3;

/// Light that reaches a model vertex from one point light. Falloff is
/// linear to zero at `light * range_scale`; surfaces facing away get none.
pub fn point_light_contribution(
    light: &PointLight,
    position: Vec3,
    normal: Vec3,
    range_scale: f32,
) -> Vec3 {
    let range = light.light * range_scale;
    let to_light = Vec3::from(light.origin()) - position;
    let distance = to_light.length();
    if distance.is_nan() || distance >= range {
        return Vec3::ZERO;
    }
    let facing = normal
        .normalize_or_zero()
        .dot(to_light.normalize_or_zero())
        .max(0.0);
    let falloff = 1.0 - distance / range;
    Vec3::from(light.brightness()) * (facing * falloff)
}

/// Environment a model instance is lit in: its sector's light plus every
/// point light of the level.
#[derive(Clone, Copy, Debug)]
pub struct LightingContext<'a> {
    pub ambient: f32,
    pub extra: f32,
    pub lights: &'a [PointLight],
    pub range_scale: f32,
}

impl LightingContext<'_> {
    pub fn unlit() -> LightingContext<'static> {
        LightingContext {
            ambient: 0.0,
            extra: 0.0,
            lights: &[],
            range_scale: 1.0,
        }
    }

    /// Ambient, then each light, then sector extra light; capped at 1.
    pub fn light_vertex(&self, position: Vec3, normal: Vec3) -> [f32; 3] {
        let mut color = Vec3::splat(self.ambient);
        for light in self.lights {
            color += point_light_contribution(light, position, normal, self.range_scale);
        }
        color += Vec3::splat(self.extra);
        color.min(Vec3::ONE).to_array()
    }
}
