use glam::Vec2;
use level_cook::Material;

#[derive(Clone, Debug, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    /// RGB8, top row first.
    pub rgb: Vec<u8>,
}

impl MipLevel {
    fn texel(&self, x: u32, y: u32) -> [f32; 3] {
        let index = (y as usize * self.width as usize + x as usize) * 3;
        [
            f32::from(self.rgb[index]),
            f32::from(self.rgb[index + 1]),
            f32::from(self.rgb[index + 2]),
        ]
    }

    /// Next level down: each texel averages the (up to) 2x2 texels it covers,
    /// dimensions round up.
    fn downsample(&self) -> Self {
        let width = self.width.div_ceil(2);
        let height = self.height.div_ceil(2);
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let mut sum = [0u32; 3];
                let mut count = 0u32;
                for sy in (y * 2)..(y * 2 + 2).min(self.height) {
                    for sx in (x * 2)..(x * 2 + 2).min(self.width) {
                        let index = (sy as usize * self.width as usize + sx as usize) * 3;
                        for channel in 0..3 {
                            sum[channel] += u32::from(self.rgb[index + channel]);
                        }
                        count += 1;
                    }
                }
                rgb.extend(sum.map(|total| ((total + count / 2) / count) as u8));
            }
        }
        Self { width, height, rgb }
    }

    /// Bilinear, wrapping in both directions. V grows upward.
    pub fn sample(&self, uv: Vec2) -> [f32; 3] {
        let s = uv.x * self.width as f32;
        let t = -uv.y * self.height as f32;
        let (s_floor, t_floor) = (s.floor(), t.floor());
        let (fs, ft) = (s - s_floor, t - t_floor);
        let s0 = wrap(s_floor, self.width);
        let t0 = wrap(t_floor, self.height);
        let s1 = (s0 + 1) % self.width;
        let t1 = (t0 + 1) % self.height;
        let top = lerp3(self.texel(s0, t0), self.texel(s1, t0), fs);
        let bottom = lerp3(self.texel(s0, t1), self.texel(s1, t1), fs);
        lerp3(top, bottom, ft)
    }
}

fn wrap(coord: f32, size: u32) -> u32 {
    if !coord.is_finite() {
        return 0;
    }
    (coord as i64).rem_euclid(i64::from(size)) as u32
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Box-filtered levels of one material down to 1x1.
#[derive(Clone, Debug, PartialEq)]
pub struct MipChain {
    levels: Vec<MipLevel>,
}

impl MipChain {
    pub fn new(material: &Material) -> Self {
        let rgb = material
            .rgba()
            .chunks_exact(4)
            .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
            .collect();
        Self::from_level(MipLevel {
            width: material.width.max(1),
            height: material.height.max(1),
            rgb,
        })
    }

    pub fn from_level(base: MipLevel) -> Self {
        let mut levels = vec![base];
        while let Some(last) = levels.last() {
            if last.width <= 1 && last.height <= 1 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels past the smallest repeat it.
    pub fn level(&self, index: usize) -> &MipLevel {
        &self.levels[index.min(self.levels.len() - 1)]
    }

    /// Fractional level for a pixel whose UV changes by `dx` and `dy` to
    /// its neighbors.
    pub fn level_of_detail(&self, dx: Vec2, dy: Vec2) -> f32 {
        let base = &self.levels[0];
        let footprint = (dx.abs().max_element() * base.width as f32)
            .max(dy.abs().max_element() * base.height as f32);
        if footprint <= 1.0 || !footprint.is_finite() {
            0.0
        } else {
            footprint.log2()
        }
    }

    /// Trilinear sample, rounded to integer channels.
    pub fn sample(&self, uv: Vec2, dx: Vec2, dy: Vec2) -> [u8; 3] {
        let lod = self.level_of_detail(dx, dy);
        let color = if lod <= 0.0 {
            self.level(0).sample(uv)
        } else {
            let low = lod.floor();
            let fine = self.level(low as usize).sample(uv);
            let coarse = self.level(low as usize + 1).sample(uv);
            lerp3(fine, coarse, lod - low)
        };
        color.map(|channel| channel.round().clamp(0.0, 255.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(width: u32, height: u32, values: &[u8]) -> MipLevel {
        MipLevel {
            width,
            height,
            rgb: values.iter().flat_map(|&v| [v, v, v]).collect(),
        }
    }

    #[test]
    fn chain_halves_down_to_one_texel() {
        let chain = MipChain::from_level(level(4, 2, &[0, 40, 80, 120, 160, 200, 240, 250]));
        assert_eq!(chain.len(), 3);
        assert_eq!((chain.level(1).width, chain.level(1).height), (2, 1));
        assert_eq!(chain.level(1).rgb[0], 100);
        assert_eq!((chain.level(2).width, chain.level(2).height), (1, 1));
        assert_eq!(chain.level(9), chain.level(2));
    }

    #[test]
    fn odd_sizes_round_up() {
        let chain = MipChain::from_level(level(3, 1, &[10, 20, 90]));
        assert_eq!((chain.level(1).width, chain.level(1).height), (2, 1));
        assert_eq!(chain.level(1).rgb[3], 90);
    }

    #[test]
    fn bilinear_sampling_wraps() {
        let tex = level(2, 2, &[0, 100, 200, 50]);
        // texel centers sit on integer coordinates; v runs downward negated
        assert_eq!(tex.sample(Vec2::new(0.0, 0.0)), [0.0; 3]);
        assert_eq!(tex.sample(Vec2::new(0.25, 0.0)), [50.0; 3]);
        assert_eq!(tex.sample(Vec2::new(0.0, -0.5)), [200.0; 3]);
        assert_eq!(tex.sample(Vec2::new(1.0, 0.0)), tex.sample(Vec2::ZERO));
        // halfway past the right edge blends back into column 0
        assert_eq!(tex.sample(Vec2::new(0.75, 0.0)), [50.0; 3]);
        assert_eq!(tex.sample(Vec2::new(-0.25, 0.0)), [50.0; 3]);
    }

    #[test]
    fn footprint_selects_level() {
        let chain = MipChain::from_level(level(8, 8, &[128; 64]));
        assert_eq!(chain.level_of_detail(Vec2::splat(0.1), Vec2::splat(0.1)), 0.0);
        let lod = chain.level_of_detail(Vec2::new(0.5, 0.0), Vec2::ZERO);
        assert!((lod - 2.0).abs() < 1e-6);
        assert_eq!(chain.sample(Vec2::ZERO, Vec2::new(0.5, 0.0), Vec2::ZERO), [128; 3]);
    }

    #[test]
    fn sampling_blends_levels() {
        let chain = MipChain::from_level(level(2, 1, &[0, 200]));
        // level 0 at u = 0 is 0, level 1 is the average 100
        let half = chain.sample(Vec2::ZERO, Vec2::new(2.0_f32.sqrt() / 2.0, 0.0), Vec2::ZERO);
        assert!((49..=51).contains(&half[0]));
    }
}
