/// Per-pixel NDC depth; 1.0 is the far plane.
#[derive(Clone, Debug)]
pub struct DepthBuffer {
    depths: Box<[f32]>,
    width: usize,
}

impl DepthBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            depths: vec![1.0; width * height].into_boxed_slice(),
            width,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.depths[y * self.width + x]
    }

    /// True when `depth` lies nearer than what the pixel holds.
    #[inline]
    pub fn passes(&self, x: usize, y: usize, depth: f32) -> bool {
        depth < self.depths[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, depth: f32) {
        self.depths[y * self.width + x] = depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearer_depths_win() {
        let mut buffer = DepthBuffer::new(4, 2);
        assert!(buffer.passes(3, 1, 0.5));
        assert!(!buffer.passes(3, 1, 1.0));
        buffer.set(3, 1, 0.5);
        assert!(!buffer.passes(3, 1, 0.6));
        assert!(buffer.passes(3, 1, 0.4));
        assert_eq!(buffer.get(3, 1), 0.5);
        assert_eq!(buffer.get(2, 1), 1.0);
    }
}
