use std::fmt;

use crate::read_u32_le;

/// `"CMP "` read as a little-endian u32.
pub const CMP_MAGIC: u32 = 0x2050_4D43;
pub const CMP_HEADER_LEN: usize = 64;
pub const PALETTE_LEN: usize = 256 * 3;

#[derive(Debug)]
pub enum CmpError {
    InvalidHeader,
    PaletteTooShort { expected: usize, actual: usize },
}

impl fmt::Display for CmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpError::InvalidHeader => write!(f, "invalid colormap header"),
            CmpError::PaletteTooShort { expected, actual } => write!(
                f,
                "colormap data too short: expected {} bytes, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for CmpError {}

/// 256 RGBA entries; alpha is always opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    colors: [[u8; 4]; 256],
}

impl ColorMap {
    pub fn rgba(&self, index: u8) -> [u8; 4] {
        self.colors[index as usize]
    }

    pub fn colors(&self) -> &[[u8; 4]; 256] {
        &self.colors
    }
}

pub fn parse_colormap(data: &[u8]) -> Result<ColorMap, CmpError> {
    if data.len() < CMP_HEADER_LEN || read_u32_le(&data[0..4]) != CMP_MAGIC {
        return Err(CmpError::InvalidHeader);
    }
    let expected = CMP_HEADER_LEN + PALETTE_LEN;
    if data.len() < expected {
        return Err(CmpError::PaletteTooShort {
            expected,
            actual: data.len(),
        });
    }

    let mut colors = [[0u8, 0, 0, 255]; 256];
    let rgb = &data[CMP_HEADER_LEN..expected];
    for (color, chunk) in colors.iter_mut().zip(rgb.chunks_exact(3)) {
        color[..3].copy_from_slice(chunk);
    }
    Ok(ColorMap { colors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::build_cmp;

    #[test]
    fn parse_colormap_expands_rgb_to_rgba() {
        let data = build_cmp(&[[12, 34, 56], [1, 2, 3]]);
        let colormap = parse_colormap(&data).expect("colormap parse");
        assert_eq!(colormap.rgba(0), [12, 34, 56, 255]);
        assert_eq!(colormap.rgba(1), [1, 2, 3, 255]);
        assert_eq!(colormap.rgba(255), [0, 0, 0, 255]);
    }

    #[test]
    fn trailing_light_tables_are_ignored() {
        let mut data = build_cmp(&[[9, 9, 9]]);
        data.extend(std::iter::repeat(7u8).take(64 * 256));
        let colormap = parse_colormap(&data).expect("colormap parse");
        assert_eq!(colormap.rgba(0), [9, 9, 9, 255]);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut data = build_cmp(&[]);
        data[3] = 0;
        assert!(matches!(parse_colormap(&data), Err(CmpError::InvalidHeader)));
    }

    #[test]
    fn rejects_short_palette() {
        let data = build_cmp(&[]);
        let err = parse_colormap(&data[..100]).expect_err("should fail");
        assert!(matches!(err, CmpError::PaletteTooShort { actual: 100, .. }));
    }
}
