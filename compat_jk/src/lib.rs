//! Readers for Jedi Knight asset formats: GOB containers, colormaps,
//! materials, levels (JKL), models (3DO) and the episode/model listings.
#![forbid(unsafe_code)]

pub mod cmp;
pub mod episode;
pub mod gob;
pub mod jkl;
pub mod mat;
pub mod models_dat;
pub mod text;
pub mod threedo;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub(crate) fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
