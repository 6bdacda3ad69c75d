//! Byte-image writers for the binary formats, used by tests across the
//! workspace.

use crate::cmp::CMP_MAGIC;
use crate::gob::GOB_MAGIC;
use crate::mat::{MAT_MAGIC, MAT_VERSION};

pub fn build_gob(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&GOB_MAGIC.to_le_bytes());
    out.extend_from_slice(&20i32.to_le_bytes());
    out.extend_from_slice(&12i32.to_le_bytes());
    out.extend_from_slice(&(entries.len() as i32).to_le_bytes());

    let mut offset = 16 + entries.len() * 136;
    for (name, data) in entries {
        out.extend_from_slice(&(offset as i32).to_le_bytes());
        out.extend_from_slice(&(data.len() as i32).to_le_bytes());
        let mut name_field = [0u8; 128];
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&name_field);
        offset += data.len();
    }
    for (_, data) in entries {
        out.extend_from_slice(data);
    }
    out
}

/// Colormap whose first entries are `colors`; the rest stay black.
pub fn build_cmp(colors: &[[u8; 3]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&CMP_MAGIC.to_le_bytes());
    out.extend_from_slice(&30i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&[0u8; 52]);
    let mut rgb = [0u8; 768];
    for (index, color) in colors.iter().take(256).enumerate() {
        rgb[index * 3..index * 3 + 3].copy_from_slice(color);
    }
    out.extend_from_slice(&rgb);
    out
}

/// Flat-color material with one frame per colormap index.
pub fn build_color_mat(color_indices: &[u32]) -> Vec<u8> {
    let mut out = mat_header(0, color_indices.len(), &INDEXED_DESCRIPTOR);
    for &color in color_indices {
        push_i32s(&mut out, &[0]);
        out.extend_from_slice(&color.to_le_bytes());
        push_i32s(&mut out, &[0, 0, 0, 0]);
    }
    out
}

/// Single-frame 8-bit material. `pixels` is the largest mip level in file
/// (bottom-up) order; smaller levels are filled with index 0xff.
pub fn build_indexed_mat(
    width: u32,
    height: u32,
    mipmaps: u32,
    transparent: Option<u32>,
    pixels: &[u8],
) -> Vec<u8> {
    let mut out = mat_header(2, 1, &INDEXED_DESCRIPTOR);
    push_texture_header(&mut out, transparent.unwrap_or(0), 0);
    push_i32s(
        &mut out,
        &[
            width as i32,
            height as i32,
            i32::from(transparent.is_some()),
            0,
            0,
            mipmaps as i32,
        ],
    );
    out.extend_from_slice(pixels);
    let (mut w, mut h) = (width, height);
    for _ in 1..mipmaps {
        w = if w != 1 { w / 2 } else { w };
        h = if h != 1 { h / 2 } else { h };
        out.extend(std::iter::repeat(0xffu8).take((w * h) as usize));
    }
    out
}

/// Single-frame, single-mip RGB565 material.
pub fn build_rgb565_mat(width: u32, height: u32, pixels: &[u16]) -> Vec<u8> {
    let descriptor = [16, 5, 6, 5, 11, 5, 0, 3, 2, 3, 0, 0, 0];
    let mut out = mat_header(2, 1, &descriptor);
    push_texture_header(&mut out, 0, 0);
    push_i32s(&mut out, &[width as i32, height as i32, 0, 0, 0, 1]);
    for pixel in pixels {
        out.extend_from_slice(&pixel.to_le_bytes());
    }
    out
}

const INDEXED_DESCRIPTOR: [i32; 13] = [8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

fn mat_header(element_type: i32, count: usize, descriptor: &[i32; 13]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAT_MAGIC.to_le_bytes());
    push_i32s(&mut out, &[MAT_VERSION, element_type, count as i32, 0, 0]);
    push_i32s(&mut out, descriptor);
    out
}

fn push_texture_header(out: &mut Vec<u8>, transparent: u32, index: i32) {
    push_i32s(out, &[8]);
    out.extend_from_slice(&transparent.to_le_bytes());
    push_i32s(out, &[0, 0, 0, 0, 0, 0, 0, index]);
}

fn push_i32s(out: &mut Vec<u8>, values: &[i32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}
