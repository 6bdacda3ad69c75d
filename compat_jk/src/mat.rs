use std::fmt;

use crate::cmp::ColorMap;

/// `"MAT "` read as a little-endian u32.
pub const MAT_MAGIC: u32 = 0x2054_414D;
pub const MAT_VERSION: i32 = 50;

const ELEMENT_COLOR: i32 = 0;
const ELEMENT_TEXTURE: i32 = 2;
const BITMAP_HEADER_TYPE: i32 = 8;
const MAX_MIPMAPS: i32 = 16;

#[derive(Debug)]
pub enum MatError {
    InvalidHeader,
    Truncated,
    UnsupportedVersion(i32),
    UnsupportedElementType(i32),
    UnsupportedBitDepth(i32),
    NoFrames,
    InvalidFrameHeader { frame: usize },
    InvalidColorIndex { frame: usize, index: u32 },
    InvalidDimensions { width: i32, height: i32 },
}

impl fmt::Display for MatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatError::InvalidHeader => write!(f, "invalid mat header"),
            MatError::Truncated => write!(f, "mat data is truncated"),
            MatError::UnsupportedVersion(version) => {
                write!(f, "unsupported mat version {}", version)
            }
            MatError::UnsupportedElementType(kind) => {
                write!(f, "unsupported mat element type {}", kind)
            }
            MatError::UnsupportedBitDepth(bits) => {
                write!(f, "unsupported mat bit depth {}", bits)
            }
            MatError::NoFrames => write!(f, "mat has no frames"),
            MatError::InvalidFrameHeader { frame } => {
                write!(f, "invalid mat frame header at frame {}", frame)
            }
            MatError::InvalidColorIndex { frame, index } => {
                write!(f, "invalid color index {} at frame {}", index, frame)
            }
            MatError::InvalidDimensions { width, height } => {
                write!(f, "invalid mat dimensions: {}x{}", width, height)
            }
        }
    }
}

impl std::error::Error for MatError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatKind {
    Color,
    Texture,
}

/// Bit layout of a packed pixel, as declared by the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorFormat {
    pub total_bits: i32,
    pub channel_bits: [i32; 3],
    pub channel_shifts: [i32; 3],
    pub channel_expands: [i32; 3],
}

impl ColorFormat {
    fn unpack(&self, value: u16) -> [u8; 4] {
        let value = u32::from(value);
        let mut rgba = [0, 0, 0, 255];
        for channel in 0..3 {
            let mask = shl(1, self.channel_bits[channel]).wrapping_sub(1);
            let raw = shr(value, self.channel_shifts[channel]) & mask;
            rgba[channel] = shl(raw, self.channel_expands[channel]).min(255) as u8;
        }
        rgba
    }
}

/// One decoded animation frame, RGBA8, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MatTexture {
    pub kind: MatKind,
    pub format: ColorFormat,
    pub transparent_index: Option<u32>,
    pub frames: Vec<MatFrame>,
}

impl MatTexture {
    pub fn width(&self) -> u32 {
        self.frames[0].width
    }

    pub fn height(&self) -> u32 {
        self.frames[0].height
    }
}

/// Decodes every frame of a material. Indexed pixels go through `colormap`
/// when given and fall back to gray levels otherwise.
pub fn parse_mat(data: &[u8], colormap: Option<&ColorMap>) -> Result<MatTexture, MatError> {
    let mut reader = Reader::new(data);
    let magic = reader.u32()?;
    if magic != MAT_MAGIC {
        return Err(MatError::InvalidHeader);
    }
    let version = reader.i32()?;
    if version != MAT_VERSION {
        return Err(MatError::UnsupportedVersion(version));
    }
    let element_type = reader.i32()?;
    let count = reader.i32()?;
    reader.skip(8)?;
    let format = read_color_format(&mut reader)?;

    let count = usize::try_from(count).map_err(|_| MatError::InvalidHeader)?;
    if count == 0 {
        return Err(MatError::NoFrames);
    }

    let (kind, transparent_index, frames) = match element_type {
        ELEMENT_COLOR => (
            MatKind::Color,
            None,
            read_color_frames(&mut reader, count, colormap)?,
        ),
        ELEMENT_TEXTURE => {
            let (transparent_index, frames) =
                read_texture_frames(&mut reader, &format, count, colormap)?;
            (MatKind::Texture, transparent_index, frames)
        }
        other => return Err(MatError::UnsupportedElementType(other)),
    };

    Ok(MatTexture {
        kind,
        format,
        transparent_index,
        frames,
    })
}

fn read_color_format(reader: &mut Reader<'_>) -> Result<ColorFormat, MatError> {
    let mut fields = [0i32; 13];
    for field in &mut fields {
        *field = reader.i32()?;
    }
    Ok(ColorFormat {
        total_bits: fields[0],
        channel_bits: [fields[1], fields[2], fields[3]],
        channel_shifts: [fields[4], fields[5], fields[6]],
        channel_expands: [fields[7], fields[8], fields[9]],
    })
}

fn read_color_frames(
    reader: &mut Reader<'_>,
    count: usize,
    colormap: Option<&ColorMap>,
) -> Result<Vec<MatFrame>, MatError> {
    let mut frames = Vec::with_capacity(count.min(256));
    for frame in 0..count {
        let element_type = reader.i32()?;
        let color = reader.u32()?;
        reader.skip(16)?;
        if element_type != ELEMENT_COLOR {
            return Err(MatError::InvalidFrameHeader { frame });
        }
        let index = u8::try_from(color)
            .map_err(|_| MatError::InvalidColorIndex { frame, index: color })?;
        frames.push(MatFrame {
            width: 1,
            height: 1,
            rgba: indexed_rgba(index, colormap).to_vec(),
        });
    }
    Ok(frames)
}

fn read_texture_frames(
    reader: &mut Reader<'_>,
    format: &ColorFormat,
    count: usize,
    colormap: Option<&ColorMap>,
) -> Result<(Option<u32>, Vec<MatFrame>), MatError> {
    let mut transparent_colors = Vec::with_capacity(count.min(256));
    for frame in 0..count {
        let element_type = reader.i32()?;
        let transparent_color = reader.u32()?;
        reader.skip(28)?;
        let index = reader.i32()?;
        if element_type != BITMAP_HEADER_TYPE || index != frame as i32 {
            return Err(MatError::InvalidFrameHeader { frame });
        }
        transparent_colors.push(transparent_color);
    }

    let mut first_key = None;
    let mut frames = Vec::with_capacity(transparent_colors.len());
    for (frame, &transparent_color) in transparent_colors.iter().enumerate() {
        let width = reader.i32()?;
        let height = reader.i32()?;
        let has_transparency = reader.i32()? != 0;
        reader.skip(8)?;
        let mipmaps = reader.i32()?;
        if width <= 0 || height <= 0 {
            return Err(MatError::InvalidDimensions { width, height });
        }
        if !(1..=MAX_MIPMAPS).contains(&mipmaps) {
            return Err(MatError::InvalidFrameHeader { frame });
        }

        let key = has_transparency.then_some(transparent_color);
        if frame == 0 {
            first_key = key;
        }

        let (full_width, full_height) = (width as u32, height as u32);
        let (mut level_width, mut level_height) = (full_width, full_height);
        let mut pixels = Vec::new();
        for level in 0..mipmaps {
            let texels = (level_width as usize)
                .checked_mul(level_height as usize)
                .ok_or(MatError::InvalidDimensions { width, height })?;
            // Only the largest level is kept; the rest just advance the cursor.
            match format.total_bits {
                8 => {
                    let data = reader.take(texels)?;
                    if level == 0 {
                        pixels = decode_indexed(data, colormap, key);
                    }
                }
                16 => {
                    let len = texels.checked_mul(2).ok_or(MatError::Truncated)?;
                    let data = reader.take(len)?;
                    if level == 0 {
                        pixels = decode_packed(data, format);
                    }
                }
                bits => return Err(MatError::UnsupportedBitDepth(bits)),
            }
            if level_width != 1 {
                level_width /= 2;
            }
            if level_height != 1 {
                level_height /= 2;
            }
        }

        frames.push(MatFrame {
            width: full_width,
            height: full_height,
            rgba: flip_rows(&pixels, full_width as usize, full_height as usize),
        });
    }
    Ok((first_key, frames))
}

fn indexed_rgba(index: u8, colormap: Option<&ColorMap>) -> [u8; 4] {
    match colormap {
        Some(colormap) => colormap.rgba(index),
        None => [index, index, index, 255],
    }
}

fn decode_indexed(data: &[u8], colormap: Option<&ColorMap>, key: Option<u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4);
    for &index in data {
        let mut rgba = indexed_rgba(index, colormap);
        if key == Some(u32::from(index)) {
            rgba[3] = 0;
        }
        out.extend_from_slice(&rgba);
    }
    out
}

fn decode_packed(data: &[u8], format: &ColorFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for pair in data.chunks_exact(2) {
        let value = u16::from_le_bytes([pair[0], pair[1]]);
        out.extend_from_slice(&format.unpack(value));
    }
    out
}

/// Files store rows bottom-up.
fn flip_rows(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let stride = width * 4;
    let mut out = Vec::with_capacity(rgba.len());
    for row in (0..height).rev() {
        out.extend_from_slice(&rgba[row * stride..(row + 1) * stride]);
    }
    out
}

fn shl(value: u32, amount: i32) -> u32 {
    u32::try_from(amount)
        .ok()
        .and_then(|amount| value.checked_shl(amount))
        .unwrap_or(0)
}

fn shr(value: u32, amount: i32) -> u32 {
    u32::try_from(amount)
        .ok()
        .and_then(|amount| value.checked_shr(amount))
        .unwrap_or(0)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MatError> {
        let end = self.pos.checked_add(len).ok_or(MatError::Truncated)?;
        if end > self.data.len() {
            return Err(MatError::Truncated);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), MatError> {
        self.take(len).map(|_| ())
    }

    fn u32(&mut self) -> Result<u32, MatError> {
        let bytes = self.take(4)?;
        Ok(crate::read_u32_le(bytes))
    }

    fn i32(&mut self) -> Result<i32, MatError> {
        let bytes = self.take(4)?;
        Ok(crate::read_i32_le(bytes))
    }
}
