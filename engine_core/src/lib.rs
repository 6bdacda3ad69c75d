#![forbid(unsafe_code)]

pub mod config;
pub mod logging;
pub mod vfs;

pub use config::{ExtractConfig, RenderSettings};
pub use vfs::{Archive, Layer, Vfs, VfsError};
