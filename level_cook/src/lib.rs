//! Turns decoded levels and models into world-space render surfaces.

#![forbid(unsafe_code)]

pub mod episode;
pub mod lighting;
pub mod materials;
pub mod scene;
pub mod transform;

pub use episode::{load_episode, load_models, LoadedEpisode, LoadedLevel, ModelSet};
pub use materials::{ColormapBinding, Material, MaterialCache, MaterialSource};
pub use scene::{build_scene, load_level, RenderSurface, RenderVertex, Scene, SceneError};
