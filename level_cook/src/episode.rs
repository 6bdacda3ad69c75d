use compat_jk::episode::parse_episode;
use compat_jk::text::decode_text;
use engine_core::logging;
use engine_core::{ExtractConfig, Layer, Vfs};
use glam::Mat4;

use crate::materials::{ColormapBinding, Material, MaterialCache};
use crate::scene::{emit_model, load_level, load_model, RenderSurface, Scene, SceneError};

pub const EPISODE_FILE: &str = "episode.jk";

#[derive(Debug)]
pub struct LoadedLevel {
    /// Level file name without the `.jkl` suffix.
    pub name: String,
    pub scene: Scene,
}

#[derive(Debug)]
pub struct LoadedEpisode {
    pub title: String,
    pub levels: Vec<LoadedLevel>,
}

/// Builds every level `episode.jk` lists. The listing is read from the level
/// archives only; a level that fails is logged and left out.
pub fn load_episode(vfs: &Vfs, config: &ExtractConfig) -> Result<LoadedEpisode, SceneError> {
    let data = vfs.read_in_layer(Layer::Level, EPISODE_FILE)?;
    let text = decode_text(&data);
    let episode = parse_episode(&text).map_err(|error| SceneError::Decode {
        name: EPISODE_FILE.to_string(),
        error,
    })?;

    let mut levels = Vec::with_capacity(episode.levels.len());
    for file in &episode.levels {
        match load_level(vfs, config, &config.level_path(file)) {
            Ok(scene) => {
                logging::info(format!("level {} built", file));
                levels.push(LoadedLevel {
                    name: level_name(file).to_string(),
                    scene,
                });
            }
            Err(err) => logging::warn(format!("level {} skipped: {}", file, err)),
        }
    }
    Ok(LoadedEpisode {
        title: episode.title,
        levels,
    })
}

fn level_name(file: &str) -> &str {
    match file.len().checked_sub(4) {
        Some(split) if file.is_char_boundary(split) && file[split..].eq_ignore_ascii_case(".jkl") => {
            &file[..split]
        }
        _ => file,
    }
}

/// Skins built at the origin with their file vertex colors.
#[derive(Debug, Default)]
pub struct ModelSet {
    /// One entry per requested model; `None` where it failed to load.
    pub models: Vec<Option<Vec<RenderSurface>>>,
    pub materials: Vec<Material>,
}

/// Builds each named model unlit at the origin, sharing one material list
/// decoded through `colormap`.
pub fn load_models<S: AsRef<str>>(
    vfs: &Vfs,
    config: &ExtractConfig,
    names: &[S],
    colormap: Option<&str>,
) -> ModelSet {
    let binding = match colormap {
        Some(name) => ColormapBinding::load(vfs, config, name),
        None => ColormapBinding::none(),
    };
    let mut cache = MaterialCache::new();
    let models = names
        .iter()
        .map(|name| {
            let model = load_model(vfs, config, name.as_ref())?;
            let mut surfaces = Vec::new();
            emit_model(
                &model,
                Mat4::IDENTITY,
                None,
                &mut cache,
                &binding,
                vfs,
                config,
                &mut surfaces,
            );
            Some(surfaces)
        })
        .collect();
    ModelSet {
        models,
        materials: cache.into_materials(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tests::{archive_bytes, LEVEL};
    use compat_jk::fixtures::build_gob;
    use engine_core::Archive;

    const EPISODE: &str = "\
\"Test Episode\"
TYPE 1
SEQUENCE 3
10: 1 1 LEVEL test.jkl 0 0 10 -1
20: 1 2 LEVEL broken.jkl 0 0 10 -1
30: 1 3 CUT intro.smk 0 0 10 -1
40: 1 4 LEVEL Test.JKL 0 0 10 -1
";

    fn vfs() -> Vfs {
        let extras = build_gob(&[
            ("episode.jk", EPISODE.as_bytes()),
            ("jkl/broken.jkl", b"SECTION: MATERIALS\n".as_slice()),
        ]);
        Vfs::open([
            Archive::from_gob_bytes("base.gob", archive_bytes(LEVEL)).expect("gob"),
            Archive::from_gob_bytes("episode.gob", extras).expect("gob"),
        ])
    }

    #[test]
    fn episode_skips_failing_levels() {
        let episode = load_episode(&vfs(), &ExtractConfig::default()).expect("episode");
        assert_eq!(episode.title, "Test Episode");
        let names: Vec<&str> = episode.levels.iter().map(|level| level.name.as_str()).collect();
        assert_eq!(names, vec!["test", "Test"]);
        assert_eq!(episode.levels[0].scene.opaque.len(), 2);
    }

    #[test]
    fn episode_listing_must_come_from_level_archives() {
        let mut vfs = Vfs::new();
        let extras = build_gob(&[("episode.jk", EPISODE.as_bytes())]);
        vfs.mount(
            Archive::from_gob_bytes("official.gob", extras).expect("gob"),
            Layer::Official,
        );
        let err = load_episode(&vfs, &ExtractConfig::default()).expect_err("official only");
        assert!(matches!(err, SceneError::Vfs(_)));
    }

    #[test]
    fn level_names_drop_suffix() {
        assert_eq!(level_name("01narsh.jkl"), "01narsh");
        assert_eq!(level_name("02.JKL"), "02");
        assert_eq!(level_name("jkl"), "jkl");
        assert_eq!(level_name("readme.txt"), "readme.txt");
    }

    #[test]
    fn models_share_materials_and_keep_file_colors() {
        let names = ["box.3do", "nope.3do", "box.3do"];
        let set = load_models(&vfs(), &ExtractConfig::default(), &names, Some("dflt.cmp"));
        assert_eq!(set.models.len(), 3);
        assert!(set.models[1].is_none());
        let first = set.models[0].as_ref().expect("box");
        let again = set.models[2].as_ref().expect("box");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].material, again[0].material);
        assert_eq!(set.materials.len(), 1);
        assert_eq!(first[0].vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(first[0].vertices[0].color, [0.2; 3]);
    }
}
