//! Level (`.jkl`) decoder.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use crate::text::{
    parse_hex, parse_vector, split_sections, subsections, Line, Record, TextError,
};

pub const GEO_TEXTURED: i32 = 4;

pub const SURFACE_HORIZON_SKY: u32 = 0x200;
pub const SURFACE_CEILING_SKY: u32 = 0x400;
pub const SURFACE_HALF_UV: u32 = 0x10;
pub const SURFACE_DOUBLE_UV: u32 = 0x20;
pub const SURFACE_OCTUPLE_UV: u32 = 0x40;
pub const FACE_TRANSLUCENT: u32 = 0x2;

const LIGHT_MODE_FULL_BRIGHT: i32 = 1;
const THING_EMITS_LIGHT: u32 = 0x1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub material: Option<u32>,
    pub surface_flags: u32,
    pub face_flags: u32,
    pub geometry: i32,
    pub light_mode: i32,
    pub extra_light: f32,
    pub vertices: Vec<LevelVertex>,
    pub normal: Option<[f32; 3]>,
}

impl Surface {
    pub fn is_renderable(&self) -> bool {
        self.geometry == GEO_TEXTURED
    }

    pub fn is_sky(&self) -> bool {
        self.surface_flags & (SURFACE_HORIZON_SKY | SURFACE_CEILING_SKY) != 0
    }

    pub fn is_translucent(&self) -> bool {
        self.face_flags & FACE_TRANSLUCENT != 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sector {
    pub colormap: u32,
    pub surfaces: Range<usize>,
    pub ambient_light: f32,
    pub extra_light: f32,
}

impl Default for Sector {
    fn default() -> Self {
        Self {
            colormap: 0,
            surfaces: 0..0,
            ambient_light: 0.0,
            extra_light: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub offset: [f32; 3],
    /// Raw `light` value; the falloff range derives from it.
    pub light: f32,
    pub intensity: f32,
    pub color: [f32; 3],
}

impl PointLight {
    pub fn origin(&self) -> [f32; 3] {
        [
            self.position[0] + self.offset[0],
            self.position[1] + self.offset[1],
            self.position[2] + self.offset[2],
        ]
    }

    pub fn brightness(&self) -> [f32; 3] {
        self.color.map(|channel| channel * self.intensity)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelPlacement {
    pub model: String,
    pub position: [f32; 3],
    /// Pitch, yaw, roll in degrees.
    pub rotation: [f32; 3],
    pub sector: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnPoint {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Level {
    /// Only the materials some surface references.
    pub materials: BTreeMap<u32, String>,
    pub colormaps: BTreeMap<u32, String>,
    pub surfaces: BTreeMap<usize, Surface>,
    pub sectors: BTreeMap<usize, Sector>,
    pub lights: Vec<PointLight>,
    pub models: Vec<ModelPlacement>,
    pub spawn_points: Vec<SpawnPoint>,
}

impl Level {
    /// Surfaces of a sector in index order; indices the level lacks are
    /// skipped.
    pub fn sector_surfaces<'a>(
        &'a self,
        sector: &Sector,
    ) -> impl Iterator<Item = (usize, &'a Surface)> + 'a {
        self.surfaces
            .range(sector.surfaces.clone())
            .map(|(&index, surface)| (index, surface))
    }
}

type Fields = HashMap<String, String>;

pub fn parse_level(text: &str) -> Result<Level, TextError> {
    let sections = split_sections(text);
    let materials = read_materials(sections.require("materials")?)?;
    let (surfaces, colormaps) = read_georesource(sections.require("georesource")?)?;
    let sectors = read_sectors(sections.require("sectors")?)?;

    let used: BTreeSet<u32> = surfaces
        .values()
        .filter_map(|surface| surface.material)
        .collect();
    let materials = materials
        .into_iter()
        .filter(|(index, _)| used.contains(index))
        .collect();

    let templates = read_templates(sections.lines("templates"));
    let mut level = Level {
        materials,
        colormaps,
        surfaces,
        sectors,
        ..Level::default()
    };
    read_things(sections.lines("things"), &templates, &mut level)?;
    Ok(level)
}

fn read_materials(lines: &[Line<'_>]) -> Result<BTreeMap<u32, String>, TextError> {
    let groups = subsections(lines);
    let mut materials = BTreeMap::new();
    for line in groups.get("world materials").into_iter().flatten() {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        let name = record.word("material name")?;
        materials.insert(record.index, name.to_string());
    }
    Ok(materials)
}

fn read_georesource(
    lines: &[Line<'_>],
) -> Result<(BTreeMap<usize, Surface>, BTreeMap<u32, String>), TextError> {
    let groups = subsections(lines);

    let mut colormaps = BTreeMap::new();
    for line in group_lines(&groups, "world colormaps") {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        let name = record.word("colormap name")?;
        colormaps.insert(record.index, name.to_string());
    }

    let mut positions = HashMap::new();
    for line in group_lines(&groups, "world vertices") {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        positions.insert(record.index, record.vec3("vertex position")?);
    }

    let mut uvs = HashMap::new();
    for line in group_lines(&groups, "world texture vertices") {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        uvs.insert(
            record.index,
            [record.float("texture vertex")?, record.float("texture vertex")?],
        );
    }

    let mut surfaces = BTreeMap::new();
    for line in group_lines(&groups, "world surfaces") {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        if record.remaining() == 3 {
            // face normal of an already-read surface
            let normal = record.vec3("surface normal")?;
            let index = record.index as usize;
            let surface: &mut Surface = surfaces
                .get_mut(&index)
                .ok_or_else(|| record.missing("surface", index as i64))?;
            surface.normal = Some(normal);
            continue;
        }
        let surface = read_surface(&mut record, &positions, &uvs)?;
        surfaces.insert(record.index as usize, surface);
    }

    Ok((surfaces, colormaps))
}

fn group_lines<'g, 'a>(
    groups: &'g HashMap<String, Vec<Line<'a>>>,
    name: &str,
) -> &'g [Line<'a>] {
    groups.get(name).map(Vec::as_slice).unwrap_or(&[])
}

fn read_surface(
    record: &mut Record<'_>,
    positions: &HashMap<u32, [f32; 3]>,
    uvs: &HashMap<u32, [f32; 2]>,
) -> Result<Surface, TextError> {
    let material = record.int("surface material")?;
    let surface_flags = record.hex("surface flags")?;
    let face_flags = record.hex("face flags")?;
    let geometry = record.int("geometry mode")?;
    let light_mode = record.int("light mode")?;
    let _texture_mode = record.int("texture mode")?;
    let _adjoin = record.int("adjoin")?;
    let extra_light = record.float("extra light")?;
    let count = record.int("vertex count")?;
    let count = usize::try_from(count)
        .ok()
        .filter(|&count| count >= 3 && count <= record.remaining() / 2)
        .ok_or_else(|| record.malformed("vertex count"))?;

    let uv_scale = uv_scale(surface_flags);
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        pairs.push((record.int("vertex index")?, record.int("uv index")?));
    }

    let rgb = if record.remaining() >= 4 * count {
        true
    } else if record.remaining() >= count {
        false
    } else {
        return Err(record.malformed("vertex intensities"));
    };
    let mut intensities = Vec::with_capacity(count);
    for _ in 0..count {
        let color = if rgb {
            let _intensity = record.float("vertex intensity")?;
            [
                record.float("vertex red")?,
                record.float("vertex green")?,
                record.float("vertex blue")?,
            ]
        } else {
            let value = record.float("vertex intensity")?;
            [value; 3]
        };
        intensities.push(color);
    }

    let mut vertices = Vec::with_capacity(count);
    for ((position_index, uv_index), intensity) in pairs.into_iter().zip(intensities) {
        let position = u32::try_from(position_index)
            .ok()
            .and_then(|index| positions.get(&index))
            .ok_or_else(|| record.missing("vertex", i64::from(position_index)))?;
        let uv = if uv_index == -1 {
            [0.0, 0.0]
        } else {
            let uv = u32::try_from(uv_index)
                .ok()
                .and_then(|index| uvs.get(&index))
                .ok_or_else(|| record.missing("texture vertex", i64::from(uv_index)))?;
            [uv[0] * uv_scale, uv[1] * uv_scale]
        };
        let color = if light_mode == LIGHT_MODE_FULL_BRIGHT {
            [1.0; 3]
        } else {
            intensity.map(|channel| (channel + extra_light).min(1.0))
        };
        vertices.push(LevelVertex {
            position: *position,
            uv,
            color,
        });
    }

    Ok(Surface {
        material: u32::try_from(material).ok(),
        surface_flags,
        face_flags,
        geometry,
        light_mode,
        extra_light,
        vertices,
        normal: None,
    })
}

/// Texture scale selected by the three UV surface flags; they compose.
pub fn uv_scale(surface_flags: u32) -> f32 {
    let mut scale = 1.0;
    if surface_flags & SURFACE_HALF_UV != 0 {
        scale *= 0.5;
    }
    if surface_flags & SURFACE_DOUBLE_UV != 0 {
        scale *= 2.0;
    }
    if surface_flags & SURFACE_OCTUPLE_UV != 0 {
        scale *= 8.0;
    }
    scale
}

fn read_sectors(lines: &[Line<'_>]) -> Result<BTreeMap<usize, Sector>, TextError> {
    let mut sectors = BTreeMap::new();
    let mut current: Option<usize> = None;
    for line in lines {
        let tokens: Vec<&str> = line.tokens().collect();
        let keyword = tokens[0].to_ascii_uppercase();
        let next = tokens.get(1).map(|token| token.to_ascii_uppercase());
        match (keyword.as_str(), next.as_deref()) {
            ("SECTOR", _) => {
                let index = sector_value::<usize>(line, tokens.get(1))?;
                sectors.insert(index, Sector::default());
                current = Some(index);
            }
            (keyword, next) => {
                let Some(sector) = current.and_then(|index| sectors.get_mut(&index)) else {
                    continue;
                };
                match (keyword, next) {
                    ("COLORMAP", _) => {
                        sector.colormap = sector_value(line, tokens.get(1))?;
                    }
                    ("SURFACES", _) => {
                        let first: usize = sector_value(line, tokens.get(1))?;
                        let count: usize = sector_value(line, tokens.get(2))?;
                        sector.surfaces = first..first.saturating_add(count);
                    }
                    ("EXTRA", Some("LIGHT")) => {
                        sector.extra_light = sector_value(line, tokens.get(2))?;
                    }
                    ("AMBIENT", Some("LIGHT")) => {
                        sector.ambient_light = sector_value(line, tokens.get(2))?;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(sectors)
}

fn sector_value<T: std::str::FromStr>(
    line: &Line<'_>,
    token: Option<&&str>,
) -> Result<T, TextError> {
    token
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| line.malformed("sector value"))
}

/// `name base key=value...`; a template inherits the fields of a base read
/// before it. Lines whose trailing tokens are not all `key=value` (headers)
/// are skipped.
fn read_templates(lines: &[Line<'_>]) -> HashMap<String, Fields> {
    let mut templates: HashMap<String, Fields> = HashMap::new();
    for line in lines {
        let tokens: Vec<&str> = line.tokens().collect();
        if tokens.len() < 2 || !tokens[2..].iter().all(|token| token.contains('=')) {
            continue;
        }
        let name = tokens[0].to_ascii_lowercase();
        let base = tokens[1].to_ascii_lowercase();
        let mut fields = templates.get(&base).cloned().unwrap_or_default();
        fields.extend(tokens[2..].iter().filter_map(|token| split_field(token)));
        templates.insert(name, fields);
    }
    templates
}

fn split_field(token: &str) -> Option<(String, String)> {
    let (key, value) = token.split_once('=')?;
    Some((key.to_ascii_lowercase(), value.to_string()))
}

fn read_things(
    lines: &[Line<'_>],
    templates: &HashMap<String, Fields>,
    level: &mut Level,
) -> Result<(), TextError> {
    for line in lines {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        let template = record.word("thing template")?.to_ascii_lowercase();
        let _name = record.word("thing name")?;
        let position = record.vec3("thing position")?;
        let rotation = record.vec3("thing rotation")?;
        let sector = record.int("thing sector")?;
        if let Some(extra) = record.peek() {
            if !extra.contains('=') && extra.parse::<i32>().is_ok() {
                record.word("thing extra")?;
            }
        }

        let mut fields = templates.get(&template).cloned().unwrap_or_default();
        for token in record.rest() {
            let (key, value) =
                split_field(token).ok_or_else(|| record.malformed("thing field"))?;
            fields.insert(key, value);
        }

        if let Some(model) = fields.get("model3d") {
            level.models.push(ModelPlacement {
                model: model.clone(),
                position,
                rotation,
                sector: usize::try_from(sector).ok(),
            });
        }
        if fields
            .get("type")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("player"))
        {
            level.spawn_points.push(SpawnPoint { position, rotation });
        }
        if let Some(light) = light_from_fields(&fields, position) {
            level.lights.push(light);
        }
    }
    Ok(())
}

fn light_from_fields(fields: &Fields, position: [f32; 3]) -> Option<PointLight> {
    let flags = parse_hex(fields.get("thingflags")?)?;
    if flags & THING_EMITS_LIGHT == 0 {
        return None;
    }
    let light = fields
        .get("light")?
        .parse::<f32>()
        .ok()
        .filter(|light| *light > 0.0)?;
    let offset = fields
        .get("lightoffset")
        .and_then(|value| parse_vector(value))
        .unwrap_or([0.0; 3]);
    let intensity = fields
        .get("lightintensity")
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(1.0);
    let color = fields
        .get("lightcolor")
        .and_then(|value| parse_vector(value))
        .unwrap_or([1.0; 3]);
    Some(PointLight {
        position,
        offset,
        light,
        intensity,
        color,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: &str = "\
SECTION: JK
Version 1

SECTION: MATERIALS
World materials 3
0: wall.mat 1.0 1.0
1: unused.mat 1.0 1.0
2: floor.mat 1.0 1.0
end

SECTION: GEORESOURCE
World Colormaps 1
0: dflt.cmp

World vertices 5
0: 0.0 0.0 0.0
1: 1.0 0.0 0.0
2: 1.0 1.0 0.0
3: 0.0 1.0 0.0
4: 0.0 0.0 1.0

World texture vertices 2
0: 0.0 0.0
1: 16.0 32.0

World surfaces 2
0: 0 0x4 0x0 4 3 4 -1 0.25 4 0,0 1,1 2,1 3,-1 0.5 1.0 0.1 0.2
1: 2 0x210 0x2 4 1 4 -1 0.0 3 0,0 1,1 4,0 0.1 0.1 0.1 0.1 0.2 0.3 0.1 0.1 0.1 0.1 0.1 0.1
0: 0.0 0.0 1.0
1: 0.0 -1.0 0.0

Section: SECTORS
World sectors 2
SECTOR 0
FLAGS 0x0
AMBIENT LIGHT 0.25
EXTRA LIGHT 0.5
COLORMAP 0
SURFACES 0 1
SECTOR 1
COLORMAP 0
SURFACES 1 1

SECTION: TEMPLATES
World templates 3
_base none
_light _base thingflags=0x1 light=2.0
torch _light model3d=torch.3do lightoffset=(0/0/0.5)

SECTION: THINGS
World things 3
0: walkplayer player 1.0 2.0 3.0 0.0 90.0 0.0 0 thingflags=0x0 type=player
1: torch torch1 4.0 5.0 6.0 10.0 20.0 30.0 1 lightintensity=0.5
2: _base ghost 0.0 0.0 0.0 0.0 0.0 0.0 -1 7 light=4.0
end
";

    fn level() -> Level {
        parse_level(LEVEL).expect("level parse")
    }

    #[test]
    fn unused_materials_are_pruned() {
        let level = level();
        let names: Vec<&str> = level.materials.values().map(String::as_str).collect();
        assert_eq!(names, vec!["wall.mat", "floor.mat"]);
        assert_eq!(level.colormaps[&0], "dflt.cmp");
    }

    #[test]
    fn grayscale_surface_resolves_vertices() {
        let level = level();
        let surface = &level.surfaces[&0];
        assert_eq!(surface.material, Some(0));
        assert_eq!(surface.vertices.len(), 4);
        assert!(surface.is_renderable());
        assert!(!surface.is_sky());
        assert!(!surface.is_translucent());
        assert_eq!(surface.vertices[2].position, [1.0, 1.0, 0.0]);
        assert_eq!(surface.vertices[1].uv, [16.0, 32.0]);
        assert_eq!(surface.vertices[3].uv, [0.0, 0.0]);
        assert_eq!(surface.vertices[0].color, [0.75; 3]);
        assert_eq!(surface.vertices[1].color, [1.0; 3]);
        assert_eq!(surface.normal, Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn rgb_surface_and_flags() {
        let level = level();
        let surface = &level.surfaces[&1];
        assert!(surface.is_sky());
        assert!(surface.is_translucent());
        // light mode 1 is full bright
        assert!(surface.vertices.iter().all(|v| v.color == [1.0; 3]));
        // 0x10 halves the UVs
        assert_eq!(surface.vertices[1].uv, [8.0, 16.0]);
        assert_eq!(surface.normal, Some([0.0, -1.0, 0.0]));
    }

    #[test]
    fn rgb_intensities_skip_the_scalar() {
        let text = LEVEL.replace(
            "1: 2 0x210 0x2 4 1 4",
            "1: 2 0x210 0x2 4 3 4",
        );
        let level = parse_level(&text).expect("level parse");
        let colors: Vec<[f32; 3]> = level.surfaces[&1]
            .vertices
            .iter()
            .map(|v| v.color)
            .collect();
        assert_eq!(colors[0], [0.1, 0.1, 0.1]);
        assert_eq!(colors[1], [0.2, 0.3, 0.1]);
    }

    #[test]
    fn uv_scale_flags_compose() {
        assert_eq!(uv_scale(0), 1.0);
        assert_eq!(uv_scale(0x10), 0.5);
        assert_eq!(uv_scale(0x20), 2.0);
        assert_eq!(uv_scale(0x40), 8.0);
        assert_eq!(uv_scale(0x30), 1.0);
        assert_eq!(uv_scale(0x70), 8.0);
        assert_eq!(uv_scale(0x60), 16.0);
    }

    #[test]
    fn sectors_read_ranges_and_light() {
        let level = level();
        let first = &level.sectors[&0];
        assert_eq!(first.surfaces, 0..1);
        assert_eq!(first.ambient_light, 0.25);
        assert_eq!(first.extra_light, 0.5);
        let second = &level.sectors[&1];
        assert_eq!(second.surfaces, 1..2);
        assert_eq!(second.extra_light, 0.0);
        let indices: Vec<usize> = level.sector_surfaces(second).map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn things_merge_template_fields() {
        let level = level();
        assert_eq!(level.spawn_points.len(), 1);
        assert_eq!(level.spawn_points[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(level.spawn_points[0].rotation, [0.0, 90.0, 0.0]);

        assert_eq!(level.models.len(), 1);
        let torch = &level.models[0];
        assert_eq!(torch.model, "torch.3do");
        assert_eq!(torch.rotation, [10.0, 20.0, 30.0]);
        assert_eq!(torch.sector, Some(1));

        // the ghost has light but no emit flag
        assert_eq!(level.lights.len(), 1);
        let light = &level.lights[0];
        assert_eq!(light.light, 2.0);
        assert_eq!(light.intensity, 0.5);
        assert_eq!(light.origin(), [4.0, 5.0, 6.5]);
        assert_eq!(light.brightness(), [0.5; 3]);
    }

    #[test]
    fn missing_texture_vertex_fails() {
        let text = LEVEL.replace("3,-1 0.5", "3,9 0.5");
        let err = parse_level(&text).expect_err("should fail");
        assert!(matches!(
            err,
            TextError::MissingIndex {
                table: "texture vertex",
                index: 9,
                ..
            }
        ));
    }

    #[test]
    fn short_intensity_run_fails() {
        let text = LEVEL.replace("0.5 1.0 0.1 0.2\n", "0.5 1.0\n");
        assert!(matches!(
            parse_level(&text),
            Err(TextError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn missing_sector_section_fails() {
        let text = LEVEL.replace("Section: SECTORS", "Section: NOTSECTORS");
        assert!(matches!(
            parse_level(&text),
            Err(TextError::MissingSection(name)) if name == "sectors"
        ));
    }
}
