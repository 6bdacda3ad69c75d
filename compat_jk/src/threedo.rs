//! Hierarchical model (`.3do`) decoder.

use std::collections::{BTreeMap, HashMap};

use crate::jkl::{FACE_TRANSLUCENT, GEO_TEXTURED};
use crate::text::{count_header, split_sections, Line, Record, TextError};

pub const FACE_TWO_SIDED: u32 = 0x1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
    pub normal: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub material: Option<u32>,
    pub face_type: u32,
    pub geometry: i32,
    pub extra_light: f32,
    pub vertices: Vec<ModelVertex>,
}

impl Face {
    pub fn is_translucent(&self) -> bool {
        self.face_type & FACE_TRANSLUCENT != 0
    }

    pub fn is_two_sided(&self) -> bool {
        self.face_type & FACE_TWO_SIDED != 0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Two-sided faces are followed by their reversed back face.
    pub faces: Vec<Face>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub mesh: Option<u32>,
    pub offset: [f32; 3],
    /// Pitch, yaw, roll in degrees.
    pub rotation: [f32; 3],
    pub pivot: [f32; 3],
    /// Arena ids of the child nodes.
    pub children: Vec<usize>,
}

/// A model keeps only its most detailed geoset. Nodes live in an arena;
/// `roots` and `Node::children` hold arena ids.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub materials: BTreeMap<u32, String>,
    pub meshes: BTreeMap<u32, Mesh>,
    pub nodes: Vec<Node>,
    pub roots: Vec<usize>,
}

impl Model {
    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn mesh_of(&self, node: &Node) -> Option<&Mesh> {
        node.mesh.and_then(|mesh| self.meshes.get(&mesh))
    }
}

pub fn parse_model(text: &str) -> Result<Model, TextError> {
    let sections = split_sections(text);
    let materials = read_materials(sections.lines("modelresource"))?;
    let mut geosets = read_geometry(sections.require("geometrydef")?)?;
    let (nodes, roots) = read_hierarchy(sections.require("hierarchydef")?)?;
    let meshes = geosets.remove(&0).ok_or(TextError::MissingGeoset(0))?;
    Ok(Model {
        materials,
        meshes,
        nodes,
        roots,
    })
}

fn read_materials(lines: &[Line<'_>]) -> Result<BTreeMap<u32, String>, TextError> {
    let mut materials = BTreeMap::new();
    for line in lines {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        let name = record.word("material name")?;
        materials.insert(record.index, name.to_string());
    }
    Ok(materials)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Table {
    Vertices,
    TextureVertices,
    VertexNormals,
    Faces,
    FaceNormals,
}

impl Table {
    fn from_header(text: &str) -> Option<Self> {
        let upper = text.to_ascii_uppercase();
        if upper.starts_with("TEXTURE VERTICES") {
            Some(Table::TextureVertices)
        } else if upper.starts_with("VERTEX NORMALS") {
            Some(Table::VertexNormals)
        } else if upper.starts_with("FACE NORMALS") {
            Some(Table::FaceNormals)
        } else if upper.starts_with("VERTICES") {
            Some(Table::Vertices)
        } else if upper.starts_with("FACES") {
            Some(Table::Faces)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct MeshTables {
    positions: HashMap<u32, [f32; 4]>,
    uvs: HashMap<u32, [f32; 2]>,
    normals: HashMap<u32, [f32; 3]>,
}

type Geosets = BTreeMap<u32, BTreeMap<u32, Mesh>>;

fn read_geometry(lines: &[Line<'_>]) -> Result<Geosets, TextError> {
    let mut geosets = Geosets::new();
    let mut geoset: Option<u32> = None;
    let mut mesh: Option<(u32, MeshTables)> = None;
    let mut table: Option<Table> = None;

    for line in lines {
        if let Some(mut record) = Record::parse(line) {
            let Some(current) = table else {
                continue;
            };
            let Some((mesh_id, tables)) = mesh.as_mut() else {
                return Err(line.malformed("record outside of a mesh"));
            };
            match current {
                Table::Vertices => {
                    let position = record.vec3("vertex position")?;
                    let intensity = record.float("vertex intensity")?;
                    tables.positions.insert(
                        record.index,
                        [position[0], position[1], position[2], intensity],
                    );
                }
                Table::TextureVertices => {
                    tables.uvs.insert(
                        record.index,
                        [record.float("texture vertex")?, record.float("texture vertex")?],
                    );
                }
                Table::VertexNormals => {
                    tables
                        .normals
                        .insert(record.index, record.vec3("vertex normal")?);
                }
                Table::Faces => {
                    let face = read_face(&mut record, tables)?;
                    let back = face.is_two_sided().then(|| back_face(&face));
                    let faces = &mut geosets
                        .entry(geoset.unwrap_or(0))
                        .or_default()
                        .entry(*mesh_id)
                        .or_default()
                        .faces;
                    faces.push(face);
                    faces.extend(back);
                }
                Table::FaceNormals => {}
            }
            continue;
        }

        if let Some(header) = Table::from_header(line.text) {
            table = Some(header);
            continue;
        }
        let Some((label, value)) = count_header(line.text) else {
            continue;
        };
        table = None;
        let Ok(value) = u32::try_from(value) else {
            continue;
        };
        match label.as_str() {
            "geoset" => {
                geosets.insert(value, BTreeMap::new());
                geoset = Some(value);
                mesh = None;
            }
            "mesh" => {
                let Some(geoset) = geoset else {
                    return Err(line.malformed("mesh outside of a geoset"));
                };
                geosets
                    .entry(geoset)
                    .or_default()
                    .insert(value, Mesh::default());
                mesh = Some((value, MeshTables::default()));
            }
            _ => {}
        }
    }
    Ok(geosets)
}

fn read_face(record: &mut Record<'_>, tables: &MeshTables) -> Result<Face, TextError> {
    let material = record.int("face material")?;
    let face_type = record.hex("face type")?;
    let geometry = record.int("geometry mode")?;
    let _light_mode = record.int("light mode")?;
    let _texture_mode = record.int("texture mode")?;
    let extra_light = record.float("extra light")?;
    let count = record.int("vertex count")?;
    let count = usize::try_from(count)
        .ok()
        .filter(|&count| count >= 3 && count <= record.remaining() / 2)
        .ok_or_else(|| record.malformed("vertex count"))?;

    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        let position_index = record.int("vertex index")?;
        let uv_index = record.int("uv index")?;
        let key = u32::try_from(position_index)
            .map_err(|_| record.missing("vertex", i64::from(position_index)))?;
        let position = tables
            .positions
            .get(&key)
            .ok_or_else(|| record.missing("vertex", i64::from(position_index)))?;
        let normal = tables
            .normals
            .get(&key)
            .ok_or_else(|| record.missing("vertex normal", i64::from(position_index)))?;
        // Untextured faces and dangling uv indices read as the origin.
        let uv = if geometry == GEO_TEXTURED {
            u32::try_from(uv_index)
                .ok()
                .and_then(|index| tables.uvs.get(&index))
                .copied()
                .unwrap_or([0.0, 0.0])
        } else {
            [0.0, 0.0]
        };
        vertices.push(ModelVertex {
            position: [position[0], position[1], position[2]],
            uv,
            color: [extra_light + position[3]; 3],
            normal: *normal,
        });
    }

    Ok(Face {
        material: u32::try_from(material).ok(),
        face_type,
        geometry,
        extra_light,
        vertices,
    })
}

/// Same polygon wound the other way: `v0, vN-1, ..., v1`, normals negated.
fn back_face(face: &Face) -> Face {
    let flip = |vertex: &ModelVertex| ModelVertex {
        normal: vertex.normal.map(|c| -c),
        ..*vertex
    };
    let mut vertices = Vec::with_capacity(face.vertices.len());
    vertices.push(flip(&face.vertices[0]));
    vertices.extend(face.vertices[1..].iter().rev().map(flip));
    Face {
        vertices,
        ..face.clone()
    }
}

fn read_hierarchy(lines: &[Line<'_>]) -> Result<(Vec<Node>, Vec<usize>), TextError> {
    struct Parsed {
        index: u32,
        line: usize,
        parent: i32,
        node: Node,
    }

    let mut parsed = Vec::new();
    for line in lines {
        let Some(mut record) = Record::parse(line) else {
            continue;
        };
        let _flags = record.hex("node flags")?;
        let _kind = record.hex("node type")?;
        let mesh = record.int("node mesh")?;
        let parent = record.int("node parent")?;
        let _child = record.int("node child")?;
        let _sibling = record.int("node sibling")?;
        let _children = record.int("node child count")?;
        let offset = record.vec3("node offset")?;
        let rotation = record.vec3("node rotation")?;
        let pivot = record.vec3("node pivot")?;
        let name = record.rest().join(" ");
        parsed.push(Parsed {
            index: record.index,
            line: record.line,
            parent,
            node: Node {
                name,
                mesh: u32::try_from(mesh).ok(),
                offset,
                rotation,
                pivot,
                children: Vec::new(),
            },
        });
    }

    parsed.sort_by_key(|entry| entry.index);
    let ids: HashMap<u32, usize> = parsed
        .iter()
        .enumerate()
        .map(|(id, entry)| (entry.index, id))
        .collect();

    let mut roots = Vec::new();
    let mut links = Vec::new();
    for (id, entry) in parsed.iter().enumerate() {
        match u32::try_from(entry.parent) {
            Err(_) => roots.push(id),
            Ok(parent) => {
                let parent_id = ids.get(&parent).ok_or(TextError::MissingIndex {
                    line: entry.line,
                    table: "node",
                    index: i64::from(entry.parent),
                })?;
                links.push((*parent_id, id));
            }
        }
    }
    if roots.is_empty() {
        return Err(TextError::NoRootNode);
    }

    let mut nodes: Vec<Node> = parsed.into_iter().map(|entry| entry.node).collect();
    for (parent, child) in links {
        nodes[parent].children.push(child);
    }
    Ok((nodes, roots))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "\
SECTION: HEADER
3DO 2.1

SECTION: MODELRESOURCE
MATERIALS 2
0: body.mat
1: head.mat

SECTION: GEOMETRYDEF
RADIUS 0.5
GEOSETS 2
GEOSET 0
MESHES 2

MESH 0
NAME body
RADIUS 0.2
GEOMETRYMODE 4
VERTICES 4
0: 0.0 0.0 0.0 0.25
1: 1.0 0.0 0.0 0.2
2: 1.0 1.0 0.0 0.3
3: 0.0 1.0 0.0 0.4
TEXTURE VERTICES 2
0: 0.0 0.0
1: 8.0 8.0
VERTEX NORMALS
0: 0.0 0.0 1.0
1: 0.0 0.0 1.0
2: 0.0 0.0 1.0
3: 0.0 0.0 1.0
FACES 2
0: 0 0x1 4 3 0 0.5 4 0, 0 1, 1 2, 1 3, 7
1: 1 0x2 3 3 0 0.0 3 0, 1 1, 1 2, 1
FACE NORMALS
0: 0.0 0.0 1.0
1: 0.0 0.0 1.0

MESH 1
NAME head
VERTICES 3
0: 0.0 0.0 2.0 0.0
1: 1.0 0.0 2.0 0.0
2: 0.0 1.0 2.0 0.0
TEXTURE VERTICES 0
VERTEX NORMALS
0: 0.0 1.0 0.0
1: 0.0 1.0 0.0
2: 0.0 1.0 0.0
FACES 1
0: 1 0x0 4 3 0 0.0 3 0, 0 1, 0 2, 0

GEOSET 1
MESHES 1
MESH 0
VERTICES 1
0: 9.0 9.0 9.0 0.0

SECTION: HIERARCHYDEF
HIERARCHY NODES 3
0: 0x0 0x1 0 -1 1 -1 1 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 body
1: 0x0 0x1 1 0 -1 2 0 0.0 0.0 1.0 0.0 90.0 0.0 0.0 0.0 0.1 head
2: 0x0 0x1 -1 0 -1 -1 0 0.5 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 left hand
";

    fn model() -> Model {
        parse_model(MODEL).expect("model parse")
    }

    #[test]
    fn keeps_only_first_geoset() {
        let model = model();
        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.materials[&1], "head.mat");
        let body = &model.meshes[&0];
        // face 0 is two-sided and gains a back face
        assert_eq!(body.faces.len(), 3);
    }

    #[test]
    fn face_vertices_resolve_tables() {
        let model = model();
        let face = &model.meshes[&0].faces[0];
        assert_eq!(face.material, Some(0));
        assert!(face.is_two_sided());
        assert!(!face.is_translucent());
        assert_eq!(face.vertices.len(), 4);
        assert_eq!(face.vertices[2].position, [1.0, 1.0, 0.0]);
        assert_eq!(face.vertices[1].uv, [8.0, 8.0]);
        // dangling uv index
        assert_eq!(face.vertices[3].uv, [0.0, 0.0]);
        assert_eq!(face.vertices[0].color, [0.75; 3]);
        assert_eq!(face.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn two_sided_face_gets_reversed_back_face() {
        let model = model();
        let faces = &model.meshes[&0].faces;
        let (front, back) = (&faces[0], &faces[1]);
        assert_eq!(front.vertices.len() + back.vertices.len(), 8);
        let order: Vec<[f32; 3]> = back.vertices.iter().map(|v| v.position).collect();
        assert_eq!(
            order,
            vec![
                front.vertices[0].position,
                front.vertices[3].position,
                front.vertices[2].position,
                front.vertices[1].position,
            ]
        );
        assert!(back.vertices.iter().all(|v| v.normal == [0.0, 0.0, -1.0]));
        assert_eq!(back.vertices[1].uv, front.vertices[3].uv);
    }

    #[test]
    fn untextured_face_has_zero_uvs() {
        let model = model();
        let face = &model.meshes[&0].faces[2];
        assert!(face.is_translucent());
        assert_eq!(face.geometry, 3);
        assert!(face.vertices.iter().all(|v| v.uv == [0.0, 0.0]));
    }

    #[test]
    fn hierarchy_builds_arena_tree() {
        let model = model();
        assert_eq!(model.roots, vec![0]);
        let root = model.node(0);
        assert_eq!(root.name, "body");
        assert_eq!(root.children, vec![1, 2]);
        let head = model.node(1);
        assert_eq!(head.mesh, Some(1));
        assert_eq!(head.rotation, [0.0, 90.0, 0.0]);
        assert_eq!(head.pivot, [0.0, 0.0, 0.1]);
        assert_eq!(model.mesh_of(head).map(|m| m.faces.len()), Some(1));
        let hand = model.node(2);
        assert_eq!(hand.name, "left hand");
        assert!(model.mesh_of(hand).is_none());
    }

    #[test]
    fn missing_root_fails() {
        let text = MODEL.replace("0: 0x0 0x1 0 -1 1", "0: 0x0 0x1 0 2 1");
        assert!(matches!(parse_model(&text), Err(TextError::NoRootNode)));
    }

    #[test]
    fn missing_first_geoset_fails() {
        let text = MODEL.replace("GEOSET 0", "GEOSET 2");
        assert!(matches!(
            parse_model(&text),
            Err(TextError::MissingGeoset(0))
        ));
    }

    #[test]
    fn missing_vertex_normal_fails() {
        let text = MODEL.replace("3: 0.0 0.0 1.0\nFACES 2", "FACES 2");
        assert!(matches!(
            parse_model(&text),
            Err(TextError::MissingIndex {
                table: "vertex normal",
                index: 3,
                ..
            })
        ));
    }
}
