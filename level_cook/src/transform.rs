use compat_jk::threedo::Model;
use glam::{Mat4, Vec3};

/// Pitch, yaw, roll in degrees. Z is up: yaw turns about Z, pitch about X,
/// roll about Y. Applied roll, then yaw, then pitch.
pub fn rotation_matrix(rotation: [f32; 3]) -> Mat4 {
    let [pitch, yaw, roll] = rotation;
    Mat4::from_rotation_x(pitch.to_radians())
        * Mat4::from_rotation_z(yaw.to_radians())
        * Mat4::from_rotation_y(roll.to_radians())
}

pub fn placement_matrix(position: [f32; 3], rotation: [f32; 3]) -> Mat4 {
    Mat4::from_translation(Vec3::from(position)) * rotation_matrix(rotation)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeFrame {
    pub node: usize,
    /// Frame the node's children hang from.
    pub frame: Mat4,
    /// Frame the node's mesh vertices are placed with.
    pub mesh_transform: Mat4,
}

/// Walks the hierarchy depth-first from each root, children in file order.
pub fn node_frames(model: &Model, base: Mat4) -> Vec<NodeFrame> {
    let mut frames = Vec::with_capacity(model.nodes.len());
    let mut stack: Vec<(usize, Mat4)> = model.roots.iter().rev().map(|&root| (root, base)).collect();
    let mut visited = vec![false; model.nodes.len()];
    while let Some((id, parent)) = stack.pop() {
        if std::mem::replace(&mut visited[id], true) {
            continue;
        }
        let node = model.node(id);
        let frame = parent * placement_matrix(node.offset, node.rotation);
        frames.push(NodeFrame {
            node: id,
            frame,
            mesh_transform: frame * Mat4::from_translation(Vec3::from(node.pivot)),
        });
        stack.extend(node.children.iter().rev().map(|&child| (child, frame)));
    }
    frames
}
