use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use itertools::izip;

use crate::asset::Buffers;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            joints: [0; 4],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

pub struct ModelPrimitive {
    pub index: usize,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Material index within the source document.
    pub material: Option<usize>,
}

pub struct Model {
    pub name: String,
    pub primitives: Vec<ModelPrimitive>,
    pub skinned: bool,
}

impl Model {
    pub fn from_gltf(
        name: impl Into<String>,
        mesh: gltf::Mesh,
        buffers: Buffers,
    ) -> anyhow::Result<Model> {
        let mut model = Model {
            name: name.into(),
            primitives: Vec::new(),
            skinned: false,
        };

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                anyhow::bail!(
                    "Unsupported primitive mode in {}: {:?}",
                    model.name,
                    primitive.mode()
                );
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d[..]));

            let positions = reader
                .read_positions()
                .ok_or_else(|| anyhow::anyhow!("Primitive without positions in {}", model.name))?
                .map(Vec3::from)
                .collect::<Vec<Vec3>>();

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect::<Vec<u32>>(),
                None => (0..positions.len() as u32).collect(),
            };

            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                anyhow::bail!("Index {} out of range in {}", bad, model.name);
            }

            let normals = match reader.read_normals() {
                Some(normals) => normals.map(Vec3::from).collect(),
                None => compute_normals(&positions, &indices),
            };

            let tex_coords = match reader.read_tex_coords(0) {
                Some(tex_coords) => tex_coords.into_f32().map(Vec2::from).collect(),
                None => vec![Vec2::ZERO; positions.len()],
            };

            let mut vertices = izip!(positions, normals, tex_coords)
                .map(|(position, normal, tex_coords)| Vertex::new(position, normal, tex_coords))
                .collect::<Vec<Vertex>>();

            if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
                model.skinned = true;
                for (vertex, joints, weights) in
                    izip!(vertices.iter_mut(), joints.into_u16(), weights.into_f32())
                {
                    vertex.joints = joints;
                    vertex.weights = normalize_weights(weights);
                }
            }

            model.primitives.push(ModelPrimitive {
                index: primitive.index(),
                vertices,
                indices,
                material: primitive.material().index(),
            });
        }

        if model.primitives.is_empty() {
            anyhow::bail!("Mesh without primitives: {}", model.name);
        }

        Ok(model)
    }
}

/// Area-weighted vertex normals for meshes exported without them.
pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }

    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

fn normalize_weights(weights: [f32; 4]) -> [f32; 4] {
    let sum: f32 = weights.iter().sum();
    if sum <= f32::EPSILON {
        return [1.0, 0.0, 0.0, 0.0];
    }
    weights.map(|w| w / sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_normals_face_up_for_ccw_floor() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let normals = compute_normals(&positions, &[0, 1, 2]);

        for normal in normals {
            assert!((normal - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn unreferenced_vertices_get_fallback_normal() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::ONE];
        let normals = compute_normals(&positions, &[0, 2, 1]);
        assert_eq!(normals[3], Vec3::Y);
    }

    #[test]
    fn weights_are_normalized() {
        assert_eq!(normalize_weights([2.0, 2.0, 0.0, 0.0]), [0.5, 0.5, 0.0, 0.0]);
        assert_eq!(normalize_weights([0.0; 4]), [1.0, 0.0, 0.0, 0.0]);
    }
}
