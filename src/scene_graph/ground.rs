use glam::{Vec2, Vec3};

use crate::asset::model::{Model, ModelPrimitive, Vertex};

/// A `width` × `depth` grid lying flat in XZ, centred on the origin, facing +Y.
pub fn plane_geometry(width: f32, depth: f32, width_segments: u32, depth_segments: u32) -> Model {
    let seg_x = width_segments.max(1);
    let seg_z = depth_segments.max(1);
    let cell_w = width / seg_x as f32;
    let cell_d = depth / seg_z as f32;
    let row = seg_x + 1;

    let mut vertices = Vec::with_capacity(((seg_x + 1) * (seg_z + 1)) as usize);
    for iz in 0..=seg_z {
        let z = iz as f32 * cell_d - depth * 0.5;
        for ix in 0..=seg_x {
            let x = ix as f32 * cell_w - width * 0.5;
            vertices.push(Vertex::new(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new(ix as f32 / seg_x as f32, 1.0 - iz as f32 / seg_z as f32),
            ));
        }
    }

    let mut indices = Vec::with_capacity((seg_x * seg_z * 6) as usize);
    for iz in 0..seg_z {
        for ix in 0..seg_x {
            let a = ix + row * iz;
            let b = ix + row * (iz + 1);
            let c = ix + 1 + row * (iz + 1);
            let d = ix + 1 + row * iz;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    Model {
        name: "Ground".to_string(),
        primitives: vec![ModelPrimitive {
            index: 0,
            vertices,
            indices,
            material: None,
        }],
        skinned: false,
    }
}
