//! Test fixtures: a unit cube standing in for every die shape.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to dependents.

use crate::collider::{ColliderEntry, ColliderMesh, MeshBundle};
use crate::die_type::DieType;
use std::collections::HashMap;
use std::sync::Arc;

/// Mesh set name the fixtures register under
pub const CUBE_MESH_SET: &str = "cube";

/// Per-face values in triangle-pair order: +y, -y, +x, -x, +z, -z
pub const CUBE_VALUES: [i32; 6] = [1, 6, 2, 5, 3, 4];

/// Unit cube collider, scaling chosen so the hull is not mirrored.
/// Triangles 0..12 come in pairs per face, in [`CUBE_VALUES`] order.
pub fn cube_mesh(name: &str) -> ColliderMesh {
    ColliderMesh {
        name: name.to_string(),
        id: String::new(),
        positions: vec![
            -0.5, -0.5, -0.5, 0.5, -0.5, -0.5, 0.5, 0.5, -0.5, -0.5, 0.5, -0.5, //
            -0.5, -0.5, 0.5, 0.5, -0.5, 0.5, 0.5, 0.5, 0.5, -0.5, 0.5, 0.5,
        ],
        indices: vec![
            3, 2, 6, 3, 6, 7, // +y
            0, 1, 5, 0, 5, 4, // -y
            1, 2, 6, 1, 6, 5, // +x
            0, 3, 7, 0, 7, 4, // -x
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 2, 0, 2, 3, // -z
        ],
        scaling: Some([-1.0, 1.0, -1.0]),
        physics_mass: None,
    }
}

fn cube_faces() -> HashMap<u32, i32> {
    (0..12u32)
        .map(|tri| (tri, CUBE_VALUES[tri as usize / 2]))
        .collect()
}

/// Bundle face map giving every listed die type the cube's faces
pub fn cube_face_map(types: &[DieType]) -> HashMap<String, HashMap<String, i32>> {
    types
        .iter()
        .map(|t| {
            let faces = cube_faces()
                .into_iter()
                .map(|(face, value)| (face.to_string(), value))
                .collect();
            (t.to_string(), faces)
        })
        .collect()
}

/// Bundle with a cube collider for each listed die type
pub fn cube_bundle(types: &[DieType]) -> MeshBundle {
    MeshBundle {
        meshes: types
            .iter()
            .map(|t| cube_mesh(&format!("{t}_collider")))
            .collect(),
        collider_face_map: Some(cube_face_map(types)),
    }
}

/// Ready-built cube entry for `die_type`
///
/// # Panics
/// Never for the built-in cube; the mesh is known valid.
pub fn cube_entry(die_type: DieType) -> ColliderEntry {
    let mesh = cube_mesh(&format!("{die_type}_collider"));
    ColliderEntry::from_mesh(Arc::from(CUBE_MESH_SET), die_type, &mesh, cube_faces())
        .expect("cube mesh is valid")
}
