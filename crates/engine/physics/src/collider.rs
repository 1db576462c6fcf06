//! Convex-hull collider registry.
//!
//! A mesh bundle describes the collision geometry of one mesh set (for
//! example `smoothDice`) plus the face-value map used to read results back.
//! Entries are built once per mesh set and shared read-only afterwards.

use crate::die_type::DieType;
use crate::error::ColliderLoadError;
use glam::Vec3;
use parking_lot::RwLock;
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::{FeatureId, TriMesh};
use rapier3d::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Scaling applied when a collider mesh carries none
pub const DEFAULT_SCALING: [f32; 3] = [1.0, 1.0, -1.0];

/// Collider bundle as shipped next to a theme's meshes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshBundle {
    pub meshes: Vec<ColliderMesh>,
    /// Die type key (`"d6"`) to face index (as string) to face value
    #[serde(default)]
    pub collider_face_map: Option<HashMap<String, HashMap<String, i32>>>,
}

/// One collision mesh inside a [`MeshBundle`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColliderMesh {
    pub name: String,
    #[serde(default)]
    pub id: String,
    /// Flat `x, y, z` vertex list
    pub positions: Vec<f32>,
    /// Triangle list; the face index used by face maps is the triangle index
    #[serde(default)]
    pub indices: Vec<u32>,
    #[serde(default)]
    pub scaling: Option<[f32; 3]>,
    #[serde(default)]
    pub physics_mass: Option<f32>,
}

/// Cached collision shape for one `(mesh set, die type)` pair
#[derive(Debug, Clone)]
pub struct ColliderEntry {
    pub die_type: DieType,
    pub mesh_name: Arc<str>,
    /// Hull vertices with the mesh scaling already applied
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    /// Mass factor, multiplied by the configured mass when spawning
    pub mass: f32,
    pub face_map: HashMap<u32, i32>,
    /// Triangle mesh used to read the face a body rests on; `None` for
    /// meshes shipped without indices
    pub shape: Option<TriMesh>,
}

impl ColliderEntry {
    /// Build an entry from a raw bundle mesh.
    ///
    /// The hull is mirrored on x and z by the mesh scaling the same way the
    /// stock bundles expect (`[-sx, sy, -sz]`).
    pub fn from_mesh(
        mesh_name: Arc<str>,
        die_type: DieType,
        mesh: &ColliderMesh,
        face_map: HashMap<u32, i32>,
    ) -> Result<Self, ColliderLoadError> {
        let invalid = |reason: &str| ColliderLoadError::InvalidMesh {
            mesh: mesh.name.clone(),
            reason: reason.to_string(),
        };

        if mesh.positions.len() % 3 != 0 {
            return Err(invalid("position count is not a multiple of 3"));
        }
        if mesh.positions.len() < 12 {
            return Err(invalid("a convex hull needs at least 4 vertices"));
        }
        if mesh.indices.len() % 3 != 0 {
            return Err(invalid("index count is not a multiple of 3"));
        }

        let [sx, sy, sz] = mesh.scaling.unwrap_or(DEFAULT_SCALING);
        let scale = Vec3::new(-sx, sy, -sz);
        let vertices: Vec<Vec3> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]) * scale)
            .collect();

        if mesh.indices.iter().any(|&i| i as usize >= vertices.len()) {
            return Err(invalid("index out of range"));
        }
        let triangles: Vec<[u32; 3]> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        let shape = if triangles.is_empty() {
            None
        } else {
            let points = vertices.iter().map(|v| point![v.x, v.y, v.z]).collect();
            let shape = TriMesh::new(points, triangles.clone())
                .map_err(|err| invalid(&format!("{err:?}")))?;
            Some(shape)
        };

        Ok(Self {
            die_type,
            mesh_name,
            vertices,
            triangles,
            mass: mesh.physics_mass.unwrap_or_else(|| die_type.default_mass()),
            face_map,
            shape,
        })
    }

    /// Face value for a collider triangle, `None` when unmapped
    pub fn face_value(&self, face: u32) -> Option<i32> {
        self.face_map.get(&face).copied()
    }

    /// Corners of one collider triangle in the body's local frame
    pub fn triangle(&self, face: u32) -> Option<[Vec3; 3]> {
        let [a, b, c] = *self.triangles.get(face as usize)?;
        Some([
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ])
    }

    /// Triangle struck by a ray cast from the body center along `dir`, in
    /// the body's local frame.
    ///
    /// The ray starts inside the mesh, so it is cast non-solid; parry then
    /// reports back-face hits past the triangle count.
    pub fn cast_face(&self, dir: Vec3) -> Option<u32> {
        let shape = self.shape.as_ref()?;
        let ray = Ray::new(point![0.0, 0.0, 0.0], vector![dir.x, dir.y, dir.z]);
        let hit = shape.cast_local_ray_and_get_normal(&ray, Real::MAX, false)?;
        match hit.feature {
            FeatureId::Face(face) => Some(face % self.triangles.len() as u32),
            _ => None,
        }
    }

    /// Hull vertices in rapier's point type
    pub fn hull_points(&self) -> Vec<Point<Real>> {
        self.vertices
            .iter()
            .map(|v| point![v.x, v.y, v.z])
            .collect()
    }

    /// Derive a percentile (tens) collider from a d10 entry.
    ///
    /// Face values become tens: `1..9` map to `10..90` and the `10` face
    /// reads as `0`.
    fn percentile_from(d10: &ColliderEntry) -> Self {
        let face_map = d10
            .face_map
            .iter()
            .map(|(&face, &value)| (face, if value == 10 { 0 } else { value * 10 }))
            .collect();
        Self {
            die_type: DieType::D100,
            face_map,
            ..d10.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ColliderKey {
    mesh_name: Arc<str>,
    die_type: DieType,
}

/// Shared table of collider entries keyed by mesh set and die type.
///
/// Read-many; each mesh set is written once. Loading a mesh set that is
/// already present is a no-op returning the cached entries.
#[derive(Debug, Default)]
pub struct ColliderRegistry {
    entries: RwLock<HashMap<ColliderKey, Arc<ColliderEntry>>>,
}

impl ColliderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and cache every collider in `bundle` under `mesh_name`.
    ///
    /// Fails without caching anything when the bundle has no face map.
    /// When the bundle has a d10 but no d100 collider, a d100 entry is
    /// synthesized from the d10.
    pub fn load_models(
        &self,
        mesh_name: &str,
        bundle: &MeshBundle,
    ) -> Result<Vec<Arc<ColliderEntry>>, ColliderLoadError> {
        if self.has_mesh_set(mesh_name) {
            return Ok(self.entries_for(mesh_name));
        }

        let face_maps = bundle
            .collider_face_map
            .as_ref()
            .ok_or_else(|| ColliderLoadError::MissingFaceMap {
                mesh_name: mesh_name.to_string(),
            })?;
        let face_maps: HashMap<DieType, HashMap<u32, i32>> = face_maps
            .iter()
            .filter_map(|(key, faces)| {
                let die_type = key.parse().ok()?;
                let faces = faces
                    .iter()
                    .filter_map(|(face, value)| Some((face.parse().ok()?, *value)))
                    .collect();
                Some((die_type, faces))
            })
            .collect();

        let shared_name: Arc<str> = Arc::from(mesh_name);
        let mut built: HashMap<DieType, ColliderEntry> = HashMap::new();
        for mesh in &bundle.meshes {
            let Some(die_type) = DieType::from_mesh(&mesh.name, &mesh.id) else {
                tracing::debug!(mesh = %mesh.name, "skipping mesh with no die type");
                continue;
            };
            let face_map = face_maps.get(&die_type).cloned().unwrap_or_default();
            let entry = ColliderEntry::from_mesh(shared_name.clone(), die_type, mesh, face_map)?;
            built.insert(die_type, entry);
        }

        if !built.contains_key(&DieType::D100) {
            if let Some(d10) = built.get(&DieType::D10) {
                tracing::debug!(mesh_set = mesh_name, "synthesizing d100 collider from d10");
                let d100 = ColliderEntry::percentile_from(d10);
                built.insert(DieType::D100, d100);
            }
        }

        let mut entries = self.entries.write();
        // A concurrent loader may have won the race.
        if entries.keys().any(|k| &*k.mesh_name == mesh_name) {
            drop(entries);
            return Ok(self.entries_for(mesh_name));
        }

        let mut loaded = Vec::with_capacity(built.len());
        for (die_type, entry) in built {
            let entry = Arc::new(entry);
            entries.insert(
                ColliderKey {
                    mesh_name: shared_name.clone(),
                    die_type,
                },
                entry.clone(),
            );
            loaded.push(entry);
        }
        loaded.sort_by_key(|e| e.die_type);

        tracing::info!(
            mesh_set = mesh_name,
            colliders = loaded.len(),
            "loaded collider models"
        );
        Ok(loaded)
    }

    /// Decode a bundle from JSON and load it
    pub fn load_json(
        &self,
        mesh_name: &str,
        json: &str,
    ) -> Result<Vec<Arc<ColliderEntry>>, ColliderLoadError> {
        let bundle: MeshBundle = serde_json::from_str(json)?;
        self.load_models(mesh_name, &bundle)
    }

    pub fn get_collider(&self, die_type: DieType, mesh_name: &str) -> Option<Arc<ColliderEntry>> {
        let key = ColliderKey {
            mesh_name: Arc::from(mesh_name),
            die_type,
        };
        self.entries.read().get(&key).cloned()
    }

    pub fn has_mesh_set(&self, mesh_name: &str) -> bool {
        self.entries
            .read()
            .keys()
            .any(|k| &*k.mesh_name == mesh_name)
    }

    /// Die types available in a mesh set
    pub fn die_types(&self, mesh_name: &str) -> Vec<DieType> {
        let mut types: Vec<DieType> = self
            .entries
            .read()
            .keys()
            .filter(|k| &*k.mesh_name == mesh_name)
            .map(|k| k.die_type)
            .collect();
        types.sort();
        types
    }

    fn entries_for(&self, mesh_name: &str) -> Vec<Arc<ColliderEntry>> {
        let mut found: Vec<Arc<ColliderEntry>> = self
            .entries
            .read()
            .iter()
            .filter(|(k, _)| &*k.mesh_name == mesh_name)
            .map(|(_, e)| e.clone())
            .collect();
        found.sort_by_key(|e| e.die_type);
        found
    }
}

/// Build a convex-hull collider for an entry
///
/// # Arguments
/// * `entry` - Cached collider geometry
/// * `mass` - Final body mass (entry mass already multiplied by config)
/// * `friction`, `restitution` - Contact material
///
/// # Returns
/// `None` when the hull is degenerate
pub fn create_die_collider(
    entry: &ColliderEntry,
    mass: f32,
    friction: f32,
    restitution: f32,
) -> Option<Collider> {
    ColliderBuilder::convex_hull(&entry.hull_points()).map(|builder| {
        builder
            .mass(mass)
            .friction(friction)
            .restitution(restitution)
            .build()
    })
}

/// Create a box collider with the given half-extents
pub fn create_box_collider(half_extents: Vec3, friction: f32, restitution: f32) -> Collider {
    ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        .friction(friction)
        .restitution(restitution)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cube_face_map, cube_mesh};

    #[test]
    fn test_load_models_caches_entries() {
        let registry = ColliderRegistry::new();
        let bundle = MeshBundle {
            meshes: vec![cube_mesh("d6_collider")],
            collider_face_map: Some(cube_face_map(&[DieType::D6])),
        };

        let loaded = registry.load_models("smoothDice", &bundle).unwrap();
        assert_eq!(loaded.len(), 1);

        let entry = registry.get_collider(DieType::D6, "smoothDice").unwrap();
        assert_eq!(entry.face_value(0), Some(1));
        assert_eq!(entry.face_value(11), Some(4));
        assert_eq!(entry.mass, DieType::D6.default_mass());
        assert!(registry.get_collider(DieType::D6, "otherDice").is_none());
    }

    #[test]
    fn test_missing_face_map_is_fatal() {
        let registry = ColliderRegistry::new();
        let bundle = MeshBundle {
            meshes: vec![cube_mesh("d6_collider")],
            collider_face_map: None,
        };

        let err = registry.load_models("smoothDice", &bundle).unwrap_err();
        assert!(matches!(err, ColliderLoadError::MissingFaceMap { .. }));
        assert!(!registry.has_mesh_set("smoothDice"));
    }

    #[test]
    fn test_d100_synthesized_from_d10() {
        let registry = ColliderRegistry::new();
        let mut face_map = HashMap::new();
        face_map.insert(
            "d10".to_string(),
            HashMap::from([
                ("0".to_string(), 3),
                ("1".to_string(), 10),
                ("2".to_string(), 0),
            ]),
        );
        let bundle = MeshBundle {
            meshes: vec![cube_mesh("d10_collider")],
            collider_face_map: Some(face_map),
        };

        registry.load_models("smoothDice", &bundle).unwrap();
        let d100 = registry.get_collider(DieType::D100, "smoothDice").unwrap();
        assert_eq!(d100.die_type, DieType::D100);
        assert_eq!(d100.face_value(0), Some(30));
        assert_eq!(d100.face_value(1), Some(0));
        assert_eq!(d100.face_value(2), Some(0));
        assert_eq!(
            registry.die_types("smoothDice"),
            vec![DieType::D10, DieType::D100]
        );
    }

    #[test]
    fn test_reload_is_idempotent() {
        let registry = ColliderRegistry::new();
        let bundle = MeshBundle {
            meshes: vec![cube_mesh("d6_collider")],
            collider_face_map: Some(cube_face_map(&[DieType::D6])),
        };
        let first = registry.load_models("smoothDice", &bundle).unwrap();
        let second = registry.load_models("smoothDice", &bundle).unwrap();
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    #[test]
    fn test_cast_face_hits_struck_triangle() {
        let entry = crate::fixtures::cube_entry(DieType::D6);
        // lands on the first +x triangle, away from its edges
        let face = entry.cast_face(Vec3::new(1.0, 0.2, 0.1)).unwrap();
        assert_eq!(face, 4);
        assert_eq!(entry.face_value(face), Some(2));

        let face = entry.cast_face(Vec3::new(0.1, -1.0, 0.2)).unwrap();
        assert_eq!(entry.face_value(face), Some(6));
    }

    #[test]
    fn test_mesh_without_indices_has_no_shape() {
        let mut mesh = cube_mesh("d6_collider");
        mesh.indices.clear();
        let entry =
            ColliderEntry::from_mesh(Arc::from("x"), DieType::D6, &mesh, HashMap::new()).unwrap();
        assert!(entry.shape.is_none());
        assert_eq!(entry.cast_face(Vec3::Y), None);
    }

    #[test]
    fn test_rejects_bad_indices() {
        let mut mesh = cube_mesh("d6_collider");
        mesh.indices.push(99);
        mesh.indices.push(0);
        mesh.indices.push(1);
        let err =
            ColliderEntry::from_mesh(Arc::from("x"), DieType::D6, &mesh, HashMap::new()).unwrap_err();
        assert!(matches!(err, ColliderLoadError::InvalidMesh { .. }));
    }

    #[test]
    fn test_load_json() {
        let registry = ColliderRegistry::new();
        let json = r#"{
            "meshes": [{
                "name": "d4_collider",
                "positions": [0,1,0, 1,-1,0, -1,-1,0, 0,-1,1],
                "indices": [0,1,2, 0,2,3, 0,3,1, 1,3,2],
                "physicsMass": 0.5
            }],
            "colliderFaceMap": { "d4": { "0": 1, "1": 2, "2": 3, "3": 4 } }
        }"#;
        registry.load_json("tetra", json).unwrap();
        let entry = registry.get_collider(DieType::D4, "tetra").unwrap();
        assert_eq!(entry.mass, 0.5);
        assert_eq!(entry.triangles.len(), 4);
        // default scaling mirrors x
        assert_eq!(entry.vertices[1], Vec3::new(-1.0, -1.0, 0.0));
    }
}
