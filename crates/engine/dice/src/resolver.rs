//! Result resolution: settled orientation to face value.
//!
//! A ray is cast from the die center along the up axis, in the body's local
//! frame, against its collider mesh; the struck triangle index is looked up
//! in the collider's face map.

use crate::ids::BodyId;
use crate::notation::Sides;
use dicebox_physics::ColliderEntry;
use glam::{Quat, Vec3};
use rand::rngs::OsRng;
use rand::Rng;

/// Index of the collider triangle facing `up` for a body at `rotation`.
///
/// Falls back to the triangle whose centroid points most along `up` when the
/// ray misses (open or degenerate meshes).
pub fn read_face(entry: &ColliderEntry, rotation: Quat, up: Vec3) -> Option<u32> {
    let dir = rotation.inverse() * up;
    entry.cast_face(dir).or_else(|| facing_centroid(entry, dir))
}

fn facing_centroid(entry: &ColliderEntry, dir: Vec3) -> Option<u32> {
    (0..entry.triangles.len() as u32)
        .filter_map(|face| {
            let [a, b, c] = entry.triangle(face)?;
            let centroid = (a + b + c) / 3.0;
            Some((face, centroid.normalize_or_zero().dot(dir)))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(face, _)| face)
}

/// Raw face value of a settled body.
///
/// A face with no map entry is logged and reads as `0` so the roll can
/// still complete.
pub fn resolve(entry: &ColliderEntry, rotation: Quat, face_down: bool) -> i32 {
    let up = if face_down { Vec3::NEG_Y } else { Vec3::Y };
    let Some(face) = read_face(entry, rotation, up) else {
        tracing::warn!(die_type = %entry.die_type, "collider has no faces, defaulting to 0");
        return 0;
    };
    match entry.face_value(face) {
        Some(value) => value,
        None => {
            tracing::warn!(
                die_type = %entry.die_type,
                face,
                "mesh face was not found in face map, defaulting to 0"
            );
            0
        }
    }
}

/// d10 faces read `0` for the ten
pub fn normalize_d10(raw: i32) -> i32 {
    if raw == 0 {
        10
    } else {
        raw
    }
}

/// Combine a tens body and a ones body into a percentile result.
///
/// The ones body is a plain d10, so a `10` reading counts as `0` here.
pub fn combine_percentile(tens: i32, ones: i32) -> i32 {
    let ones = ones % 10;
    if tens == 0 && ones == 0 {
        100
    } else {
        tens + ones
    }
}

/// Final value for a single-body die
pub fn finalize(sides: Sides, raw: i32) -> i32 {
    match sides {
        Sides::Numeric(10) => normalize_d10(raw),
        Sides::Percentile if raw == 0 => 100,
        _ => raw,
    }
}

/// Uniform value for a die that bypasses the simulation, from the OS RNG
pub fn fallback_value(sides: Sides) -> i32 {
    let (min, max) = sides.range();
    if max <= min {
        return min;
    }
    OsRng.gen_range(min..=max)
}

/// Two bodies rolled as one percentile die.
///
/// Emits the combined value once, when the second member settles. Re-reads
/// after that (a body waking and settling again) are ignored.
#[derive(Debug, Clone)]
pub struct PercentilePair {
    pub tens: BodyId,
    pub ones: BodyId,
    tens_raw: Option<i32>,
    ones_raw: Option<i32>,
    emitted: bool,
}

impl PercentilePair {
    pub fn new(tens: BodyId, ones: BodyId) -> Self {
        Self {
            tens,
            ones,
            tens_raw: None,
            ones_raw: None,
            emitted: false,
        }
    }

    pub fn contains(&self, body: BodyId) -> bool {
        body == self.tens || body == self.ones
    }

    /// Other member of the pair
    pub fn partner(&self, body: BodyId) -> Option<BodyId> {
        if body == self.tens {
            Some(self.ones)
        } else if body == self.ones {
            Some(self.tens)
        } else {
            None
        }
    }

    /// Record a member's raw reading; returns the combined value when both
    /// have settled and it has not been emitted yet
    pub fn record(&mut self, body: BodyId, raw: i32) -> Option<i32> {
        if self.emitted {
            return None;
        }
        if body == self.tens {
            self.tens_raw = Some(raw);
        } else if body == self.ones {
            self.ones_raw = Some(raw);
        } else {
            return None;
        }
        let (tens, ones) = (self.tens_raw?, self.ones_raw?);
        self.emitted = true;
        Some(combine_percentile(tens, ones))
    }

    pub fn is_complete(&self) -> bool {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebox_physics::fixtures::cube_entry;
    use dicebox_physics::DieType;
    use std::collections::HashMap;
    use crate::notation::MAX_SIDES;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_reads_top_face() {
        let entry = cube_entry(DieType::D6);
        assert_eq!(resolve(&entry, Quat::IDENTITY, false), 1);
    }

    #[test]
    fn test_rotated_reads_side_face() {
        let entry = cube_entry(DieType::D6);
        // +x face turned up
        let rotation = Quat::from_rotation_z(FRAC_PI_2);
        assert_eq!(resolve(&entry, rotation, false), 2);
        // +z face turned up
        let rotation = Quat::from_rotation_x(-FRAC_PI_2);
        assert_eq!(resolve(&entry, rotation, false), 3);
    }

    #[test]
    fn test_meshless_entry_reads_facing_centroid() {
        let mut entry = cube_entry(DieType::D6);
        entry.shape = None;
        let rotation = Quat::from_rotation_z(FRAC_PI_2);
        assert_eq!(resolve(&entry, rotation, false), 2);
    }

    #[test]
    fn test_face_down_reads_bottom() {
        let entry = cube_entry(DieType::D4);
        assert_eq!(resolve(&entry, Quat::IDENTITY, true), 6);
    }

    #[test]
    fn test_missing_face_map_entry_defaults_to_zero() {
        let mut entry = cube_entry(DieType::D6);
        entry.face_map = HashMap::new();
        assert_eq!(resolve(&entry, Quat::IDENTITY, false), 0);
    }

    #[test]
    fn test_d10_zero_normalization() {
        assert_eq!(normalize_d10(0), 10);
        assert_eq!(normalize_d10(7), 7);
        assert_eq!(finalize(Sides::Numeric(10), 0), 10);
        assert_eq!(finalize(Sides::Numeric(6), 0), 0);
        assert_eq!(finalize(Sides::Percentile, 0), 100);
    }

    #[test]
    fn test_combine_percentile() {
        assert_eq!(combine_percentile(0, 0), 100);
        assert_eq!(combine_percentile(30, 7), 37);
        assert_eq!(combine_percentile(0, 5), 5);
        assert_eq!(combine_percentile(90, 0), 90);
        assert_eq!(combine_percentile(0, 10), 100);
        assert_eq!(combine_percentile(40, 10), 40);
    }

    #[test]
    fn test_pair_emits_once_after_both_settle() {
        let mut pair = PercentilePair::new(BodyId(1), BodyId(2));
        assert_eq!(pair.record(BodyId(2), 7), None);
        assert_eq!(pair.record(BodyId(1), 30), Some(37));
        assert!(pair.is_complete());
        // a re-settle must not sum again
        assert_eq!(pair.record(BodyId(1), 30), None);
        assert_eq!(pair.record(BodyId(2), 7), None);
        assert_eq!(pair.partner(BodyId(1)), Some(BodyId(2)));
        assert_eq!(pair.record(BodyId(9), 1), None);
    }

    #[test]
    fn test_fallback_in_range() {
        for _ in 0..200 {
            let v = fallback_value(Sides::Numeric(6));
            assert!((1..=6).contains(&v));
            let f = fallback_value(Sides::Fate);
            assert!((-1..=1).contains(&f));
            let p = fallback_value(Sides::Percentile);
            assert!((1..=100).contains(&p));
        }
    }

    #[test]
    fn test_fallback_at_side_limit() {
        let v = fallback_value(Sides::Numeric(MAX_SIDES));
        assert!((1..=MAX_SIDES as i32).contains(&v));
        assert_eq!(fallback_value(Sides::Numeric(1)), 1);
    }
}
