//! Flat per-tick transform buffer handed between the simulation and the
//! presentation side.
//!
//! Layout: slot 0 holds the record count, followed by fixed-width records of
//! `[body_id, px, py, pz, qx, qy, qz, qw]`. A body that went to sleep this
//! tick writes `[body_id, -1, 0, 0, 0, 0, 0, 0]` instead.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of `f32` slots per body record
pub const RECORD_WIDTH: usize = 8;

/// Marker written into the position-x slot of a settled body
pub const SLEEP_SENTINEL: f32 = -1.0;

/// Largest body id that survives the round trip through an `f32` slot
pub const MAX_BODY_ID: u32 = 1 << 24;

const DEFAULT_RECORDS: usize = 64;

/// Identity of a simulated body.
///
/// Shared by the ledger, the render side and the update buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One decoded record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferRecord {
    Pose {
        id: BodyId,
        position: Vec3,
        rotation: Quat,
    },
    Asleep {
        id: BodyId,
    },
}

impl BufferRecord {
    pub fn id(&self) -> BodyId {
        match self {
            Self::Pose { id, .. } | Self::Asleep { id } => *id,
        }
    }
}

/// Owned transform buffer.
///
/// Moved by value between the two sides every tick; never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuffer {
    data: Vec<f32>,
}

impl Default for UpdateBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECORDS)
    }
}

impl UpdateBuffer {
    /// Buffer able to hold `records` bodies without growing.
    ///
    /// Slot 0 starts at `-1` so a consumer can tell a fresh buffer from an
    /// empty tick.
    pub fn with_capacity(records: usize) -> Self {
        let mut data = vec![0.0; 1 + records * RECORD_WIDTH];
        data[0] = -1.0;
        Self { data }
    }

    /// Wrap a raw slice received from elsewhere (e.g. a JS `Float32Array`)
    pub fn from_vec(mut data: Vec<f32>) -> Self {
        if data.is_empty() {
            data.push(-1.0);
        }
        Self { data }
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Records the buffer can hold without reallocating
    pub fn capacity(&self) -> usize {
        (self.data.len() - 1) / RECORD_WIDTH
    }

    /// Start a tick that will write `count` records, growing if needed
    pub fn begin(&mut self, count: usize) {
        let needed = 1 + count * RECORD_WIDTH;
        if self.data.len() < needed {
            self.data.resize(needed, 0.0);
        }
        self.data[0] = count as f32;
    }

    /// Write a live body's transform into record `slot`
    pub fn write_pose(&mut self, slot: usize, id: BodyId, position: Vec3, rotation: Quat) {
        let j = slot * RECORD_WIDTH + 1;
        self.data[j..j + RECORD_WIDTH].copy_from_slice(&[
            id.0 as f32,
            position.x,
            position.y,
            position.z,
            rotation.x,
            rotation.y,
            rotation.z,
            rotation.w,
        ]);
    }

    /// Flag record `slot` as a body that settled this tick
    pub fn write_asleep(&mut self, slot: usize, id: BodyId) {
        let j = slot * RECORD_WIDTH + 1;
        self.data[j..j + RECORD_WIDTH].fill(0.0);
        self.data[j] = id.0 as f32;
        self.data[j + 1] = SLEEP_SENTINEL;
    }

    /// Record count written by the last tick, zero for a fresh buffer
    pub fn len(&self) -> usize {
        let count = self.data[0];
        if count.is_finite() && count > 0.0 {
            (count as usize).min(self.capacity())
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero every slot
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Decode the records of the last tick
    pub fn records(&self) -> impl Iterator<Item = BufferRecord> + '_ {
        self.data[1..]
            .chunks_exact(RECORD_WIDTH)
            .take(self.len())
            .filter_map(|r| {
                if !(r[0].is_finite() && r[0] >= 0.0) {
                    return None;
                }
                let id = BodyId(r[0] as u32);
                if r[1] == SLEEP_SENTINEL {
                    Some(BufferRecord::Asleep { id })
                } else {
                    Some(BufferRecord::Pose {
                        id,
                        position: Vec3::new(r[1], r[2], r[3]),
                        rotation: Quat::from_xyzw(r[4], r[5], r[6], r[7]),
                    })
                }
            })
    }
}
