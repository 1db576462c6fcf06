//! Dice simulation step: spawning, throwing, sleep detection and the
//! per-tick transform buffer.

use crate::buffer::{BodyId, UpdateBuffer};
use crate::collider::{create_die_collider, ColliderRegistry};
use crate::config::SimulationConfig;
use crate::die_type::DieType;
use crate::error::{ColliderLoadError, Result, SimulationError};
use crate::play_box::PlayBox;
use crate::world::PhysicsWorld;
use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use std::sync::Arc;

/// Distance kept between the toss origin and the tray walls
const EDGE_OFFSET: f32 = 2.0;

/// Offset from the body center where the spin impulse is applied
const SPIN_LEVER: f32 = 4.0;

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[derive(Debug)]
struct SimBody {
    id: BodyId,
    handle: RigidBodyHandle,
    die_type: DieType,
    /// Mass factor of the collider, scales the spin impulse
    mass_factor: f32,
    /// Milliseconds left before the body is forced asleep
    timeout: f32,
}

/// Rigid-body simulation of the dice tray.
///
/// Bodies live in one of two sets: `live` bodies are stepped and reported
/// every tick, `settled` bodies are frozen static geometry kept around so
/// later dice can land on them.
pub struct DiceSimulation {
    world: PhysicsWorld,
    registry: Arc<ColliderRegistry>,
    play_box: PlayBox,
    config: SimulationConfig,
    live: Vec<SimBody>,
    settled: Vec<SimBody>,
    start_position: Vec3,
    aspect: f32,
    rng: StdRng,
    seeded: bool,
}

impl DiceSimulation {
    /// Create a simulation for a `width` x `height` surface
    ///
    /// # Arguments
    /// * `config` - Physics parameters, validated here
    /// * `registry` - Shared collider registry
    /// * `width`, `height` - Surface size; only the aspect ratio is used
    pub fn new(
        config: SimulationConfig,
        registry: Arc<ColliderRegistry>,
        width: f32,
        height: f32,
    ) -> Result<Self> {
        config.validate()?;

        let mut sim = Self {
            world: PhysicsWorld::new(config.gravity_vector()),
            registry,
            play_box: PlayBox::new(),
            config,
            live: Vec::new(),
            settled: Vec::new(),
            start_position: Vec3::ZERO,
            aspect: aspect_of(width, height),
            rng: StdRng::from_entropy(),
            seeded: false,
        };
        sim.rebuild_box();
        sim.set_start_position();
        Ok(sim)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ColliderRegistry> {
        &self.registry
    }

    /// Spawn a die body at the current start position and throw it
    ///
    /// # Arguments
    /// * `die_type` - Collider to use
    /// * `mesh_name` - Mesh set the collider belongs to
    /// * `id` - Identity reported back through the update buffer
    ///
    /// # Returns
    /// The body id, or `UnknownCollider` when the registry has no entry.
    /// A failed add leaves every other body untouched.
    pub fn add_body(&mut self, die_type: DieType, mesh_name: &str, id: BodyId) -> Result<BodyId> {
        let Some(entry) = self.registry.get_collider(die_type, mesh_name) else {
            tracing::warn!(%die_type, mesh_name, "collider was not found");
            return Err(SimulationError::UnknownCollider {
                die_type,
                mesh_name: mesh_name.to_string(),
            });
        };

        let mass = entry.mass * self.config.mass;
        let collider = create_die_collider(
            &entry,
            mass,
            self.config.friction,
            self.config.restitution,
        )
        .ok_or_else(|| ColliderLoadError::InvalidMesh {
            mesh: format!("{mesh_name}/{die_type}"),
            reason: "degenerate convex hull".to_string(),
        })?;

        let rotation = UnitQuaternion::new_normalize(Quaternion::new(
            -1.0,
            lerp(-1.5, 1.5, self.rng.gen()),
            lerp(-1.5, 1.5, self.rng.gen()),
            lerp(-1.5, 1.5, self.rng.gen()),
        ));
        let start = self.start_position;
        let pose = Isometry::from_parts(Translation3::new(start.x, start.y, start.z), rotation);

        let body = RigidBodyBuilder::dynamic()
            .pose(pose)
            .linear_damping(self.config.linear_damping)
            .angular_damping(self.config.angular_damping)
            .can_sleep(false)
            .ccd_enabled(true)
            .build();
        let handle = self.world.add_rigid_body(body);
        self.world.add_collider(collider, handle);

        self.live.push(SimBody {
            id,
            handle,
            die_type,
            mass_factor: entry.mass,
            timeout: self.config.settle_timeout,
        });
        self.apply_initial_impulse(id)?;

        tracing::debug!(%id, %die_type, "added die body");
        Ok(id)
    }

    /// Throw a live body away from its start corner and spin it
    pub fn apply_initial_impulse(&mut self, id: BodyId) -> Result<()> {
        let (handle, mass_factor) = self
            .live
            .iter()
            .find(|b| b.id == id)
            .map(|b| (b.handle, b.mass_factor))
            .ok_or(SimulationError::UnknownBody(id))?;

        let start = self.start_position;
        let throw = self.config.throw_force;
        let spin = self.config.spin_force;
        let rng = &mut self.rng;

        let linvel = vector![
            lerp(-start.x * 0.5, -start.x * throw, rng.gen()),
            lerp(-start.y, -start.y * 2.0, rng.gen()),
            lerp(-start.z * 0.5, -start.z * throw, rng.gen())
        ];
        let impulse = vector![
            lerp(-spin, spin, rng.gen()),
            lerp(-spin, spin, rng.gen()),
            lerp(-spin, spin, rng.gen())
        ] * mass_factor;

        let body = self
            .world
            .get_rigid_body_mut(handle)
            .ok_or(SimulationError::UnknownBody(id))?;
        body.set_linvel(linvel, true);
        let lever = body.translation() + vector![SPIN_LEVER, SPIN_LEVER, SPIN_LEVER];
        body.apply_impulse_at_point(impulse, point![lever.x, lever.y, lever.z], true);
        Ok(())
    }

    /// Advance the world by `delta_ms` and report every live body.
    ///
    /// The buffer is taken by value and handed back filled; slot 0 holds the
    /// number of bodies that were live when the tick started. Bodies below
    /// both sleep thresholds, or whose settle timeout ran out, are frozen,
    /// moved to the settled set and written with the sleep sentinel.
    pub fn step(&mut self, delta_ms: f32, mut buffer: UpdateBuffer) -> UpdateBuffer {
        let delta_ms = delta_ms.max(0.0);
        self.world.advance(
            delta_ms / 1000.0,
            self.config.fixed_step,
            self.config.max_substeps,
        );

        buffer.begin(self.live.len());

        // backwards so removing index i keeps lower slots stable
        for i in (0..self.live.len()).rev() {
            let (id, handle) = (self.live[i].id, self.live[i].handle);
            let Some(still) = self.world.is_resting(
                handle,
                self.config.linear_sleep_epsilon,
                self.config.angular_sleep_epsilon,
            ) else {
                buffer.write_asleep(i, id);
                self.live.remove(i);
                continue;
            };
            let timed_out = self.live[i].timeout <= 0.0;

            if still || timed_out {
                self.world.freeze(handle);
                buffer.write_asleep(i, id);
                tracing::debug!(%id, timed_out = !still, "die settled");
                let settled = self.live.remove(i);
                self.settled.push(settled);
                continue;
            }

            self.live[i].timeout -= delta_ms;
            if let Some((position, rotation)) = self.world.pose(handle) {
                buffer.write_pose(i, id, position, rotation);
            }
        }

        buffer
    }

    /// Remove a body, settled or still rolling
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        let body = if let Some(i) = self.settled.iter().position(|b| b.id == id) {
            self.settled.remove(i)
        } else if let Some(i) = self.live.iter().position(|b| b.id == id) {
            self.live.remove(i)
        } else {
            return Err(SimulationError::UnknownBody(id));
        };
        self.world.remove_rigid_body(body.handle);
        Ok(())
    }

    /// Remove every die body; the tray stays
    pub fn clear(&mut self) {
        for body in self.live.drain(..).chain(self.settled.drain(..)) {
            self.world.remove_rigid_body(body.handle);
        }
        self.world.reset_clock();
    }

    /// Rebuild the tray for a new surface size
    pub fn resize(&mut self, width: f32, height: f32) {
        self.aspect = aspect_of(width, height);
        self.rebuild_box();
    }

    /// Replace the configuration, rebuilding the tray and gravity
    pub fn update_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.world.set_gravity(self.config.gravity_vector());
        self.rebuild_box();
        Ok(())
    }

    /// Pick a new toss origin.
    ///
    /// Chooses an axis to toss along, then an edge on that axis, then a
    /// random point along the perpendicular edge.
    pub fn set_start_position(&mut self) {
        let size = self.config.surface_size();
        let x_min = size * self.aspect / 2.0 - EDGE_OFFSET;
        let x_max = size * self.aspect / -2.0 + EDGE_OFFSET;
        let z_min = size / 2.0 - EDGE_OFFSET;
        let z_max = size / -2.0 + EDGE_OFFSET;

        let x_envelope = lerp(x_min, x_max, self.rng.gen());
        let z_envelope = lerp(z_min, z_max, self.rng.gen());
        let toss_from_top: bool = self.rng.gen();
        let toss_from_left: bool = self.rng.gen();
        let toss_x: bool = self.rng.gen();

        let x = if toss_x {
            x_envelope
        } else if toss_from_left {
            x_max
        } else {
            x_min
        };
        let z = if !toss_x {
            z_envelope
        } else if toss_from_top {
            z_max
        } else {
            z_min
        };

        self.start_position = Vec3::new(x, self.config.starting_height.min(size), z);
    }

    pub fn start_position(&self) -> Vec3 {
        self.start_position
    }

    /// Make throws reproducible
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seeded = true;
    }

    pub fn disable_seeded_random(&mut self) {
        self.rng = StdRng::from_entropy();
        self.seeded = false;
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    pub fn is_settled(&self, id: BodyId) -> bool {
        self.settled.iter().any(|b| b.id == id)
    }

    /// Die type a body was spawned with
    pub fn die_type(&self, id: BodyId) -> Option<DieType> {
        self.live
            .iter()
            .chain(self.settled.iter())
            .find(|b| b.id == id)
            .map(|b| b.die_type)
    }

    /// Current position and orientation of a die body
    pub fn body_pose(&self, id: BodyId) -> Option<(Vec3, Quat)> {
        let sim_body = self
            .live
            .iter()
            .chain(self.settled.iter())
            .find(|b| b.id == id)?;
        self.world.pose(sim_body.handle)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    fn rebuild_box(&mut self) {
        let size = self.config.surface_size();
        self.play_box.rebuild(
            &mut self.world,
            size,
            self.aspect,
            self.config.friction,
            self.config.restitution,
        );
    }
}

fn aspect_of(width: f32, height: f32) -> f32 {
    if width > 0.0 && height > 0.0 {
        width / height
    } else {
        1.0
    }
}
