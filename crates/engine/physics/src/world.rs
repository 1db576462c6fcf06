use glam::{Quat, Vec3};
use rapier3d::prelude::*;

/// Rapier state for one dice tray.
///
/// Advances on a fixed step driven by wall-clock deltas, and exposes the
/// few body operations the dice simulation needs: pose reads, rest checks
/// and freezing a settled die into static geometry.
pub struct PhysicsWorld {
    pub(crate) rigid_body_set: RigidBodySet,
    pub(crate) collider_set: ColliderSet,
    pub(crate) impulse_joint_set: ImpulseJointSet,
    pub(crate) multibody_joint_set: MultibodyJointSet,
    pub(crate) integration_parameters: IntegrationParameters,
    pub(crate) physics_pipeline: PhysicsPipeline,
    pub(crate) island_manager: IslandManager,
    pub(crate) broad_phase: DefaultBroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    /// Wall time not yet consumed by fixed steps, in seconds
    accumulator: f32,
}

impl PhysicsWorld {
    /// Create an empty tray world
    ///
    /// # Arguments
    /// * `gravity` - Gravity vector, already scaled by the configured multiplier
    pub fn new(gravity: Vec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![gravity.x, gravity.y, gravity.z],
            accumulator: 0.0,
        }
    }

    /// Consume `delta` seconds of wall time in steps of `fixed_step`.
    ///
    /// At most `max_substeps` steps run per call; any backlog beyond that is
    /// dropped so a stalled caller does not trigger a burst of catch-up
    /// steps.
    ///
    /// # Returns
    /// Number of steps taken
    pub fn advance(&mut self, delta: f32, fixed_step: f32, max_substeps: u32) -> u32 {
        self.accumulator += delta.max(0.0);

        let mut steps = 0;
        while self.accumulator >= fixed_step && steps < max_substeps {
            self.step(fixed_step);
            self.accumulator -= fixed_step;
            steps += 1;
        }
        if steps == max_substeps {
            self.accumulator = self.accumulator.min(fixed_step);
        }
        steps
    }

    /// Forget unconsumed wall time
    pub fn reset_clock(&mut self) {
        self.accumulator = 0.0;
    }

    fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    /// Remove a body together with its colliders
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Position and orientation of a body
    pub fn pose(&self, handle: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        let body = self.rigid_body_set.get(handle)?;
        let t = body.translation();
        let r = body.rotation();
        Some((Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(r.i, r.j, r.k, r.w)))
    }

    /// Whether a body moves slower than both thresholds
    pub fn is_resting(
        &self,
        handle: RigidBodyHandle,
        linear_epsilon: f32,
        angular_epsilon: f32,
    ) -> Option<bool> {
        let body = self.rigid_body_set.get(handle)?;
        Some(body.linvel().norm() < linear_epsilon && body.angvel().norm() < angular_epsilon)
    }

    /// Stop a body and turn it into fixed geometry
    ///
    /// # Returns
    /// `false` when the handle is stale
    pub fn freeze(&mut self, handle: RigidBodyHandle) -> bool {
        let Some(body) = self.rigid_body_set.get_mut(handle) else {
            return false;
        };
        body.set_linvel(vector![0.0, 0.0, 0.0], false);
        body.set_angvel(vector![0.0, 0.0, 0.0], false);
        body.set_body_type(RigidBodyType::Fixed, true);
        true
    }

    /// Number of bodies, tray walls included
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }

    pub fn gravity(&self) -> Vec3 {
        Vec3::new(self.gravity.x, self.gravity.y, self.gravity.z)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = vector![gravity.x, gravity.y, gravity.z];
    }
}
