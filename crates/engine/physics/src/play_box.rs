use crate::collider::create_box_collider;
use crate::world::PhysicsWorld;
use glam::Vec3;
use rapier3d::prelude::*;

/// Static tray geometry: ground, ceiling and four walls.
///
/// Rebuilt whenever the surface size or aspect changes. The previous parts
/// are removed before the new ones are inserted.
#[derive(Debug, Default)]
pub struct PlayBox {
    parts: Vec<RigidBodyHandle>,
    size: f32,
    aspect: f32,
}

impl PlayBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the box with one sized `size` deep and `size * aspect` wide
    ///
    /// # Arguments
    /// * `world` - World the parts live in
    /// * `size` - Depth of the play surface (zoom-table value)
    /// * `aspect` - Surface width divided by height
    /// * `friction`, `restitution` - Contact material for every part
    pub fn rebuild(
        &mut self,
        world: &mut PhysicsWorld,
        size: f32,
        aspect: f32,
        friction: f32,
        restitution: f32,
    ) {
        self.remove(world);

        let width = size * aspect;
        // (center, half-extents)
        let parts = [
            // ground
            (Vec3::new(0.0, -0.5, 0.0), Vec3::new(width, 1.0, size)),
            // ceiling
            (Vec3::new(0.0, size + 2.0, 0.0), Vec3::new(width, 1.0, size)),
            // far and near walls
            (Vec3::new(0.0, 0.0, -size / 2.0), Vec3::new(width, size, 1.0)),
            (Vec3::new(0.0, 0.0, size / 2.0), Vec3::new(width, size, 1.0)),
            // right and left walls
            (Vec3::new(-width / 2.0, 0.0, 0.0), Vec3::new(1.0, size, size)),
            (Vec3::new(width / 2.0, 0.0, 0.0), Vec3::new(1.0, size, size)),
        ];

        for (center, half_extents) in parts {
            let body = RigidBodyBuilder::fixed()
                .translation(vector![center.x, center.y, center.z])
                .build();
            let handle = world.add_rigid_body(body);
            world.add_collider(
                create_box_collider(half_extents, friction, restitution),
                handle,
            );
            self.parts.push(handle);
        }

        self.size = size;
        self.aspect = aspect;
        tracing::debug!(size, aspect, "rebuilt play box");
    }

    /// Remove every part from the world
    pub fn remove(&mut self, world: &mut PhysicsWorld) {
        for handle in self.parts.drain(..) {
            world.remove_rigid_body(handle);
        }
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }
}
