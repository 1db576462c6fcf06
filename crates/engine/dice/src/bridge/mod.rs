//! Render/physics bridge.
//!
//! Two actors exchange typed messages: the [`PhysicsWorker`] owns the
//! simulation and the [`WorldActor`] owns presentation. A single update
//! buffer moves between them by value each tick.

mod messages;
mod physics_worker;
mod world;

pub use messages::{DieDescriptor, PhysicsEvent, PhysicsMessage, WorldEvent, WorldMessage};
pub use physics_worker::PhysicsWorker;
pub use world::{DieRenderer, HeadlessRenderer, WorldActor, WorldHandle, FRAME_INTERVAL};
