mod buffer;
mod collider;
mod config;
mod die_type;
mod error;
mod play_box;
mod simulation;
mod world;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

// Only compile WASM bindings when "wasm" feature is enabled
#[cfg(feature = "wasm")]
mod wasm;

pub use buffer::{BodyId, BufferRecord, UpdateBuffer, MAX_BODY_ID, RECORD_WIDTH, SLEEP_SENTINEL};
pub use collider::{
    create_box_collider, create_die_collider, ColliderEntry, ColliderMesh, ColliderRegistry,
    MeshBundle, DEFAULT_SCALING,
};
pub use config::{SimulationConfig, EARTH_GRAVITY, ZOOM_SIZES};
pub use die_type::{DieType, ParseDieTypeError};
pub use error::{ColliderLoadError, Result, SimulationError};
pub use play_box::PlayBox;
pub use simulation::DiceSimulation;
pub use world::PhysicsWorld;

// Re-export for convenience
pub use glam;
pub use rapier3d;

#[cfg(feature = "wasm")]
pub use wasm::WasmDiceSimulation;
