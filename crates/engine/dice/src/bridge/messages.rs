//! Typed messages between the orchestrator, the presentation side and the
//! simulation side. One enum per direction.

use crate::error::Result;
use crate::ids::BodyId;
use crate::notation::Sides;
use dicebox_physics::{DieType, SimulationConfig, UpdateBuffer};
use tokio::sync::oneshot;

/// Anything to the simulation side
#[derive(Debug)]
pub enum PhysicsMessage {
    /// Create the world; acknowledged once it exists
    Init {
        width: f32,
        height: f32,
        config: SimulationConfig,
        ack: oneshot::Sender<Result<()>>,
    },
    AddDie {
        id: BodyId,
        die_type: DieType,
        mesh_name: String,
        /// Pick a fresh toss origin before spawning
        new_start_point: bool,
    },
    RemoveDie {
        id: BodyId,
    },
    /// Start stepping whenever the buffer comes back
    Resume,
    /// Hold the buffer until the next `Resume`
    Stop,
    /// Buffer handed back by the presentation side
    Step {
        buffer: UpdateBuffer,
    },
    Clear,
    Resize {
        width: f32,
        height: f32,
    },
    UpdateConfig(SimulationConfig),
    /// `Some(seed)` for reproducible throws, `None` to go back to entropy
    SetRandomSeed(Option<u64>),
}

/// Simulation side to presentation side
#[derive(Debug)]
pub enum PhysicsEvent {
    /// One tick's transforms
    Updated(UpdateBuffer),
    /// The body could not be spawned
    AddFailed { id: BodyId, reason: String },
}

/// What the presentation side needs to show and read one die
#[derive(Debug, Clone)]
pub struct DieDescriptor {
    pub id: BodyId,
    /// Ones body of a two-body d100
    pub companion: Option<BodyId>,
    pub sides: Sides,
    pub die_type: DieType,
    pub theme: String,
    pub theme_color: Option<String>,
    pub mesh_name: String,
    pub face_down: bool,
    pub new_start_point: bool,
}

/// Orchestrator to presentation side
#[derive(Debug)]
pub enum WorldMessage {
    Init {
        width: f32,
        height: f32,
        delay_ms: u64,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Spawn a simulated die
    Add(DieDescriptor),
    /// Show a die whose value was drawn without the simulation
    AddNonDie { die: DieDescriptor, value: i32 },
    /// Take a die off the board; with `hide` the settled body stays as
    /// geometry for later throws
    Remove {
        id: BodyId,
        companion: Option<BodyId>,
        hide: bool,
    },
    /// A die that will never be sent after all; forget any remove that
    /// arrived for it ahead of its spawn
    Discard { id: BodyId },
    Clear,
    Resize {
        width: f32,
        height: f32,
    },
    SetVisible(bool),
    UpdateConfig {
        delay_ms: u64,
        scale: f32,
        enable_shadows: bool,
        theme_color: String,
    },
}

/// Presentation side to orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// A die's body came to rest
    Asleep { id: BodyId },
    /// A die was read
    RollResult { id: BodyId, value: i32 },
    /// Every die on the board is at rest
    RollComplete,
    DieRemoved { id: BodyId },
}
