//! Error types for dice orchestration

use crate::ids::RollId;
use dicebox_physics::{ColliderLoadError, SimulationError};
use thiserror::Error;

/// Result type for dice operations
pub type Result<T> = std::result::Result<T, DiceError>;

/// Errors surfaced to callers of [`DiceBox`](crate::DiceBox)
#[derive(Error, Debug)]
pub enum DiceError {
    /// Notation text could not be parsed
    #[error("Invalid notation: {text}")]
    Parse { text: String },

    /// Object spec without `sides`
    #[error("Roll notation is missing sides")]
    MissingSides,

    /// A field holds a value outside its domain
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// Theme collider bundle could not be loaded
    #[error(transparent)]
    ColliderLoad(#[from] ColliderLoadError),

    /// Physics side rejected an operation
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Theme config or meshes could not be fetched
    #[error("Failed to load theme '{theme}': {reason}")]
    ThemeLoad { theme: String, reason: String },

    /// Die reference does not name a die on the board
    #[error("Unknown die: {0}")]
    UnknownDie(RollId),

    /// Group id passed with a spec does not exist
    #[error("Unknown group: {0}")]
    UnknownGroup(u32),

    /// Board was cleared while this roll was still in flight
    #[error("Dice were cleared before the roll completed")]
    ClearedWhileRolling,

    /// One of the execution contexts has shut down
    #[error("Dice box worker disconnected")]
    Disconnected,

    /// Every body id the update buffer can carry is taken until the next
    /// `clear`
    #[error("Body ids exhausted, clear the board to continue")]
    BodyIdsExhausted,

    /// Configuration rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DiceError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DiceError::Disconnected
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for DiceError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        DiceError::Disconnected
    }
}
