//! Error types for the dice simulation

use crate::die_type::DieType;
use crate::BodyId;
use thiserror::Error;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors raised while loading collider bundles
#[derive(Error, Debug)]
pub enum ColliderLoadError {
    /// Bundle has no `colliderFaceMap`, results could never be read back
    #[error("mesh set '{mesh_name}' has no collider face map")]
    MissingFaceMap { mesh_name: String },

    /// A collider mesh is unusable
    #[error("invalid collider mesh '{mesh}': {reason}")]
    InvalidMesh { mesh: String, reason: String },

    /// Bundle JSON could not be decoded
    #[error("collider bundle decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors that can occur in the simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// No collider registered for this die type in the requested mesh set
    #[error("no collider for {die_type} in mesh set '{mesh_name}'")]
    UnknownCollider { die_type: DieType, mesh_name: String },

    /// Body id is not known to the simulation
    #[error("unknown body: {0}")]
    UnknownBody(BodyId),

    /// Collider bundle failed to load
    #[error(transparent)]
    ColliderLoad(#[from] ColliderLoadError),

    /// Configuration rejected by validation
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),
}
