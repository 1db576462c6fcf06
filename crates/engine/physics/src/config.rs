use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};

/// Play-surface size (in world units) for each zoom level
pub const ZOOM_SIZES: [f32; 8] = [43.0, 37.0, 32.0, 26.5, 23.0, 20.5, 18.0, 15.75];

/// Standard gravity, scaled by [`SimulationConfig::gravity`]
pub const EARTH_GRAVITY: f32 = 9.81;

/// Physics-side configuration.
///
/// Every field is tunable at runtime through
/// [`DiceSimulation::update_config`](crate::DiceSimulation::update_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    /// Multiplier on standard gravity
    pub gravity: f32,
    /// Multiplier on each collider's mass
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Upper bound of the random spin impulse
    pub spin_force: f32,
    /// Upper bound of the throw velocity factor
    pub throw_force: f32,
    /// Drop height, clamped to the play-surface size
    pub starting_height: f32,
    /// Milliseconds after which a still-moving body is forced asleep
    pub settle_timeout: f32,
    /// Linear speed below which a body counts as settled
    pub linear_sleep_epsilon: f32,
    /// Angular speed below which a body counts as settled
    pub angular_sleep_epsilon: f32,
    /// Fixed integration step in seconds
    pub fixed_step: f32,
    /// Maximum fixed steps per `step` call; leftover time is dropped
    pub max_substeps: u32,
    /// Index into [`ZOOM_SIZES`]
    pub zoom_level: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: 4.0,
            mass: 3.0,
            friction: 0.8,
            restitution: 0.0,
            linear_damping: 0.5,
            angular_damping: 0.4,
            spin_force: 6.0,
            throw_force: 2.0,
            starting_height: 12.0,
            settle_timeout: 5000.0,
            linear_sleep_epsilon: 0.01,
            angular_sleep_epsilon: 0.01,
            fixed_step: 1.0 / 90.0,
            max_substeps: 2,
            zoom_level: 3,
        }
    }
}

impl SimulationConfig {
    /// Reject values the step loop cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SimulationError::InvalidConfig(msg.to_string()));

        if self.zoom_level >= ZOOM_SIZES.len() {
            return invalid("zoom level must be between 0 and 7");
        }
        if !(self.fixed_step > 0.0) {
            return invalid("fixed step must be positive");
        }
        if self.max_substeps == 0 {
            return invalid("max substeps must be >= 1");
        }
        if !(self.settle_timeout > 0.0) {
            return invalid("settle timeout must be positive");
        }
        if self.mass <= 0.0 {
            return invalid("mass must be positive");
        }
        if self.linear_sleep_epsilon < 0.0 || self.angular_sleep_epsilon < 0.0 {
            return invalid("sleep thresholds must not be negative");
        }
        Ok(())
    }

    /// Side length of the play box at the current zoom level
    pub fn surface_size(&self) -> f32 {
        ZOOM_SIZES[self.zoom_level.min(ZOOM_SIZES.len() - 1)]
    }

    /// Gravity as a world-space acceleration (y-down)
    pub fn gravity_vector(&self) -> glam::Vec3 {
        glam::Vec3::new(0.0, -EARTH_GRAVITY * self.gravity, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.surface_size(), 26.5);
        assert_eq!(config.gravity_vector().y, -EARTH_GRAVITY * 4.0);
    }

    #[test]
    fn test_rejects_bad_zoom() {
        let config = SimulationConfig {
            zoom_level: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"settleTimeout": 250, "zoomLevel": 0}"#).unwrap();
        assert_eq!(config.settle_timeout, 250.0);
        assert_eq!(config.surface_size(), 43.0);
        assert_eq!(config.friction, 0.8);
    }
}
