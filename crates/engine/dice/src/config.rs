use crate::error::{DiceError, Result};
use dicebox_physics::{SimulationConfig, ZOOM_SIZES};
use serde::{Deserialize, Serialize};

/// Options recognized by [`DiceBox`](crate::DiceBox)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiceBoxConfig {
    pub theme: String,
    pub theme_color: String,
    /// Render scale of the dice, 1..=10
    pub scale: f32,
    pub gravity: f32,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub spin_force: f32,
    pub throw_force: f32,
    pub starting_height: f32,
    /// Milliseconds before a moving die is forced to settle
    pub settle_timeout: f32,
    /// Linear speed below which a die counts as settled
    pub linear_sleep_epsilon: f32,
    /// Angular speed below which a die counts as settled
    pub angular_sleep_epsilon: f32,
    /// Milliseconds between spawning consecutive dice of one call
    pub delay: u64,
    pub asset_path: String,
    pub origin: String,
    /// Skip physics and draw every value from the fallback RNG
    pub suspend_simulation: bool,
    pub enable_shadows: bool,
    pub zoom_level: usize,
}

impl Default for DiceBoxConfig {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            theme_color: "#0974e6".to_string(),
            scale: 5.0,
            gravity: 3.0,
            mass: 3.0,
            friction: 0.8,
            restitution: 0.0,
            spin_force: 6.0,
            throw_force: 2.5,
            starting_height: 15.0,
            settle_timeout: 5000.0,
            linear_sleep_epsilon: 0.01,
            angular_sleep_epsilon: 0.01,
            delay: 10,
            asset_path: "/assets/dice-box/".to_string(),
            origin: String::new(),
            suspend_simulation: false,
            enable_shadows: true,
            zoom_level: 3,
        }
    }
}

impl DiceBoxConfig {
    pub fn validate(&self) -> Result<()> {
        self.check()
            .map_err(|err| DiceError::InvalidConfig(err.to_string()))
    }

    fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1.0..=10.0).contains(&self.scale),
            "scale must be between 1 and 10"
        );
        anyhow::ensure!(self.settle_timeout > 0.0, "settle timeout must be positive");
        anyhow::ensure!(self.mass > 0.0, "mass must be positive");
        anyhow::ensure!(
            self.linear_sleep_epsilon >= 0.0 && self.angular_sleep_epsilon >= 0.0,
            "sleep thresholds must not be negative"
        );
        anyhow::ensure!(
            self.spin_force >= 0.0 && self.throw_force >= 0.0,
            "forces must not be negative"
        );
        anyhow::ensure!(
            self.zoom_level < ZOOM_SIZES.len(),
            "zoom level must be between 0 and {}",
            ZOOM_SIZES.len() - 1
        );
        anyhow::ensure!(!self.theme.is_empty(), "theme must not be empty");
        Ok(())
    }

    /// Physics-side view of this config
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            gravity: self.gravity,
            mass: self.mass,
            friction: self.friction,
            restitution: self.restitution,
            spin_force: self.spin_force,
            throw_force: self.throw_force,
            starting_height: self.starting_height,
            settle_timeout: self.settle_timeout,
            linear_sleep_epsilon: self.linear_sleep_epsilon,
            angular_sleep_epsilon: self.angular_sleep_epsilon,
            zoom_level: self.zoom_level,
            ..SimulationConfig::default()
        }
    }

    /// Resolved asset base, `origin` joined with `asset_path`
    pub fn asset_base(&self) -> String {
        format!("{}{}", self.origin, self.asset_path)
    }

    /// Merge a partial update and validate the result.
    ///
    /// Nothing is written when the merged config is invalid.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<ConfigChanges> {
        let mut next = self.clone();
        let mut changes = ConfigChanges::default();

        macro_rules! merge {
            ($field:ident, $flag:ident) => {
                if let Some(value) = &patch.$field {
                    if next.$field != *value {
                        next.$field = value.clone();
                        changes.$flag = true;
                    }
                }
            };
        }

        merge!(gravity, physics);
        merge!(mass, physics);
        merge!(friction, physics);
        merge!(restitution, physics);
        merge!(spin_force, physics);
        merge!(throw_force, physics);
        merge!(starting_height, physics);
        merge!(settle_timeout, physics);
        merge!(linear_sleep_epsilon, physics);
        merge!(angular_sleep_epsilon, physics);
        merge!(scale, presentation);
        merge!(enable_shadows, presentation);
        merge!(theme_color, presentation);
        merge!(delay, presentation);
        merge!(suspend_simulation, presentation);
        merge!(asset_path, presentation);
        merge!(origin, presentation);
        merge!(theme, theme);
        if let Some(zoom) = patch.zoom_level {
            if next.zoom_level != zoom {
                next.zoom_level = zoom;
                changes.physics = true;
                changes.presentation = true;
            }
        }

        next.validate()?;
        *self = next;
        Ok(changes)
    }
}

/// Partial config for [`DiceBox::update_config`](crate::DiceBox::update_config)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub theme: Option<String>,
    pub theme_color: Option<String>,
    pub scale: Option<f32>,
    pub gravity: Option<f32>,
    pub mass: Option<f32>,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
    pub spin_force: Option<f32>,
    pub throw_force: Option<f32>,
    pub starting_height: Option<f32>,
    pub settle_timeout: Option<f32>,
    pub linear_sleep_epsilon: Option<f32>,
    pub angular_sleep_epsilon: Option<f32>,
    pub delay: Option<u64>,
    pub asset_path: Option<String>,
    pub origin: Option<String>,
    pub suspend_simulation: Option<bool>,
    pub enable_shadows: Option<bool>,
    pub zoom_level: Option<usize>,
}

/// Which execution contexts must hear about a config update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    pub physics: bool,
    pub presentation: bool,
    pub theme: bool,
}

impl ConfigChanges {
    pub fn any(&self) -> bool {
        self.physics || self.presentation || self.theme
    }
}
