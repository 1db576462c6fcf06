use crate::{BodyId, ColliderRegistry, DiceSimulation, DieType, SimulationConfig, UpdateBuffer};
use std::cell::RefCell;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Install the panic hook and route `tracing` to the browser console
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}

/// Physics worker entry point for JavaScript hosts
#[wasm_bindgen]
pub struct WasmDiceSimulation {
    inner: RefCell<DiceSimulation>,
}

#[wasm_bindgen]
impl WasmDiceSimulation {
    /// Create the simulation
    ///
    /// # Arguments
    /// * `options` - Partial `SimulationConfig` object (camelCase keys), or `undefined`
    /// * `width`, `height` - Surface size in pixels
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, width: f32, height: f32) -> Result<WasmDiceSimulation, JsValue> {
        let config: SimulationConfig = if options.is_undefined() || options.is_null() {
            SimulationConfig::default()
        } else {
            serde_wasm_bindgen::from_value(options)?
        };
        let sim = DiceSimulation::new(config, Arc::new(ColliderRegistry::new()), width, height)
            .map_err(js_err)?;
        Ok(Self {
            inner: RefCell::new(sim),
        })
    }

    /// Load a collider bundle (JSON text) for a mesh set
    ///
    /// # Returns
    /// Number of colliders now cached for the mesh set
    #[wasm_bindgen(js_name = loadModels)]
    pub fn load_models(&self, mesh_name: &str, json: &str) -> Result<u32, JsValue> {
        let sim = self.inner.borrow();
        let loaded = sim.registry().load_json(mesh_name, json).map_err(js_err)?;
        Ok(loaded.len() as u32)
    }

    /// Spawn and throw a die
    ///
    /// # Arguments
    /// * `die_type` - Key such as `"d6"`
    /// * `mesh_name` - Mesh set holding the collider
    /// * `id` - Body id echoed in the update buffer
    #[wasm_bindgen(js_name = addDie)]
    pub fn add_die(&self, die_type: &str, mesh_name: &str, id: u32) -> Result<u32, JsValue> {
        let die_type: DieType = die_type.parse().map_err(js_err)?;
        let mut sim = self.inner.borrow_mut();
        sim.add_body(die_type, mesh_name, BodyId(id))
            .map(|id| id.0)
            .map_err(js_err)
    }

    /// Step the world and fill the transferred buffer
    ///
    /// # Arguments
    /// * `delta_ms` - Elapsed wall time since the previous step
    /// * `buffer` - Transferred `Float32Array`
    ///
    /// # Returns
    /// The same buffer, filled with this tick's records
    #[wasm_bindgen(js_name = stepSimulation)]
    pub fn step_simulation(&self, delta_ms: f32, buffer: Vec<f32>) -> Vec<f32> {
        let mut sim = self.inner.borrow_mut();
        sim.step(delta_ms, UpdateBuffer::from_vec(buffer)).into_vec()
    }

    #[wasm_bindgen(js_name = removeDie)]
    pub fn remove_die(&self, id: u32) -> Result<(), JsValue> {
        self.inner
            .borrow_mut()
            .remove_body(BodyId(id))
            .map_err(js_err)
    }

    #[wasm_bindgen(js_name = clearDice)]
    pub fn clear_dice(&self) {
        self.inner.borrow_mut().clear();
    }

    #[wasm_bindgen(js_name = resize)]
    pub fn resize(&self, width: f32, height: f32) {
        self.inner.borrow_mut().resize(width, height);
    }

    /// Replace the config with a partial options object merged over defaults
    #[wasm_bindgen(js_name = updateConfig)]
    pub fn update_config(&self, options: JsValue) -> Result<(), JsValue> {
        let config: SimulationConfig = serde_wasm_bindgen::from_value(options)?;
        self.inner.borrow_mut().update_config(config).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setStartPosition)]
    pub fn set_start_position(&self) {
        self.inner.borrow_mut().set_start_position();
    }

    #[wasm_bindgen(js_name = setRandomSeed)]
    pub fn set_random_seed(&self, seed: u32) {
        self.inner.borrow_mut().set_random_seed(u64::from(seed));
    }

    #[wasm_bindgen(js_name = disableSeededRandom)]
    pub fn disable_seeded_random(&self) {
        self.inner.borrow_mut().disable_seeded_random();
    }

    #[wasm_bindgen(js_name = liveCount)]
    pub fn live_count(&self) -> u32 {
        self.inner.borrow().live_count() as u32
    }
}
