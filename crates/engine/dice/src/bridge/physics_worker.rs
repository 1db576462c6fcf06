//! Simulation-side actor.
//!
//! Owns the [`DiceSimulation`] and steps it once per returned buffer while
//! running. There is exactly one buffer, so at most one tick is ever in
//! flight.

use super::messages::{PhysicsEvent, PhysicsMessage};
use crate::error::DiceError;
use dicebox_physics::{ColliderRegistry, DiceSimulation, SimulationError, UpdateBuffer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub struct PhysicsWorker {
    sim: Option<DiceSimulation>,
    registry: Arc<ColliderRegistry>,
    events: mpsc::UnboundedSender<PhysicsEvent>,
    buffer: Option<UpdateBuffer>,
    running: bool,
    last_tick: Instant,
}

impl PhysicsWorker {
    pub fn new(
        registry: Arc<ColliderRegistry>,
        events: mpsc::UnboundedSender<PhysicsEvent>,
    ) -> Self {
        Self {
            sim: None,
            registry,
            events,
            buffer: None,
            running: false,
            last_tick: Instant::now(),
        }
    }

    /// Run the worker on its own task until every sender is dropped
    pub fn spawn(
        self,
    ) -> (mpsc::UnboundedSender<PhysicsMessage>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PhysicsMessage>) {
        tracing::debug!("physics worker started");
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        tracing::debug!("physics worker stopped");
    }

    pub fn handle(&mut self, message: PhysicsMessage) {
        if let PhysicsMessage::Init {
            width,
            height,
            config,
            ack,
        } = message
        {
            let result = DiceSimulation::new(config, self.registry.clone(), width, height)
                .map(|sim| self.sim = Some(sim))
                .map_err(DiceError::from);
            let _ = ack.send(result);
            return;
        }

        let Some(sim) = self.sim.as_mut() else {
            tracing::warn!(?message, "physics message before init");
            return;
        };

        match message {
            PhysicsMessage::Init { .. } => {}
            PhysicsMessage::AddDie {
                id,
                die_type,
                mesh_name,
                new_start_point,
            } => {
                if new_start_point {
                    sim.set_start_position();
                }
                if let Err(err) = sim.add_body(die_type, &mesh_name, id) {
                    let _ = self.events.send(PhysicsEvent::AddFailed {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
            PhysicsMessage::RemoveDie { id } => match sim.remove_body(id) {
                Ok(()) => {}
                Err(SimulationError::UnknownBody(_)) => {
                    tracing::debug!(%id, "remove for body not in the world");
                }
                Err(err) => tracing::warn!(%id, %err, "failed to remove body"),
            },
            PhysicsMessage::Resume => {
                if !self.running {
                    self.running = true;
                    self.last_tick = Instant::now();
                }
                self.tick();
            }
            PhysicsMessage::Stop => self.running = false,
            PhysicsMessage::Step { buffer } => {
                self.buffer = Some(buffer);
                self.tick();
            }
            PhysicsMessage::Clear => {
                sim.clear();
                self.running = false;
            }
            PhysicsMessage::Resize { width, height } => sim.resize(width, height),
            PhysicsMessage::UpdateConfig(config) => {
                if let Err(err) = sim.update_config(config) {
                    tracing::warn!(%err, "rejected simulation config");
                }
            }
            PhysicsMessage::SetRandomSeed(Some(seed)) => sim.set_random_seed(seed),
            PhysicsMessage::SetRandomSeed(None) => sim.disable_seeded_random(),
        }
    }

    /// Step once if running and holding the buffer
    fn tick(&mut self) {
        if !self.running {
            return;
        }
        let (Some(sim), Some(buffer)) = (self.sim.as_mut(), self.buffer.take()) else {
            return;
        };
        let now = Instant::now();
        let delta_ms = now.duration_since(self.last_tick).as_secs_f32() * 1000.0;
        self.last_tick = now;

        let buffer = sim.step(delta_ms, buffer);
        if self.events.send(PhysicsEvent::Updated(buffer)).is_err() {
            tracing::warn!("presentation side closed, stopping simulation");
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn simulation(&self) -> Option<&DiceSimulation> {
        self.sim.as_ref()
    }
}
