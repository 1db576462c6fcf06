//! Public facade.
//!
//! `DiceBox` owns the roll ledger and the two bridge actors. Calls that roll
//! or remove dice validate and allocate synchronously, then return a
//! [`CollectionHandle`] that resolves once every die of the call is read or
//! removed.

use crate::bridge::{
    DieDescriptor, DieRenderer, PhysicsMessage, PhysicsWorker, WorldActor, WorldEvent,
    WorldMessage,
};
use crate::config::{ConfigPatch, DiceBoxConfig};
use crate::error::{DiceError, Result};
use crate::events::{DiceEvent, EventHub};
use crate::ids::RollId;
use crate::ledger::{
    Allocation, CollectionHandle, Die, DieState, GroupResult, Ledger, RemovedDie,
};
use crate::notation::{self, DieSpec, NotationInput, Sides};
use crate::resolver;
use crate::theme::{ThemeCache, ThemeData, ThemeSource, DEFAULT_MESH_NAME};
use dicebox_physics::{ColliderRegistry, DieType};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Options for [`DiceBox::roll`] and [`DiceBox::add`]
#[derive(Debug, Clone)]
pub struct RollOptions {
    /// Theme for specs that do not name one; the configured theme otherwise
    pub theme: Option<String>,
    /// Pick a fresh toss origin before the first die of the call
    pub new_start_point: bool,
}

impl Default for RollOptions {
    fn default() -> Self {
        Self {
            theme: None,
            new_start_point: true,
        }
    }
}

/// Options for [`DiceBox::remove`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Keep the settled body in the simulation as an obstacle
    pub hide: bool,
}

/// Options for [`DiceBox::reroll`]
#[derive(Debug, Clone, Copy)]
pub struct RerollOptions {
    /// Take the old dice off the board before throwing new ones
    pub remove: bool,
    pub hide: bool,
    pub new_start_point: bool,
}

impl Default for RerollOptions {
    fn default() -> Self {
        Self {
            remove: true,
            hide: false,
            new_start_point: true,
        }
    }
}

struct Inner {
    config: RwLock<DiceBoxConfig>,
    ledger: Arc<Mutex<Ledger>>,
    registry: Arc<ColliderRegistry>,
    themes: ThemeCache,
    events: EventHub,
    world: mpsc::UnboundedSender<WorldMessage>,
    physics: mpsc::UnboundedSender<PhysicsMessage>,
}

/// A board of dice.
///
/// Must be created and used inside a tokio runtime. Dropping the box shuts
/// both actors down.
pub struct DiceBox {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DiceBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiceBox").finish_non_exhaustive()
    }
}

impl DiceBox {
    /// Start both actors and wait for their init handshake.
    ///
    /// The configured theme is loaded before returning; a failure there is
    /// logged and its dice fall back to random values until a later load
    /// succeeds.
    pub async fn new<R: DieRenderer>(
        config: DiceBoxConfig,
        source: Arc<dyn ThemeSource>,
        renderer: R,
        width: f32,
        height: f32,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ColliderRegistry::new());
        let events = EventHub::default();
        let themes = ThemeCache::new(source, registry.clone(), events.clone());
        let ledger = Arc::new(Mutex::new(Ledger::new()));

        let (physics_events_tx, physics_events_rx) = mpsc::unbounded_channel();
        let (physics, _) = PhysicsWorker::new(registry.clone(), physics_events_tx).spawn();
        let world = WorldActor::spawn(
            registry.clone(),
            renderer,
            physics.clone(),
            physics_events_rx,
        );

        let (physics_ack, physics_ready) = oneshot::channel();
        physics.send(PhysicsMessage::Init {
            width,
            height,
            config: config.simulation_config(),
            ack: physics_ack,
        })?;
        let (world_ack, world_ready) = oneshot::channel();
        world.messages.send(WorldMessage::Init {
            width,
            height,
            delay_ms: config.delay,
            ack: world_ack,
        })?;
        let (physics_ready, world_ready) = tokio::join!(physics_ready, world_ready);
        physics_ready??;
        world_ready??;
        tracing::info!(width, height, "dice box initialized");

        tokio::spawn(dispatch_world_events(
            ledger.clone(),
            events.clone(),
            world.events,
        ));

        if let Err(err) = themes.load(&config.theme, &config.asset_base()).await {
            tracing::warn!(theme = %config.theme, %err, "default theme failed to load");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                ledger,
                registry,
                themes,
                events,
                world: world.messages,
                physics,
            }),
        })
    }

    /// Clear the board, then throw `notation`.
    ///
    /// Notation is validated before anything is cleared.
    pub fn roll(
        &self,
        notation: impl Into<NotationInput>,
        options: RollOptions,
    ) -> Result<CollectionHandle<Vec<GroupResult>>> {
        let input = notation.into();
        let specs = notation::parse_many(input.clone())?;
        self.clear()?;
        self.add_specs(&specs, input.to_string(), options)
    }

    /// Throw `notation` onto the board without clearing it
    pub fn add(
        &self,
        notation: impl Into<NotationInput>,
        options: RollOptions,
    ) -> Result<CollectionHandle<Vec<GroupResult>>> {
        let input = notation.into();
        let specs = notation::parse_many(input.clone())?;
        self.add_specs(&specs, input.to_string(), options)
    }

    fn add_specs(
        &self,
        specs: &[DieSpec],
        notation: String,
        options: RollOptions,
    ) -> Result<CollectionHandle<Vec<GroupResult>>> {
        let config = self.inner.config.read().clone();
        let theme = options.theme.unwrap_or_else(|| config.theme.clone());
        let (allocation, handle) = self
            .inner
            .ledger
            .lock()
            .allocate(specs, notation, &theme)?;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner
                .dispatch(allocation, config, options.new_start_point)
                .await;
        });
        Ok(handle)
    }

    /// Take dice off the board.
    ///
    /// Fails without side effects when any die is unknown or already being
    /// removed.
    pub fn remove(
        &self,
        dice: &[RollId],
        options: RemoveOptions,
    ) -> Result<CollectionHandle<Vec<RemovedDie>>> {
        let notation = dice
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut ledger = self.inner.ledger.lock();
        let (removed, handle) = ledger.begin_remove(dice, notation)?;
        for die in removed {
            self.inner.world.send(WorldMessage::Remove {
                id: die.id,
                companion: die.companion,
                hide: options.hide,
            })?;
        }
        Ok(handle)
    }

    /// Throw the given dice again into their own groups.
    ///
    /// The new dice keep the old roll ids, bumped when the old die is still
    /// in the ledger. Not atomic: a failing add leaves removed dice removed.
    pub fn reroll(
        &self,
        dice: &[RollId],
        options: RerollOptions,
    ) -> Result<CollectionHandle<Vec<GroupResult>>> {
        let specs = {
            let ledger = self.inner.ledger.lock();
            dice.iter()
                .map(|roll_id| {
                    ledger
                        .die(*roll_id)
                        .map(reroll_spec)
                        .ok_or(DiceError::UnknownDie(*roll_id))
                })
                .collect::<Result<Vec<_>>>()?
        };

        if options.remove {
            // completes on its own; only the new throw is awaited
            let _ = self.remove(dice, RemoveOptions { hide: options.hide })?;
        }
        let notation = specs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.add_specs(
            &specs,
            notation,
            RollOptions {
                theme: None,
                new_start_point: options.new_start_point,
            },
        )
    }

    /// Merge a partial config and pass the changes to whichever side needs
    /// them. Nothing changes when the merged config is invalid.
    pub fn update_config(&self, patch: ConfigPatch) -> Result<&Self> {
        let (changes, config) = {
            let mut config = self.inner.config.write();
            let changes = config.apply(&patch)?;
            (changes, config.clone())
        };
        if !changes.any() {
            return Ok(self);
        }
        tracing::debug!(?changes, "config updated");

        if changes.physics {
            self.inner
                .physics
                .send(PhysicsMessage::UpdateConfig(config.simulation_config()))?;
        }
        if changes.presentation {
            self.inner.world.send(WorldMessage::UpdateConfig {
                delay_ms: config.delay,
                scale: config.scale,
                enable_shadows: config.enable_shadows,
                theme_color: config.theme_color.clone(),
            })?;
        }
        if changes.theme {
            let themes = self.inner.themes.clone();
            tokio::spawn(async move {
                if let Err(err) = themes.load(&config.theme, &config.asset_base()).await {
                    tracing::warn!(theme = %config.theme, %err, "theme failed to load");
                }
            });
        }
        Ok(self)
    }

    /// Every group on the board, sums recomputed
    pub fn get_roll_results(&self) -> Vec<GroupResult> {
        self.inner.ledger.lock().group_results()
    }

    /// Drop every die and reject the calls still waiting on them
    pub fn clear(&self) -> Result<&Self> {
        // held across the sends so no dispatch can slip in between
        let mut ledger = self.inner.ledger.lock();
        ledger.clear();
        self.inner.world.send(WorldMessage::Clear)?;
        self.inner.physics.send(PhysicsMessage::Clear)?;
        tracing::debug!(epoch = ledger.epoch(), "board cleared");
        Ok(self)
    }

    pub fn hide(&self) -> Result<&Self> {
        self.inner.world.send(WorldMessage::SetVisible(false))?;
        Ok(self)
    }

    pub fn show(&self) -> Result<&Self> {
        self.inner.world.send(WorldMessage::SetVisible(true))?;
        Ok(self)
    }

    pub fn resize(&self, width: f32, height: f32) -> Result<&Self> {
        self.inner.world.send(WorldMessage::Resize { width, height })?;
        self.inner
            .physics
            .send(PhysicsMessage::Resize { width, height })?;
        Ok(self)
    }

    /// Make throws reproducible, or go back to entropy with `None`.
    ///
    /// Values of dice that bypass the simulation always come from the OS
    /// RNG.
    pub fn set_random_seed(&self, seed: Option<u64>) -> Result<&Self> {
        self.inner.physics.send(PhysicsMessage::SetRandomSeed(seed))?;
        Ok(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiceEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> DiceBoxConfig {
        self.inner.config.read().clone()
    }

    /// Load a theme ahead of its first roll
    pub async fn load_theme(&self, theme: &str) -> Result<Arc<ThemeData>> {
        let asset_base = self.inner.config.read().asset_base();
        self.inner.themes.load(theme, &asset_base).await
    }
}

fn reroll_spec(die: &Die) -> DieSpec {
    let mut spec = DieSpec::new(die.sides, 1)
        .with_group(die.group_id)
        .with_roll_id(die.roll_id)
        .with_theme(die.theme.clone());
    spec.theme_color = die.theme_color.clone();
    spec
}

impl Inner {
    /// Load the themes of an allocation and hand its dice to the
    /// presentation side
    async fn dispatch(&self, allocation: Allocation, config: DiceBoxConfig, new_start_point: bool) {
        let asset_base = config.asset_base();
        let names: BTreeSet<&str> = allocation.dice.iter().map(|d| d.theme.as_str()).collect();
        let loads = names.into_iter().map(|name| {
            let asset_base = asset_base.as_str();
            async move { (name, self.themes.load(name, asset_base).await) }
        });

        let mut themes = HashMap::new();
        for (name, result) in join_all(loads).await {
            match result {
                Ok(data) => {
                    themes.insert(name.to_string(), data);
                }
                Err(err) => {
                    tracing::warn!(theme = name, %err, "theme unavailable, using random values")
                }
            }
        }

        let mut ledger = self.ledger.lock();
        if ledger.epoch() != allocation.epoch {
            tracing::debug!(collection = %allocation.collection_id, "board cleared before dispatch");
            return;
        }

        let mut new_start_point = new_start_point;
        for die in &allocation.dice {
            // removed while its theme was loading
            if !ledger.contains_body(die.id) {
                let _ = self.world.send(WorldMessage::Discard { id: die.id });
                continue;
            }
            let theme = themes.get(&die.theme);
            let die_type = die.sides.die_type();
            let descriptor = DieDescriptor {
                id: die.id,
                companion: die.companion,
                sides: die.sides,
                die_type,
                theme: die.theme.clone(),
                theme_color: die
                    .theme_color
                    .clone()
                    .or_else(|| Some(config.theme_color.clone())),
                mesh_name: theme.map_or_else(
                    || DEFAULT_MESH_NAME.to_string(),
                    |t| t.mesh_name.clone(),
                ),
                face_down: theme.map_or(true, |t| t.d4_face_down),
                new_start_point,
            };

            let message = if self.simulates(&config, theme.map(Arc::as_ref), die) {
                new_start_point = false;
                ledger.set_state(die.id, DieState::Simulating);
                WorldMessage::Add(descriptor)
            } else {
                WorldMessage::AddNonDie {
                    die: descriptor,
                    value: resolver::fallback_value(die.sides),
                }
            };
            if self.world.send(message).is_err() {
                tracing::warn!("presentation side closed, dropping dice");
                return;
            }
        }
    }

    /// Whether a die can be thrown, or must take a random value instead
    fn simulates(&self, config: &DiceBoxConfig, theme: Option<&ThemeData>, die: &Die) -> bool {
        if config.suspend_simulation {
            return false;
        }
        let Some(theme) = theme else {
            return false;
        };
        let die_type = die.sides.die_type();
        if !theme.has_die(die_type) {
            tracing::warn!(
                theme = %theme.theme,
                %die_type,
                "die not available in theme, using a random value"
            );
            return false;
        }
        let has = |die_type| {
            self.registry
                .get_collider(die_type, &theme.mesh_name)
                .is_some()
        };
        let colliders = match die.sides {
            Sides::Numeric(100) => has(DieType::D100) && has(DieType::D10),
            _ => has(die_type),
        };
        if !colliders {
            tracing::warn!(
                mesh_set = %theme.mesh_name,
                %die_type,
                "no collider for die, using a random value"
            );
        }
        colliders
    }
}

/// Apply presentation-side reports to the ledger and publish them
async fn dispatch_world_events(
    ledger: Arc<Mutex<Ledger>>,
    events: EventHub,
    mut rx: mpsc::UnboundedReceiver<WorldEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            WorldEvent::Asleep { id } => ledger.lock().set_state(id, DieState::Asleep),
            WorldEvent::RollResult { id, value } => {
                let update = ledger.lock().record_result(id, value);
                if let Some(update) = update {
                    events.publish(DiceEvent::DieComplete(update.die));
                }
            }
            WorldEvent::RollComplete => {
                let groups = ledger.lock().group_results();
                events.publish(DiceEvent::RollComplete(groups));
            }
            WorldEvent::DieRemoved { id } => {
                let update = ledger.lock().record_removal(id);
                if let Some(update) = update {
                    events.publish(DiceEvent::RemoveComplete(update.die));
                }
            }
        }
    }
    tracing::debug!("world event dispatch stopped");
}
