//! Presentation-side actor.
//!
//! Keeps the die cache, applies transforms from the simulation, reads
//! settled dice and decides when the step loop runs. The loop only runs
//! while at least one die is moving and restarts as soon as a die is added
//! to an idle board.

use super::messages::{DieDescriptor, PhysicsEvent, PhysicsMessage, WorldEvent, WorldMessage};
use crate::ids::BodyId;
use crate::notation::Sides;
use crate::resolver::{self, PercentilePair};
use dicebox_physics::{BufferRecord, ColliderEntry, ColliderRegistry, DieType, UpdateBuffer};
use glam::{Quat, Vec3};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Time the presentation side holds a buffer before handing it back
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Draws dice. The actor calls it from its own task only.
pub trait DieRenderer: Send + 'static {
    fn spawn(&mut self, die: &DieDescriptor);
    fn set_pose(&mut self, id: BodyId, position: Vec3, rotation: Quat);
    fn despawn(&mut self, id: BodyId);
    fn clear(&mut self);
    fn set_visible(&mut self, visible: bool);
    fn resize(&mut self, width: f32, height: f32);
    fn configure(&mut self, _scale: f32, _enable_shadows: bool, _theme_color: &str) {}
}

#[derive(Debug, Default)]
struct HeadlessState {
    poses: HashMap<BodyId, (Vec3, Quat)>,
    hidden: bool,
    size: (f32, f32),
    theme_color: Option<String>,
}

/// Renderer that only records what it was asked to draw.
///
/// Clones share state, so a caller can keep one to inspect the board.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn die_count(&self) -> usize {
        self.state.lock().poses.len()
    }

    pub fn pose(&self, id: BodyId) -> Option<(Vec3, Quat)> {
        self.state.lock().poses.get(&id).copied()
    }

    pub fn is_visible(&self) -> bool {
        !self.state.lock().hidden
    }

    pub fn size(&self) -> (f32, f32) {
        self.state.lock().size
    }

    /// Theme color from the last config update, if any
    pub fn theme_color(&self) -> Option<String> {
        self.state.lock().theme_color.clone()
    }
}

impl DieRenderer for HeadlessRenderer {
    fn spawn(&mut self, die: &DieDescriptor) {
        let mut state = self.state.lock();
        state.poses.insert(die.id, (Vec3::ZERO, Quat::IDENTITY));
        if let Some(companion) = die.companion {
            state.poses.insert(companion, (Vec3::ZERO, Quat::IDENTITY));
        }
    }

    fn set_pose(&mut self, id: BodyId, position: Vec3, rotation: Quat) {
        if let Some(pose) = self.state.lock().poses.get_mut(&id) {
            *pose = (position, rotation);
        }
    }

    fn despawn(&mut self, id: BodyId) {
        self.state.lock().poses.remove(&id);
    }

    fn clear(&mut self) {
        self.state.lock().poses.clear();
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.lock().hidden = !visible;
    }

    fn resize(&mut self, width: f32, height: f32) {
        self.state.lock().size = (width, height);
    }

    fn configure(&mut self, _scale: f32, _enable_shadows: bool, theme_color: &str) {
        self.state.lock().theme_color = Some(theme_color.to_string());
    }
}

#[derive(Debug)]
struct CachedDie {
    /// Body the result is reported under; the tens body for a d100 pair
    primary: BodyId,
    sides: Sides,
    /// `None` for dice that never entered the simulation
    entry: Option<Arc<ColliderEntry>>,
    face_down: bool,
    rotation: Quat,
    asleep: bool,
}

#[derive(Debug)]
enum Spawn {
    Die(DieDescriptor),
    NonDie(DieDescriptor, i32),
}

impl Spawn {
    fn id(&self) -> BodyId {
        match self {
            Spawn::Die(die) | Spawn::NonDie(die, _) => die.id,
        }
    }
}

pub struct WorldActor<R: DieRenderer> {
    registry: Arc<ColliderRegistry>,
    renderer: R,
    physics: mpsc::UnboundedSender<PhysicsMessage>,
    events: mpsc::UnboundedSender<WorldEvent>,
    spawn_tx: mpsc::UnboundedSender<(u64, Spawn)>,
    cache: BTreeMap<BodyId, CachedDie>,
    pairs: HashMap<BodyId, PercentilePair>,
    timers: Vec<JoinHandle<()>>,
    cancelled: HashSet<BodyId>,
    /// Stagger slot of the next spawn
    count: u64,
    pending_spawns: usize,
    delay_ms: u64,
    rendering: bool,
    epoch: u64,
}

/// Channels of a running [`WorldActor`]
pub struct WorldHandle {
    pub messages: mpsc::UnboundedSender<WorldMessage>,
    pub events: mpsc::UnboundedReceiver<WorldEvent>,
    pub task: JoinHandle<()>,
}

impl<R: DieRenderer> WorldActor<R> {
    /// Start the actor on its own task
    ///
    /// # Arguments
    /// * `registry` - Colliders used to read settled dice
    /// * `renderer` - Presentation backend
    /// * `physics` - Sender into the simulation side
    /// * `physics_events` - Updates coming back from the simulation side
    pub fn spawn(
        registry: Arc<ColliderRegistry>,
        renderer: R,
        physics: mpsc::UnboundedSender<PhysicsMessage>,
        physics_events: mpsc::UnboundedReceiver<PhysicsEvent>,
    ) -> WorldHandle {
        let (messages, rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();

        let actor = Self {
            registry,
            renderer,
            physics,
            events: events_tx,
            spawn_tx,
            cache: BTreeMap::new(),
            pairs: HashMap::new(),
            timers: Vec::new(),
            cancelled: HashSet::new(),
            count: 0,
            pending_spawns: 0,
            delay_ms: 0,
            rendering: false,
            epoch: 0,
        };
        let task = tokio::spawn(actor.run(rx, physics_events, spawn_rx));
        WorldHandle {
            messages,
            events,
            task,
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<WorldMessage>,
        mut physics_events: mpsc::UnboundedReceiver<PhysicsEvent>,
        mut spawn_rx: mpsc::UnboundedReceiver<(u64, Spawn)>,
    ) {
        tracing::debug!("world actor started");
        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                Some(event) = physics_events.recv() => self.handle_physics(event),
                Some((epoch, spawn)) = spawn_rx.recv() => self.handle_spawn(epoch, spawn),
            }
        }
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        tracing::debug!("world actor stopped");
    }

    fn handle_message(&mut self, message: WorldMessage) {
        match message {
            WorldMessage::Init {
                width,
                height,
                delay_ms,
                ack,
            } => {
                self.delay_ms = delay_ms;
                self.renderer.resize(width, height);
                // the one buffer starts out on the simulation side
                let buffer = PhysicsMessage::Step {
                    buffer: UpdateBuffer::default(),
                };
                let result = self.physics.send(buffer).map_err(Into::into);
                let _ = ack.send(result);
            }
            WorldMessage::Add(die) => self.schedule(Spawn::Die(die)),
            WorldMessage::AddNonDie { die, value } => self.schedule(Spawn::NonDie(die, value)),
            WorldMessage::Remove {
                id,
                companion,
                hide,
            } => self.remove(id, companion, hide),
            WorldMessage::Discard { id } => {
                self.cancelled.remove(&id);
            }
            WorldMessage::Clear => self.clear(),
            WorldMessage::Resize { width, height } => self.renderer.resize(width, height),
            WorldMessage::SetVisible(visible) => self.renderer.set_visible(visible),
            WorldMessage::UpdateConfig {
                delay_ms,
                scale,
                enable_shadows,
                theme_color,
            } => {
                self.delay_ms = delay_ms;
                self.renderer.configure(scale, enable_shadows, &theme_color);
            }
        }
    }

    /// Space spawns out by `delay` so dice do not land in one lump
    fn schedule(&mut self, spawn: Spawn) {
        let delay = Duration::from_millis(self.count * self.delay_ms);
        self.count += 1;
        self.pending_spawns += 1;

        let tx = self.spawn_tx.clone();
        let epoch = self.epoch;
        self.timers.retain(|timer| !timer.is_finished());
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((epoch, spawn));
        }));
    }

    fn handle_spawn(&mut self, epoch: u64, spawn: Spawn) {
        if epoch != self.epoch {
            return;
        }
        self.pending_spawns = self.pending_spawns.saturating_sub(1);
        if self.cancelled.remove(&spawn.id()) {
            self.check_idle();
            return;
        }

        match spawn {
            Spawn::Die(die) => self.add_die(die),
            Spawn::NonDie(die, value) => {
                self.insert_settled(die.id, die.sides);
                self.report(die.id, value);
                if !self.rendering && self.pending_spawns == 0 && self.all_asleep() {
                    self.emit(WorldEvent::RollComplete);
                }
            }
        }
    }

    fn add_die(&mut self, die: DieDescriptor) {
        let entry = self.registry.get_collider(die.die_type, &die.mesh_name);
        let companion = die
            .companion
            .map(|id| (id, self.registry.get_collider(DieType::D10, &die.mesh_name)));

        let (entry, companion) = match (entry, companion) {
            (Some(entry), None) => (entry, None),
            (Some(entry), Some((id, Some(d10)))) => (entry, Some((id, d10))),
            _ => {
                tracing::warn!(
                    die_type = %die.die_type,
                    mesh_set = %die.mesh_name,
                    "collider missing at spawn, using fallback"
                );
                let value = resolver::fallback_value(die.sides);
                self.insert_settled(die.id, die.sides);
                self.report(die.id, value);
                self.check_idle();
                return;
            }
        };

        let face_down = die.face_down && die.die_type == DieType::D4;
        self.insert(die.id, die.id, die.sides, Some(entry), face_down);
        self.renderer.spawn(&die);
        self.send_physics(PhysicsMessage::AddDie {
            id: die.id,
            die_type: die.die_type,
            mesh_name: die.mesh_name.clone(),
            new_start_point: die.new_start_point,
        });

        if let Some((ones, d10)) = companion {
            self.insert(ones, die.id, Sides::Numeric(10), Some(d10), false);
            self.pairs.insert(die.id, PercentilePair::new(die.id, ones));
            self.send_physics(PhysicsMessage::AddDie {
                id: ones,
                die_type: DieType::D10,
                mesh_name: die.mesh_name,
                new_start_point: false,
            });
        }

        if !self.rendering {
            self.rendering = true;
            self.send_physics(PhysicsMessage::Resume);
        }
    }

    fn handle_physics(&mut self, event: PhysicsEvent) {
        match event {
            PhysicsEvent::Updated(buffer) => {
                for record in buffer.records() {
                    match record {
                        BufferRecord::Pose {
                            id,
                            position,
                            rotation,
                        } => {
                            if let Some(die) = self.cache.get_mut(&id) {
                                die.rotation = rotation;
                                self.renderer.set_pose(id, position, rotation);
                            }
                        }
                        BufferRecord::Asleep { id } => self.handle_asleep(id),
                    }
                }
                self.check_idle();
                self.return_buffer(buffer);
            }
            PhysicsEvent::AddFailed { id, reason } => self.handle_add_failed(id, &reason),
        }
    }

    /// Hand the buffer back after one frame
    fn return_buffer(&mut self, buffer: UpdateBuffer) {
        let physics = self.physics.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FRAME_INTERVAL).await;
            if physics.send(PhysicsMessage::Step { buffer }).is_err() {
                tracing::warn!("simulation side closed");
            }
        });
    }

    fn handle_asleep(&mut self, id: BodyId) {
        let Some(die) = self.cache.get_mut(&id) else {
            return;
        };
        // a body read once is never read again
        if die.asleep {
            return;
        }
        die.asleep = true;
        let Some(entry) = die.entry.clone() else {
            return;
        };
        let raw = resolver::resolve(&entry, die.rotation, die.face_down);
        let (primary, sides) = (die.primary, die.sides);

        match self.pairs.get_mut(&primary) {
            Some(pair) => {
                if let Some(value) = pair.record(id, raw) {
                    self.report(primary, value);
                }
            }
            None => self.report(id, resolver::finalize(sides, raw)),
        }
    }

    fn handle_add_failed(&mut self, id: BodyId, reason: &str) {
        let Some(primary) = self.cache.get(&id).map(|d| d.primary) else {
            return;
        };
        tracing::warn!(%id, reason, "die could not be simulated, using fallback");

        let sides = self.cache.get(&primary).map_or(Sides::Numeric(10), |d| d.sides);
        let members: Vec<BodyId> = match self.pairs.remove(&primary) {
            Some(pair) => vec![pair.tens, pair.ones],
            None => vec![primary],
        };
        for member in members {
            if member != id {
                self.send_physics(PhysicsMessage::RemoveDie { id: member });
            }
            if let Some(die) = self.cache.get_mut(&member) {
                die.asleep = true;
            }
        }
        self.report(primary, resolver::fallback_value(sides));
        self.check_idle();
    }

    fn remove(&mut self, id: BodyId, companion: Option<BodyId>, hide: bool) {
        if !self.cache.contains_key(&id) {
            // not spawned yet
            self.cancelled.insert(id);
        }
        for body in std::iter::once(id).chain(companion) {
            if self.cache.remove(&body).is_some() {
                self.renderer.despawn(body);
                if !hide {
                    self.send_physics(PhysicsMessage::RemoveDie { id: body });
                }
            }
        }
        self.pairs.remove(&id);
        self.emit(WorldEvent::DieRemoved { id });
        self.check_idle();
    }

    fn clear(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.cache.clear();
        self.pairs.clear();
        self.cancelled.clear();
        self.count = 0;
        self.pending_spawns = 0;
        self.rendering = false;
        self.epoch += 1;
        self.renderer.clear();
    }

    /// Stop the step loop once nothing is moving
    fn check_idle(&mut self) {
        if !self.rendering || self.pending_spawns > 0 {
            return;
        }
        let complete = !self.cache.is_empty();
        if complete && !self.all_asleep() {
            return;
        }
        self.rendering = false;
        // the next call staggers from zero again
        self.count = 0;
        self.send_physics(PhysicsMessage::Stop);
        if complete {
            self.emit(WorldEvent::RollComplete);
        }
    }

    fn all_asleep(&self) -> bool {
        self.cache.values().all(|d| d.asleep)
    }

    fn insert(
        &mut self,
        id: BodyId,
        primary: BodyId,
        sides: Sides,
        entry: Option<Arc<ColliderEntry>>,
        face_down: bool,
    ) {
        self.cache.insert(
            id,
            CachedDie {
                primary,
                sides,
                entry,
                face_down,
                rotation: Quat::IDENTITY,
                asleep: false,
            },
        );
    }

    /// Cache a die that already has its value and is never simulated
    fn insert_settled(&mut self, id: BodyId, sides: Sides) {
        self.insert(id, id, sides, None, false);
        if let Some(die) = self.cache.get_mut(&id) {
            die.asleep = true;
        }
    }

    fn report(&mut self, id: BodyId, value: i32) {
        self.emit(WorldEvent::Asleep { id });
        self.emit(WorldEvent::RollResult { id, value });
    }

    fn emit(&self, event: WorldEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("orchestrator closed, dropping world event");
        }
    }

    fn send_physics(&self, message: PhysicsMessage) {
        if self.physics.send(message).is_err() {
            tracing::warn!("simulation side closed, dropping message");
        }
    }
}
