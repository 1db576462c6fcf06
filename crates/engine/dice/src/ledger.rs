//! Roll / group / collection bookkeeping.
//!
//! Groups own their dice. Collections only reference the dice of one
//! `roll`/`add`/`remove` call and hold the completion signal the caller is
//! awaiting. Every collection completes exactly once: with a snapshot when its
//! last die resolves (or is removed), or with `ClearedWhileRolling` when the
//! board is cleared first.

use crate::error::{DiceError, Result};
use crate::ids::{BodyId, CollectionId, GroupId, RollId};
use crate::notation::{DieSpec, Sides};
use dicebox_physics::MAX_BODY_ID;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Lifecycle of one die
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DieState {
    /// Allocated, waiting for its theme or its spawn slot
    Pending,
    /// Handed to the presentation side
    Simulating,
    /// Body came to rest, value not read yet
    Asleep,
    Resolved,
    Removed,
}

/// Ledger record of one die
#[derive(Debug, Clone)]
pub struct Die {
    pub id: BodyId,
    /// Ones body of a two-body d100
    pub companion: Option<BodyId>,
    pub roll_id: RollId,
    pub group_id: GroupId,
    pub collection_id: CollectionId,
    pub remove_collection_id: Option<CollectionId>,
    pub sides: Sides,
    pub theme: String,
    pub theme_color: Option<String>,
    pub value: Option<i32>,
    pub state: DieState,
}

impl Die {
    /// Caller-facing view without ledger internals
    pub fn to_result(&self) -> RollResult {
        RollResult {
            sides: self.sides,
            group_id: self.group_id,
            roll_id: self.roll_id,
            theme: self.theme.clone(),
            theme_color: self.theme_color.clone(),
            value: self.value,
        }
    }
}

/// One die as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollResult {
    pub sides: Sides,
    pub group_id: GroupId,
    pub roll_id: RollId,
    pub theme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    /// `None` until the die has been read
    pub value: Option<i32>,
}

/// A die as reported by a completed `remove`
pub type RemovedDie = RollResult;

/// Snapshot of one group with recomputed value and quantity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub id: GroupId,
    pub notation: String,
    pub sides: Sides,
    pub qty: usize,
    pub modifier: i32,
    pub value: i32,
    pub theme: String,
    pub rolls: Vec<RollResult>,
}

#[derive(Debug)]
struct Group {
    id: GroupId,
    notation: String,
    sides: Sides,
    modifier: i32,
    theme: String,
    rolls: BTreeMap<RollId, Die>,
}

impl Group {
    /// Sum of read values, unread dice count as zero. Saturates instead of
    /// overflowing.
    fn value(&self) -> i32 {
        self.rolls
            .values()
            .map(|die| die.value.unwrap_or(0))
            .fold(self.modifier, i32::saturating_add)
    }

    fn snapshot(&self) -> GroupResult {
        GroupResult {
            id: self.id,
            notation: self.notation.clone(),
            sides: self.sides,
            qty: self.rolls.len(),
            modifier: self.modifier,
            value: self.value(),
            theme: self.theme.clone(),
            rolls: self.rolls.values().map(Die::to_result).collect(),
        }
    }
}

enum Completion {
    Rolled(oneshot::Sender<Result<Vec<GroupResult>>>),
    Removed(oneshot::Sender<Result<Vec<RemovedDie>>>),
}

struct Collection {
    notation: String,
    /// Roll ids of this call, in submission order
    rolls: Vec<RollId>,
    completed: usize,
    groups: BTreeSet<GroupId>,
    removed: Vec<RemovedDie>,
    completion: Option<Completion>,
}

impl Collection {
    fn new(notation: String, completion: Completion) -> Self {
        Self {
            notation,
            rolls: Vec::new(),
            completed: 0,
            groups: BTreeSet::new(),
            removed: Vec::new(),
            completion: Some(completion),
        }
    }
}

/// Awaitable completion of one `roll`/`add`/`remove` call
#[derive(Debug)]
pub struct CollectionHandle<T> {
    id: CollectionId,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> CollectionHandle<T> {
    pub fn id(&self) -> CollectionId {
        self.id
    }
}

impl<T> Future for CollectionHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DiceError::Disconnected)))
    }
}

/// Dice allocated for one `roll`/`add` call
#[derive(Debug)]
pub struct Allocation {
    pub collection_id: CollectionId,
    /// Ledger epoch the dice belong to; stale after `clear`
    pub epoch: u64,
    pub dice: Vec<Die>,
}

/// What a recorded result changed
#[derive(Debug, Clone)]
pub struct ResultUpdate {
    pub die: RollResult,
    /// Set when this result completed its collection
    pub completed: Option<Vec<GroupResult>>,
}

/// What a recorded removal changed
#[derive(Debug, Clone)]
pub struct RemovalUpdate {
    pub die: RemovedDie,
    /// Set when this removal completed its remove collection
    pub completed: Option<Vec<RemovedDie>>,
    /// Set when the die was unread and its removal completed the roll it
    /// belonged to
    pub completed_roll: Option<Vec<GroupResult>>,
}

/// The roll ledger.
///
/// Body ids are not reused within a run of `clear`s, so late reports for
/// dice from before a `clear` are recognized as unknown and dropped. Ids stay
/// within [`MAX_BODY_ID`] so they survive the update buffer.
#[derive(Default)]
pub struct Ledger {
    groups: BTreeMap<GroupId, Group>,
    roll_index: HashMap<RollId, GroupId>,
    body_index: HashMap<BodyId, RollId>,
    collections: HashMap<CollectionId, Collection>,
    next_collection: u32,
    next_group: u32,
    next_roll: u64,
    next_body: u32,
    epoch: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Allocate groups and dice for one `roll`/`add` call.
    ///
    /// Rejects unknown `group_id`s before anything is written. Requested
    /// roll ids that collide are bumped (`"5"` to `"5.1"`).
    pub fn allocate(
        &mut self,
        specs: &[DieSpec],
        notation: String,
        default_theme: &str,
    ) -> Result<(Allocation, CollectionHandle<Vec<GroupResult>>)> {
        if let Some(missing) = specs
            .iter()
            .filter_map(|spec| spec.group_id)
            .find(|id| !self.groups.contains_key(id))
        {
            return Err(DiceError::UnknownGroup(missing.0));
        }

        let bodies: u64 = specs
            .iter()
            .map(|spec| {
                let per_die = if spec.sides == Sides::Numeric(100) { 2 } else { 1 };
                u64::from(spec.qty) * per_die
            })
            .sum();
        if u64::from(self.next_body) + bodies > u64::from(MAX_BODY_ID) + 1 {
            tracing::warn!(next_body = self.next_body, bodies, "body ids exhausted");
            return Err(DiceError::BodyIdsExhausted);
        }

        let collection_id = self.next_collection_id();
        let (tx, rx) = oneshot::channel();
        let mut collection = Collection::new(notation, Completion::Rolled(tx));
        let mut dice = Vec::new();

        for spec in specs {
            let theme = spec.theme.as_deref().unwrap_or(default_theme).to_string();
            let group_id = match spec.group_id {
                Some(id) => id,
                None => {
                    let id = GroupId(self.next_group);
                    self.next_group += 1;
                    self.groups.insert(
                        id,
                        Group {
                            id,
                            notation: spec.to_string(),
                            sides: spec.sides,
                            modifier: spec.modifier,
                            theme: theme.clone(),
                            rolls: BTreeMap::new(),
                        },
                    );
                    id
                }
            };

            for _ in 0..spec.qty {
                let roll_id = self.unique_roll_id(spec.roll_id);
                let id = self.next_body_id();
                let companion = (spec.sides == Sides::Numeric(100)).then(|| self.next_body_id());

                let die = Die {
                    id,
                    companion,
                    roll_id,
                    group_id,
                    collection_id,
                    remove_collection_id: None,
                    sides: spec.sides,
                    theme: theme.clone(),
                    theme_color: spec.theme_color.clone(),
                    value: None,
                    state: DieState::Pending,
                };

                self.roll_index.insert(roll_id, group_id);
                self.body_index.insert(id, roll_id);
                if let Some(companion) = companion {
                    self.body_index.insert(companion, roll_id);
                }
                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.rolls.insert(roll_id, die.clone());
                }
                collection.rolls.push(roll_id);
                collection.groups.insert(group_id);
                dice.push(die);
            }
        }

        tracing::debug!(
            collection = %collection_id,
            notation = %collection.notation,
            dice = dice.len(),
            "allocated roll"
        );
        self.collections.insert(collection_id, collection);
        self.try_complete(collection_id);

        Ok((
            Allocation {
                collection_id,
                epoch: self.epoch,
                dice,
            },
            CollectionHandle {
                id: collection_id,
                rx,
            },
        ))
    }

    /// Open a remove collection for the given dice.
    ///
    /// Fails without side effects when any die is unknown or already being
    /// removed.
    pub fn begin_remove(
        &mut self,
        roll_ids: &[RollId],
        notation: String,
    ) -> Result<(Vec<Die>, CollectionHandle<Vec<RemovedDie>>)> {
        let mut seen = BTreeSet::new();
        for roll_id in roll_ids {
            match self.die(*roll_id) {
                Some(die) if die.remove_collection_id.is_none() && seen.insert(*roll_id) => {}
                _ => return Err(DiceError::UnknownDie(*roll_id)),
            }
        }

        let collection_id = self.next_collection_id();
        let (tx, rx) = oneshot::channel();
        let mut collection = Collection::new(notation, Completion::Removed(tx));
        let mut dice = Vec::with_capacity(roll_ids.len());
        for roll_id in roll_ids {
            if let Some(die) = self.die_mut(*roll_id) {
                die.remove_collection_id = Some(collection_id);
                collection.rolls.push(*roll_id);
                collection.groups.insert(die.group_id);
                dice.push(die.clone());
            }
        }

        self.collections.insert(collection_id, collection);
        self.try_complete(collection_id);
        Ok((
            dice,
            CollectionHandle {
                id: collection_id,
                rx,
            },
        ))
    }

    /// Move a die forward in its lifecycle; never backwards
    pub fn set_state(&mut self, body: BodyId, state: DieState) {
        let Some(roll_id) = self.body_index.get(&body).copied() else {
            return;
        };
        if let Some(die) = self.die_mut(roll_id) {
            if state_rank(state) > state_rank(die.state) {
                die.state = state;
            }
        }
    }

    /// Write a die's value and advance its collection.
    ///
    /// Reports for unknown bodies (removed, or from before a clear) and
    /// second reports for a die already read are ignored.
    pub fn record_result(&mut self, body: BodyId, value: i32) -> Option<ResultUpdate> {
        let Some(roll_id) = self.body_index.get(&body).copied() else {
            tracing::debug!(%body, "result for unknown die ignored");
            return None;
        };
        let die = self.die_mut(roll_id)?;
        if die.value.is_some() {
            return None;
        }
        die.value = Some(value);
        die.state = DieState::Resolved;
        let result = die.to_result();
        let collection_id = die.collection_id;

        let completed = match self.collections.get_mut(&collection_id) {
            Some(collection) => {
                collection.completed += 1;
                self.try_complete(collection_id)
                    .and_then(|done| done.left())
            }
            None => None,
        };

        Some(ResultUpdate {
            die: result,
            completed,
        })
    }

    /// Detach a removed die from its group and advance the collections that
    /// were waiting on it.
    pub fn record_removal(&mut self, body: BodyId) -> Option<RemovalUpdate> {
        let roll_id = self.body_index.get(&body).copied()?;
        let group_id = self.roll_index.remove(&roll_id)?;
        let mut die = self.groups.get_mut(&group_id)?.rolls.remove(&roll_id)?;
        self.body_index.remove(&die.id);
        if let Some(companion) = die.companion {
            self.body_index.remove(&companion);
        }
        die.state = DieState::Removed;
        let removed = die.to_result();

        // A die removed before it was read still counts toward its roll.
        let mut completed_roll = None;
        if die.value.is_none() {
            if let Some(collection) = self.collections.get_mut(&die.collection_id) {
                collection.completed += 1;
                completed_roll = self
                    .try_complete(die.collection_id)
                    .and_then(|done| done.left());
            }
        }

        let completed = match die
            .remove_collection_id
            .and_then(|id| self.collections.get_mut(&id).map(|c| (id, c)))
        {
            Some((id, collection)) => {
                collection.completed += 1;
                collection.removed.push(removed.clone());
                self.try_complete(id).and_then(|done| done.right())
            }
            None => None,
        };

        Some(RemovalUpdate {
            die: removed,
            completed,
            completed_roll,
        })
    }

    /// Current state of every group, values recomputed
    pub fn group_results(&self) -> Vec<GroupResult> {
        self.groups.values().map(Group::snapshot).collect()
    }

    pub fn group(&self, id: GroupId) -> Option<GroupResult> {
        self.groups.get(&id).map(Group::snapshot)
    }

    pub fn die(&self, roll_id: RollId) -> Option<&Die> {
        let group_id = self.roll_index.get(&roll_id)?;
        self.groups.get(group_id)?.rolls.get(&roll_id)
    }

    pub fn die_by_body(&self, body: BodyId) -> Option<&Die> {
        self.die(*self.body_index.get(&body)?)
    }

    pub fn contains_body(&self, body: BodyId) -> bool {
        self.body_index.contains_key(&body)
    }

    /// Collections still waiting on dice
    pub fn pending_collections(&self) -> usize {
        self.collections
            .values()
            .filter(|c| c.completion.is_some())
            .count()
    }

    /// Drop every group and die, rejecting collections still in flight.
    ///
    /// Roll, group and collection counters restart at zero. Body ids keep
    /// counting until half their range is used, then restart; reports still
    /// in flight from before the clear carry ids from the upper half.
    pub fn clear(&mut self) {
        let mut rejected = 0;
        for (_, mut collection) in self.collections.drain() {
            match collection.completion.take() {
                Some(Completion::Rolled(tx)) => {
                    rejected += 1;
                    let _ = tx.send(Err(DiceError::ClearedWhileRolling));
                }
                Some(Completion::Removed(tx)) => {
                    rejected += 1;
                    let _ = tx.send(Err(DiceError::ClearedWhileRolling));
                }
                None => {}
            }
        }
        if rejected > 0 {
            tracing::info!(rejected, "cleared while rolling");
        }

        self.groups.clear();
        self.roll_index.clear();
        self.body_index.clear();
        self.next_collection = 0;
        self.next_group = 0;
        self.next_roll = 0;
        if self.next_body > MAX_BODY_ID / 2 {
            tracing::debug!(next_body = self.next_body, "restarting body ids");
            self.next_body = 0;
        }
        self.epoch += 1;
    }

    fn die_mut(&mut self, roll_id: RollId) -> Option<&mut Die> {
        let group_id = self.roll_index.get(&roll_id)?;
        self.groups.get_mut(group_id)?.rolls.get_mut(&roll_id)
    }

    fn next_collection_id(&mut self) -> CollectionId {
        let id = CollectionId(self.next_collection);
        self.next_collection += 1;
        id
    }

    fn next_body_id(&mut self) -> BodyId {
        let id = BodyId(self.next_body);
        self.next_body += 1;
        id
    }

    fn unique_roll_id(&mut self, requested: Option<RollId>) -> RollId {
        let mut roll_id = requested.unwrap_or_else(|| {
            let id = RollId::new(self.next_roll);
            self.next_roll += 1;
            id
        });
        while self.roll_index.contains_key(&roll_id) {
            roll_id = roll_id.bump();
        }
        roll_id
    }

    /// Fire a collection's completion once all of its dice are accounted for
    fn try_complete(&mut self, id: CollectionId) -> Option<Either> {
        let collection = self.collections.get_mut(&id)?;
        if collection.completed < collection.rolls.len() {
            return None;
        }
        let completion = collection.completion.take()?;
        let groups: Vec<GroupId> = collection.groups.iter().copied().collect();
        let removed = std::mem::take(&mut collection.removed);
        self.collections.remove(&id);

        tracing::debug!(collection = %id, "collection complete");
        match completion {
            Completion::Rolled(tx) => {
                let snapshot: Vec<GroupResult> = groups
                    .iter()
                    .filter_map(|g| self.groups.get(g).map(Group::snapshot))
                    .collect();
                let _ = tx.send(Ok(snapshot.clone()));
                Some(Either::Rolled(snapshot))
            }
            Completion::Removed(tx) => {
                let _ = tx.send(Ok(removed.clone()));
                Some(Either::Removed(removed))
            }
        }
    }
}

enum Either {
    Rolled(Vec<GroupResult>),
    Removed(Vec<RemovedDie>),
}

impl Either {
    fn left(self) -> Option<Vec<GroupResult>> {
        match self {
            Either::Rolled(groups) => Some(groups),
            Either::Removed(_) => None,
        }
    }

    fn right(self) -> Option<Vec<RemovedDie>> {
        match self {
            Either::Removed(dice) => Some(dice),
            Either::Rolled(_) => None,
        }
    }
}

fn state_rank(state: DieState) -> u8 {
    match state {
        DieState::Pending => 0,
        DieState::Simulating => 1,
        DieState::Asleep => 2,
        DieState::Resolved => 3,
        DieState::Removed => 4,
    }
}
