mod bridge;
mod config;
mod dice_box;
mod error;
mod events;
mod ids;
mod ledger;
mod notation;
mod resolver;
mod theme;

pub use bridge::{
    DieDescriptor, DieRenderer, HeadlessRenderer, PhysicsEvent, PhysicsMessage, PhysicsWorker,
    WorldActor, WorldEvent, WorldHandle, WorldMessage, FRAME_INTERVAL,
};
pub use config::{ConfigChanges, ConfigPatch, DiceBoxConfig};
pub use dice_box::{DiceBox, RemoveOptions, RerollOptions, RollOptions};
pub use error::{DiceError, Result};
pub use events::{DiceEvent, EventHub};
pub use ids::{BodyId, CollectionId, GroupId, RollId};
pub use ledger::{
    Allocation, CollectionHandle, Die, DieState, GroupResult, Ledger, RemovalUpdate, RemovedDie,
    ResultUpdate, RollResult,
};
pub use notation::{parse, parse_many, DieSpec, Notation, NotationInput, RawDieSpec, Sides};
pub use resolver::{
    combine_percentile, fallback_value, finalize, normalize_d10, read_face, resolve,
    PercentilePair,
};
pub use theme::{
    FileThemeSource, StaticThemeSource, ThemeCache, ThemeData, ThemeSource, DEFAULT_MATERIAL,
    DEFAULT_MESH_NAME,
};

// Re-export for convenience
pub use dicebox_physics;
