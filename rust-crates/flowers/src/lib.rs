pub mod animation;
pub mod catalog;
pub mod character;
pub mod model;
pub mod scoring;
pub mod sequencer;
pub mod store;
pub mod tracker;

pub use catalog::{
    Catalog,
    CatalogError,
    CatalogProvider,
};
pub use model::{
    Direction,
    HistoryEntry,
    Profile,
    Reward,
    RewardValue,
    ScoreItem,
    ScoreTier,
    SequencerTrigger,
};
pub use sequencer::{
    SequenceEvent,
    Sequencer,
};
pub use store::ScoreStore;
pub use tracker::{
    Adjustment,
    Tracker,
};

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
