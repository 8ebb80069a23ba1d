use crate::{
    model::Direction,
    scoring::CharacterMood,
};
use std::{
    fmt,
    time::{
        Duration,
        Instant,
    },
};

/// Every clip the app can play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClipId {
    FlowerIncrease,
    FlowerDecrease,
    CharacterExcellent,
    CharacterGood,
    CharacterNeedsWork,
    CharacterCelebrate,
    CharacterDismayed,
}

impl ClipId {
    pub const ALL: [ClipId; 7] = [
        ClipId::FlowerIncrease,
        ClipId::FlowerDecrease,
        ClipId::CharacterExcellent,
        ClipId::CharacterGood,
        ClipId::CharacterNeedsWork,
        ClipId::CharacterCelebrate,
        ClipId::CharacterDismayed,
    ];

    /// file stem used for clip overrides
    pub fn name(self) -> &'static str {
        match self {
            ClipId::FlowerIncrease => "flower-add",
            ClipId::FlowerDecrease => "flower-subtract",
            ClipId::CharacterExcellent => "character-excellent",
            ClipId::CharacterGood => "character-good",
            ClipId::CharacterNeedsWork => "character-needs-work",
            ClipId::CharacterCelebrate => "character-celebrate",
            ClipId::CharacterDismayed => "character-dismayed",
        }
    }

    pub fn decorative(direction: Direction) -> Self {
        match direction {
            Direction::Increase => ClipId::FlowerIncrease,
            Direction::Decrease => ClipId::FlowerDecrease,
        }
    }

    pub fn steady(mood: CharacterMood) -> Self {
        match mood {
            CharacterMood::Excellent => ClipId::CharacterExcellent,
            CharacterMood::Good => ClipId::CharacterGood,
            CharacterMood::NeedsWork => ClipId::CharacterNeedsWork,
        }
    }

    pub fn reaction(direction: Direction) -> Self {
        match direction {
            Direction::Increase => ClipId::CharacterCelebrate,
            Direction::Decrease => ClipId::CharacterDismayed,
        }
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayMode {
    Once,
    Loop,
}

/// A live clip instance.
pub trait AnimationHandle {
    /// Only meaningful for `PlayMode::Once`; looping clips never finish.
    fn is_finished(&self, now: Instant) -> bool;

    /// Stop playback and release the render target. Called exactly once before
    /// the handle is dropped.
    fn destroy(&mut self);
}

/// Creates clip instances. Loading may fail (missing or broken asset).
pub trait AnimationBackend {
    type Handle: AnimationHandle;

    fn load(
        &mut self,
        clip: ClipId,
        mode: PlayMode,
        now: Instant,
    ) -> crate::Result<Self::Handle>;
}

pub(crate) fn normalized_progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
}
