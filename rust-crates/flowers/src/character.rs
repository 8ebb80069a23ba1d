use crate::{
    animation::{
        AnimationBackend,
        AnimationHandle,
        ClipId,
        PlayMode,
        normalized_progress,
    },
    model::Direction,
    scoring::CharacterMood,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    warn,
};

pub const CHARACTER_FADE: Duration = Duration::from_millis(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacterEvent {
    ReactionFinished(Direction),
}

struct PendingSwitch {
    clip: ClipId,
    mode: PlayMode,
    fade_started: Instant,
}

struct LiveClip<H> {
    clip: ClipId,
    handle: Option<H>,
}

/// The character panel: a looping clip that follows the score mood, interrupted
/// by one-shot reactions after each adjustment.
pub struct CharacterStage<B: AnimationBackend> {
    backend: B,
    fade: Duration,
    score: u32,
    reaction: Option<Direction>,
    live: Option<LiveClip<B::Handle>>,
    pending: Option<PendingSwitch>,
}

impl<B: AnimationBackend> CharacterStage<B> {
    /// Loads the steady clip for `score` right away.
    pub fn new(backend: B, score: u32, now: Instant) -> Self {
        let mut stage = Self {
            backend,
            fade: CHARACTER_FADE,
            score,
            reaction: None,
            live: None,
            pending: None,
        };
        let clip = ClipId::steady(CharacterMood::for_score(score));
        stage.mount(clip, PlayMode::Loop, now);
        stage
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn mood(&self) -> CharacterMood {
        CharacterMood::for_score(self.score)
    }

    pub fn reaction(&self) -> Option<Direction> {
        self.reaction
    }

    /// The clip on screen (or the one that failed to load), ignoring a pending
    /// switch.
    pub fn current_clip(&self) -> Option<ClipId> {
        self.live.as_ref().map(|live| live.clip)
    }

    pub fn handle(&self) -> Option<&B::Handle> {
        self.live.as_ref().and_then(|live| live.handle.as_ref())
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        match &self.pending {
            Some(pending) => {
                1.0 - normalized_progress(
                    now.saturating_duration_since(pending.fade_started),
                    self.fade,
                )
            }
            None => 1.0,
        }
    }

    pub fn set_score(&mut self, score: u32, now: Instant) {
        self.score = score;
        if self.reaction.is_none() {
            self.switch_to(ClipId::steady(self.mood()), PlayMode::Loop, now);
        }
    }

    pub fn react(&mut self, direction: Direction, now: Instant) {
        self.reaction = Some(direction);
        self.switch_to(ClipId::reaction(direction), PlayMode::Once, now);
    }

    pub fn advance(&mut self, now: Instant) -> Vec<CharacterEvent> {
        let mut events = vec![];

        if let Some(pending) = &self.pending
            && now >= pending.fade_started + self.fade
        {
            let (clip, mode) = (pending.clip, pending.mode);
            self.pending = None;
            self.mount(clip, mode, now);
        }

        if self.pending.is_none()
            && let Some(direction) = self.reaction
            && self.reaction_done(direction, now)
        {
            self.reaction = None;
            events.push(CharacterEvent::ReactionFinished(direction));
            self.switch_to(ClipId::steady(self.mood()), PlayMode::Loop, now);
        }

        events
    }

    fn reaction_done(&self, direction: Direction, now: Instant) -> bool {
        match &self.live {
            Some(live) if live.clip == ClipId::reaction(direction) => live
                .handle
                .as_ref()
                .is_none_or(|handle| handle.is_finished(now)),
            _ => false,
        }
    }

    fn switch_to(&mut self, clip: ClipId, mode: PlayMode, now: Instant) {
        let target = self
            .pending
            .as_ref()
            .map(|pending| pending.clip)
            .or(self.current_clip());
        if target == Some(clip) {
            debug!("character clip {clip} already selected");
            return;
        }
        let fade_started = self
            .pending
            .as_ref()
            .map_or(now, |pending| pending.fade_started);
        self.pending = Some(PendingSwitch {
            clip,
            mode,
            fade_started,
        });
    }

    fn mount(&mut self, clip: ClipId, mode: PlayMode, now: Instant) {
        self.unmount();
        let handle = match self.backend.load(clip, mode, now) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("failed to load character clip {clip}: {err:#}");
                None
            }
        };
        self.live = Some(LiveClip { clip, handle });
    }

    fn unmount(&mut self) {
        if let Some(mut live) = self.live.take()
            && let Some(mut handle) = live.handle.take()
        {
            handle.destroy();
        }
    }
}

impl<B: AnimationBackend> Drop for CharacterStage<B> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::fake::FakeBackend;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn new__loads_steady_clip_for_score() {
        // given
        let backend = FakeBackend::new();

        // when
        let sut = CharacterStage::new(backend.clone(), 75, Instant::now());

        // then
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterGood));
        assert_eq!(
            backend.loads(),
            vec![(ClipId::CharacterGood, PlayMode::Loop)]
        );
    }

    #[test]
    fn react__plays_reaction_then_returns_to_steady_clip() {
        // given
        let backend = FakeBackend::new();
        let t0 = Instant::now();
        let mut sut = CharacterStage::new(backend.clone(), 88, t0);

        // when
        sut.react(Direction::Increase, t0);
        sut.set_score(93, t0);

        // then
        let halfway = sut.opacity(t0 + ms(150));
        assert!((halfway - 0.5).abs() < 0.01, "opacity was {halfway}");
        assert!(sut.advance(t0 + ms(299)).is_empty());
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterGood));

        assert!(sut.advance(t0 + ms(300)).is_empty());
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterCelebrate));
        assert_eq!(sut.opacity(t0 + ms(300)), 1.0);

        assert!(sut.advance(t0 + ms(1699)).is_empty());
        assert_eq!(
            sut.advance(t0 + ms(1700)),
            vec![CharacterEvent::ReactionFinished(Direction::Increase)]
        );
        assert_eq!(sut.reaction(), None);

        sut.advance(t0 + ms(2000));
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterExcellent));
        assert_eq!(
            backend.loads(),
            vec![
                (ClipId::CharacterGood, PlayMode::Loop),
                (ClipId::CharacterCelebrate, PlayMode::Once),
                (ClipId::CharacterExcellent, PlayMode::Loop),
            ]
        );
        assert_eq!(
            backend.destroyed(),
            vec![ClipId::CharacterGood, ClipId::CharacterCelebrate]
        );
    }

    #[test]
    fn set_score__when_mood_unchanged_then_skips_switch() {
        // given
        let backend = FakeBackend::new();
        let t0 = Instant::now();
        let mut sut = CharacterStage::new(backend.clone(), 70, t0);

        // when
        sut.set_score(65, t0);
        sut.advance(t0 + ms(1000));

        // then
        assert_eq!(backend.loads().len(), 1);
        assert_eq!(sut.opacity(t0), 1.0);
    }

    #[test]
    fn react__when_clip_missing_then_finishes_without_hanging() {
        // given
        let backend = FakeBackend::new();
        backend.fail(ClipId::CharacterDismayed);
        let t0 = Instant::now();
        let mut sut = CharacterStage::new(backend.clone(), 50, t0);

        // when
        sut.react(Direction::Decrease, t0);
        let events = sut.advance(t0 + ms(300));

        // then
        assert_eq!(
            events,
            vec![CharacterEvent::ReactionFinished(Direction::Decrease)]
        );
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterDismayed));
        sut.advance(t0 + ms(600));
        assert_eq!(sut.current_clip(), Some(ClipId::CharacterNeedsWork));
    }

    #[test]
    fn drop__destroys_live_clip() {
        // given
        let backend = FakeBackend::new();
        let sut = CharacterStage::new(backend.clone(), 100, Instant::now());

        // when
        drop(sut);

        // then
        assert_eq!(backend.destroyed(), vec![ClipId::CharacterExcellent]);
    }
}
