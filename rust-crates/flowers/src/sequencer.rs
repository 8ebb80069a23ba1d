use crate::{
    animation::{
        AnimationBackend,
        AnimationHandle,
        ClipId,
        PlayMode,
        normalized_progress,
    },
    model::{
        Direction,
        SequencerTrigger,
    },
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    warn,
};


pub const ROLL_DURATION: Duration = Duration::from_millis(1000);
pub const ROLL_TICK: Duration = Duration::from_millis(100);
pub const MOUNT_DELAY: Duration = Duration::from_millis(100);
pub const DECORATIVE_CLIP_DURATION: Duration = Duration::from_millis(1400);
pub const HOLD_DURATION: Duration = Duration::from_millis(1000);
pub const FADE_DURATION: Duration = Duration::from_millis(500);

/// Fixed deadlines of a sequence, measured from its start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceTiming {
    pub roll: Duration,
    pub roll_tick: Duration,
    pub mount_delay: Duration,
    pub increase_clip: Duration,
    pub decrease_clip: Duration,
    pub hold: Duration,
    pub fade: Duration,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            roll: ROLL_DURATION,
            roll_tick: ROLL_TICK,
            mount_delay: MOUNT_DELAY,
            increase_clip: DECORATIVE_CLIP_DURATION,
            decrease_clip: DECORATIVE_CLIP_DURATION,
            hold: HOLD_DURATION,
            fade: FADE_DURATION,
        }
    }
}

impl SequenceTiming {
    pub fn clip_duration(&self, direction: Direction) -> Duration {
        match direction {
            Direction::Increase => self.increase_clip,
            Direction::Decrease => self.decrease_clip,
        }
    }

    pub fn settle_after(&self) -> Duration {
        self.roll
    }

    pub fn mount_after(&self) -> Duration {
        self.roll + self.mount_delay
    }

    pub fn fade_after(&self, direction: Direction) -> Duration {
        self.roll + self.clip_duration(direction) + self.hold
    }

    pub fn complete_after(&self, direction: Direction) -> Duration {
        self.fade_after(direction) + self.fade
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Rolling,
    Settled,
    Playing,
    FadingOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceEvent {
    RollingComplete,
    SequenceComplete,
}

struct ActiveSequence<H> {
    trigger: SequencerTrigger,
    started_at: Instant,
    phase: Phase,
    displayed: u32,
    next_roll_tick: Instant,
    clip: Option<H>,
    reported_early_finish: bool,
}

/// What the shell needs to draw the running sequence.
pub struct SequenceView<'a, H> {
    pub phase: Phase,
    pub trigger: &'a SequencerTrigger,
    pub displayed: u32,
    pub clip: Option<&'a H>,
    /// 1.0 until the fade starts, then down to 0.0
    pub opacity: f32,
}

/// Runs one adjustment animation at a time: roll the magnitude, settle on the
/// target, play the decorative clip, hold, fade out.
///
/// The sequencer owns no timers. The caller drives it with [`Sequencer::advance`]
/// and reacts to the returned events.
pub struct Sequencer<B: AnimationBackend> {
    backend: B,
    timing: SequenceTiming,
    rng: StdRng,
    active: Option<ActiveSequence<B::Handle>>,
}

impl<B: AnimationBackend> Sequencer<B> {
    pub fn new(backend: B) -> Self {
        Self::with_rng(backend, StdRng::from_os_rng())
    }

    pub fn with_rng(backend: B, rng: StdRng) -> Self {
        Self {
            backend,
            timing: SequenceTiming::default(),
            rng,
            active: None,
        }
    }

    pub fn with_timing(mut self, timing: SequenceTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &SequenceTiming {
        &self.timing
    }

    pub fn phase(&self) -> Phase {
        self.active.as_ref().map_or(Phase::Idle, |active| active.phase)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Returns `false` when a sequence is already running or the trigger is
    /// invalid. A rejected start changes nothing.
    pub fn start(&mut self, trigger: SequencerTrigger, now: Instant) -> bool {
        if let Some(active) = &self.active {
            debug!(
                "sequence for {:?} still {:?}, dropping trigger for {:?}",
                active.trigger.item_label, active.phase, trigger.item_label
            );
            return false;
        }
        if !trigger.is_valid() {
            warn!("rejecting invalid sequencer trigger {trigger:?}");
            return false;
        }

        debug!(
            "starting {} sequence for {:?}, target {}",
            trigger.direction, trigger.item_label, trigger.target_magnitude
        );
        self.active = Some(ActiveSequence {
            displayed: trigger.min_magnitude,
            trigger,
            started_at: now,
            phase: Phase::Rolling,
            next_roll_tick: now + self.timing.roll_tick,
            clip: None,
            reported_early_finish: false,
        });
        true
    }

    /// Process every deadline due at `now`, in order.
    pub fn advance(&mut self, now: Instant) -> Vec<SequenceEvent> {
        let mut events = vec![];

        loop {
            let Some(active) = self.active.as_mut() else {
                break;
            };
            let started_at = active.started_at;
            let direction = active.trigger.direction;

            match active.phase {
                Phase::Rolling => {
                    if now >= started_at + self.timing.settle_after() {
                        active.displayed = active.trigger.target_magnitude;
                        active.phase = Phase::Settled;
                        events.push(SequenceEvent::RollingComplete);
                        continue;
                    }
                    if now >= active.next_roll_tick {
                        active.displayed = self.rng.random_range(
                            active.trigger.min_magnitude..=active.trigger.max_magnitude,
                        );
                        while active.next_roll_tick <= now {
                            active.next_roll_tick += self.timing.roll_tick.max(Duration::from_millis(1));
                        }
                    }
                    break;
                }
                Phase::Settled => {
                    let mount_at = started_at + self.timing.mount_after();
                    if now < mount_at {
                        break;
                    }
                    let clip = ClipId::decorative(direction);
                    match self.backend.load(clip, PlayMode::Once, mount_at) {
                        Ok(handle) => active.clip = Some(handle),
                        Err(err) => warn!("failed to load clip {clip}: {err:#}"),
                    }
                    active.phase = Phase::Playing;
                }
                Phase::Playing => {
                    let fade_at = started_at + self.timing.fade_after(direction);
                    if !active.reported_early_finish
                        && now < fade_at
                        && active
                            .clip
                            .as_ref()
                            .is_some_and(|clip| clip.is_finished(now))
                    {
                        debug!("decorative clip finished before the hold deadline");
                        active.reported_early_finish = true;
                    }
                    if now < fade_at {
                        break;
                    }
                    active.phase = Phase::FadingOut;
                }
                Phase::FadingOut => {
                    if now < started_at + self.timing.complete_after(direction) {
                        break;
                    }
                    self.reset();
                    events.push(SequenceEvent::SequenceComplete);
                    break;
                }
                Phase::Idle => break,
            }
        }

        events
    }

    /// Stop without emitting anything.
    pub fn cancel(&mut self) {
        if self.active.is_some() {
            debug!("cancelling active sequence");
        }
        self.reset();
    }

    pub fn view(&self, now: Instant) -> Option<SequenceView<'_, B::Handle>> {
        let active = self.active.as_ref()?;
        let opacity = match active.phase {
            Phase::FadingOut => {
                let fade_at =
                    active.started_at + self.timing.fade_after(active.trigger.direction);
                1.0 - normalized_progress(now.saturating_duration_since(fade_at), self.timing.fade)
            }
            _ => 1.0,
        };
        Some(SequenceView {
            phase: active.phase,
            trigger: &active.trigger,
            displayed: active.displayed,
            clip: active.clip.as_ref(),
            opacity,
        })
    }

    fn reset(&mut self) {
        if let Some(mut active) = self.active.take()
            && let Some(mut clip) = active.clip.take()
        {
            clip.destroy();
        }
    }
}

impl<B: AnimationBackend> Drop for Sequencer<B> {
    fn drop(&mut self) {
        self.reset();
    }
}
