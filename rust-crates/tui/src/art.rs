//! Terminal rendition of the app's clips: ASCII frames played on a clock.
//!
//! Every clip has built-in frames. A clip directory may override any of them
//! with `<clip-name>.json` holding `{"frame_ms": .., "frames": [[line, ..], ..]}`.

use anyhow::{
    Context,
    bail,
};
use flowers::animation::{
    AnimationBackend,
    AnimationHandle,
    ClipId,
    PlayMode,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use unicode_width::UnicodeWidthStr;

/// Longest frame an override file may ask for.
pub const MAX_FRAME_MS: u64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFrames {
    pub frame_ms: u64,
    pub frames: Vec<Vec<String>>,
}

impl ClipFrames {
    fn new(frame_ms: u64, frames: &[&[&str]]) -> Self {
        Self {
            frame_ms,
            frames: frames
                .iter()
                .map(|frame| frame.iter().map(|line| line.to_string()).collect())
                .collect(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.frame_ms == 0 {
            bail!("frame_ms must be positive");
        }
        if self.frame_ms > MAX_FRAME_MS {
            bail!("frame_ms {} exceeds {MAX_FRAME_MS}", self.frame_ms);
        }
        if self.frames.is_empty() {
            bail!("clip has no frames");
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms.saturating_mul(self.frames.len() as u64))
    }

    /// Widest line across all frames, in terminal cells.
    pub fn width(&self) -> usize {
        self.frames
            .iter()
            .flatten()
            .map(|line| line.width())
            .max()
            .unwrap_or(0)
    }
}

const FLOWER_ADD: &[&[&str]] = &[
    &["", "", "", "   .   "],
    &["", "", "   |   ", "  \\|/  "],
    &["", "   o   ", "   |   ", "  \\|/  "],
    &["  .o.  ", "  (o)  ", "   |   ", "  \\|/  "],
    &["  \\|/  ", " -(@)- ", "  /|\\  ", "  \\|/  "],
    &[" \\ | / ", "--(@)--", " / | \\ ", "  \\|/  "],
    &["*\\ | /*", "--(@)--", "*/ | \\*", "  \\|/  "],
];

const FLOWER_SUBTRACT: &[&[&str]] = &[
    &["  \\|/  ", " -(@)- ", "  /|\\  ", "  \\|/  "],
    &["  \\|/  ", " -(@)- ", "   |\\  ", "  \\|/  "],
    &["   |/  ", "  (@)  ", "   |   ", "  \\|/  "],
    &["       ", "  (@)_ ", "   |   ", "  \\|/  "],
    &["       ", "    @_ ", "   |   ", "  \\|/  "],
    &["       ", "     _ ", "   |  ,", "  \\|/  "],
    &["       ", "       ", "   | ,.", "  \\|/  "],
];

const CHARACTER_EXCELLENT: &[&[&str]] = &[
    &["  \\(^o^)/  ", "     |     ", "    / \\    "],
    &["   (^o^)   ", "    /|\\    ", "    / \\    "],
];

const CHARACTER_GOOD: &[&[&str]] = &[
    &["   (^_^)   ", "    /|\\    ", "    / \\    "],
    &["   (^_^)   ", "    /|>    ", "    / \\    "],
];

const CHARACTER_NEEDS_WORK: &[&[&str]] = &[
    &["   (-_-)   ", "    /|\\    ", "    / \\    "],
    &["   (-_-)   ", "    /|\\    ", "    | |    "],
];

const CHARACTER_CELEBRATE: &[&[&str]] = &[
    &["   (^o^)   ", "    /|\\    ", "    / \\    "],
    &["  \\(^o^)/  ", "     |     ", "    / \\    "],
    &["  *(^o^)*  ", "   \\ | /   ", "    / \\    "],
    &["  \\(^o^)/  ", "     |     ", "    / \\    "],
    &["  *(^o^)*  ", "   \\ | /   ", "    / \\    "],
    &["   (^o^)   ", "    /|\\    ", "    / \\    "],
];

const CHARACTER_DISMAYED: &[&[&str]] = &[
    &["   (o_o)   ", "    /|\\    ", "    / \\    "],
    &["   (O_O)   ", "    /|\\    ", "    / \\    "],
    &["   (;_;)   ", "    /|\\    ", "    / \\    "],
    &["   (T_T)   ", "    \\|/    ", "    / \\    "],
    &["   (;_;)   ", "    /|\\    ", "    / \\    "],
    &["   (-_-)   ", "    /|\\    ", "    / \\    "],
];

fn builtin_frames(clip: ClipId) -> ClipFrames {
    match clip {
        ClipId::FlowerIncrease => ClipFrames::new(200, FLOWER_ADD),
        ClipId::FlowerDecrease => ClipFrames::new(200, FLOWER_SUBTRACT),
        ClipId::CharacterExcellent => ClipFrames::new(400, CHARACTER_EXCELLENT),
        ClipId::CharacterGood => ClipFrames::new(600, CHARACTER_GOOD),
        ClipId::CharacterNeedsWork => ClipFrames::new(800, CHARACTER_NEEDS_WORK),
        ClipId::CharacterCelebrate => ClipFrames::new(250, CHARACTER_CELEBRATE),
        ClipId::CharacterDismayed => ClipFrames::new(250, CHARACTER_DISMAYED),
    }
}

/// Frames for every clip, with optional per-clip overrides on disk.
#[derive(Clone, Debug)]
pub struct ClipLibrary {
    builtin: HashMap<ClipId, Arc<ClipFrames>>,
    overrides_dir: Option<PathBuf>,
}

impl Default for ClipLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ClipLibrary {
    pub fn builtin() -> Self {
        let builtin = ClipId::ALL
            .into_iter()
            .map(|clip| (clip, Arc::new(builtin_frames(clip))))
            .collect();
        Self {
            builtin,
            overrides_dir: None,
        }
    }

    pub fn with_overrides(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overrides_dir = Some(dir.into());
        self
    }

    /// An override that exists but cannot be read fails this clip only.
    pub fn frames(&self, clip: ClipId) -> anyhow::Result<Arc<ClipFrames>> {
        if let Some(dir) = &self.overrides_dir {
            let path = dir.join(format!("{}.json", clip.name()));
            if path.exists() {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("reading clip {}", path.display()))?;
                let frames: ClipFrames = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing clip {}", path.display()))?;
                frames
                    .validate()
                    .with_context(|| format!("invalid clip {}", path.display()))?;
                return Ok(Arc::new(frames));
            }
        }
        self.builtin
            .get(&clip)
            .cloned()
            .with_context(|| format!("no frames for clip {clip}"))
    }
}

/// A playing terminal clip.
#[derive(Debug)]
pub struct TerminalClip {
    clip: ClipId,
    frames: Arc<ClipFrames>,
    mode: PlayMode,
    started_at: Instant,
    destroyed: bool,
}

impl TerminalClip {
    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn width(&self) -> usize {
        self.frames.width()
    }

    /// Lines to draw at `now`; empty once destroyed.
    pub fn frame_at(&self, now: Instant) -> &[String] {
        if self.destroyed {
            return &[];
        }
        let count = self.frames.frames.len();
        let elapsed = now.saturating_duration_since(self.started_at).as_millis();
        let index = (elapsed / u128::from(self.frames.frame_ms)) as usize;
        let index = match self.mode {
            PlayMode::Loop => index % count,
            PlayMode::Once => index.min(count - 1),
        };
        &self.frames.frames[index]
    }
}

impl AnimationHandle for TerminalClip {
    fn is_finished(&self, now: Instant) -> bool {
        self.destroyed
            || (self.mode == PlayMode::Once
                && now.saturating_duration_since(self.started_at) >= self.frames.duration())
    }

    fn destroy(&mut self) {
        tracing::trace!("destroying clip {}", self.clip);
        self.destroyed = true;
    }
}

/// [`AnimationBackend`] drawing clips from a [`ClipLibrary`].
#[derive(Clone, Debug, Default)]
pub struct TerminalClips {
    library: ClipLibrary,
}

impl TerminalClips {
    pub fn new(library: ClipLibrary) -> Self {
        Self { library }
    }
}

impl AnimationBackend for TerminalClips {
    type Handle = TerminalClip;

    fn load(
        &mut self,
        clip: ClipId,
        mode: PlayMode,
        now: Instant,
    ) -> anyhow::Result<TerminalClip> {
        let frames = self.library.frames(clip)?;
        Ok(TerminalClip {
            clip,
            frames,
            mode,
            started_at: now,
            destroyed: false,
        })
    }
}
