use crate::model::{
    Direction,
    MAX_SCORE,
    Reward,
    ScoreItem,
    ScoreTier,
};
use rand::Rng;

/// Find the tier whose inclusive range holds `score`.
pub fn resolve_tier(score: u32, tiers: &[ScoreTier]) -> Option<&ScoreTier> {
    tiers.iter().find(|tier| tier.contains(score))
}

/// Rewards unlocked at `score`. A score no tier covers yields an empty list so
/// the shell can keep rendering.
pub fn rewards_for_score(score: u32, tiers: &[ScoreTier]) -> Vec<Reward> {
    match resolve_tier(score, tiers) {
        Some(tier) => tier.rewards.clone(),
        None => {
            tracing::warn!(score, "no tier covers score, showing no rewards");
            Vec::new()
        }
    }
}

/// Uniform draw over the item's inclusive magnitude range.
pub fn draw_magnitude<R: Rng + ?Sized>(item: &ScoreItem, rng: &mut R) -> u32 {
    if item.min_magnitude > item.max_magnitude {
        tracing::warn!(item = %item.id, "inverted magnitude range, using minimum");
        return item.min_magnitude;
    }
    rng.random_range(item.min_magnitude..=item.max_magnitude)
}

/// Saturating score update, always within `0..=MAX_SCORE`.
pub fn apply_adjustment(direction: Direction, magnitude: u32, current: u32) -> u32 {
    let current = current.min(MAX_SCORE);
    match direction {
        Direction::Increase => current.saturating_add(magnitude).min(MAX_SCORE),
        Direction::Decrease => current.saturating_sub(magnitude),
    }
}

/// Which steady character clip belongs to a score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CharacterMood {
    Excellent,
    Good,
    NeedsWork,
}

impl CharacterMood {
    pub const EXCELLENT_FROM: u32 = 90;
    pub const GOOD_FROM: u32 = 60;

    pub fn for_score(score: u32) -> Self {
        if score >= Self::EXCELLENT_FROM {
            CharacterMood::Excellent
        } else if score >= Self::GOOD_FROM {
            CharacterMood::Good
        } else {
            CharacterMood::NeedsWork
        }
    }
}
