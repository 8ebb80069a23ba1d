use crate::{
    model::{
        MAX_SCORE,
        MIN_SCORE,
        Reward,
        RewardValue,
        ScoreItem,
        ScoreTier,
    },
    scoring,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashSet,
    fs,
    future::Future,
    path::Path,
};

/// Read-only lookup of scoring items and tiers.
pub trait CatalogProvider {
    fn increase_items(&self) -> impl Future<Output = crate::Result<Vec<ScoreItem>>>;

    fn decrease_items(&self) -> impl Future<Output = crate::Result<Vec<ScoreItem>>>;

    fn tiers(&self) -> impl Future<Output = crate::Result<Vec<ScoreTier>>>;

    fn rewards_for_score(
        &self,
        score: u32,
    ) -> impl Future<Output = crate::Result<Vec<Reward>>> {
        async move {
            let tiers = self.tiers().await?;
            Ok(scoring::rewards_for_score(score, &tiers))
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has no tiers")]
    NoTiers,
    #[error("tier '{name}' has min score {min} above max score {max}")]
    InvertedTier { name: String, min: u32, max: u32 },
    #[error("no tier covers scores {from}..={to}")]
    TierGap { from: u32, to: u32 },
    #[error("tiers '{first}' and '{second}' overlap")]
    TierOverlap { first: String, second: String },
    #[error("tier '{name}' reaches past 100")]
    TierOutOfRange { name: String },
    #[error("item '{id}' has min magnitude {min} above max magnitude {max}")]
    InvertedItem { id: String, min: u32, max: u32 },
    #[error("item '{id}' has an empty name")]
    UnnamedItem { id: String },
    #[error("item id '{id}' is used more than once")]
    DuplicateItem { id: String },
    #[error("failed to read catalog file: {0}")]
    Io(String),
    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

/// All static configuration: the scoring items in menu order and the tier table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub increase_items: Vec<ScoreItem>,
    pub decrease_items: Vec<ScoreItem>,
    pub tiers: Vec<ScoreTier>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let tier = |name: &str, min_score, max_score, free, spend, allowance, game| ScoreTier {
            name: name.to_string(),
            min_score,
            max_score,
            rewards: vec![
                Reward::new("Daily free time", RewardValue::Amount(free), "minutes"),
                Reward::new("Daily watch spending", RewardValue::Amount(spend), "yuan"),
                Reward::new("Weekly pocket money", RewardValue::Amount(allowance), "yuan"),
                Reward::new("Weekend game time", RewardValue::Enabled(game), ""),
            ],
        };
        Self {
            increase_items: vec![
                ScoreItem::new("add-1", "Finished homework without fuss", 1, 3),
                ScoreItem::new("add-2", "Got a great grade", 2, 4),
                ScoreItem::new("add-3", "Praised by the teacher", 2, 4),
                ScoreItem::new("add-4", "Helped with chores", 2, 3),
                ScoreItem::new("add-5", "Honest and on time", 2, 3),
                ScoreItem::new("add-6", "Polite and kind", 1, 2),
            ],
            decrease_items: vec![
                ScoreItem::new("subtract-1", "Refused to do homework", 1, 3),
                ScoreItem::new("subtract-2", "Flunked a test", 1, 3),
                ScoreItem::new("subtract-3", "Poor hygiene", 1, 2),
                ScoreItem::new("subtract-4", "Broke a promise or dawdled", 2, 5),
            ],
            tiers: vec![
                tier("Excellent", 90, 100, 20, 20, 15, true),
                tier("Good", 60, 89, 15, 10, 10, false),
                tier("Needs work", 0, 59, 0, 2, 5, false),
            ],
        }
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_slice(bytes)
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_slice(&bytes)
    }

    /// Checks that tiers partition the score range exactly once and that every
    /// item is usable.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.tiers.is_empty() {
            return Err(CatalogError::NoTiers);
        }
        let mut tiers: Vec<&ScoreTier> = self.tiers.iter().collect();
        tiers.sort_by_key(|tier| tier.min_score);

        let mut next_uncovered = MIN_SCORE;
        let mut previous: Option<&ScoreTier> = None;
        for tier in tiers {
            if tier.min_score > tier.max_score {
                return Err(CatalogError::InvertedTier {
                    name: tier.name.clone(),
                    min: tier.min_score,
                    max: tier.max_score,
                });
            }
            if tier.max_score > MAX_SCORE {
                return Err(CatalogError::TierOutOfRange {
                    name: tier.name.clone(),
                });
            }
            if tier.min_score > next_uncovered {
                return Err(CatalogError::TierGap {
                    from: next_uncovered,
                    to: tier.min_score - 1,
                });
            }
            if let Some(prev) = previous
                && tier.min_score < next_uncovered
            {
                return Err(CatalogError::TierOverlap {
                    first: prev.name.clone(),
                    second: tier.name.clone(),
                });
            }
            next_uncovered = tier.max_score + 1;
            previous = Some(tier);
        }
        if next_uncovered <= MAX_SCORE {
            return Err(CatalogError::TierGap {
                from: next_uncovered,
                to: MAX_SCORE,
            });
        }

        let mut seen = HashSet::new();
        for item in self.increase_items.iter().chain(&self.decrease_items) {
            if item.min_magnitude > item.max_magnitude {
                return Err(CatalogError::InvertedItem {
                    id: item.id.clone(),
                    min: item.min_magnitude,
                    max: item.max_magnitude,
                });
            }
            if item.name.trim().is_empty() {
                return Err(CatalogError::UnnamedItem {
                    id: item.id.clone(),
                });
            }
            if !seen.insert(item.id.as_str()) {
                return Err(CatalogError::DuplicateItem {
                    id: item.id.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CatalogProvider for Catalog {
    async fn increase_items(&self) -> crate::Result<Vec<ScoreItem>> {
        Ok(self.increase_items.clone())
    }

    async fn decrease_items(&self) -> crate::Result<Vec<ScoreItem>> {
        Ok(self.decrease_items.clone())
    }

    async fn tiers(&self) -> crate::Result<Vec<ScoreTier>> {
        Ok(self.tiers.clone())
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin__passes_validation() {
        assert_eq!(Catalog::builtin().validate(), Ok(()));
    }

    #[test]
    fn validate__when_tiers_leave_a_gap_then_reports_it() {
        // given
        let mut catalog = Catalog::builtin();
        catalog.tiers[1].min_score = 65;

        // when
        let result = catalog.validate();

        // then
        assert_eq!(result, Err(CatalogError::TierGap { from: 60, to: 64 }));
    }

    #[test]
    fn validate__when_tiers_overlap_then_reports_it() {
        // given
        let mut catalog = Catalog::builtin();
        catalog.tiers[2].max_score = 70;

        // when
        let result = catalog.validate();

        // then
        assert!(matches!(result, Err(CatalogError::TierOverlap { .. })));
    }

    #[test]
    fn validate__when_top_is_uncovered_then_reports_gap() {
        // given
        let mut catalog = Catalog::builtin();
        catalog.tiers[0].max_score = 98;

        // then
        assert_eq!(
            catalog.validate(),
            Err(CatalogError::TierGap { from: 99, to: 100 })
        );
    }

    #[test]
    fn validate__rejects_bad_items() {
        // given
        let mut inverted = Catalog::builtin();
        inverted.increase_items[0].min_magnitude = 9;
        let mut duplicate = Catalog::builtin();
        duplicate.decrease_items[0].id = "add-1".to_string();
        let mut unnamed = Catalog::builtin();
        unnamed.decrease_items[1].name = String::new();

        // then
        assert!(matches!(inverted.validate(), Err(CatalogError::InvertedItem { .. })));
        assert_eq!(
            duplicate.validate(),
            Err(CatalogError::DuplicateItem {
                id: "add-1".to_string()
            })
        );
        assert!(matches!(unnamed.validate(), Err(CatalogError::UnnamedItem { .. })));
    }

    #[test]
    fn from_json_slice__round_trips_builtin_and_validates() {
        // given
        let bytes = serde_json::to_vec(&Catalog::builtin()).unwrap();

        // when
        let parsed = Catalog::from_json_slice(&bytes).unwrap();

        // then
        assert_eq!(parsed, Catalog::builtin());
        assert!(matches!(
            Catalog::from_json_slice(b"{\"tiers\": 3}"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn rewards_for_score__uses_provider_tiers() {
        // given
        let catalog = Catalog::builtin();

        // when
        let rewards = catalog.rewards_for_score(95).await.unwrap();

        // then
        assert_eq!(rewards.len(), 4);
        assert_eq!(rewards[3].value, RewardValue::Enabled(true));
    }
}
