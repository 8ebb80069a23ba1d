use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

pub const MIN_SCORE: u32 = 0;
pub const MAX_SCORE: u32 = 100;
/// Score of a fresh install or a freshly cleared store.
pub const DEFAULT_SCORE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn sign(self) -> char {
        match self {
            Direction::Increase => '+',
            Direction::Decrease => '-',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        };
        write!(f, "{name}")
    }
}

/// A reason for adjusting the score, with the inclusive range the magnitude is
/// drawn from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreItem {
    pub id: String,
    pub name: String,
    pub min_magnitude: u32,
    pub max_magnitude: u32,
}

impl ScoreItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        min_magnitude: u32,
        max_magnitude: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            min_magnitude,
            max_magnitude,
        }
    }

    pub fn range_label(&self) -> String {
        if self.min_magnitude == self.max_magnitude {
            self.min_magnitude.to_string()
        } else {
            format!("{}-{}", self.min_magnitude, self.max_magnitude)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewardValue {
    Amount(u32),
    Enabled(bool),
}

impl fmt::Display for RewardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardValue::Amount(amount) => write!(f, "{amount}"),
            RewardValue::Enabled(true) => write!(f, "yes"),
            RewardValue::Enabled(false) => write!(f, "no"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub name: String,
    pub value: RewardValue,
    #[serde(default)]
    pub unit: String,
}

impl Reward {
    pub fn new(name: impl Into<String>, value: RewardValue, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}: {}", self.name, self.value)
        } else {
            write!(f, "{}: {} {}", self.name, self.value, self.unit)
        }
    }
}

/// A contiguous score range and the rewards it unlocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub name: String,
    pub min_score: u32,
    pub max_score: u32,
    pub rewards: Vec<Reward>,
}

impl ScoreTier {
    pub fn contains(&self, score: u32) -> bool {
        (self.min_score..=self.max_score).contains(&score)
    }
}

/// One committed adjustment. Entries are never edited; stores keep them newest
/// first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub direction: Direction,
    pub item_name: String,
    pub magnitude: u32,
    pub score_before: u32,
    pub score_after: u32,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        direction: Direction,
        item_name: impl Into<String>,
        magnitude: u32,
        score_before: u32,
        score_after: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            item_name: item_name.into(),
            magnitude,
            score_before,
            score_after,
            timestamp: Utc::now(),
        }
    }
}

/// A child tracked by the sync server. `user_id` is the caller-chosen key used
/// for get-or-create; `id` names the profile in every other request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub child_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, child_name: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            child_name,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencerTrigger {
    pub direction: Direction,
    pub target_magnitude: u32,
    pub min_magnitude: u32,
    pub max_magnitude: u32,
    pub item_label: String,
}

impl SequencerTrigger {
    pub fn for_item(direction: Direction, item: &ScoreItem, target_magnitude: u32) -> Self {
        Self {
            direction,
            target_magnitude,
            min_magnitude: item.min_magnitude,
            max_magnitude: item.max_magnitude,
            item_label: item.name.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_magnitude <= self.target_magnitude
            && self.target_magnitude <= self.max_magnitude
            && !self.item_label.trim().is_empty()
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_value__deserializes_numbers_and_booleans() {
        // given
        let json = r#"[{"name":"Free time","value":20,"unit":"minutes"},{"name":"Weekend game","value":true}]"#;

        // when
        let rewards: Vec<Reward> = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(rewards[0].value, RewardValue::Amount(20));
        assert_eq!(rewards[1].value, RewardValue::Enabled(true));
        assert_eq!(rewards[1].unit, "");
        assert_eq!(rewards[0].to_string(), "Free time: 20 minutes");
        assert_eq!(rewards[1].to_string(), "Weekend game: yes");
    }

    #[test]
    fn sequencer_trigger__rejects_target_outside_range_or_blank_label() {
        // given
        let item = ScoreItem::new("add-1", "Homework done", 1, 3);

        // then
        assert!(SequencerTrigger::for_item(Direction::Increase, &item, 3).is_valid());
        assert!(!SequencerTrigger::for_item(Direction::Increase, &item, 4).is_valid());
        let blank = ScoreItem::new("add-x", "  ", 1, 3);
        assert!(!SequencerTrigger::for_item(Direction::Increase, &blank, 2).is_valid());
    }

    #[test]
    fn direction__serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Decrease).unwrap(),
            "\"decrease\""
        );
    }
}
