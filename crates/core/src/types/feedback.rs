//! Learner feedback on a curriculum: a star rating and a felt difficulty.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Star rating, 1 to 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Rating(i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct RatingError(pub i32);

impl Rating {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    /// # Errors
    ///
    /// [`RatingError`] outside `1..=5`.
    pub const fn new(stars: i32) -> Result<Self, RatingError> {
        if stars >= Self::MIN && stars <= Self::MAX {
            Ok(Self(stars))
        } else {
            Err(RatingError(stars))
        }
    }

    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Rating {
    type Error = RatingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i32 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// How hard the learner found a curriculum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyRating {
    TooEasy,
    Easy,
    #[default]
    JustRight,
    Hard,
    TooHard,
}

impl DifficultyRating {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooEasy => "too_easy",
            Self::Easy => "easy",
            Self::JustRight => "just_right",
            Self::Hard => "hard",
            Self::TooHard => "too_hard",
        }
    }

    /// Map a 1-5 slider position; anything else reads as `JustRight`.
    #[must_use]
    pub const fn from_scale(position: i64) -> Self {
        match position {
            1 => Self::TooEasy,
            2 => Self::Easy,
            4 => Self::Hard,
            5 => Self::TooHard,
            _ => Self::JustRight,
        }
    }

    /// Interpret a submitted answer: a number or numeric string on the 1-5
    /// scale, or a label such as `"too_hard"`. Unrecognized answers and
    /// missing values read as `JustRight`.
    #[must_use]
    pub fn from_answer(answer: Option<&Value>) -> Self {
        match answer {
            Some(Value::Number(n)) => n.as_i64().map_or(Self::JustRight, Self::from_scale),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::from_scale)
                .or_else(|_| s.trim().parse())
                .unwrap_or_default(),
            _ => Self::JustRight,
        }
    }
}

impl std::fmt::Display for DifficultyRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DifficultyRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "too_easy" => Ok(Self::TooEasy),
            "easy" => Ok(Self::Easy),
            "just_right" => Ok(Self::JustRight),
            "hard" => Ok(Self::Hard),
            "too_hard" => Ok(Self::TooHard),
            _ => Err(format!("invalid difficulty rating: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert_eq!(Rating::new(1).unwrap().get(), 1);
        assert_eq!(Rating::new(5).unwrap().get(), 5);
        assert_eq!(Rating::new(0), Err(RatingError(0)));
        assert_eq!(Rating::new(6), Err(RatingError(6)));
        assert!(serde_json::from_str::<Rating>("7").is_err());
        assert_eq!(serde_json::from_str::<Rating>("4").unwrap().get(), 4);
    }

    #[test]
    fn test_difficulty_scale_mapping() {
        assert_eq!(DifficultyRating::from_scale(1), DifficultyRating::TooEasy);
        assert_eq!(DifficultyRating::from_scale(3), DifficultyRating::JustRight);
        assert_eq!(DifficultyRating::from_scale(5), DifficultyRating::TooHard);
        assert_eq!(DifficultyRating::from_scale(9), DifficultyRating::JustRight);
    }

    #[test]
    fn test_difficulty_answer_forms() {
        assert_eq!(
            DifficultyRating::from_answer(Some(&json!(2))),
            DifficultyRating::Easy
        );
        assert_eq!(
            DifficultyRating::from_answer(Some(&json!("4"))),
            DifficultyRating::Hard
        );
        assert_eq!(
            DifficultyRating::from_answer(Some(&json!("too_easy"))),
            DifficultyRating::TooEasy
        );
        assert_eq!(
            DifficultyRating::from_answer(Some(&json!("brutal"))),
            DifficultyRating::JustRight
        );
        assert_eq!(DifficultyRating::from_answer(None), DifficultyRating::JustRight);
    }
}
