//! Curriculum outline shape and progress arithmetic.
//!
//! Generated outlines arrive in two shapes: a bare list of weeks, or an
//! object with a `weeks` key. Everything written to storage is normalized to
//! the object form; everything read back is accepted in either form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Requested difficulty of a curriculum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(format!("invalid difficulty: {s}")),
        }
    }
}

/// Errors produced while turning generated text into an outline.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    #[error("no JSON document found in generated text")]
    NoJson,
    #[error("outline must be a list of weeks or an object with a `weeks` list")]
    WrongShape,
}

/// A curriculum outline in normalized `{ "weeks": [...] }` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurriculumOutline(Value);

impl CurriculumOutline {
    /// Strictly normalize freshly generated content.
    ///
    /// A list is wrapped as `{ "weeks": list }`; an object is kept as-is if
    /// its `weeks` member is a list.
    ///
    /// # Errors
    ///
    /// Returns [`OutlineError::WrongShape`] for anything else.
    pub fn normalize(value: Value) -> Result<Self, OutlineError> {
        match value {
            Value::Array(weeks) => Ok(Self::wrap(weeks)),
            value @ Value::Object(_) if value.get("weeks").is_some_and(Value::is_array) => {
                Ok(Self(value))
            }
            _ => Err(OutlineError::WrongShape),
        }
    }

    /// Leniently read stored content. Unrecognized shapes read as no weeks.
    #[must_use]
    pub fn from_stored(value: Value) -> Self {
        Self::normalize(value).unwrap_or_else(|_| Self::wrap(Vec::new()))
    }

    fn wrap(weeks: Vec<Value>) -> Self {
        let mut obj = Map::new();
        obj.insert("weeks".to_owned(), Value::Array(weeks));
        Self(Value::Object(obj))
    }

    /// The list of weeks.
    #[must_use]
    pub fn weeks(&self) -> &[Value] {
        self.0
            .get("weeks")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Total number of tasks across every week.
    #[must_use]
    pub fn total_tasks(&self) -> usize {
        self.weeks().iter().map(|w| week_tasks(w).len()).sum()
    }

    /// Every `(week_number, task_index)` slot in the outline.
    ///
    /// A week's number is its `week` member, or its 1-based position when
    /// that member is missing or not an integer.
    #[must_use]
    pub fn task_slots(&self) -> Vec<(i32, i32)> {
        let mut slots = Vec::new();
        for (pos, week) in self.weeks().iter().enumerate() {
            let number = week_number(week, pos);
            for idx in 0..week_tasks(week).len() {
                slots.push((number, i32::try_from(idx).unwrap_or(i32::MAX)));
            }
        }
        slots
    }

    /// Whether `(week_number, task_index)` names a task in the outline.
    #[must_use]
    pub fn has_task(&self, week: i32, task_index: i32) -> bool {
        self.task_slots().contains(&(week, task_index))
    }

    /// Whether the outline has a week numbered `week`, tasks or not.
    #[must_use]
    pub fn has_week(&self, week: i32) -> bool {
        self.weeks()
            .iter()
            .enumerate()
            .any(|(pos, w)| week_number(w, pos) == week)
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

fn week_tasks(week: &Value) -> &[Value] {
    week.get("tasks")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn week_number(week: &Value, position: usize) -> i32 {
    week.get("week")
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or_else(|| i32::try_from(position + 1).unwrap_or(i32::MAX))
}

/// Pull a JSON document out of free-form generated text.
///
/// Tries the whole text first, then the outermost `{...}` span, then the
/// outermost `[...]` span.
///
/// # Errors
///
/// Returns [`OutlineError::NoJson`] if none of those parse.
pub fn extract_outline_json(text: &str) -> Result<Value, OutlineError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
            && start < end
            && let Some(candidate) = trimmed.get(start..=end)
            && let Ok(value) = serde_json::from_str(candidate)
        {
            return Ok(value);
        }
    }
    Err(OutlineError::NoJson)
}

/// Completion percentage in `0.0..=100.0`; zero when there are no tasks.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed.min(total) as f64 / total as f64) * 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_weeks() -> Value {
        json!([
            {"week": 1, "title": "Basics", "tasks": [{"task": "a"}, {"task": "b"}]},
            {"week": 2, "title": "More", "tasks": [{"task": "c"}]}
        ])
    }

    #[test]
    fn test_normalize_wraps_bare_list() {
        let outline = CurriculumOutline::normalize(sample_weeks()).unwrap();
        assert_eq!(outline.weeks().len(), 2);
        assert!(outline.as_value().get("weeks").is_some());
    }

    #[test]
    fn test_normalize_keeps_weeks_object() {
        let value = json!({"weeks": sample_weeks(), "summary": "x"});
        let outline = CurriculumOutline::normalize(value.clone()).unwrap();
        assert_eq!(outline.into_value(), value);
    }

    #[test]
    fn test_normalize_rejects_other_shapes() {
        assert_eq!(
            CurriculumOutline::normalize(json!({"modules": []})),
            Err(OutlineError::WrongShape)
        );
        assert_eq!(
            CurriculumOutline::normalize(json!("text")),
            Err(OutlineError::WrongShape)
        );
    }

    #[test]
    fn test_from_stored_is_lenient() {
        let outline = CurriculumOutline::from_stored(json!(42));
        assert!(outline.weeks().is_empty());
        assert_eq!(outline.total_tasks(), 0);
    }

    #[test]
    fn test_task_counting_and_slots() {
        let outline = CurriculumOutline::normalize(sample_weeks()).unwrap();
        assert_eq!(outline.total_tasks(), 3);
        assert_eq!(outline.task_slots(), vec![(1, 0), (1, 1), (2, 0)]);
        assert!(outline.has_task(2, 0));
        assert!(!outline.has_task(2, 1));
        assert!(outline.has_week(2));
        assert!(!outline.has_week(3));
    }

    #[test]
    fn test_week_number_falls_back_to_position() {
        let outline =
            CurriculumOutline::normalize(json!([{"tasks": [1]}, {"tasks": [1, 2]}])).unwrap();
        assert_eq!(outline.task_slots(), vec![(1, 0), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Sure! Here is your plan:\n{\"weeks\": [{\"week\": 1, \"tasks\": []}]}\nEnjoy.";
        let value = extract_outline_json(text).unwrap();
        assert!(value.get("weeks").is_some());
    }

    #[test]
    fn test_extract_bare_array_from_prose() {
        let text = "Plan: [{\"week\": 1}, {\"week\": 2}] done";
        let value = extract_outline_json(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_extract_json_fails_without_document() {
        assert_eq!(
            extract_outline_json("no json here"),
            Err(OutlineError::NoJson)
        );
    }

    #[test]
    fn test_progress_percentage() {
        assert!((progress_percentage(0, 0) - 0.0).abs() < f64::EPSILON);
        assert!((progress_percentage(1, 4) - 25.0).abs() < f64::EPSILON);
        assert!((progress_percentage(4, 4) - 100.0).abs() < f64::EPSILON);
        assert!((progress_percentage(9, 4) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("advanced".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::default(), Difficulty::Beginner);
    }
}
